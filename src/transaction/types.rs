/// Transaction types for TraceChain
use crate::crypto::{sha256, Address, Sha256Hash};
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

/// Structured item code `prefix.code.serial`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemCode {
    pub prefix: String,
    pub code: u64,
    pub serial: u64,
}

impl ItemCode {
    pub fn new(prefix: impl Into<String>, code: u64, serial: u64) -> Self {
        ItemCode {
            prefix: prefix.into(),
            code,
            serial,
        }
    }
}

impl fmt::Display for ItemCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.prefix, self.code, self.serial)
    }
}

impl FromStr for ItemCode {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ChainError::InvalidTransaction(format!("Malformed item code '{}'", s));
        let mut parts = s.rsplitn(3, '.');
        let serial = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let code = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let prefix = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        Ok(ItemCode::new(prefix, code, serial))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub txid: Sha256Hash,
    /// Index of the spent output within `txid`.
    pub vout: u32,
    pub signature: Option<Vec<u8>>,
    /// Compressed public key of the spender.
    pub pub_key: Vec<u8>,
}

impl TxInput {
    pub fn uses_key(&self, pub_key_hash: &Address) -> bool {
        &sha256(&self.pub_key) == pub_key_hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxOutput {
    pub index: u32,
    pub item: String,
    pub pub_key_hash: Address,
}

impl TxOutput {
    pub fn new(index: u32, item: impl Into<String>, pub_key_hash: Address) -> Self {
        TxOutput {
            index,
            item: item.into(),
            pub_key_hash,
        }
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &Address) -> bool {
        &self.pub_key_hash == pub_key_hash
    }

    pub fn item_code(&self) -> Option<ItemCode> {
        self.item.parse().ok()
    }
}

/// Output list stored per transaction in the UTXO index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutputs {
    pub outputs: Vec<TxOutput>,
}

impl TxOutputs {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Sha256Hash,
    pub timestamp: i64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Issues `items` to `to`. Coinbase transactions have no inputs.
    pub fn new_coinbase(to: Address, items: Vec<String>) -> Result<Self> {
        if items.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Coinbase must issue at least one item".to_string(),
            ));
        }
        let outputs = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| TxOutput::new(i as u32, item, to))
            .collect();

        let mut tx = Transaction {
            id: [0u8; 32],
            timestamp: chrono::Utc::now().timestamp_millis(),
            inputs: Vec::new(),
            outputs,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Unsigned transfer spending `spent` outputs. Each spent item gets one
    /// output of the same item locked to `to`.
    pub fn new_transfer(
        sender_pub_key: Vec<u8>,
        to: Address,
        spent: Vec<(Sha256Hash, TxOutput)>,
    ) -> Result<Self> {
        if spent.is_empty() {
            return Err(ChainError::InvalidTransaction(
                "Transfer must spend at least one output".to_string(),
            ));
        }

        let mut inputs = Vec::with_capacity(spent.len());
        let mut outputs = Vec::with_capacity(spent.len());
        for (i, (txid, out)) in spent.into_iter().enumerate() {
            inputs.push(TxInput {
                txid,
                vout: out.index,
                signature: None,
                pub_key: sender_pub_key.clone(),
            });
            outputs.push(TxOutput::new(i as u32, out.item, to));
        }

        let mut tx = Transaction {
            id: [0u8; 32],
            timestamp: chrono::Utc::now().timestamp_millis(),
            inputs,
            outputs,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Hash of the transaction body: id cleared, input signatures removed.
    pub fn hash(&self) -> Result<Sha256Hash> {
        let mut body = self.clone();
        body.id = [0u8; 32];
        for input in &mut body.inputs {
            input.signature = None;
        }
        Ok(sha256(&bincode::serialize(&body)?))
    }

    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Copy used for input signatures: signatures and public keys cleared.
    pub fn trimmed_copy(&self) -> Transaction {
        Transaction {
            id: self.id,
            timestamp: self.timestamp,
            inputs: self
                .inputs
                .iter()
                .map(|input| TxInput {
                    txid: input.txid,
                    vout: input.vout,
                    signature: None,
                    pub_key: Vec::new(),
                })
                .collect(),
            outputs: self.outputs.clone(),
        }
    }

    /// Validate transaction size to prevent DoS attacks
    pub fn validate_size(&self) -> Result<()> {
        let serialized = self.serialize()?;
        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "--- Transaction {}:", self.id_hex())?;
        for (i, input) in self.inputs.iter().enumerate() {
            writeln!(f, "     Input {}:", i)?;
            writeln!(f, "       TXID:      {}", hex::encode(input.txid))?;
            writeln!(f, "       Out:       {}", input.vout)?;
            writeln!(
                f,
                "       Signature: {}",
                input.signature.as_deref().map(hex::encode).unwrap_or_default()
            )?;
            writeln!(f, "       PubKey:    {}", hex::encode(&input.pub_key))?;
        }
        for output in &self.outputs {
            writeln!(f, "     Output {}:", output.index)?;
            writeln!(f, "       Item:      {}", output.item)?;
            writeln!(f, "       Script:    {}", hex::encode(output.pub_key_hash))?;
        }
        Ok(())
    }
}
