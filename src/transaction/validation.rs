/// Signing and validation logic for transactions separated from type definitions
use crate::crypto::{sha256, verify_digest, KeyPair, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::transaction::types::{Transaction, TxOutput};
use std::collections::{HashMap, HashSet};

/// Previous transactions referenced by a transaction's inputs, keyed by id.
pub type PrevTransactions = HashMap<Sha256Hash, Transaction>;

fn referenced_output<'a>(
    prev_txs: &'a PrevTransactions,
    txid: &Sha256Hash,
    vout: u32,
) -> Result<&'a TxOutput> {
    let prev = prev_txs.get(txid).ok_or_else(|| {
        ChainError::TransactionNotFound(format!("Previous transaction {} is missing", hex::encode(txid)))
    })?;
    prev.outputs
        .iter()
        .find(|out| out.index == vout)
        .ok_or_else(|| {
            ChainError::InvalidTransaction(format!(
                "Output {} does not exist in transaction {}",
                vout,
                hex::encode(txid)
            ))
        })
}

impl Transaction {
    /// Digest signed by input `index`: the trimmed copy with that input's key
    /// slot holding the locking hash of the output it spends.
    fn input_digest(&self, index: usize, locking_hash: &[u8]) -> Result<Sha256Hash> {
        let mut copy = self.trimmed_copy();
        copy.inputs[index].pub_key = locking_hash.to_vec();
        Ok(sha256(&bincode::serialize(&copy)?))
    }

    /// Stateless checks: size, output numbering, no repeated inputs.
    pub fn validate_structure(&self) -> Result<()> {
        self.validate_size()?;

        if self.outputs.is_empty() {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction {} has no outputs",
                self.id_hex()
            )));
        }
        for (i, out) in self.outputs.iter().enumerate() {
            if out.index as usize != i {
                return Err(ChainError::InvalidTransaction(format!(
                    "Output {} carries index {}",
                    i, out.index
                )));
            }
            if out.item.is_empty() {
                return Err(ChainError::InvalidTransaction("Output item cannot be empty".to_string()));
            }
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert((input.txid, input.vout)) {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "Output {}:{} spent twice by transaction {}",
                    hex::encode(input.txid),
                    input.vout,
                    self.id_hex()
                )));
            }
        }

        if self.hash()? != self.id {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction id {} does not match its contents",
                self.id_hex()
            )));
        }
        Ok(())
    }

    /// Signs every input with `keypair`.
    pub fn sign(&mut self, keypair: &KeyPair, prev_txs: &PrevTransactions) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut signatures = Vec::with_capacity(self.inputs.len());
        for (i, input) in self.inputs.iter().enumerate() {
            let spent = referenced_output(prev_txs, &input.txid, input.vout)?;
            let digest = self.input_digest(i, &spent.pub_key_hash)?;
            signatures.push(keypair.sign_digest(&digest).to_vec());
        }

        for (input, signature) in self.inputs.iter_mut().zip(signatures) {
            input.signature = Some(signature);
        }
        Ok(())
    }

    /// Verifies every input: the spent output exists, is locked to the input's
    /// key, and the signature is valid. The outputs must carry exactly the
    /// spent items. Coinbase transactions pass.
    pub fn verify(&self, prev_txs: &PrevTransactions) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut spent_items = Vec::with_capacity(self.inputs.len());
        for (i, input) in self.inputs.iter().enumerate() {
            let spent = referenced_output(prev_txs, &input.txid, input.vout)?;
            spent_items.push(spent.item.as_str());

            if !input.uses_key(&spent.pub_key_hash) {
                return Err(ChainError::InvalidTransaction(format!(
                    "Input {} of {} does not own output {}:{}",
                    i,
                    self.id_hex(),
                    hex::encode(input.txid),
                    input.vout
                )));
            }

            let signature = input.signature.as_deref().ok_or_else(|| {
                ChainError::InvalidTransaction(format!("Input {} of {} is not signed", i, self.id_hex()))
            })?;

            let digest = self.input_digest(i, &spent.pub_key_hash)?;
            verify_digest(&input.pub_key, &digest, signature).map_err(|e| {
                ChainError::InvalidTransaction(format!("Input {} of {}: {}", i, self.id_hex(), e))
            })?;
        }

        let mut sent_items: Vec<&str> = self.outputs.iter().map(|out| out.item.as_str()).collect();
        spent_items.sort_unstable();
        sent_items.sort_unstable();
        if spent_items != sent_items {
            return Err(ChainError::InvalidTransaction(format!(
                "Transaction {} sends {:?} but spends {:?}",
                self.id_hex(),
                sent_items,
                spent_items
            )));
        }
        Ok(())
    }
}
