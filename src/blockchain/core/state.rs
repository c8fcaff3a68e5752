//! Unspent output index kept in the `chainstate` bucket.
//!
//! Each record maps a hex encoded transaction id to the outputs of that
//! transaction that no input on the transaction chain has spent yet. Records
//! that run out of outputs are deleted.

use super::chain::{Block, ChainKind};
use super::iterator::BlockWalk;
use super::ledger::Ledger;
use crate::crypto::{Address, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::persistence::{self, Bucket, ReadTx, WriteTx};
use crate::transaction::{TxOutput, TxOutputs};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

pub(crate) fn outputs_key(txid: &Sha256Hash) -> Vec<u8> {
    hex::encode(txid).into_bytes()
}

fn txid_from_key(key: &[u8]) -> Result<Sha256Hash> {
    let raw = hex::decode(key)
        .map_err(|e| ChainError::DatabaseError(format!("Corrupt chainstate key: {}", e)))?;
    raw.as_slice()
        .try_into()
        .map_err(|_| ChainError::DatabaseError("Chainstate key is not a transaction id".to_string()))
}

pub(crate) fn read_outputs<T: ReadTx + ?Sized>(tx: &T, key: &[u8]) -> Result<Option<TxOutputs>> {
    tx.get(Bucket::ChainState, key)?
        .map(|data| TxOutputs::deserialize(&data))
        .transpose()
}

/// Applies one transaction block to the index: spent outputs leave, new
/// outputs arrive. Spending an output the index does not hold, or indexing a
/// transaction that already has a record, is an error.
pub(crate) fn apply_block<W: WriteTx + ?Sized>(tx: &mut W, block: &Block) -> Result<()> {
    for transaction in block.payload.transactions() {
        if !transaction.is_coinbase() {
            for input in &transaction.inputs {
                let key = outputs_key(&input.txid);
                let mut record = read_outputs(&*tx, &key)?.ok_or_else(|| {
                    ChainError::DoubleSpendDetected(format!(
                        "Transaction {} has no unspent outputs left",
                        hex::encode(input.txid)
                    ))
                })?;

                let position = record
                    .outputs
                    .iter()
                    .position(|out| out.index == input.vout)
                    .ok_or_else(|| {
                        ChainError::DoubleSpendDetected(format!(
                            "Output {}:{} is not unspent",
                            hex::encode(input.txid),
                            input.vout
                        ))
                    })?;
                record.outputs.remove(position);

                if record.outputs.is_empty() {
                    tx.delete(Bucket::ChainState, &key)?;
                } else {
                    tx.put(Bucket::ChainState, &key, &record.serialize()?)?;
                }
            }
        }

        let key = outputs_key(&transaction.id);
        if tx.get(Bucket::ChainState, &key)?.is_some() {
            return Err(ChainError::DoubleSpendDetected(format!(
                "Transaction {} is already in the utxo index",
                transaction.id_hex()
            )));
        }
        let record = TxOutputs {
            outputs: transaction.outputs.clone(),
        };
        tx.put(Bucket::ChainState, &key, &record.serialize()?)?;
    }

    debug!(
        block = %block.hash_hex(),
        transactions = block.payload.len(),
        "utxo index updated"
    );
    Ok(())
}

/// Rebuilds the index from a full walk: every output minus every spent output.
pub(crate) fn rebuild<W: WriteTx + ?Sized>(tx: &mut W, difficulty: u32) -> Result<usize> {
    let mut all_outputs: HashMap<Sha256Hash, Vec<TxOutput>> = HashMap::new();
    let mut spent: HashSet<(Sha256Hash, u32)> = HashSet::new();

    for block in BlockWalk::new(&*tx, ChainKind::Transactions, difficulty)? {
        for transaction in block?.payload.transactions() {
            for input in &transaction.inputs {
                spent.insert((input.txid, input.vout));
            }
            all_outputs.insert(transaction.id, transaction.outputs.clone());
        }
    }

    tx.clear(Bucket::ChainState)?;

    let mut records = 0;
    for (txid, outputs) in all_outputs {
        let unspent: Vec<TxOutput> = outputs
            .into_iter()
            .filter(|out| !spent.contains(&(txid, out.index)))
            .collect();
        if unspent.is_empty() {
            continue;
        }
        let record = TxOutputs { outputs: unspent };
        tx.put(Bucket::ChainState, &outputs_key(&txid), &record.serialize()?)?;
        records += 1;
    }
    Ok(records)
}

/// Unspent outputs of one owner, paired with the id of the transaction that created them.
pub type Spendable = Vec<(Sha256Hash, TxOutput)>;

pub struct UtxoSet<'a> {
    ledger: &'a Ledger,
}

impl<'a> UtxoSet<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        UtxoSet { ledger }
    }

    pub fn reindex(&self) -> Result<usize> {
        let difficulty = self.ledger.difficulty();
        let records = persistence::update(self.ledger.store(), |tx| rebuild(tx, difficulty))?;
        info!(records, "utxo index rebuilt");
        Ok(records)
    }

    /// Applies `block` to the index in its own write transaction. Appending
    /// through the ledger already does this. A block whose transactions are
    /// already indexed is rejected and leaves the index untouched.
    pub fn update(&self, block: &Block) -> Result<()> {
        if block.kind() != ChainKind::Transactions {
            return Err(ChainError::InvalidBlock(format!(
                "Only transaction blocks change the utxo index, got a {} block",
                block.kind()
            )));
        }
        persistence::update(self.ledger.store(), |tx| apply_block(tx, block))
    }

    fn scan(&self) -> Result<Spendable> {
        persistence::view(self.ledger.store(), |tx| {
            let mut unspent = Vec::new();
            for (key, value) in tx.entries(Bucket::ChainState)? {
                let txid = txid_from_key(&key)?;
                for out in TxOutputs::deserialize(&value)?.outputs {
                    unspent.push((txid, out));
                }
            }
            Ok(unspent)
        })
    }

    pub fn find_unspent(&self, owner: &Address) -> Result<Spendable> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|(_, out)| out.is_locked_with_key(owner))
            .collect())
    }

    pub fn find_utxo(&self, owner: &Address) -> Result<Vec<TxOutput>> {
        Ok(self
            .find_unspent(owner)?
            .into_iter()
            .map(|(_, out)| out)
            .collect())
    }

    /// Outputs locked to `owner` carrying the requested items. Each requested
    /// name claims a distinct output; the search stops once all are matched.
    pub fn find_spendable(&self, owner: &Address, wanted: &[String]) -> Result<Spendable> {
        let mut remaining: Vec<&str> = wanted.iter().map(String::as_str).collect();
        let mut matched = Vec::new();

        for (txid, out) in self.find_unspent(owner)? {
            if remaining.is_empty() {
                break;
            }
            if let Some(pos) = remaining.iter().position(|item| *item == out.item) {
                remaining.swap_remove(pos);
                matched.push((txid, out));
            }
        }
        Ok(matched)
    }

    /// Number of matched outputs and the output indices matched per hex txid.
    pub fn find_spendable_outputs(
        &self,
        owner: &Address,
        wanted: &[String],
    ) -> Result<(usize, BTreeMap<String, Vec<u32>>)> {
        let matched = self.find_spendable(owner, wanted)?;
        let mut by_tx: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for (txid, out) in &matched {
            by_tx.entry(hex::encode(txid)).or_default().push(out.index);
        }
        Ok((matched.len(), by_tx))
    }

    /// Owner of the unspent output carrying `item`, if any.
    pub fn holder_of(&self, item: &str) -> Result<Option<Address>> {
        Ok(self
            .scan()?
            .into_iter()
            .find(|(_, out)| out.item == item)
            .map(|(_, out)| out.pub_key_hash))
    }

    pub fn count_transactions(&self) -> Result<usize> {
        persistence::view(self.ledger.store(), |tx| {
            Ok(tx.entries(Bucket::ChainState)?.len())
        })
    }
}
