use super::chain::ChainKind;
use super::iterator::BlockWalk;
use super::query::require_role_in;
use super::state::{outputs_key, read_outputs};
use crate::crypto::Sha256Hash;
use crate::error::{ChainError, Result};
use crate::organisation::Role;
use crate::persistence::ReadTx;
use crate::transaction::{PrevTransactions, Transaction};
use std::collections::{HashMap, HashSet};

/// Rejects a batch that repeats a transaction or in which two inputs
/// reference the same output.
pub fn validate_no_double_spend(transactions: &[Transaction]) -> Result<()> {
    let mut seen_ids: HashSet<Sha256Hash> = HashSet::new();
    let mut seen_inputs: HashMap<(Sha256Hash, u32), Sha256Hash> = HashMap::new();
    for tx in transactions {
        if !seen_ids.insert(tx.id) {
            return Err(ChainError::DoubleSpendDetected(format!(
                "Transaction {} appears twice in one block",
                tx.id_hex()
            )));
        }
        for input in &tx.inputs {
            if let Some(conflicting_tx) = seen_inputs.insert((input.txid, input.vout), tx.id) {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "Output {}:{} is spent by both {} and {}",
                    hex::encode(input.txid),
                    input.vout,
                    hex::encode(conflicting_tx),
                    tx.id_hex()
                )));
            }
        }
    }
    Ok(())
}

/// Walks the whole transaction chain once. Loads every transaction referenced
/// by the inputs of `transactions` and fails if any of them is already mined.
pub(crate) fn collect_prev_transactions<T: ReadTx + ?Sized>(
    tx: &T,
    transactions: &[Transaction],
    difficulty: u32,
) -> Result<PrevTransactions> {
    let mut wanted: HashSet<Sha256Hash> = transactions
        .iter()
        .flat_map(|t| t.inputs.iter().map(|input| input.txid))
        .collect();
    let incoming: HashSet<Sha256Hash> = transactions.iter().map(|t| t.id).collect();

    let mut found = PrevTransactions::new();
    for block in BlockWalk::new(tx, ChainKind::Transactions, difficulty)? {
        for mined in block?.payload.transactions() {
            if incoming.contains(&mined.id) {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "Transaction {} is already on the chain",
                    mined.id_hex()
                )));
            }
            if wanted.remove(&mined.id) {
                found.insert(mined.id, mined.clone());
            }
        }
    }

    if wanted.is_empty() {
        return Ok(found);
    }
    let missing = wanted.iter().map(hex::encode).collect::<Vec<_>>().join(", ");
    Err(ChainError::TransactionNotFound(missing))
}

/// A coinbase may only issue items to Manufacturers, under their own prefix.
fn validate_issuance<T: ReadTx + ?Sized>(
    tx: &T,
    coinbase: &Transaction,
    difficulty: u32,
) -> Result<()> {
    for out in &coinbase.outputs {
        let issuer = require_role_in(tx, &out.pub_key_hash, Role::Manufacturer, difficulty)?;
        let code = out.item_code().ok_or_else(|| {
            ChainError::InvalidTransaction(format!("Malformed item code '{}'", out.item))
        })?;
        if code.prefix != issuer.prefix {
            return Err(ChainError::InvalidTransaction(format!(
                "{} cannot issue {} under prefix {}",
                issuer.name, out.item, code.prefix
            )));
        }
    }
    Ok(())
}

/// Full check of a batch about to be mined: structure, no transaction mined
/// twice, issuance rights, signatures against the referenced outputs, every
/// input still unspent, no conflicts in the batch.
pub(crate) fn validate_transactions<T: ReadTx + ?Sized>(
    tx: &T,
    transactions: &[Transaction],
    difficulty: u32,
) -> Result<()> {
    if transactions.is_empty() {
        return Err(ChainError::InvalidBlock(
            "A transaction block needs at least one transaction".to_string(),
        ));
    }

    validate_no_double_spend(transactions)?;

    let prev_txs = collect_prev_transactions(tx, transactions, difficulty)?;

    for candidate in transactions {
        candidate.validate_structure()?;
        if candidate.is_coinbase() {
            validate_issuance(tx, candidate, difficulty)?;
            continue;
        }
        candidate.verify(&prev_txs)?;

        for input in &candidate.inputs {
            let unspent = read_outputs(tx, &outputs_key(&input.txid))?
                .map(|outs| outs.outputs.iter().any(|out| out.index == input.vout))
                .unwrap_or(false);
            if !unspent {
                return Err(ChainError::DoubleSpendDetected(format!(
                    "Output {}:{} is already spent",
                    hex::encode(input.txid),
                    input.vout
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::transaction::TxOutput;

    #[test]
    fn test_conflicting_transactions_in_one_batch() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let carol = KeyPair::generate().unwrap();
        let source = [9u8; 32];
        let out = TxOutput::new(0, "PFX.1.1", alice.address());

        let pk = alice.public_key_bytes().to_vec();
        let to_bob = Transaction::new_transfer(pk.clone(), bob.address(), vec![(source, out.clone())]).unwrap();
        let to_carol = Transaction::new_transfer(pk, carol.address(), vec![(source, out)]).unwrap();

        assert!(validate_no_double_spend(std::slice::from_ref(&to_bob)).is_ok());
        assert!(matches!(
            validate_no_double_spend(&[to_bob, to_carol]),
            Err(ChainError::DoubleSpendDetected(_))
        ));
    }

    #[test]
    fn test_repeated_coinbase_in_one_batch() {
        let maker = KeyPair::generate().unwrap();
        let coinbase = Transaction::new_coinbase(maker.address(), vec!["PFX.1.1".into()]).unwrap();
        assert!(matches!(
            validate_no_double_spend(&[coinbase.clone(), coinbase]),
            Err(ChainError::DoubleSpendDetected(_))
        ));
    }
}
