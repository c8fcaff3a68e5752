//! Transaction module split into types and validation for better modularity

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::PrevTransactions;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::error::ChainError;

    fn issue(owner: &KeyPair, items: &[&str]) -> Transaction {
        Transaction::new_coinbase(
            owner.address(),
            items.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    fn transfer(
        sender: &KeyPair,
        to: &KeyPair,
        prev: &Transaction,
        vouts: &[u32],
    ) -> (Transaction, PrevTransactions) {
        let spent = vouts
            .iter()
            .map(|v| (prev.id, prev.outputs[*v as usize].clone()))
            .collect();
        let tx = Transaction::new_transfer(sender.public_key_bytes().to_vec(), to.address(), spent)
            .unwrap();
        let mut prev_txs = PrevTransactions::new();
        prev_txs.insert(prev.id, prev.clone());
        (tx, prev_txs)
    }

    #[test]
    fn test_coinbase_shape() {
        let owner = KeyPair::generate().unwrap();
        let tx = issue(&owner, &["PFX.1.1", "PFX.1.2"]);
        assert!(tx.is_coinbase());
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[1].index, 1);
        assert!(tx.outputs[0].is_locked_with_key(&owner.address()));
        assert!(tx.validate_structure().is_ok());
        assert!(tx.verify(&PrevTransactions::new()).is_ok());
    }

    #[test]
    fn test_empty_coinbase_rejected() {
        let owner = KeyPair::generate().unwrap();
        assert!(Transaction::new_coinbase(owner.address(), vec![]).is_err());
    }

    #[test]
    fn test_signed_transfer_verifies() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let coinbase = issue(&alice, &["PFX.1.1"]);

        let (mut tx, prev_txs) = transfer(&alice, &bob, &coinbase, &[0]);
        let id_before = tx.id;
        tx.sign(&alice, &prev_txs).unwrap();

        assert_eq!(tx.id, id_before, "signing must not change the id");
        assert!(tx.validate_structure().is_ok());
        assert!(tx.verify(&prev_txs).is_ok());
        assert_eq!(tx.outputs[0].item, "PFX.1.1");
        assert!(tx.outputs[0].is_locked_with_key(&bob.address()));
    }

    #[test]
    fn test_unsigned_transfer_fails() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let coinbase = issue(&alice, &["PFX.1.1"]);
        let (tx, prev_txs) = transfer(&alice, &bob, &coinbase, &[0]);
        assert!(matches!(
            tx.verify(&prev_txs),
            Err(ChainError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_spending_someone_elses_output_fails() {
        let alice = KeyPair::generate().unwrap();
        let mallory = KeyPair::generate().unwrap();
        let coinbase = issue(&alice, &["PFX.1.1"]);

        let (mut tx, prev_txs) = transfer(&mallory, &mallory, &coinbase, &[0]);
        tx.sign(&mallory, &prev_txs).unwrap();
        let err = tx.verify(&prev_txs).unwrap_err();
        assert!(err.to_string().contains("does not own"));
    }

    #[test]
    fn test_tampered_output_fails() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let coinbase = issue(&alice, &["PFX.1.1"]);
        let (mut tx, prev_txs) = transfer(&alice, &bob, &coinbase, &[0]);
        tx.sign(&alice, &prev_txs).unwrap();

        tx.outputs[0].pub_key_hash = alice.address();
        assert!(tx.verify(&prev_txs).is_err());
    }

    #[test]
    fn test_transfer_must_carry_the_spent_items() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let coinbase = issue(&alice, &["PFX.1.1", "PFX.1.2"]);

        let (mut relabelled, prev_txs) = transfer(&alice, &bob, &coinbase, &[0]);
        relabelled.outputs[0].item = "ACM.9.9".to_string();
        relabelled.id = relabelled.hash().unwrap();
        relabelled.sign(&alice, &prev_txs).unwrap();
        assert!(relabelled.validate_structure().is_ok());
        let err = relabelled.verify(&prev_txs).unwrap_err();
        assert!(err.to_string().contains("ACM.9.9"));

        let (mut dropped, prev_txs) = transfer(&alice, &bob, &coinbase, &[0, 1]);
        dropped.outputs.pop();
        dropped.id = dropped.hash().unwrap();
        dropped.sign(&alice, &prev_txs).unwrap();
        assert!(matches!(
            dropped.verify(&prev_txs),
            Err(ChainError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_missing_previous_transaction() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let coinbase = issue(&alice, &["PFX.1.1"]);
        let (tx, _) = transfer(&alice, &bob, &coinbase, &[0]);
        assert!(tx.verify(&PrevTransactions::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_repeated_input_is_double_spend() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let coinbase = issue(&alice, &["PFX.1.1"]);
        let (tx, _) = transfer(&alice, &bob, &coinbase, &[0, 0]);
        assert!(matches!(
            tx.validate_structure(),
            Err(ChainError::DoubleSpendDetected(_))
        ));
    }

    #[test]
    fn test_item_code_parsing() {
        let code: ItemCode = "PFX.12.3".parse().unwrap();
        assert_eq!(code, ItemCode::new("PFX", 12, 3));
        assert_eq!(code.to_string(), "PFX.12.3");
        assert!("PFX.1".parse::<ItemCode>().is_err());
        assert!(".1.1".parse::<ItemCode>().is_err());
        assert!("PFX.a.1".parse::<ItemCode>().is_err());
    }
}
