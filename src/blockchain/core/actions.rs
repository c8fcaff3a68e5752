//! Role-checked workflows that build, sign and mine records on behalf of a wallet.

use super::chain::Block;
use super::ledger::Ledger;
use super::query::ProvenanceQuery;
use crate::crypto::{Address, KeyPair};
use crate::error::{ChainError, Result};
use crate::events::LedgerEvent;
use crate::organisation::{Organisation, Role};
use crate::product::Product;
use crate::transaction::{PrevTransactions, Transaction};
use std::collections::HashMap;
use tracing::info;

/// Result of [`Ledger::send_items`].
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Mined(Block),
    /// Signed and handed to subscribers for someone else to mine.
    Pending(Transaction),
}

impl Ledger {
    fn require_role(&self, keypair: &KeyPair, role: Role) -> Result<Organisation> {
        let org = self.find_organisation_by_public_key(&keypair.public_key_bytes())?;
        if org.role != role {
            return Err(ChainError::Unauthorized(format!(
                "{} is a {}, this needs a {}",
                org.name, org.role, role
            )));
        }
        Ok(org)
    }

    /// Registers `draft` on behalf of an Admin organisation.
    pub fn register_organisation(&self, admin: &KeyPair, mut draft: Organisation) -> Result<Block> {
        self.require_role(admin, Role::Admin)?;
        draft.validate_fields()?;
        if self.is_organisation_duplicate(&draft)? {
            return Err(ChainError::DuplicateOrganisation(format!(
                "GSTIN {}, prefix {} or public key already registered",
                draft.gstin, draft.prefix
            )));
        }

        draft.sign(admin)?;
        let block = self.mine_organisation(draft, &admin.address())?;
        info!(height = block.height, "registered organisation");
        Ok(block)
    }

    /// Defines new products for a Manufacturer, numbered after its existing ones.
    pub fn add_products(&self, manufacturer: &KeyPair, names: &[String]) -> Result<Block> {
        self.require_role(manufacturer, Role::Manufacturer)?;
        if names.is_empty() {
            return Err(ChainError::InvalidProduct("No product names given".to_string()));
        }

        let owner = manufacturer.address();
        let first_code = self.next_product_code(&owner)?;
        let pub_key = manufacturer.public_key_bytes().to_vec();

        let mut products = Vec::with_capacity(names.len());
        for (offset, name) in names.iter().enumerate() {
            let mut product = Product::new(first_code + offset as u64, name.trim(), pub_key.clone());
            product.validate_fields()?;
            product.sign(manufacturer)?;
            products.push(product);
        }

        self.mine_products(products, &owner)
    }

    /// Issues one new item per entry of `codes` to the manufacturer. Repeating a
    /// code issues consecutive serials.
    pub fn produce_items(&self, manufacturer: &KeyPair, codes: &[u64]) -> Result<Block> {
        let org = self.require_role(manufacturer, Role::Manufacturer)?;
        if codes.is_empty() {
            return Err(ChainError::InvalidProduct("No product codes given".to_string()));
        }

        let owner = manufacturer.address();
        let mut next_serial: HashMap<u64, u64> = HashMap::new();
        let mut items = Vec::with_capacity(codes.len());

        for &code in codes {
            let serial = match next_serial.get(&code) {
                Some(serial) => *serial,
                None => {
                    self.find_product_by_code(&owner, code)?;
                    self.next_item_code(&org.prefix, code)?.serial
                }
            };
            next_serial.insert(code, serial + 1);
            items.push(format!("{}.{}.{}", org.prefix, code, serial));
        }

        let coinbase = Transaction::new_coinbase(owner, items)?;
        self.mine_transactions(vec![coinbase])
    }

    /// Transfers `items` from `sender` to `to`. With `mine_now` the transfer is
    /// mined at once; otherwise it is published as `TransactionCreated`.
    pub fn send_items(
        &self,
        sender: &KeyPair,
        to: &Address,
        items: &[String],
        mine_now: bool,
    ) -> Result<SendOutcome> {
        if items.is_empty() {
            return Err(ChainError::InvalidTransaction("No items to send".to_string()));
        }

        let spendable = self.utxo_set().find_spendable(&sender.address(), items)?;
        if spendable.len() < items.len() {
            return Err(ChainError::InsufficientItems {
                wanted: items.len(),
                found: spendable.len(),
            });
        }

        let mut prev_txs = PrevTransactions::new();
        for (txid, _) in &spendable {
            if !prev_txs.contains_key(txid) {
                prev_txs.insert(*txid, self.find_transaction(txid)?);
            }
        }

        let mut tx = Transaction::new_transfer(sender.public_key_bytes().to_vec(), *to, spendable)?;
        tx.sign(sender, &prev_txs)?;

        if mine_now {
            return self.mine_transactions(vec![tx]).map(SendOutcome::Mined);
        }

        info!(txid = %tx.id_hex(), "transaction created");
        self.publish(LedgerEvent::TransactionCreated(tx.clone()));
        Ok(SendOutcome::Pending(tx))
    }
}
