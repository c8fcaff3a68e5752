//! Provenance lookups. All of them are linear scans over a chain.

use super::chain::ChainKind;
use super::iterator::BlockWalk;
use super::ledger::Ledger;
use crate::crypto::{hash_public_key, Address, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::organisation::{Organisation, Role};
use crate::persistence::ReadTx;
use crate::product::Product;
use crate::transaction::{ItemCode, Transaction};

pub trait ProvenanceQuery {
    fn find_transaction(&self, id: &Sha256Hash) -> Result<Transaction>;

    /// Product `code` signed by `owner`.
    fn find_product_by_code(&self, owner: &Address, code: u64) -> Result<Product>;

    /// One past the highest code in the newest product block holding any of
    /// `owner`'s products; 1 when the owner has none.
    fn next_product_code(&self, owner: &Address) -> Result<u64>;

    fn find_organisation_by_public_key(&self, pub_key: &[u8]) -> Result<Organisation>;

    fn role_of(&self, pub_key: &[u8]) -> Result<Role>;

    /// True when another organisation already uses the GSTIN, prefix or public key.
    fn is_organisation_duplicate(&self, organisation: &Organisation) -> Result<bool>;

    /// Next unused serial for `prefix.code`, counting coinbase outputs only.
    fn next_item_code(&self, prefix: &str, code: u64) -> Result<ItemCode>;

    /// Every registered organisation, newest first.
    fn organisations(&self) -> Result<Vec<Organisation>>;

    fn products_of(&self, owner: &Address) -> Result<Vec<Product>>;

    /// Every address that was ever sent `item`, newest first.
    fn item_history(&self, item: &str) -> Result<Vec<Address>>;

    fn current_holder(&self, item: &str) -> Result<Address>;
}

pub(crate) fn organisation_duplicate_in<T: ReadTx + ?Sized>(
    tx: &T,
    candidate: &Organisation,
    difficulty: u32,
) -> Result<bool> {
    for block in BlockWalk::new(tx, ChainKind::Organisations, difficulty)? {
        if let Some(org) = block?.payload.organisation() {
            if org.gstin == candidate.gstin
                || org.prefix == candidate.prefix
                || org.pub_key == candidate.pub_key
            {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Organisation whose public key hashes to `address`.
pub(crate) fn organisation_by_address_in<T: ReadTx + ?Sized>(
    tx: &T,
    address: &Address,
    difficulty: u32,
) -> Result<Organisation> {
    for block in BlockWalk::new(tx, ChainKind::Organisations, difficulty)? {
        if let Some(org) = block?.payload.organisation() {
            if &hash_public_key(&org.pub_key) == address {
                return Ok(org.clone());
            }
        }
    }
    Err(ChainError::OrganisationNotFound(hex::encode(address)))
}

/// Fails with `Unauthorized` unless `address` belongs to an organisation with `role`.
pub(crate) fn require_role_in<T: ReadTx + ?Sized>(
    tx: &T,
    address: &Address,
    role: Role,
    difficulty: u32,
) -> Result<Organisation> {
    let org = organisation_by_address_in(tx, address, difficulty)?;
    if org.role != role {
        return Err(ChainError::Unauthorized(format!(
            "{} is a {}, this needs a {}",
            org.name, org.role, role
        )));
    }
    Ok(org)
}

impl ProvenanceQuery for Ledger {
    fn find_transaction(&self, id: &Sha256Hash) -> Result<Transaction> {
        for block in self.iter(ChainKind::Transactions)? {
            if let Some(tx) = block?.payload.transactions().iter().find(|tx| &tx.id == id) {
                return Ok(tx.clone());
            }
        }
        Err(ChainError::TransactionNotFound(hex::encode(id)))
    }

    fn find_product_by_code(&self, owner: &Address, code: u64) -> Result<Product> {
        for block in self.iter(ChainKind::Products)? {
            if let Some(product) = block?
                .payload
                .products()
                .iter()
                .find(|p| p.code == code && p.verify(owner))
            {
                return Ok(product.clone());
            }
        }
        Err(ChainError::ProductNotFound(format!(
            "code {} of {}",
            code,
            hex::encode(owner)
        )))
    }

    fn next_product_code(&self, owner: &Address) -> Result<u64> {
        for block in self.iter(ChainKind::Products)? {
            let highest = block?
                .payload
                .products()
                .iter()
                .filter(|p| p.verify(owner))
                .map(|p| p.code)
                .max();
            if let Some(code) = highest {
                return Ok(code + 1);
            }
        }
        Ok(1)
    }

    fn find_organisation_by_public_key(&self, pub_key: &[u8]) -> Result<Organisation> {
        for block in self.iter(ChainKind::Organisations)? {
            if let Some(org) = block?.payload.organisation() {
                if org.pub_key == pub_key {
                    return Ok(org.clone());
                }
            }
        }
        Err(ChainError::OrganisationNotFound(hex::encode(pub_key)))
    }

    fn role_of(&self, pub_key: &[u8]) -> Result<Role> {
        Ok(self.find_organisation_by_public_key(pub_key)?.role)
    }

    fn is_organisation_duplicate(&self, organisation: &Organisation) -> Result<bool> {
        let difficulty = self.difficulty();
        crate::persistence::view(self.store(), |tx| {
            organisation_duplicate_in(tx, organisation, difficulty)
        })
    }

    fn next_item_code(&self, prefix: &str, code: u64) -> Result<ItemCode> {
        let mut highest = 0;
        for block in self.iter(ChainKind::Transactions)? {
            for tx in block?.payload.transactions().iter().filter(|tx| tx.is_coinbase()) {
                for item in tx.outputs.iter().filter_map(|out| out.item_code()) {
                    if item.prefix == prefix && item.code == code {
                        highest = highest.max(item.serial);
                    }
                }
            }
        }
        Ok(ItemCode::new(prefix, code, highest + 1))
    }

    fn organisations(&self) -> Result<Vec<Organisation>> {
        let mut orgs = Vec::new();
        for block in self.iter(ChainKind::Organisations)? {
            if let Some(org) = block?.payload.organisation() {
                orgs.push(org.clone());
            }
        }
        Ok(orgs)
    }

    fn products_of(&self, owner: &Address) -> Result<Vec<Product>> {
        let mut products = Vec::new();
        for block in self.iter(ChainKind::Products)? {
            products.extend(
                block?
                    .payload
                    .products()
                    .iter()
                    .filter(|p| p.verify(owner))
                    .cloned(),
            );
        }
        products.sort_by_key(|p| p.code);
        Ok(products)
    }

    fn item_history(&self, item: &str) -> Result<Vec<Address>> {
        let mut holders = Vec::new();
        for block in self.iter(ChainKind::Transactions)? {
            for tx in block?.payload.transactions().iter().rev() {
                holders.extend(
                    tx.outputs
                        .iter()
                        .filter(|out| out.item == item)
                        .map(|out| out.pub_key_hash),
                );
            }
        }
        Ok(holders)
    }

    fn current_holder(&self, item: &str) -> Result<Address> {
        self.utxo_set()
            .holder_of(item)?
            .ok_or_else(|| ChainError::ProductNotFound(format!("No one holds item {}", item)))
    }
}
