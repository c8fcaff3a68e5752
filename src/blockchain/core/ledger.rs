//! The ledger: three proof-of-work chains sharing one store.
//!
//! Chain tips live in storage under [`TIP_KEY`] and are re-read on every call, so
//! a `Ledger` holds no chain state of its own beyond the store handle, the
//! difficulty and its event subscribers.

use super::chain::{Block, BlockPayload, ChainKind, TIP_KEY};
use super::iterator::{load_block, read_tip, tip_hash, ChainIterator};
use super::query::{organisation_duplicate_in, require_role_in};
use super::state::{apply_block, UtxoSet};
use super::validation::validate_transactions;
use crate::crypto::{Address, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::events::{EventBus, LedgerEvent};
use crate::miner::{validate_block, validate_difficulty};
use crate::organisation::{Organisation, Role};
use crate::persistence::{self, Persistence, ReadTx, WriteTx};
use crate::product::Product;
use crate::transaction::Transaction;
use crossbeam_channel::Receiver;
use tracing::{info, warn};

pub struct Ledger {
    store: Box<dyn Persistence>,
    difficulty: u32,
    events: EventBus,
}

fn has_ledger<T: ReadTx + ?Sized>(tx: &T) -> Result<bool> {
    for chain in ChainKind::ALL {
        if tip_hash(tx, chain)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Stores `block` on `chain` and moves the tip. Returns `false` when a block
/// with the same hash is already stored.
fn append_in(
    tx: &mut dyn WriteTx,
    chain: ChainKind,
    block: &Block,
    difficulty: u32,
) -> Result<bool> {
    if block.kind() != chain {
        return Err(ChainError::InvalidBlock(format!(
            "A {} block cannot be appended to the {} chain",
            block.kind(),
            chain
        )));
    }

    let bucket = chain.bucket();
    if tx.get(bucket, &block.hash)?.is_some() {
        return Ok(false);
    }

    if !validate_block(block, difficulty) {
        return Err(ChainError::InvalidBlock(format!(
            "Block {} fails proof of work at difficulty {}",
            block.hash_hex(),
            difficulty
        )));
    }

    if let Some(tip) = read_tip(&*tx, chain)? {
        if block.height <= tip.height {
            return Err(ChainError::StaleBlock {
                height: block.height,
                tip_height: tip.height,
            });
        }
    }

    tx.put(bucket, &block.hash, &block.serialize()?)?;
    tx.put(bucket, TIP_KEY, &block.hash)?;

    if chain == ChainKind::Transactions {
        apply_block(tx, block)?;
    }
    Ok(true)
}

impl Ledger {
    /// Creates a new ledger whose organisation chain starts with `founder`.
    pub fn create(store: Box<dyn Persistence>, founder: Organisation, difficulty: u32) -> Result<Self> {
        validate_difficulty(difficulty)?;
        founder.validate_fields()?;
        if founder.role != Role::Admin {
            return Err(ChainError::InvalidOrganisation(format!(
                "The founding organisation must be an Admin, not {}",
                founder.role
            )));
        }

        let genesis = persistence::update(store.as_ref(), |tx| {
            if has_ledger(&*tx)? {
                return Err(ChainError::LedgerExists);
            }
            let block = Block::mine(BlockPayload::Organisation(founder), None, 0, difficulty)?;
            append_in(tx, ChainKind::Organisations, &block, difficulty)?;
            Ok(block)
        })?;

        info!(hash = %genesis.hash_hex(), difficulty, "created ledger");

        Ok(Ledger {
            store,
            difficulty,
            events: EventBus::new(),
        })
    }

    pub fn open(store: Box<dyn Persistence>, difficulty: u32) -> Result<Self> {
        validate_difficulty(difficulty)?;
        if !persistence::view(store.as_ref(), |tx| has_ledger(tx))? {
            return Err(ChainError::LedgerMissing);
        }
        Ok(Ledger {
            store,
            difficulty,
            events: EventBus::new(),
        })
    }

    pub fn store(&self) -> &dyn Persistence {
        self.store.as_ref()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn subscribe(&self) -> Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: LedgerEvent) {
        self.events.publish(event);
    }

    pub fn utxo_set(&self) -> UtxoSet<'_> {
        UtxoSet::new(self)
    }

    pub fn iter(&self, chain: ChainKind) -> Result<ChainIterator<'_>> {
        ChainIterator::new(self, chain)
    }

    pub fn tip(&self, chain: ChainKind) -> Result<Option<Block>> {
        persistence::view(self.store(), |tx| read_tip(tx, chain))
    }

    /// Height of the newest block on `chain`, `None` while it is empty.
    pub fn best_height(&self, chain: ChainKind) -> Result<Option<u64>> {
        Ok(self.tip(chain)?.map(|block| block.height))
    }

    pub fn get_block(&self, chain: ChainKind, hash: &Sha256Hash) -> Result<Block> {
        persistence::view(self.store(), |tx| load_block(tx, chain, hash))
    }

    /// Block hashes of `chain`, newest first.
    pub fn block_hashes(&self, chain: ChainKind) -> Result<Vec<Sha256Hash>> {
        self.iter(chain)?.map(|block| block.map(|b| b.hash)).collect()
    }

    /// Appends a block mined elsewhere. Re-appending a stored block is a no-op
    /// and returns `false`. A block that would not advance the tip is rejected.
    pub fn append(&self, chain: ChainKind, block: Block) -> Result<bool> {
        let difficulty = self.difficulty;
        let stored = persistence::update(self.store(), |tx| append_in(tx, chain, &block, difficulty))
            .inspect_err(|e| {
                warn!(chain = %chain, hash = %block.hash_hex(), error = %e, "rejected block");
            })?;

        if stored {
            info!(chain = %chain, height = block.height, hash = %block.hash_hex(), "appended block");
            self.publish(LedgerEvent::BlockAppended {
                chain,
                hash: block.hash,
                height: block.height,
            });
        } else {
            warn!(chain = %chain, hash = %block.hash_hex(), "block already stored");
        }
        Ok(stored)
    }

    /// Validates, mines on the current tip and appends, all in one write transaction.
    fn mine_with<F>(&self, payload: BlockPayload, check: F) -> Result<Block>
    where
        F: FnOnce(&dyn WriteTx) -> Result<()>,
    {
        let chain = payload.kind();
        let difficulty = self.difficulty;

        let block = persistence::update(self.store(), |tx| {
            check(&*tx)?;
            let (prev_hash, height) = match read_tip(&*tx, chain)? {
                Some(tip) => (Some(tip.hash), tip.height + 1),
                None => (None, 0),
            };
            let block = Block::mine(payload, prev_hash, height, difficulty)?;
            append_in(tx, chain, &block, difficulty)?;
            Ok(block)
        })?;

        info!(
            chain = %chain,
            height = block.height,
            nonce = block.nonce,
            hash = %block.hash_hex(),
            "mined block"
        );
        self.publish(LedgerEvent::BlockAppended {
            chain,
            hash: block.hash,
            height: block.height,
        });
        Ok(block)
    }

    /// Mines a transaction block. Every transaction must be well formed, signed
    /// by the owners of the outputs it spends, and spend only unspent outputs.
    pub fn mine_transactions(&self, transactions: Vec<Transaction>) -> Result<Block> {
        let difficulty = self.difficulty;
        let checked = transactions.clone();
        self.mine_with(BlockPayload::Transactions(transactions), move |tx| {
            validate_transactions(tx, &checked, difficulty)
        })
    }

    /// Mines a product block. `owner` must be a Manufacturer and every product
    /// must verify against it.
    pub fn mine_products(&self, products: Vec<Product>, owner: &Address) -> Result<Block> {
        if products.is_empty() {
            return Err(ChainError::InvalidProduct("No products to record".to_string()));
        }
        for product in &products {
            product.validate_fields()?;
            if !product.verify(owner) {
                return Err(ChainError::InvalidProduct(format!(
                    "Product {} ({}) is not signed by {}",
                    product.code,
                    product.name,
                    hex::encode(owner)
                )));
            }
        }
        let difficulty = self.difficulty;
        let owner = *owner;
        self.mine_with(BlockPayload::Products(products), move |tx| {
            require_role_in(tx, &owner, Role::Manufacturer, difficulty).map(|_| ())
        })
    }

    /// Mines an organisation block. `admin` must be an Admin, the registration
    /// must verify against it and must not reuse another organisation's GSTIN,
    /// prefix or public key.
    pub fn mine_organisation(&self, organisation: Organisation, admin: &Address) -> Result<Block> {
        organisation.validate_fields()?;
        if !organisation.verify(admin) {
            return Err(ChainError::InvalidOrganisation(format!(
                "Registration of {} is not signed by {}",
                organisation.name,
                hex::encode(admin)
            )));
        }

        let difficulty = self.difficulty;
        let candidate = organisation.clone();
        let admin = *admin;
        self.mine_with(BlockPayload::Organisation(organisation), move |tx| {
            require_role_in(tx, &admin, Role::Admin, difficulty)?;
            if organisation_duplicate_in(tx, &candidate, difficulty)? {
                return Err(ChainError::DuplicateOrganisation(format!(
                    "GSTIN {}, prefix {} or public key already registered",
                    candidate.gstin, candidate.prefix
                )));
            }
            Ok(())
        })
    }
}
