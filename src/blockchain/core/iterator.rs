//! Walking a chain from its tip back to its first block.

use super::chain::{Block, ChainKind, TIP_KEY};
use super::ledger::Ledger;
use crate::crypto::Sha256Hash;
use crate::error::{ChainError, Result};
use crate::miner::validate_block;
use crate::persistence::{self, ReadTx};

pub(crate) fn load_block<T: ReadTx + ?Sized>(
    tx: &T,
    chain: ChainKind,
    hash: &Sha256Hash,
) -> Result<Block> {
    let data = tx.get(chain.bucket(), hash)?.ok_or_else(|| {
        ChainError::BlockNotFound(format!("{} on the {} chain", hex::encode(hash), chain))
    })?;
    Block::deserialize(&data)
}

pub(crate) fn tip_hash<T: ReadTx + ?Sized>(tx: &T, chain: ChainKind) -> Result<Option<Sha256Hash>> {
    match tx.get(chain.bucket(), TIP_KEY)? {
        None => Ok(None),
        Some(raw) => {
            let hash: Sha256Hash = raw.as_slice().try_into().map_err(|_| {
                ChainError::DatabaseError(format!("Corrupt tip entry for the {} chain", chain))
            })?;
            Ok(Some(hash))
        }
    }
}

pub(crate) fn read_tip<T: ReadTx + ?Sized>(tx: &T, chain: ChainKind) -> Result<Option<Block>> {
    match tip_hash(tx, chain)? {
        None => Ok(None),
        Some(hash) => load_block(tx, chain, &hash).map(Some),
    }
}

fn checked(block: Block, difficulty: u32) -> Result<Block> {
    if validate_block(&block, difficulty) {
        Ok(block)
    } else {
        Err(ChainError::InvalidProofOfWork(block.hash_hex()))
    }
}

/// Walk inside an open transaction.
pub(crate) struct BlockWalk<'a, T: ReadTx + ?Sized> {
    tx: &'a T,
    chain: ChainKind,
    difficulty: u32,
    next: Option<Sha256Hash>,
}

impl<'a, T: ReadTx + ?Sized> BlockWalk<'a, T> {
    pub(crate) fn new(tx: &'a T, chain: ChainKind, difficulty: u32) -> Result<Self> {
        Ok(BlockWalk {
            tx,
            chain,
            difficulty,
            next: tip_hash(tx, chain)?,
        })
    }
}

impl<T: ReadTx + ?Sized> Iterator for BlockWalk<'_, T> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        let block = load_block(self.tx, self.chain, &hash)
            .and_then(|block| checked(block, self.difficulty));
        if let Ok(block) = &block {
            self.next = block.prev_hash;
        }
        Some(block)
    }
}

/// Lazy iterator over a chain, newest block first. Each step reads one block in
/// its own read transaction and checks its proof of work; a block that fails
/// is yielded as `InvalidProofOfWork` and ends the walk.
pub struct ChainIterator<'a> {
    ledger: &'a Ledger,
    chain: ChainKind,
    next: Option<Sha256Hash>,
}

impl<'a> ChainIterator<'a> {
    pub(crate) fn new(ledger: &'a Ledger, chain: ChainKind) -> Result<Self> {
        let next = persistence::view(ledger.store(), |tx| tip_hash(tx, chain))?;
        Ok(ChainIterator { ledger, chain, next })
    }

    pub fn chain(&self) -> ChainKind {
        self.chain
    }
}

impl Iterator for ChainIterator<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        let chain = self.chain;
        let block = persistence::view(self.ledger.store(), |tx| load_block(tx, chain, &hash))
            .and_then(|block| checked(block, self.ledger.difficulty()));
        if let Ok(block) = &block {
            self.next = block.prev_hash;
        }
        Some(block)
    }
}
