use crate::crypto::Sha256Hash;
use crate::error::{ChainError, Result};
use crate::merkle::merkle_root;
use crate::miner::ProofOfWork;
use crate::organisation::Organisation;
use crate::persistence::Bucket;
use crate::product::Product;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Key under which every chain bucket stores its tip hash.
pub const TIP_KEY: &[u8] = b"l";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainKind {
    Transactions,
    Products,
    Organisations,
}

impl ChainKind {
    pub const ALL: [ChainKind; 3] = [
        ChainKind::Transactions,
        ChainKind::Products,
        ChainKind::Organisations,
    ];

    pub fn bucket(&self) -> Bucket {
        match self {
            ChainKind::Transactions => Bucket::Transactions,
            ChainKind::Products => Bucket::Products,
            ChainKind::Organisations => Bucket::Organisations,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChainKind::Transactions => "transactions",
            ChainKind::Products => "products",
            ChainKind::Organisations => "organisations",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChainKind {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transactions" | "tx" => Ok(ChainKind::Transactions),
            "products" => Ok(ChainKind::Products),
            "organisations" | "organizations" | "orgs" => Ok(ChainKind::Organisations),
            other => Err(ChainError::InvalidBlock(format!("Unknown chain '{}'", other))),
        }
    }
}

/// Exactly one kind of record per block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockPayload {
    Transactions(Vec<Transaction>),
    Products(Vec<Product>),
    Organisation(Organisation),
}

impl BlockPayload {
    pub fn kind(&self) -> ChainKind {
        match self {
            BlockPayload::Transactions(_) => ChainKind::Transactions,
            BlockPayload::Products(_) => ChainKind::Products,
            BlockPayload::Organisation(_) => ChainKind::Organisations,
        }
    }

    /// Items committed to by the Merkle root, each serialized on its own.
    pub fn serialized_items(&self) -> Result<Vec<Vec<u8>>> {
        let items = match self {
            BlockPayload::Transactions(txs) => txs
                .iter()
                .map(bincode::serialize)
                .collect::<std::result::Result<Vec<_>, _>>()?,
            BlockPayload::Products(products) => products
                .iter()
                .map(bincode::serialize)
                .collect::<std::result::Result<Vec<_>, _>>()?,
            BlockPayload::Organisation(org) => vec![bincode::serialize(org)?],
        };
        Ok(items)
    }

    pub fn transactions(&self) -> &[Transaction] {
        match self {
            BlockPayload::Transactions(txs) => txs,
            _ => &[],
        }
    }

    pub fn products(&self) -> &[Product] {
        match self {
            BlockPayload::Products(products) => products,
            _ => &[],
        }
    }

    pub fn organisation(&self) -> Option<&Organisation> {
        match self {
            BlockPayload::Organisation(org) => Some(org),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BlockPayload::Transactions(txs) => txs.len(),
            BlockPayload::Products(products) => products.len(),
            BlockPayload::Organisation(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub payload: BlockPayload,
    /// `None` only for the first block of a chain.
    pub prev_hash: Option<Sha256Hash>,
    pub hash: Sha256Hash,
    pub nonce: u64,
    pub height: u64,
}

impl Block {
    /// Builds a block on `prev_hash` and runs proof of work over it.
    pub fn mine(
        payload: BlockPayload,
        prev_hash: Option<Sha256Hash>,
        height: u64,
        difficulty: u32,
    ) -> Result<Self> {
        let mut block = Block {
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload,
            prev_hash,
            hash: [0u8; 32],
            nonce: 0,
            height,
        };

        let (nonce, hash) = ProofOfWork::new(&block, difficulty)?.run()?;
        block.nonce = nonce;
        block.hash = hash;
        Ok(block)
    }

    pub fn merkle_root(&self) -> Result<Sha256Hash> {
        Ok(merkle_root(&self.payload.serialized_items()?))
    }

    pub fn kind(&self) -> ChainKind {
        self.payload.kind()
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "============ Block {} ============", self.hash_hex())?;
        writeln!(f, "Chain:       {}", self.kind())?;
        writeln!(f, "Height:      {}", self.height)?;
        writeln!(
            f,
            "Prev. block: {}",
            self.prev_hash.map(hex::encode).unwrap_or_default()
        )?;
        writeln!(f, "Timestamp:   {}", self.timestamp)?;
        writeln!(f, "Nonce:       {}", self.nonce)?;
        match &self.payload {
            BlockPayload::Transactions(txs) => {
                for tx in txs {
                    write!(f, "{}", tx)?;
                }
            }
            BlockPayload::Products(products) => {
                for product in products {
                    writeln!(f, "{}", product)?;
                }
            }
            BlockPayload::Organisation(org) => writeln!(f, "{}", org)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_block_roundtrips_through_storage_encoding() {
        let owner = KeyPair::generate().unwrap();
        let tx = Transaction::new_coinbase(owner.address(), vec!["PFX.1.1".into()]).unwrap();
        let block = Block::mine(BlockPayload::Transactions(vec![tx]), None, 0, 4).unwrap();

        let restored = Block::deserialize(&block.serialize().unwrap()).unwrap();
        assert_eq!(restored, block);
        assert_eq!(restored.kind(), ChainKind::Transactions);
    }

    #[test]
    fn test_merkle_root_tracks_payload() {
        let a = BlockPayload::Products(vec![Product::new(1, "A", vec![2; 33])]);
        let b = BlockPayload::Products(vec![Product::new(1, "B", vec![2; 33])]);
        let block_a = Block::mine(a.clone(), None, 0, 4).unwrap();
        let block_b = Block::mine(b, None, 0, 4).unwrap();
        assert_ne!(block_a.merkle_root().unwrap(), block_b.merkle_root().unwrap());

        let again = Block::mine(a, None, 0, 4).unwrap();
        assert_eq!(block_a.merkle_root().unwrap(), again.merkle_root().unwrap());
    }

    #[test]
    fn test_empty_payload_is_mineable() {
        let block = Block::mine(BlockPayload::Products(vec![]), None, 0, 4).unwrap();
        assert!(block.payload.is_empty());
        assert!(crate::miner::validate_block(&block, 4));
    }

    #[test]
    fn test_chain_kind_parsing() {
        assert_eq!("Products".parse::<ChainKind>().unwrap(), ChainKind::Products);
        assert_eq!("orgs".parse::<ChainKind>().unwrap(), ChainKind::Organisations);
        assert!("blocks".parse::<ChainKind>().is_err());
        assert_eq!(ChainKind::Transactions.bucket().name(), "blocks");
    }
}
