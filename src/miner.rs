//! Proof-of-work mining and validation.
//!
//! The work preimage is `prev_hash || merkle_root || timestamp || difficulty || nonce`
//! with the three integers as 8-byte big-endian values. A block without a
//! parent contributes no `prev_hash` bytes. A digest is accepted when it is
//! below `2^(256 - difficulty)`.

use crate::blockchain::Block;
use crate::crypto::{sha256, Sha256Hash};
use crate::error::{ChainError, Result};
use tracing::debug;

pub const DEFAULT_DIFFICULTY: u32 = 16;
pub const MAX_DIFFICULTY: u32 = 255;

pub fn validate_difficulty(difficulty: u32) -> Result<()> {
    if difficulty == 0 || difficulty > MAX_DIFFICULTY {
        return Err(ChainError::InvalidConfig(format!(
            "Difficulty must be between 1 and {}, got {}",
            MAX_DIFFICULTY, difficulty
        )));
    }
    Ok(())
}

/// Largest accepted digest for `difficulty` leading zero bits, i.e. `2^(256 - d) - 1`.
pub fn hash_to_target(difficulty: u32) -> Sha256Hash {
    let mut target = [0xFF; 32];
    let leading_zeros = (difficulty / 8).min(32) as usize;
    let partial_bits = difficulty % 8;

    for byte in target.iter_mut().take(leading_zeros) {
        *byte = 0;
    }

    if leading_zeros < 32 && partial_bits > 0 {
        target[leading_zeros] = 0xFF >> partial_bits;
    }
    target
}

#[derive(Debug, Clone)]
pub struct ProofOfWork {
    prev_hash: Option<Sha256Hash>,
    merkle_root: Sha256Hash,
    timestamp: i64,
    difficulty: u32,
    target: Sha256Hash,
}

impl ProofOfWork {
    pub fn new(block: &Block, difficulty: u32) -> Result<Self> {
        validate_difficulty(difficulty)?;
        Ok(ProofOfWork {
            prev_hash: block.prev_hash,
            merkle_root: block.merkle_root()?,
            timestamp: block.timestamp,
            difficulty,
            target: hash_to_target(difficulty),
        })
    }

    pub fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(32 + 32 + 24);
        if let Some(prev) = &self.prev_hash {
            data.extend_from_slice(prev);
        }
        data.extend_from_slice(&self.merkle_root);
        data.extend_from_slice(&self.timestamp.to_be_bytes());
        data.extend_from_slice(&(self.difficulty as u64).to_be_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> Sha256Hash {
        sha256(&self.prepare_data(nonce))
    }

    /// Byte-wise comparison of 32-byte arrays is a big-endian integer comparison.
    pub fn meets_target(&self, hash: &Sha256Hash) -> bool {
        hash <= &self.target
    }

    /// Tries nonces `0..max_nonce`. `None` when none of them meets the target.
    pub fn run_bounded(&self, max_nonce: u64) -> Option<(u64, Sha256Hash)> {
        let found = (0..max_nonce).find_map(|nonce| self.attempt(nonce));
        if found.is_none() {
            debug!(max_nonce, difficulty = self.difficulty, "nonce budget exhausted");
        }
        found
    }

    /// Searches the whole nonce space.
    pub fn run(&self) -> Result<(u64, Sha256Hash)> {
        let (nonce, hash) = (0..=u64::MAX)
            .find_map(|nonce| self.attempt(nonce))
            .ok_or_else(|| {
                ChainError::InvalidBlock(format!(
                    "Nonce space exhausted at difficulty {}",
                    self.difficulty
                ))
            })?;
        debug!(nonce, difficulty = self.difficulty, hash = %hex::encode(hash), "proof of work found");
        Ok((nonce, hash))
    }

    fn attempt(&self, nonce: u64) -> Option<(u64, Sha256Hash)> {
        let hash = self.hash_with_nonce(nonce);
        self.meets_target(&hash).then_some((nonce, hash))
    }

    /// Recomputes the digest from the block's stored nonce. The stored hash must
    /// match it and meet the target.
    pub fn validate(&self, block: &Block) -> bool {
        let hash = self.hash_with_nonce(block.nonce);
        hash == block.hash && self.meets_target(&hash)
    }
}

/// Checks a stored block's proof of work. False on any failure, including an
/// out-of-range difficulty or an unserializable payload.
pub fn validate_block(block: &Block, difficulty: u32) -> bool {
    match ProofOfWork::new(block, difficulty) {
        Ok(pow) => pow.validate(block),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::BlockPayload;
    use crate::product::Product;

    const TEST_DIFFICULTY: u32 = 8;

    fn mined_block() -> Block {
        let payload = BlockPayload::Products(vec![Product::new(1, "Widget", vec![2; 33])]);
        Block::mine(payload, Some([7u8; 32]), 1, TEST_DIFFICULTY).unwrap()
    }

    #[test]
    fn test_target_bits() {
        let t = hash_to_target(1);
        assert_eq!(t[0], 0x7F);
        assert!(t[1..].iter().all(|b| *b == 0xFF));

        let t = hash_to_target(16);
        assert_eq!(&t[..2], &[0, 0]);
        assert_eq!(t[2], 0xFF);

        let t = hash_to_target(255);
        assert!(t[..31].iter().all(|b| *b == 0));
        assert_eq!(t[31], 0x01);
    }

    #[test]
    fn test_difficulty_range() {
        assert!(validate_difficulty(0).is_err());
        assert!(validate_difficulty(1).is_ok());
        assert!(validate_difficulty(255).is_ok());
        assert!(validate_difficulty(256).is_err());
    }

    #[test]
    fn test_mined_block_validates() {
        let block = mined_block();
        assert!(validate_block(&block, TEST_DIFFICULTY));
        assert_eq!(block.hash[0], 0, "8 bits of work means a leading zero byte");
    }

    #[test]
    fn test_tampering_breaks_validation() {
        let block = mined_block();

        let mut tampered = block.clone();
        tampered.nonce = tampered.nonce.wrapping_add(1);
        assert!(!validate_block(&tampered, TEST_DIFFICULTY));

        let mut tampered = block.clone();
        tampered.timestamp += 1;
        assert!(!validate_block(&tampered, TEST_DIFFICULTY));

        let mut tampered = block.clone();
        tampered.prev_hash = None;
        assert!(!validate_block(&tampered, TEST_DIFFICULTY));

        let mut tampered = block.clone();
        tampered.hash[31] ^= 1;
        assert!(!validate_block(&tampered, TEST_DIFFICULTY));

        // The difficulty is part of the preimage.
        assert!(!validate_block(&block, TEST_DIFFICULTY + 1));
    }

    #[test]
    fn test_missing_parent_adds_no_bytes() {
        let mut block = mined_block();
        let with_parent = ProofOfWork::new(&block, TEST_DIFFICULTY).unwrap();
        block.prev_hash = None;
        let without_parent = ProofOfWork::new(&block, TEST_DIFFICULTY).unwrap();
        assert_eq!(
            with_parent.prepare_data(0).len(),
            without_parent.prepare_data(0).len() + 32
        );
    }

    #[test]
    fn test_bounded_search() {
        let block = mined_block();
        let pow = ProofOfWork::new(&block, TEST_DIFFICULTY).unwrap();
        assert!(pow.run_bounded(0).is_none());

        let (nonce, hash) = pow.run_bounded(block.nonce + 1).unwrap();
        assert_eq!(nonce, block.nonce);
        assert_eq!(hash, block.hash);
    }
}
