//! Merkle commitment over a block payload.
//!
//! Only the root is used: it binds the serialized payload items into the
//! proof-of-work preimage. No inclusion proofs are produced.

use crate::crypto::{sha256, Sha256Hash};

fn hash_pair(left: &Sha256Hash, right: &Sha256Hash) -> Sha256Hash {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    sha256(&buf)
}

/// Computes the Merkle root of `items`.
///
/// Every item is hashed into a leaf. Each level duplicates its last node when
/// the count is odd, then hashes adjacent pairs. The leaf level is always
/// combined at least once, so a single item yields `H(leaf || leaf)`. An empty
/// slice is treated as one empty item.
pub fn merkle_root<T: AsRef<[u8]>>(items: &[T]) -> Sha256Hash {
    let mut level: Vec<Sha256Hash> = if items.is_empty() {
        vec![sha256(&[])]
    } else {
        items.iter().map(|item| sha256(item.as_ref())).collect()
    };

    loop {
        if level.len() % 2 != 0 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }

        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();

        if level.len() == 1 {
            return level[0];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_item_is_duplicated() {
        let leaf = sha256(b"org");
        assert_eq!(merkle_root(&[b"org".to_vec()]), hash_pair(&leaf, &leaf));
    }

    #[test]
    fn test_empty_payload_uses_placeholder_leaf() {
        let empty: Vec<Vec<u8>> = Vec::new();
        let leaf = sha256(&[]);
        assert_eq!(merkle_root(&empty), hash_pair(&leaf, &leaf));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let items = [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        let (a, b, c) = (sha256(b"a"), sha256(b"b"), sha256(b"c"));
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        assert_eq!(merkle_root(&items), expected);
    }

    #[test]
    fn test_root_is_stable_for_identical_items() {
        let first = vec![b"widget-1".to_vec(), b"widget-2".to_vec()];
        let second = first.clone();
        assert_eq!(merkle_root(&first), merkle_root(&second));
    }

    #[test]
    fn test_root_changes_when_any_item_changes() {
        let items = vec![b"w1".to_vec(), b"w2".to_vec(), b"w3".to_vec(), b"w4".to_vec()];
        let root = merkle_root(&items);
        for i in 0..items.len() {
            let mut changed = items.clone();
            changed[i].push(b'!');
            assert_ne!(merkle_root(&changed), root, "item {} did not affect the root", i);
        }
    }

    #[test]
    fn test_order_matters() {
        let items = vec![b"x".to_vec(), b"y".to_vec()];
        let swapped = vec![b"y".to_vec(), b"x".to_vec()];
        assert_ne!(merkle_root(&items), merkle_root(&swapped));
    }
}
