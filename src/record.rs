//! Content-addressed, signed records.
//!
//! Organisations and products share one signing scheme: the record identity is
//! the SHA-256 of a preimage in which the "authorizer" slot holds the key hash
//! of whoever asserts the record. The identity is then signed with ECDSA. The
//! authorizing key is a parameter of signing and verification only; it is never
//! written into the record.

use crate::crypto::{hash_public_key, sha256, verify_digest, Address, KeyPair, Sha256Hash};
use crate::error::Result;

pub trait Signable {
    /// Serialized preimage with identity and signature left out and the
    /// authorizer slot filled with `authorizing_key` (empty when `None`).
    fn signing_bytes(&self, authorizing_key: Option<&Address>) -> Result<Vec<u8>>;

    /// Public key the signature is checked against.
    fn verifying_key(&self) -> Option<&[u8]>;

    fn id(&self) -> &Sha256Hash;

    fn signature(&self) -> Option<&[u8]>;

    fn set_signed(&mut self, id: Sha256Hash, signature: Vec<u8>);
}

/// Identity hash of `record` as asserted by `authorizing_key`.
pub fn record_hash<R: Signable + ?Sized>(
    record: &R,
    authorizing_key: Option<&Address>,
) -> Result<Sha256Hash> {
    Ok(sha256(&record.signing_bytes(authorizing_key)?))
}

/// Computes the identity under `authorizing_key`, signs it and stores both.
pub fn sign_record<R: Signable + ?Sized>(
    record: &mut R,
    keypair: &KeyPair,
    authorizing_key: &Address,
) -> Result<()> {
    let id = record_hash(record, Some(authorizing_key))?;
    let signature = keypair.sign_digest(&id);
    record.set_signed(id, signature.to_vec());
    Ok(())
}

/// Recomputes the identity under `authorizing_key` and checks the stored id
/// and signature. The verifying key must hash to `authorizing_key`. Never
/// panics: unsigned or malformed records verify false.
pub fn verify_record<R: Signable + ?Sized>(record: &R, authorizing_key: &Address) -> bool {
    let (signature, verifying_key) = match (record.signature(), record.verifying_key()) {
        (Some(sig), Some(key)) if !sig.is_empty() => (sig, key),
        _ => return false,
    };
    if &hash_public_key(verifying_key) != authorizing_key {
        return false;
    }

    let id = match record_hash(record, Some(authorizing_key)) {
        Ok(id) => id,
        Err(_) => return false,
    };
    if &id != record.id() {
        return false;
    }

    verify_digest(verifying_key, &id, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Product;

    #[test]
    fn test_signer_must_own_the_authorizing_address() {
        let maker = KeyPair::generate().unwrap();
        let stranger = KeyPair::generate().unwrap();

        let mut forged = Product::new(50, "Knock-off", stranger.public_key_bytes().to_vec());
        sign_record(&mut forged, &stranger, &maker.address()).unwrap();

        assert_eq!(forged.id, record_hash(&forged, Some(&maker.address())).unwrap());
        assert!(!verify_record(&forged, &maker.address()));
        assert!(!verify_record(&forged, &stranger.address()));
    }
}
