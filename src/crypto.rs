//! Cryptographic primitives for TraceChain

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

pub type Sha256Hash = [u8; 32];

/// Public key hash of a wallet: SHA-256 of the compressed public key.
/// Locks transaction outputs and serves as the authorizing key of signed records.
pub type Address = [u8; 32];

pub fn sha256(data: &[u8]) -> Sha256Hash {
    Sha256::digest(data).into()
}

/// Hashes raw public key bytes into the address they control.
pub fn hash_public_key(public_key: &[u8]) -> Address {
    sha256(public_key)
}

/// Convert an address to a hex string for display.
pub fn address_to_hex(addr: &Address) -> String {
    hex::encode(addr)
}

/// Convert a hex string to an address.
pub fn address_from_hex(hex_str: &str) -> Result<Address, ChainError> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| ChainError::InvalidAddress(format!("{}: {}", hex_str, e)))?;
    if bytes.len() != 32 {
        return Err(ChainError::InvalidAddress(format!(
            "Address must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    bytes
        .try_into()
        .map_err(|_| ChainError::InvalidAddress("Failed to convert bytes into address".to_string()))
}

/// Address validation predicate used by the CLI before touching the ledger.
pub fn validate_address(address: &str) -> bool {
    address_from_hex(address).is_ok()
}

/// Decodes a hex encoded compressed public key and checks that it lies on the curve.
pub fn public_key_from_hex(hex_str: &str) -> Result<Vec<u8>, ChainError> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key hex: {}", e)))?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;
    Ok(bytes)
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Result<Self, ChainError> {
        let secret_key = SecretKey::new(&mut OsRng);
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                ChainError::CryptoError(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                ChainError::CryptoError(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_hex(hex_str: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| ChainError::CryptoError(format!("Invalid secret key hex: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Computes the address (SHA-256 hash of the compressed public key).
    pub fn address(&self) -> Address {
        hash_public_key(&self.public_key_bytes())
    }

    pub fn address_hex(&self) -> String {
        address_to_hex(&self.address())
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Signs a 32-byte digest and returns the raw `r || s` signature.
    pub fn sign_digest(&self, digest: &Sha256Hash) -> [u8; COMPACT_SIGNATURE_SIZE] {
        let message = Message::from_digest(*digest);
        SECP256K1_CONTEXT
            .sign_ecdsa(&message, &self.secret_key)
            .serialize_compact()
    }
}

/// Verifies a raw `r || s` signature over a 32-byte digest.
pub fn verify_digest(
    public_key_bytes: &[u8],
    digest: &Sha256Hash,
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))?;
    let message = Message::from_digest(*digest);
    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let keypair = KeyPair::generate().unwrap();
        assert_eq!(keypair.public_key_bytes().len(), PUBLIC_KEY_SIZE);
        assert_eq!(keypair.secret_key.as_ref().len(), SECRET_KEY_SIZE);
    }

    #[test]
    fn test_address_roundtrips_through_hex() {
        let keypair = KeyPair::generate().unwrap();
        let hex_addr = keypair.address_hex();
        assert_eq!(hex_addr.len(), 64);
        assert!(validate_address(&hex_addr));
        assert_eq!(address_from_hex(&hex_addr).unwrap(), keypair.address());
    }

    #[test]
    fn test_invalid_addresses_rejected() {
        assert!(!validate_address(""));
        assert!(!validate_address("not-hex"));
        assert!(!validate_address("abcd"));
        assert!(matches!(
            address_from_hex("abcd"),
            Err(ChainError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_sign_and_verify_digest() {
        let keypair = KeyPair::generate().unwrap();
        let digest = sha256(b"Hello, TraceChain!");
        let signature = keypair.sign_digest(&digest);

        assert!(verify_digest(&keypair.public_key_bytes(), &digest, &signature).is_ok());
        assert_eq!(signature.len(), COMPACT_SIGNATURE_SIZE);
    }

    #[test]
    fn test_wrong_key_fails() {
        let keypair1 = KeyPair::generate().unwrap();
        let keypair2 = KeyPair::generate().unwrap();
        let digest = sha256(b"Test message");
        let signature = keypair1.sign_digest(&digest);

        let result = verify_digest(&keypair2.public_key_bytes(), &digest, &signature);
        assert_eq!(
            result.unwrap_err().to_string(),
            "Cryptographic error: Signature verification failed"
        );
    }

    #[test]
    fn test_invalid_key_or_sig_length_check() {
        let keypair = KeyPair::generate().unwrap();
        let digest = sha256(b"Test");
        let signature = keypair.sign_digest(&digest);
        let pubkey_bytes = keypair.public_key_bytes();

        let result = verify_digest(&pubkey_bytes[1..], &digest, &signature);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Public key must be exactly"));

        let result = verify_digest(&pubkey_bytes, &digest, &signature[1..]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Signature must be exactly"));
    }

    #[test]
    fn test_secret_hex_restores_same_address() {
        let keypair = KeyPair::generate().unwrap();
        let restored = KeyPair::from_secret_hex(&keypair.secret_key_hex()).unwrap();
        assert_eq!(restored.address(), keypair.address());
    }

    #[test]
    fn test_public_key_from_hex() {
        let keypair = KeyPair::generate().unwrap();
        let encoded = hex::encode(keypair.public_key_bytes());
        assert_eq!(
            public_key_from_hex(&encoded).unwrap(),
            keypair.public_key_bytes().to_vec()
        );
        assert!(public_key_from_hex("00ff").is_err());
    }
}
