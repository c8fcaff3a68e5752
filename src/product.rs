//! Product definitions recorded on the product chain.

use crate::crypto::{Address, KeyPair, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::record::{self, Signable};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Sha256Hash,
    /// Manufacturer-scoped code, starting at 1.
    pub code: u64,
    pub name: String,
    pub signature: Option<Vec<u8>>,
    /// Public key of the manufacturer that owns this product.
    pub pub_key: Vec<u8>,
}

#[derive(Serialize)]
struct ProductPreimage<'a> {
    code: u64,
    name: &'a str,
    pub_key: &'a [u8],
}

impl Product {
    pub fn new(code: u64, name: impl Into<String>, pub_key: Vec<u8>) -> Self {
        Product {
            id: [0u8; 32],
            code,
            name: name.into(),
            signature: None,
            pub_key,
        }
    }

    /// Signs with the owner's key; the owner's address is the authorizing key.
    pub fn sign(&mut self, owner: &KeyPair) -> Result<()> {
        record::sign_record(self, owner, &owner.address())
    }

    pub fn verify(&self, owner: &Address) -> bool {
        record::verify_record(self, owner)
    }

    pub fn validate_fields(&self) -> Result<()> {
        if self.code == 0 {
            return Err(ChainError::InvalidProduct("Product codes start at 1".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(ChainError::InvalidProduct("Product name cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl Signable for Product {
    fn signing_bytes(&self, authorizing_key: Option<&Address>) -> Result<Vec<u8>> {
        let preimage = ProductPreimage {
            code: self.code,
            name: &self.name,
            pub_key: authorizing_key.map(|k| k.as_slice()).unwrap_or(&[]),
        };
        Ok(bincode::serialize(&preimage)?)
    }

    fn verifying_key(&self) -> Option<&[u8]> {
        Some(&self.pub_key)
    }

    fn id(&self) -> &Sha256Hash {
        &self.id
    }

    fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    fn set_signed(&mut self, id: Sha256Hash, signature: Vec<u8>) {
        self.id = id;
        self.signature = Some(signature);
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "--- Product {}:", hex::encode(self.id))?;
        writeln!(f, "       Name:      {}", self.name)?;
        writeln!(f, "       Code:      {}", self.code)?;
        writeln!(
            f,
            "       Signature: {}",
            self.signature.as_deref().map(hex::encode).unwrap_or_default()
        )?;
        write!(f, "       PubKey:    {}", hex::encode(&self.pub_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_product(owner: &KeyPair) -> Product {
        let mut product = Product::new(1, "Widget-1", owner.public_key_bytes().to_vec());
        product.sign(owner).unwrap();
        product
    }

    #[test]
    fn test_verify_with_owner() {
        let owner = KeyPair::generate().unwrap();
        let product = signed_product(&owner);
        assert!(product.verify(&owner.address()));
    }

    #[test]
    fn test_verify_with_other_owner_fails() {
        let owner = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let product = signed_product(&owner);
        assert!(!product.verify(&other.address()));
    }

    #[test]
    fn test_mutation_breaks_signature() {
        let owner = KeyPair::generate().unwrap();
        let product = signed_product(&owner);

        let mut tampered = product.clone();
        tampered.code = 2;
        assert!(!tampered.verify(&owner.address()));

        let mut tampered = product.clone();
        tampered.name = "Widget-9".to_string();
        assert!(!tampered.verify(&owner.address()));

        let mut tampered = product;
        tampered.pub_key = KeyPair::generate().unwrap().public_key_bytes().to_vec();
        assert!(!tampered.verify(&owner.address()));
    }

    #[test]
    fn test_same_definition_different_owner_has_different_id() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        assert_ne!(signed_product(&a).id, signed_product(&b).id);
    }

    #[test]
    fn test_unsigned_product_does_not_verify() {
        let owner = KeyPair::generate().unwrap();
        let product = Product::new(1, "Widget-1", owner.public_key_bytes().to_vec());
        assert!(!product.verify(&owner.address()));
    }
}
