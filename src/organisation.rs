//! Organisation registrations recorded on the organisation chain.

use crate::crypto::{Address, KeyPair, Sha256Hash};
use crate::error::{ChainError, Result};
use crate::record::{self, Signable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Manufacturer,
    Distributor,
    Retailer,
    Other(String),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "Admin"),
            Role::Manufacturer => write!(f, "Manufacturer"),
            Role::Distributor => write!(f, "Distributor"),
            Role::Retailer => write!(f, "Retailer"),
            Role::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for Role {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ChainError::InvalidOrganisation("Role cannot be empty".to_string()));
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "manufacturer" => Role::Manufacturer,
            "distributor" => Role::Distributor,
            "retailer" => Role::Retailer,
            _ => Role::Other(trimmed.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: Sha256Hash,
    pub name: String,
    pub gstin: String,
    pub prefix: String,
    pub role: Role,
    pub signature: Option<Vec<u8>>,
    pub pub_key: Vec<u8>,
    /// Public key of the admin that registered this organisation.
    pub admin_pub_key: Option<Vec<u8>>,
}

#[derive(Serialize)]
struct OrganisationPreimage<'a> {
    name: &'a str,
    gstin: &'a str,
    prefix: &'a str,
    role: &'a Role,
    pub_key: &'a [u8],
    admin_pub_key: &'a [u8],
}

impl Organisation {
    /// Draft registration awaiting an admin signature.
    pub fn new(
        name: impl Into<String>,
        pub_key: Vec<u8>,
        gstin: &str,
        prefix: impl Into<String>,
        role: Role,
    ) -> Self {
        Organisation {
            id: [0u8; 32],
            name: name.into(),
            gstin: gstin.trim().to_uppercase(),
            prefix: prefix.into(),
            role,
            signature: None,
            pub_key,
            admin_pub_key: None,
        }
    }

    /// The founding admin recorded in the genesis block. It is not signed.
    pub fn founder(name: impl Into<String>, pub_key: Vec<u8>, gstin: &str, prefix: impl Into<String>) -> Result<Self> {
        let mut org = Organisation::new(name, pub_key, gstin, prefix, Role::Admin);
        org.id = record::record_hash(&org, None)?;
        Ok(org)
    }

    /// Signs the registration on behalf of `admin`, whose address acts as the
    /// authorizing key.
    pub fn sign(&mut self, admin: &KeyPair) -> Result<()> {
        self.admin_pub_key = Some(admin.public_key_bytes().to_vec());
        record::sign_record(self, admin, &admin.address())
    }

    pub fn verify(&self, authorizing_key: &Address) -> bool {
        record::verify_record(self, authorizing_key)
    }

    pub fn validate_fields(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ChainError::InvalidOrganisation("Name cannot be empty".to_string()));
        }
        if self.gstin.is_empty() {
            return Err(ChainError::InvalidOrganisation("GSTIN cannot be empty".to_string()));
        }
        if self.prefix.is_empty() || self.prefix.contains('.') {
            return Err(ChainError::InvalidOrganisation(format!(
                "Prefix '{}' must be non-empty and must not contain '.'",
                self.prefix
            )));
        }
        if self.pub_key.is_empty() {
            return Err(ChainError::InvalidOrganisation("Public key cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }
}

impl Signable for Organisation {
    fn signing_bytes(&self, authorizing_key: Option<&Address>) -> Result<Vec<u8>> {
        let preimage = OrganisationPreimage {
            name: &self.name,
            gstin: &self.gstin,
            prefix: &self.prefix,
            role: &self.role,
            pub_key: &self.pub_key,
            admin_pub_key: authorizing_key.map(|k| k.as_slice()).unwrap_or(&[]),
        };
        Ok(bincode::serialize(&preimage)?)
    }

    fn verifying_key(&self) -> Option<&[u8]> {
        self.admin_pub_key.as_deref()
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

impl fmt::Display for Organisation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "--- Organisation {}:", self.id_hex())?;
        writeln!(f, "       Name:        {}", self.name)?;
        writeln!(f, "       GSTIN:       {}", self.gstin)?;
        writeln!(f, "       Prefix:      {}", self.prefix)?;
        writeln!(f, "       Role:        {}", self.role)?;
        writeln!(
            f,
            "       Signature:   {}",
            self.signature.as_deref().map(hex::encode).unwrap_or_default()
        )?;
        writeln!(f, "       PubKey:      {}", hex::encode(&self.pub_key))?;
        write!(
            f,
            "       AdminPubKey: {}",
            self.admin_pub_key.as_deref().map(hex::encode).unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_org() -> (KeyPair, Organisation) {
        let admin = KeyPair::generate().unwrap();
        let member = KeyPair::generate().unwrap();
        let mut org = Organisation::new(
            "Widgets Ltd",
            member.public_key_bytes().to_vec(),
            "27aapfu0939f1zv",
            "WID",
            Role::Manufacturer,
        );
        org.sign(&admin).unwrap();
        (admin, org)
    }

    #[test]
    fn test_gstin_is_upper_cased() {
        let org = Organisation::new("A", vec![2; 33], " 27abc ", "A", Role::Retailer);
        assert_eq!(org.gstin, "27ABC");
    }

    #[test]
    fn test_verify_with_signing_admin() {
        let (admin, org) = signed_org();
        assert!(org.verify(&admin.address()));
    }

    #[test]
    fn test_verify_with_other_key_fails() {
        let (_admin, org) = signed_org();
        let stranger = KeyPair::generate().unwrap();
        assert!(!org.verify(&stranger.address()));
    }

    #[test]
    fn test_mutated_fields_fail_verification() {
        let (admin, org) = signed_org();
        let key = admin.address();

        let mut tampered = org.clone();
        tampered.name.push('x');
        assert!(!tampered.verify(&key));

        let mut tampered = org.clone();
        tampered.role = Role::Admin;
        assert!(!tampered.verify(&key));

        let mut tampered = org.clone();
        tampered.prefix = "EVIL".to_string();
        assert!(!tampered.verify(&key));

        let mut tampered = org;
        tampered.id[0] ^= 0xff;
        assert!(!tampered.verify(&key));
    }

    #[test]
    fn test_unsigned_and_malformed_signatures_verify_false() {
        let founder = Organisation::founder("Acme", vec![2; 33], "GST", "ACM").unwrap();
        assert!(!founder.verify(&[0u8; 32]));

        let (admin, mut org) = signed_org();
        org.signature = Some(vec![1, 2, 3]);
        assert!(!org.verify(&admin.address()));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Manufacturer".parse::<Role>().unwrap(), Role::Manufacturer);
        assert_eq!("Auditor".parse::<Role>().unwrap(), Role::Other("Auditor".into()));
        assert!("  ".parse::<Role>().is_err());
    }

    #[test]
    fn test_prefix_with_dot_rejected() {
        let org = Organisation::new("A", vec![2; 33], "G", "A.B", Role::Retailer);
        assert!(org.validate_fields().is_err());
    }
}
