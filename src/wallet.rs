//! Key storage for the CLI: one JSON file per node holding every wallet by address.

use crate::crypto::{validate_address, KeyPair};
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// What the ledger side needs from a key store.
pub trait WalletStore {
    fn get_wallet(&self, address: &str) -> Result<KeyPair>;
    fn addresses(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub name: Option<String>,
    /// Hex encoded public key hash.
    pub address: String,
    pub secret_key_hex: String,
    pub public_key_hex: String,
    /// RFC 3339 creation time.
    pub created: String,
}

impl Wallet {
    pub fn new(name: Option<String>) -> Result<Self> {
        Ok(Self::from_keypair(&KeyPair::generate()?, name))
    }

    pub fn from_keypair(keypair: &KeyPair, name: Option<String>) -> Self {
        Wallet {
            name,
            address: keypair.address_hex(),
            secret_key_hex: keypair.secret_key_hex(),
            public_key_hex: hex::encode(keypair.public_key_bytes()),
            created: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuilds the key pair and checks it still matches the stored address.
    pub fn keypair(&self) -> Result<KeyPair> {
        let keypair = KeyPair::from_secret_hex(&self.secret_key_hex)?;
        if keypair.address_hex() != self.address {
            return Err(ChainError::CryptoError(format!(
                "Secret key does not belong to wallet {}",
                self.address
            )));
        }
        Ok(keypair)
    }
}

fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// All wallets of one node, keyed by address.
#[derive(Debug)]
pub struct Wallets {
    path: PathBuf,
    wallets: BTreeMap<String, Wallet>,
}

impl Wallets {
    /// Loads the wallet file at `path`; a missing file is an empty set.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let wallets = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        Ok(Wallets { path, wallets })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Generates a wallet, persists the file and returns the new address.
    pub fn create_wallet(&mut self, name: Option<String>) -> Result<String> {
        let wallet = Wallet::new(name)?;
        let address = wallet.address.clone();
        self.wallets.insert(address.clone(), wallet);
        self.save()?;
        Ok(address)
    }

    pub fn wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address.trim())
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomically(&self.path, &self.wallets)
    }
}

impl WalletStore for Wallets {
    fn get_wallet(&self, address: &str) -> Result<KeyPair> {
        if !validate_address(address) {
            return Err(ChainError::InvalidAddress(address.to_string()));
        }
        self.wallet(address)
            .ok_or_else(|| ChainError::WalletNotFound(address.to_string()))?
            .keypair()
    }

    fn addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }
}
