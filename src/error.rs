//! Error types for TraceChain

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    // Validation failures
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Duplicate organisation: {0}")]
    DuplicateOrganisation(String),
    #[error("Not authorized to perform this action: {0}")]
    Unauthorized(String),
    #[error("Invalid product: {0}")]
    InvalidProduct(String),
    #[error("Invalid organisation: {0}")]
    InvalidOrganisation(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Not enough items: wanted {wanted}, found {found}")]
    InsufficientItems { wanted: usize, found: usize },
    #[error("Double spend detected: {0}")]
    DoubleSpendDetected(String),
    #[error("Stale block at height {height}: tip is at height {tip_height}")]
    StaleBlock { height: u64, tip_height: u64 },
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    // Lookups
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Organisation not found: {0}")]
    OrganisationNotFound(String),
    #[error("Product not found: {0}")]
    ProductNotFound(String),
    #[error("Block not found: {0}")]
    BlockNotFound(String),
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    // Storage
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Bincode error: {0}")]
    BincodeError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Ledger already exists")]
    LedgerExists,
    #[error("No existing ledger found, create one first")]
    LedgerMissing,

    // Corruption
    #[error("Invalid proof of work for block {0}")]
    InvalidProofOfWork(String),
}

impl ChainError {
    /// True for lookups that found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChainError::TransactionNotFound(_)
                | ChainError::OrganisationNotFound(_)
                | ChainError::ProductNotFound(_)
                | ChainError::BlockNotFound(_)
                | ChainError::WalletNotFound(_)
        )
    }

    /// True for rejected input that left the ledger untouched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChainError::InvalidAddress(_)
                | ChainError::DuplicateOrganisation(_)
                | ChainError::Unauthorized(_)
                | ChainError::InvalidProduct(_)
                | ChainError::InvalidOrganisation(_)
                | ChainError::InvalidTransaction(_)
                | ChainError::InsufficientItems { .. }
                | ChainError::DoubleSpendDetected(_)
                | ChainError::StaleBlock { .. }
                | ChainError::InvalidBlock(_)
                | ChainError::InvalidConfig(_)
                | ChainError::CryptoError(_)
        )
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::BincodeError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ChainError::TransactionNotFound("ab".into()).is_not_found());
        assert!(!ChainError::TransactionNotFound("ab".into()).is_validation());
        assert!(ChainError::Unauthorized("role".into()).is_validation());
        assert!(!ChainError::DatabaseError("disk".into()).is_validation());
        assert!(!ChainError::DatabaseError("disk".into()).is_not_found());
    }

    #[test]
    fn test_display_messages() {
        let err = ChainError::InsufficientItems { wanted: 2, found: 1 };
        assert_eq!(err.to_string(), "Not enough items: wanted 2, found 1");
        assert_eq!(
            ChainError::LedgerExists.to_string(),
            "Ledger already exists"
        );
    }
}
