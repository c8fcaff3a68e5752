//! TraceChain - A permissioned provenance ledger for supply chains
//!
//! # Architecture
//!
//! Three proof-of-work chains share one transactional store: organisation
//! registrations, product definitions, and transactions that issue and move
//! individual items.
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the ledger engine, UTXO index, queries and workflows
//! - [`transaction`] - Item transfer transactions
//! - [`organisation`] - Organisation registrations
//! - [`product`] - Product definitions
//! - [`record`] - Signing scheme shared by organisations and products
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work mining and validation
//! - [`merkle`] - Merkle commitment over block payloads
//!
//! ## Cryptography
//! - [`crypto`] - Hashing, addresses and signatures (secp256k1)
//!
//! ## State Management
//! - [`persistence`] - Bucketed key/value store (SQLite or in memory)
//! - [`wallet`] - Wallet file
//!
//! ## Integration
//! - [`events`] - Notifications for a peer layer
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod organisation;
pub mod product;
pub mod record;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod merkle;
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;
pub mod wallet;

// ============================================================================
// Integration
// ============================================================================
pub mod events;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
