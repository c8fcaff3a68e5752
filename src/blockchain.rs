// Thin re-export module: implementation is in `blockchain/core.rs`, split by
// responsibility (blocks, ledger engine, utxo index, queries, workflows).

pub mod core;
pub use core::*;
