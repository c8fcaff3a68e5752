// core.rs splits the ledger into blocks, the engine, chain walking, the utxo
// index, validation, provenance queries and role-checked workflows.
pub mod actions;
pub mod chain;
pub mod iterator;
pub mod ledger;
pub mod query;
pub mod state;
pub mod validation;

pub use actions::*;
pub use chain::*;
pub use iterator::ChainIterator;
pub use ledger::*;
pub use query::ProvenanceQuery;
pub use state::{Spendable, UtxoSet};
pub use validation::validate_no_double_spend;
