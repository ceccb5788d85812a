//! Pipeline storage abstractions.
//!
//! Every engine entry point runs inside exactly one [`StoreTx`], opened
//! per project with [`PipelineStore::begin`]. A transaction sees its own
//! writes, and either all of them are committed or none are.
//!
//! Backends:
//! - [`memory::InMemoryPipelineStore`]: deterministic reference backend.
//!   Transactions on the same project are serialized by a per-project
//!   async mutex and work on a private copy of the project's rows.
//! - `postgres::PostgresPipelineStore` (feature `postgres`): transactions
//!   serialized per scope by a transaction-scoped advisory lock.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryPipelineStore, MemoryTx};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresPipelineStore, PostgresTx};
pub use traits::{PipelineStore, StoreTx, TxScope};
