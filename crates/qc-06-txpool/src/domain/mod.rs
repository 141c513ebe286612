//! # Domain Layer - Build-Lease Pool
//!
//! Pure state and rules; no I/O.
//!
//! ## Components
//!
//! - `entities`: Object and height sentinels, buckets, PendingTx
//! - `batch`: Batch validation and index encoding
//! - `pending`: PendingState priority index and lease tracking
//! - `value_objects`: PriorityKey, PendingEntry, operation plans and outcomes
//! - `config`: PoolConfig
//! - `errors`: PoolError and the ErrorClass taxonomy

pub mod batch;
pub mod config;
pub mod entities;
pub mod errors;
pub mod pending;
pub mod value_objects;

pub use batch::*;
pub use config::*;
pub use entities::*;
pub use errors::*;
pub use pending::*;
pub use value_objects::*;
