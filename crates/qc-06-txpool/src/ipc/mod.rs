//! # IPC Layer - Build-Lease Pool
//!
//! Envelope `{method, payload, token?}` dispatch onto the pool operations.
//!
//! ## Authorization
//!
//! `fetchToBuild`, `updateBuildStatus`, `acceptByBlock` and
//! `updateBuilderKeepers` require a builder bearer token whose ID is the
//! SHA-256 of the envelope payload. See `auth::gate` for the check order.

pub mod handler;
pub mod payloads;

pub use handler::*;
pub use payloads::*;
