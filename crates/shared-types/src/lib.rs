//! # Shared Types Crate
//!
//! Chain entities shared between the transaction pool and the collaborators
//! it talks to (chain client, block builder, object store).
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: transaction, block and account shapes are
//!   defined here and nowhere else.
//! - **Content Addressing**: every identifier is the SHA-256 digest of a
//!   canonical bincode encoding.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
