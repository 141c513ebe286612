//! Adapters layer for the build-lease pool.
//!
//! - `memory_store`: in-memory `ObjectStore` with lease expiry and pagination
//! - `known_objects`: bounded TTL cache of recently touched objects
//! - `janitor`: best-effort background removal of retired objects

pub mod janitor;
pub mod known_objects;
pub mod memory_store;

pub use janitor::*;
pub use known_objects::*;
pub use memory_store::*;
