//! Ports layer for the build-lease pool.
//!
//! Defines the hexagonal architecture port traits:
//! - Inbound (Driving) ports: API exposed to the builder and submitters
//! - Outbound (Driven) ports: chain collaborator, object store, clock

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
