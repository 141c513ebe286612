//! Builder authorization.
//!
//! - `token`: BearerToken and TokenClaims (Ed25519)
//! - `keepers`: BuilderAuthorization snapshot and `has_keys`
//! - `gate`: AuthorizationGate applied to privileged operations

pub mod gate;
pub mod keepers;
pub mod token;

pub use gate::*;
pub use keepers::*;
pub use token::*;
