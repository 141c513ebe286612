//! Authorization gate for privileged build-lease operations.
//!
//! # Check Order
//!
//! Checks short-circuit on the first failure and have no side effects.
//!
//! | Step | Check | Error |
//! |------|-------|-------|
//! | 1 | token present | `MissingToken` |
//! | 2 | audience equals the configured audience | `AudienceMismatch` |
//! | 3 | subject equals the builder address string | `SubjectMismatch` |
//! | 4 | token ID equals SHA-256 of the request payload | `TokenIdMismatch` |
//! | 5 | signature (with local external data) and time bounds | `InvalidSignature`, `Expired`, `NotYetValid` |
//! | 6 | token key satisfies the keeper threshold | `ThresholdUnmet` |

use super::keepers::BuilderAuthorization;
use super::token::BearerToken;
use crate::domain::{AuthError, ConfigError, PoolConfig};
use shared_types::{address_to_string, content_hash};

/// What a privileged request presents: its raw payload and optional token.
#[derive(Clone, Copy, Debug)]
pub struct Credentials<'a> {
    pub payload: &'a [u8],
    pub token: Option<&'a BearerToken>,
}

impl<'a> Credentials<'a> {
    pub fn new(payload: &'a [u8], token: Option<&'a BearerToken>) -> Self {
        Self { payload, token }
    }

    /// Credentials without a token.
    pub fn anonymous(payload: &'a [u8]) -> Self {
        Self {
            payload,
            token: None,
        }
    }
}

/// Verifies builder tokens against the configured identity.
#[derive(Clone, Debug)]
pub struct AuthorizationGate {
    audience: String,
    subject: String,
    external_data: Vec<u8>,
}

impl AuthorizationGate {
    pub fn new(config: &PoolConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            audience: config.audience.clone(),
            subject: address_to_string(&config.builder_address()?),
            external_data: config.token_external_data.as_bytes().to_vec(),
        })
    }

    /// Expected token subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Runs every check against `keepers` at `now` (Unix seconds).
    pub fn authorize(
        &self,
        creds: &Credentials<'_>,
        keepers: &BuilderAuthorization,
        now: u64,
    ) -> Result<(), AuthError> {
        let token = creds.token.ok_or(AuthError::MissingToken)?;
        let claims = &token.claims;

        if claims.audience != self.audience {
            return Err(AuthError::AudienceMismatch {
                expected: self.audience.clone(),
                actual: claims.audience.clone(),
            });
        }
        if claims.subject != self.subject {
            return Err(AuthError::SubjectMismatch {
                expected: self.subject.clone(),
                actual: claims.subject.clone(),
            });
        }
        if claims.token_id != content_hash(creds.payload) {
            return Err(AuthError::TokenIdMismatch);
        }

        token
            .clone()
            .with_external_data(&self.external_data)
            .verify(now)?;

        keepers.authorize(&[token.key])
    }
}
