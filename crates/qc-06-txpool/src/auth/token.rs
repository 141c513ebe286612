//! # Builder Bearer Tokens
//!
//! A token binds one request payload to one Ed25519 key.
//!
//! ## Signed Bytes
//!
//! The signature covers the bincode encoding of `(claims, external_data)`.
//! `external_data` never travels with the token: the verifier supplies it,
//! so a token minted for one deployment does not verify in another.

use crate::domain::AuthError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_types::{CodecError, Hash, PublicKey, Signature};

/// Claims carried by a bearer token. Times are Unix seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub issuer: Option<String>,
    /// Builder address string the token acts for.
    pub subject: String,
    pub audience: String,
    pub expiration: Option<u64>,
    pub not_before: Option<u64>,
    /// SHA-256 of the request payload the token authorizes.
    pub token_id: Hash,
}

impl TokenClaims {
    pub fn new(subject: impl Into<String>, audience: impl Into<String>, token_id: Hash) -> Self {
        Self {
            issuer: None,
            subject: subject.into(),
            audience: audience.into(),
            expiration: None,
            not_before: None,
            token_id,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_expiration(mut self, expiration: u64) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_not_before(mut self, not_before: u64) -> Self {
        self.not_before = Some(not_before);
        self
    }
}

/// A signed capability token.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    pub claims: TokenClaims,
    /// Ed25519 key that produced the signature.
    pub key: PublicKey,
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
    /// Verifier-supplied data covered by the signature.
    #[serde(skip)]
    pub external_data: Vec<u8>,
}

impl BearerToken {
    /// Signs `claims` together with `external_data`.
    pub fn sign(
        claims: TokenClaims,
        signing_key: &SigningKey,
        external_data: &[u8],
    ) -> Result<Self, AuthError> {
        let message = signing_bytes(&claims, external_data)?;
        let signature = signing_key.sign(&message).to_bytes();
        Ok(Self {
            claims,
            key: signing_key.verifying_key().to_bytes(),
            signature,
            external_data: external_data.to_vec(),
        })
    }

    /// Replaces the external data the signature is checked against.
    pub fn with_external_data(mut self, external_data: &[u8]) -> Self {
        self.external_data = external_data.to_vec();
        self
    }

    /// Verifies the signature and the time bounds at `now` (Unix seconds).
    pub fn verify(&self, now: u64) -> Result<(), AuthError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.key).map_err(|_| AuthError::InvalidKey)?;
        let message = signing_bytes(&self.claims, &self.external_data)?;
        let signature = ed25519_dalek::Signature::from_bytes(&self.signature);
        verifying_key
            .verify(&message, &signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        if let Some(expiration) = self.claims.expiration {
            if now >= expiration {
                return Err(AuthError::Expired { expiration, now });
            }
        }
        if let Some(not_before) = self.claims.not_before {
            if now < not_before {
                return Err(AuthError::NotYetValid { not_before, now });
            }
        }
        Ok(())
    }
}

fn signing_bytes(claims: &TokenClaims, external_data: &[u8]) -> Result<Vec<u8>, AuthError> {
    bincode::serialize(&(claims, external_data))
        .map_err(|e| AuthError::Codec(CodecError::Encode(e.to_string())))
}
