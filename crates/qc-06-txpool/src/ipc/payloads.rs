//! # IPC Message Payloads
//!
//! Request/response bodies for the build-lease RPC surface. Every body is
//! bincode-encoded into the envelope's `payload`; a builder token signs the
//! SHA-256 of exactly those bytes.

use crate::auth::{BearerToken, BuilderAuthorization};
use crate::domain::{Object, PoolError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_types::{Block, CodecError, Hash, Transaction};
use std::fmt;
use std::str::FromStr;

/// Build-lease RPC methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    SizeToBuild,
    SubmitTxs,
    LoadByIds,
    FetchToBuild,
    UpdateBuildStatus,
    AcceptByBlock,
    UpdateBuilderKeepers,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::SizeToBuild,
        Method::SubmitTxs,
        Method::LoadByIds,
        Method::FetchToBuild,
        Method::UpdateBuildStatus,
        Method::AcceptByBlock,
        Method::UpdateBuilderKeepers,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SizeToBuild => "sizeToBuild",
            Self::SubmitTxs => "submitTxs",
            Self::LoadByIds => "loadByIDs",
            Self::FetchToBuild => "fetchToBuild",
            Self::UpdateBuildStatus => "updateBuildStatus",
            Self::AcceptByBlock => "acceptByBlock",
            Self::UpdateBuilderKeepers => "updateBuilderKeepers",
        }
    }

    /// Whether the method needs a builder token.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Self::FetchToBuild
                | Self::UpdateBuildStatus
                | Self::AcceptByBlock
                | Self::UpdateBuilderKeepers
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| PoolError::UnknownMethod(s.to_string()))
    }
}

/// Request envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcRequest {
    pub method: String,
    pub payload: Vec<u8>,
    pub token: Option<BearerToken>,
}

impl IpcRequest {
    /// Encodes `body` into a new envelope without a token.
    pub fn new<T: Serialize>(method: Method, body: &T) -> Result<Self, CodecError> {
        Ok(Self {
            method: method.as_str().to_string(),
            payload: encode_payload(body)?,
            token: None,
        })
    }

    pub fn with_token(mut self, token: BearerToken) -> Self {
        self.token = Some(token);
        self
    }
}

/// Response envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcResponse {
    pub payload: Vec<u8>,
}

impl IpcResponse {
    pub fn new<T: Serialize>(body: &T) -> Result<Self, CodecError> {
        Ok(Self {
            payload: encode_payload(body)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        decode_payload(&self.payload)
    }
}

pub fn encode_payload<T: Serialize>(body: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(body).map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(payload).map_err(|e| CodecError::Decode(e.to_string()))
}

// =============================================================================
// REQUEST / RESPONSE BODIES
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeToBuildRequest;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeToBuildResponse {
    pub size: u64,
}

/// One transaction, or several forming an atomic batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTxsRequest {
    pub txs: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTxsResponse {
    pub ids: Vec<Hash>,
    pub batch_id: Option<Hash>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadByIdsRequest {
    pub ids: Vec<Hash>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadByIdsResponse {
    pub objects: Vec<Object>,
}

/// Lease request. `budget` is in bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchToBuildRequest {
    pub budget: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchToBuildResponse {
    pub txs: Vec<Transaction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBuildStatusRequest {
    pub unknown: Vec<Hash>,
    pub rejected: Vec<Hash>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBuildStatusResponse {
    pub rejected: Vec<Hash>,
    pub requeued: Vec<Hash>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptByBlockRequest {
    pub block: Block,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptByBlockResponse {
    pub height: u64,
    pub accepted: Vec<Hash>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBuilderKeepersRequest;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBuilderKeepersResponse {
    pub keepers: BuilderAuthorization,
}
