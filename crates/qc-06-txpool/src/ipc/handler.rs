//! IPC message handler for the build-lease pool.
//!
//! Decodes the envelope, dispatches on the method name and encodes the
//! response. A privileged request without a token is refused before its
//! payload is decoded; otherwise the raw payload and token pass through to
//! the pool, which authorizes before touching any state.

use super::payloads::*;
use crate::auth::Credentials;
use crate::domain::{AuthError, PoolError};
use crate::ports::BuildLeaseApi;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// IPC message handler.
pub struct IpcHandler<P: BuildLeaseApi> {
    pool: Arc<P>,
}

impl<P: BuildLeaseApi> IpcHandler<P> {
    pub fn new(pool: Arc<P>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Handles one request envelope.
    pub async fn handle(
        &self,
        cancel: &CancellationToken,
        request: &IpcRequest,
    ) -> Result<IpcResponse, PoolError> {
        let method: Method = request.method.parse()?;
        debug!(
            method = %method,
            payload_len = request.payload.len(),
            has_token = request.token.is_some(),
            "Handling request"
        );
        if method.requires_auth() && request.token.is_none() {
            return Err(AuthError::MissingToken.into());
        }
        let creds = Credentials::new(&request.payload, request.token.as_ref());

        let response = match method {
            Method::SizeToBuild => {
                let size = self.pool.size_to_build(cancel).await?;
                IpcResponse::new(&SizeToBuildResponse { size: size as u64 })?
            }
            Method::SubmitTxs => {
                let body: SubmitTxsRequest = decode_payload(&request.payload)?;
                let outcome = self.pool.submit_txs(cancel, body.txs).await?;
                IpcResponse::new(&SubmitTxsResponse {
                    ids: outcome.ids,
                    batch_id: outcome.batch_id,
                })?
            }
            Method::LoadByIds => {
                let body: LoadByIdsRequest = decode_payload(&request.payload)?;
                let objects = self.pool.load_by_ids(cancel, &body.ids).await?;
                IpcResponse::new(&LoadByIdsResponse { objects })?
            }
            Method::FetchToBuild => {
                let body: FetchToBuildRequest = decode_payload(&request.payload)?;
                let budget = usize::try_from(body.budget).unwrap_or(usize::MAX);
                let txs = self.pool.fetch_to_build(cancel, &creds, budget).await?;
                IpcResponse::new(&FetchToBuildResponse { txs })?
            }
            Method::UpdateBuildStatus => {
                let body: UpdateBuildStatusRequest = decode_payload(&request.payload)?;
                let outcome = self
                    .pool
                    .update_build_status(cancel, &creds, &body.unknown, &body.rejected)
                    .await?;
                IpcResponse::new(&UpdateBuildStatusResponse {
                    rejected: outcome.rejected,
                    requeued: outcome.requeued,
                })?
            }
            Method::AcceptByBlock => {
                let body: AcceptByBlockRequest = decode_payload(&request.payload)?;
                let outcome = self.pool.accept_by_block(cancel, &creds, &body.block).await?;
                IpcResponse::new(&AcceptByBlockResponse {
                    height: outcome.height,
                    accepted: outcome.accepted,
                })?
            }
            Method::UpdateBuilderKeepers => {
                let keepers = self.pool.update_builder_keepers(cancel, &creds).await?;
                IpcResponse::new(&UpdateBuilderKeepersResponse { keepers })?
            }
        };
        Ok(response)
    }
}
