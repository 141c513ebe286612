//! # Build-Lease Transaction Pool Subsystem
//!
//! **Subsystem ID:** 6
//!
//! ## Purpose
//!
//! Admits candidate transactions, leases the highest-priority work to the one
//! authorized block builder, and reconciles its in-memory index against a
//! durable object store after a restart.
//!
//! ## Transaction Lifecycle
//!
//! ```text
//! [SUBMITTED -1] ──fetch──→ [LEASED 0] ──accept──→ [ACCEPTED h>0]
//!        ↑                      │
//!        └──── unknown ─────────┤
//!                               └── rejected ──→ [REJECTED -2]
//! ```
//!
//! | Stage | Method | Effect |
//! |-------|--------|--------|
//! | Submit | `submit_txs()` | Store write, then index as pending |
//! | Lease | `fetch_to_build()` | Store `acquire`, move to leased |
//! | Unknown | `update_build_status()` | Reload from cache/store, pending again |
//! | Reject | `update_build_status()` | Cache at -2, best-effort store removal |
//! | Accept | `accept_by_block()` | Store `accept` at block height |
//!
//! Batches move through every stage as one unit: one rejected member
//! discards the batch, one unknown member requeues all of it.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | A transaction is pending or leased, never both | `domain/pending.rs` - `insert_*`, `commit_fetch()` |
//! | Fetch never exceeds the byte budget | `domain/pending.rs` - `plan_fetch()` |
//! | Batches are wholly retired or wholly requeued | `domain/pending.rs` - `plan_reject()`, `plan_requeue()` |
//! | Block acceptance never splits a batch | `domain/pending.rs` - `plan_accept()` |
//! | No mutation before external calls succeed | `service.rs` - plan / call / apply |
//! | No RPC before bootstrap | `service.rs` - `ensure_ready()` |
//!
//! ## Security
//!
//! | Method | Caller | Enforcement |
//! |--------|--------|-------------|
//! | `sizeToBuild`, `submitTxs`, `loadByIDs` | anyone | - |
//! | `fetchToBuild`, `updateBuildStatus`, `acceptByBlock`, `updateBuilderKeepers` | builder | `auth/gate.rs` |
//!
//! ## Outbound Dependencies
//!
//! | Collaborator | Trait | Purpose |
//! |--------------|-------|---------|
//! | Chain | `ChainClient` | Genesis, builder keepers, semantic pre-verification |
//! | Storage | `ObjectStore` | Durable content-addressed objects with leases |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - MemoryObjectStore, KnownObjects, Janitor           │
//! │  ipc/      - Envelope dispatch and payloads                     │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - BuildLeaseApi trait                        │
//! │  ports/outbound.rs - ChainClient, ObjectStore, TimeSource       │
//! │  service.rs        - TxPool;  bootstrap.rs - recovery           │
//! │  auth/             - BearerToken, keepers, AuthorizationGate    │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/entities.rs - Object, Bucket, PendingTx                 │
//! │  domain/batch.rs    - Batch                                     │
//! │  domain/pending.rs  - PendingState                              │
//! │  domain/errors.rs   - PoolError, ErrorClass                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod auth;
pub mod bootstrap;
pub mod domain;
pub mod ipc;
pub mod ports;
pub mod service;

pub use adapters::{Janitor, KnownObjects, MemoryObjectStore};
pub use auth::{has_keys, AuthorizationGate, BearerToken, BuilderAuthorization, Credentials, TokenClaims};
pub use domain::{
    AcceptOutcome, Batch, BuildStatusOutcome, Bucket, ErrorClass, Object, ObjectState, PoolConfig,
    PoolError, SubmitOutcome,
};
pub use ipc::{IpcHandler, IpcRequest, IpcResponse, Method};
pub use ports::{BuildLeaseApi, ChainClient, ObjectStore, TimeSource};
pub use service::TxPool;
