//! # Test Fixtures
//!
//! Scripted chain client and a harness that signs builder requests the way
//! the IPC layer expects: the token ID is the SHA-256 of the bincode payload.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use qc_06_txpool::domain::{
    AcceptOutcome, BuildStatusOutcome, ChainError, PoolConfig, PoolError, SubmitOutcome,
};
use qc_06_txpool::ipc::{
    encode_payload, AcceptByBlockRequest, FetchToBuildRequest, UpdateBuildStatusRequest,
    UpdateBuilderKeepersRequest,
};
use qc_06_txpool::{
    BearerToken, BuildLeaseApi, BuilderAuthorization, ChainClient, Credentials,
    MemoryObjectStore, TimeSource, TokenClaims, TxPool,
};
use shared_types::{
    address_to_string, content_hash, Account, Address, Block, Hash, PublicKey, Transaction,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builder address every harness pool is configured with.
pub const BUILDER: Address = [0x42; 20];

/// External data both sides bind into token signatures.
pub const EXTERNAL_DATA: &[u8] = b"test-chain";

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh random signing key.
pub fn random_key() -> SigningKey {
    SigningKey::from_bytes(&rand::random::<[u8; 32]>())
}

/// Transaction from a fixed sender.
pub fn create_tx(nonce: u64, gas_tip: u64, batched: bool) -> Transaction {
    Transaction {
        from: [0xAA; 20],
        to: Some([0xBB; 20]),
        nonce,
        gas_tip,
        gas_fee_cap: 100,
        amount: 1,
        data: vec![],
        batched,
        signature: [9u8; 64],
    }
}

/// Transaction whose encoding is exactly `size` bytes.
pub fn sized_tx(nonce: u64, gas_tip: u64, size: usize) -> Transaction {
    let mut tx = create_tx(nonce, gas_tip, false);
    let base = tx.to_bytes().map(|raw| raw.len()).unwrap_or_default();
    tx.data = vec![0x5A; size.saturating_sub(base)];
    tx
}

pub fn encode(tx: &Transaction) -> Vec<u8> {
    tx.to_bytes().unwrap()
}

pub fn id_of(tx: &Transaction) -> Hash {
    tx.id().unwrap()
}

// =============================================================================
// SCRIPTED CHAIN
// =============================================================================

/// Chain client whose answers the test controls.
pub struct ScriptedChain {
    genesis: Vec<Transaction>,
    account: Mutex<Account>,
    rejecting: AtomicBool,
    account_calls: AtomicUsize,
}

impl ScriptedChain {
    pub fn new(keepers: Vec<PublicKey>, threshold: u16) -> Self {
        Self {
            genesis: Vec::new(),
            account: Mutex::new(Account {
                address: BUILDER,
                threshold,
                keepers,
                ..Default::default()
            }),
            rejecting: AtomicBool::new(false),
            account_calls: AtomicUsize::new(0),
        }
    }

    /// Single keeper, threshold 1.
    pub fn with_keeper(key: &SigningKey) -> Self {
        Self::new(vec![key.verifying_key().to_bytes()], 1)
    }

    pub fn with_genesis(mut self, genesis: Vec<Transaction>) -> Self {
        self.genesis = genesis;
        self
    }

    pub fn set_keepers(&self, keepers: Vec<PublicKey>, threshold: u16) {
        let mut account = self.account.lock();
        account.keepers = keepers;
        account.threshold = threshold;
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn genesis_txs(&self, _cancel: &CancellationToken) -> Result<Vec<Transaction>, ChainError> {
        Ok(self.genesis.clone())
    }

    async fn get_account(
        &self,
        _cancel: &CancellationToken,
        address: &Address,
    ) -> Result<Account, ChainError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        let account = self.account.lock();
        if account.address != *address {
            return Err(ChainError::AccountNotFound(*address));
        }
        Ok(account.clone())
    }

    async fn pre_verify_txs(
        &self,
        _cancel: &CancellationToken,
        txs: &[Transaction],
    ) -> Result<(), ChainError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(ChainError::Rejected(format!(
                "{} transaction(s) failed nonce check",
                txs.len()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// HARNESS
// =============================================================================

/// A pool over an in-memory store, plus the builder's signing key.
pub struct Harness {
    pub pool: Arc<TxPool>,
    pub store: Arc<MemoryObjectStore>,
    pub chain: Arc<ScriptedChain>,
    pub key: SigningKey,
    pub cancel: CancellationToken,
}

impl Harness {
    /// Bootstrapped pool with one keeper and an empty store.
    pub async fn start() -> Self {
        let key = random_key();
        let chain = Arc::new(ScriptedChain::with_keeper(&key));
        let harness = Self::build(Arc::new(MemoryObjectStore::new()), chain, key);
        harness.pool.bootstrap(&harness.cancel).await.unwrap();
        harness
    }

    /// Pool that has not been bootstrapped yet.
    pub fn build(store: Arc<MemoryObjectStore>, chain: Arc<ScriptedChain>, key: SigningKey) -> Self {
        init_tracing();
        let pool = TxPool::new(PoolConfig::for_testing(BUILDER), chain.clone(), store.clone())
            .unwrap();
        Self::assemble(pool, store, chain, key)
    }

    /// Same as [`Harness::build`] with an explicit configuration.
    pub fn build_with_config(
        store: Arc<MemoryObjectStore>,
        chain: Arc<ScriptedChain>,
        key: SigningKey,
        config: PoolConfig,
    ) -> Self {
        init_tracing();
        let pool = TxPool::new(config, chain.clone(), store.clone()).unwrap();
        Self::assemble(pool, store, chain, key)
    }

    /// Same as [`Harness::build`] with an explicit clock.
    pub fn build_with_clock(
        store: Arc<MemoryObjectStore>,
        chain: Arc<ScriptedChain>,
        key: SigningKey,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        init_tracing();
        let pool = TxPool::with_time_source(
            PoolConfig::for_testing(BUILDER),
            chain.clone(),
            store.clone(),
            clock,
        )
        .unwrap();
        Self::assemble(pool, store, chain, key)
    }

    fn assemble(
        pool: TxPool,
        store: Arc<MemoryObjectStore>,
        chain: Arc<ScriptedChain>,
        key: SigningKey,
    ) -> Self {
        Self {
            pool: Arc::new(pool),
            store,
            chain,
            key,
            cancel: CancellationToken::new(),
        }
    }

    /// A second pool over the same store and chain, as after a restart.
    pub fn restart(&self) -> Self {
        Self::build(self.store.clone(), self.chain.clone(), self.key.clone())
    }

    pub fn claims(&self, payload: &[u8]) -> TokenClaims {
        TokenClaims::new(
            address_to_string(&BUILDER),
            self.pool.config().audience.clone(),
            content_hash(payload),
        )
    }

    /// Valid builder token for `payload`.
    pub fn token(&self, payload: &[u8]) -> BearerToken {
        self.sign(self.claims(payload))
    }

    pub fn sign(&self, claims: TokenClaims) -> BearerToken {
        BearerToken::sign(claims, &self.key, EXTERNAL_DATA).unwrap()
    }

    pub async fn size(&self) -> usize {
        self.pool.size_to_build(&self.cancel).await.unwrap()
    }

    pub async fn submit(&self, txs: &[Transaction]) -> Result<SubmitOutcome, PoolError> {
        self.pool
            .submit_txs(&self.cancel, txs.iter().map(encode).collect())
            .await
    }

    pub async fn fetch(&self, budget: usize) -> Result<Vec<Transaction>, PoolError> {
        let payload = encode_payload(&FetchToBuildRequest {
            budget: budget as u64,
        })?;
        let token = self.token(&payload);
        self.pool
            .fetch_to_build(&self.cancel, &Credentials::new(&payload, Some(&token)), budget)
            .await
    }

    pub async fn report(
        &self,
        unknown: &[Hash],
        rejected: &[Hash],
    ) -> Result<BuildStatusOutcome, PoolError> {
        let payload = encode_payload(&UpdateBuildStatusRequest {
            unknown: unknown.to_vec(),
            rejected: rejected.to_vec(),
        })?;
        let token = self.token(&payload);
        self.pool
            .update_build_status(
                &self.cancel,
                &Credentials::new(&payload, Some(&token)),
                unknown,
                rejected,
            )
            .await
    }

    pub async fn accept(&self, height: u64, txs: &[Hash]) -> Result<AcceptOutcome, PoolError> {
        let block = Block {
            height,
            parent_hash: [0; 32],
            builder: BUILDER,
            timestamp: 1_700_000_000,
            txs: txs.to_vec(),
        };
        let payload = encode_payload(&AcceptByBlockRequest {
            block: block.clone(),
        })?;
        let token = self.token(&payload);
        self.pool
            .accept_by_block(&self.cancel, &Credentials::new(&payload, Some(&token)), &block)
            .await
    }

    pub async fn refresh_keepers(&self) -> Result<BuilderAuthorization, PoolError> {
        let payload = encode_payload(&UpdateBuilderKeepersRequest)?;
        let token = self.token(&payload);
        self.pool
            .update_builder_keepers(&self.cancel, &Credentials::new(&payload, Some(&token)))
            .await
    }
}
