//! # Builder Authorization
//!
//! Privileged operations reject every malformed or foreign token before any
//! pool state changes.

use super::support::*;
use ed25519_dalek::SigningKey;
use qc_06_txpool::domain::{AuthError, ErrorClass, PoolError};
use qc_06_txpool::ipc::{encode_payload, FetchToBuildRequest};
use qc_06_txpool::ports::MockTimeSource;
use qc_06_txpool::{BearerToken, BuildLeaseApi, Credentials, MemoryObjectStore, TokenClaims};
use std::sync::Arc;

async fn harness_with_work() -> Harness {
    let h = Harness::start().await;
    h.submit(&[create_tx(0, 1, false)]).await.unwrap();
    h
}

fn fetch_payload(budget: u64) -> Vec<u8> {
    encode_payload(&FetchToBuildRequest { budget }).unwrap()
}

async fn fetch_with(h: &Harness, payload: &[u8], token: Option<&BearerToken>) -> PoolError {
    h.pool
        .fetch_to_build(&h.cancel, &Credentials::new(payload, token), 1 << 20)
        .await
        .unwrap_err()
}

async fn assert_untouched(h: &Harness) {
    assert_eq!(h.size().await, 1);
    assert_eq!(h.pool.leased_count().await, 0);
}

#[tokio::test]
async fn test_missing_token() {
    let h = harness_with_work().await;
    let err = fetch_with(&h, &fetch_payload(1), None).await;
    assert_eq!(err, PoolError::Unauthorized(AuthError::MissingToken));
    assert_eq!(err.class(), ErrorClass::Unauthorized);
    assert_untouched(&h).await;
}

#[tokio::test]
async fn test_audience_mismatch() {
    let h = harness_with_work().await;
    let payload = fetch_payload(1);
    let mut claims = h.claims(&payload);
    claims.audience = "explorer".into();
    let err = fetch_with(&h, &payload, Some(&h.sign(claims))).await;
    assert!(matches!(
        err,
        PoolError::Unauthorized(AuthError::AudienceMismatch { .. })
    ));
    assert_untouched(&h).await;
}

#[tokio::test]
async fn test_subject_mismatch() {
    let h = harness_with_work().await;
    let payload = fetch_payload(1);
    let mut claims = h.claims(&payload);
    claims.subject = format!("0x{}", "11".repeat(20));
    let err = fetch_with(&h, &payload, Some(&h.sign(claims))).await;
    assert!(matches!(
        err,
        PoolError::Unauthorized(AuthError::SubjectMismatch { .. })
    ));
    assert_untouched(&h).await;
}

#[tokio::test]
async fn test_token_bound_to_another_payload() {
    let h = harness_with_work().await;
    let token = h.token(&fetch_payload(1));
    let err = fetch_with(&h, &fetch_payload(2), Some(&token)).await;
    assert_eq!(err, PoolError::Unauthorized(AuthError::TokenIdMismatch));
    assert_untouched(&h).await;
}

#[tokio::test]
async fn test_token_signed_for_another_chain() {
    let h = harness_with_work().await;
    let payload = fetch_payload(1);
    let token = BearerToken::sign(h.claims(&payload), &h.key, b"other-chain").unwrap();
    let err = fetch_with(&h, &payload, Some(&token)).await;
    assert_eq!(err, PoolError::Unauthorized(AuthError::InvalidSignature));
    assert_untouched(&h).await;
}

#[tokio::test]
async fn test_key_that_is_not_a_keeper() {
    let h = harness_with_work().await;
    let payload = fetch_payload(1);
    let stranger = random_key();
    let token = BearerToken::sign(h.claims(&payload), &stranger, EXTERNAL_DATA).unwrap();
    let err = fetch_with(&h, &payload, Some(&token)).await;
    assert!(matches!(
        err,
        PoolError::Unauthorized(AuthError::ThresholdUnmet { threshold: 1 })
    ));
    assert_untouched(&h).await;
}

#[tokio::test]
async fn test_single_key_cannot_meet_higher_threshold() {
    let key = random_key();
    let other = random_key();
    let chain = Arc::new(ScriptedChain::new(
        vec![key.verifying_key().to_bytes(), other.verifying_key().to_bytes()],
        2,
    ));
    let h = Harness::build(Arc::new(MemoryObjectStore::new()), chain, key);
    h.pool.bootstrap(&h.cancel).await.unwrap();

    let err = h.fetch(1024).await.unwrap_err();
    assert!(matches!(
        err,
        PoolError::Unauthorized(AuthError::ThresholdUnmet { threshold: 2 })
    ));
}

#[tokio::test]
async fn test_token_time_bounds() {
    let clock = Arc::new(MockTimeSource::new(1_000_000));
    let key = random_key();
    let h = Harness::build_with_clock(
        Arc::new(MemoryObjectStore::with_time_source(clock.clone())),
        Arc::new(ScriptedChain::with_keeper(&key)),
        key,
        clock.clone(),
    );
    h.pool.bootstrap(&h.cancel).await.unwrap();
    h.submit(&[create_tx(0, 1, false)]).await.unwrap();

    let payload = fetch_payload(1);
    let expired = h.sign(h.claims(&payload).with_expiration(900));
    assert!(matches!(
        fetch_with(&h, &payload, Some(&expired)).await,
        PoolError::Unauthorized(AuthError::Expired { .. })
    ));

    let early = h.sign(h.claims(&payload).with_not_before(2_000));
    assert!(matches!(
        fetch_with(&h, &payload, Some(&early)).await,
        PoolError::Unauthorized(AuthError::NotYetValid { .. })
    ));

    clock.set(2_500_000);
    let payload = fetch_payload(1 << 20);
    let token = h.sign(h.claims(&payload).with_not_before(2_000).with_expiration(3_000));
    let leased = h
        .pool
        .fetch_to_build(&h.cancel, &Credentials::new(&payload, Some(&token)), 1 << 20)
        .await
        .unwrap();
    assert_eq!(leased.len(), 1);
}

#[tokio::test]
async fn test_every_privileged_operation_is_gated() {
    let h = harness_with_work().await;
    let anon = Credentials::anonymous(b"");
    let block = shared_types::Block {
        height: 1,
        parent_hash: [0; 32],
        builder: BUILDER,
        timestamp: 0,
        txs: vec![],
    };

    let errors = [
        h.pool.fetch_to_build(&h.cancel, &anon, 1).await.unwrap_err(),
        h.pool
            .update_build_status(&h.cancel, &anon, &[], &[])
            .await
            .unwrap_err(),
        h.pool.accept_by_block(&h.cancel, &anon, &block).await.unwrap_err(),
        h.pool
            .update_builder_keepers(&h.cancel, &anon)
            .await
            .unwrap_err(),
    ];
    assert!(errors.iter().all(PoolError::is_unauthorized));
    assert_eq!(h.chain.account_calls(), 1);

    // Open operations need no token.
    assert_eq!(h.pool.size_to_build(&h.cancel).await.unwrap(), 1);
}

#[tokio::test]
async fn test_keeper_rotation() {
    let h = harness_with_work().await;
    let successor = random_key();
    h.chain
        .set_keepers(vec![successor.verifying_key().to_bytes()], 1);

    // The snapshot still trusts the old key until it is refreshed.
    let keepers = h.refresh_keepers().await.unwrap();
    assert_eq!(keepers.keys, vec![successor.verifying_key().to_bytes()]);
    assert_eq!(h.pool.builder_authorization().await, keepers);

    assert!(h.fetch(1 << 20).await.unwrap_err().is_unauthorized());

    let payload = fetch_payload(1 << 20);
    let token = signed_by(&h, &successor, &payload);
    let leased = h
        .pool
        .fetch_to_build(&h.cancel, &Credentials::new(&payload, Some(&token)), 1 << 20)
        .await
        .unwrap();
    assert_eq!(leased.len(), 1);
}

#[tokio::test]
async fn test_refresh_refuses_unusable_snapshot() {
    let h = harness_with_work().await;
    h.chain.set_keepers(vec![], 1);

    let err = h.refresh_keepers().await.unwrap_err();
    assert!(matches!(
        err,
        PoolError::Unauthorized(AuthError::InvalidKeepers { .. })
    ));
    // The previous snapshot stays in force.
    assert_eq!(h.fetch(1 << 20).await.unwrap().len(), 1);
}

fn signed_by(h: &Harness, key: &SigningKey, payload: &[u8]) -> BearerToken {
    let claims = TokenClaims::new(
        shared_types::address_to_string(&BUILDER),
        h.pool.config().audience.clone(),
        shared_types::content_hash(payload),
    );
    BearerToken::sign(claims, key, EXTERNAL_DATA).unwrap()
}
