mod common;

use common::MemoryCache;
use payment_reconciler::idempotency::{CachedResponse, IdempotencyCheck, IdempotencyGuard};
use std::sync::Arc;

fn guard() -> (IdempotencyGuard, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::default());
    (IdempotencyGuard::new(cache.clone()), cache)
}

#[tokio::test]
async fn first_request_claims_the_key() {
    let (guard, _) = guard();
    let check = guard.check(Some("key-1"), b"{}").await.unwrap();
    assert!(matches!(check, IdempotencyCheck::Claimed(key) if key == "key-1"));
}

#[tokio::test]
async fn concurrent_duplicate_is_told_in_flight_not_re_executed() {
    let (guard, _) = guard();

    let first = guard.check(Some("key-1"), b"{}").await.unwrap();
    assert!(matches!(first, IdempotencyCheck::Claimed(_)));

    // Same key before the first request finishes: must not pass through.
    let second = guard.check(Some("key-1"), b"{}").await.unwrap();
    assert!(matches!(second, IdempotencyCheck::InFlight));
}

#[tokio::test]
async fn finished_response_replays_verbatim_with_original_status() {
    let (guard, _) = guard();

    let claim = match guard.check(Some("key-1"), b"{}").await.unwrap() {
        IdempotencyCheck::Claimed(key) => key,
        other => panic!("expected claim, got {other:?}"),
    };

    let response = CachedResponse {
        status: 201,
        body: serde_json::json!({"id": "p1", "status": "succeeded"}),
    };
    guard.record(&claim, &response).await.unwrap();

    match guard.check(Some("key-1"), b"{}").await.unwrap() {
        IdempotencyCheck::Replay(cached) => assert_eq!(cached, response),
        other => panic!("expected replay, got {other:?}"),
    }
}

#[tokio::test]
async fn explicit_key_dedupes_across_different_bodies() {
    let (guard, _) = guard();

    let claim = match guard.check(Some("key-1"), b"{\"a\":1}").await.unwrap() {
        IdempotencyCheck::Claimed(key) => key,
        other => panic!("expected claim, got {other:?}"),
    };
    guard
        .record(
            &claim,
            &CachedResponse {
                status: 201,
                body: serde_json::json!({"id": "p1"}),
            },
        )
        .await
        .unwrap();

    // Different body, same explicit key: same logical operation.
    let check = guard.check(Some("key-1"), b"{\"a\":2}").await.unwrap();
    assert!(matches!(check, IdempotencyCheck::Replay(_)));
}

#[tokio::test]
async fn derived_keys_dedupe_only_byte_identical_bodies() {
    let (guard, _) = guard();

    let first = guard.check(None, b"{\"a\":1}").await.unwrap();
    assert!(matches!(first, IdempotencyCheck::Claimed(_)));

    let same_body = guard.check(None, b"{\"a\":1}").await.unwrap();
    assert!(matches!(same_body, IdempotencyCheck::InFlight));

    let different_body = guard.check(None, b"{\"a\":2}").await.unwrap();
    assert!(matches!(different_body, IdempotencyCheck::Claimed(_)));
}

#[tokio::test]
async fn failed_operation_releases_the_claim_for_retry() {
    let (guard, _) = guard();

    let claim = match guard.check(Some("key-1"), b"{}").await.unwrap() {
        IdempotencyCheck::Claimed(key) => key,
        other => panic!("expected claim, got {other:?}"),
    };
    guard.release(&claim).await.unwrap();

    let retry = guard.check(Some("key-1"), b"{}").await.unwrap();
    assert!(matches!(retry, IdempotencyCheck::Claimed(_)));
}

#[tokio::test]
async fn non_success_responses_are_not_cached() {
    let (guard, cache) = guard();

    let claim = match guard.check(Some("key-1"), b"{}").await.unwrap() {
        IdempotencyCheck::Claimed(key) => key,
        other => panic!("expected claim, got {other:?}"),
    };
    guard
        .record(
            &claim,
            &CachedResponse {
                status: 502,
                body: serde_json::json!({"error": "provider down"}),
            },
        )
        .await
        .unwrap();

    assert!(cache.entries.lock().unwrap().is_empty());

    let retry = guard.check(Some("key-1"), b"{}").await.unwrap();
    assert!(matches!(retry, IdempotencyCheck::Claimed(_)));
}
