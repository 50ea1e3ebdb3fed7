//! TTL token store tests
//!
//! Run against a real Redis instance (TEST_REDIS_URL); ignored by default.

use chordelia::services::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn test_store() -> TokenStore {
    let redis_url =
        std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(redis_url.as_str()).expect("Failed to open Redis client");
    TokenStore::new(Arc::new(client))
}

#[tokio::test]
#[ignore] // Run only when Redis is available
async fn test_put_get_take_roundtrip() {
    let store = test_store();
    let key = format!("test-{}", Uuid::new_v4());

    store
        .put("integration", &key, "value-1", 60)
        .await
        .expect("put");

    let read = store.get("integration", &key).await.expect("get");
    assert_eq!(read.as_deref(), Some("value-1"));

    // take consumes the entry
    let taken = store.take("integration", &key).await.expect("take");
    assert_eq!(taken.as_deref(), Some("value-1"));

    let gone = store.get("integration", &key).await.expect("get");
    assert!(gone.is_none());
}

#[tokio::test]
#[ignore] // Run only when Redis is available
async fn test_entries_expire_after_ttl() {
    let store = test_store();
    let key = format!("test-{}", Uuid::new_v4());

    store
        .put("integration", &key, "ephemeral", 1)
        .await
        .expect("put");

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let read = store.get("integration", &key).await.expect("get");
    assert!(read.is_none(), "entry should have expired");
}
