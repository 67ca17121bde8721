//! Relational backend contract tests. These need a reachable Postgres;
//! point PASSBIND_TEST_POSTGRES_URL at one to run them, otherwise they
//! skip.

use passbind::store::device::DeviceRecord;
use passbind::store::postgres::PgStore;
use passbind::store::{DevicePatch, DeviceStore, StoreError};

async fn test_store() -> Option<PgStore> {
    let Ok(url) = std::env::var("PASSBIND_TEST_POSTGRES_URL") else {
        println!("SKIP: PASSBIND_TEST_POSTGRES_URL not set");
        return None;
    };
    match PgStore::connect(&url).await {
        Ok(store) => Some(store),
        Err(e) => {
            println!("SKIP: postgres not reachable ({e})");
            None
        }
    }
}

fn make_record(credential_id: &str) -> DeviceRecord {
    DeviceRecord {
        credential_id: credential_id.to_string(),
        public_key_der: "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAE".to_string(),
        counter: 0,
        evm_address: None,
        passport_hash: None,
        created_at: 1_700_000_000,
        updated_at: None,
    }
}

#[tokio::test]
async fn test_pg_roundtrip_and_upsert() {
    let Some(store) = test_store().await else { return };
    let key = "pg-test-roundtrip";

    store.put(make_record(key)).await.unwrap();
    let loaded = store.get(key).await.unwrap().expect("row must exist");
    assert_eq!(loaded.counter, 0);
    assert!(loaded.evm_address.is_none());

    // Second put with the same key must collapse to one row.
    let mut replacement = make_record(key);
    replacement.public_key_der = "REPLACED".to_string();
    store.put(replacement).await.unwrap();
    let loaded = store.get(key).await.unwrap().unwrap();
    assert_eq!(loaded.public_key_der, "REPLACED");
}

#[tokio::test]
async fn test_pg_guarded_counter() {
    let Some(store) = test_store().await else { return };
    let key = "pg-test-counter";
    store.put(make_record(key)).await.unwrap();

    let patch = DevicePatch {
        counter: 1,
        evm_address: "0x1111111111111111111111111111111111111111".to_string(),
        passport_hash: "aa".to_string(),
    };
    store.update(key, patch.clone()).await.unwrap();

    let err = store.update(key, patch).await.unwrap_err();
    assert!(matches!(err, StoreError::CounterConflict));

    let err = store
        .update(
            "pg-test-missing",
            DevicePatch {
                counter: 1,
                evm_address: "0x1111111111111111111111111111111111111111".to_string(),
                passport_hash: "aa".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
async fn test_pg_find_by_address_any_case() {
    let Some(store) = test_store().await else { return };
    let key = "pg-test-address";
    store.put(make_record(key)).await.unwrap();
    store
        .update(
            key,
            DevicePatch {
                counter: 1,
                evm_address: "0x742d35Cc6634C0532925a3b844Bc454e4438AAAA".to_string(),
                passport_hash: "beef".to_string(),
            },
        )
        .await
        .unwrap();

    let found = store
        .find_by_address("0x742D35CC6634C0532925A3B844BC454E4438AAAA")
        .await
        .unwrap()
        .expect("case-insensitive lookup must match");
    assert_eq!(found.credential_id, key);
    assert_eq!(
        found.evm_address.as_deref(),
        Some("0x742d35cc6634c0532925a3b844bc454e4438aaaa")
    );
}
