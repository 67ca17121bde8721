pub mod device;
pub mod file;
pub mod postgres;

use std::sync::Arc;

pub use device::DeviceRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Database: {0}")]
    Database(String),
    #[error("Corrupt: {0}")]
    Corrupt(String),
    #[error("Not found")]
    NotFound,
    #[error("Counter did not advance")]
    CounterConflict,
}

/// Fields an accepted assertion writes. Applied atomically; the counter
/// comparison happens inside the backend's critical section.
#[derive(Debug, Clone)]
pub struct DevicePatch {
    pub counter: u32,
    pub evm_address: String,
    pub passport_hash: String,
}

/// Contract shared by both backends.
///
/// `update` must reject a patch whose counter is not strictly greater than
/// the stored one with `CounterConflict`, evaluated under the same lock or
/// statement that performs the write.
#[async_trait::async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get(&self, credential_id: &str) -> Result<Option<DeviceRecord>, StoreError>;
    /// Upsert by credential id.
    async fn put(&self, record: DeviceRecord) -> Result<(), StoreError>;
    /// Merge an assertion patch into an existing record.
    async fn update(&self, credential_id: &str, patch: DevicePatch) -> Result<(), StoreError>;
    /// Case-insensitive secondary lookup; ties resolve to the most recent
    /// write.
    async fn find_by_address(&self, evm_address: &str)
        -> Result<Option<DeviceRecord>, StoreError>;
}

/// Pick the backend: Postgres when `POSTGRES_URL` is configured, the JSON
/// file store otherwise.
pub async fn open_store(cfg: &crate::config::Config) -> anyhow::Result<Arc<dyn DeviceStore>> {
    if let Some(url) = &cfg.postgres_url {
        let store = postgres::PgStore::connect(url).await?;
        tracing::info!("device store: postgres");
        Ok(Arc::new(store))
    } else {
        let dir = cfg
            .data_dir
            .clone()
            .unwrap_or_else(|| std::path::PathBuf::from("data"));
        let store = file::FileStore::new(dir.join("devices.json"));
        tracing::info!(path = %store.path().display(), "device store: json file");
        Ok(Arc::new(store))
    }
}
