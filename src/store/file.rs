use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use super::device::unix_now;
use super::{DevicePatch, DeviceRecord, DeviceStore, StoreError};

/// Single-file JSON backend: one object keyed by credential id, reread and
/// rewritten whole on every mutation. Single-process only; the mutex keeps
/// the read-check-write cycle serialised inside this process.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        FileStore { path, lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, DeviceRecord>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))
    }

    fn write_all(&self, devices: &BTreeMap<String, DeviceRecord>) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let bytes = serde_json::to_vec_pretty(devices)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        // Whole-file rewrite through a sibling temp file so a crash cannot
        // leave a half-written store behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeviceStore for FileStore {
    async fn get(&self, credential_id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all()?.remove(credential_id))
    }

    async fn put(&self, record: DeviceRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut devices = self.read_all()?;
        devices.insert(record.credential_id.clone(), record);
        self.write_all(&devices)
    }

    async fn update(&self, credential_id: &str, patch: DevicePatch) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut devices = self.read_all()?;
        let record = devices
            .get_mut(credential_id)
            .ok_or(StoreError::NotFound)?;
        if patch.counter <= record.counter {
            return Err(StoreError::CounterConflict);
        }
        record.counter = patch.counter;
        record.evm_address = Some(patch.evm_address.to_ascii_lowercase());
        record.passport_hash = Some(patch.passport_hash);
        record.updated_at = Some(unix_now());
        self.write_all(&devices)
    }

    async fn find_by_address(
        &self,
        evm_address: &str,
    ) -> Result<Option<DeviceRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let devices = self.read_all()?;
        let needle = evm_address.to_ascii_lowercase();
        Ok(devices
            .into_values()
            .filter(|r| {
                r.evm_address
                    .as_deref()
                    .is_some_and(|a| a.eq_ignore_ascii_case(&needle))
            })
            .max_by_key(|r| r.updated_at.unwrap_or(r.created_at)))
    }
}
