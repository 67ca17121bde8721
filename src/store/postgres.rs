use sqlx::postgres::{PgPool, PgPoolOptions};

use super::device::unix_now;
use super::{DevicePatch, DeviceRecord, DeviceStore, StoreError};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS devices (
    key_id         TEXT PRIMARY KEY,
    public_key_der TEXT NOT NULL,
    counter        BIGINT NOT NULL DEFAULT 0,
    evm_address    TEXT,
    passport_hash  TEXT,
    created_at     BIGINT NOT NULL,
    updated_at     BIGINT
)";

const CREATE_ADDRESS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS devices_evm_address_idx ON devices (LOWER(evm_address))";

/// Relational backend. The counter guard lives in the UPDATE's WHERE
/// clause, so racing assertions collapse to exactly one winner without an
/// explicit transaction.
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    key_id: String,
    public_key_der: String,
    counter: i64,
    evm_address: Option<String>,
    passport_hash: Option<String>,
    created_at: i64,
    updated_at: Option<i64>,
}

impl From<DeviceRow> for DeviceRecord {
    fn from(row: DeviceRow) -> Self {
        DeviceRecord {
            credential_id: row.key_id,
            public_key_der: row.public_key_der,
            counter: row.counter as u32,
            evm_address: row.evm_address,
            passport_hash: row.passport_hash,
            created_at: row.created_at as u64,
            updated_at: row.updated_at.map(|t| t as u64),
        }
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl PgStore {
    /// Connect and create the schema idempotently.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(db_err)?;
        sqlx::query(CREATE_TABLE).execute(&pool).await.map_err(db_err)?;
        sqlx::query(CREATE_ADDRESS_INDEX)
            .execute(&pool)
            .await
            .map_err(db_err)?;
        Ok(PgStore { pool })
    }
}

#[async_trait::async_trait]
impl DeviceStore for PgStore {
    async fn get(&self, credential_id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "SELECT key_id, public_key_der, counter, evm_address, passport_hash, \
             created_at, updated_at FROM devices WHERE key_id = $1",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(DeviceRecord::from))
    }

    async fn put(&self, record: DeviceRecord) -> Result<(), StoreError> {
        // Single upsert so concurrent enrollments of the same key collapse
        // deterministically.
        sqlx::query(
            "INSERT INTO devices \
             (key_id, public_key_der, counter, evm_address, passport_hash, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (key_id) DO UPDATE SET \
             public_key_der = EXCLUDED.public_key_der, \
             counter = EXCLUDED.counter, \
             evm_address = EXCLUDED.evm_address, \
             passport_hash = EXCLUDED.passport_hash, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(&record.credential_id)
        .bind(&record.public_key_der)
        .bind(record.counter as i64)
        .bind(&record.evm_address)
        .bind(&record.passport_hash)
        .bind(record.created_at as i64)
        .bind(record.updated_at.map(|t| t as i64))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update(&self, credential_id: &str, patch: DevicePatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE devices SET counter = $2, evm_address = $3, passport_hash = $4, \
             updated_at = $5 WHERE key_id = $1 AND counter < $2",
        )
        .bind(credential_id)
        .bind(patch.counter as i64)
        .bind(patch.evm_address.to_ascii_lowercase())
        .bind(&patch.passport_hash)
        .bind(unix_now() as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        // Distinguish a stale counter from a missing row.
        match self.get(credential_id).await? {
            Some(_) => Err(StoreError::CounterConflict),
            None => Err(StoreError::NotFound),
        }
    }

    async fn find_by_address(
        &self,
        evm_address: &str,
    ) -> Result<Option<DeviceRecord>, StoreError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "SELECT key_id, public_key_der, counter, evm_address, passport_hash, \
             created_at, updated_at FROM devices \
             WHERE LOWER(evm_address) = LOWER($1) \
             ORDER BY COALESCE(updated_at, created_at) DESC LIMIT 1",
        )
        .bind(evm_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(DeviceRecord::from))
    }
}
