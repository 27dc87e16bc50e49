//! SQLite backend

use crate::model::{RelayMode, RelayRecord, RelayState, SampleId, TemperatureSample};
use crate::repository::{ReadingStore, RelayStore};
use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use data_validator::{ensure_finite, TEMPERATURE_FIELD};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

/// Repository backed by a SQLite connection pool
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open the database and make sure the schema exists.
    ///
    /// `sqlite::memory:` URLs get a single connection that never idles out,
    /// otherwise every pooled connection would see its own empty database.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        info!("Opening SQLite repository at {}", database_url);

        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Create tables and indexes (idempotent)
    async fn create_schema(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS temperature_samples (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                value          REAL    NOT NULL,
                recorded_at_ms INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_temperature_samples_recorded_at
                ON temperature_samples (recorded_at_ms DESC, id DESC);
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relay_records (
                device        TEXT    PRIMARY KEY,
                state         TEXT    NOT NULL,
                mode          TEXT    NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("SQLite schema ready");
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        info!("Closing SQLite repository");
        self.pool.close().await;
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp {} out of range", ms)))
}

fn sample_from_row(row: &SqliteRow) -> Result<TemperatureSample, StorageError> {
    Ok(TemperatureSample {
        id: SampleId(row.try_get("id")?),
        value: row.try_get("value")?,
        recorded_at: from_millis(row.try_get("recorded_at_ms")?)?,
    })
}

fn relay_from_row(row: &SqliteRow) -> Result<RelayRecord, StorageError> {
    let state: String = row.try_get("state")?;
    let mode: String = row.try_get("mode")?;
    Ok(RelayRecord {
        device: row.try_get("device")?,
        state: state
            .parse()
            .map_err(|_| StorageError::Corrupt(format!("stored state '{}'", state)))?,
        mode: mode
            .parse()
            .map_err(|_| StorageError::Corrupt(format!("stored mode '{}'", mode)))?,
        updated_at: from_millis(row.try_get("updated_at_ms")?)?,
    })
}

#[async_trait]
impl ReadingStore for SqliteRepository {
    async fn record(&self, value: f64, at: DateTime<Utc>) -> Result<SampleId, StorageError> {
        ensure_finite(TEMPERATURE_FIELD, value)?;

        let result = sqlx::query(
            "INSERT INTO temperature_samples (value, recorded_at_ms) VALUES (?1, ?2)",
        )
        .bind(value)
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let id = SampleId(result.last_insert_rowid());
        debug!("Inserted sample {} ({})", id, value);
        Ok(id)
    }

    async fn list_all(&self) -> Result<Vec<TemperatureSample>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, value, recorded_at_ms FROM temperature_samples \
             ORDER BY recorded_at_ms DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(sample_from_row).collect()
    }

    async fn latest(&self) -> Result<Option<TemperatureSample>, StorageError> {
        let row = sqlx::query(
            "SELECT id, value, recorded_at_ms FROM temperature_samples \
             ORDER BY recorded_at_ms DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(sample_from_row).transpose()
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM temperature_samples")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(count as usize)
    }
}

#[async_trait]
impl RelayStore for SqliteRepository {
    async fn get(&self, device: &str) -> Result<Option<RelayRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT device, state, mode, updated_at_ms FROM relay_records WHERE device = ?1",
        )
        .bind(device)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(relay_from_row).transpose()
    }

    async fn upsert(
        &self,
        device: &str,
        state: RelayState,
        mode: RelayMode,
        at: DateTime<Utc>,
    ) -> Result<RelayRecord, StorageError> {
        sqlx::query(
            r#"
            INSERT INTO relay_records (device, state, mode, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(device) DO UPDATE SET
                state = excluded.state,
                mode = excluded.mode,
                updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(device)
        .bind(state.as_str())
        .bind(mode.as_str())
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!("Upserted relay {} -> {}/{}", device, state, mode);
        Ok(RelayRecord {
            device: device.to_string(),
            state,
            mode,
            // Round-trips through millisecond storage
            updated_at: from_millis(at.timestamp_millis())?,
        })
    }

    async fn list(&self) -> Result<Vec<RelayRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT device, state, mode, updated_at_ms FROM relay_records ORDER BY device",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(relay_from_row).collect()
    }
}
