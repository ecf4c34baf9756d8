//! # Akuflow DB
//!
//! Storage adapters behind [`RetentionStore`]. One adapter per backend,
//! selected by `storage.backend`:
//!
//! ```text
//! open_store(&StorageConfig)
//!   ├── "sqlite"   → SqliteStore   (rusqlite, single file, WAL)
//!   ├── "postgres" → PostgresStore (sqlx pool)
//!   └── "memory"   → MemoryStore   (process-local, for dry runs and tests)
//! ```

pub mod memory;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use akuflow_core::config::StorageConfig;
use akuflow_core::error::{AkuflowError, Result};
use akuflow_core::traits::RetentionStore;
use chrono::{DateTime, SecondsFormat, Utc};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Open the backend named in config and run its migrations.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn RetentionStore>> {
    match config.backend.as_str() {
        "sqlite" => {
            let path = config.expanded_sqlite_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteStore::open(&path)?;
            tracing::info!("💾 SQLite store opened: {}", path.display());
            Ok(Arc::new(store))
        }
        "postgres" => {
            if config.postgres_url.is_empty() {
                return Err(AkuflowError::Config(
                    "storage.backend = \"postgres\" requires postgres_url or DATABASE_URL".into(),
                ));
            }
            let store = PostgresStore::connect(&config.postgres_url, config.max_connections).await?;
            store.migrate().await?;
            tracing::info!("🐘 PostgreSQL store connected");
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::warn!("⚠️ Using in-memory store, records are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => Err(AkuflowError::Config(format!(
            "unknown storage backend '{other}' (expected sqlite, postgres, or memory)"
        ))),
    }
}

/// Fixed-width UTC timestamp, so TEXT columns sort chronologically.
pub(crate) fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AkuflowError::Storage(format!("bad timestamp '{raw}': {e}")))
}
