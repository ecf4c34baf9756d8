//! SQLite adapter: single-file storage for one deployment.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text so range
//! filters can compare them as strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use akuflow_core::error::{AkuflowError, Result};
use akuflow_core::traits::RetentionStore;
use akuflow_core::types::{
    DateRange, EmailRecordQuery, LearnerActivityProfile, ModuleProgressRecord,
    NotificationPreference, RecordOutcome, RetentionEmailRecord, RetentionStage, RetentionStats,
    User,
};

use crate::{fmt_ts, parse_ts};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        display_name TEXT,
        signed_up_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_users_signed_up_at ON users(signed_up_at);

    CREATE TABLE IF NOT EXISTS learner_activity (
        user_id TEXT PRIMARY KEY,
        last_activity_at TEXT,
        current_streak INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS module_progress (
        user_id TEXT NOT NULL,
        module_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'not_started',
        updated_at TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        PRIMARY KEY (user_id, module_id)
    );

    CREATE TABLE IF NOT EXISTS notification_preferences (
        user_id TEXT PRIMARY KEY,
        email_notifications INTEGER NOT NULL DEFAULT 1,
        learning_reminders INTEGER NOT NULL DEFAULT 1
    );

    -- Append-only. UNIQUE (user_id, stage) bounds concurrent runs to one
    -- record per stage.
    CREATE TABLE IF NOT EXISTS retention_email_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        stage TEXT NOT NULL,
        attempted_at TEXT NOT NULL,
        success INTEGER NOT NULL,
        external_message_id TEXT,
        error TEXT,
        UNIQUE (user_id, stage)
    );
    CREATE INDEX IF NOT EXISTS idx_retention_records_attempted_at
        ON retention_email_records(attempted_at);
";

/// SQLite-backed retention store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> AkuflowError {
    AkuflowError::Storage(e.to_string())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String, bool, Option<String>, Option<String>)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get::<_, i64>(3)? != 0,
        row.get(4)?,
        row.get(5)?,
    ))
}

impl SqliteStore {
    /// Open or create the database file and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| AkuflowError::Storage(format!("DB open: {e}")))?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(SCHEMA)
            .map_err(|e| AkuflowError::Storage(format!("Migration error: {e}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AkuflowError::Storage(format!("Lock: {e}")))
    }

    // ── Writers for tables owned by other subsystems ──────────
    // Used by fixtures and local imports; the retention job never calls them.

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO users (id, email, display_name, signed_up_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET email = excluded.email,
                    display_name = excluded.display_name, signed_up_at = excluded.signed_up_at",
                params![user.id, user.email, user.display_name, fmt_ts(user.signed_up_at)],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn upsert_activity(&self, profile: &LearnerActivityProfile) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO learner_activity (user_id, last_activity_at, current_streak) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET last_activity_at = excluded.last_activity_at,
                    current_streak = excluded.current_streak",
                params![
                    profile.user_id,
                    profile.last_activity_at.map(fmt_ts),
                    profile.current_streak
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn upsert_module_progress(&self, progress: &ModuleProgressRecord) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO module_progress (user_id, module_id, status) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, module_id) DO UPDATE SET status = excluded.status",
                params![progress.user_id, progress.module_id, progress.status.as_str()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn upsert_preferences(&self, pref: &NotificationPreference) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO notification_preferences (user_id, email_notifications, learning_reminders)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET email_notifications = excluded.email_notifications,
                    learning_reminders = excluded.learning_reminders",
                params![pref.user_id, pref.email_notifications, pref.learning_reminders],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Total number of retention records.
    pub fn record_count(&self) -> Result<u64> {
        self.lock()?
            .query_row("SELECT COUNT(*) FROM retention_email_records", [], |r| r.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(db_err)
    }
}

#[async_trait]
impl RetentionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn ping(&self) -> Result<()> {
        self.lock()?
            .query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
            .map(|_| ())
            .map_err(db_err)
    }

    async fn users_signed_up_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, email, display_name, signed_up_at FROM users
                 WHERE signed_up_at >= ?1 AND signed_up_at <= ?2
                 ORDER BY signed_up_at LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![fmt_ts(start), fmt_ts(end), limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?;

        let mut users = Vec::new();
        for row in rows {
            let (id, email, display_name, signed_up_at) = row.map_err(db_err)?;
            users.push(User {
                id,
                email,
                display_name,
                signed_up_at: parse_ts(&signed_up_at)?,
            });
        }
        Ok(users)
    }

    async fn recorded_user_ids(
        &self,
        stage: RetentionStage,
        user_ids: &[String],
    ) -> Result<HashSet<String>> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.lock()?;
        let sql = format!(
            "SELECT user_id FROM retention_email_records WHERE stage = ? AND user_id IN ({})",
            placeholders(user_ids.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let args = std::iter::once(stage.as_str().to_string()).chain(user_ids.iter().cloned());
        let rows = stmt
            .query_map(params_from_iter(args), |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<HashSet<_>>>().map_err(db_err)
    }

    async fn notification_preferences(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, NotificationPreference>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.lock()?;
        let sql = format!(
            "SELECT user_id, email_notifications, learning_reminders
             FROM notification_preferences WHERE user_id IN ({})",
            placeholders(user_ids.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(user_ids.iter()), |row| {
                Ok(NotificationPreference {
                    user_id: row.get(0)?,
                    email_notifications: row.get::<_, i64>(1)? != 0,
                    learning_reminders: row.get::<_, i64>(2)? != 0,
                })
            })
            .map_err(db_err)?;

        let mut prefs = HashMap::new();
        for row in rows {
            let pref = row.map_err(db_err)?;
            prefs.insert(pref.user_id.clone(), pref);
        }
        Ok(prefs)
    }

    async fn activity_profile(&self, user_id: &str) -> Result<Option<LearnerActivityProfile>> {
        let row = self
            .lock()?
            .query_row(
                "SELECT last_activity_at, current_streak FROM learner_activity WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        let Some((last_activity_at, streak)) = row else {
            return Ok(None);
        };
        Ok(Some(LearnerActivityProfile {
            user_id: user_id.to_string(),
            last_activity_at: last_activity_at.as_deref().map(parse_ts).transpose()?,
            current_streak: streak.max(0) as u32,
        }))
    }

    async fn completed_module_count(&self, user_id: &str) -> Result<u32> {
        self.lock()?
            .query_row(
                "SELECT COUNT(*) FROM module_progress
                 WHERE user_id = ?1 AND status IN ('completed', 'verified')",
                params![user_id],
                |r| r.get::<_, i64>(0),
            )
            .map(|n| n as u32)
            .map_err(db_err)
    }

    async fn insert_email_record(&self, record: &RetentionEmailRecord) -> Result<RecordOutcome> {
        let changed = self
            .lock()?
            .execute(
                "INSERT INTO retention_email_records
                    (user_id, stage, attempted_at, success, external_message_id, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, stage) DO NOTHING",
                params![
                    record.user_id,
                    record.stage.as_str(),
                    fmt_ts(record.attempted_at),
                    record.success,
                    record.external_message_id,
                    record.error,
                ],
            )
            .map_err(db_err)?;
        Ok(if changed == 0 {
            RecordOutcome::AlreadyRecorded
        } else {
            RecordOutcome::Inserted
        })
    }

    async fn list_email_records(
        &self,
        query: &EmailRecordQuery,
    ) -> Result<Vec<RetentionEmailRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, stage, attempted_at, success, external_message_id, error
                 FROM retention_email_records
                 WHERE (?1 IS NULL OR stage = ?1) AND (?2 IS NULL OR user_id = ?2)
                 ORDER BY attempted_at DESC, id DESC LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![
                    query.stage.map(RetentionStage::as_str),
                    query.user_id,
                    query.effective_limit()
                ],
                row_to_record,
            )
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (user_id, stage, attempted_at, success, external_message_id, error) =
                row.map_err(db_err)?;
            records.push(RetentionEmailRecord {
                user_id,
                stage: stage.parse()?,
                attempted_at: parse_ts(&attempted_at)?,
                success,
                external_message_id,
                error,
            });
        }
        Ok(records)
    }

    async fn delete_email_record(&self, user_id: &str, stage: RetentionStage) -> Result<bool> {
        let changed = self
            .lock()?
            .execute(
                "DELETE FROM retention_email_records WHERE user_id = ?1 AND stage = ?2",
                params![user_id, stage.as_str()],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    async fn retention_stats(&self, range: DateRange) -> Result<RetentionStats> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT stage, success, COUNT(*) FROM retention_email_records
                 WHERE attempted_at >= ?1 AND attempted_at <= ?2
                 GROUP BY stage, success",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![fmt_ts(range.start), fmt_ts(range.end)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? != 0,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(db_err)?;

        let mut stats = RetentionStats::empty(range);
        for row in rows {
            let (stage, success, count) = row.map_err(db_err)?;
            let slot = stats.stage_mut(stage.parse()?);
            slot.attempted += count as u64;
            if success {
                slot.succeeded += count as u64;
            } else {
                slot.failed += count as u64;
            }
        }
        Ok(stats)
    }
}
