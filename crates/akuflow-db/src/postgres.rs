//! PostgreSQL adapter (sqlx pool) for hosted deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::{HashMap, HashSet};

use akuflow_core::error::{AkuflowError, Result};
use akuflow_core::traits::RetentionStore;
use akuflow_core::types::{
    DateRange, EmailRecordQuery, LearnerActivityProfile, NotificationPreference, RecordOutcome,
    RetentionEmailRecord, RetentionStage, RetentionStats, User,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        display_name TEXT,
        signed_up_at TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_users_signed_up_at ON users(signed_up_at);

    CREATE TABLE IF NOT EXISTS learner_activity (
        user_id TEXT PRIMARY KEY,
        last_activity_at TIMESTAMPTZ,
        current_streak INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS module_progress (
        user_id TEXT NOT NULL,
        module_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'not_started',
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (user_id, module_id)
    );

    CREATE TABLE IF NOT EXISTS notification_preferences (
        user_id TEXT PRIMARY KEY,
        email_notifications BOOLEAN NOT NULL DEFAULT TRUE,
        learning_reminders BOOLEAN NOT NULL DEFAULT TRUE
    );

    CREATE TABLE IF NOT EXISTS retention_email_records (
        id BIGSERIAL PRIMARY KEY,
        user_id TEXT NOT NULL,
        stage TEXT NOT NULL,
        attempted_at TIMESTAMPTZ NOT NULL,
        success BOOLEAN NOT NULL,
        external_message_id TEXT,
        error TEXT,
        CONSTRAINT retention_email_records_user_stage_key UNIQUE (user_id, stage)
    );
    CREATE INDEX IF NOT EXISTS idx_retention_records_attempted_at
        ON retention_email_records(attempted_at);
";

/// PostgreSQL-backed retention store.
pub struct PostgresStore {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> AkuflowError {
    AkuflowError::Storage(e.to_string())
}

impl PostgresStore {
    /// Connect a pool. Does not run migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| AkuflowError::Storage(format!("Postgres connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if missing.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| AkuflowError::Storage(format!("Migration error: {e}")))?;
        Ok(())
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<RetentionEmailRecord> {
    let stage: String = row.try_get("stage").map_err(db_err)?;
    Ok(RetentionEmailRecord {
        user_id: row.try_get("user_id").map_err(db_err)?,
        stage: stage.parse()?,
        attempted_at: row.try_get("attempted_at").map_err(db_err)?,
        success: row.try_get("success").map_err(db_err)?,
        external_message_id: row.try_get("external_message_id").map_err(db_err)?,
        error: row.try_get("error").map_err(db_err)?,
    })
}

#[async_trait]
impl RetentionStore for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(db_err)
    }

    async fn users_signed_up_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, email, display_name, signed_up_at FROM users
             WHERE signed_up_at >= $1 AND signed_up_at <= $2
             ORDER BY signed_up_at LIMIT $3",
        )
        .bind(start)
        .bind(end)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(User {
                    id: row.try_get("id").map_err(db_err)?,
                    email: row.try_get("email").map_err(db_err)?,
                    display_name: row.try_get("display_name").map_err(db_err)?,
                    signed_up_at: row.try_get("signed_up_at").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn recorded_user_ids(
        &self,
        stage: RetentionStage,
        user_ids: &[String],
    ) -> Result<HashSet<String>> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(
            "SELECT user_id FROM retention_email_records WHERE stage = $1 AND user_id = ANY($2)",
        )
        .bind(stage.as_str())
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("user_id").map_err(db_err))
            .collect()
    }

    async fn notification_preferences(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, NotificationPreference>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            "SELECT user_id, email_notifications, learning_reminders
             FROM notification_preferences WHERE user_id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut prefs = HashMap::with_capacity(rows.len());
        for row in &rows {
            let pref = NotificationPreference {
                user_id: row.try_get("user_id").map_err(db_err)?,
                email_notifications: row.try_get("email_notifications").map_err(db_err)?,
                learning_reminders: row.try_get("learning_reminders").map_err(db_err)?,
            };
            prefs.insert(pref.user_id.clone(), pref);
        }
        Ok(prefs)
    }

    async fn activity_profile(&self, user_id: &str) -> Result<Option<LearnerActivityProfile>> {
        let row = sqlx::query(
            "SELECT last_activity_at, current_streak FROM learner_activity WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let streak: i32 = row.try_get("current_streak").map_err(db_err)?;
        Ok(Some(LearnerActivityProfile {
            user_id: user_id.to_string(),
            last_activity_at: row.try_get("last_activity_at").map_err(db_err)?,
            current_streak: streak.max(0) as u32,
        }))
    }

    async fn completed_module_count(&self, user_id: &str) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM module_progress
             WHERE user_id = $1 AND status IN ('completed', 'verified')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(count as u32)
    }

    async fn insert_email_record(&self, record: &RetentionEmailRecord) -> Result<RecordOutcome> {
        let result = sqlx::query(
            "INSERT INTO retention_email_records
                (user_id, stage, attempted_at, success, external_message_id, error)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id, stage) DO NOTHING",
        )
        .bind(&record.user_id)
        .bind(record.stage.as_str())
        .bind(record.attempted_at)
        .bind(record.success)
        .bind(&record.external_message_id)
        .bind(&record.error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(if result.rows_affected() == 0 {
            RecordOutcome::AlreadyRecorded
        } else {
            RecordOutcome::Inserted
        })
    }

    async fn list_email_records(
        &self,
        query: &EmailRecordQuery,
    ) -> Result<Vec<RetentionEmailRecord>> {
        let rows = sqlx::query(
            "SELECT user_id, stage, attempted_at, success, external_message_id, error
             FROM retention_email_records
             WHERE ($1::TEXT IS NULL OR stage = $1) AND ($2::TEXT IS NULL OR user_id = $2)
             ORDER BY attempted_at DESC, id DESC LIMIT $3",
        )
        .bind(query.stage.map(RetentionStage::as_str))
        .bind(query.user_id.as_deref())
        .bind(i64::from(query.effective_limit()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn delete_email_record(&self, user_id: &str, stage: RetentionStage) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM retention_email_records WHERE user_id = $1 AND stage = $2")
                .bind(user_id)
                .bind(stage.as_str())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn retention_stats(&self, range: DateRange) -> Result<RetentionStats> {
        let rows = sqlx::query(
            "SELECT stage, success, COUNT(*) AS n FROM retention_email_records
             WHERE attempted_at >= $1 AND attempted_at <= $2
             GROUP BY stage, success",
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut stats = RetentionStats::empty(range);
        for row in &rows {
            let stage: String = row.try_get("stage").map_err(db_err)?;
            let success: bool = row.try_get("success").map_err(db_err)?;
            let count: i64 = row.try_get("n").map_err(db_err)?;
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
