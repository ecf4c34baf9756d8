//! API route handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use akuflow_core::error::AkuflowError;
use akuflow_core::types::{DateRange, EmailRecordQuery, RetentionStage};

use crate::auth::AuthContext;
use crate::server::AppState;

pub const CRON_PATH: &str = "/api/cron/retention-emails";

/// Default look-back for the stats endpoint when `from` is omitted.
const DEFAULT_STATS_DAYS: i64 = 30;

fn error_response(e: AkuflowError) -> Response {
    let status = match e {
        AkuflowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({"success": false, "error": e.to_string()})),
    )
        .into_response()
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store = state.job.store();
    let store_ok = store.ping().await.is_ok();
    Json(serde_json::json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "service": "akuflow-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "store": store.name(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Static descriptor for the trigger path. No side effects.
pub async fn cron_descriptor() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "endpoint": CRON_PATH,
        "method": "POST",
        "description": "Sends lifecycle retention emails to users who signed up 1, 3, and 7 days ago",
        "stages": RetentionStage::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
    }))
}

/// Run the retention job. A fatal error is a 500 with no partial summary.
pub async fn run_retention(State(state): State<Arc<AppState>>) -> Response {
    match state.job.run_now().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::error!("❌ Retention job aborted: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"success": false, "error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// List send records, newest first.
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EmailRecordQuery>,
) -> Response {
    match state.job.store().list_email_records(&query).await {
        Ok(records) => Json(serde_json::json!({
            "count": records.len(),
            "limit": query.effective_limit(),
            "records": records,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Clear one record so the user becomes eligible for that stage again.
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path((user_id, stage)): Path<(String, String)>,
) -> Response {
    let stage: RetentionStage = match stage.parse() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    match state.job.store().delete_email_record(&user_id, stage).await {
        Ok(true) => {
            tracing::info!("🗑️ {} cleared {stage} record for {user_id}", ctx.label);
            Json(serde_json::json!({"success": true, "deleted": true})).into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"success": false, "error": "record not found"})),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Per-stage attempt counts over `[from, to]`. Defaults to the last 30 days.
pub async fn retention_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Response {
    let to = query.to.unwrap_or_else(Utc::now);
    let from = query.from.unwrap_or(to - Duration::days(DEFAULT_STATS_DAYS));
    let range = match DateRange::new(from, to) {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };
    match state.job.store().retention_stats(range).await {
        Ok(stats) => Json(serde_json::json!({
            "range": stats.range,
            "stages": {
                "day1": stats.day1,
                "day3": stats.day3,
                "day7": stats.day7,
            },
            "total": stats.total(),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::test_state;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (state, _) = test_state(Default::default());
        let json = health_check(State(state)).await.0;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["store"], "memory");
    }

    #[tokio::test]
    async fn test_cron_descriptor_is_static() {
        let json = cron_descriptor().await.0;
        assert_eq!(json["method"], "POST");
        assert_eq!(json["stages"][2], "day7");
    }

    #[tokio::test]
    async fn test_delete_rejects_unknown_stage() {
        let (state, _) = test_state(Default::default());
        let ctx = AuthContext {
            role: akuflow_core::config::Role::Admin,
            label: "ops".into(),
        };
        let resp = delete_record(
            State(state),
            Extension(ctx),
            Path(("u1".into(), "day99".into())),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_stats_rejects_inverted_range() {
        let (state, _) = test_state(Default::default());
        let now = Utc::now();
        let resp = retention_stats(
            State(state),
            Query(StatsQuery {
                from: Some(now),
                to: Some(now - Duration::days(1)),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
