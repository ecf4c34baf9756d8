//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use akuflow_core::config::{AkuflowConfig, GatewayConfig, Role};
use akuflow_scheduler::RetentionJob;

use crate::auth::{self, RoleGate};
use crate::routes;

/// Shared state for the gateway server.
pub struct AppState {
    pub gateway: Arc<GatewayConfig>,
    pub job: Arc<RetentionJob>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(gateway: GatewayConfig, job: Arc<RetentionJob>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            job,
            start_time: std::time::Instant::now(),
        }
    }
}

const READ_ROLES: &[Role] = &[Role::Admin, Role::Support];
const WRITE_ROLES: &[Role] = &[Role::Admin];

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let keys = Arc::new(state.gateway.api_keys.clone());

    let trigger = post(routes::run_retention).route_layer(from_fn_with_state(
        state.gateway.clone(),
        auth::require_cron_secret,
    ));
    let public = Router::new()
        .route("/health", get(routes::health_check))
        .route(routes::CRON_PATH, get(routes::cron_descriptor).merge(trigger));

    let admin_read = Router::new()
        .route("/api/admin/retention/records", get(routes::list_records))
        .route("/api/admin/retention/stats", get(routes::retention_stats))
        .route_layer(from_fn_with_state(
            RoleGate::new(keys.clone(), READ_ROLES),
            auth::require_roles,
        ));

    let admin_write = Router::new()
        .route(
            "/api/admin/retention/records/{user_id}/{stage}",
            delete(routes::delete_record),
        )
        .route_layer(from_fn_with_state(
            RoleGate::new(keys, WRITE_ROLES),
            auth::require_roles,
        ));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));
    let cors = if state.gateway.cors_permissive {
        cors.allow_origin(Any)
    } else {
        // Only the app itself may call the admin API from a browser.
        let origins: Vec<HeaderValue> = state
            .job
            .config()
            .app_url
            .trim_end_matches('/')
            .parse::<HeaderValue>()
            .into_iter()
            .collect();
        cors.allow_origin(origins)
    };

    public
        .merge(admin_read)
        .merge(admin_write)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server, and the in-process job loop when configured.
pub async fn start(config: AkuflowConfig) -> anyhow::Result<()> {
    let store = akuflow_db::open_store(&config.storage).await?;
    let sender = akuflow_mail::create_sender(&config.mail)?;
    tracing::info!("✅ Retention job ready (store={}, mail={})", store.name(), sender.name());

    let job = Arc::new(RetentionJob::new(store, sender, config.retention.clone()));

    let has_secret = config
        .gateway
        .cron_secret
        .as_deref()
        .is_some_and(|s| !s.is_empty());
    if !has_secret {
        if config.gateway.allow_missing_cron_secret {
            tracing::warn!("⚠️ No cron secret configured: {} is open to anyone", routes::CRON_PATH);
        } else {
            tracing::warn!(
                "⚠️ No cron secret configured: {} will answer 503 until CRON_SECRET is set",
                routes::CRON_PATH
            );
        }
    }
    if config.gateway.api_keys.is_empty() {
        tracing::info!("🔒 No API keys configured: admin routes will reject every request");
    }

    if config.retention.interval_secs > 0 {
        tokio::spawn(akuflow_scheduler::spawn_retention_loop(
            job.clone(),
            config.retention.interval_secs,
        ));
    }

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(AppState::new(config.gateway, job));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Gateway server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_state(
    gateway: GatewayConfig,
) -> (Arc<AppState>, Arc<akuflow_db::MemoryStore>) {
    let store = Arc::new(akuflow_db::MemoryStore::new());
    let job = Arc::new(RetentionJob::new(
        store.clone(),
        Arc::new(akuflow_mail::LogSender::new()),
        akuflow_core::config::RetentionConfig::default(),
    ));
    (Arc::new(AppState::new(gateway, job)), store)
}
