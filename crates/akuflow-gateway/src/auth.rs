//! Request authentication: the cron bearer secret and role-scoped API keys.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use akuflow_core::config::{ApiKeyConfig, GatewayConfig, Role};

/// Compare secrets through their SHA-256 digests so the comparison time
/// does not depend on where the inputs first differ.
fn secrets_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({"success": false, "error": message})),
    )
        .into_response()
}

// ── Cron trigger ─────────────────────────────────────────

/// Why a cron trigger was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronRejection {
    /// No secret configured and the bypass is off.
    NotConfigured,
    Unauthorized,
}

impl IntoResponse for CronRejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotConfigured => {
                json_error(StatusCode::SERVICE_UNAVAILABLE, "cron secret not configured")
            }
            Self::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "Unauthorized"),
        }
    }
}

/// Decide whether a cron trigger may run.
pub fn authorize_cron(config: &GatewayConfig, headers: &HeaderMap) -> Result<(), CronRejection> {
    match config.cron_secret.as_deref().filter(|s| !s.is_empty()) {
        Some(expected) => match bearer_token(headers) {
            Some(token) if secrets_match(token, expected) => Ok(()),
            _ => Err(CronRejection::Unauthorized),
        },
        None if config.allow_missing_cron_secret => {
            tracing::warn!("⚠️ Cron trigger accepted without a secret (allow_missing_cron_secret = true)");
            Ok(())
        }
        None => Err(CronRejection::NotConfigured),
    }
}

/// Middleware for the cron trigger route.
pub async fn require_cron_secret(
    State(config): State<Arc<GatewayConfig>>,
    req: Request,
    next: Next,
) -> Response {
    match authorize_cron(&config, req.headers()) {
        Ok(()) => next.run(req).await,
        Err(rejection) => {
            tracing::warn!("🔒 Cron trigger rejected: {rejection:?}");
            rejection.into_response()
        }
    }
}

// ── Admin API keys ───────────────────────────────────────

/// Identity attached to an authorized admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub role: Role,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    Missing,
    Invalid,
    Forbidden,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Missing => json_error(StatusCode::UNAUTHORIZED, "missing bearer token"),
            Self::Invalid => json_error(StatusCode::UNAUTHORIZED, "invalid API key"),
            Self::Forbidden => json_error(StatusCode::FORBIDDEN, "insufficient role"),
        }
    }
}

/// Key table plus the roles one route group accepts.
#[derive(Clone)]
pub struct RoleGate {
    keys: Arc<Vec<ApiKeyConfig>>,
    allowed: &'static [Role],
}

impl RoleGate {
    pub fn new(keys: Arc<Vec<ApiKeyConfig>>, allowed: &'static [Role]) -> Self {
        Self { keys, allowed }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthRejection> {
        let token = bearer_token(headers).ok_or(AuthRejection::Missing)?;
        // Check every key so timing does not reveal the key's position.
        let mut matched = None;
        for key in self.keys.iter().filter(|k| !k.key.is_empty()) {
            if secrets_match(token, &key.key) && matched.is_none() {
                matched = Some(key);
            }
        }
        let key = matched.ok_or(AuthRejection::Invalid)?;
        if !self.allowed.contains(&key.role) {
            return Err(AuthRejection::Forbidden);
        }
        Ok(AuthContext {
            role: key.role,
            label: if key.label.is_empty() {
                key.role.as_str().to_string()
            } else {
                key.label.clone()
            },
        })
    }
}

/// Middleware: authenticate, check role, and insert [`AuthContext`] into
/// request extensions.
pub async fn require_roles(State(gate): State<RoleGate>, mut req: Request, next: Next) -> Response {
    match gate.authenticate(req.headers()) {
        Ok(ctx) => {
            tracing::debug!("🔑 {} ({}) → {}", ctx.label, ctx.role.as_str(), req.uri().path());
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(rejection) => {
            tracing::warn!("🔒 Admin request to {} rejected: {rejection:?}", req.uri().path());
            rejection.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(token: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(t) = token {
            h.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {t}")).unwrap(),
            );
        }
        h
    }

    fn gateway(secret: Option<&str>, bypass: bool) -> GatewayConfig {
        GatewayConfig {
            cron_secret: secret.map(String::from),
            allow_missing_cron_secret: bypass,
            ..Default::default()
        }
    }

    #[test]
    fn test_cron_secret_checks() {
        let cfg = gateway(Some("s3cret"), false);
        assert_eq!(authorize_cron(&cfg, &headers(Some("s3cret"))), Ok(()));
        assert_eq!(
            authorize_cron(&cfg, &headers(Some("wrong"))),
            Err(CronRejection::Unauthorized)
        );
        assert_eq!(authorize_cron(&cfg, &headers(None)), Err(CronRejection::Unauthorized));
    }

    #[test]
    fn test_cron_fails_closed_without_secret() {
        assert_eq!(
            authorize_cron(&gateway(None, false), &headers(None)),
            Err(CronRejection::NotConfigured)
        );
        assert_eq!(
            authorize_cron(&gateway(Some(""), false), &headers(None)),
            Err(CronRejection::NotConfigured)
        );
        assert_eq!(authorize_cron(&gateway(None, true), &headers(None)), Ok(()));
    }

    fn keys() -> Arc<Vec<ApiKeyConfig>> {
        Arc::new(vec![
            ApiKeyConfig { key: "adm".into(), role: Role::Admin, label: "ops".into() },
            ApiKeyConfig { key: "sup".into(), role: Role::Support, label: String::new() },
        ])
    }

    #[test]
    fn test_role_gate() {
        let admin_only = RoleGate::new(keys(), &[Role::Admin]);
        assert_eq!(
            admin_only.authenticate(&headers(Some("adm"))),
            Ok(AuthContext { role: Role::Admin, label: "ops".into() })
        );
        assert_eq!(
            admin_only.authenticate(&headers(Some("sup"))),
            Err(AuthRejection::Forbidden)
        );
        assert_eq!(admin_only.authenticate(&headers(Some("nope"))), Err(AuthRejection::Invalid));
        assert_eq!(admin_only.authenticate(&headers(None)), Err(AuthRejection::Missing));

        let both = RoleGate::new(keys(), &[Role::Admin, Role::Support]);
        assert_eq!(both.authenticate(&headers(Some("sup"))).unwrap().label, "support");
    }

    #[test]
    fn test_rejection_status_codes() {
        assert_eq!(AuthRejection::Missing.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthRejection::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            CronRejection::NotConfigured.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
