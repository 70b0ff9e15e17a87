use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use attachments_core::Actor;
use attachments_db::{Database, DbError};

use crate::routes::AppState;

/// Username of the actor behind `ATTACHMENTS_API_KEY`.
pub const ENV_KEY_USER: &str = "admin";

/// Username every request runs as when authentication is disabled.
pub const LOCAL_USER: &str = "local";

/// Authentication configuration.
pub struct AuthConfig {
    /// SHA-256 hash of the `ATTACHMENTS_API_KEY` env var (if set).
    pub env_key_hash: Option<String>,
    /// Database handle for DB-backed API keys.
    pub db: Arc<dyn Database>,
}

/// SHA-256 hash a raw key, returning the hex-encoded digest.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Generate a new API key: `at_` + 43 chars of base62-encoded random bytes.
pub fn generate_api_key() -> String {
    use rand::Rng;
    const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let random_part: String = (0..43)
        .map(|_| {
            let idx = rng.gen_range(0..BASE62.len());
            BASE62[idx] as char
        })
        .collect();
    format!("at_{random_part}")
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "missing or invalid API key" })),
    )
        .into_response()
}

/// Axum middleware that resolves the caller into an [`Actor`] extension.
///
/// If `auth` is `None` in the AppState, every request runs as the local
/// superuser. Otherwise a valid `Authorization: Bearer <token>` header is
/// required: the env key maps to a superuser, DB keys to their named actor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth = match &state.auth {
        Some(auth) => auth,
        None => {
            request.extensions_mut().insert(Actor::superuser(LOCAL_USER));
            return next.run(request).await;
        }
    };

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let token_hash = match token {
        Some(t) => sha256_hex(t),
        None => return unauthorized(),
    };

    // Check env key (constant-time comparison via hash equality)
    if let Some(ref env_hash) = auth.env_key_hash {
        if constant_time_eq(&token_hash, env_hash) {
            request.extensions_mut().insert(Actor::superuser(ENV_KEY_USER));
            return next.run(request).await;
        }
    }

    match auth.db.find_api_key_by_hash(&token_hash).await {
        Ok(Some(api_key)) => {
            // Fire-and-forget: update last_used_at
            let db = auth.db.clone();
            let key_id = api_key.id.clone();
            tokio::spawn(async move {
                if let Err(e) = db.touch_api_key(&key_id).await {
                    debug!(key_id = %key_id, error = %e, "failed to touch api key");
                }
            });
            request.extensions_mut().insert(api_key.actor());
            next.run(request).await
        }
        Ok(None) => unauthorized(),
        Err(e) => {
            warn!(error = %e, "api key lookup failed");
            unauthorized()
        }
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Build auth config from an explicit key value.
///
/// Returns `Ok(None)` (open access) only when there is neither an env key nor
/// any DB-backed key. A failed key check is an error, never open access.
pub async fn build_auth_config_with_key(
    db: Arc<dyn Database>,
    env_key: Option<&str>,
) -> Result<Option<Arc<AuthConfig>>, DbError> {
    let env_key_hash = env_key.filter(|k| !k.is_empty()).map(sha256_hex);
    if env_key_hash.is_none() && !db.has_api_keys().await? {
        return Ok(None);
    }
    Ok(Some(Arc::new(AuthConfig { env_key_hash, db })))
}
