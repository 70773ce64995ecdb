use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use sqlx::PgPool;

use crate::auth::token;
use crate::config::AuthMode;
use crate::error::ApiError;
use crate::store::AppState;

pub const ANONYMOUS: &str = "anonymous";

/// Caller identity attached to every API handler.
///
/// With `AuthMode::Disabled` every request is accepted as `anonymous`; with
/// `AuthMode::Required` a bearer token matching an `api_tokens` row is needed
/// and the actor is that token's name.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub actor: String,
    pub ip_addr: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ip_addr = extract_ip(parts, state.config.trust_proxy_headers);

        match state.config.auth_mode {
            AuthMode::Disabled => Ok(Self {
                actor: ANONYMOUS.into(),
                ip_addr,
            }),
            AuthMode::Required => {
                let raw_token = extract_bearer_token(parts).ok_or(ApiError::Unauthorized)?;
                let actor = lookup_api_token(&state.pool, &raw_token)
                    .await?
                    .ok_or(ApiError::Unauthorized)?;
                Ok(Self { actor, ip_addr })
            }
        }
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_owned())
}

fn extract_ip(parts: &Parts, trust_proxy: bool) -> Option<String> {
    // Only trust X-Forwarded-For when behind a configured reverse proxy
    if trust_proxy
        && let Some(forwarded) = parts.headers.get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first_ip) = val.split(',').next()
    {
        return Some(first_ip.trim().to_owned());
    }
    parts
        .extensions
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// Resolve a raw token to its name. Updates `last_used_at` on success.
async fn lookup_api_token(pool: &PgPool, raw_token: &str) -> Result<Option<String>, ApiError> {
    let hash = token::hash_token(raw_token);

    let name: Option<String> =
        sqlx::query_scalar("SELECT name FROM api_tokens WHERE token_hash = $1")
            .bind(&hash)
            .fetch_optional(pool)
            .await?;

    if name.is_some() {
        // fire-and-forget
        let pool = pool.clone();
        tokio::spawn(async move {
            let _ = sqlx::query("UPDATE api_tokens SET last_used_at = now() WHERE token_hash = $1")
                .bind(hash)
                .execute(&pool)
                .await;
        });
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn make_parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/test");
        for &(k, v) in headers {
            builder = builder.header(k, v);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn bearer_token_valid() {
        let parts = make_parts(&[("authorization", "Bearer abc123")]);
        assert_eq!(extract_bearer_token(&parts), Some("abc123".into()));
    }

    #[test]
    fn bearer_token_missing_header() {
        let parts = make_parts(&[]);
        assert_eq!(extract_bearer_token(&parts), None);
    }

    #[test]
    fn bearer_token_wrong_scheme() {
        let parts = make_parts(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_bearer_token(&parts), None);
    }

    #[test]
    fn bearer_token_empty_after_prefix() {
        let parts = make_parts(&[("authorization", "Bearer ")]);
        assert_eq!(extract_bearer_token(&parts), None);
    }

    #[test]
    fn ip_from_forwarded_for_trusted() {
        let parts = make_parts(&[("x-forwarded-for", "1.2.3.4, 5.6.7.8")]);
        assert_eq!(extract_ip(&parts, true), Some("1.2.3.4".into()));
    }

    #[test]
    fn ip_forwarded_for_ignored_when_not_trusted() {
        let parts = make_parts(&[("x-forwarded-for", "1.2.3.4")]);
        assert_eq!(extract_ip(&parts, false), None);
    }

    #[test]
    fn ip_from_connect_info() {
        let mut parts = make_parts(&[]);
        let addr: std::net::SocketAddr = "127.0.0.1:9000".parse().unwrap();
        parts.extensions.insert(axum::extract::ConnectInfo(addr));
        assert_eq!(extract_ip(&parts, false), Some("127.0.0.1".into()));
    }
}
