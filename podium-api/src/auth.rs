use axum::{extract::Request, middleware::Next, response::Response};

use podium_core::error::PodiumError;
use podium_core::identity::Identity;

use crate::error::ApiError;

/// Auth middleware - builds the caller's [`Identity`] from gateway headers.
///
/// The reverse proxy verifies the session with the SSO bridge before any
/// request reaches this service, and forwards the verified claims as
/// `x-auth-*` headers. `x-forwarded-user` / `x-forwarded-email` are accepted
/// as fallbacks for proxies that use the oauth2-proxy header names.
///
/// A verified email is mandatory: the owner key is derived from it, and
/// without one no ownership check is possible.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|h| h.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };

    let email = header("x-auth-email")
        .or_else(|| header("x-forwarded-email"))
        .ok_or(ApiError(PodiumError::NotAuthenticated))?;
    let subject = header("x-auth-subject")
        .or_else(|| header("x-forwarded-user"))
        .unwrap_or_else(|| email.clone());

    let split = |value: Option<String>| {
        value
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    };

    let identity = Identity {
        subject,
        email,
        roles: split(header("x-auth-roles")),
        groups: split(header("x-auth-groups")),
    };

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
