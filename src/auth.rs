//! Principal extraction. Identity is established by the gateway in front of
//! this service and passed through as headers; roles are trusted verbatim.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use tracing::{debug, warn};

use crate::api::{ApiError, AppState};
use crate::model::{Principal, Role, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// The authenticated caller of a handler.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

/// Build the principal from request headers. When `gateway_token` is set the
/// request must also carry `Authorization: Bearer <token>`.
pub fn principal_from_headers(
    headers: &HeaderMap,
    gateway_token: Option<&str>,
) -> Result<Principal, ApiError> {
    if let Some(expected) = gateway_token {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected) {
            warn!("request rejected: missing or wrong gateway token");
            return Err(ApiError::Unauthenticated);
        }
    }

    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthenticated)?;

    let mut roles: Vec<Role> = headers
        .get(USER_ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .filter(|r| !r.trim().is_empty())
                .filter_map(|r| match r.parse() {
                    Ok(role) => Some(role),
                    Err(e) => {
                        debug!("ignoring role: {e}");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    if roles.is_empty() {
        roles.push(Role::User);
    }

    Ok(Principal {
        user_id: UserId(user_id.to_string()),
        roles,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers, state.gateway_token.as_deref()).map(AuthUser)
    }
}
