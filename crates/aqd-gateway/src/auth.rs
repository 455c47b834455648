use aqd_core::{Actor, Role};
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Identity forwarded by the upstream auth proxy.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Actor);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(CurrentUser)
    }
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let user_id = user_id_from_headers(headers)?;
    let role = header_text(headers, USER_ROLE_HEADER)?
        .parse::<Role>()
        .map_err(ApiError::unauthenticated)?;

    Ok(Actor::new(user_id, role))
}

pub fn user_id_from_headers(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let raw = header_text(headers, USER_ID_HEADER)?;
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::unauthenticated(format!("{USER_ID_HEADER} must be a UUID")))
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .ok_or_else(|| ApiError::unauthenticated(format!("{name} header is required")))?
        .to_str()
        .map_err(|_| ApiError::unauthenticated(format!("{name} header is not valid text")))
}
