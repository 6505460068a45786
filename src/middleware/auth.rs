use axum::extract::FromRequestParts;
use uuid::Uuid;

use crate::error::AppError;

/// Caller identity injected by the API gateway. Authentication itself happens
/// upstream; this service only trusts the forwarded headers.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub role: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_header = parts
            .headers
            .get("x-user-id")
            .ok_or_else(|| AppError::BadRequest("Missing X-User-Id header".into()))?;

        let user_str = user_header
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid X-User-Id header".into()))?;

        let user_id = Uuid::parse_str(user_str)
            .map_err(|_| AppError::BadRequest("Invalid user id in X-User-Id header".into()))?;

        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("user")
            .to_string();

        Ok(CurrentUser { user_id, role })
    }
}
