use aqd_core::ServiceError;
use aqd_platform::ApiErrorBody;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Error returned by every handler; renders the failure envelope.
#[derive(Debug)]
pub enum ApiError {
    /// Identity headers missing or malformed.
    Unauthenticated(String),
    /// Request could not be decoded before reaching a service.
    BadRequest(String),
    Service(ServiceError),
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(err) => match err {
                ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
                ServiceError::Authorization(_) => StatusCode::FORBIDDEN,
                ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
                ServiceError::InvalidTransition { .. } | ServiceError::AlreadyReviewed(_) => {
                    StatusCode::CONFLICT
                }
                ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Unauthenticated(message) => ApiErrorBody::new("UNAUTHENTICATED", message),
            ApiError::BadRequest(message) => ApiErrorBody::new("VALIDATION_ERROR", message),
            ApiError::Service(ServiceError::Storage(err)) => {
                error!("request failed: {err:#}");
                ApiErrorBody::new("INTERNAL_ERROR", "internal server error")
            }
            ApiError::Service(err) => ApiErrorBody::new(err.code(), err.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqd_core::ContractStatus;
    use uuid::Uuid;

    fn status_of(err: ServiceError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn validation_maps_to_400() {
        assert_eq!(
            status_of(ServiceError::validation("title is required")),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn authorization_maps_to_403() {
        assert_eq!(
            status_of(ServiceError::unauthorized("admins only")),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(
            status_of(ServiceError::not_found("contract", Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn conflicts_map_to_409() {
        let transition = ServiceError::InvalidTransition {
            from: ContractStatus::Draft,
            to: ContractStatus::Active,
            reason: "no such edge in the transition graph".to_string(),
        };
        assert_eq!(status_of(transition), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ServiceError::AlreadyReviewed(Uuid::new_v4())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn storage_maps_to_500() {
        let err = ServiceError::from(anyhow::anyhow!("pool timed out"));
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_identity_maps_to_401() {
        let response = ApiError::unauthenticated("x-user-id header is required").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
