use crate::ratelimit::RateLimited;
use crate::store::StoreError;
use crate::validate::ValidationError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Every way a request can fail. The Display text is what the client sees.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    AuthenticationRequired,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Rate limit exceeded. Please try again in {} seconds.", .0.retry_after_secs())]
    RateLimited(RateLimited),
    #[error("Task not found")]
    NotFound,
    #[error("Not authorized")]
    NotAuthorized,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Email already registered")]
    EmailTaken,
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::AuthenticationRequired | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::NotAuthorized => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::EmailTaken => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RateLimited> for ApiError {
    fn from(limited: RateLimited) -> Self {
        ApiError::RateLimited(limited)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TaskNotFound => ApiError::NotFound,
            StoreError::EmailTaken => ApiError::EmailTaken,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
            }
            ApiError::RateLimited(limited) => {
                let retry = limited.retry_after_secs().to_string();
                return (status, [(header::RETRY_AFTER, retry)], self.to_string()).into_response();
            }
            _ => {}
        }
        (status, self.to_string()).into_response()
    }
}
