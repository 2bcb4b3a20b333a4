//! Custom Axum extractors for request authentication.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use depwatch_sdk::signature::ADMIN_AUTH_HEADER;

use crate::state::AppState;

/// Proof that the request carried the admin secret in the
/// `Depwatch-Admin-Authorization` header.
///
/// The header holds the plaintext secret; it is checked against the argon2
/// hash from the config file.
pub struct AdminAuth;

#[derive(Debug, thiserror::Error)]
pub enum AdminAuthError {
    #[error("missing Depwatch-Admin-Authorization header")]
    MissingHeader,
    #[error("invalid Depwatch-Admin-Authorization header")]
    InvalidHeader,
    #[error("admin secret mismatch")]
    Unauthorized,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AdminAuthError::InvalidHeader => StatusCode::BAD_REQUEST,
            AdminAuthError::MissingHeader | AdminAuthError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
        };
        (status, self.to_string()).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidHeader)?;

        if state.admin.verify_secret(secret) {
            Ok(AdminAuth)
        } else {
            tracing::warn!("Rejected admin request with a wrong secret");
            Err(AdminAuthError::Unauthorized)
        }
    }
}
