//! Password recovery endpoints.
//!
//! A request issues a short-lived one-time code bound to the account's
//! email; verification redeems the code and sets the new password. Success
//! never opens a session; the caller logs in with the new password.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::error;

use super::types::{
    MessageResponse, RecoveryRequest, RecoveryRequestResponse, RecoveryVerifyRequest,
};
use super::{normalize_email, MIN_PASSWORD_LEN};
use crate::api::state::AppState;
use crate::identity::{IdentityError, OtpIssued, UserId};

const ACCOUNT_NOT_FOUND: &str = "No account matches that user ID and email.";

#[utoipa::path(
    post,
    path = "/v1/recovery/request",
    request_body = RecoveryRequest,
    responses(
        (status = 202, description = "Code issued", body = RecoveryRequestResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 404, description = "Unknown user ID / email pair", body = String)
    ),
    tag = "recovery"
)]
pub async fn recovery_request(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RecoveryRequest>>,
) -> impl IntoResponse {
    let request: RecoveryRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // Malformed IDs get the same answer as unknown ones.
    let Ok(user_id) = request.user_id.trim().to_uppercase().parse::<UserId>() else {
        return (StatusCode::NOT_FOUND, ACCOUNT_NOT_FOUND.to_string()).into_response();
    };
    let email = normalize_email(&request.email);

    match state.otp().issue(&user_id, &email).await {
        Ok(issued) => {
            let dev_code = match issued {
                OtpIssued::Preview(code) if state.config().dev_mail_preview() => Some(code),
                OtpIssued::Preview(_) | OtpIssued::Sent => None,
            };
            (
                StatusCode::ACCEPTED,
                Json(RecoveryRequestResponse {
                    message: "One-time code sent to your email.".to_string(),
                    dev_code,
                }),
            )
                .into_response()
        }
        Err(IdentityError::NotFound) => {
            (StatusCode::NOT_FOUND, ACCOUNT_NOT_FOUND.to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to issue recovery code: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/recovery/verify",
    request_body = RecoveryVerifyRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid code or password", body = String),
        (status = 404, description = "No active recovery request", body = String),
        (status = 410, description = "Code expired", body = String)
    ),
    tag = "recovery"
)]
pub async fn recovery_verify(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RecoveryVerifyRequest>>,
) -> impl IntoResponse {
    let request: RecoveryVerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let new_password = request.new_password.expose_secret();
    if new_password.len() < MIN_PASSWORD_LEN {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters.".to_string(),
        )
            .into_response();
    }
    if new_password != request.confirm_password.expose_secret() {
        return (StatusCode::BAD_REQUEST, "Passwords do not match.".to_string()).into_response();
    }

    let Ok(user_id) = request.user_id.trim().to_uppercase().parse::<UserId>() else {
        return (StatusCode::NOT_FOUND, ACCOUNT_NOT_FOUND.to_string()).into_response();
    };
    let email = normalize_email(&request.email);
    let code = request.code.trim();

    match state.otp().verify(&user_id, code, &email, new_password).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Password updated. Please log in with your new password.".to_string(),
            }),
        )
            .into_response(),
        Err(IdentityError::NotFound) => (
            StatusCode::NOT_FOUND,
            "No active recovery request. Request a new code.".to_string(),
        )
            .into_response(),
        Err(IdentityError::Expired) => (
            StatusCode::GONE,
            "The code has expired. Request a new one.".to_string(),
        )
            .into_response(),
        Err(IdentityError::Mismatch) => (
            StatusCode::BAD_REQUEST,
            "Incorrect code. Please check and try again.".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to verify recovery code: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
