//! Password login.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::error;

use super::session::session_cookie;
use super::types::{LoginRequest, LoginResponse};
use crate::api::state::AppState;
use crate::identity::{SessionManager, UserId};

const LOGIN_FAILED: &str = "Invalid user ID or password.";

#[utoipa::path(
    post,
    path = "/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Missing payload", body = String),
        (status = 401, description = "Invalid credentials", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // A malformed ID and a wrong password produce the same answer; the
    // endpoint never reveals whether an account exists.
    let Ok(user_id) = request.user_id.trim().to_uppercase().parse::<UserId>() else {
        return (StatusCode::UNAUTHORIZED, LOGIN_FAILED.to_string()).into_response();
    };

    let verified = match state
        .authenticator()
        .verify(&user_id, request.password.expose_secret())
        .await
    {
        Ok(verified) => verified,
        Err(err) => {
            error!("Credential check failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if !verified {
        return (StatusCode::UNAUTHORIZED, LOGIN_FAILED.to_string()).into_response();
    }

    let token = match SessionManager::generate_token() {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to generate session token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    state.sessions().establish(&token, user_id).await;

    let mut headers = HeaderMap::new();
    match session_cookie(state.config(), &token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (StatusCode::OK, headers, Json(LoginResponse { user_id })).into_response()
}
