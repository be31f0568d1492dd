//! Federated sign-in endpoints.
//!
//! `/v1/auth/federated` verifies an external ID token and either opens a
//! session or parks the verified identity on the caller's session for
//! profile completion via `/v1/auth/federated/link`.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::session::{extract_session_token, session_cookie};
use super::types::{FederatedAuthRequest, FederatedAuthResponse, FederatedLinkRequest};
use super::{format_phone, valid_phone, DEFAULT_COUNTRY_CODE};
use crate::api::state::AppState;
use crate::identity::{IdentityError, Resolution, SessionManager, UserId};

#[utoipa::path(
    post,
    path = "/v1/auth/federated",
    request_body = FederatedAuthRequest,
    responses(
        (status = 200, description = "Authenticated or link required", body = FederatedAuthResponse),
        (status = 401, description = "Token verification failed", body = String),
        (status = 403, description = "No matching account for a login attempt", body = String),
        (status = 503, description = "Federated sign-in not configured", body = String)
    ),
    tag = "auth"
)]
pub async fn federated_auth(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<FederatedAuthRequest>>,
) -> impl IntoResponse {
    let Some(broker) = state.broker() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Federated sign-in is not configured.".to_string(),
        )
            .into_response();
    };
    let request: FederatedAuthRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let claims = match broker.verify_token(&request.credential).await {
        Ok(claims) => claims,
        Err(err) if err.is_credential_failure() => {
            return (
                StatusCode::UNAUTHORIZED,
                "Could not verify the sign-in token.".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Token verification failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let resolution = match broker.resolve(&claims, request.intent).await {
        Ok(resolution) => resolution,
        Err(err) => {
            error!("Failed to resolve federated identity: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match resolution {
        Resolution::LoginSession(user_id) => establish_session(&state, user_id).await,
        Resolution::PendingLink(pending) => {
            // Reuse the caller's session token when one is present so the
            // pending identity stays attached to the browser that started
            // the flow.
            let token = match extract_session_token(&headers) {
                Some(token) => token,
                None => match SessionManager::generate_token() {
                    Ok(token) => token,
                    Err(err) => {
                        error!("Failed to generate session token: {err}");
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                },
            };
            let email = pending.email.clone();
            let name = pending.name.clone();
            state.sessions().stash_pending(&token, pending).await;

            let mut response_headers = HeaderMap::new();
            match session_cookie(state.config(), &token) {
                Ok(cookie) => {
                    response_headers.insert(SET_COOKIE, cookie);
                }
                Err(err) => {
                    error!("Failed to build session cookie: {err}");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
            (
                StatusCode::OK,
                response_headers,
                Json(FederatedAuthResponse {
                    status: "link_required".to_string(),
                    user_id: None,
                    email: Some(email),
                    name: Some(name),
                }),
            )
                .into_response()
        }
        Resolution::Rejected => (
            StatusCode::FORBIDDEN,
            "No account found for this email. Please sign up first.".to_string(),
        )
            .into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/federated/link",
    request_body = FederatedLinkRequest,
    responses(
        (status = 200, description = "Account created and authenticated", body = FederatedAuthResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "No pending federated identity", body = String),
        (status = 409, description = "Email already linked", body = String),
        (status = 503, description = "Federated sign-in not configured", body = String)
    ),
    tag = "auth"
)]
pub async fn federated_link(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<FederatedLinkRequest>>,
) -> impl IntoResponse {
    let Some(broker) = state.broker() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Federated sign-in is not configured.".to_string(),
        )
            .into_response();
    };
    let request: FederatedLinkRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let Some(token) = extract_session_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            "Sign in with your provider first.".to_string(),
        )
            .into_response();
    };
    let Some(pending) = state.sessions().pending(&token).await else {
        return (
            StatusCode::UNAUTHORIZED,
            "Sign in with your provider first.".to_string(),
        )
            .into_response();
    };

    let full_name = request.full_name.trim().to_string();
    if full_name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Full name is required.".to_string()).into_response();
    }
    let country_code = request
        .country_code
        .as_deref()
        .unwrap_or(DEFAULT_COUNTRY_CODE)
        .trim()
        .to_string();
    let phone = request
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|phone| !phone.is_empty());
    if let Some(phone) = phone {
        if !valid_phone(&country_code, phone) {
            return (
                StatusCode::BAD_REQUEST,
                "Please enter a valid phone number.".to_string(),
            )
                .into_response();
        }
    }

    let stored_phone = phone.map(|phone| format_phone(&country_code, phone));
    match broker.complete_link(&pending, &full_name, stored_phone).await {
        Ok(user) => {
            state.sessions().establish(&token, user.user_id).await;
            let mut response_headers = HeaderMap::new();
            match session_cookie(state.config(), &token) {
                Ok(cookie) => {
                    response_headers.insert(SET_COOKIE, cookie);
                }
                Err(err) => {
                    error!("Failed to build session cookie: {err}");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
            (
                StatusCode::OK,
                response_headers,
                Json(FederatedAuthResponse {
                    status: "authenticated".to_string(),
                    user_id: Some(user.user_id),
                    email: Some(user.email),
                    name: Some(user.name),
                }),
            )
                .into_response()
        }
        Err(IdentityError::Conflict(_)) => {
            // Someone else claimed the email while the form was open. The
            // parked identity is useless now.
            state.sessions().discard_pending(&token).await;
            (
                StatusCode::CONFLICT,
                "This email is already linked to an account. Please log in.".to_string(),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to complete account link: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn establish_session(state: &AppState, user_id: UserId) -> axum::response::Response {
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
    (
        StatusCode::OK,
        headers,
        Json(FederatedAuthResponse {
            status: "authenticated".to_string(),
            user_id: Some(user_id),
            email: None,
            name: None,
        }),
    )
        .into_response()
}
