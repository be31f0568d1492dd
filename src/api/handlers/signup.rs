//! Local account registration.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::error;

use super::types::{SignupRequest, SignupResponse};
use super::{
    format_phone, normalize_email, valid_email, valid_phone, DEFAULT_COUNTRY_CODE,
    MIN_PASSWORD_LEN,
};
use crate::api::state::AppState;
use crate::identity::{password, IdentityError, NewUser};

#[utoipa::path(
    post,
    path = "/v1/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = SignupResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 409, description = "Email already registered", body = String)
    ),
    tag = "identity"
)]
pub async fn signup(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<SignupRequest>>,
) -> impl IntoResponse {
    let request: SignupRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let full_name = request.full_name.trim().to_string();
    let email = normalize_email(&request.email);
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

    if let Err(message) = validate(&full_name, &email, &request, &country_code, phone) {
        return (StatusCode::BAD_REQUEST, message).into_response();
    }

    let password_hash = match password::hash_password(request.password.expose_secret()) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let profile = NewUser {
        password_hash,
        name: full_name,
        email,
        phone: phone.map(|phone| format_phone(&country_code, phone)),
    };

    match state.store().create_user(profile).await {
        Ok(user) => (
            StatusCode::CREATED,
            Json(SignupResponse {
                user_id: user.user_id,
                name: user.name,
                email: user.email,
            }),
        )
            .into_response(),
        Err(IdentityError::Conflict(_)) => (
            StatusCode::CONFLICT,
            "Email already exists. Please use a different email or login.".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to create user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn validate(
    full_name: &str,
    email: &str,
    request: &SignupRequest,
    country_code: &str,
    phone: Option<&str>,
) -> Result<(), String> {
    if full_name.is_empty() {
        return Err("Full name is required.".to_string());
    }
    if !valid_email(email) {
        return Err("Please enter a valid email address.".to_string());
    }
    let password = request.password.expose_secret();
    if password.is_empty() {
        return Err("Password is required.".to_string());
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err("Password must be at least 8 characters.".to_string());
    }
    if password != request.confirm_password.expose_secret() {
        return Err("Passwords do not match.".to_string());
    }
    if let Some(phone) = phone {
        if !valid_phone(country_code, phone) {
            return Err("Please enter a valid phone number.".to_string());
        }
    }
    Ok(())
}
