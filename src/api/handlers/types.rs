//! Request/response types for the identity endpoints.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::identity::{LinkIntent, UserId};

#[derive(ToSchema, Deserialize, Debug)]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[schema(value_type = String)]
    pub password: SecretString,
    #[schema(value_type = String)]
    pub confirm_password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupResponse {
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub user_id: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    #[schema(value_type = String)]
    pub user_id: UserId,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct FederatedAuthRequest {
    pub credential: String,
    pub intent: LinkIntent,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FederatedAuthResponse {
    /// `authenticated` or `link_required`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct FederatedLinkRequest {
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RecoveryRequest {
    pub user_id: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoveryRequestResponse {
    pub message: String,
    /// Dev fallback only: the issued code, surfaced for local inspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_code: Option<String>,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RecoveryVerifyRequest {
    pub user_id: String,
    pub email: String,
    pub code: String,
    #[schema(value_type = String)]
    pub new_password: SecretString,
    #[schema(value_type = String)]
    pub confirm_password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}
