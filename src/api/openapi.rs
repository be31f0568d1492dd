//! OpenAPI document for the identity endpoints.

use utoipa::OpenApi;

use super::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::signup::signup,
        handlers::login::login,
        handlers::session::session,
        handlers::session::logout,
        handlers::federated::federated_auth,
        handlers::federated::federated_link,
        handlers::recovery::recovery_request,
        handlers::recovery::recovery_verify,
    ),
    components(schemas(
        handlers::types::SignupRequest,
        handlers::types::SignupResponse,
        handlers::types::LoginRequest,
        handlers::types::LoginResponse,
        handlers::types::SessionResponse,
        handlers::types::FederatedAuthRequest,
        handlers::types::FederatedAuthResponse,
        handlers::types::FederatedLinkRequest,
        handlers::types::RecoveryRequest,
        handlers::types::RecoveryRequestResponse,
        handlers::types::RecoveryVerifyRequest,
        handlers::types::MessageResponse,
    )),
    tags(
        (name = "identity", description = "Account registration"),
        (name = "auth", description = "Login, sessions, and federated sign-in"),
        (name = "recovery", description = "Password recovery with one-time codes"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
