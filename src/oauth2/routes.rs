// ABOUTME: HTTP route handlers for the OAuth 2.0 endpoints and token management API
// ABOUTME: Thin axum adapters binding transport payloads and mapping errors to status codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # HTTP Routes
//!
//! Transport wiring only: handlers bind query/form/json payloads, resolve
//! the bearer user where one is needed, call into the core, and translate
//! [`OAuth2Error`] / [`AppError`] into responses. No protocol decisions
//! are made here.

use crate::errors::AppError;
use crate::models::{TokenType, TokenValidationResult};
use crate::oauth2::endpoints::OAuth2AuthorizationServer;
use crate::oauth2::models::{AuthorizeRequest, OAuth2Error, RevokeRequest, TokenGrantRequest};
use crate::tokens::manager::TokenLifecycleManager;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Scope required for the administrative revocation endpoints
const ADMIN_SCOPE: &str = "admin";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Token lifecycle manager
    pub manager: Arc<TokenLifecycleManager>,
    /// Authorization code flow
    pub oauth2: Arc<OAuth2AuthorizationServer>,
    /// Issuer URL advertised by the discovery document
    pub issuer_url: String,
}

/// Assemble the full router
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/.well-known/oauth-authorization-server",
            get(discovery_handler),
        )
        .route("/oauth2/authorize", get(authorize_handler))
        .route("/oauth2/token", post(token_handler))
        .route("/oauth2/revoke", post(revoke_handler))
        .route("/api/tokens/validate", post(validate_handler))
        .route(
            "/api/admin/users/:user_id/tokens",
            delete(revoke_user_tokens_handler),
        )
        .route(
            "/api/admin/applications/:application_id/tokens",
            delete(revoke_application_tokens_handler),
        )
        .with_state(state)
}

/// Service liveness endpoint
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "sso-server",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// OAuth 2.0 discovery document (RFC 8414)
async fn discovery_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let issuer = &state.issuer_url;
    Json(serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth2/authorize"),
        "token_endpoint": format!("{issuer}/oauth2/token"),
        "revocation_endpoint": format!("{issuer}/oauth2/revoke"),
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "response_types_supported": ["code"],
        "token_endpoint_auth_methods_supported": ["client_secret_post"],
        "response_modes_supported": ["query"]
    }))
}

/// GET /oauth2/authorize
async fn authorize_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    let user_id = bearer_user(&state, &headers).await;

    match state.oauth2.authorize(request, user_id).await {
        Ok(response) => Redirect::to(&response.redirect_url()).into_response(),
        Err(error) => oauth2_error_response(&error),
    }
}

/// POST /oauth2/token
async fn token_handler(
    State(state): State<AppState>,
    Form(request): Form<TokenGrantRequest>,
) -> Response {
    match state.oauth2.token(request).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => oauth2_error_response(&error),
    }
}

/// POST /oauth2/revoke
async fn revoke_handler(
    State(state): State<AppState>,
    Form(request): Form<RevokeRequest>,
) -> Response {
    match state.oauth2.revoke(request).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => oauth2_error_response(&error),
    }
}

/// Body of POST /api/tokens/validate
#[derive(Debug, Deserialize)]
struct ValidateTokenRequest {
    /// Token string to validate
    token: String,
    /// Expected type, defaults to access
    token_type: Option<TokenType>,
}

/// POST /api/tokens/validate
async fn validate_handler(
    State(state): State<AppState>,
    Json(request): Json<ValidateTokenRequest>,
) -> Result<Json<TokenValidationResult>, AppError> {
    let expected = request.token_type.unwrap_or(TokenType::Access);
    let result = state.manager.validate_token(&request.token, expected).await?;
    Ok(Json(result))
}

/// DELETE /api/admin/users/{user_id}/tokens
async fn revoke_user_tokens_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers).await?;

    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| AppError::invalid_input("user id must be a UUID"))?;
    state.manager.revoke_all_user_tokens(user_id).await?;

    Ok(Json(serde_json::json!({ "status": "revoked" })))
}

/// DELETE /api/admin/applications/{application_id}/tokens
async fn revoke_application_tokens_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_admin(&state, &headers).await?;

    let application_id = Uuid::parse_str(&application_id)
        .map_err(|_| AppError::invalid_input("application id must be a UUID"))?;
    state
        .manager
        .revoke_all_application_tokens(application_id)
        .await?;

    Ok(Json(serde_json::json!({ "status": "revoked" })))
}

/// Map a protocol error to its HTTP response
fn oauth2_error_response(error: &OAuth2Error) -> Response {
    let status = if error.is_client_authentication_failure() {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(error.clone())).into_response()
}

/// Extract the bearer token from the Authorization header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the authenticated user behind a bearer access token, if any
async fn bearer_user(state: &AppState, headers: &HeaderMap) -> Option<Uuid> {
    let token = bearer_token(headers)?;
    state
        .manager
        .validate_token(token, TokenType::Access)
        .await
        .ok()
        .map(|result| result.user_id)
}

/// Validate the bearer access token and require the admin scope
async fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<TokenValidationResult, AppError> {
    let token = bearer_token(headers).ok_or_else(AppError::auth_required)?;

    let result = state
        .manager
        .validate_token(token, TokenType::Access)
        .await
        .map_err(AppError::from)?;

    if !result.claims.has_scope(ADMIN_SCOPE) {
        return Err(AppError::forbidden("admin scope required"));
    }

    Ok(result)
}
