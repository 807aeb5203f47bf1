// ABOUTME: OAuth 2.0 authorization and token endpoint business logic
// ABOUTME: Drives the authorization-code state machine over the lifecycle manager and store
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Authorization Code Flow
//!
//! Per code the state machine is issued, then either redeemed or expired;
//! nothing else. Redemption consumes the code atomically in the same
//! store primitive that checks its binding, so a second redemption,
//! concurrent or not, cannot succeed. Internal token errors never cross
//! this boundary: they are mapped into the OAuth2 error vocabulary.

use crate::database_plugins::{factory::Database, TokenStore};
use crate::errors::AppError;
use crate::models::{split_scopes, AuthorizationCode, CreateTokenRequest, OAuthClient, TokenPair};
use crate::oauth2::models::{
    AuthorizeRequest, AuthorizeResponse, OAuth2Error, RevokeRequest, TokenGrantRequest,
    TokenGrantResponse,
};
use crate::tokens::manager::TokenLifecycleManager;
use anyhow::Result;
use base64::engine::general_purpose;
use base64::Engine as _;
use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Byte length of generated authorization codes before encoding
const AUTH_CODE_BYTES: usize = 32;

/// OAuth 2.0 authorization server core
pub struct OAuth2AuthorizationServer {
    store: Arc<Database>,
    manager: Arc<TokenLifecycleManager>,
    auth_code_ttl: Duration,
}

impl OAuth2AuthorizationServer {
    /// Create the flow over a store and lifecycle manager
    #[must_use]
    pub fn new(
        store: Arc<Database>,
        manager: Arc<TokenLifecycleManager>,
        auth_code_ttl: Duration,
    ) -> Self {
        Self {
            store,
            manager,
            auth_code_ttl,
        }
    }

    /// Handle an authorization request (GET /oauth2/authorize)
    ///
    /// `user_id` is the already-authenticated end user; authenticating
    /// them is the transport layer's job.
    ///
    /// # Errors
    /// Returns the protocol error for missing parameters, an unsupported
    /// response type, or an unknown client/redirect URI.
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
        user_id: Option<Uuid>,
    ) -> Result<AuthorizeResponse, OAuth2Error> {
        let client_id = require_param(request.client_id.as_deref(), "client_id")?;
        let redirect_uri = require_param(request.redirect_uri.as_deref(), "redirect_uri")?;
        let response_type = require_param(request.response_type.as_deref(), "response_type")?;
        let state = require_param(request.state.as_deref(), "state")?;

        if response_type != "code" {
            return Err(OAuth2Error::unsupported_response_type());
        }

        let client = self.load_active_client(client_id).await?;

        if !client.redirect_uris.iter().any(|uri| uri == redirect_uri) {
            return Err(OAuth2Error::invalid_request("Invalid redirect_uri"));
        }

        let user_id =
            user_id.ok_or_else(|| OAuth2Error::invalid_request("User authentication required"))?;

        let code = generate_random_string(AUTH_CODE_BYTES).map_err(|e| {
            tracing::error!(error = %e, "failed to generate authorization code");
            OAuth2Error::invalid_request("Failed to generate authorization code")
        })?;

        let now = Utc::now();
        let record = AuthorizationCode {
            code: code.clone(),
            client_id: client.id,
            user_id,
            redirect_uri: redirect_uri.to_owned(),
            scope: request.scope.clone().unwrap_or_default(),
            expires_at: now + self.auth_code_ttl,
            used: false,
            created_at: now,
        };

        if let Err(e) = self.store.create_authorization_code(&record).await {
            tracing::error!(
                client_id = %client.id,
                error = %e,
                "failed to store authorization code"
            );
            return Err(OAuth2Error::invalid_request(
                "Failed to generate authorization code",
            ));
        }

        tracing::info!(client_id = %client.id, user_id = %user_id, "authorization code issued");

        Ok(AuthorizeResponse {
            code,
            state: state.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
        })
    }

    /// Handle a token request (POST /oauth2/token)
    ///
    /// Client credentials are checked before grant-type dispatch for
    /// every grant.
    ///
    /// # Errors
    /// Returns `invalid_client` for bad credentials, `invalid_grant` for
    /// any redemption failure, and `unsupported_grant_type` for unknown
    /// grants.
    pub async fn token(
        &self,
        request: TokenGrantRequest,
    ) -> Result<TokenGrantResponse, OAuth2Error> {
        let client_id = request
            .client_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(OAuth2Error::invalid_client)?;
        let client_secret = request
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(OAuth2Error::invalid_client)?;

        let client = self.load_active_client(client_id).await?;
        verify_client_secret(&client, client_secret)?;

        match request.grant_type.as_deref() {
            Some("authorization_code") => self.handle_authorization_code_grant(&client, request).await,
            Some("refresh_token") => self.handle_refresh_token_grant(request).await,
            _ => Err(OAuth2Error::unsupported_grant_type()),
        }
    }

    /// Handle a revocation request (POST /oauth2/revoke)
    ///
    /// Always reports success once the request is well formed, whether or
    /// not the token existed, to avoid leaking token state.
    ///
    /// # Errors
    /// Returns `invalid_request` only when no token parameter is present.
    pub async fn revoke(&self, request: RevokeRequest) -> Result<(), OAuth2Error> {
        let token = request
            .token
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("token is required"))?;

        if let Err(e) = self.manager.revoke_token(token).await {
            tracing::debug!(
                hint = request.token_type_hint.as_deref().unwrap_or("none"),
                error = %e,
                "revocation request for unusable token"
            );
        }

        Ok(())
    }

    /// Exchange a claimed authorization code for a token pair
    async fn handle_authorization_code_grant(
        &self,
        client: &OAuthClient,
        request: TokenGrantRequest,
    ) -> Result<TokenGrantResponse, OAuth2Error> {
        let code = request
            .code
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("code and redirect_uri are required"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("code and redirect_uri are required"))?;

        // Single atomic claim; binding checks and the single-use flag are
        // one conditional update in the store
        let claimed = self
            .store
            .claim_authorization_code(code, client.id, redirect_uri, Utc::now())
            .await
            .map_err(|e| {
                tracing::error!(client_id = %client.id, error = %e, "authorization code claim failed");
                OAuth2Error::invalid_grant("Failed to consume authorization code")
            })?
            .ok_or_else(|| {
                tracing::warn!(
                    client_id = %client.id,
                    "authorization code rejected: unknown, spent, expired, or mismatched binding"
                );
                OAuth2Error::invalid_grant("Invalid or expired authorization code")
            })?;

        let user = self
            .store
            .get_user(claimed.user_id)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %claimed.user_id, error = %e, "user lookup failed");
                OAuth2Error::invalid_grant("Invalid or expired authorization code")
            })?
            .filter(|user| user.is_active)
            .ok_or_else(|| {
                tracing::warn!(user_id = %claimed.user_id, "code redeemed for missing or inactive user");
                OAuth2Error::invalid_grant("Invalid or expired authorization code")
            })?;

        let token_request = CreateTokenRequest {
            user_id: user.id,
            application_id: client.id,
            scopes: split_scopes(&claimed.scope),
            email: user.email,
        };

        let pair = self
            .manager
            .create_token_pair(&token_request)
            .await
            .map_err(|e| {
                tracing::error!(client_id = %client.id, error = %e, "token issuance failed during code redemption");
                OAuth2Error::invalid_grant("Failed to issue tokens")
            })?;

        let scope = if claimed.scope.is_empty() {
            None
        } else {
            Some(claimed.scope)
        };

        Ok(grant_response(pair, scope))
    }

    /// Rotate a refresh token into a new pair
    async fn handle_refresh_token_grant(
        &self,
        request: TokenGrantRequest,
    ) -> Result<TokenGrantResponse, OAuth2Error> {
        let refresh_token = request
            .refresh_token
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("refresh_token is required"))?;

        let pair = self.manager.refresh_tokens(refresh_token).await.map_err(|e| {
            tracing::warn!(error = %e, "refresh token grant rejected");
            OAuth2Error::invalid_grant("Invalid or expired refresh token")
        })?;

        Ok(grant_response(pair, None))
    }

    /// Resolve a client id string to an active registered client
    async fn load_active_client(&self, client_id: &str) -> Result<OAuthClient, OAuth2Error> {
        let client_uuid = Uuid::parse_str(client_id).map_err(|_| {
            tracing::warn!(client_id, "malformed client id");
            OAuth2Error::invalid_client()
        })?;

        self.store
            .get_client(client_uuid)
            .await
            .map_err(|e| {
                tracing::error!(client_id, error = %e, "client lookup failed");
                OAuth2Error::invalid_client()
            })?
            .filter(|client| client.active)
            .ok_or_else(|| {
                tracing::warn!(client_id, "unknown or inactive client");
                OAuth2Error::invalid_client()
            })
    }
}

/// Build a token grant response from an issued pair
fn grant_response(pair: TokenPair, scope: Option<String>) -> TokenGrantResponse {
    TokenGrantResponse {
        access_token: pair.access_token.token,
        token_type: "Bearer".to_owned(),
        expires_in: pair.access_token.expires_in,
        scope,
        refresh_token: Some(pair.refresh_token.token),
    }
}

/// Require a non-empty request parameter
fn require_param<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, OAuth2Error> {
    value
        .filter(|s| !s.is_empty())
        .ok_or_else(|| OAuth2Error::invalid_request(&format!("{name} is required")))
}

/// Verify a client secret in constant time against its stored digest
fn verify_client_secret(client: &OAuthClient, secret: &str) -> Result<(), OAuth2Error> {
    let computed = hash_client_secret(secret);
    if computed
        .as_bytes()
        .ct_eq(client.secret_hash.as_bytes())
        .into()
    {
        Ok(())
    } else {
        tracing::warn!(client_id = %client.id, "client secret validation failed");
        Err(OAuth2Error::invalid_client())
    }
}

/// Hash a client secret to its stored hex SHA-256 digest
#[must_use]
pub fn hash_client_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate `length` random bytes as URL-safe base64
///
/// # Errors
/// Returns an error if the system RNG fails; the server cannot mint
/// codes securely without working RNG.
pub fn generate_random_string(length: usize) -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!("system RNG failure, cannot generate secure random bytes: {e:?}");
        anyhow::Error::new(AppError::internal("system RNG failure"))
    })?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}
