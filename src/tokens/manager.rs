// ABOUTME: Token lifecycle manager combining the cryptographic provider with the durable store
// ABOUTME: Owns pair issuance, two-layer validation, rotation, revocation, and quota enforcement
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Token Lifecycle Manager
//!
//! The only component that mutates the token store. Keeps cryptographic
//! validity and stateful (revocable) validity consistent: every
//! validation checks both the signature and the stored record, and every
//! issuance commits the access token before the refresh token so a crash
//! between the two can only orphan an access token, never produce a
//! refresh token pointing at nothing the caller saw committed.

use crate::database_plugins::{factory::Database, TokenStore};
use crate::models::{
    default_scopes, scopes_as_string, AccessToken, CreateTokenRequest, RefreshToken, TokenPair,
    TokenResponse, TokenStats, TokenType, TokenValidationResult, UserTokenStats,
};
use crate::tokens::claims::Claims;
use crate::tokens::errors::TokenError;
use crate::tokens::{
    ProviderRegistry, TokenIntrospection, TokenProvider, TokenProviderKind,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Default per-user cap on active access tokens
pub const DEFAULT_MAX_TOKENS_PER_USER: i64 = 10;

/// Stateful orchestrator for token issuance, validation, rotation, and
/// revocation
pub struct TokenLifecycleManager {
    registry: Arc<ProviderRegistry>,
    store: Arc<Database>,
    max_tokens_per_user: i64,
}

impl TokenLifecycleManager {
    /// Create a manager over a provider registry and token store
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<Database>) -> Self {
        Self {
            registry,
            store,
            max_tokens_per_user: DEFAULT_MAX_TOKENS_PER_USER,
        }
    }

    /// Override the per-user active token quota
    #[must_use]
    pub fn with_max_tokens_per_user(mut self, max: i64) -> Self {
        self.max_tokens_per_user = max;
        self
    }

    /// Issue an access/refresh pair with the default provider
    ///
    /// # Errors
    /// Returns [`TokenError::TooManyTokens`] when the user's active token
    /// quota is exhausted, or the provider/store error otherwise. No
    /// refresh token is ever left behind on partial failure.
    pub async fn create_token_pair(
        &self,
        request: &CreateTokenRequest,
    ) -> Result<TokenPair, TokenError> {
        let provider = self.registry.default_provider().clone();
        self.create_pair_with(&provider, request).await
    }

    /// Issue an access/refresh pair with a specific provider
    ///
    /// # Errors
    /// Same as [`Self::create_token_pair`], plus
    /// [`TokenError::ProviderNotFound`] for an unregistered tag.
    pub async fn create_token_pair_with_provider(
        &self,
        kind: TokenProviderKind,
        request: &CreateTokenRequest,
    ) -> Result<TokenPair, TokenError> {
        let provider = self.registry.get(kind)?.clone();
        self.create_pair_with(&provider, request).await
    }

    async fn create_pair_with(
        &self,
        provider: &Arc<dyn TokenProvider>,
        request: &CreateTokenRequest,
    ) -> Result<TokenPair, TokenError> {
        // Cheap pre-check; the guarded insert below closes the race
        let (active_access, _) = self
            .store
            .count_active_tokens_for_user(request.user_id)
            .await
            .map_err(TokenError::Storage)?;
        if active_access >= self.max_tokens_per_user {
            return Err(TokenError::TooManyTokens);
        }

        let (access_string, access_claims) = provider.generate_access_token(request)?;
        let access_record = AccessToken {
            id: access_claims.token_id,
            token: access_string.clone(),
            user_id: request.user_id,
            application_id: request.application_id,
            scopes: scopes_as_string(&access_claims.scopes),
            expires_at: access_claims.expires_at(),
            revoked: false,
            created_at: access_claims.issued_at(),
        };

        let inserted = self
            .store
            .insert_access_token_checked(&access_record, self.max_tokens_per_user)
            .await
            .map_err(TokenError::Storage)?;
        if !inserted {
            return Err(TokenError::TooManyTokens);
        }

        let (refresh_string, refresh_claims) = match provider.generate_refresh_token(&access_claims)
        {
            Ok(pair) => pair,
            Err(e) => {
                self.cleanup_orphaned_access_token(access_record.id).await;
                return Err(e);
            }
        };

        let refresh_record = RefreshToken {
            id: refresh_claims.token_id,
            token: refresh_string.clone(),
            user_id: request.user_id,
            application_id: request.application_id,
            access_token_id: Some(access_record.id),
            expires_at: refresh_claims.expires_at(),
            revoked: false,
            created_at: refresh_claims.issued_at(),
        };

        if let Err(e) = self.store.create_refresh_token(&refresh_record).await {
            self.cleanup_orphaned_access_token(access_record.id).await;
            return Err(TokenError::Storage(e));
        }

        Ok(TokenPair {
            access_token: token_response(access_string, &access_record.expires_at),
            refresh_token: token_response(refresh_string, &refresh_record.expires_at),
        })
    }

    /// Best-effort revocation of an access token written before a later
    /// step of pair creation failed. At most one orphaned access token
    /// can remain, and only if this also fails.
    async fn cleanup_orphaned_access_token(&self, access_token_id: Uuid) {
        if let Err(e) = self.store.revoke_access_token_by_id(access_token_id).await {
            warn!(
                access_token_id = %access_token_id,
                error = %e,
                "failed to revoke access token after partial pair creation"
            );
        }
    }

    /// Validate a token through both layers
    ///
    /// Layer one is the provider (signature, issuer, validity window,
    /// token type); layer two is the store (record exists by token id,
    /// not revoked, not expired by the stored expiry). Both must pass and
    /// the more specific failure is reported.
    ///
    /// # Errors
    /// Returns the specific [`TokenError`] kind of whichever layer failed.
    pub async fn validate_token(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<TokenValidationResult, TokenError> {
        let provider = self.registry.default_provider();
        let claims = match expected {
            TokenType::Access => provider.validate_access_token(token)?,
            TokenType::Refresh => provider.validate_refresh_token(token)?,
        };

        match expected {
            TokenType::Access => self.validate_access_record(claims).await,
            TokenType::Refresh => self.validate_refresh_record(claims).await,
        }
    }

    async fn validate_access_record(
        &self,
        claims: Claims,
    ) -> Result<TokenValidationResult, TokenError> {
        let record = self
            .store
            .get_access_token_by_id(claims.token_id)
            .await
            .map_err(TokenError::Storage)?
            .ok_or(TokenError::NotFound)?;

        if record.revoked {
            return Err(TokenError::Revoked);
        }
        if record.is_expired() {
            return Err(TokenError::Expired);
        }

        Ok(TokenValidationResult {
            expires_at: record.expires_at,
            token_type: TokenType::Access,
            user_id: record.user_id,
            application_id: record.application_id,
            scopes: record.scopes_as_slice(),
            claims,
        })
    }

    async fn validate_refresh_record(
        &self,
        claims: Claims,
    ) -> Result<TokenValidationResult, TokenError> {
        let record = self
            .store
            .get_refresh_token_by_id(claims.token_id)
            .await
            .map_err(TokenError::Storage)?
            .ok_or(TokenError::NotFound)?;

        if record.revoked {
            return Err(TokenError::Revoked);
        }
        if record.is_expired() {
            return Err(TokenError::Expired);
        }

        Ok(TokenValidationResult {
            expires_at: record.expires_at,
            token_type: TokenType::Refresh,
            user_id: record.user_id,
            application_id: record.application_id,
            // Refresh tokens carry no resource scopes
            scopes: Vec::new(),
            claims,
        })
    }

    /// Rotate a refresh token into a brand-new pair
    ///
    /// The new pair is durably stored before the old pair is touched;
    /// failures while revoking the old pair are logged and swallowed, so
    /// the caller always receives the new tokens once they exist.
    ///
    /// # Errors
    /// Returns [`TokenError::RefreshAlreadyUsed`] when a rotated token is
    /// presented again, or the validation/issuance error otherwise.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let validated = match self.validate_token(refresh_token, TokenType::Refresh).await {
            Ok(result) => result,
            Err(TokenError::Revoked) => {
                return Err(self.handle_refresh_reuse(refresh_token).await);
            }
            Err(e) => return Err(e),
        };

        let stored = self
            .store
            .get_refresh_token(refresh_token)
            .await
            .map_err(TokenError::Storage)?
            .ok_or(TokenError::NotFound)?;

        // The signed back-reference and the stored one must agree
        if validated.claims.access_token_id != stored.access_token_id {
            return Err(TokenError::RefreshFamilyMismatch);
        }

        let scopes = self.inherit_scopes(stored.access_token_id).await;

        let request = CreateTokenRequest {
            user_id: stored.user_id,
            application_id: stored.application_id,
            scopes,
            email: validated.claims.email.clone(),
        };

        let pair = self.create_token_pair(&request).await?;

        // Old-pair cleanup is best effort once the new pair is committed
        if let Err(e) = self.store.revoke_refresh_token(refresh_token).await {
            warn!(error = %e, "failed to revoke rotated refresh token");
        }
        if let Some(access_id) = stored.access_token_id {
            if let Err(e) = self.store.revoke_access_token_by_id(access_id).await {
                warn!(
                    access_token_id = %access_id,
                    error = %e,
                    "failed to revoke access token of rotated pair"
                );
            }
        }

        info!(user_id = %stored.user_id, "refresh token rotated");
        Ok(pair)
    }

    /// A revoked refresh token was presented: treat it as reuse of a
    /// rotated token and revoke its paired access token as well
    async fn handle_refresh_reuse(&self, refresh_token: &str) -> TokenError {
        match self.store.get_refresh_token(refresh_token).await {
            Ok(Some(record)) => {
                warn!(
                    user_id = %record.user_id,
                    "rotated refresh token presented again, revoking its pair"
                );
                if let Some(access_id) = record.access_token_id {
                    if let Err(e) = self.store.revoke_access_token_by_id(access_id).await {
                        warn!(
                            access_token_id = %access_id,
                            error = %e,
                            "failed to revoke pair of reused refresh token"
                        );
                    }
                }
                TokenError::RefreshAlreadyUsed
            }
            Ok(None) => TokenError::RefreshAlreadyUsed,
            Err(e) => TokenError::Storage(e),
        }
    }

    /// Scope set for a rotated pair: inherited from the linked access
    /// token, or the defaults when the back-reference dangles
    async fn inherit_scopes(&self, access_token_id: Option<Uuid>) -> Vec<String> {
        let inherited = match access_token_id {
            Some(id) => match self.store.get_access_token_by_id(id).await {
                Ok(Some(original)) => original.scopes_as_slice(),
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(error = %e, "failed to load original access token for scope inheritance");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if inherited.is_empty() {
            default_scopes()
        } else {
            inherited
        }
    }

    /// Revoke a token by its string, auto-detecting the type from
    /// unverified claims before touching the store. Idempotent.
    ///
    /// # Errors
    /// Returns [`TokenError::Malformed`] for undecodable strings or a
    /// store error.
    pub async fn revoke_token(&self, token: &str) -> Result<(), TokenError> {
        let provider = self.registry.default_provider();
        let claims = provider.extract_claims_unverified(token)?;

        match claims.token_type {
            TokenType::Access => self
                .store
                .revoke_access_token(token)
                .await
                .map_err(TokenError::Storage),
            TokenType::Refresh => self
                .store
                .revoke_refresh_token(token)
                .await
                .map_err(TokenError::Storage),
        }
    }

    /// Revoke an access token and its paired refresh tokens. Idempotent.
    ///
    /// # Errors
    /// Returns a store error on connection failure.
    pub async fn revoke_token_pair(&self, access_token_id: Uuid) -> Result<(), TokenError> {
        self.store
            .revoke_token_pair(access_token_id)
            .await
            .map_err(TokenError::Storage)
    }

    /// Revoke every token issued to a user. Idempotent.
    ///
    /// # Errors
    /// Returns a store error on connection failure.
    pub async fn revoke_all_user_tokens(&self, user_id: Uuid) -> Result<(), TokenError> {
        info!(user_id = %user_id, "revoking all tokens for user");
        self.store
            .revoke_all_user_tokens(user_id)
            .await
            .map_err(TokenError::Storage)
    }

    /// Revoke every token issued to an application. Idempotent.
    ///
    /// # Errors
    /// Returns a store error on connection failure.
    pub async fn revoke_all_application_tokens(
        &self,
        application_id: Uuid,
    ) -> Result<(), TokenError> {
        info!(application_id = %application_id, "revoking all tokens for application");
        self.store
            .revoke_all_application_tokens(application_id)
            .await
            .map_err(TokenError::Storage)
    }

    /// Stateless introspection via the default provider
    ///
    /// # Errors
    /// Returns [`TokenError::Malformed`] for undecodable strings.
    pub fn get_token_info(&self, token: &str) -> Result<TokenIntrospection, TokenError> {
        self.registry.default_provider().introspect(token)
    }

    /// Active token counts for one user
    ///
    /// # Errors
    /// Returns a store error on connection failure.
    pub async fn user_token_stats(&self, user_id: Uuid) -> Result<UserTokenStats, TokenError> {
        let (active_access, active_refresh) = self
            .store
            .count_active_tokens_for_user(user_id)
            .await
            .map_err(TokenError::Storage)?;

        Ok(UserTokenStats {
            user_id,
            active_access,
            active_refresh,
            total_active: active_access + active_refresh,
        })
    }

    /// Global active token count
    ///
    /// # Errors
    /// Returns a store error on connection failure.
    pub async fn token_stats(&self) -> Result<TokenStats, TokenError> {
        let active_tokens = self
            .store
            .count_active_tokens()
            .await
            .map_err(TokenError::Storage)?;

        Ok(TokenStats { active_tokens })
    }

    /// The configured per-user quota
    #[must_use]
    pub const fn max_tokens_per_user(&self) -> i64 {
        self.max_tokens_per_user
    }
}

/// Build the response view of one issued token
fn token_response(token: String, expires_at: &DateTime<Utc>) -> TokenResponse {
    TokenResponse {
        token,
        token_type: "Bearer".to_owned(),
        expires_at: *expires_at,
        expires_in: (*expires_at - Utc::now()).num_seconds(),
    }
}
