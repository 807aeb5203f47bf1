// ABOUTME: Token provider abstraction, provider registry, and token lifecycle orchestration
// ABOUTME: Pluggable signing backends behind one capability set, selected by provider tag
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Token Core
//!
//! The stateless [`TokenProvider`] capability set, the JWT/HMAC backend
//! implementing it, the [`ProviderRegistry`] that maps provider tags to
//! instances, and the stateful [`manager::TokenLifecycleManager`] that
//! combines a provider with the token store.

/// Claims model signed into every token
pub mod claims;
/// Retention sweep background task
pub mod cleanup;
/// Closed token-error taxonomy
pub mod errors;
/// HMAC-signed JWT provider
pub mod jwt;
/// Token lifecycle manager
pub mod manager;

use crate::models::{CreateTokenRequest, TokenType};
use chrono::{DateTime, Duration, Utc};
use claims::Claims;
use errors::TokenError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Tags for the pluggable token backends
///
/// Only [`TokenProviderKind::Jwt`] ships an implementation; the remaining
/// tags are extension points for asymmetric, encrypted, and
/// database-backed opaque tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenProviderKind {
    /// HMAC-signed JWT
    Jwt,
    /// PASETO tokens (extension point)
    Paseto,
    /// Encrypted JWE tokens (extension point)
    Jwe,
    /// Opaque store-backed tokens (extension point)
    Opaque,
}

impl fmt::Display for TokenProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jwt => write!(f, "jwt"),
            Self::Paseto => write!(f, "paseto"),
            Self::Jwe => write!(f, "jwe"),
            Self::Opaque => write!(f, "opaque"),
        }
    }
}

/// Stateless metadata view of a token, no store access involved
#[derive(Debug, Clone)]
pub struct TokenIntrospection {
    /// Backend that produced the token
    pub provider_kind: TokenProviderKind,
    /// Token type claim
    pub token_type: TokenType,
    /// Record id claim
    pub token_id: uuid::Uuid,
    /// Owning user
    pub user_id: uuid::Uuid,
    /// Application the token was issued to
    pub application_id: uuid::Uuid,
    /// Issued-at instant
    pub issued_at: DateTime<Utc>,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
    /// Whether the embedded expiry has passed
    pub expired: bool,
}

/// Capability set every token backend implements
///
/// Providers are pure cryptographic engines: they turn a request into a
/// signed, self-describing token and back, and never touch the database.
pub trait TokenProvider: Send + Sync {
    /// The tag this backend registers under
    fn kind(&self) -> TokenProviderKind;

    /// Mint a signed access token for the request
    ///
    /// # Errors
    /// Returns [`TokenError::SigningFailed`] if the configured key cannot
    /// sign the claims.
    fn generate_access_token(
        &self,
        request: &CreateTokenRequest,
    ) -> Result<(String, Claims), TokenError>;

    /// Mint the refresh token paired with a just-issued access token
    ///
    /// Derived from the access token's claims rather than the raw
    /// request: the scope set collapses to the refresh sentinel, the
    /// audience is restricted to the issuer, and the access token id is
    /// recorded as a weak back-reference.
    ///
    /// # Errors
    /// Returns [`TokenError::SigningFailed`] if signing fails.
    fn generate_refresh_token(
        &self,
        access_claims: &Claims,
    ) -> Result<(String, Claims), TokenError>;

    /// Verify signature, issuer, and validity window of an access token
    ///
    /// # Errors
    /// Returns the specific [`TokenError`] kind for the failure, including
    /// [`TokenError::WrongType`] when a refresh token is presented.
    fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError>;

    /// Verify signature, issuer, and validity window of a refresh token
    ///
    /// # Errors
    /// Returns the specific [`TokenError`] kind for the failure, including
    /// [`TokenError::WrongType`] when an access token is presented.
    fn validate_refresh_token(&self, token: &str) -> Result<Claims, TokenError>;

    /// Decode claims without verifying signature or expiry
    ///
    /// Cheap pre-check used by revocation to sniff the token type before
    /// any cryptographic work. Never trust the result for authorization.
    ///
    /// # Errors
    /// Returns [`TokenError::Malformed`] if the string cannot be decoded.
    fn extract_claims_unverified(&self, token: &str) -> Result<Claims, TokenError>;

    /// Stateless introspection of a token's metadata
    ///
    /// # Errors
    /// Returns [`TokenError::Malformed`] if the string cannot be decoded.
    fn introspect(&self, token: &str) -> Result<TokenIntrospection, TokenError>;

    /// Configured lifetime for the given token type
    fn token_ttl(&self, token_type: TokenType) -> Duration;
}

/// Registry mapping provider tags to instances, with one default tag
///
/// Constructed explicitly at startup and passed to whatever needs it.
/// There is no process-wide default.
pub struct ProviderRegistry {
    providers: HashMap<TokenProviderKind, Arc<dyn TokenProvider>>,
    default_kind: TokenProviderKind,
}

impl ProviderRegistry {
    /// Create a registry with `provider` registered as the default
    #[must_use]
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        let default_kind = provider.kind();
        let mut providers: HashMap<TokenProviderKind, Arc<dyn TokenProvider>> = HashMap::new();
        providers.insert(default_kind, provider);
        Self {
            providers,
            default_kind,
        }
    }

    /// Register an additional provider under its own tag
    pub fn register(&mut self, provider: Arc<dyn TokenProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// Change the default tag
    ///
    /// # Errors
    /// Returns [`TokenError::ProviderNotFound`] if no provider is
    /// registered under `kind`.
    pub fn set_default(&mut self, kind: TokenProviderKind) -> Result<(), TokenError> {
        if !self.providers.contains_key(&kind) {
            return Err(TokenError::ProviderNotFound(kind));
        }
        self.default_kind = kind;
        Ok(())
    }

    /// Look up a provider by tag
    ///
    /// # Errors
    /// Returns [`TokenError::ProviderNotFound`] if no provider is
    /// registered under `kind`.
    pub fn get(&self, kind: TokenProviderKind) -> Result<&Arc<dyn TokenProvider>, TokenError> {
        self.providers
            .get(&kind)
            .ok_or(TokenError::ProviderNotFound(kind))
    }

    /// The provider registered under the default tag
    #[must_use]
    pub fn default_provider(&self) -> &Arc<dyn TokenProvider> {
        &self.providers[&self.default_kind]
    }

    /// The current default tag
    #[must_use]
    pub const fn default_kind(&self) -> TokenProviderKind {
        self.default_kind
    }
}
