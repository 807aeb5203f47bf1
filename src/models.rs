// ABOUTME: Domain models for token records, authorization codes, clients, and users
// ABOUTME: Defines the persisted entities and the request/response shapes of the token core
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Domain Models
//!
//! Persisted entities owned by the token lifecycle core (access tokens,
//! refresh tokens, authorization codes) and the read-only collaborator
//! entities (OAuth clients, users) the core consults at its boundary.

use crate::tokens::claims::Claims;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Scopes applied when a request carries none
pub const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "email"];

/// Sentinel scope carried by refresh tokens instead of resource scopes
pub const REFRESH_SCOPE: &str = "refresh";

/// Token type discriminator embedded in signed claims and used for
/// store dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Short-lived credential presented to resource servers
    #[serde(rename = "access_token")]
    Access,
    /// Longer-lived credential presented only to this server
    #[serde(rename = "refresh_token")]
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => write!(f, "access_token"),
            Self::Refresh => write!(f, "refresh_token"),
        }
    }
}

/// Persisted access token record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// Record id, equal to the `token_id` claim inside the signed token
    pub id: Uuid,
    /// The signed token string
    pub token: String,
    /// Owning user
    pub user_id: Uuid,
    /// Application the token was issued to
    pub application_id: Uuid,
    /// Space-separated scope set
    pub scopes: String,
    /// Hard expiry, authoritative over the signed `exp` claim
    pub expires_at: DateTime<Utc>,
    /// Revocation flag, the only mutable field
    pub revoked: bool,
    /// Issuance time
    pub created_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the stored expiry has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Whether the record is neither expired nor revoked
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.revoked
    }

    /// Split the stored scope string back into a scope set
    #[must_use]
    pub fn scopes_as_slice(&self) -> Vec<String> {
        split_scopes(&self.scopes)
    }
}

/// Persisted refresh token record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Record id, equal to the `token_id` claim inside the signed token
    pub id: Uuid,
    /// The signed token string
    pub token: String,
    /// Owning user
    pub user_id: Uuid,
    /// Application the token was issued to
    pub application_id: Uuid,
    /// Weak back-reference to the access token issued alongside this
    /// record. May dangle once the access token is swept; never enforced
    /// by a foreign key.
    pub access_token_id: Option<Uuid>,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
    /// Revocation flag
    pub revoked: bool,
    /// Issuance time
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Whether the stored expiry has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Whether the record is neither expired nor revoked
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.revoked
    }
}

/// Single-use authorization code issued by the `/oauth2/authorize` step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Opaque code value handed to the client
    pub code: String,
    /// Client the code is bound to
    pub client_id: Uuid,
    /// Authenticated user who approved the grant
    pub user_id: Uuid,
    /// Redirect URI the code must be redeemed with, byte for byte
    pub redirect_uri: String,
    /// Space-separated scope set requested at authorization
    pub scope: String,
    /// Short expiry, minutes from issuance
    pub expires_at: DateTime<Utc>,
    /// Spent flag, flipped atomically at redemption
    pub used: bool,
    /// Issuance time
    pub created_at: DateTime<Utc>,
}

/// Registered OAuth client, managed outside this core and read here to
/// validate client identity and redirect URIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Client id
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Hex-encoded SHA-256 digest of the client secret
    pub secret_hash: String,
    /// Redirect URIs allowed for the authorization code flow
    pub redirect_uris: Vec<String>,
    /// Whether the client may currently be used
    pub active: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

/// User identity record, managed outside this core and read here to
/// resolve the email claim and account status at issuance time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// User id
    pub id: Uuid,
    /// Email address embedded into issued claims
    pub email: String,
    /// Whether the account is active
    pub is_active: bool,
}

/// Request to mint a token pair
#[derive(Debug, Clone)]
pub struct CreateTokenRequest {
    /// User the pair is issued for
    pub user_id: Uuid,
    /// Application the pair is issued to
    pub application_id: Uuid,
    /// Requested scope set; empty means [`DEFAULT_SCOPES`]
    pub scopes: Vec<String>,
    /// Email embedded into the claims
    pub email: String,
}

/// One issued token with its expiry metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The signed token string
    pub token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry at issuance time
    pub expires_in: i64,
}

/// Access/refresh pair returned by issuance and rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// The access token
    pub access_token: TokenResponse,
    /// The refresh token
    pub refresh_token: TokenResponse,
}

/// Outcome of a successful two-layer token validation
#[derive(Debug, Clone, Serialize)]
pub struct TokenValidationResult {
    /// Parsed and verified claims
    pub claims: Claims,
    /// Stored expiry, authoritative over the claim
    pub expires_at: DateTime<Utc>,
    /// Validated token type
    pub token_type: TokenType,
    /// Owning user from the stored record
    pub user_id: Uuid,
    /// Application from the stored record
    pub application_id: Uuid,
    /// Scope set from the stored record
    pub scopes: Vec<String>,
}

/// Active token counts for one user
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UserTokenStats {
    /// User the counts belong to
    pub user_id: Uuid,
    /// Active access tokens
    pub active_access: i64,
    /// Active refresh tokens
    pub active_refresh: i64,
    /// Sum of both
    pub total_active: i64,
}

/// Global active token counts
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenStats {
    /// Active, unrevoked, unexpired tokens across all users
    pub active_tokens: i64,
}

/// Join a scope set into its space-separated string encoding, falling
/// back to [`DEFAULT_SCOPES`] for an empty set
#[must_use]
pub fn scopes_as_string(scopes: &[String]) -> String {
    if scopes.is_empty() {
        return DEFAULT_SCOPES.join(" ");
    }
    scopes.join(" ")
}

/// Split a space-separated scope string back into a scope set. Empty
/// fragments are dropped, so `split(join(s))` reproduces any set of
/// whitespace-free scope names.
#[must_use]
pub fn split_scopes(scopes: &str) -> Vec<String> {
    scopes
        .split_whitespace()
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// The default scope set as owned strings
#[must_use]
pub fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_round_trip() {
        let scopes = vec!["read".to_owned(), "write".to_owned()];
        assert_eq!(split_scopes(&scopes_as_string(&scopes)), scopes);
    }

    #[test]
    fn test_empty_scopes_default() {
        assert_eq!(scopes_as_string(&[]), "openid profile email");
    }

    #[test]
    fn test_split_scopes_drops_extra_whitespace() {
        assert_eq!(split_scopes("  read   write "), vec!["read", "write"]);
        assert!(split_scopes("").is_empty());
    }

    #[test]
    fn test_access_token_validity() {
        let token = AccessToken {
            id: Uuid::new_v4(),
            token: "tok".into(),
            user_id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            scopes: "openid".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            revoked: false,
            created_at: Utc::now(),
        };
        assert!(token.is_valid());

        let expired = AccessToken {
            expires_at: Utc::now() - chrono::Duration::seconds(1),
            ..token.clone()
        };
        assert!(expired.is_expired());
        assert!(!expired.is_valid());

        let revoked = AccessToken {
            revoked: true,
            ..token
        };
        assert!(!revoked.is_valid());
    }
}
