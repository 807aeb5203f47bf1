// ABOUTME: Signed claims model embedded in every issued token
// ABOUTME: Carries identity, scope, type, and lineage data; read-only once signed
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Token Claims
//!
//! The [`Claims`] struct is the payload signed into every token. It is
//! produced at signing time and only ever re-derived by re-parsing the
//! token string; nothing mutates a claims value after issuance.

use crate::models::TokenType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims embedded in a signed token
///
/// Registered JWT claims plus the private claims this server relies on.
/// `token_id` always equals the id of the stored token record, which is
/// what lets the lifecycle layer look up revocation state by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the user id as a string
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience. The application id for access tokens; the issuer itself
    /// for refresh tokens, which must never be presentable to resource
    /// servers.
    pub aud: Vec<String>,
    /// Expiry as a unix timestamp
    pub exp: i64,
    /// Issued-at as a unix timestamp
    pub iat: i64,
    /// Not-before as a unix timestamp
    pub nbf: i64,
    /// JWT id, mirrors `token_id`
    pub jti: String,
    /// Owning user
    pub user_id: Uuid,
    /// Application the token was issued to
    pub application_id: Uuid,
    /// User email
    pub email: String,
    /// Scope set
    pub scopes: Vec<String>,
    /// Token type, immutable once signed
    pub token_type: TokenType,
    /// Id of the stored token record
    pub token_id: Uuid,
    /// For refresh tokens, the id of the access token issued alongside
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_id: Option<Uuid>,
    /// Per-refresh-token secret for family-reuse detection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_secret: Option<String>,
    /// Free-form custom claims
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Claims {
    /// Expiry as a `DateTime`
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }

    /// Issued-at as a `DateTime`
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or_else(Utc::now)
    }

    /// Whether the embedded expiry has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// Whether the scope set contains `scope`
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Whether the scope set contains every scope in `required`
    #[must_use]
    pub fn has_all_scopes(&self, required: &[&str]) -> bool {
        required.iter().all(|scope| self.has_scope(scope))
    }

    /// Whether the scope set contains any scope in `required`
    #[must_use]
    pub fn has_any_scope(&self, required: &[&str]) -> bool {
        required.iter().any(|scope| self.has_scope(scope))
    }

    /// Read a custom claim by key
    #[must_use]
    pub fn custom_claim(&self, key: &str) -> Option<&serde_json::Value> {
        self.custom.as_ref().and_then(|map| map.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> Claims {
        let now = Utc::now();
        Claims {
            sub: "user".into(),
            iss: "sso-server".into(),
            aud: vec!["app".into()],
            exp: (now + chrono::Duration::minutes(15)).timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: "id".into(),
            user_id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            email: "user@example.com".into(),
            scopes: vec!["read".into(), "write".into()],
            token_type: TokenType::Access,
            token_id: Uuid::new_v4(),
            access_token_id: None,
            refresh_secret: None,
            custom: None,
        }
    }

    #[test]
    fn test_scope_checks() {
        let claims = sample_claims();
        assert!(claims.has_scope("read"));
        assert!(!claims.has_scope("admin"));
        assert!(claims.has_all_scopes(&["read", "write"]));
        assert!(!claims.has_all_scopes(&["read", "admin"]));
        assert!(claims.has_any_scope(&["admin", "write"]));
    }

    #[test]
    fn test_optional_claims_not_serialized() {
        let claims = sample_claims();
        let json = serde_json::to_string(&claims).unwrap();
        assert!(!json.contains("access_token_id"));
        assert!(!json.contains("refresh_secret"));
    }

    #[test]
    fn test_token_type_encoding() {
        let claims = sample_claims();
        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("\"token_type\":\"access_token\""));
    }
}
