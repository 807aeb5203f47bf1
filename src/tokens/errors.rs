// ABOUTME: Closed error taxonomy for token generation, validation, and lifecycle operations
// ABOUTME: Every provider and store failure is mapped into one of these kinds before it escapes
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::tokens::TokenProviderKind;
use thiserror::Error;

/// Token-domain errors
///
/// Providers never return raw library errors; every cryptographic or
/// stateful failure is folded into this taxonomy so callers can match on
/// stable kinds.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No stored record exists for the token
    #[error("token not found")]
    NotFound,

    /// The token failed validation for an unclassified reason
    #[error("token is invalid")]
    Invalid,

    /// The token is past its expiry
    #[error("token has expired")]
    Expired,

    /// The stored record is marked revoked
    #[error("token has been revoked")]
    Revoked,

    /// The embedded token-type claim does not match the expected type
    #[error("wrong token type for this operation")]
    WrongType,

    /// Signature verification failed
    #[error("invalid token signature")]
    InvalidSignature,

    /// Claims are present but inconsistent (issuer, audience, subject)
    #[error("invalid token claims")]
    InvalidClaims,

    /// The token string is not a parseable signed structure
    #[error("malformed token")]
    Malformed,

    /// The token's not-before instant is in the future
    #[error("token not yet valid")]
    NotYetValid,

    /// Token material could not be produced
    #[error("failed to create token: {0}")]
    CreationFailed(String),

    /// Signing the claims failed
    #[error("failed to sign token")]
    SigningFailed(#[source] jsonwebtoken::errors::Error),

    /// A rotated refresh token was presented again
    #[error("refresh token already used")]
    RefreshAlreadyUsed,

    /// The refresh token does not belong to the presented access token
    #[error("refresh token does not match access token")]
    RefreshFamilyMismatch,

    /// The per-user active token quota is exhausted
    #[error("too many active tokens for this user")]
    TooManyTokens,

    /// The token's scope set does not cover the operation
    #[error("insufficient scope for this operation")]
    InsufficientScope,

    /// A requested scope is not recognized
    #[error("invalid scope")]
    InvalidScope,

    /// No provider is registered under the requested tag
    #[error("token provider not registered: {0}")]
    ProviderNotFound(TokenProviderKind),

    /// Provider configuration was rejected at construction time
    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    /// The token store failed
    #[error("token store failure")]
    Storage(#[source] anyhow::Error),
}

impl TokenError {
    /// Wrap a store error
    #[must_use]
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
