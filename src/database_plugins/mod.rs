// ABOUTME: Database abstraction layer for the SSO server token store
// ABOUTME: Plugin architecture with a SQLite backend and room for additional engines
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Token Store Boundary
//!
//! The [`TokenStore`] trait is the durable boundary of the token core:
//! token records and their revocation state, authorization codes with an
//! atomic claim primitive, and read-only client/user lookups. Any keyed
//! store with unique-constraint and atomic-update support can implement
//! it.

use crate::models::{
    AccessToken, AuthorizationCode, OAuthClient, RefreshToken, UserRecord,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod factory;
pub mod sqlite;

/// Durable store for tokens, authorization codes, and collaborator lookups
///
/// All mutation of token records flows through the lifecycle manager; the
/// store only promises the primitives below. The authorization-code claim
/// and the quota-checked insert must be atomic with respect to concurrent
/// callers.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Open a connection pool for the given URL
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached or created.
    async fn connect(database_url: &str) -> Result<Self>
    where
        Self: Sized;

    /// Create or update the schema
    ///
    /// # Errors
    /// Returns an error if a migration statement fails.
    async fn migrate(&self) -> Result<()>;

    // ================================
    // Access tokens
    // ================================

    /// Persist a new access token record
    ///
    /// # Errors
    /// Returns an error on connection failure or unique-constraint
    /// violation.
    async fn create_access_token(&self, token: &AccessToken) -> Result<()>;

    /// Persist a new access token only while the user holds fewer than
    /// `max_per_user` active access tokens. Returns `false` without
    /// writing when the quota is exhausted. Count and insert happen in
    /// one atomic statement, so concurrent issuers cannot both slip past
    /// the limit.
    ///
    /// # Errors
    /// Returns an error on connection failure or constraint violation.
    async fn insert_access_token_checked(
        &self,
        token: &AccessToken,
        max_per_user: i64,
    ) -> Result<bool>;

    /// Look up an access token by its token string
    ///
    /// # Errors
    /// Returns an error on connection or decoding failure.
    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>>;

    /// Look up an access token by record id
    ///
    /// # Errors
    /// Returns an error on connection or decoding failure.
    async fn get_access_token_by_id(&self, id: Uuid) -> Result<Option<AccessToken>>;

    /// Update the mutable fields of an access token record
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn update_access_token(&self, token: &AccessToken) -> Result<()>;

    /// Mark an access token revoked by token string. Idempotent.
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn revoke_access_token(&self, token: &str) -> Result<()>;

    /// Mark an access token revoked by record id. Idempotent.
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn revoke_access_token_by_id(&self, id: Uuid) -> Result<()>;

    // ================================
    // Refresh tokens
    // ================================

    /// Persist a new refresh token record
    ///
    /// # Errors
    /// Returns an error on connection failure or unique-constraint
    /// violation.
    async fn create_refresh_token(&self, token: &RefreshToken) -> Result<()>;

    /// Look up a refresh token by its token string
    ///
    /// # Errors
    /// Returns an error on connection or decoding failure.
    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>>;

    /// Look up a refresh token by record id
    ///
    /// # Errors
    /// Returns an error on connection or decoding failure.
    async fn get_refresh_token_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>>;

    /// Mark a refresh token revoked by token string. Idempotent.
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn revoke_refresh_token(&self, token: &str) -> Result<()>;

    /// Mark a refresh token revoked by record id. Idempotent.
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn revoke_refresh_token_by_id(&self, id: Uuid) -> Result<()>;

    // ================================
    // Bulk revocation
    // ================================

    /// Revoke an access token and every refresh token referencing it
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn revoke_token_pair(&self, access_token_id: Uuid) -> Result<()>;

    /// Revoke every token issued to a user
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn revoke_all_user_tokens(&self, user_id: Uuid) -> Result<()>;

    /// Revoke every token issued to an application
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn revoke_all_application_tokens(&self, application_id: Uuid) -> Result<()>;

    // ================================
    // Counts
    // ================================

    /// Active (unrevoked, unexpired) access and refresh counts for a user
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn count_active_tokens_for_user(&self, user_id: Uuid) -> Result<(i64, i64)>;

    /// Active token count across all users
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn count_active_tokens(&self) -> Result<i64>;

    // ================================
    // Retention
    // ================================

    /// Delete token records whose expiry has passed. Returns the number
    /// of deleted rows.
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn delete_expired_tokens(&self) -> Result<u64>;

    /// Delete revoked token records created before `cutoff`. Returns the
    /// number of deleted rows.
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn delete_revoked_tokens_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete authorization codes that are spent or past expiry. Returns
    /// the number of deleted rows.
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn delete_expired_authorization_codes(&self, now: DateTime<Utc>) -> Result<u64>;

    // ================================
    // Authorization codes
    // ================================

    /// Persist a freshly issued authorization code
    ///
    /// # Errors
    /// Returns an error on connection failure or duplicate code value.
    async fn create_authorization_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Atomically claim an authorization code: succeeds at most once per
    /// code, and only when client id and redirect URI match the values
    /// bound at issuance and the code is not expired. A single
    /// conditional update is the source of truth for the single-use
    /// invariant; concurrent claimers race on it, not on a read.
    ///
    /// # Errors
    /// Returns an error on connection failure.
    async fn claim_authorization_code(
        &self,
        code: &str,
        client_id: Uuid,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>>;

    // ================================
    // Collaborator lookups
    // ================================

    /// Persist a registered OAuth client
    ///
    /// # Errors
    /// Returns an error on connection failure or duplicate id.
    async fn create_client(&self, client: &OAuthClient) -> Result<()>;

    /// Resolve a client id to its registered record
    ///
    /// # Errors
    /// Returns an error on connection or decoding failure.
    async fn get_client(&self, client_id: Uuid) -> Result<Option<OAuthClient>>;

    /// Persist a user identity record
    ///
    /// # Errors
    /// Returns an error on connection failure or duplicate id/email.
    async fn create_user(&self, user: &UserRecord) -> Result<()>;

    /// Resolve a user id to its identity record
    ///
    /// # Errors
    /// Returns an error on connection or decoding failure.
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRecord>>;
}
