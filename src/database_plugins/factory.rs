// ABOUTME: Database factory and backend dispatch for the token store
// ABOUTME: Detects the backend from the connection string and delegates every store operation
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database factory
//!
//! Creates the right [`TokenStore`] backend from a connection string and
//! wraps it in a single [`Database`] value the rest of the server can
//! hold without caring which engine is underneath.

use super::sqlite::SqliteDatabase;
use super::TokenStore;
use crate::models::{
    AccessToken, AuthorizationCode, OAuthClient, RefreshToken, UserRecord,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// Embedded SQLite
    Sqlite,
}

/// Database instance wrapper delegating to the selected backend
///
/// PostgreSQL is an extension point: `postgres://` URLs are recognized
/// and rejected with a configuration error rather than silently treated
/// as a file path.
#[derive(Clone)]
pub enum Database {
    /// SQLite backend
    Sqlite(SqliteDatabase),
}

impl Database {
    /// Create a database instance based on the connection string
    ///
    /// # Errors
    /// Returns an error if the URL names an unavailable backend or the
    /// connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self> {
        if database_url.starts_with("sqlite:") {
            info!("Connecting to SQLite database");
            let db = SqliteDatabase::connect(database_url).await?;
            return Ok(Self::Sqlite(db));
        }

        if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            return Err(anyhow!(
                "PostgreSQL backend is not compiled into this build; use a sqlite: URL"
            ));
        }

        Err(anyhow!("unsupported database URL: {database_url}"))
    }

    /// Describe the active backend
    #[must_use]
    pub const fn backend_info(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "SQLite (embedded)",
        }
    }

    /// The active backend type
    #[must_use]
    pub const fn database_type(&self) -> DatabaseType {
        match self {
            Self::Sqlite(_) => DatabaseType::Sqlite,
        }
    }
}

#[async_trait]
impl TokenStore for Database {
    async fn connect(database_url: &str) -> Result<Self> {
        Self::new(database_url).await
    }

    async fn migrate(&self) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.migrate().await,
        }
    }

    async fn create_access_token(&self, token: &AccessToken) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.create_access_token(token).await,
        }
    }

    async fn insert_access_token_checked(
        &self,
        token: &AccessToken,
        max_per_user: i64,
    ) -> Result<bool> {
        match self {
            Self::Sqlite(db) => db.insert_access_token_checked(token, max_per_user).await,
        }
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>> {
        match self {
            Self::Sqlite(db) => db.get_access_token(token).await,
        }
    }

    async fn get_access_token_by_id(&self, id: Uuid) -> Result<Option<AccessToken>> {
        match self {
            Self::Sqlite(db) => db.get_access_token_by_id(id).await,
        }
    }

    async fn update_access_token(&self, token: &AccessToken) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.update_access_token(token).await,
        }
    }

    async fn revoke_access_token(&self, token: &str) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.revoke_access_token(token).await,
        }
    }

    async fn revoke_access_token_by_id(&self, id: Uuid) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.revoke_access_token_by_id(id).await,
        }
    }

    async fn create_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.create_refresh_token(token).await,
        }
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        match self {
            Self::Sqlite(db) => db.get_refresh_token(token).await,
        }
    }

    async fn get_refresh_token_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>> {
        match self {
            Self::Sqlite(db) => db.get_refresh_token_by_id(id).await,
        }
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.revoke_refresh_token(token).await,
        }
    }

    async fn revoke_refresh_token_by_id(&self, id: Uuid) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.revoke_refresh_token_by_id(id).await,
        }
    }

    async fn revoke_token_pair(&self, access_token_id: Uuid) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.revoke_token_pair(access_token_id).await,
        }
    }

    async fn revoke_all_user_tokens(&self, user_id: Uuid) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.revoke_all_user_tokens(user_id).await,
        }
    }

    async fn revoke_all_application_tokens(&self, application_id: Uuid) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.revoke_all_application_tokens(application_id).await,
        }
    }

    async fn count_active_tokens_for_user(&self, user_id: Uuid) -> Result<(i64, i64)> {
        match self {
            Self::Sqlite(db) => db.count_active_tokens_for_user(user_id).await,
        }
    }

    async fn count_active_tokens(&self) -> Result<i64> {
        match self {
            Self::Sqlite(db) => db.count_active_tokens().await,
        }
    }

    async fn delete_expired_tokens(&self) -> Result<u64> {
        match self {
            Self::Sqlite(db) => db.delete_expired_tokens().await,
        }
    }

    async fn delete_revoked_tokens_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match self {
            Self::Sqlite(db) => db.delete_revoked_tokens_older_than(cutoff).await,
        }
    }

    async fn delete_expired_authorization_codes(&self, now: DateTime<Utc>) -> Result<u64> {
        match self {
            Self::Sqlite(db) => db.delete_expired_authorization_codes(now).await,
        }
    }

    async fn create_authorization_code(&self, code: &AuthorizationCode) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.create_authorization_code(code).await,
        }
    }

    async fn claim_authorization_code(
        &self,
        code: &str,
        client_id: Uuid,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>> {
        match self {
            Self::Sqlite(db) => {
                db.claim_authorization_code(code, client_id, redirect_uri, now)
                    .await
            }
        }
    }

    async fn create_client(&self, client: &OAuthClient) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.create_client(client).await,
        }
    }

    async fn get_client(&self, client_id: Uuid) -> Result<Option<OAuthClient>> {
        match self {
            Self::Sqlite(db) => db.get_client(client_id).await,
        }
    }

    async fn create_user(&self, user: &UserRecord) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.create_user(user).await,
        }
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        match self {
            Self::Sqlite(db) => db.get_user(user_id).await,
        }
    }
}
