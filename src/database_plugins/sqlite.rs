// ABOUTME: SQLite implementation of the token store using sqlx
// ABOUTME: Stores UUIDs and RFC 3339 timestamps as TEXT, with conditional updates for atomic claims
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite token store
//!
//! Embedded backend for local deployment and testing. Single-use and
//! quota invariants are enforced with single conditional statements so
//! they hold under concurrent connections.

use super::TokenStore;
use crate::models::{
    AccessToken, AuthorizationCode, OAuthClient, RefreshToken, UserRecord,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// SQLite token store
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Access token row mapper
    fn row_to_access_token(row: &SqliteRow) -> Result<AccessToken> {
        Ok(AccessToken {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            token: row.try_get("token")?,
            user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
            application_id: parse_uuid(&row.try_get::<String, _>("application_id")?)?,
            scopes: row.try_get("scopes")?,
            expires_at: parse_datetime(&row.try_get::<String, _>("expires_at")?)?,
            revoked: row.try_get("revoked")?,
            created_at: parse_datetime(&row.try_get::<String, _>("created_at")?)?,
        })
    }

    /// Refresh token row mapper
    fn row_to_refresh_token(row: &SqliteRow) -> Result<RefreshToken> {
        let access_token_id: Option<String> = row.try_get("access_token_id")?;
        Ok(RefreshToken {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            token: row.try_get("token")?,
            user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
            application_id: parse_uuid(&row.try_get::<String, _>("application_id")?)?,
            access_token_id: access_token_id.as_deref().map(parse_uuid).transpose()?,
            expires_at: parse_datetime(&row.try_get::<String, _>("expires_at")?)?,
            revoked: row.try_get("revoked")?,
            created_at: parse_datetime(&row.try_get::<String, _>("created_at")?)?,
        })
    }

    /// Authorization code row mapper
    fn row_to_authorization_code(row: &SqliteRow) -> Result<AuthorizationCode> {
        Ok(AuthorizationCode {
            code: row.try_get("code")?,
            client_id: parse_uuid(&row.try_get::<String, _>("client_id")?)?,
            user_id: parse_uuid(&row.try_get::<String, _>("user_id")?)?,
            redirect_uri: row.try_get("redirect_uri")?,
            scope: row.try_get("scope")?,
            expires_at: parse_datetime(&row.try_get::<String, _>("expires_at")?)?,
            used: row.try_get("used")?,
            created_at: parse_datetime(&row.try_get::<String, _>("created_at")?)?,
        })
    }

    /// Client row mapper
    fn row_to_client(row: &SqliteRow) -> Result<OAuthClient> {
        let redirect_uris: String = row.try_get("redirect_uris")?;
        Ok(OAuthClient {
            id: parse_uuid(&row.try_get::<String, _>("id")?)?,
            name: row.try_get("name")?,
            secret_hash: row.try_get("secret_hash")?,
            redirect_uris: serde_json::from_str(&redirect_uris)
                .context("failed to decode client redirect URIs")?,
            active: row.try_get("active")?,
            created_at: parse_datetime(&row.try_get::<String, _>("created_at")?)?,
        })
    }
}

#[async_trait]
impl TokenStore for SqliteDatabase {
    async fn connect(database_url: &str) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        let pool = SqlitePool::connect(&connection_options)
            .await
            .context("failed to open SQLite database")?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS access_tokens (
                id TEXT PRIMARY KEY,
                token TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL,
                application_id TEXT NOT NULL,
                scopes TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                revoked BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_access_tokens_user ON access_tokens(user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id TEXT PRIMARY KEY,
                token TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL,
                application_id TEXT NOT NULL,
                access_token_id TEXT,
                expires_at TEXT NOT NULL,
                revoked BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_access ON refresh_tokens(access_token_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS authorization_codes (
                code TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL DEFAULT '',
                expires_at TEXT NOT NULL,
                used BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_clients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                secret_hash TEXT NOT NULL,
                redirect_uris TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_access_token(&self, token: &AccessToken) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO access_tokens (id, token, user_id, application_id, scopes, expires_at, revoked, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(token.id.to_string())
        .bind(&token.token)
        .bind(token.user_id.to_string())
        .bind(token.application_id.to_string())
        .bind(&token.scopes)
        .bind(token.expires_at.to_rfc3339())
        .bind(token.revoked)
        .bind(token.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to store access token")?;

        Ok(())
    }

    async fn insert_access_token_checked(
        &self,
        token: &AccessToken,
        max_per_user: i64,
    ) -> Result<bool> {
        // Count and insert in one statement so concurrent issuers for the
        // same user cannot both pass the quota check
        let result = sqlx::query(
            r"
            INSERT INTO access_tokens (id, token, user_id, application_id, scopes, expires_at, revoked, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
            WHERE (
                SELECT COUNT(*) FROM access_tokens
                WHERE user_id = ?3 AND revoked = 0 AND expires_at > ?9
            ) < ?10
            ",
        )
        .bind(token.id.to_string())
        .bind(&token.token)
        .bind(token.user_id.to_string())
        .bind(token.application_id.to_string())
        .bind(&token.scopes)
        .bind(token.expires_at.to_rfc3339())
        .bind(token.revoked)
        .bind(token.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(max_per_user)
        .execute(&self.pool)
        .await
        .context("failed to store access token")?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let row = sqlx::query("SELECT * FROM access_tokens WHERE token = ?1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_access_token).transpose()
    }

    async fn get_access_token_by_id(&self, id: Uuid) -> Result<Option<AccessToken>> {
        let row = sqlx::query("SELECT * FROM access_tokens WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_access_token).transpose()
    }

    async fn update_access_token(&self, token: &AccessToken) -> Result<()> {
        sqlx::query(
            r"
            UPDATE access_tokens
            SET scopes = ?2, expires_at = ?3, revoked = ?4
            WHERE id = ?1
            ",
        )
        .bind(token.id.to_string())
        .bind(&token.scopes)
        .bind(token.expires_at.to_rfc3339())
        .bind(token.revoked)
        .execute(&self.pool)
        .await
        .context("failed to update access token")?;

        Ok(())
    }

    async fn revoke_access_token(&self, token: &str) -> Result<()> {
        sqlx::query("UPDATE access_tokens SET revoked = 1 WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("failed to revoke access token")?;

        Ok(())
    }

    async fn revoke_access_token_by_id(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE access_tokens SET revoked = 1 WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to revoke access token by id")?;

        Ok(())
    }

    async fn create_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO refresh_tokens (id, token, user_id, application_id, access_token_id, expires_at, revoked, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(token.id.to_string())
        .bind(&token.token)
        .bind(token.user_id.to_string())
        .bind(token.application_id.to_string())
        .bind(token.access_token_id.map(|id| id.to_string()))
        .bind(token.expires_at.to_rfc3339())
        .bind(token.revoked)
        .bind(token.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to store refresh token")?;

        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token = ?1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_refresh_token).transpose()
    }

    async fn get_refresh_token_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_refresh_token).transpose()
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("failed to revoke refresh token")?;

        Ok(())
    }

    async fn revoke_refresh_token_by_id(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to revoke refresh token by id")?;

        Ok(())
    }

    async fn revoke_token_pair(&self, access_token_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE access_tokens SET revoked = 1 WHERE id = ?1")
            .bind(access_token_id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to revoke access token of pair")?;

        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE access_token_id = ?1")
            .bind(access_token_id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to revoke refresh token of pair")?;

        Ok(())
    }

    async fn revoke_all_user_tokens(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE access_tokens SET revoked = 1 WHERE user_id = ?1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to revoke user access tokens")?;

        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ?1")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to revoke user refresh tokens")?;

        Ok(())
    }

    async fn revoke_all_application_tokens(&self, application_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE access_tokens SET revoked = 1 WHERE application_id = ?1")
            .bind(application_id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to revoke application access tokens")?;

        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE application_id = ?1")
            .bind(application_id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to revoke application refresh tokens")?;

        Ok(())
    }

    async fn count_active_tokens_for_user(&self, user_id: Uuid) -> Result<(i64, i64)> {
        let now = Utc::now().to_rfc3339();

        let access: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM access_tokens
            WHERE user_id = ?1 AND revoked = 0 AND expires_at > ?2
            ",
        )
        .bind(user_id.to_string())
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        let refresh: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM refresh_tokens
            WHERE user_id = ?1 AND revoked = 0 AND expires_at > ?2
            ",
        )
        .bind(user_id.to_string())
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok((access, refresh))
    }

    async fn count_active_tokens(&self) -> Result<i64> {
        let now = Utc::now().to_rfc3339();

        let access: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM access_tokens WHERE revoked = 0 AND expires_at > ?1",
        )
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        let refresh: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refresh_tokens WHERE revoked = 0 AND expires_at > ?1",
        )
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(access + refresh)
    }

    async fn delete_expired_tokens(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();

        let access = sqlx::query("DELETE FROM access_tokens WHERE expires_at <= ?1")
            .bind(&now)
            .execute(&self.pool)
            .await
            .context("failed to delete expired access tokens")?;

        let refresh = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?1")
            .bind(&now)
            .execute(&self.pool)
            .await
            .context("failed to delete expired refresh tokens")?;

        Ok(access.rows_affected() + refresh.rows_affected())
    }

    async fn delete_revoked_tokens_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff = cutoff.to_rfc3339();

        let access = sqlx::query("DELETE FROM access_tokens WHERE revoked = 1 AND created_at <= ?1")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .context("failed to delete revoked access tokens")?;

        let refresh =
            sqlx::query("DELETE FROM refresh_tokens WHERE revoked = 1 AND created_at <= ?1")
                .bind(&cutoff)
                .execute(&self.pool)
                .await
                .context("failed to delete revoked refresh tokens")?;

        Ok(access.rows_affected() + refresh.rows_affected())
    }

    async fn delete_expired_authorization_codes(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM authorization_codes WHERE expires_at <= ?1 OR used = 1")
                .bind(now.to_rfc3339())
                .execute(&self.pool)
                .await
                .context("failed to delete expired authorization codes")?;

        Ok(result.rows_affected())
    }

    async fn create_authorization_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO authorization_codes (code, client_id, user_id, redirect_uri, scope, expires_at, used, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(&code.code)
        .bind(code.client_id.to_string())
        .bind(code.user_id.to_string())
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(code.expires_at.to_rfc3339())
        .bind(code.used)
        .bind(code.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to store authorization code")?;

        Ok(())
    }

    async fn claim_authorization_code(
        &self,
        code: &str,
        client_id: Uuid,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>> {
        // The conditional update is the single source of truth for the
        // single-use invariant; only one concurrent claimer can flip the
        // used flag
        let result = sqlx::query(
            r"
            UPDATE authorization_codes
            SET used = 1
            WHERE code = ?1 AND client_id = ?2 AND redirect_uri = ?3
              AND used = 0 AND expires_at > ?4
            ",
        )
        .bind(code)
        .bind(client_id.to_string())
        .bind(redirect_uri)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to claim authorization code")?;

        if result.rows_affected() != 1 {
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM authorization_codes WHERE code = ?1")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .context("failed to load claimed authorization code")?;

        Self::row_to_authorization_code(&row).map(Some)
    }

    async fn create_client(&self, client: &OAuthClient) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth_clients (id, name, secret_hash, redirect_uris, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(client.id.to_string())
        .bind(&client.name)
        .bind(&client.secret_hash)
        .bind(serde_json::to_string(&client.redirect_uris)?)
        .bind(client.active)
        .bind(client.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to store OAuth client")?;

        Ok(())
    }

    async fn get_client(&self, client_id: Uuid) -> Result<Option<OAuthClient>> {
        let row = sqlx::query("SELECT * FROM oauth_clients WHERE id = ?1")
            .bind(client_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_client).transpose()
    }

    async fn create_user(&self, user: &UserRecord) -> Result<()> {
        sqlx::query("INSERT INTO users (id, email, is_active) VALUES (?1, ?2, ?3)")
            .bind(user.id.to_string())
            .bind(&user.email)
            .bind(user.is_active)
            .execute(&self.pool)
            .await
            .context("failed to store user")?;

        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(UserRecord {
                id: parse_uuid(&row.try_get::<String, _>("id")?)?,
                email: row.try_get("email")?,
                is_active: row.try_get("is_active")?,
            })
        })
        .transpose()
    }
}

/// Parse a TEXT column back into a UUID
fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("invalid UUID in database: {value}"))
}

/// Parse an RFC 3339 TEXT column back into a UTC timestamp
fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp in database: {value}"))
}
