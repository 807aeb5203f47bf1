// ABOUTME: Environment-based server configuration with typed sections and validation
// ABOUTME: Every knob has a default suitable for development; production rejects weak secrets
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Server Configuration
//!
//! Environment-only configuration. Variables and defaults:
//!
//! | Variable | Default |
//! |---|---|
//! | `ENV` | `development` |
//! | `HTTP_HOST` / `HTTP_PORT` | `127.0.0.1` / `8080` |
//! | `DATABASE_URL` | `sqlite:./data/sso.db` |
//! | `JWT_SECRET` | insecure development secret |
//! | `JWT_ALGORITHM` | `HS256` |
//! | `JWT_ACCESS_EXPIRY_SECONDS` | `900` (15 minutes) |
//! | `JWT_REFRESH_EXPIRY_SECONDS` | `604800` (7 days) |
//! | `JWT_ISSUER` | `sso-server` |
//! | `OAUTH_CODE_EXPIRY_SECONDS` | `600` (10 minutes) |
//! | `MAX_TOKENS_PER_USER` | `10` |
//! | `TOKEN_CLEANUP_INTERVAL_SECONDS` | `86400` (24 hours) |
//! | `TOKEN_REVOKED_RETENTION_DAYS` | `30` |

use anyhow::{anyhow, Result};
use std::env;
use tracing::warn;

/// Development-only fallback secret; rejected outside development
const INSECURE_DEFAULT_SECRET: &str = "insecure-default-secret-change-me-in-production";

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development, permissive defaults
    Development,
    /// Production, strict validation
    Production,
}

impl Environment {
    /// Parse from the `ENV` variable, defaulting to development
    #[must_use]
    pub fn from_str_or_default(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
}

/// Database settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL, `sqlite:` prefixed
    pub url: String,
}

/// JWT signing settings
#[derive(Debug, Clone)]
pub struct JwtSettings {
    /// HMAC signing secret
    pub secret: String,
    /// Algorithm name, HS256/HS384/HS512
    pub algorithm: String,
    /// Access token lifetime in seconds
    pub access_expiry_seconds: i64,
    /// Refresh token lifetime in seconds
    pub refresh_expiry_seconds: i64,
    /// Issuer embedded in every token
    pub issuer: String,
}

/// OAuth flow settings
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    /// Authorization code lifetime in seconds
    pub code_expiry_seconds: i64,
}

/// Token quota and retention settings
#[derive(Debug, Clone, Copy)]
pub struct TokenLimitsConfig {
    /// Per-user cap on active access tokens
    pub max_tokens_per_user: i64,
    /// Seconds between retention sweeps
    pub cleanup_interval_seconds: u64,
    /// Days revoked records are retained before deletion
    pub revoked_retention_days: i64,
}

/// Full server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Deployment environment
    pub environment: Environment,
    /// HTTP listener
    pub http: HttpConfig,
    /// Database
    pub database: DatabaseConfig,
    /// JWT signing
    pub jwt: JwtSettings,
    /// OAuth flow
    pub oauth: OAuthSettings,
    /// Quotas and retention
    pub tokens: TokenLimitsConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let environment =
            Environment::from_str_or_default(&env_var_or("ENV", "development"));

        Ok(Self {
            environment,
            http: HttpConfig {
                host: env_var_or("HTTP_HOST", "127.0.0.1"),
                port: parse_env("HTTP_PORT", 8080)?,
            },
            database: DatabaseConfig {
                url: env_var_or("DATABASE_URL", "sqlite:./data/sso.db"),
            },
            jwt: JwtSettings {
                secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                    warn!("JWT_SECRET is not set, using an insecure development secret");
                    INSECURE_DEFAULT_SECRET.to_owned()
                }),
                algorithm: env_var_or("JWT_ALGORITHM", "HS256"),
                access_expiry_seconds: parse_env("JWT_ACCESS_EXPIRY_SECONDS", 900)?,
                refresh_expiry_seconds: parse_env("JWT_REFRESH_EXPIRY_SECONDS", 604_800)?,
                issuer: env_var_or("JWT_ISSUER", "sso-server"),
            },
            oauth: OAuthSettings {
                code_expiry_seconds: parse_env("OAUTH_CODE_EXPIRY_SECONDS", 600)?,
            },
            tokens: TokenLimitsConfig {
                max_tokens_per_user: parse_env("MAX_TOKENS_PER_USER", 10)?,
                cleanup_interval_seconds: parse_env("TOKEN_CLEANUP_INTERVAL_SECONDS", 86_400)?,
                revoked_retention_days: parse_env("TOKEN_REVOKED_RETENTION_DAYS", 30)?,
            },
        })
    }

    /// Validate the configuration for the selected environment
    ///
    /// # Errors
    /// Returns an error in production when the JWT secret is missing,
    /// default, or shorter than 32 bytes.
    pub fn validate(&self) -> Result<()> {
        if self.environment == Environment::Production {
            if self.jwt.secret == INSECURE_DEFAULT_SECRET {
                return Err(anyhow!(
                    "JWT_SECRET must be set explicitly in production"
                ));
            }
            if self.jwt.secret.len() < 32 {
                return Err(anyhow!(
                    "JWT_SECRET must be at least 32 characters in production"
                ));
            }
        }
        Ok(())
    }

    /// One-line summary for startup logging, secrets excluded
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "env={:?} listen={}:{} db={} algorithm={} access_ttl={}s refresh_ttl={}s",
            self.environment,
            self.http.host,
            self.http.port,
            self.database.url,
            self.jwt.algorithm,
            self.jwt.access_expiry_seconds,
            self.jwt.refresh_expiry_seconds,
        )
    }

    /// Whether this is a development configuration
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Issuer URL advertised by the discovery document
    #[must_use]
    pub fn issuer_url(&self) -> String {
        format!("http://{}:{}", self.http.host, self.http.port)
    }
}

/// Get an environment variable or a default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable into any FromStr type, with a default
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|e| anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            Environment::from_str_or_default("production"),
            Environment::Production
        );
        assert_eq!(
            Environment::from_str_or_default("PROD"),
            Environment::Production
        );
        assert_eq!(
            Environment::from_str_or_default("anything-else"),
            Environment::Development
        );
    }

    #[test]
    fn test_production_rejects_weak_secret() {
        let mut config = ServerConfig::from_env().unwrap();
        config.environment = Environment::Production;
        config.jwt.secret = "short".into();
        assert!(config.validate().is_err());

        config.jwt.secret = "a".repeat(48);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_summary_excludes_secret() {
        let config = ServerConfig::from_env().unwrap();
        assert!(!config.summary().contains(&config.jwt.secret));
    }
}
