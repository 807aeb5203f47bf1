// ABOUTME: Shared fixtures for integration tests
// ABOUTME: File-backed SQLite store with a seeded client and user, plus manager builders
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use chrono::{Duration, Utc};
use sso_server::database_plugins::factory::Database;
use sso_server::database_plugins::TokenStore;
use sso_server::models::{CreateTokenRequest, OAuthClient, UserRecord};
use sso_server::oauth2::endpoints::{hash_client_secret, OAuth2AuthorizationServer};
use sso_server::tokens::jwt::{JwtConfig, JwtProvider};
use sso_server::tokens::manager::TokenLifecycleManager;
use sso_server::tokens::ProviderRegistry;
use std::sync::Arc;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Secret of the seeded test client
pub const CLIENT_SECRET: &str = "client-s3cret";

/// Primary redirect URI registered for the seeded test client
pub const REDIRECT_URI: &str = "https://app.example.com/callback";

/// Second registered redirect URI, for binding-mismatch tests
pub const OTHER_REDIRECT_URI: &str = "https://app.example.com/other";

/// Everything a test needs: store, manager, and seeded collaborators
pub struct TestContext {
    pub database: Arc<Database>,
    pub registry: Arc<ProviderRegistry>,
    pub manager: Arc<TokenLifecycleManager>,
    pub client: OAuthClient,
    pub user: UserRecord,
    // Keeps the database file alive for the duration of the test
    _db_file: NamedTempFile,
}

impl TestContext {
    /// Authorization server over this context with a 10 minute code TTL
    pub fn oauth2_server(&self) -> OAuth2AuthorizationServer {
        self.oauth2_server_with_code_ttl(Duration::minutes(10))
    }

    /// Authorization server with a custom code TTL
    pub fn oauth2_server_with_code_ttl(&self, ttl: Duration) -> OAuth2AuthorizationServer {
        OAuth2AuthorizationServer::new(self.database.clone(), self.manager.clone(), ttl)
    }

    /// A token request for the seeded user and client
    pub fn token_request(&self, scopes: &[&str]) -> CreateTokenRequest {
        CreateTokenRequest {
            user_id: self.user.id,
            application_id: self.client.id,
            scopes: scopes.iter().map(ToString::to_string).collect(),
            email: self.user.email.clone(),
        }
    }
}

/// Default provider configuration for tests
pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "integration-test-secret-0123456789".into(),
        ..JwtConfig::default()
    }
}

/// Build a context with the default provider configuration
pub async fn setup() -> TestContext {
    setup_with_provider(test_jwt_config()).await
}

/// Build a context with a custom provider configuration
pub async fn setup_with_provider(config: JwtConfig) -> TestContext {
    let db_file = NamedTempFile::new().expect("failed to create temp database file");
    let url = format!("sqlite:{}", db_file.path().display());
    let database = Arc::new(Database::new(&url).await.expect("failed to open database"));

    let provider = JwtProvider::new(config).expect("failed to build provider");
    let registry = Arc::new(ProviderRegistry::new(Arc::new(provider)));
    let manager = Arc::new(TokenLifecycleManager::new(
        registry.clone(),
        database.clone(),
    ));

    let client = OAuthClient {
        id: Uuid::new_v4(),
        name: "integration test app".into(),
        secret_hash: hash_client_secret(CLIENT_SECRET),
        redirect_uris: vec![REDIRECT_URI.into(), OTHER_REDIRECT_URI.into()],
        active: true,
        created_at: Utc::now(),
    };
    database
        .create_client(&client)
        .await
        .expect("failed to seed client");

    let user = UserRecord {
        id: Uuid::new_v4(),
        email: "user@example.com".into(),
        is_active: true,
    };
    database
        .create_user(&user)
        .await
        .expect("failed to seed user");

    TestContext {
        database,
        registry,
        manager,
        client,
        user,
        _db_file: db_file,
    }
}
