// ABOUTME: SSO server binary: configuration, wiring, and graceful shutdown
// ABOUTME: Builds the provider registry, lifecycle manager, flow, retention task, and HTTP listener
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # SSO Server Binary
//!
//! Starts the OAuth2 authorization server: loads environment
//! configuration, connects the token store, constructs the provider
//! registry and lifecycle manager, spawns the retention sweep, and serves
//! the HTTP routes until shutdown.

use anyhow::Result;
use chrono::Duration;
use sso_server::config::environment::ServerConfig;
use sso_server::database_plugins::factory::Database;
use sso_server::logging;
use sso_server::oauth2::endpoints::OAuth2AuthorizationServer;
use sso_server::oauth2::routes::{router, AppState};
use sso_server::tokens::cleanup::{RetentionConfig, TokenRetentionTask};
use sso_server::tokens::jwt::{JwtConfig, JwtProvider};
use sso_server::tokens::manager::TokenLifecycleManager;
use sso_server::tokens::ProviderRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_env()?;
    config.validate()?;

    logging::init_from_env()?;

    info!("Starting SSO server");
    info!("{}", config.summary());

    let database = Arc::new(Database::new(&config.database.url).await?);
    info!("Database initialized: {}", database.backend_info());

    let provider = JwtProvider::new(JwtConfig {
        secret: config.jwt.secret.clone(),
        access_token_ttl: Duration::seconds(config.jwt.access_expiry_seconds),
        refresh_token_ttl: Duration::seconds(config.jwt.refresh_expiry_seconds),
        issuer: config.jwt.issuer.clone(),
        algorithm: config.jwt.algorithm.clone(),
    })?;
    let registry = Arc::new(ProviderRegistry::new(Arc::new(provider)));

    let manager = Arc::new(
        TokenLifecycleManager::new(registry, database.clone())
            .with_max_tokens_per_user(config.tokens.max_tokens_per_user),
    );

    let oauth2 = Arc::new(OAuth2AuthorizationServer::new(
        database.clone(),
        manager.clone(),
        Duration::seconds(config.oauth.code_expiry_seconds),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let retention = TokenRetentionTask::new(
        database.clone(),
        RetentionConfig {
            sweep_interval: std::time::Duration::from_secs(
                config.tokens.cleanup_interval_seconds,
            ),
            revoked_retention: Duration::days(config.tokens.revoked_retention_days),
        },
        shutdown_rx,
    )
    .spawn();

    let state = AppState {
        manager,
        oauth2,
        issuer_url: config.issuer_url(),
    };
    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the retention sweep after the listener drains
    let _ = shutdown_tx.send(true);
    retention.await?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolve when the process receives SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
