// ABOUTME: Background retention sweep deleting expired and long-revoked token records
// ABOUTME: Periodic cancellable task, decoupled from request handling, survives failed sweeps
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Retention Sweep
//!
//! A periodic task that physically deletes what revocation and expiry
//! have already made unusable: token records past their expiry, revoked
//! records older than the retention window, and spent or expired
//! authorization codes. Sweep failures are logged and the loop continues;
//! only the shutdown signal stops it.

use crate::database_plugins::{factory::Database, TokenStore};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Retention sweep settings
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    /// Time between sweeps
    pub sweep_interval: std::time::Duration,
    /// How long revoked records are kept before deletion, independent of
    /// their expiry
    pub revoked_retention: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval: std::time::Duration::from_secs(24 * 60 * 60),
            revoked_retention: Duration::days(30),
        }
    }
}

/// Periodic retention sweeper over the token store
pub struct TokenRetentionTask {
    store: Arc<Database>,
    config: RetentionConfig,
    shutdown: watch::Receiver<bool>,
}

impl TokenRetentionTask {
    /// Create a sweeper bound to a shutdown channel
    #[must_use]
    pub fn new(store: Arc<Database>, config: RetentionConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            store,
            config,
            shutdown,
        }
    }

    /// Spawn the sweep loop onto the runtime
    ///
    /// The task owns its timer and exits only when the shutdown channel
    /// flips to `true` or its sender is dropped.
    #[must_use]
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.config.sweep_interval.as_secs(),
                retention_days = self.config.revoked_retention.num_days(),
                "token retention sweep started"
            );

            let mut interval = tokio::time::interval(self.config.sweep_interval);
            // The first tick fires immediately; skip straight to waiting
            interval.tick().await;

            let mut shutdown = self.shutdown.clone();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep_once().await;
                    }
                    changed = shutdown.changed() => {
                        let stop = changed.is_err() || *shutdown.borrow();
                        if stop {
                            info!("token retention sweep shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// One sweep pass; every failure is logged and swallowed
    async fn sweep_once(&self) {
        match self.store.delete_expired_tokens().await {
            Ok(0) => debug!("retention sweep found no expired tokens"),
            Ok(deleted) => info!(deleted, "retention sweep deleted expired tokens"),
            Err(e) => error!(error = %e, "retention sweep failed to delete expired tokens"),
        }

        let cutoff = Utc::now() - self.config.revoked_retention;
        match self.store.delete_revoked_tokens_older_than(cutoff).await {
            Ok(0) => debug!("retention sweep found no stale revoked tokens"),
            Ok(deleted) => info!(deleted, "retention sweep deleted old revoked tokens"),
            Err(e) => error!(error = %e, "retention sweep failed to delete revoked tokens"),
        }

        match self
            .store
            .delete_expired_authorization_codes(Utc::now())
            .await
        {
            Ok(0) => debug!("retention sweep found no stale authorization codes"),
            Ok(deleted) => info!(deleted, "retention sweep deleted stale authorization codes"),
            Err(e) => {
                error!(error = %e, "retention sweep failed to delete authorization codes");
            }
        }
    }
}
