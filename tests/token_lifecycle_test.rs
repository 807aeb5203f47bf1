// ABOUTME: Integration tests for the token lifecycle manager
// ABOUTME: Covers pair issuance, two-layer validation, rotation, revocation, quota, and retention
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use sso_server::database_plugins::TokenStore;
use sso_server::models::TokenType;
use sso_server::tokens::cleanup::{RetentionConfig, TokenRetentionTask};
use sso_server::tokens::errors::TokenError;
use sso_server::tokens::jwt::JwtConfig;
use sso_server::tokens::manager::TokenLifecycleManager;
use sso_server::tokens::TokenProvider;

#[tokio::test]
async fn test_create_token_pair() {
    let ctx = common::setup().await;

    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read", "write"]))
        .await
        .unwrap();

    assert_eq!(pair.access_token.token_type, "Bearer");
    assert_eq!(pair.refresh_token.token_type, "Bearer");
    assert!(pair.access_token.expires_in > 0);
    assert!(pair.refresh_token.expires_in > pair.access_token.expires_in);
    assert_ne!(pair.access_token.token, pair.refresh_token.token);

    let access = ctx
        .manager
        .validate_token(&pair.access_token.token, TokenType::Access)
        .await
        .unwrap();
    assert_eq!(access.user_id, ctx.user.id);
    assert_eq!(access.application_id, ctx.client.id);
    assert_eq!(access.scopes, vec!["read", "write"]);

    let refresh = ctx
        .manager
        .validate_token(&pair.refresh_token.token, TokenType::Refresh)
        .await
        .unwrap();
    assert_eq!(refresh.user_id, ctx.user.id);
    assert!(refresh.scopes.is_empty());

    // The stored refresh record carries the weak back-reference
    let stored = ctx
        .database
        .get_refresh_token(&pair.refresh_token.token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token_id, Some(access.claims.token_id));
}

#[tokio::test]
async fn test_validate_rejects_wrong_expected_type() {
    let ctx = common::setup().await;
    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();

    assert!(matches!(
        ctx.manager
            .validate_token(&pair.refresh_token.token, TokenType::Access)
            .await,
        Err(TokenError::WrongType)
    ));
    assert!(matches!(
        ctx.manager
            .validate_token(&pair.access_token.token, TokenType::Refresh)
            .await,
        Err(TokenError::WrongType)
    ));
}

#[tokio::test]
async fn test_unstored_token_fails_stateful_layer() {
    let ctx = common::setup().await;

    // Cryptographically valid but never persisted
    let provider = ctx.registry.default_provider();
    let (token, _) = provider
        .generate_access_token(&ctx.token_request(&["read"]))
        .unwrap();

    assert!(matches!(
        ctx.manager.validate_token(&token, TokenType::Access).await,
        Err(TokenError::NotFound)
    ));
}

#[tokio::test]
async fn test_revocation_overrides_valid_signature() {
    let ctx = common::setup().await;
    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();

    ctx.manager.revoke_token(&pair.access_token.token).await.unwrap();

    assert!(matches!(
        ctx.manager
            .validate_token(&pair.access_token.token, TokenType::Access)
            .await,
        Err(TokenError::Revoked)
    ));
}

#[tokio::test]
async fn test_revocation_is_idempotent() {
    let ctx = common::setup().await;
    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();

    ctx.manager.revoke_token(&pair.access_token.token).await.unwrap();
    ctx.manager.revoke_token(&pair.access_token.token).await.unwrap();

    // A signed token that was never stored revokes without error too
    let provider = ctx.registry.default_provider();
    let (unknown, _) = provider
        .generate_access_token(&ctx.token_request(&["read"]))
        .unwrap();
    ctx.manager.revoke_token(&unknown).await.unwrap();
}

#[tokio::test]
async fn test_revoke_token_pair_covers_both_tokens() {
    let ctx = common::setup().await;
    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();

    let access = ctx
        .database
        .get_access_token(&pair.access_token.token)
        .await
        .unwrap()
        .unwrap();

    ctx.manager.revoke_token_pair(access.id).await.unwrap();

    assert!(matches!(
        ctx.manager
            .validate_token(&pair.access_token.token, TokenType::Access)
            .await,
        Err(TokenError::Revoked)
    ));
    assert!(matches!(
        ctx.manager
            .validate_token(&pair.refresh_token.token, TokenType::Refresh)
            .await,
        Err(TokenError::Revoked)
    ));
}

#[tokio::test]
async fn test_rotation_issues_new_pair_and_invalidates_predecessor() {
    let ctx = common::setup().await;
    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read", "write"]))
        .await
        .unwrap();

    let rotated = ctx
        .manager
        .refresh_tokens(&pair.refresh_token.token)
        .await
        .unwrap();

    assert_ne!(rotated.access_token.token, pair.access_token.token);
    assert_ne!(rotated.refresh_token.token, pair.refresh_token.token);

    // Scopes are inherited from the original access token
    let new_access = ctx
        .manager
        .validate_token(&rotated.access_token.token, TokenType::Access)
        .await
        .unwrap();
    assert_eq!(new_access.scopes, vec!["read", "write"]);

    // The old pair is dead
    assert!(matches!(
        ctx.manager
            .validate_token(&pair.refresh_token.token, TokenType::Refresh)
            .await,
        Err(TokenError::Revoked)
    ));
    assert!(matches!(
        ctx.manager
            .validate_token(&pair.access_token.token, TokenType::Access)
            .await,
        Err(TokenError::Revoked)
    ));

    // Reusing the rotated refresh token fails
    assert!(matches!(
        ctx.manager.refresh_tokens(&pair.refresh_token.token).await,
        Err(TokenError::RefreshAlreadyUsed)
    ));

    // The replacement pair still works after the reuse attempt
    ctx.manager
        .validate_token(&rotated.refresh_token.token, TokenType::Refresh)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rotation_falls_back_to_default_scopes_when_original_is_gone() {
    // Access tokens expire immediately; the sweep then deletes them
    let ctx = common::setup_with_provider(JwtConfig {
        access_token_ttl: Duration::seconds(-10),
        ..common::test_jwt_config()
    })
    .await;

    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read", "write"]))
        .await
        .unwrap();

    let deleted = ctx.database.delete_expired_tokens().await.unwrap();
    assert!(deleted >= 1);

    let rotated = ctx
        .manager
        .refresh_tokens(&pair.refresh_token.token)
        .await
        .unwrap();

    let new_access = ctx
        .database
        .get_access_token(&rotated.access_token.token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        new_access.scopes_as_slice(),
        vec!["openid", "profile", "email"]
    );
}

#[tokio::test]
async fn test_quota_boundary() {
    let ctx = common::setup().await;
    let manager = TokenLifecycleManager::new(ctx.registry.clone(), ctx.database.clone())
        .with_max_tokens_per_user(3);

    for _ in 0..3 {
        manager
            .create_token_pair(&ctx.token_request(&["read"]))
            .await
            .unwrap();
    }

    assert!(matches!(
        manager.create_token_pair(&ctx.token_request(&["read"])).await,
        Err(TokenError::TooManyTokens)
    ));

    // Revoking one frees a slot
    let stats = manager.user_token_stats(ctx.user.id).await.unwrap();
    assert_eq!(stats.active_access, 3);
}

#[tokio::test]
async fn test_revoke_all_user_tokens() {
    let ctx = common::setup().await;
    let first = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();
    let second = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["write"]))
        .await
        .unwrap();

    ctx.manager.revoke_all_user_tokens(ctx.user.id).await.unwrap();

    for token in [&first.access_token.token, &second.access_token.token] {
        assert!(matches!(
            ctx.manager.validate_token(token, TokenType::Access).await,
            Err(TokenError::Revoked)
        ));
    }
    for token in [&first.refresh_token.token, &second.refresh_token.token] {
        assert!(matches!(
            ctx.manager.validate_token(token, TokenType::Refresh).await,
            Err(TokenError::Revoked)
        ));
    }

    let stats = ctx.manager.user_token_stats(ctx.user.id).await.unwrap();
    assert_eq!(stats.total_active, 0);
}

#[tokio::test]
async fn test_revoke_all_application_tokens() {
    let ctx = common::setup().await;
    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();

    ctx.manager
        .revoke_all_application_tokens(ctx.client.id)
        .await
        .unwrap();

    assert!(matches!(
        ctx.manager
            .validate_token(&pair.access_token.token, TokenType::Access)
            .await,
        Err(TokenError::Revoked)
    ));
}

#[tokio::test]
async fn test_token_stats() {
    let ctx = common::setup().await;
    assert_eq!(ctx.manager.token_stats().await.unwrap().active_tokens, 0);

    ctx.manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();

    assert_eq!(ctx.manager.token_stats().await.unwrap().active_tokens, 2);

    let stats = ctx.manager.user_token_stats(ctx.user.id).await.unwrap();
    assert_eq!(stats.active_access, 1);
    assert_eq!(stats.active_refresh, 1);
    assert_eq!(stats.total_active, 2);
}

#[tokio::test]
async fn test_create_pair_with_explicit_provider_tag() {
    use sso_server::tokens::TokenProviderKind;

    let ctx = common::setup().await;

    let pair = ctx
        .manager
        .create_token_pair_with_provider(TokenProviderKind::Jwt, &ctx.token_request(&["read"]))
        .await
        .unwrap();
    ctx.manager
        .validate_token(&pair.access_token.token, TokenType::Access)
        .await
        .unwrap();

    assert!(matches!(
        ctx.manager
            .create_token_pair_with_provider(
                TokenProviderKind::Opaque,
                &ctx.token_request(&["read"])
            )
            .await,
        Err(TokenError::ProviderNotFound(TokenProviderKind::Opaque))
    ));
}

#[tokio::test]
async fn test_store_record_update_round_trip() {
    let ctx = common::setup().await;
    let provider = ctx.registry.default_provider();
    let (token, claims) = provider
        .generate_access_token(&ctx.token_request(&["read"]))
        .unwrap();

    let record = sso_server::models::AccessToken {
        id: claims.token_id,
        token,
        user_id: ctx.user.id,
        application_id: ctx.client.id,
        scopes: "read".into(),
        expires_at: claims.expires_at(),
        revoked: false,
        created_at: claims.issued_at(),
    };
    ctx.database.create_access_token(&record).await.unwrap();

    let mut updated = record.clone();
    updated.scopes = "read write".into();
    ctx.database.update_access_token(&updated).await.unwrap();

    let loaded = ctx
        .database
        .get_access_token_by_id(record.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.scopes_as_slice(), vec!["read", "write"]);
    assert_eq!(loaded.token, record.token);
}

#[tokio::test]
async fn test_get_token_info_without_store_access() {
    let ctx = common::setup().await;
    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();

    let info = ctx.manager.get_token_info(&pair.access_token.token).unwrap();
    assert_eq!(info.token_type, TokenType::Access);
    assert_eq!(info.user_id, ctx.user.id);
    assert!(!info.expired);
}

#[tokio::test]
async fn test_retention_sweep_deletes_expired_and_old_revoked_rows() {
    let ctx = common::setup_with_provider(JwtConfig {
        access_token_ttl: Duration::seconds(-10),
        ..common::test_jwt_config()
    })
    .await;

    // One pair with an already-expired access token
    let pair = ctx
        .manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();
    // Revoke the refresh token so the revoked sweep has work too
    ctx.manager.revoke_token(&pair.refresh_token.token).await.unwrap();

    let expired_deleted = ctx.database.delete_expired_tokens().await.unwrap();
    assert_eq!(expired_deleted, 1);

    // Nothing old enough yet with a cutoff in the past
    let none = ctx
        .database
        .delete_revoked_tokens_older_than(Utc::now() - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(none, 0);

    // A future cutoff captures the just-revoked refresh token
    let revoked_deleted = ctx
        .database
        .delete_revoked_tokens_older_than(Utc::now() + Duration::seconds(5))
        .await
        .unwrap();
    assert_eq!(revoked_deleted, 1);

    assert!(ctx
        .database
        .get_refresh_token(&pair.refresh_token.token)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_retention_task_sweeps_and_stops_on_shutdown() {
    let ctx = common::setup_with_provider(JwtConfig {
        access_token_ttl: Duration::seconds(-10),
        ..common::test_jwt_config()
    })
    .await;

    ctx.manager
        .create_token_pair(&ctx.token_request(&["read"]))
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = TokenRetentionTask::new(
        ctx.database.clone(),
        RetentionConfig {
            sweep_interval: std::time::Duration::from_millis(50),
            revoked_retention: Duration::days(30),
        },
        shutdown_rx,
    )
    .spawn();

    // Give the task a few ticks to sweep the expired access token
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let remaining = ctx.database.delete_expired_tokens().await.unwrap();
    assert_eq!(remaining, 0);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("retention task did not stop on shutdown")
        .unwrap();
}
