// ABOUTME: SSO/OAuth2 authorization server library
// ABOUTME: Credential issuance and validation: token pairs, rotation, revocation, and the code grant
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # SSO Server
//!
//! An OAuth2 authorization server whose core is credential issuance and
//! validation: minting, persisting, verifying, rotating, and revoking
//! access/refresh token pairs, plus the authorization-code and
//! refresh-token grant state machines layered on top.
//!
//! Layers, leaves first:
//!
//! - [`tokens`]: the stateless token provider (JWT/HMAC), the provider
//!   registry, and the stateful lifecycle manager plus retention sweep
//! - [`database_plugins`]: the durable token store boundary and its
//!   SQLite backend
//! - [`oauth2`]: the authorization-code flow and its HTTP surface
//! - [`config`], [`logging`], [`errors`], [`models`]: ambient plumbing

/// Environment-based configuration
pub mod config;
/// Token store boundary and backends
pub mod database_plugins;
/// Application error codes and responses
pub mod errors;
/// Structured logging setup
pub mod logging;
/// Domain entities
pub mod models;
/// OAuth 2.0 authorization server surface
pub mod oauth2;
/// Token provider, registry, lifecycle manager, retention sweep
pub mod tokens;

pub use errors::{AppError, AppResult, ErrorCode};
pub use models::{CreateTokenRequest, TokenPair, TokenType};
pub use tokens::manager::TokenLifecycleManager;
pub use tokens::ProviderRegistry;
