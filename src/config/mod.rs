// ABOUTME: Configuration module for the SSO server
// ABOUTME: Environment-variable based, typed sections with defaults and validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Environment-variable backed configuration
pub mod environment;

pub use environment::{
    DatabaseConfig, Environment, HttpConfig, JwtSettings, OAuthSettings, ServerConfig,
    TokenLimitsConfig,
};
