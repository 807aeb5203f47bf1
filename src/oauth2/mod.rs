// ABOUTME: OAuth 2.0 authorization server surface built on the token lifecycle core
// ABOUTME: Protocol models, the authorization-code flow, and the HTTP routes over it
//
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Authorization code flow business logic
pub mod endpoints;
/// Protocol request/response models and error vocabulary
pub mod models;
/// Axum routes over the flow
pub mod routes;

/// OAuth 2.0 authorization server
pub use endpoints::OAuth2AuthorizationServer;

/// Authorization request
pub use models::AuthorizeRequest;
/// Authorization response
pub use models::AuthorizeResponse;
/// OAuth 2.0 error response
pub use models::OAuth2Error;
/// Revocation request
pub use models::RevokeRequest;
/// Token exchange request
pub use models::TokenGrantRequest;
/// Token exchange response
pub use models::TokenGrantResponse;
