// ABOUTME: OAuth 2.0 protocol request/response models and the RFC 6749 error vocabulary
// ABOUTME: Transport shapes for the authorize, token, and revoke endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// OAuth 2.0 authorization request (query parameters of `/oauth2/authorize`)
///
/// Every field is optional at the transport layer; presence is validated
/// by the flow so missing parameters surface as `invalid_request` rather
/// than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    /// Response type, must be `code`
    pub response_type: Option<String>,
    /// Client identifier
    pub client_id: Option<String>,
    /// Redirect URI for the response
    pub redirect_uri: Option<String>,
    /// Requested scopes, space separated
    pub scope: Option<String>,
    /// Opaque CSRF correlation value, echoed back unchanged
    pub state: Option<String>,
}

/// OAuth 2.0 authorization response
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    /// Issued authorization code
    pub code: String,
    /// State parameter from the request, echoed unchanged
    pub state: String,
    /// Redirect URI the caller should be sent back to
    #[serde(skip)]
    pub redirect_uri: String,
}

impl AuthorizeResponse {
    /// Build the redirect URL carrying the code and state back to the
    /// client
    #[must_use]
    pub fn redirect_url(&self) -> String {
        format!(
            "{}?code={}&state={}",
            self.redirect_uri,
            urlencoding::encode(&self.code),
            urlencoding::encode(&self.state)
        )
    }
}

/// OAuth 2.0 token request (form body of `/oauth2/token`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenGrantRequest {
    /// Grant type: `authorization_code` or `refresh_token`
    pub grant_type: Option<String>,
    /// Authorization code, for the `authorization_code` grant
    pub code: Option<String>,
    /// Redirect URI, must match the one bound at issuance
    pub redirect_uri: Option<String>,
    /// Client identifier
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
    /// Refresh token, for the `refresh_token` grant
    pub refresh_token: Option<String>,
    /// Requested scopes
    pub scope: Option<String>,
}

/// OAuth 2.0 token response
#[derive(Debug, Serialize)]
pub struct TokenGrantResponse {
    /// The signed access token
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Granted scopes, space separated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// The paired refresh token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// OAuth 2.0 revocation request (form body of `/oauth2/revoke`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevokeRequest {
    /// Token to revoke
    pub token: Option<String>,
    /// Caller's hint about the token type; the server detects the type
    /// itself and the hint is not trusted
    pub token_type_hint: Option<String>,
}

/// OAuth 2.0 error response (RFC 6749 §5.2)
#[derive(Debug, Clone, Serialize)]
pub struct OAuth2Error {
    /// Stable error code from the protocol vocabulary
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// URI for error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl OAuth2Error {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self {
            error: "invalid_client".to_owned(),
            error_description: Some("Client authentication failed".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type".to_owned(),
            error_description: Some("Grant type not supported".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unsupported_response_type` error
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self {
            error: "unsupported_response_type".to_owned(),
            error_description: Some("Only the 'code' response type is supported".to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self {
            error: "invalid_scope".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Whether this error maps to HTTP 401 rather than 400
    #[must_use]
    pub fn is_client_authentication_failure(&self) -> bool {
        self.error == "invalid_client"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_url_encodes_parameters() {
        let response = AuthorizeResponse {
            code: "a code/with specials".into(),
            state: "st&ate".into(),
            redirect_uri: "https://app.example.com/callback".into(),
        };

        let url = response.redirect_url();
        assert!(url.starts_with("https://app.example.com/callback?code="));
        assert!(url.contains("a%20code%2Fwith%20specials"));
        assert!(url.contains("st%26ate"));
    }

    #[test]
    fn test_error_serialization_skips_empty_fields() {
        let error = OAuth2Error {
            error: "invalid_grant".into(),
            error_description: None,
            error_uri: None,
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, "{\"error\":\"invalid_grant\"}");
    }
}
