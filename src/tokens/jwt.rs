// ABOUTME: HMAC-signed JWT token provider with a closed algorithm set
// ABOUTME: Maps every jsonwebtoken failure into the token-error taxonomy, never leaks raw errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # JWT Provider
//!
//! The default token backend: self-contained, tamper-evident JWTs signed
//! with HMAC. The algorithm set is closed (HS256/HS384/HS512) and an
//! unsupported or unconfigured algorithm fails at construction time, not
//! at first use.

use crate::models::{default_scopes, CreateTokenRequest, TokenType, REFRESH_SCOPE};
use crate::tokens::claims::Claims;
use crate::tokens::errors::TokenError;
use crate::tokens::{TokenIntrospection, TokenProvider, TokenProviderKind};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use uuid::Uuid;

/// Length in bytes of the per-refresh-token family secret
const REFRESH_SECRET_BYTES: usize = 32;

/// Supported HMAC signing algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256
    HS256,
    /// HMAC with SHA-384
    HS384,
    /// HMAC with SHA-512
    HS512,
}

impl SigningAlgorithm {
    /// Parse an algorithm name, rejecting anything outside the closed set
    ///
    /// # Errors
    /// Returns [`TokenError::InvalidConfig`] for unknown names.
    pub fn parse(name: &str) -> Result<Self, TokenError> {
        match name {
            "HS256" | "" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            other => Err(TokenError::InvalidConfig(format!(
                "unsupported signing algorithm: {other}"
            ))),
        }
    }

    /// The jsonwebtoken algorithm for this variant
    #[must_use]
    pub const fn as_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
        }
    }
}

/// Configuration for [`JwtProvider`]
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC signing secret
    pub secret: String,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Issuer embedded in and required from every token
    pub issuer: String,
    /// Algorithm name, one of HS256/HS384/HS512
    pub algorithm: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::days(7),
            issuer: "sso-server".into(),
            algorithm: "HS256".into(),
        }
    }
}

/// HMAC-signed JWT token provider
#[derive(Debug)]
pub struct JwtProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    issuer: String,
}

impl JwtProvider {
    /// Create a provider, failing fast on bad configuration
    ///
    /// # Errors
    /// Returns [`TokenError::InvalidConfig`] for an empty secret or an
    /// algorithm outside the supported set.
    pub fn new(config: JwtConfig) -> Result<Self, TokenError> {
        if config.secret.is_empty() {
            return Err(TokenError::InvalidConfig(
                "JWT secret key cannot be empty".into(),
            ));
        }

        let algorithm = SigningAlgorithm::parse(&config.algorithm)?.as_jwt_algorithm();

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            algorithm,
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
            issuer: config.issuer,
        })
    }

    /// Sign a claims value into a compact token string
    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(TokenError::SigningFailed)
    }

    /// Decode and verify a token, then check the embedded type claim
    fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| map_jwt_error(&e))?;
        let claims = data.claims;

        if claims.token_type != expected {
            tracing::warn!(
                expected = %expected,
                found = %claims.token_type,
                "token type mismatch during validation"
            );
            return Err(TokenError::WrongType);
        }

        // Refresh tokens are audience-restricted to this server
        if expected == TokenType::Refresh && !claims.aud.iter().any(|aud| aud == &self.issuer) {
            return Err(TokenError::InvalidClaims);
        }

        Ok(claims)
    }
}

impl TokenProvider for JwtProvider {
    fn kind(&self) -> TokenProviderKind {
        TokenProviderKind::Jwt
    }

    fn generate_access_token(
        &self,
        request: &CreateTokenRequest,
    ) -> Result<(String, Claims), TokenError> {
        let token_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + self.access_token_ttl;

        let scopes = if request.scopes.is_empty() {
            default_scopes()
        } else {
            request.scopes.clone()
        };

        let claims = Claims {
            sub: request.user_id.to_string(),
            iss: self.issuer.clone(),
            aud: vec![request.application_id.to_string()],
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: token_id.to_string(),
            user_id: request.user_id,
            application_id: request.application_id,
            email: request.email.clone(),
            scopes,
            token_type: TokenType::Access,
            token_id,
            access_token_id: None,
            refresh_secret: None,
            custom: None,
        };

        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    fn generate_refresh_token(
        &self,
        access_claims: &Claims,
    ) -> Result<(String, Claims), TokenError> {
        let token_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + self.refresh_token_ttl;

        let claims = Claims {
            sub: access_claims.sub.clone(),
            iss: self.issuer.clone(),
            // Never presentable to resource servers
            aud: vec![self.issuer.clone()],
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: token_id.to_string(),
            user_id: access_claims.user_id,
            application_id: access_claims.application_id,
            email: access_claims.email.clone(),
            scopes: vec![REFRESH_SCOPE.to_owned()],
            token_type: TokenType::Refresh,
            token_id,
            access_token_id: Some(access_claims.token_id),
            refresh_secret: Some(random_hex(REFRESH_SECRET_BYTES)?),
            custom: None,
        };

        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    fn validate_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate(token, TokenType::Access)
    }

    fn validate_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate(token, TokenType::Refresh)
    }

    fn extract_claims_unverified(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.insecure_disable_signature_validation();

        // Dummy key, the signature is deliberately not checked here
        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Malformed)
    }

    fn introspect(&self, token: &str) -> Result<TokenIntrospection, TokenError> {
        let claims = self.extract_claims_unverified(token)?;
        Ok(TokenIntrospection {
            provider_kind: self.kind(),
            token_type: claims.token_type,
            token_id: claims.token_id,
            user_id: claims.user_id,
            application_id: claims.application_id,
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
            expired: claims.is_expired(),
        })
    }

    fn token_ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_token_ttl,
            TokenType::Refresh => self.refresh_token_ttl,
        }
    }
}

/// Fold a jsonwebtoken error into the closed taxonomy
fn map_jwt_error(err: &jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::MissingRequiredClaim(_) => TokenError::InvalidClaims,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            TokenError::Malformed
        }
        _ => TokenError::Invalid,
    }
}

/// Generate `len` random bytes as lowercase hex
fn random_hex(len: usize) -> Result<String, TokenError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes).map_err(|_| {
        tracing::error!("system RNG failure while generating token material");
        TokenError::CreationFailed("system RNG failure".into())
    })?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> JwtProvider {
        JwtProvider::new(JwtConfig {
            secret: "a-test-secret-of-reasonable-length".into(),
            ..JwtConfig::default()
        })
        .unwrap()
    }

    fn test_request() -> CreateTokenRequest {
        CreateTokenRequest {
            user_id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            scopes: vec!["read".into(), "write".into()],
            email: "user@example.com".into(),
        }
    }

    #[test]
    fn test_empty_secret_rejected_at_construction() {
        let err = JwtProvider::new(JwtConfig::default()).unwrap_err();
        assert!(matches!(err, TokenError::InvalidConfig(_)));
    }

    #[test]
    fn test_unsupported_algorithm_rejected_at_construction() {
        let err = JwtProvider::new(JwtConfig {
            secret: "secret".into(),
            algorithm: "RS256".into(),
            ..JwtConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, TokenError::InvalidConfig(_)));
    }

    #[test]
    fn test_access_token_round_trip() {
        let provider = test_provider();
        let request = test_request();

        let (token, claims) = provider.generate_access_token(&request).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let validated = provider.validate_access_token(&token).unwrap();
        assert_eq!(validated.user_id, request.user_id);
        assert_eq!(validated.application_id, request.application_id);
        assert_eq!(validated.email, request.email);
        assert_eq!(validated.scopes, request.scopes);
        assert_eq!(validated.token_type, TokenType::Access);
        assert_eq!(validated.token_id, claims.token_id);
        assert!(!validated.is_expired());
    }

    #[test]
    fn test_empty_scopes_fall_back_to_defaults() {
        let provider = test_provider();
        let request = CreateTokenRequest {
            scopes: vec![],
            ..test_request()
        };

        let (token, _) = provider.generate_access_token(&request).unwrap();
        let claims = provider.validate_access_token(&token).unwrap();
        assert_eq!(claims.scopes, vec!["openid", "profile", "email"]);
    }

    #[test]
    fn test_refresh_token_derivation() {
        let provider = test_provider();
        let (_, access_claims) = provider.generate_access_token(&test_request()).unwrap();

        let (token, refresh_claims) = provider.generate_refresh_token(&access_claims).unwrap();
        assert_eq!(refresh_claims.token_type, TokenType::Refresh);
        assert_eq!(refresh_claims.scopes, vec![REFRESH_SCOPE]);
        assert_eq!(refresh_claims.aud, vec!["sso-server"]);
        assert_eq!(
            refresh_claims.access_token_id,
            Some(access_claims.token_id)
        );
        assert!(refresh_claims.refresh_secret.is_some());

        let validated = provider.validate_refresh_token(&token).unwrap();
        assert_eq!(validated.token_id, refresh_claims.token_id);
    }

    #[test]
    fn test_refresh_secrets_are_unique() {
        let provider = test_provider();
        let (_, access_claims) = provider.generate_access_token(&test_request()).unwrap();

        let (_, first) = provider.generate_refresh_token(&access_claims).unwrap();
        let (_, second) = provider.generate_refresh_token(&access_claims).unwrap();
        assert_ne!(first.refresh_secret, second.refresh_secret);
    }

    #[test]
    fn test_wrong_token_type_rejected_both_ways() {
        let provider = test_provider();
        let (access_token, access_claims) =
            provider.generate_access_token(&test_request()).unwrap();
        let (refresh_token, _) = provider.generate_refresh_token(&access_claims).unwrap();

        assert!(matches!(
            provider.validate_access_token(&refresh_token),
            Err(TokenError::WrongType)
        ));
        assert!(matches!(
            provider.validate_refresh_token(&access_token),
            Err(TokenError::WrongType)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let provider = JwtProvider::new(JwtConfig {
            secret: "a-test-secret-of-reasonable-length".into(),
            access_token_ttl: Duration::hours(-2),
            ..JwtConfig::default()
        })
        .unwrap();

        let (token, _) = provider.generate_access_token(&test_request()).unwrap();
        assert!(matches!(
            provider.validate_access_token(&token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let provider = test_provider();
        let other = JwtProvider::new(JwtConfig {
            secret: "a-different-secret-entirely".into(),
            ..JwtConfig::default()
        })
        .unwrap();

        let (token, _) = provider.generate_access_token(&test_request()).unwrap();
        assert!(matches!(
            other.validate_access_token(&token),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let provider = test_provider();
        assert!(matches!(
            provider.validate_access_token("not.a.jwt"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            provider.extract_claims_unverified("garbage"),
            Err(TokenError::Malformed)
        ));
    }

    #[test]
    fn test_unverified_extraction_of_expired_token() {
        let provider = JwtProvider::new(JwtConfig {
            secret: "a-test-secret-of-reasonable-length".into(),
            access_token_ttl: Duration::hours(-2),
            ..JwtConfig::default()
        })
        .unwrap();

        let (token, claims) = provider.generate_access_token(&test_request()).unwrap();
        let extracted = provider.extract_claims_unverified(&token).unwrap();
        assert_eq!(extracted.token_id, claims.token_id);
        assert_eq!(extracted.token_type, TokenType::Access);
    }

    #[test]
    fn test_introspection() {
        let provider = test_provider();
        let request = test_request();
        let (token, claims) = provider.generate_access_token(&request).unwrap();

        let info = provider.introspect(&token).unwrap();
        assert_eq!(info.provider_kind, TokenProviderKind::Jwt);
        assert_eq!(info.token_type, TokenType::Access);
        assert_eq!(info.token_id, claims.token_id);
        assert_eq!(info.user_id, request.user_id);
        assert!(!info.expired);
    }
}
