//! Token issuance and verification.
//!
//! Tokens are HMAC-signed JWTs. Verification is total: any failure (bad
//! signature, malformed input, expiry, missing subject) collapses into "no
//! identity" so callers never branch on the cause.

use core::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use thiserror::Error;

use xadmin_core::UserId;

use crate::claims::TokenClaims;

pub const DEFAULT_ACCESS_LIFETIME_MINUTES: i64 = 60 * 24 * 8;
pub const DEFAULT_REFRESH_LIFETIME_MINUTES: i64 = 60 * 24 * 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("unsupported signing algorithm '{0}' (expected HS256, HS384 or HS512)")]
    UnsupportedAlgorithm(String),

    #[error("token secret must not be empty")]
    EmptySecret,

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Signing algorithm restricted to the HMAC family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningAlgorithm(Algorithm);

impl SigningAlgorithm {
    pub const HS256: Self = Self(Algorithm::HS256);

    pub fn as_jwt(&self) -> Algorithm {
        self.0
    }
}

impl Default for SigningAlgorithm {
    fn default() -> Self {
        Self::HS256
    }
}

impl FromStr for SigningAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || TokenError::UnsupportedAlgorithm(s.to_string());
        let alg = Algorithm::from_str(s.trim()).map_err(|_| unsupported())?;
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(Self(alg)),
            _ => Err(unsupported()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub algorithm: SigningAlgorithm,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
}

impl TokenSettings {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: SigningAlgorithm::default(),
            access_lifetime: Duration::minutes(DEFAULT_ACCESS_LIFETIME_MINUTES),
            refresh_lifetime: Duration::minutes(DEFAULT_REFRESH_LIFETIME_MINUTES),
        }
    }
}

/// Access + refresh pair returned by login and refresh flows.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("access_lifetime", &self.access_lifetime)
            .field("refresh_lifetime", &self.refresh_lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(settings: TokenSettings) -> Result<Self, TokenError> {
        if settings.secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let secret = settings.secret.as_bytes();
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            algorithm: settings.algorithm.as_jwt(),
            access_lifetime: settings.access_lifetime,
            refresh_lifetime: settings.refresh_lifetime,
        })
    }

    pub fn access_lifetime(&self) -> Duration {
        self.access_lifetime
    }

    pub fn issue_access(&self, subject: &str, lifetime: Option<Duration>) -> Result<String, TokenError> {
        self.sign(&self.access_claims_for(subject, lifetime))
    }

    pub fn issue_refresh(&self, subject: &str, lifetime: Option<Duration>) -> Result<String, TokenError> {
        self.sign(&self.refresh_claims_for(subject, lifetime))
    }

    /// Access token pinned to one account.
    pub fn issue_access_for(
        &self,
        subject: &str,
        user_id: UserId,
        lifetime: Option<Duration>,
    ) -> Result<String, TokenError> {
        self.sign(&self.access_claims_for(subject, lifetime).bound_to(user_id))
    }

    /// Refresh token pinned to one account.
    pub fn issue_refresh_for(
        &self,
        subject: &str,
        user_id: UserId,
        lifetime: Option<Duration>,
    ) -> Result<String, TokenError> {
        self.sign(&self.refresh_claims_for(subject, lifetime).bound_to(user_id))
    }

    pub fn issue_pair(&self, subject: &str, user_id: UserId) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_for(subject, user_id, None)?,
            refresh_token: self.issue_refresh_for(subject, user_id, None)?,
            token_type: "bearer",
            expires_in: self.access_lifetime.num_seconds(),
        })
    }

    /// Subject of a valid token, or `None`.
    pub fn verify(&self, token: &str) -> Option<String> {
        let claims = self.decode_claims(token).ok()?;
        Some(claims.sub)
    }

    /// Like [`verify`](Self::verify), but only accepts refresh tokens.
    pub fn verify_refresh(&self, token: &str) -> Option<String> {
        self.refresh_claims(token).map(|c| c.sub)
    }

    /// Subject of a valid access token. Refresh tokens are rejected.
    pub fn verify_access(&self, token: &str) -> Option<String> {
        self.access_claims(token).map(|c| c.sub)
    }

    /// Claims of a valid access token.
    pub fn access_claims(&self, token: &str) -> Option<TokenClaims> {
        self.decode_claims(token).ok().filter(|c| !c.is_refresh())
    }

    /// Claims of a valid refresh token.
    pub fn refresh_claims(&self, token: &str) -> Option<TokenClaims> {
        self.decode_claims(token).ok().filter(TokenClaims::is_refresh)
    }

    pub fn decode_claims(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if data.claims.sub.trim().is_empty() {
            return Err(TokenError::Invalid("missing subject".to_string()));
        }
        Ok(data.claims)
    }

    fn access_claims_for(&self, subject: &str, lifetime: Option<Duration>) -> TokenClaims {
        let now = Utc::now();
        TokenClaims::new(subject, now, now + lifetime.unwrap_or(self.access_lifetime))
    }

    fn refresh_claims_for(&self, subject: &str, lifetime: Option<Duration>) -> TokenClaims {
        let now = Utc::now();
        TokenClaims::new(subject, now, now + lifetime.unwrap_or(self.refresh_lifetime)).refresh()
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}
