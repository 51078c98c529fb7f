use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use xadmin_core::UserId;

/// Marker distinguishing refresh tokens from access tokens.
///
/// Access tokens carry no `type` claim at all; refresh tokens carry
/// `"type": "refresh"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Refresh,
}

/// JWT claims model.
///
/// The subject is the username; `uid` pins the token to one account so a
/// reused username never inherits an older account's tokens. Everything else
/// about the principal is resolved from the directory at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (username).
    pub sub: String,

    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,

    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,

    /// Id of the account the token was issued to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UserId>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TokenKind>,
}

impl TokenClaims {
    pub fn new(subject: impl Into<String>, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: subject.into(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            uid: None,
            kind: None,
        }
    }

    pub fn bound_to(mut self, user_id: UserId) -> Self {
        self.uid = Some(user_id);
        self
    }

    /// True only for tokens issued to exactly this account.
    pub fn is_bound_to(&self, user_id: UserId) -> bool {
        self.uid == Some(user_id)
    }

    pub fn refresh(mut self) -> Self {
        self.kind = Some(TokenKind::Refresh);
        self
    }

    pub fn is_refresh(&self) -> bool {
        self.kind == Some(TokenKind::Refresh)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.exp
    }
}
