//! Opaque bearer credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CredentialError, CredentialResult};

/// An opaque bearer token with an optional expiry.
///
/// The token bytes are wiped when the value is dropped and are never
/// rendered by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(try_from = "StoredCredential")]
pub struct Credential {
    token: String,
    #[zeroize(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// On-disk shape; converted through [`Credential::new`] so a stored blank
/// token is rejected at load time.
#[derive(Deserialize)]
struct StoredCredential {
    token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<StoredCredential> for Credential {
    type Error = CredentialError;

    fn try_from(stored: StoredCredential) -> CredentialResult<Self> {
        let credential = Self::new(stored.token)?;
        Ok(match stored.expires_at {
            Some(expires_at) => credential.with_expiry(expires_at),
            None => credential,
        })
    }
}

impl Credential {
    /// Create a credential that never expires.
    pub fn new(token: impl Into<String>) -> CredentialResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        Ok(Self {
            token,
            expires_at: None,
        })
    }

    /// Attach an expiry timestamp.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// The raw token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Expiry timestamp, if any.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Check if the credential has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against a given instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// `Authorization` header value for this credential.
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
