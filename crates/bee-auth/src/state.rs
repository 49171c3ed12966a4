//! Persisted snapshot of an in-flight pairing attempt
//!
//! Written in agent mode right after a pairing request is created so a
//! restarted process can resume polling the same request instead of asking
//! the user to approve again.

use crate::crypto::{CryptoResult, KeyPair};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Resumable pairing attempt, one per environment
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct PairingState {
    /// Application the request was created for
    pub app_id: String,
    /// Base64 public key submitted with the request
    pub public_key: String,
    /// Base64 secret key matching `public_key`
    pub secret_key: String,
    /// Server-side request identifier
    pub request_id: String,
    /// URL the user opens to approve
    pub pairing_url: String,
    /// When the server stops accepting approval
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
}

impl PairingState {
    /// Snapshot a freshly created pairing request
    pub fn new(
        app_id: impl Into<String>,
        key_pair: &KeyPair,
        request_id: impl Into<String>,
        pairing_url: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            public_key: key_pair.public_key_base64(),
            secret_key: key_pair.secret_key_base64().to_string(),
            request_id: request_id.into(),
            pairing_url: pairing_url.into(),
            expires_at,
        }
    }

    /// Whether the request can no longer be approved at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Rebuild the key pair the request was created with
    pub fn key_pair(&self) -> CryptoResult<KeyPair> {
        KeyPair::from_base64(&self.public_key, &self.secret_key)
    }
}

impl std::fmt::Debug for PairingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingState")
            .field("app_id", &self.app_id)
            .field("public_key", &self.public_key)
            .field("secret_key", &"[REDACTED]")
            .field("request_id", &self.request_id)
            .field("pairing_url", &self.pairing_url)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
