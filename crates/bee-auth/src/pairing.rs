//! App pairing login flow
//!
//! 1. Generate a key pair and submit its public half to the pairing endpoint
//! 2. Show the user `https://<host>/connect/<requestId>` to approve
//! 3. Poll the same endpoint every 2 seconds until approval or expiry
//! 4. Decrypt the returned token with the secret half and store it
//!
//! Agent mode persists the request (key pair included) before polling so a
//! restarted process picks up where the last one stopped.

use crate::client::{ClientError, PairingApi, PairingRequest};
use crate::crypto::{generate_key_pair, CryptoError, KeyPair};
use crate::state::PairingState;
use crate::storage::{CredentialStore, StorageError};
use async_trait::async_trait;
use bee_core::Config;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Delay between status checks while a request is pending
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polling window when the server gives no usable expiry
pub const DEFAULT_PAIRING_WINDOW_SECONDS: i64 = 300;

/// Login errors
#[derive(Debug, Error)]
pub enum PairingError {
    #[error(transparent)]
    Request(#[from] ClientError),
    #[error("Pairing request expired. Run `bee login` again")]
    Expired,
    #[error("Timed out waiting for approval. Run `bee login` again")]
    TimedOut,
    #[error("Could not decrypt the issued token ({0}). Your CLI may be out of date")]
    Decryption(#[from] CryptoError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Could not show pairing link: {0}")]
    Presentation(#[from] std::io::Error),
}

pub type PairingResult<T> = Result<T, PairingError>;

/// Source of wall-clock time and delays for the polling loop
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Real time, sleeping on the tokio timer
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What the user needs to approve a pairing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingLink {
    pub url: String,
    pub request_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Emoji fingerprint of the public key, when enabled
    pub fingerprint: Option<String>,
}

/// Shows a pairing link to the user
pub trait Presenter: Send + Sync {
    fn present(&self, link: &PairingLink) -> std::io::Result<()>;
}

/// Drives a login against one environment
pub struct LoginFlow<A, C> {
    api: A,
    clock: C,
    store: Arc<CredentialStore>,
    config: Config,
    poll_interval: Duration,
    fallback_window: chrono::Duration,
}

impl<A: PairingApi, C: Clock> LoginFlow<A, C> {
    pub fn new(api: A, clock: C, store: Arc<CredentialStore>, config: Config) -> Self {
        Self {
            api,
            clock,
            store,
            config,
            poll_interval: POLL_INTERVAL,
            fallback_window: chrono::Duration::seconds(DEFAULT_PAIRING_WINDOW_SECONDS),
        }
    }

    /// Override the delay between status checks
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Interactive login: always starts a new pairing request
    pub async fn login_interactive(&self, presenter: &dyn Presenter) -> PairingResult<String> {
        let key_pair = generate_key_pair();

        let (request_id, expires_at) = match self.create(&key_pair).await? {
            Created::Done(token) => return Ok(token),
            Created::Pending {
                request_id,
                expires_at,
            } => (request_id, expires_at),
        };

        presenter.present(&self.link(&key_pair, &request_id, expires_at))?;
        self.poll(&key_pair, self.deadline(expires_at)).await
    }

    /// Resumable login: reuses a stored, unexpired pairing request
    ///
    /// Persisted state is removed on every terminal outcome so a later run
    /// never resumes into a dead request.
    pub async fn login_agent(&self, presenter: &dyn Presenter) -> PairingResult<String> {
        let result = self.run_agent(presenter).await;

        if let Err(e) = self.store.clear_pairing_state(self.config.environment).await {
            warn!("Failed to clear pairing state: {}", e);
        }
        result
    }

    async fn run_agent(&self, presenter: &dyn Presenter) -> PairingResult<String> {
        if let Some((state, key_pair)) = self.resume().await? {
            info!("Resuming pairing request {}", state.request_id);
            presenter.present(&PairingLink {
                url: state.pairing_url.clone(),
                request_id: state.request_id.clone(),
                expires_at: Some(state.expires_at),
                fingerprint: self.fingerprint(&key_pair),
            })?;
            return self.poll(&key_pair, state.expires_at).await;
        }

        let key_pair = generate_key_pair();
        let (request_id, expires_at) = match self.create(&key_pair).await? {
            Created::Done(token) => return Ok(token),
            Created::Pending {
                request_id,
                expires_at,
            } => (request_id, expires_at),
        };

        let deadline = self.deadline(expires_at);
        let state = PairingState::new(
            self.config.app_id(),
            &key_pair,
            request_id.as_str(),
            self.config.pairing_url(&request_id),
            deadline,
        );
        self.store
            .save_pairing_state(self.config.environment, &state)
            .await?;

        presenter.present(&self.link(&key_pair, &request_id, Some(deadline)))?;
        self.poll(&key_pair, deadline).await
    }

    /// Load stored pairing state worth resuming, discarding anything stale
    async fn resume(&self) -> PairingResult<Option<(PairingState, KeyPair)>> {
        let env = self.config.environment;
        let Some(state) = self.store.load_pairing_state(env).await? else {
            return Ok(None);
        };

        if state.is_expired(self.clock.now()) {
            info!("Stored pairing request {} expired, starting over", state.request_id);
        } else if state.app_id != self.config.app_id() {
            info!("Stored pairing request belongs to another app, starting over");
        } else {
            match state.key_pair() {
                Ok(key_pair) => return Ok(Some((state, key_pair))),
                Err(e) => warn!("Stored pairing key pair is unusable ({}), starting over", e),
            }
        }

        self.store.clear_pairing_state(env).await?;
        Ok(None)
    }

    /// Submit a new public key and settle the races where the request is
    /// already terminal
    async fn create(&self, key_pair: &KeyPair) -> PairingResult<Created> {
        let request = self
            .api
            .request_pairing(self.config.app_id(), &key_pair.public_key_base64(), None)
            .await?;

        match request {
            PairingRequest::Pending {
                request_id,
                expires_at,
            } => {
                info!("Created pairing request {}", request_id);
                Ok(Created::Pending {
                    request_id,
                    expires_at,
                })
            }
            PairingRequest::Completed {
                encrypted_token, ..
            } => Ok(Created::Done(self.finish(key_pair, &encrypted_token).await?)),
            PairingRequest::Expired { .. } => Err(PairingError::Expired),
        }
    }

    /// Poll until the request completes, expires, or `deadline` passes
    async fn poll(&self, key_pair: &KeyPair, deadline: DateTime<Utc>) -> PairingResult<String> {
        let public_key = key_pair.public_key_base64();

        while self.clock.now() < deadline {
            match self
                .api
                .request_pairing(self.config.app_id(), &public_key, None)
                .await?
            {
                PairingRequest::Completed {
                    encrypted_token, ..
                } => return self.finish(key_pair, &encrypted_token).await,
                PairingRequest::Expired { .. } => return Err(PairingError::Expired),
                PairingRequest::Pending { request_id, .. } => {
                    debug!("Pairing request {} still pending", request_id);
                    self.clock.sleep(self.poll_interval).await;
                }
            }
        }

        Err(PairingError::TimedOut)
    }

    async fn finish(&self, key_pair: &KeyPair, encrypted_token: &str) -> PairingResult<String> {
        let token = key_pair.decrypt_token(encrypted_token)?;
        self.store
            .save_token(self.config.environment, &token)
            .await?;
        info!("Pairing approved");
        Ok(token)
    }

    fn deadline(&self, expires_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
        expires_at.unwrap_or_else(|| self.clock.now() + self.fallback_window)
    }

    fn fingerprint(&self, key_pair: &KeyPair) -> Option<String> {
        self.config.emoji_hash.then(|| key_pair.emoji_hash())
    }

    fn link(
        &self,
        key_pair: &KeyPair,
        request_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> PairingLink {
        PairingLink {
            url: self.config.pairing_url(request_id),
            request_id: request_id.to_string(),
            expires_at,
            fingerprint: self.fingerprint(key_pair),
        }
    }
}

enum Created {
    Pending {
        request_id: String,
        expires_at: Option<DateTime<Utc>>,
    },
    Done(String),
}
