//! Bee Auth - App pairing login and credential storage
//!
//! Obtains a long-lived bearer token without it ever crossing the wire in
//! plaintext, and keeps it in the platform keyring (or private files when
//! no keyring is reachable).
//!
//! # Pairing Flow
//!
//! 1. `LoginFlow` generates a secp256k1 key pair
//! 2. The public key is posted to `/apps/pairing/request`, creating a request
//! 3. The user approves at `https://bee.computer/connect/<requestId>`
//! 4. Polling the same endpoint returns the token encrypted to the public key
//! 5. The token is decrypted locally and saved in the `CredentialStore`
//!
//! # Example
//!
//! ```no_run
//! use bee_auth::{CredentialStore, LoginFlow, PairingClient, PairingLink, Presenter, SystemClock};
//! use bee_core::{Config, Environment};
//! use std::sync::Arc;
//!
//! struct Print;
//!
//! impl Presenter for Print {
//!     fn present(&self, link: &PairingLink) -> std::io::Result<()> {
//!         println!("Approve at {}", link.url);
//!         Ok(())
//!     }
//! }
//!
//! async fn example() {
//!     let config = Config::new(Environment::Production);
//!     let store = Arc::new(CredentialStore::from_config(&config).unwrap());
//!     let client = PairingClient::new(config.api_base_url()).unwrap();
//!     let flow = LoginFlow::new(client, SystemClock, store.clone(), config);
//!
//!     let token = flow.login_agent(&Print).await.unwrap();
//!     assert_eq!(store.require_token(Environment::Production).await.unwrap(), token);
//! }
//! ```

pub mod client;
pub mod crypto;
pub mod pairing;
pub mod state;
pub mod storage;

pub use client::{ClientError, ClientResult, PairingApi, PairingClient, PairingRequest};
pub use crypto::{
    decrypt_token, emoji_hash, encrypt_token, generate_key_pair, CryptoError, CryptoResult,
    KeyPair,
};
pub use pairing::{
    Clock, LoginFlow, PairingError, PairingLink, PairingResult, Presenter, SystemClock,
    DEFAULT_PAIRING_WINDOW_SECONDS, POLL_INTERVAL,
};
pub use state::PairingState;
pub use storage::{
    bearer_header, is_unavailable, BackendKind, CredentialStore, FileBackend, KeyringBackend,
    SecretBackend, StorageError, StorageResult, KEYRING_SERVICE,
};
