//! Persistent storage for bearer tokens and in-flight pairings
//!
//! Secrets live in the platform keyring under service `bee-cli` with names
//! `token:<env>` and `pairing:<env>`. When the keyring is unreachable the
//! store switches to owner-only files in `~/.config/bee/credentials` and
//! stays there for the rest of the process.

use crate::state::PairingState;
use bee_core::{Config, Environment, StoreMode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Keyring service all secrets are stored under
pub const KEYRING_SERVICE: &str = "bee-cli";

/// Error message fragments that mean the keyring cannot be used at all
const UNAVAILABLE_SIGNATURES: &[&str] = &[
    "org.freedesktop.dbus.error.serviceunknown",
    "org.freedesktop.secrets",
    "secret service",
    "no such interface",
    "dbus",
    "d-bus",
    "no storage access",
    "platform secure storage failure",
    "keychain not found",
    "user interaction is not allowed",
    "not supported",
    "no keyring",
    "couldn't access platform",
];

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Secure storage error: {0}")]
    Secure(String),
    #[error("Not logged in to {0}. Run `bee login` first")]
    NotLoggedIn(Environment),
    #[error("Configuration directory not found")]
    NoConfigDir,
    #[error(transparent)]
    Config(bee_core::Error),
}

impl From<bee_core::Error> for StorageError {
    fn from(err: bee_core::Error) -> Self {
        match err {
            bee_core::Error::NoConfigDir => StorageError::NoConfigDir,
            other => StorageError::Config(other),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Which backend currently serves store operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Keyring,
    File,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Keyring => write!(f, "keyring"),
            BackendKind::File => write!(f, "file"),
        }
    }
}

/// A place to keep named secrets
///
/// Calls block; `CredentialStore` runs secure backends on the blocking pool.
pub trait SecretBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Returns `Ok(None)` if nothing is stored under `name`
    fn get(&self, name: &str) -> StorageResult<Option<String>>;

    fn set(&self, name: &str, value: &str) -> StorageResult<()>;

    /// Idempotent: deleting a missing secret succeeds
    fn delete(&self, name: &str) -> StorageResult<()>;
}

/// Whether a secure backend error means the facility is unavailable
pub fn is_unavailable(message: &str) -> bool {
    let message = message.to_lowercase();
    UNAVAILABLE_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

/// Platform keyring backend
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, name: &str) -> StorageResult<keyring::Entry> {
        keyring::Entry::new(&self.service, name).map_err(|e| StorageError::Secure(e.to_string()))
    }
}

impl SecretBackend for KeyringBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Keyring
    }

    fn get(&self, name: &str) -> StorageResult<Option<String>> {
        match self.entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Secure(e.to_string())),
        }
    }

    fn set(&self, name: &str, value: &str) -> StorageResult<()> {
        self.entry(name)?
            .set_password(value)
            .map_err(|e| StorageError::Secure(e.to_string()))
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Secure(e.to_string())),
        }
    }
}

/// One file per secret in a private directory
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the secret `name` (`token:staging` -> `token-staging`)
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file_name: String = name
            .chars()
            .map(|c| match c {
                'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '-',
            })
            .collect();
        self.dir.join(file_name)
    }

    fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}

impl SecretBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn get(&self, name: &str) -> StorageResult<Option<String>> {
        match std::fs::read_to_string(self.path_for(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, name: &str, value: &str) -> StorageResult<()> {
        use std::io::Write;

        self.ensure_dir()?;
        let path = self.path_for(name);

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        // mode() only applies on creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(value.as_bytes())?;
        file.sync_all()?;

        debug!("Wrote {:?}", path);
        Ok(())
    }

    fn delete(&self, name: &str) -> StorageResult<()> {
        match std::fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn token_name(env: Environment) -> String {
    format!("token:{}", env)
}

fn pairing_name(env: Environment) -> String {
    format!("pairing:{}", env)
}

/// Credential store with keyring preference and sticky file fallback
pub struct CredentialStore {
    secure: Option<Arc<dyn SecretBackend>>,
    file: FileBackend,
    active: RwLock<BackendKind>,
}

impl CredentialStore {
    /// Create a store for the given mode and credentials directory
    pub fn new(mode: StoreMode, dir: PathBuf) -> Self {
        let secure: Option<Box<dyn SecretBackend>> = match mode {
            StoreMode::Auto => Some(Box::new(KeyringBackend::new(KEYRING_SERVICE))),
            StoreMode::File => None,
        };
        Self::with_backends(secure, FileBackend::new(dir))
    }

    /// Create a store from resolved configuration
    pub fn from_config(config: &Config) -> StorageResult<Self> {
        let dir = config.credentials_dir()?;
        Ok(Self::new(config.store_mode, dir))
    }

    /// Create a store from explicit backends
    ///
    /// Without a secure backend every operation goes to files.
    pub fn with_backends(secure: Option<Box<dyn SecretBackend>>, file: FileBackend) -> Self {
        let active = if secure.is_some() {
            BackendKind::Keyring
        } else {
            BackendKind::File
        };
        Self {
            secure: secure.map(Arc::from),
            file,
            active: RwLock::new(active),
        }
    }

    /// Backend that serves the next operation
    pub async fn active_backend(&self) -> BackendKind {
        *self.active.read().await
    }

    /// Run `op` against the active backend, degrading to files for good if
    /// the keyring reports itself unavailable
    async fn run<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: Fn(&dyn SecretBackend) -> StorageResult<T> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        if self.active_backend().await == BackendKind::Keyring {
            if let Some(secure) = self.secure.clone() {
                match Self::run_secure(secure, op.clone()).await {
                    Err(StorageError::Secure(message)) if is_unavailable(&message) => {
                        self.degrade(&message).await;
                    }
                    other => return other,
                }
            }
        }
        (*op)(&self.file)
    }

    /// Platform keyrings may block or drive their own runtime, so keep them
    /// off the async workers
    async fn run_secure<T, F>(secure: Arc<dyn SecretBackend>, op: Arc<F>) -> StorageResult<T>
    where
        T: Send + 'static,
        F: Fn(&dyn SecretBackend) -> StorageResult<T> + Send + Sync + 'static,
    {
        tokio::task::spawn_blocking(move || (*op)(secure.as_ref()))
            .await
            .unwrap_or_else(|e| {
                Err(StorageError::Secure(format!(
                    "platform secure storage failure: {}",
                    e
                )))
            })
    }

    async fn degrade(&self, reason: &str) {
        let mut active = self.active.write().await;
        if *active == BackendKind::Keyring {
            warn!(
                "Secure storage unavailable ({}); storing credentials in {:?} instead",
                reason,
                self.file.dir()
            );
            *active = BackendKind::File;
        }
    }

    /// Bearer token for an environment, if logged in
    pub async fn load_token(&self, env: Environment) -> StorageResult<Option<String>> {
        let name = token_name(env);
        let token = self.run(move |backend| backend.get(&name)).await?;
        Ok(token.filter(|t| !t.is_empty()))
    }

    pub async fn save_token(&self, env: Environment, token: &str) -> StorageResult<()> {
        let name = token_name(env);
        let token = token.to_string();
        self.run(move |backend| backend.set(&name, &token)).await?;
        info!("Saved credentials for {}", env);
        Ok(())
    }

    /// Remove the token from the active backend and any file artifact
    pub async fn clear_token(&self, env: Environment) -> StorageResult<()> {
        self.clear(token_name(env)).await?;
        info!("Cleared credentials for {}", env);
        Ok(())
    }

    /// Bearer token for an environment, or `NotLoggedIn`
    pub async fn require_token(&self, env: Environment) -> StorageResult<String> {
        self.load_token(env)
            .await?
            .ok_or(StorageError::NotLoggedIn(env))
    }

    /// In-flight pairing for an environment
    ///
    /// A record that no longer parses is reported as absent so the caller
    /// starts a fresh pairing.
    pub async fn load_pairing_state(
        &self,
        env: Environment,
    ) -> StorageResult<Option<PairingState>> {
        let name = pairing_name(env);
        let Some(json) = self.run(move |backend| backend.get(&name)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!("Ignoring unreadable pairing state for {}: {}", env, e);
                Ok(None)
            }
        }
    }

    /// Store the in-flight pairing, replacing any previous one
    pub async fn save_pairing_state(
        &self,
        env: Environment,
        state: &PairingState,
    ) -> StorageResult<()> {
        let name = pairing_name(env);
        let json = serde_json::to_string(state)?;
        self.run(move |backend| backend.set(&name, &json)).await?;
        debug!("Saved pairing state for {}", env);
        Ok(())
    }

    pub async fn clear_pairing_state(&self, env: Environment) -> StorageResult<()> {
        self.clear(pairing_name(env)).await?;
        debug!("Cleared pairing state for {}", env);
        Ok(())
    }

    /// Delete `name` from the active backend and from disk
    ///
    /// The file is removed even when the active backend fails; the first
    /// error is returned afterwards.
    async fn clear(&self, name: String) -> StorageResult<()> {
        let on_disk = name.clone();
        let active = self.run(move |backend| backend.delete(&name)).await;
        let file = self.file.delete(&on_disk);
        active.and(file)
    }
}

/// `Authorization` header value for a bearer token
pub fn bearer_header(token: &str) -> String {
    format!("Bearer {}", token)
}
