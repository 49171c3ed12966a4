//! Key pairs for the pairing handshake
//!
//! The server encrypts the bearer token to the public key submitted with
//! the pairing request using ECIES over secp256k1. Ciphertext layout is
//! `ephemeral_pubkey(65) || nonce(16) || tag(16) || ciphertext`, so a
//! wrong key or a flipped byte fails the AES-GCM tag check instead of
//! yielding garbage.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use libsecp256k1::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// Uncompressed secp256k1 public key size (04 prefix + x + y)
pub const PUBLIC_KEY_SIZE: usize = 65;

/// secp256k1 secret key size
pub const SECRET_KEY_SIZE: usize = 32;

/// Smallest ciphertext ECIES can produce: ephemeral key, nonce and tag
pub const MIN_CIPHERTEXT_SIZE: usize = PUBLIC_KEY_SIZE + 16 + 16;

/// Number of emoji in a public key fingerprint
pub const EMOJI_HASH_LENGTH: usize = 6;

const EMOJI: [&str; 64] = [
    "🐝", "🍯", "🌻", "🌵", "🍀", "🍄", "🌊", "🔥", "⭐", "🌙", "☀️", "⚡", "❄️", "🌈", "🍎", "🍋",
    "🍇", "🍉", "🍒", "🥕", "🌽", "🥑", "🍩", "🍪", "🎈", "🎁", "🎲", "🎯", "🎸", "🎺", "🚀", "🚲",
    "⚓", "🔑", "🔔", "💎", "📚", "📌", "✏️", "🧭", "🦊", "🐢", "🐙", "🦉", "🐳", "🦋", "🐧", "🦄",
    "🐸", "🦀", "🐌", "🦒", "🐘", "🦁", "🐼", "🐨", "🌲", "🌴", "🏔️", "🏝️", "🗿", "⛵", "🛸", "🧩",
];

/// Crypto errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encrypted token is not valid base64")]
    InvalidEncoding,
    #[error("Encrypted token is truncated ({0} bytes)")]
    Truncated(usize),
    #[error("Encrypted token could not be decrypted with this key pair")]
    Decryption,
    #[error("Decrypted token is not valid UTF-8")]
    InvalidUtf8,
    #[error("Encryption failed")]
    Encryption,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid secret key")]
    InvalidSecretKey,
    #[error("Public key does not belong to secret key")]
    KeyMismatch,
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// A secp256k1 key pair generated for a single pairing attempt
#[derive(Clone)]
pub struct KeyPair {
    public: [u8; PUBLIC_KEY_SIZE],
    secret: Zeroizing<[u8; SECRET_KEY_SIZE]>,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS random source
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = PublicKey::from_secret_key(&secret);
        Self {
            public: public.serialize(),
            secret: Zeroizing::new(secret.serialize()),
        }
    }

    /// Rebuild a key pair from its base64 serialization
    ///
    /// Rejects pairs whose public half was not derived from the secret half.
    pub fn from_base64(public_key: &str, secret_key: &str) -> CryptoResult<Self> {
        let secret = Zeroizing::new(
            BASE64
                .decode(secret_key.trim())
                .map_err(|_| CryptoError::InvalidSecretKey)?,
        );
        let parsed =
            SecretKey::parse_slice(&secret).map_err(|_| CryptoError::InvalidSecretKey)?;
        let derived = PublicKey::from_secret_key(&parsed).serialize();

        let public = BASE64
            .decode(public_key.trim())
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        if public.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidPublicKey);
        }
        if public[..] != derived[..] {
            return Err(CryptoError::KeyMismatch);
        }

        Ok(Self {
            public: derived,
            secret: Zeroizing::new(parsed.serialize()),
        })
    }

    /// Raw public key bytes
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Public key as sent to the pairing endpoint
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public)
    }

    /// Secret key for persisting an in-flight pairing. Never log this.
    pub fn secret_key_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(&self.secret[..]))
    }

    /// Decrypt a token that was encrypted to this key pair
    pub fn decrypt_token(&self, ciphertext_base64: &str) -> CryptoResult<String> {
        decrypt_token(ciphertext_base64, &self.secret[..])
    }

    /// Fingerprint of the public key for visual comparison
    pub fn emoji_hash(&self) -> String {
        emoji_hash(&self.public)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key_base64())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Generate a new key pair for a pairing attempt
pub fn generate_key_pair() -> KeyPair {
    KeyPair::generate()
}

/// Decrypt the base64 token ciphertext returned by a completed pairing
pub fn decrypt_token(ciphertext_base64: &str, secret_key: &[u8]) -> CryptoResult<String> {
    if secret_key.len() != SECRET_KEY_SIZE {
        return Err(CryptoError::InvalidSecretKey);
    }

    let ciphertext = BASE64
        .decode(ciphertext_base64.trim())
        .map_err(|_| CryptoError::InvalidEncoding)?;
    if ciphertext.len() < MIN_CIPHERTEXT_SIZE {
        return Err(CryptoError::Truncated(ciphertext.len()));
    }

    let plaintext = Zeroizing::new(
        ecies::decrypt(secret_key, &ciphertext).map_err(|_| CryptoError::Decryption)?,
    );
    String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::InvalidUtf8)
}

/// Encrypt a token to a public key, as the pairing server does
pub fn encrypt_token(token: &str, public_key: &[u8]) -> CryptoResult<String> {
    if public_key.len() != PUBLIC_KEY_SIZE || public_key[0] != 0x04 {
        return Err(CryptoError::InvalidPublicKey);
    }
    let ciphertext =
        ecies::encrypt(public_key, token.as_bytes()).map_err(|_| CryptoError::Encryption)?;
    Ok(BASE64.encode(ciphertext))
}

/// Deterministic emoji fingerprint of a public key
///
/// Decorative only: lets a user compare what the CLI shows with what the
/// approval page shows.
pub fn emoji_hash(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    digest
        .iter()
        .take(EMOJI_HASH_LENGTH)
        .map(|b| EMOJI[(*b as usize) % EMOJI.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let pair = generate_key_pair();
        let ciphertext = encrypt_token("bee_token_123", pair.public_key()).unwrap();
        assert_eq!(pair.decrypt_token(&ciphertext).unwrap(), "bee_token_123");
    }

    #[test]
    fn test_wrong_key_fails() {
        let pair = generate_key_pair();
        let other = generate_key_pair();
        let ciphertext = encrypt_token("secret", pair.public_key()).unwrap();

        let result = other.decrypt_token(&ciphertext);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let pair = generate_key_pair();
        let ciphertext = encrypt_token("secret", pair.public_key()).unwrap();
        let mut bytes = BASE64.decode(&ciphertext).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let result = pair.decrypt_token(&BASE64.encode(bytes));
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_malformed_ciphertext() {
        let pair = generate_key_pair();
        assert!(matches!(
            pair.decrypt_token("not base64!!"),
            Err(CryptoError::InvalidEncoding)
        ));
        assert!(matches!(
            pair.decrypt_token(&BASE64.encode([0u8; 40])),
            Err(CryptoError::Truncated(40))
        ));
    }

    #[test]
    fn test_key_pair_serialization() {
        let pair = generate_key_pair();
        let restored =
            KeyPair::from_base64(&pair.public_key_base64(), &pair.secret_key_base64()).unwrap();
        assert_eq!(restored.public_key(), pair.public_key());

        let ciphertext = encrypt_token("resumed", pair.public_key()).unwrap();
        assert_eq!(restored.decrypt_token(&ciphertext).unwrap(), "resumed");
    }

    #[test]
    fn test_mismatched_halves_rejected() {
        let a = generate_key_pair();
        let b = generate_key_pair();
        let result = KeyPair::from_base64(&a.public_key_base64(), &b.secret_key_base64());
        assert!(matches!(result, Err(CryptoError::KeyMismatch)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let pair = generate_key_pair();
        let debug = format!("{:?}", pair);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(pair.secret_key_base64().as_str()));
    }

    #[test]
    fn test_emoji_hash_deterministic() {
        let pair = generate_key_pair();
        assert_eq!(pair.emoji_hash(), emoji_hash(pair.public_key()));
        assert_eq!(pair.emoji_hash().split(' ').count(), EMOJI_HASH_LENGTH);
        assert_ne!(emoji_hash(b"one"), emoji_hash(b"two"));
    }
}
