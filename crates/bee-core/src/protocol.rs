//! Pairing endpoint wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path of the pairing endpoint relative to the API base URL
pub const PAIRING_REQUEST_PATH: &str = "/apps/pairing/request";

/// Body sent to create or poll a pairing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRequestBody {
    /// Registered application requesting the pairing
    pub app_id: String,
    /// Base64-encoded public key the token will be encrypted to
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Raw response from the pairing endpoint
///
/// Every field is optional here; the client decides whether the shape is
/// one it understands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairingResponseBody {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp, present while pending
    #[serde(rename = "expiresAt", default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub result: Option<PairingResultBody>,
}

/// Payload of a completed pairing request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairingResultBody {
    /// Base64 ciphertext of the bearer token
    #[serde(rename = "encryptedToken", default)]
    pub encrypted_token: Option<String>,
}

/// Extract a server-supplied error code from an error response body
///
/// Accepts `{"error":"code"}`, `{"error":{"code":"code"}}` and `{"code":"code"}`.
pub fn error_code(body: &Value) -> Option<String> {
    match body.get("error") {
        Some(Value::String(code)) => return Some(code.clone()),
        Some(Value::Object(obj)) => {
            if let Some(Value::String(code)) = obj.get("code") {
                return Some(code.clone());
            }
        }
        _ => {}
    }
    match body.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        _ => None,
    }
}
