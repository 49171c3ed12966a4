//! HTTP client for the pairing endpoint
//!
//! One call both creates and polls a pairing request: the server keys
//! requests by `(app_id, publicKey)`, so repeating the call with the same
//! public key returns the existing request's current status. The client
//! never retries on its own; pacing belongs to the login flow.

use async_trait::async_trait;
use bee_core::protocol::{error_code, PairingRequestBody, PairingResponseBody, PAIRING_REQUEST_PATH};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Pairing endpoint errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Public key must not be empty")]
    EmptyPublicKey,
    #[error("Pairing endpoint not found at {0}; check the selected environment")]
    EndpointNotFound(String),
    #[error("Pairing request failed with HTTP {status}{}", describe_code(.code))]
    RequestFailed {
        status: u16,
        code: Option<String>,
    },
    #[error("Malformed pairing response: {0}")]
    MalformedResponse(String),
    #[error("Pairing request cancelled")]
    Cancelled,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

fn describe_code(code: &Option<String>) -> String {
    code.as_ref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default()
}

/// Server-side state of a pairing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingRequest {
    /// Waiting for the user to approve
    Pending {
        request_id: String,
        /// None when the server omitted the expiry or sent an unparseable one
        expires_at: Option<DateTime<Utc>>,
    },
    /// Approved; the token is encrypted to the submitted public key
    Completed {
        request_id: String,
        encrypted_token: String,
    },
    /// Timed out on the server
    Expired { request_id: String },
}

impl PairingRequest {
    pub fn request_id(&self) -> &str {
        match self {
            PairingRequest::Pending { request_id, .. }
            | PairingRequest::Completed { request_id, .. }
            | PairingRequest::Expired { request_id } => request_id,
        }
    }

    /// Classify a successful response body
    pub fn from_body(body: PairingResponseBody) -> ClientResult<Self> {
        if !body.ok {
            return Err(ClientError::MalformedResponse(
                "response is missing ok: true".to_string(),
            ));
        }

        let request_id = body
            .request_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::MalformedResponse("missing requestId".to_string()))?;

        match body.status.as_deref() {
            Some("pending") => Ok(PairingRequest::Pending {
                request_id,
                expires_at: body.expires_at.as_deref().and_then(parse_timestamp),
            }),
            Some("completed") => {
                let encrypted_token = body
                    .result
                    .and_then(|r| r.encrypted_token)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        ClientError::MalformedResponse(
                            "completed response has no encryptedToken".to_string(),
                        )
                    })?;
                Ok(PairingRequest::Completed {
                    request_id,
                    encrypted_token,
                })
            }
            Some("expired") => Ok(PairingRequest::Expired { request_id }),
            Some(other) => Err(ClientError::MalformedResponse(format!(
                "unknown status {:?}",
                other
            ))),
            None => Err(ClientError::MalformedResponse("missing status".to_string())),
        }
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Anything that can create or poll a pairing request
#[async_trait]
pub trait PairingApi: Send + Sync {
    async fn request_pairing(
        &self,
        app_id: &str,
        public_key: &str,
        cancel: Option<&CancellationToken>,
    ) -> ClientResult<PairingRequest>;
}

/// reqwest-backed pairing client for one environment
pub struct PairingClient {
    client: Client,
    endpoint: String,
}

impl PairingClient {
    /// Create a client for the given API base URL
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent(concat!("bee-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), PAIRING_REQUEST_PATH),
        })
    }

    /// Full URL of the pairing endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, body: &PairingRequestBody) -> ClientResult<PairingRequest> {
        let response = self.client.post(&self.endpoint).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("Pairing endpoint replied with HTTP {}", status.as_u16());

        if !status.is_success() {
            return Err(self.classify_failure(status, &text));
        }

        let body: PairingResponseBody = serde_json::from_str(&text)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        PairingRequest::from_body(body)
    }

    fn classify_failure(&self, status: StatusCode, text: &str) -> ClientError {
        let code = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .as_ref()
            .and_then(error_code);

        match (status, code) {
            (StatusCode::NOT_FOUND, None) => ClientError::EndpointNotFound(self.endpoint.clone()),
            (status, code) => ClientError::RequestFailed {
                status: status.as_u16(),
                code,
            },
        }
    }
}

#[async_trait]
impl PairingApi for PairingClient {
    async fn request_pairing(
        &self,
        app_id: &str,
        public_key: &str,
        cancel: Option<&CancellationToken>,
    ) -> ClientResult<PairingRequest> {
        if public_key.trim().is_empty() {
            return Err(ClientError::EmptyPublicKey);
        }

        let body = PairingRequestBody {
            app_id: app_id.to_string(),
            public_key: public_key.to_string(),
        };

        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ClientError::Cancelled),
                result = self.send(&body) => result,
            },
            None => self.send(&body).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = PairingClient::new("https://api.bee.computer/").unwrap();
        assert_eq!(
            client.endpoint(),
            "https://api.bee.computer/apps/pairing/request"
        );
    }

    #[tokio::test]
    async fn test_pending_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/apps/pairing/request")
            .match_body(Matcher::Json(json!({
                "app_id": "pk5z",
                "publicKey": "abc123base64"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"ok":true,"status":"pending","requestId":"r1","expiresAt":"2030-01-01T00:00:00Z"}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = PairingClient::new(&server.url()).unwrap();
        let request = client
            .request_pairing("pk5z", "abc123base64", None)
            .await
            .unwrap();

        mock.assert_async().await;
        let expected = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            request,
            PairingRequest::Pending {
                request_id: "r1".to_string(),
                expires_at: Some(expected),
            }
        );
    }

    #[tokio::test]
    async fn test_completed_response() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/apps/pairing/request")
            .with_status(200)
            .with_body(
                r#"{"ok":true,"status":"completed","requestId":"r1","result":{"encryptedToken":"ct"}}"#,
            )
            .create_async()
            .await;

        let client = PairingClient::new(&server.url()).unwrap();
        let request = client.request_pairing("pk5z", "key", None).await.unwrap();
        assert_eq!(
            request,
            PairingRequest::Completed {
                request_id: "r1".to_string(),
                encrypted_token: "ct".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_expiry_is_dropped() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/apps/pairing/request")
            .with_status(200)
            .with_body(r#"{"ok":true,"status":"pending","requestId":"r2","expiresAt":"soon"}"#)
            .create_async()
            .await;

        let client = PairingClient::new(&server.url()).unwrap();
        let request = client.request_pairing("pk5z", "key", None).await.unwrap();
        assert!(matches!(
            request,
            PairingRequest::Pending { expires_at: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_bare_404_is_endpoint_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/apps/pairing/request")
            .with_status(404)
            .with_body("Not Found")
            .create_async()
            .await;

        let client = PairingClient::new(&server.url()).unwrap();
        let result = client.request_pairing("pk5z", "key", None).await;
        assert!(matches!(result, Err(ClientError::EndpointNotFound(_))));
    }

    #[tokio::test]
    async fn test_structured_error_is_request_failed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/apps/pairing/request")
            .with_status(404)
            .with_body(r#"{"ok":false,"error":"unknown_app"}"#)
            .create_async()
            .await;

        let client = PairingClient::new(&server.url()).unwrap();
        let result = client.request_pairing("pk5z", "key", None).await;
        match result {
            Err(ClientError::RequestFailed { status, code }) => {
                assert_eq!(status, 404);
                assert_eq!(code.as_deref(), Some("unknown_app"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_without_code() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/apps/pairing/request")
            .with_status(500)
            .create_async()
            .await;

        let client = PairingClient::new(&server.url()).unwrap();
        let result = client.request_pairing("pk5z", "key", None).await;
        assert!(matches!(
            result,
            Err(ClientError::RequestFailed {
                status: 500,
                code: None
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_status_is_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/apps/pairing/request")
            .with_status(200)
            .with_body(r#"{"ok":true,"status":"approved","requestId":"r1"}"#)
            .create_async()
            .await;

        let client = PairingClient::new(&server.url()).unwrap();
        let result = client.request_pairing("pk5z", "key", None).await;
        assert!(matches!(result, Err(ClientError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_not_ok_is_malformed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/apps/pairing/request")
            .with_status(200)
            .with_body(r#"{"ok":false,"status":"pending","requestId":"r1"}"#)
            .create_async()
            .await;

        let client = PairingClient::new(&server.url()).unwrap();
        let result = client.request_pairing("pk5z", "key", None).await;
        assert!(matches!(result, Err(ClientError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_empty_public_key_rejected() {
        let client = PairingClient::new("http://127.0.0.1:9").unwrap();
        let result = client.request_pairing("pk5z", "  ", None).await;
        assert!(matches!(result, Err(ClientError::EmptyPublicKey)));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let client = PairingClient::new("http://10.255.255.1:81").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = client.request_pairing("pk5z", "key", Some(&token)).await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
    }

    #[test]
    fn test_completed_without_token_is_malformed() {
        let body: PairingResponseBody = serde_json::from_value(json!({
            "ok": true,
            "status": "completed",
            "requestId": "r1"
        }))
        .unwrap();
        assert!(matches!(
            PairingRequest::from_body(body),
            Err(ClientError::MalformedResponse(_))
        ));
    }
}
