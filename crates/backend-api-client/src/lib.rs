//! REST client for the authorization backend.
//!
//! Covers the endpoints the handshake consumes: platform authorization and
//! revocation, the connection status poll, PIN fetch, and submission of the
//! final authorized request. Response bodies are never logged verbatim —
//! failures carry a length/digest summary only.

mod error;

pub use error::{ApiError, ApiResult};

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, error, info};

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Authorization URL for a platform connect.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeUrlResponse {
    /// Provider URL the user is sent through.
    pub authorize_url: String,
}

/// Connection status reported by the poll endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPollStatus {
    /// OAuth still in flight.
    Pending,
    /// The provider account is linked.
    Linked,
    /// The provider rejected or the user aborted.
    Failed,
}

/// Poll response for an in-flight platform connect.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionPollResponse {
    pub status: ConnectionPollStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Per-user PIN, still encrypted at rest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinFetchResponse {
    /// Base64 transport envelope around the encrypted PIN.
    pub cipher_result: String,
    /// Token scoped to the signing provider's decrypt step.
    #[serde(default)]
    pub token: Option<String>,
}

/// One granted scope in the final submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GrantSubmission {
    pub requester: String,
    pub data_category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
}

/// The final authorized request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedRequest {
    pub hashed_subject_id: String,
    /// Base64 RSA-OAEP ciphertext of the PIN.
    pub encrypted_pin: String,
    pub grants: Vec<GrantSubmission>,
}

/// Scoped access credential returned on submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedResponse {
    pub api_credential: String,
}

/// REST client for the authorization backend.
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
}

impl ApiClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_url` - Backend base URL (e.g., `https://api.onairos.uk`)
    /// * `publishable_key` - Publishable API key sent with every request
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            publishable_key: publishable_key.into(),
        }
    }

    /// Build a full endpoint URL.
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path)
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        what: &'static str,
    ) -> ApiResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body_summary = summarize_response_body(&body);
        error!(status = %status, body_summary = %body_summary, "Backend call failed: {what}");
        Err(ApiError::Status {
            what,
            status: status.as_u16(),
            summary: body_summary,
        })
    }

    /// Request an authorization URL for a platform connect.
    pub async fn authorize_platform(
        &self,
        platform: &str,
        access_token: &str,
    ) -> ApiResult<AuthorizeUrlResponse> {
        let url = self.endpoint(&format!("platforms/{platform}/authorize"));
        debug!(platform = %platform, "Requesting authorization URL");

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        let response = self.check_status(response, "authorize-platform").await?;
        Ok(response.json().await?)
    }

    /// Revoke a platform connection.
    pub async fn revoke_platform(&self, platform: &str, access_token: &str) -> ApiResult<()> {
        let url = self.endpoint(&format!("platforms/{platform}/revoke"));
        debug!(platform = %platform, "Revoking platform connection");

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        self.check_status(response, "revoke-platform").await?;
        info!(platform = %platform, "Platform connection revoked");
        Ok(())
    }

    /// Poll the status of an in-flight platform connect.
    pub async fn poll_connection(
        &self,
        platform: &str,
        access_token: &str,
    ) -> ApiResult<ConnectionPollResponse> {
        let url = self.endpoint(&format!("platforms/{platform}/status"));

        let response = self
            .http_client
            .get(&url)
            .header("x-api-key", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        let response = self.check_status(response, "poll-connection").await?;
        Ok(response.json().await?)
    }

    /// Look up (or create) the per-user transport PIN, returned still
    /// encrypted at rest.
    pub async fn fetch_pin(
        &self,
        hashed_subject_id: &str,
        access_token: &str,
    ) -> ApiResult<PinFetchResponse> {
        let url = self.endpoint("pin/fetch");
        debug!("Fetching transport PIN");

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({ "hashedSubjectId": hashed_subject_id }))
            .send()
            .await?;

        let response = self.check_status(response, "fetch-pin").await?;
        Ok(response.json().await?)
    }

    /// Submit the authorized request and obtain the scoped access credential.
    pub async fn submit_authorized_request(
        &self,
        request: &AuthorizedRequest,
        access_token: &str,
    ) -> ApiResult<AuthorizedResponse> {
        let url = self.endpoint("authorize/submit");
        debug!(grants = request.grants.len(), "Submitting authorized request");

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let response = self.check_status(response, "submit-authorized-request").await?;
        let body: AuthorizedResponse = response.json().await?;
        info!("Authorized request accepted");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ApiClient::new("https://api.test.onairos.uk", "pub-key");
        assert_eq!(client.api_url, "https://api.test.onairos.uk");
        assert_eq!(client.publishable_key, "pub-key");
    }

    #[test]
    fn test_endpoint_join() {
        let client = ApiClient::new("https://api.test.onairos.uk/", "k");
        assert_eq!(
            client.endpoint("platforms/youtube/authorize"),
            "https://api.test.onairos.uk/platforms/youtube/authorize"
        );
    }

    #[test]
    fn test_body_summary_hides_content() {
        let summary = summarize_response_body("secret token material");
        assert!(summary.starts_with("len=21,digest="));
        assert!(!summary.contains("secret"));
    }

    #[test]
    fn test_authorize_url_deserialization() {
        let json = r#"{"authorizeUrl":"https://provider.example/oauth?state=x"}"#;
        let parsed: AuthorizeUrlResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.authorize_url.starts_with("https://provider.example"));
    }

    #[test]
    fn test_poll_status_deserialization() {
        let pending: ConnectionPollResponse =
            serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(pending.status, ConnectionPollStatus::Pending);
        assert!(pending.error.is_none());

        let failed: ConnectionPollResponse =
            serde_json::from_str(r#"{"status":"failed","error":"denied"}"#).unwrap();
        assert_eq!(failed.status, ConnectionPollStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("denied"));
    }

    #[test]
    fn test_pin_fetch_deserialization() {
        let json = r#"{"cipherResult":"AAEC","token":"provider-token"}"#;
        let parsed: PinFetchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.cipher_result, "AAEC");
        assert_eq!(parsed.token.as_deref(), Some("provider-token"));

        let no_token: PinFetchResponse =
            serde_json::from_str(r#"{"cipherResult":"AAEC"}"#).unwrap();
        assert!(no_token.token.is_none());
    }

    #[test]
    fn test_authorized_request_serialization() {
        let request = AuthorizedRequest {
            hashed_subject_id: "ab12".to_string(),
            encrypted_pin: "b64cipher".to_string(),
            grants: vec![GrantSubmission {
                requester: "acme".to_string(),
                data_category: "interests".to_string(),
                reward: Some("0.5".to_string()),
            }],
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"hashedSubjectId\":\"ab12\""));
        assert!(json.contains("\"encryptedPin\":\"b64cipher\""));
        assert!(json.contains("\"dataCategory\":\"interests\""));
        assert!(json.contains("\"reward\":\"0.5\""));
    }

    #[test]
    fn test_grant_without_reward_omits_field() {
        let grant = GrantSubmission {
            requester: "acme".to_string(),
            data_category: "interests".to_string(),
            reward: None,
        };
        let json = serde_json::to_string(&grant).unwrap();
        assert!(!json.contains("reward"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_typed() {
        // Nothing listens here; the request must fail as a transport error
        let client = ApiClient::new("http://127.0.0.1:1", "k");
        let result = client.authorize_platform("youtube", "tok").await;
        assert!(matches!(result, Err(ApiError::Transport(_))));
    }
}
