//! Backend PIN transport.

use crate::PinCryptoResult;
use backend_api_client::{ApiClient, PinFetchResponse};
use tracing::debug;

/// Fetches the per-user PIN from the backend, still encrypted at rest.
///
/// Decryption of the fetched material is performed by the signing provider
/// the user authenticated with; the transport only unwraps the base64
/// envelope. Nothing fetched here is ever cached — every authorization
/// attempt fetches fresh.
#[derive(Clone)]
pub struct PinTransport {
    api: ApiClient,
}

impl PinTransport {
    /// Create a transport over the backend client.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Look up (or create) the user's PIN record.
    pub async fn fetch_pin(
        &self,
        hashed_subject_id: &str,
        access_token: &str,
    ) -> PinCryptoResult<PinFetchResponse> {
        let response = self.api.fetch_pin(hashed_subject_id, access_token).await?;
        debug!("Fetched encrypted PIN envelope");
        Ok(response)
    }
}
