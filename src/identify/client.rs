use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use thiserror::Error;

use crate::identify::fragment::FragmentError;

/// Errors from one capture exchange. Transport and status failures come from
/// the endpoint; fragment failures from parsing what it returned.
#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identify endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("bad fragment: {0}")]
    Fragment(#[from] FragmentError),
}

/// Client for the remote identification endpoint. One multipart POST per
/// captured frame: the JPEG under `frame`, the target tile under `slot_id`.
pub struct IdentifyClient {
    client: reqwest::Client,
    endpoint: String,
}

impl IdentifyClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one frame and returns the raw fragment body on success. A
    /// non-success status is an error carrying whatever diagnostic body the
    /// endpoint sent; the body is logged by the caller, never parsed.
    pub async fn identify(&self, slot_id: &str, jpeg: Vec<u8>) -> Result<String, IdentifyError> {
        let frame = Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .part("frame", frame)
            .text("slot_id", slot_id.to_string());

        log::debug!("POST {} for {}", self.endpoint, slot_id);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdentifyError::Status { status, body });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_formats_diagnostic() {
        let err = IdentifyError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("500"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_fragment_error_converts() {
        let err: IdentifyError = FragmentError::NoRoot.into();
        assert!(matches!(err, IdentifyError::Fragment(_)));
    }

    #[test]
    fn test_client_keeps_endpoint() {
        let client = IdentifyClient::new("http://127.0.0.1:5000/identify");
        assert_eq!(client.endpoint(), "http://127.0.0.1:5000/identify");
    }
}
