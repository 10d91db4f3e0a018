//! Upload transport for the item writer.
//!
//! The delivery loop talks to the storage endpoint through the [`Uploader`]
//! trait rather than calling HTTP directly. The seam keeps the loop testable
//! without a network and keeps the wire details in one place:
//! [`HttpUploader`] is the production implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::client::Credentials;

/// A failed upload attempt.
///
/// Both variants are treated as transient by the delivery loop: the chunk is
/// retried at the same offset until the endpoint accepts it.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The endpoint answered with a non-success status.
    #[error("[HTTP error {status}] {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, trailing whitespace stripped.
        body: String,
    },

    /// The request failed before a response was received (connect failure,
    /// reset, timeout).
    #[error("{0}")]
    Transport(String),
}

/// Transport used by the delivery loop to push one chunk of items.
///
/// `body` is the chunk's items joined with `\n`; `offset` is the cumulative
/// count of items accepted by the endpoint so far and is passed as the
/// positional `start` marker of the upload.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Perform a single upload attempt. Any non-success outcome is an error.
    async fn upload(&self, offset: u64, body: &str) -> Result<(), UploadError>;
}

/// Production uploader: `POST <url>?start=<offset>` with HTTP basic auth.
pub struct HttpUploader {
    http: reqwest::Client,
    url: url::Url,
    credentials: Credentials,
}

impl HttpUploader {
    /// Create an uploader bound to a writer URL and credential pair.
    pub fn new(http: reqwest::Client, url: url::Url, credentials: Credentials) -> Self {
        Self {
            http,
            url,
            credentials,
        }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, offset: u64, body: &str) -> Result<(), UploadError> {
        let response = self
            .http
            .post(self.url.clone())
            .query(&[("start", offset)])
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .body(body.to_owned())
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // Keep the body tail so the retry warning names what the endpoint
        // actually said, not just the code.
        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Status {
            status: status.as_u16(),
            body: body.trim_end().to_owned(),
        })
    }
}
