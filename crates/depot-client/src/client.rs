//! Depot API client: credentials, URL resolution, and the item read path.
//!
//! [`Client`] is thin glue around the interesting part of the crate (the
//! [`crate::Writer`]): it parses the credential string, joins paths onto the
//! base URL, and issues the streamed `GET` used to read items back. Writers
//! created through it share its HTTP connection pool and credentials.

use std::io;
use std::sync::Arc;

use futures_util::{Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::io::StreamReader;
use url::Url;

use crate::error::{ClientError, Result};
use crate::transport::HttpUploader;
use crate::writer::{Writer, WriterBuilder};

/// Default storage endpoint.
pub const DEFAULT_URL: &str = "http://localhost:8002";

/// A username/password pair for HTTP basic auth.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Part of the auth string before the first `:`.
    pub username: String,
    /// Part after the first `:`; empty if the string had no `:`.
    pub password: String,
}

impl Credentials {
    /// Split an `auth` credential string on the first `:`.
    ///
    /// ```
    /// use depot_client::Credentials;
    ///
    /// let creds = Credentials::parse("apikey:s:ecret");
    /// assert_eq!(creds.username, "apikey");
    /// assert_eq!(creds.password, "s:ecret");
    /// ```
    pub fn parse(auth: &str) -> Self {
        let (username, password) = auth.split_once(':').unwrap_or((auth, ""));
        Self {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }
}

/// Client for the Depot item storage API.
///
/// # Examples
///
/// ```ignore
/// let client = Client::new("apikey:secret")?;
/// let writer = client.writer("items/53")?;
/// writer.write(&serde_json::json!({"title": "hello"})).await?;
/// writer.close().await?;
/// ```
pub struct Client {
    base_url: Url,
    credentials: Credentials,
    http: reqwest::Client,
}

impl Client {
    /// Create a client against the default endpoint.
    pub fn new(auth: &str) -> Result<Self> {
        Self::with_url(auth, DEFAULT_URL)
    }

    /// Create a client against a specific endpoint.
    pub fn with_url(auth: &str, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .expect("failed to create HTTP client");
        Ok(Self {
            base_url: Url::parse(base_url)?,
            credentials: Credentials::parse(auth),
            http,
        })
    }

    /// Join `path` onto the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Create a [`Writer`] for `path` with default settings and start its
    /// delivery task.
    pub fn writer(&self, path: &str) -> Result<Writer> {
        Ok(self.writer_builder(path)?.build())
    }

    /// Create a [`WriterBuilder`] for `path`, for tuning chunk size or retry
    /// wait before building.
    pub fn writer_builder(&self, path: &str) -> Result<WriterBuilder> {
        let url = self.resolve(path)?;
        let uploader = Arc::new(HttpUploader::new(
            self.http.clone(),
            url.clone(),
            self.credentials.clone(),
        ));
        Ok(WriterBuilder::new(url.as_str(), uploader))
    }

    /// Stream the response of `GET <base>/<path>` as lines of text.
    ///
    /// The body is consumed lazily; lines are yielded as they arrive.
    pub async fn iter_lines(&self, path: &str) -> Result<impl Stream<Item = Result<String>>> {
        self.iter_lines_with(path, reqwest::Method::GET, None).await
    }

    /// Like [`Client::iter_lines`] but with an explicit method and body.
    pub async fn iter_lines_with(
        &self,
        path: &str,
        method: reqwest::Method,
        body: Option<String>,
    ) -> Result<impl Stream<Item = Result<String>>> {
        let url = self.resolve(path)?;
        let mut request = self
            .http
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password));
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
                body: body.trim_end().to_owned(),
            });
        }

        let reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
        Ok(LinesStream::new(reader.lines()).map(|line| line.map_err(ClientError::from)))
    }

    /// Stream items from `path`, decoding each response line as one JSON
    /// value.
    pub async fn iter_items<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<impl Stream<Item = Result<T>>> {
        let lines = self.iter_lines(path).await?;
        Ok(lines.map(|line| line.and_then(|l| serde_json::from_str(&l).map_err(ClientError::from))))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.credentials.username)
            .finish()
    }
}
