//! Depot Client - asynchronous item writing and reading
//!
//! This crate provides the client library for the Depot append-only item
//! storage API. Its centerpiece is [`Writer`], an asynchronous batched writer
//! that accepts a high-rate stream of items and delivers them, in order, to a
//! storage endpoint over HTTP without blocking the caller on network latency
//! or transient failures.
//!
//! # Examples
//!
//! ## Writing items
//!
//! ```ignore
//! use depot_client::Client;
//!
//! let client = Client::new("apikey:secret")?;
//! let writer = client.writer("items/53")?;
//!
//! writer.write(&serde_json::json!({"title": "hello"})).await?;
//! writer.write(&serde_json::json!({"title": "world"})).await?;
//!
//! // Blocks until every queued item has been uploaded.
//! writer.close().await?;
//! ```
//!
//! ## Reading items
//!
//! ```ignore
//! use depot_client::Client;
//! use futures_util::StreamExt;
//!
//! let client = Client::new("apikey:secret")?;
//! let mut items = client.iter_items::<serde_json::Value>("items/53").await?;
//!
//! while let Some(item) = items.next().await {
//!     println!("{}", item?);
//! }
//! ```

pub mod client;
pub mod error;
pub mod registry;
pub mod retry;
pub mod transport;
pub mod writer;

pub use client::{Client, Credentials, DEFAULT_URL};
pub use error::{ClientError, Result};
pub use retry::RetryPolicy;
pub use transport::{HttpUploader, UploadError, Uploader};
pub use writer::{Writer, WriterBuilder, DEFAULT_CHUNK_SIZE};
