//! Remote object store collaborator.
//!
//! The store is injected into the sync engine as a trait object so a
//! test double can stand in for the network. The production
//! implementation talks to an S3-style HTTP object store where an
//! object lives at `{endpoint}/{bucket}/{key}`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use reqwest::{Body, Client, StatusCode};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// Transfer progress callback: cumulative bytes transferred and the
/// total size when known.
pub type TransferCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_object(
        &self,
        bucket: &str,
        key: &str,
        progress: Option<TransferCallback>,
    ) -> Result<Vec<u8>>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        progress: Option<TransferCallback>,
    ) -> Result<()>;
}

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

pub struct HttpRemoteStore {
    client: Client,
    endpoint: String,
    auth_header: Option<String>,
}

impl HttpRemoteStore {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        let auth_header = config.credentials()?.map(|(access, secret)| {
            format!("Basic {}", BASE64.encode(format!("{}:{}", access, secret)))
        });
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_header {
            Some(header) => builder.header(AUTHORIZATION, header),
            None => builder,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_object(
        &self,
        bucket: &str,
        key: &str,
        progress: Option<TransferCallback>,
    ) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, key);
        tracing::debug!(%url, "fetching remote object");

        let response = self.authorized(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(format!("{}/{}", bucket, key)));
        }
        let response = response.error_for_status()?;

        let total = response.content_length();
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);
            if let Some(callback) = &progress {
                callback(buffer.len() as u64, total);
            }
        }

        tracing::debug!(%url, bytes = buffer.len(), "remote object fetched");
        Ok(buffer)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        progress: Option<TransferCallback>,
    ) -> Result<()> {
        let url = self.object_url(bucket, key);
        let total = bytes.len() as u64;
        tracing::debug!(%url, bytes = total, "uploading remote object");

        // Chunked body so progress tracks the upload as it streams out.
        let chunks: Vec<Vec<u8>> = bytes
            .chunks(UPLOAD_CHUNK_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect();
        let mut sent: u64 = 0;
        let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            if let Some(callback) = &progress {
                callback(sent, Some(total));
            }
            Ok::<Vec<u8>, Infallible>(chunk)
        }));

        let response = self
            .authorized(self.client.put(&url))
            .body(Body::wrap_stream(stream))
            .send()
            .await?;
        response.error_for_status()?;

        tracing::debug!(%url, "remote object uploaded");
        Ok(())
    }
}
