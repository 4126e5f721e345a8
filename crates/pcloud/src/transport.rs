//! HTTP transport seam
//!
//! The protocol adapter in [`crate::client`] never talks to the network
//! directly. It hands a fully built [`HttpRequest`] to a [`Transport`] and
//! gets back the status and the complete body. The default transport wraps a
//! `reqwest::Client`; [`crate::memory::MemoryCloud`] emulates the remote API
//! in process.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use std::time::Duration;
use url::Url;

/// A request ready to be sent
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Per-request deadline; elapsing surfaces as a transport failure
    pub timeout: Option<Duration>,
}

/// Status and fully consumed body of a response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Sends requests for the protocol adapter.
///
/// Implementations must be safe to share between file handles; the adapter
/// does not serialize access.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by a (connection pooled) `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wrap an existing client, sharing its connection pool
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Build a client with the given overall request timeout
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::new(builder.build()?))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .http_client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        // Drain the body whatever the status so the connection goes back to the pool.
        let body = response.bytes().await?;

        Ok(HttpResponse { status, body })
    }
}
