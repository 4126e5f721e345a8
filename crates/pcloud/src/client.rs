//! Protocol adapter for the pCloud HTTP API
//!
//! Every call is an authenticated request against `base_url + endpoint`
//! with query-encoded parameters and an optional raw body. [`PCloud::execute`]
//! decodes the JSON envelope; [`PCloud::execute_raw`] hands back the bytes
//! untouched (used for `file_read`).

use crate::Result;
use crate::config::{DeletePolicy, PCloudConfig, WritePolicy, validate_config};
use crate::envelope::Envelope;
use crate::error::Error;
use crate::transport::{HttpRequest, ReqwestTransport, Transport};
use bytes::Bytes;
use diagnostics::*;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONNECTION, HeaderMap, HeaderValue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Query parameters, encoded in key order
pub type Params = BTreeMap<String, String>;

/// Build a [`Params`] map from string pairs
#[must_use]
pub fn params<const N: usize>(pairs: [(&str, String); N]) -> Params {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Async pCloud API client
///
/// Cheap to clone; clones share the transport and its connection pool.
#[derive(Clone)]
pub struct PCloud {
    base_url: String,
    token: String,
    timeout: Option<Duration>,
    write_policy: WritePolicy,
    delete_policy: DeletePolicy,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for PCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PCloud")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("write_policy", &self.write_policy)
            .field("delete_policy", &self.delete_policy)
            .finish_non_exhaustive()
    }
}

impl PCloud {
    /// Create a client using the default `reqwest` transport
    pub fn new(config: &PCloudConfig) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(config.timeout())
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client that sends through an injected transport
    pub fn with_transport(config: &PCloudConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        validate_config(config)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: config.timeout(),
            write_policy: config.write_policy(),
            delete_policy: config.delete_policy,
            transport,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Write policy handed to new file handles
    #[must_use]
    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    /// Delete policy handed to new file handles
    #[must_use]
    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    /// Fetch account information, passed through as JSON
    pub async fn user_info(&self) -> Result<Value> {
        let envelope = self
            .execute(Method::GET, "/userinfo", None, &Params::new())
            .await?;
        Ok(envelope.into_value())
    }

    /// Paths of the entries directly inside a folder
    pub async fn list_folder(&self, path: &str) -> Result<Vec<String>> {
        const ENDPOINT: &str = "/listfolder";
        let envelope = self
            .execute(
                Method::GET,
                ENDPOINT,
                None,
                &params([("path", path.to_string())]),
            )
            .await?;

        let contents = envelope
            .require(ENDPOINT, "metadata")?
            .get("contents")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::missing(ENDPOINT, "metadata.contents"))?;

        contents
            .iter()
            .map(|item| {
                item.get("path")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| Error::missing(ENDPOINT, "metadata.contents[].path"))
            })
            .collect()
    }

    /// Upload a whole file in one request
    pub async fn upload_file(&self, folder: &str, filename: &str, data: Bytes) -> Result<Value> {
        let envelope = self
            .execute(
                Method::PUT,
                "/uploadfile",
                Some(data),
                &params([
                    ("path", folder.to_string()),
                    ("filename", filename.to_string()),
                ]),
            )
            .await?;
        Ok(envelope.into_value())
    }

    /// Delete a file by path
    pub async fn delete_file(&self, path: &str) -> Result<()> {
        debug!("Deleting {path}", path: path);
        self.execute(
            Method::PUT,
            "/deletefile",
            None,
            &params([("path", path.to_string())]),
        )
        .await?;
        Ok(())
    }

    /// Issue a call and decode its envelope
    pub async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Bytes>,
        params: &Params,
    ) -> Result<Envelope> {
        let body = self.execute_raw(method, endpoint, body, params).await?;
        Envelope::decode(endpoint, &body)
    }

    /// Issue a call and return the body without envelope decoding
    pub async fn execute_raw(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Bytes>,
        params: &Params,
    ) -> Result<Bytes> {
        let request = self.build_request(method, endpoint, body, params)?;
        let method_name = request.method.to_string();
        let url = request.url.to_string();

        debug!("{method} {endpoint}", method: method_name.as_str(), endpoint: endpoint);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|source| Error::Transport {
                method: method_name.clone(),
                url: redact(&url),
                source,
            })?;

        if response.status != 200 {
            return Err(Error::HttpStatus {
                method: method_name,
                url: redact(&url),
                status: response.status,
            });
        }

        Ok(response.body)
    }

    fn build_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Bytes>,
        params: &Params,
    ) -> Result<HttpRequest> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, endpoint)).map_err(|e| {
            Error::Transport {
                method: method.to_string(),
                url: format!("{}{}", self.base_url, endpoint),
                source: Box::new(e),
            }
        })?;

        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token)).map_err(|e| {
            Error::Transport {
                method: method.to_string(),
                url: url.to_string(),
                source: Box::new(e),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
            timeout: self.timeout,
        })
    }
}

/// URLs end up in error messages; they never carry the token, but keep them short
fn redact(url: &str) -> String {
    const LIMIT: usize = 512;
    if url.len() <= LIMIT {
        url.to_string()
    } else {
        let mut end = LIMIT;
        while !url.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &url[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Failure, MemoryCloud};

    fn client(cloud: &MemoryCloud) -> PCloud {
        cloud.client().unwrap()
    }

    #[test]
    fn test_request_construction() {
        let config = PCloudConfig::new("secret").with_base_url("https://api.pcloud.com/");
        let client = PCloud::with_transport(&config, Arc::new(MemoryCloud::new("secret"))).unwrap();

        let request = client
            .build_request(
                Method::GET,
                "/file_open",
                None,
                &params([("path", "/a b.txt".to_string()), ("flags", "1088".to_string())]),
            )
            .unwrap();

        // Parameters are encoded in key order
        assert_eq!(
            request.url.as_str(),
            "https://api.pcloud.com/file_open?flags=1088&path=%2Fa+b.txt"
        );
        assert_eq!(
            request.headers.get(AUTHORIZATION).unwrap(),
            "Bearer secret"
        );
        assert_eq!(request.headers.get(CONNECTION).unwrap(), "keep-alive");
        assert_eq!(request.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_empty_params_produce_no_query() {
        let cloud = MemoryCloud::new("secret");
        let request = client(&cloud)
            .build_request(Method::GET, "/userinfo", None, &Params::new())
            .unwrap();
        assert_eq!(request.url.query(), None);
        assert!(!request.url.as_str().ends_with('?'));
    }

    #[tokio::test]
    async fn test_user_info_passthrough() {
        let cloud = MemoryCloud::new("secret");
        let info = client(&cloud).user_info().await.unwrap();
        assert_eq!(info["result"], 0);
        assert!(info.get("email").is_some());
    }

    #[tokio::test]
    async fn test_bad_token_is_remote_error() {
        let cloud = MemoryCloud::new("secret");
        let config = PCloudConfig::new("wrong");
        let client = PCloud::with_transport(&config, Arc::new(cloud.clone())).unwrap();

        let err = client.user_info().await.unwrap_err();
        assert!(err.is_remote_api());
        assert_eq!(err.remote_code(), Some(1000));
    }

    #[tokio::test]
    async fn test_status_error_distinct_from_remote_error() {
        let cloud = MemoryCloud::new("secret");
        let client = client(&cloud);

        cloud.fail_next("/userinfo", Failure::Status(503));
        let err = client.user_info().await.unwrap_err();
        assert!(err.is_http_status());
        assert!(!err.is_remote_api());
        match err {
            Error::HttpStatus { method, url, status } => {
                assert_eq!(method, "GET");
                assert!(url.ends_with("/userinfo"));
                assert_eq!(status, 503);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        cloud.fail_next("/userinfo", Failure::Remote(2000, "Log in failed."));
        let err = client.user_info().await.unwrap_err();
        assert!(err.is_remote_api());
        assert!(!err.is_http_status());
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let cloud = MemoryCloud::new("secret");
        cloud.fail_next("/userinfo", Failure::Transport);
        let err = client(&cloud).user_info().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_list_folder_and_upload() {
        let cloud = MemoryCloud::new("secret");
        let client = client(&cloud);

        client
            .upload_file("/docs", "a.txt", Bytes::from_static(b"alpha"))
            .await
            .unwrap();
        client
            .upload_file("/docs", "b.txt", Bytes::from_static(b"beta"))
            .await
            .unwrap();

        let paths = client.list_folder("/docs").await.unwrap();
        assert_eq!(paths, vec!["/docs/a.txt".to_string(), "/docs/b.txt".to_string()]);
        assert_eq!(cloud.contents("/docs/b.txt").unwrap(), b"beta");
    }

    #[tokio::test]
    async fn test_delete_missing_file() {
        let cloud = MemoryCloud::new("secret");
        let err = client(&cloud).delete_file("/nope.txt").await.unwrap_err();
        assert_eq!(err.remote_code(), Some(2009));
    }

    #[tokio::test]
    async fn test_execute_raw_skips_envelope() {
        let cloud = MemoryCloud::new("secret");
        let body = client(&cloud)
            .execute_raw(Method::GET, "/userinfo", None, &Params::new())
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["result"], 0);
    }

    #[test]
    fn test_redact_truncates() {
        let long = format!("https://api.pcloud.com/stat?path={}", "x".repeat(1000));
        let short = redact(&long);
        assert!(short.len() < long.len());
        assert!(short.ends_with("..."));
    }
}
