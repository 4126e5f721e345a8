//! Stat results
//!
//! `/stat` answers with a `metadata` object. Dates come in RFC 1123 form
//! (`Wed, 02 Oct 2013 13:23:35 +0000`); a date that does not parse is kept
//! as `None` rather than failing the whole call.

use crate::Result;
use crate::client::{PCloud, params};
use crate::error::Error;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};

/// Snapshot of a remote file's attributes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FileMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Canonical remote path, when the server reports one
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "rfc1123")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "rfc1123")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, rename = "ismine")]
    pub is_mine: bool,
    #[serde(default, rename = "isfolder")]
    pub is_folder: bool,
    #[serde(default, rename = "isshared")]
    pub is_shared: bool,
    #[serde(default, deserialize_with = "byte_count")]
    pub size: u64,
}

/// Parse an RFC 1123 date, treating garbage as absent
#[must_use]
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn rfc1123<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(text.as_ref().and_then(|v| v.as_str()).and_then(parse_date))
}

/// Sizes arrive as integers or, from some endpoints, as whole floats
fn byte_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| {
            v.as_u64().or_else(|| {
                v.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
        })
        .unwrap_or(0))
}

impl PCloud {
    /// Query a path's metadata without opening it
    pub async fn stat(&self, path: &str) -> Result<FileMetadata> {
        const ENDPOINT: &str = "/stat";
        let envelope = self
            .execute(
                Method::GET,
                ENDPOINT,
                None,
                &params([("path", path.to_string())]),
            )
            .await?;

        let metadata = envelope.require(ENDPOINT, "metadata")?;
        FileMetadata::deserialize(metadata).map_err(|source| Error::Decode {
            endpoint: ENDPOINT.to_string(),
            source,
        })
    }
}
