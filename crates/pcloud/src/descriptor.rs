//! Remote file descriptors
//!
//! `file_open` hands out a numeric `fd` that names a server-side session
//! with its own cursor. Reads and writes against it move that cursor; the
//! client never seeks. The manager here holds no state: each call takes
//! the descriptor the caller owns.

use crate::Result;
use crate::client::{PCloud, params};
use crate::error::Error;
use bytes::Bytes;
use diagnostics::*;
use reqwest::Method;
use serde_json::Value;
use std::fmt;

/// `O_CREAT`: create the file if it does not exist
pub const O_CREAT: u32 = 0x0040;
/// `O_APPEND`: every write goes to the end of the file
pub const O_APPEND: u32 = 0x0400;
/// Flags sent with every `file_open`
pub const OPEN_FLAGS: u32 = O_CREAT | O_APPEND;

/// Opaque session token returned by `file_open`
///
/// Kept as the canonical decimal text of the remote number so it can only
/// be passed back, never computed with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor(String);

impl Descriptor {
    /// Canonical form of an `fd` value from an open response
    fn from_value(value: &Value) -> Option<Self> {
        if let Some(fd) = value.as_u64() {
            return Some(Descriptor(fd.to_string()));
        }
        if let Some(fd) = value.as_i64() {
            return Some(Descriptor(fd.to_string()));
        }
        value
            .as_f64()
            .filter(|fd| fd.is_finite())
            .map(|fd| Descriptor(format!("{fd:.0}")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PCloud {
    /// Open (creating if absent) a remote file and return its descriptor
    pub async fn open_file(&self, path: &str) -> Result<Descriptor> {
        let envelope = self
            .execute(
                Method::GET,
                "/file_open",
                None,
                &params([
                    ("flags", OPEN_FLAGS.to_string()),
                    ("path", path.to_string()),
                ]),
            )
            .await?;

        let descriptor = envelope
            .get("fd")
            .and_then(Descriptor::from_value)
            .ok_or_else(|| Error::Descriptor {
                path: path.to_string(),
            })?;

        debug!("Opened {path} as fd {fd}", path: path, fd: descriptor.as_str());
        Ok(descriptor)
    }

    /// Read up to `count` bytes at the descriptor's cursor
    ///
    /// An empty result means the cursor is at end of file.
    pub async fn read_file(&self, descriptor: &Descriptor, count: usize) -> Result<Bytes> {
        self.execute_raw(
            Method::GET,
            "/file_read",
            None,
            &params([
                ("fd", descriptor.to_string()),
                ("count", count.to_string()),
            ]),
        )
        .await
    }

    /// Write a buffer at the descriptor's cursor, returning the bytes the
    /// server reports written
    pub async fn write_file(&self, descriptor: &Descriptor, data: Bytes) -> Result<usize> {
        const ENDPOINT: &str = "/file_write";
        let envelope = self
            .execute(
                Method::PUT,
                ENDPOINT,
                Some(data),
                &params([("fd", descriptor.to_string())]),
            )
            .await?;

        let written = envelope.require(ENDPOINT, "bytes")?;
        written
            .as_u64()
            .or_else(|| written.as_f64().filter(|n| *n >= 0.0).map(|n| n as u64))
            .map(|n| n as usize)
            .ok_or_else(|| Error::missing(ENDPOINT, "bytes"))
    }

    /// Close a descriptor on the server
    pub async fn close_file(&self, descriptor: &Descriptor) -> Result<()> {
        self.execute(
            Method::GET,
            "/file_close",
            None,
            &params([("fd", descriptor.to_string())]),
        )
        .await?;
        debug!("Closed fd {fd}", fd: descriptor.as_str());
        Ok(())
    }
}
