//! Sequential stream over one remote file
//!
//! A [`RemoteFile`] is bound to a path and carries the stat snapshot taken
//! when it was created. The remote descriptor is opened lazily by the first
//! `read` or `write` and released by `close` (or `delete`). Reads and writes
//! move the server-side cursor; there is no local offset and no read-ahead.
//!
//! Writes follow the handle's [`WritePolicy`]. With
//! [`WritePolicy::Chunked`] bytes accumulate locally and go out in
//! `chunk_size` pieces; the trailing partial chunk is only sent by
//! [`RemoteFile::flush`] or [`RemoteFile::close`].

use crate::Result;
use crate::client::PCloud;
use crate::config::{DeletePolicy, WritePolicy};
use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::metadata::FileMetadata;
use bytes::{Buf, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use diagnostics::*;

/// A remote file handle with sequential read/write semantics
pub struct RemoteFile {
    client: PCloud,
    path: String,
    metadata: FileMetadata,
    descriptor: Option<Descriptor>,
    write_policy: WritePolicy,
    delete_policy: DeletePolicy,
    /// Bytes accepted by `write` but not yet sent (chunked policy only)
    pending: BytesMut,
    /// Bytes the server has acknowledged through this handle
    flushed: u64,
}

impl std::fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("path", &self.path)
            .field("descriptor", &self.descriptor)
            .field("size", &self.metadata.size)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl RemoteFile {
    /// Bind a handle to an existing remote path
    ///
    /// Stats the path; fails without opening anything if it does not exist.
    pub async fn new(client: &PCloud, path: &str) -> Result<Self> {
        let metadata = client
            .stat(path)
            .await
            .map_err(|e| Error::stat(path, e))?;
        Ok(Self::from_metadata(client, path, metadata, None))
    }

    /// Bind a handle to a path, creating the remote file if it is missing
    ///
    /// The open flags create the file, so this opens first and stats after.
    /// The returned handle already holds the descriptor.
    pub async fn create(client: &PCloud, path: &str) -> Result<Self> {
        let descriptor = client
            .open_file(path)
            .await
            .map_err(|e| Error::stat(path, e))?;

        match client.stat(path).await {
            Ok(metadata) => Ok(Self::from_metadata(client, path, metadata, Some(descriptor))),
            Err(e) => {
                if let Err(close_err) = client.close_file(&descriptor).await {
                    let close_err = close_err.to_string();
                    warn!("Failed to close fd {fd} after stat failure on {path}: {close_err}",
                        fd: descriptor.as_str(), path: path, close_err: close_err.as_str());
                }
                Err(Error::stat(path, e))
            }
        }
    }

    fn from_metadata(
        client: &PCloud,
        requested: &str,
        metadata: FileMetadata,
        descriptor: Option<Descriptor>,
    ) -> Self {
        let path = metadata
            .path
            .clone()
            .unwrap_or_else(|| requested.to_string());
        Self {
            client: client.clone(),
            path,
            metadata,
            descriptor,
            write_policy: client.write_policy(),
            delete_policy: client.delete_policy(),
            pending: BytesMut::new(),
            flushed: 0,
        }
    }

    /// Replace the write policy
    ///
    /// Any bytes held under the previous policy must be flushed first, so
    /// policies never mix on one handle.
    pub async fn set_write_policy(&mut self, write_policy: WritePolicy) -> Result<()> {
        if write_policy == self.write_policy {
            return Ok(());
        }
        if let WritePolicy::Chunked { chunk_size: 0 } = write_policy {
            return Err(Error::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        self.flush().await?;
        self.write_policy = write_policy;
        Ok(())
    }

    #[must_use]
    pub fn with_delete_policy(mut self, delete_policy: DeletePolicy) -> Self {
        self.delete_policy = delete_policy;
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    #[must_use]
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.metadata.modified
    }

    #[must_use]
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.metadata.created
    }

    #[must_use]
    pub fn is_mine(&self) -> bool {
        self.metadata.is_mine
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.metadata.is_folder
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.metadata.is_shared
    }

    /// Size from the stat snapshot plus what this handle has written since
    ///
    /// Not refreshed from the server; other writers are invisible here.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    /// The stat snapshot taken at construction, with `size` advanced by
    /// local writes.
    #[must_use]
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.descriptor.is_some()
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    #[must_use]
    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    /// Bytes accepted by `write` and still waiting for a chunk boundary
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn ensure_open(&mut self) -> Result<Descriptor> {
        if let Some(descriptor) = &self.descriptor {
            return Ok(descriptor.clone());
        }
        let descriptor = self.client.open_file(&self.path).await?;
        self.descriptor = Some(descriptor.clone());
        Ok(descriptor)
    }

    /// Read up to `buf.len()` bytes at the remote cursor
    ///
    /// Issues exactly one remote read. Returns `Ok(0)` at end of file (or
    /// for an empty buffer, without a call).
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let descriptor = self
            .ensure_open()
            .await
            .map_err(|e| Error::read(&self.path, e))?;

        let data = self
            .client
            .read_file(&descriptor, buf.len())
            .await
            .map_err(|e| Error::read(&self.path, e))?;

        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    /// Read from the cursor to end of file
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>, chunk_size: usize) -> Result<usize> {
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    /// Write a buffer according to the handle's write policy
    ///
    /// Immediate: one remote write; returns the count the server reports.
    /// Chunked: returns `buf.len()` once the bytes are buffered, sending
    /// every complete chunk on the way. If a chunk fails, the part of `buf`
    /// the server never received is taken back out of the buffer; the call
    /// returns the count that was kept, or the error when that is zero.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let descriptor = self
            .ensure_open()
            .await
            .map_err(|e| Error::write(&self.path, e))?;

        match self.write_policy {
            WritePolicy::Immediate => {
                let written = self
                    .client
                    .write_file(&descriptor, Bytes::copy_from_slice(buf))
                    .await
                    .map_err(|e| Error::write(&self.path, e))?;
                self.record_written(written);
                Ok(written)
            }
            WritePolicy::Chunked { chunk_size } => {
                self.pending.extend_from_slice(buf);
                while self.pending.len() >= chunk_size {
                    if let Err(e) = self.send_pending(&descriptor, chunk_size).await {
                        let unsent = buf.len().min(self.pending.len());
                        self.pending.truncate(self.pending.len() - unsent);
                        let accepted = buf.len() - unsent;
                        if accepted == 0 {
                            return Err(e);
                        }
                        let reason = e.to_string();
                        debug!("Accepted {accepted} of {len} bytes for {path}: {reason}",
                            accepted: accepted, len: buf.len(),
                            path: self.path.as_str(), reason: reason.as_str());
                        return Ok(accepted);
                    }
                }
                Ok(buf.len())
            }
        }
    }

    /// Write the whole buffer, looping over short immediate writes
    pub async fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                let descriptor = self
                    .descriptor
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                return Err(Error::write(
                    &self.path,
                    Error::ShortWrite {
                        descriptor,
                        expected: buf.len(),
                        actual: 0,
                    },
                ));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Send any partial chunk still held by the chunked policy
    ///
    /// On failure the unacknowledged bytes stay buffered, so a later
    /// `flush` or `close` sends them again.
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let descriptor = self
            .ensure_open()
            .await
            .map_err(|e| Error::write(&self.path, e))?;
        let len = self.pending.len();
        self.send_pending(&descriptor, len).await
    }

    /// Write the first `len` buffered bytes, dropping only what the server
    /// acknowledges
    async fn send_pending(&mut self, descriptor: &Descriptor, len: usize) -> Result<()> {
        let chunk = Bytes::copy_from_slice(&self.pending[..len]);
        let written = self
            .client
            .write_file(descriptor, chunk)
            .await
            .map_err(|e| Error::write(&self.path, e))?
            .min(len);
        self.pending.advance(written);
        self.record_written(written);

        if written != len {
            return Err(Error::write(
                &self.path,
                Error::ShortWrite {
                    descriptor: descriptor.to_string(),
                    expected: len,
                    actual: written,
                },
            ));
        }

        info!("Flushed {bytes} bytes to {path} ({total} total)",
            bytes: written, path: self.path.as_str(), total: self.flushed);
        Ok(())
    }

    fn record_written(&mut self, written: usize) {
        self.flushed += written as u64;
        self.metadata.size += written as u64;
    }

    /// Release the remote descriptor
    ///
    /// Sends any pending chunk first. Closing a handle that is not open is a
    /// no-op. On failure the descriptor and any unsent bytes are kept so the
    /// close can be retried.
    pub async fn close(&mut self) -> Result<()> {
        let Some(descriptor) = self.descriptor.clone() else {
            return Ok(());
        };

        self.flush()
            .await
            .map_err(|e| Error::close(&self.path, descriptor.as_str(), e))?;

        self.client
            .close_file(&descriptor)
            .await
            .map_err(|e| Error::close(&self.path, descriptor.as_str(), e))?;
        self.descriptor = None;
        Ok(())
    }

    /// Delete the remote file, closing the handle first if it is open
    ///
    /// Under [`DeletePolicy::BestEffortClose`] a failed close is logged and
    /// unsent bytes are dropped. The descriptor gets one more direct
    /// `file_close` before the delete goes ahead. Under
    /// [`DeletePolicy::RequireClose`] the close error is returned and nothing
    /// is deleted.
    pub async fn delete(&mut self) -> Result<()> {
        if self.descriptor.is_some() {
            if let Err(e) = self.close().await {
                match self.delete_policy {
                    DeletePolicy::RequireClose => return Err(Error::delete(&self.path, e)),
                    DeletePolicy::BestEffortClose => {
                        let reason = e.to_string();
                        warn!("Deleting {path} despite close failure: {reason}",
                            path: self.path.as_str(), reason: reason.as_str());
                        self.pending.clear();
                        if let Some(descriptor) = self.descriptor.take() {
                            if let Err(e) = self.client.close_file(&descriptor).await {
                                let reason = e.to_string();
                                warn!("Abandoning fd {fd} of {path}: {reason}",
                                    fd: descriptor.as_str(), path: self.path.as_str(),
                                    reason: reason.as_str());
                            }
                        }
                    }
                }
            }
        }

        self.client
            .delete_file(&self.path)
            .await
            .map_err(|e| Error::delete(&self.path, e))
    }
}

impl Drop for RemoteFile {
    fn drop(&mut self) {
        let Some(descriptor) = self.descriptor.take() else {
            return;
        };

        if !self.pending.is_empty() {
            let lost = self.pending.len();
            warn!("Dropping {path} with {lost} unflushed bytes",
                path: self.path.as_str(), lost: lost);
        }

        // Best effort: close on the current runtime if there is one.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                let path = self.path.clone();
                handle.spawn(async move {
                    if let Err(e) = client.close_file(&descriptor).await {
                        let reason = e.to_string();
                        warn!("Deferred close of {path} failed: {reason}",
                            path: path.as_str(), reason: reason.as_str());
                    }
                });
            }
            Err(_) => {
                warn!("Dropping {path} with fd {fd} still open",
                    path: self.path.as_str(), fd: descriptor.as_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Failure, MemoryCloud};

    async fn setup() -> (MemoryCloud, PCloud) {
        let cloud = MemoryCloud::new("secret");
        let client = cloud.client().unwrap();
        (cloud, client)
    }

    fn chunked(cloud: &MemoryCloud, chunk_size: usize) -> PCloud {
        let config = cloud
            .config()
            .with_write_policy(WritePolicy::Chunked { chunk_size });
        cloud.client_for(&config).unwrap()
    }

    #[tokio::test]
    async fn test_new_on_missing_path_fails_without_descriptor() {
        let (cloud, client) = setup().await;

        let err = RemoteFile::new(&client, "/missing.txt").await.unwrap_err();
        assert!(matches!(err, Error::Stat { .. }));
        assert_eq!(err.remote_code(), Some(2009));
        assert_eq!(cloud.count_calls("/file_open"), 0);
        assert_eq!(cloud.open_descriptors(), 0);
    }

    #[tokio::test]
    async fn test_new_takes_metadata_snapshot() {
        let (cloud, client) = setup().await;
        cloud.insert("/docs/t.txt", b"0123456789");

        let file = RemoteFile::new(&client, "/docs/t.txt").await.unwrap();
        assert_eq!(file.path(), "/docs/t.txt");
        assert_eq!(file.name(), "t.txt");
        assert!(file.id().starts_with('f'));
        assert_eq!(file.size(), 10);
        assert!(file.is_mine());
        assert!(!file.is_folder());
        assert!(!file.is_shared());
        assert!(file.modified().is_some());
        assert!(file.created().is_some());
        assert!(!file.is_open());
    }

    #[tokio::test]
    async fn test_hello_world_scenario() {
        let (cloud, client) = setup().await;

        let mut file = RemoteFile::create(&client, "/t.txt").await.unwrap();
        assert_eq!(file.size(), 0);

        let n = file.write(b"Hello, World!").await.unwrap();
        assert_eq!(n, 13);
        assert_eq!(file.size(), 13);
        file.close().await.unwrap();

        let fresh = RemoteFile::new(&client, "/t.txt").await.unwrap();
        assert_eq!(fresh.size(), 13);
        assert_eq!(cloud.contents("/t.txt").unwrap(), b"Hello, World!");
    }

    #[tokio::test]
    async fn test_lazy_open_on_first_read() {
        let (cloud, client) = setup().await;
        cloud.insert("/a.txt", b"abc");

        let mut file = RemoteFile::new(&client, "/a.txt").await.unwrap();
        assert_eq!(cloud.count_calls("/file_open"), 0);

        let mut buf = [0u8; 2];
        assert_eq!(file.read(&mut buf).await.unwrap(), 2);
        assert!(file.is_open());
        assert_eq!(&buf, b"ab");

        assert_eq!(file.read(&mut buf).await.unwrap(), 1);
        assert_eq!(buf[0], b'c');
        assert_eq!(cloud.count_calls("/file_open"), 1);
        assert_eq!(cloud.count_calls("/file_read"), 2);
    }

    #[tokio::test]
    async fn test_read_past_end_is_zero_not_error() {
        let (cloud, client) = setup().await;
        cloud.insert("/a.txt", b"abc");

        let mut file = RemoteFile::new(&client, "/a.txt").await.unwrap();
        let mut out = Vec::new();
        assert_eq!(file.read_to_end(&mut out, 2).await.unwrap(), 3);
        assert_eq!(out, b"abc");

        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf).await.unwrap(), 0);
        assert_eq!(file.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_does_not_resync_size() {
        let (cloud, client) = setup().await;
        cloud.insert("/a.txt", b"abc");

        let mut file = RemoteFile::new(&client, "/a.txt").await.unwrap();
        cloud.insert("/a.txt", b"abcdef");

        let mut out = Vec::new();
        file.read_to_end(&mut out, 16).await.unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(file.size(), 3);
    }

    #[tokio::test]
    async fn test_read_error_wraps_cause() {
        let (cloud, client) = setup().await;
        cloud.insert("/a.txt", b"abc");
        let mut file = RemoteFile::new(&client, "/a.txt").await.unwrap();

        cloud.fail_next("/file_read", Failure::Status(502));
        let mut buf = [0u8; 4];
        let err = file.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert!(err.is_http_status());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (cloud, client) = setup().await;
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let mut writer = RemoteFile::create(&client, "/data.bin").await.unwrap();
        for piece in data.chunks(777) {
            writer.write_all(piece).await.unwrap();
        }
        writer.close().await.unwrap();

        let mut reader = RemoteFile::new(&client, "/data.bin").await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out, 1024).await.unwrap();
        reader.close().await.unwrap();

        assert_eq!(out, data);
        assert_eq!(cloud.open_descriptors(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (cloud, client) = setup().await;
        cloud.insert("/a.txt", b"abc");

        let mut file = RemoteFile::new(&client, "/a.txt").await.unwrap();
        file.close().await.unwrap();
        assert_eq!(cloud.count_calls("/file_close"), 0);

        file.write(b"d").await.unwrap();
        file.close().await.unwrap();
        file.close().await.unwrap();
        assert_eq!(cloud.count_calls("/file_close"), 1);
        assert!(!file.is_open());
    }

    #[tokio::test]
    async fn test_close_failure_keeps_descriptor_for_retry() {
        let (cloud, client) = setup().await;
        let mut file = RemoteFile::create(&client, "/a.txt").await.unwrap();
        let descriptor = file.descriptor().cloned().unwrap();

        cloud.fail_next("/file_close", Failure::Transport);
        let err = file.close().await.unwrap_err();
        assert!(matches!(err, Error::Close { .. }));
        assert_eq!(file.descriptor(), Some(&descriptor));

        file.close().await.unwrap();
        assert!(!file.is_open());
        assert_eq!(cloud.open_descriptors(), 0);
    }

    #[tokio::test]
    async fn test_delete_open_file() {
        let (cloud, client) = setup().await;
        let mut file = RemoteFile::create(&client, "/a.txt").await.unwrap();
        file.write(b"abc").await.unwrap();

        file.delete().await.unwrap();
        assert!(!file.is_open());
        assert!(!cloud.exists("/a.txt"));
        assert_eq!(cloud.open_descriptors(), 0);
    }

    #[tokio::test]
    async fn test_delete_closed_file() {
        let (cloud, client) = setup().await;
        cloud.insert("/a.txt", b"abc");
        let mut file = RemoteFile::new(&client, "/a.txt").await.unwrap();

        file.delete().await.unwrap();
        assert!(!cloud.exists("/a.txt"));
        assert_eq!(cloud.count_calls("/file_close"), 0);
    }

    #[tokio::test]
    async fn test_delete_proceeds_after_failed_close() {
        let (cloud, client) = setup().await;
        let mut file = RemoteFile::create(&client, "/a.txt").await.unwrap();

        cloud.fail_next("/file_close", Failure::Remote(5000, "Internal error."));
        file.delete().await.unwrap();
        assert!(!file.is_open());
        assert!(!cloud.exists("/a.txt"));
    }

    #[tokio::test]
    async fn test_require_close_policy_stops_delete() {
        let (cloud, client) = setup().await;
        let mut file = RemoteFile::create(&client, "/a.txt")
            .await
            .unwrap()
            .with_delete_policy(DeletePolicy::RequireClose);

        cloud.fail_next("/file_close", Failure::Remote(5000, "Internal error."));
        let err = file.delete().await.unwrap_err();
        assert!(matches!(err, Error::Delete { .. }));
        assert_eq!(err.remote_code(), Some(5000));
        assert!(file.is_open());
        assert!(cloud.exists("/a.txt"));

        file.delete().await.unwrap();
        assert!(!cloud.exists("/a.txt"));
    }

    #[tokio::test]
    async fn test_delete_missing_remote_is_delete_error() {
        let (cloud, client) = setup().await;
        cloud.insert("/a.txt", b"abc");
        let mut file = RemoteFile::new(&client, "/a.txt").await.unwrap();
        cloud.fail_next("/deletefile", Failure::Remote(2009, "File not found."));

        let err = file.delete().await.unwrap_err();
        assert!(matches!(err, Error::Delete { .. }));
    }

    #[tokio::test]
    async fn test_immediate_policy_one_call_per_write() {
        let (cloud, client) = setup().await;
        let mut file = RemoteFile::create(&client, "/a.txt").await.unwrap();

        file.write(b"ab").await.unwrap();
        file.write(b"cd").await.unwrap();
        file.write(b"e").await.unwrap();
        assert_eq!(cloud.count_calls("/file_write"), 3);
        assert_eq!(file.pending(), 0);
        assert_eq!(cloud.contents("/a.txt").unwrap(), b"abcde");
    }

    #[tokio::test]
    async fn test_immediate_policy_reports_server_count() {
        let (cloud, client) = setup().await;
        cloud.limit_writes(Some(4));
        let mut file = RemoteFile::create(&client, "/a.txt").await.unwrap();

        assert_eq!(file.write(b"abcdef").await.unwrap(), 4);
        assert_eq!(file.size(), 4);

        file.write_all(b"ghij").await.unwrap();
        assert_eq!(cloud.contents("/a.txt").unwrap(), b"abcdghij");
    }

    #[tokio::test]
    async fn test_chunked_policy_holds_partial_chunk_until_flush() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 1024);
        let data = vec![7u8; 1536];

        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        assert_eq!(file.write(&data).await.unwrap(), 1536);
        assert_eq!(cloud.count_calls("/file_write"), 1);
        assert_eq!(file.pending(), 512);
        assert_eq!(file.size(), 1024);
        assert_eq!(cloud.contents("/c.bin").unwrap().len(), 1024);

        file.flush().await.unwrap();
        assert_eq!(cloud.count_calls("/file_write"), 2);
        assert_eq!(file.pending(), 0);
        assert_eq!(file.size(), 1536);
        assert_eq!(cloud.contents("/c.bin").unwrap(), data);
    }

    #[tokio::test]
    async fn test_chunked_policy_write_count_is_ceiling() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 100);

        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        for _ in 0..25 {
            file.write(&[1u8; 33]).await.unwrap();
        }
        file.close().await.unwrap();

        // 825 bytes in 100 byte chunks
        assert_eq!(cloud.count_calls("/file_write"), 9);
        assert_eq!(cloud.contents("/c.bin").unwrap().len(), 825);

        let calls = cloud.calls();
        let sizes: Vec<usize> = calls
            .iter()
            .filter(|call| call.endpoint == "/file_write")
            .map(|call| call.body_len)
            .collect();
        assert!(sizes[..8].iter().all(|size| *size == 100));
        assert_eq!(sizes[8], 25);
    }

    #[tokio::test]
    async fn test_close_flushes_trailing_chunk() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 1024);

        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        file.write(b"short").await.unwrap();
        assert_eq!(cloud.count_calls("/file_write"), 0);

        file.close().await.unwrap();
        assert_eq!(cloud.contents("/c.bin").unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_chunked_short_write_keeps_unacknowledged_bytes() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 8);
        cloud.limit_writes(Some(5));

        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        // The server takes five bytes of the first chunk; the other three
        // are handed back to the caller
        assert_eq!(file.write(&[0u8; 8]).await.unwrap(), 5);
        assert_eq!(file.pending(), 0);
        assert_eq!(file.size(), 5);

        file.write(&[1u8; 6]).await.unwrap();
        let err = file.flush().await.unwrap_err();
        match err.root() {
            Error::ShortWrite {
                expected, actual, ..
            } => {
                assert_eq!(*expected, 6);
                assert_eq!(*actual, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(file.pending(), 1);

        file.flush().await.unwrap();
        assert_eq!(file.pending(), 0);
        let mut expected = vec![0u8; 5];
        expected.extend_from_slice(&[1u8; 6]);
        assert_eq!(cloud.contents("/c.bin").unwrap(), expected);
    }

    #[tokio::test]
    async fn test_chunked_write_failure_takes_back_unsent_input() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 4);
        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        file.write(b"ab").await.unwrap();

        cloud.fail_next("/file_write", Failure::Status(500));
        let err = file.write(b"cdef").await.unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
        assert!(err.is_http_status());
        // Bytes from earlier calls survive, the failed call's bytes do not
        assert_eq!(file.pending(), 2);

        file.write(b"cdef").await.unwrap();
        file.close().await.unwrap();
        assert_eq!(cloud.contents("/c.bin").unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_chunked_partial_acceptance_counts_only_new_bytes() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 4);
        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        file.write(b"ab").await.unwrap();

        // "abc" lands; only "c" came from this call
        cloud.limit_writes(Some(3));
        assert_eq!(file.write(b"cdefgh").await.unwrap(), 1);
        assert_eq!(file.pending(), 0);

        cloud.limit_writes(None);
        file.write_all(b"defgh").await.unwrap();
        file.close().await.unwrap();
        assert_eq!(cloud.contents("/c.bin").unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn test_flush_failure_keeps_pending_bytes() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 1024);
        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        file.write(b"trailing").await.unwrap();

        cloud.fail_next("/file_write", Failure::Remote(5000, "Internal error."));
        let err = file.flush().await.unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
        assert_eq!(err.remote_code(), Some(5000));
        assert_eq!(file.pending(), 8);
        assert_eq!(file.size(), 0);

        file.flush().await.unwrap();
        assert_eq!(file.pending(), 0);
        assert_eq!(cloud.contents("/c.bin").unwrap(), b"trailing");
    }

    #[tokio::test]
    async fn test_close_retry_after_failed_flush_sends_trailing_bytes() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 1024);
        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        file.write(b"trailing").await.unwrap();

        cloud.fail_next("/file_write", Failure::Status(500));
        let err = file.close().await.unwrap_err();
        assert!(matches!(err, Error::Close { .. }));
        assert!(err.is_http_status());
        assert!(file.is_open());
        assert_eq!(file.pending(), 8);
        assert_eq!(cloud.count_calls("/file_close"), 0);

        file.close().await.unwrap();
        assert!(!file.is_open());
        assert_eq!(cloud.contents("/c.bin").unwrap(), b"trailing");
        assert_eq!(cloud.open_descriptors(), 0);
    }

    #[tokio::test]
    async fn test_best_effort_delete_after_failed_flush_releases_descriptor() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 1024);
        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        file.write(b"trailing").await.unwrap();

        cloud.fail_next("/file_write", Failure::Transport);
        file.delete().await.unwrap();
        assert!(!file.is_open());
        assert_eq!(file.pending(), 0);
        assert!(!cloud.exists("/c.bin"));
        assert_eq!(cloud.count_calls("/file_close"), 1);
        assert_eq!(cloud.open_descriptors(), 0);
    }

    #[tokio::test]
    async fn test_require_close_delete_after_failed_flush() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 1024);
        let mut file = RemoteFile::create(&client, "/c.bin")
            .await
            .unwrap()
            .with_delete_policy(DeletePolicy::RequireClose);
        file.write(b"trailing").await.unwrap();

        cloud.fail_next("/file_write", Failure::Status(500));
        let err = file.delete().await.unwrap_err();
        assert!(matches!(err, Error::Delete { .. }));
        assert!(err.is_http_status());
        assert!(file.is_open());
        assert_eq!(file.pending(), 8);
        assert!(cloud.exists("/c.bin"));

        file.delete().await.unwrap();
        assert!(!cloud.exists("/c.bin"));
        assert_eq!(cloud.open_descriptors(), 0);
    }

    #[tokio::test]
    async fn test_switching_policy_flushes_first() {
        let cloud = MemoryCloud::new("secret");
        let client = chunked(&cloud, 1024);

        let mut file = RemoteFile::create(&client, "/c.bin").await.unwrap();
        file.write(b"abc").await.unwrap();
        file.set_write_policy(WritePolicy::Immediate).await.unwrap();
        assert_eq!(file.pending(), 0);
        assert_eq!(cloud.contents("/c.bin").unwrap(), b"abc");

        file.write(b"d").await.unwrap();
        assert_eq!(cloud.contents("/c.bin").unwrap(), b"abcd");
        assert!(file.set_write_policy(WritePolicy::Chunked { chunk_size: 0 }).await.is_err());
    }

    #[tokio::test]
    async fn test_create_closes_descriptor_when_stat_fails() {
        let (cloud, client) = setup().await;
        cloud.fail_next("/stat", Failure::Status(500));

        let err = RemoteFile::create(&client, "/a.txt").await.unwrap_err();
        assert!(matches!(err, Error::Stat { .. }));
        assert_eq!(cloud.open_descriptors(), 0);
    }

    #[tokio::test]
    async fn test_drop_closes_open_descriptor() {
        let (cloud, client) = setup().await;
        {
            let mut file = RemoteFile::create(&client, "/a.txt").await.unwrap();
            file.write(b"abc").await.unwrap();
        }
        for _ in 0..10 {
            if cloud.open_descriptors() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(cloud.open_descriptors(), 0);
    }
}
