//! pCloud client with stream-file semantics
//!
//! pCloud exposes files through descriptors: `file_open` returns an `fd`,
//! `file_read`/`file_write` move a server-side cursor, and `file_close`
//! ends the session. This crate wraps that API as [`RemoteFile`], a handle
//! with lazy open, sequential read/write, idempotent close and delete, and
//! as [`RemoteFileStream`] for use with `tokio::io`.
//!
//! Every request goes through a [`Transport`]. [`PCloud::new`] uses
//! `reqwest`; [`MemoryCloud`] answers from memory for tests.
//!
//! ```no_run
//! # async fn example() -> pcloud::Result<()> {
//! use pcloud::{PCloud, PCloudConfig, RemoteFile};
//!
//! let client = PCloud::new(&PCloudConfig::from_env()?)?;
//! let mut file = RemoteFile::create(&client, "/t.txt").await?;
//! file.write(b"Hello, World!").await?;
//! file.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod file;
pub mod memory;
pub mod metadata;
pub mod stream;
pub mod transport;

pub use client::{PCloud, Params, params};
pub use config::{
    DEFAULT_BASE_URL, DEFAULT_CHUNK_SIZE, DeletePolicy, PCloudConfig, WriteMode, WritePolicy,
    load_config,
};
pub use descriptor::{Descriptor, OPEN_FLAGS};
pub use envelope::Envelope;
pub use error::{Error, TransportError};
pub use file::RemoteFile;
pub use memory::{Failure, MemoryCloud};
pub use metadata::FileMetadata;
pub use stream::RemoteFileStream;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

pub type Result<T> = std::result::Result<T, Error>;
