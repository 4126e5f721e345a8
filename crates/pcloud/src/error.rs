//! Error types for pCloud operations

use thiserror::Error;

/// Boxed error produced by a [`crate::Transport`] implementation
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport failure on {method} {url}: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("HTTP status {status} from {method} {url}")]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Malformed response envelope from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Remote API error on {endpoint}: result {code}, \"{message}\"")]
    RemoteApi {
        endpoint: String,
        code: i64,
        message: String,
    },

    #[error("No file descriptor in open response for {path}")]
    Descriptor { path: String },

    #[error("Response from {endpoint} is missing field {field}")]
    UnexpectedPayload { endpoint: String, field: String },

    #[error("Short write on fd {descriptor}: sent {expected} bytes, remote accepted {actual}")]
    ShortWrite {
        descriptor: String,
        expected: usize,
        actual: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to close {path} (fd {descriptor}): {source}")]
    Close {
        path: String,
        descriptor: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn stat(path: &str, source: Error) -> Self {
        Error::Stat {
            path: path.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn read(path: &str, source: Error) -> Self {
        Error::Read {
            path: path.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn write(path: &str, source: Error) -> Self {
        Error::Write {
            path: path.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn close(path: &str, descriptor: &str, source: Error) -> Self {
        Error::Close {
            path: path.to_string(),
            descriptor: descriptor.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn delete(path: &str, source: Error) -> Self {
        Error::Delete {
            path: path.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn missing(endpoint: &str, field: &str) -> Self {
        Error::UnexpectedPayload {
            endpoint: endpoint.to_string(),
            field: field.to_string(),
        }
    }

    /// The innermost error, looking through the operation wrappers
    #[must_use]
    pub fn root(&self) -> &Error {
        match self {
            Error::Stat { source, .. }
            | Error::Read { source, .. }
            | Error::Write { source, .. }
            | Error::Close { source, .. }
            | Error::Delete { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the server answered with a non-200 status
    #[must_use]
    pub fn is_http_status(&self) -> bool {
        matches!(self.root(), Error::HttpStatus { .. })
    }

    /// True when the server answered with a well-formed `result != 0` envelope
    #[must_use]
    pub fn is_remote_api(&self) -> bool {
        matches!(self.root(), Error::RemoteApi { .. })
    }

    /// True when the request never produced a response
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self.root(), Error::Transport { .. })
    }

    /// The remote `result` code, if this is a remote API rejection
    #[must_use]
    pub fn remote_code(&self) -> Option<i64> {
        match self.root() {
            Error::RemoteApi { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.root() {
            Error::ShortWrite { .. } => std::io::ErrorKind::WriteZero,
            Error::Transport { .. } => std::io::ErrorKind::ConnectionAborted,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
