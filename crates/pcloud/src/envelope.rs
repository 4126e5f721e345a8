//! The JSON envelope every non-raw pCloud response is wrapped in
//!
//! An envelope is a JSON object. `result` is `0` on success and a remote
//! error code otherwise, with a human readable `error` beside it. Some
//! endpoints omit `result` entirely; that counts as success. Everything else
//! is endpoint-specific payload.

use crate::error::Error;
use crate::Result;
use serde_json::{Map, Value};

/// A decoded, successful response envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Decode a response body, turning `result != 0` into [`Error::RemoteApi`]
    pub fn decode(endpoint: &str, body: &[u8]) -> Result<Self> {
        let fields: Map<String, Value> =
            serde_json::from_slice(body).map_err(|source| Error::Decode {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let envelope = Envelope { fields };
        match envelope.result() {
            None | Some(0) => Ok(envelope),
            Some(code) => Err(Error::RemoteApi {
                endpoint: endpoint.to_string(),
                code,
                message: envelope.error_message().unwrap_or_default().to_string(),
            }),
        }
    }

    /// The `result` code, if the endpoint sent one
    ///
    /// Non-integral numbers are truncated; non-numeric values read as absent.
    #[must_use]
    pub fn result(&self) -> Option<i64> {
        let value = self.fields.get("result")?;
        value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.fields.get("error").and_then(Value::as_str)
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Look up a required payload field
    pub fn require(&self, endpoint: &str, field: &str) -> Result<&Value> {
        self.get(field).ok_or_else(|| Error::missing(endpoint, field))
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
