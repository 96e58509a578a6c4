use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};
use serde_json::Value;

use super::error::TransportError;
use crate::envelope::ResponseEnvelope;

/// A completed 2xx exchange with its decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub url: String,
    pub headers: HeaderMap,
    /// `None` for an empty body; a JSON string for a body that is not JSON.
    pub body: Option<Value>,
}

impl RawResponse {
    pub fn new(status: StatusCode, url: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Reads and decodes the body of a reqwest response.
    pub async fn read(response: reqwest::Response) -> Result<Self, TransportError> {
        let status = response.status();
        let url = response.url().to_string();
        let headers = response.headers().clone();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&url, &e))?;

        Ok(Self {
            status,
            url,
            headers,
            body: decode_body(&bytes),
        })
    }

    /// The envelope carried in the body, if any.
    pub fn envelope(&self) -> Result<Option<ResponseEnvelope>, String> {
        ResponseEnvelope::<Value>::from_body(self.body.as_ref())
    }
}

/// Decodes a body as JSON, keeping non-JSON text as a string value.
pub fn decode_body(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

impl Serialize for RawResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RawResponse", 4)?;
        state.serialize_field("status", &self.status.as_u16())?;
        state.serialize_field("url", &self.url)?;
        state.serialize_field("headers", &SerializedHeaders(&self.headers))?;
        state.serialize_field("data", &self.body)?;
        state.end()
    }
}

struct SerializedHeaders<'a>(&'a HeaderMap);

impl Serialize for SerializedHeaders<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name.as_str(), &String::from_utf8_lossy(value.as_bytes()))?;
        }
        map.end()
    }
}

/// Result of handing a request to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// The server answered with a 2xx status.
    Delivered(RawResponse),
    /// The exchange failed and the error interceptors have already run.
    Failed(TransportError),
}
