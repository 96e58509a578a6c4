//! The `{code, data, message}` envelope carried in every response body.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Business-level payload nested inside the transport response.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T = Value> {
    /// Business status code
    pub code: i64,
    /// Response data, absent or null for some codes
    #[serde(default)]
    pub data: Option<T>,
    /// Message description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Result message description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_msg: Option<String>,
    /// Request id assigned by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ResponseEnvelope<Value> {
    /// Extracts an envelope from a decoded response body.
    ///
    /// Returns `Ok(None)` when the body is empty or falsy (`null`, `false`,
    /// `0`, `""`), and an error message when the body is present but is not
    /// an envelope.
    pub fn from_body(body: Option<&Value>) -> Result<Option<Self>, String> {
        let body = match body {
            Some(body) if !is_falsy(body) => body,
            _ => return Ok(None),
        };

        serde_json::from_value(body.clone())
            .map(Some)
            .map_err(|e| format!("response body is not an envelope: {}", e))
    }

    /// The message reported to the exception handler: `resultMsg`, then
    /// `message`, then the empty string.
    pub fn reported_message(&self) -> String {
        self.result_msg
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_default()
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
