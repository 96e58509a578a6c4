//! Response classifier: turns a transport outcome into one of three
//! caller-visible shapes.

use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::ser::{Error as _, SerializeMap, Serializer};
use serde_json::Value;

use crate::config::{ExceptionContext, Policy};
use crate::http::{RawResponse, TransportOutcome};

/// A recoverable business error: the data of the response together with the
/// error metadata.
///
/// Serializes as one map: the fields of `data` when it is a map, otherwise
/// `data` under its own key, followed by `resultMsg`, `businessCode` and
/// `rawEnvelope`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedError<T> {
    pub data: Option<T>,
    pub result_msg: Option<String>,
    pub business_code: i64,
    pub raw_envelope: RawResponse,
}

impl<T: Serialize> Serialize for ExpectedError<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = serde_json::to_value(&self.data).map_err(S::Error::custom)?;

        let mut map = serializer.serialize_map(None)?;
        match data {
            Value::Null => {}
            Value::Object(fields) => {
                for (key, value) in &fields {
                    map.serialize_entry(key, value)?;
                }
            }
            other => map.serialize_entry("data", &other)?,
        }
        map.serialize_entry("resultMsg", &self.result_msg)?;
        map.serialize_entry("businessCode", &self.business_code)?;
        map.serialize_entry("rawEnvelope", &self.raw_envelope)?;
        map.end()
    }
}

/// Why a call produced nothing actionable for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unhandled {
    /// The exchange failed; the exception handler already fired.
    TransportFailed,
    /// The response carried no envelope. The handler is not called.
    MissingEnvelope,
    /// The body or its data could not be decoded. The handler is not called.
    MalformedEnvelope(String),
    /// The code was neither success nor expected; the handler fired once.
    UnexpectedCode { code: i64, message: String },
    /// No client could be created to send the request. Nothing was sent and
    /// no handler was configured to call.
    ClientUnavailable(String),
}

impl std::fmt::Display for Unhandled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unhandled::TransportFailed => write!(f, "request failed"),
            Unhandled::MissingEnvelope => write!(f, "response carried no envelope"),
            Unhandled::MalformedEnvelope(reason) => write!(f, "malformed envelope: {}", reason),
            Unhandled::UnexpectedCode { code, message } if message.is_empty() => {
                write!(f, "unexpected business code {}", code)
            }
            Unhandled::UnexpectedCode { code, message } => {
                write!(f, "unexpected business code {}: {}", code, message)
            }
            Unhandled::ClientUnavailable(reason) => write!(f, "no client available: {}", reason),
        }
    }
}

/// The classified result of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified<T> {
    Success(T),
    Expected(ExpectedError<T>),
    Unhandled(Unhandled),
}

impl<T> Classified<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Classified::Success(_))
    }

    pub fn is_expected(&self) -> bool {
        matches!(self, Classified::Expected(_))
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self, Classified::Unhandled(_))
    }

    /// The data of a successful call.
    pub fn success(self) -> Option<T> {
        match self {
            Classified::Success(data) => Some(data),
            _ => None,
        }
    }

    /// The data of a successful call, or the data carried by an expected error.
    pub fn data(self) -> Option<T> {
        match self {
            Classified::Success(data) => Some(data),
            Classified::Expected(expected) => expected.data,
            Classified::Unhandled(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, ClassifiedError<T>> {
        match self {
            Classified::Success(data) => Ok(data),
            Classified::Expected(expected) => Err(ClassifiedError::Expected(expected)),
            Classified::Unhandled(reason) => Err(ClassifiedError::Unhandled(reason)),
        }
    }
}

/// The non-success half of [`Classified`], for `?`-style callers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedError<T> {
    Expected(ExpectedError<T>),
    Unhandled(Unhandled),
}

impl<T> std::fmt::Display for ClassifiedError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifiedError::Expected(e) => match &e.result_msg {
                Some(msg) => write!(f, "business error {}: {}", e.business_code, msg),
                None => write!(f, "business error {}", e.business_code),
            },
            ClassifiedError::Unhandled(reason) => write!(f, "{}", reason),
        }
    }
}

impl<T: std::fmt::Debug> std::error::Error for ClassifiedError<T> {}

/// Classifies a transport outcome against `policy`.
///
/// The exception handler is invoked at most once, and only for a code that
/// is neither a success code nor an expected code. Transport failures were
/// already reported by the error interceptor, and a missing or malformed
/// envelope is not reported at all.
pub fn classify<T: DeserializeOwned>(outcome: TransportOutcome, policy: &Policy) -> Classified<T> {
    let response = match outcome {
        TransportOutcome::Delivered(response) => response,
        TransportOutcome::Failed(error) => {
            debug!("Transport failure already reported: {}", error);
            return Classified::Unhandled(Unhandled::TransportFailed);
        }
    };

    let envelope = match response.envelope() {
        Ok(Some(envelope)) => envelope,
        Ok(None) => {
            debug!("No envelope in response from {}", response.url);
            return Classified::Unhandled(Unhandled::MissingEnvelope);
        }
        Err(reason) => {
            warn!("Ignoring response from {}: {}", response.url, reason);
            return Classified::Unhandled(Unhandled::MalformedEnvelope(reason));
        }
    };

    let code = envelope.code;

    if policy.is_success(code) {
        return match decode_data(envelope.data.unwrap_or(Value::Null)) {
            Ok(data) => Classified::Success(data),
            Err(reason) => {
                warn!("Ignoring data from {}: {}", response.url, reason);
                Classified::Unhandled(Unhandled::MalformedEnvelope(reason))
            }
        };
    }

    if policy.is_expected(code) {
        let data = match envelope.data {
            None | Some(Value::Null) => None,
            Some(value) => match decode_data(value) {
                Ok(data) => Some(data),
                Err(reason) => {
                    warn!("Ignoring data from {}: {}", response.url, reason);
                    return Classified::Unhandled(Unhandled::MalformedEnvelope(reason));
                }
            },
        };
        debug!("Expected business code {} from {}", code, response.url);
        return Classified::Expected(ExpectedError {
            data,
            result_msg: envelope.result_msg,
            business_code: code,
            raw_envelope: response,
        });
    }

    let message = envelope.reported_message();
    debug!("Unexpected business code {} from {}", code, response.url);
    policy
        .exception_handler
        .on_exception(&message, &ExceptionContext::Response(response));

    Classified::Unhandled(Unhandled::UnexpectedCode { code, message })
}

fn decode_data<T: DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("data does not match the expected type: {}", e))
}
