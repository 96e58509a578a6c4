//! HTTP transport: request description, interceptor chain and failure classification.

mod client;
mod error;
mod interceptor;
mod request;
mod response;

pub use client::{HttpClient, Transport};
pub use error::{TransportError, TransportErrorKind, classify_status};
pub use interceptor::{ErrorInterceptor, RequestInterceptor};
pub use request::{Form, FormField, HttpRequest, RequestBody, RequestConfig, encode_params};
pub use response::{RawResponse, TransportOutcome, decode_body};

#[cfg(test)]
pub use client::MockTransport;
#[cfg(test)]
pub use interceptor::{MockErrorInterceptor, MockRequestInterceptor};
