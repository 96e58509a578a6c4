use reqwest::header::HeaderMap;

use super::error::TransportError;

/// Runs on every outgoing request after its body has been encoded.
#[cfg_attr(test, mockall::automock)]
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, headers: &mut HeaderMap);
}

/// Runs once for every failed exchange.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorInterceptor: Send + Sync {
    fn on_error(&self, error: &TransportError);
}
