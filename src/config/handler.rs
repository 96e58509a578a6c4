use log::warn;
use std::sync::Arc;

use crate::http::{RawResponse, TransportError};

/// What the exception handler is told about the failed call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExceptionContext {
    /// The exchange itself failed (network error or non-2xx status).
    Transport(TransportError),
    /// The server answered with a code that is neither success nor expected.
    Response(RawResponse),
}

impl ExceptionContext {
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            ExceptionContext::Transport(e) => Some(e),
            ExceptionContext::Response(_) => None,
        }
    }

    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            ExceptionContext::Transport(_) => None,
            ExceptionContext::Response(r) => Some(r),
        }
    }
}

/// Receives every failure the caller does not see: transport failures and
/// unexpected business codes. Typical handlers redirect to a login page on
/// auth expiry or show a toast.
#[cfg_attr(test, mockall::automock)]
pub trait ExceptionHandler: Send + Sync {
    fn on_exception(&self, message: &str, context: &ExceptionContext);
}

/// The default handler: logs and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyHandler;

impl ExceptionHandler for LogOnlyHandler {
    fn on_exception(&self, message: &str, context: &ExceptionContext) {
        warn!("Unhandled exception: {} ({:?})", message, context);
    }
}

struct FnHandler<F>(F);

impl<F> ExceptionHandler for FnHandler<F>
where
    F: Fn(&str, &ExceptionContext) + Send + Sync,
{
    fn on_exception(&self, message: &str, context: &ExceptionContext) {
        (self.0)(message, context)
    }
}

/// Wraps a closure as an [`ExceptionHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn ExceptionHandler>
where
    F: Fn(&str, &ExceptionContext) + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}
