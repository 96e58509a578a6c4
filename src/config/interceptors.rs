//! The two interceptors a [`ConfigStore`] registers on its transport.
//! Both read the live policy on every call, so reconfiguration applies to
//! requests made after it.

use log::debug;
use reqwest::header::HeaderMap;
use std::sync::Arc;

use super::{ConfigStore, ExceptionContext, HeaderPrecedence};
use crate::http::{ErrorInterceptor, RequestInterceptor, TransportError};

/// Merges the configured default headers into every outgoing request.
pub struct HeaderMergeInterceptor {
    store: Arc<ConfigStore>,
}

impl HeaderMergeInterceptor {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }
}

impl RequestInterceptor for HeaderMergeInterceptor {
    fn intercept(&self, headers: &mut HeaderMap) {
        let policy = self.store.policy();

        for (name, value) in policy.default_headers().iter() {
            match policy.header_precedence {
                HeaderPrecedence::RequestWins if headers.contains_key(name) => {
                    debug!("Keeping request header {}", name);
                }
                _ => {
                    headers.insert(name.clone(), value.clone());
                }
            }
        }
    }
}

/// Reports transport failures to the exception handler with the configured
/// exception message.
pub struct ExceptionInterceptor {
    store: Arc<ConfigStore>,
}

impl ExceptionInterceptor {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }
}

impl ErrorInterceptor for ExceptionInterceptor {
    fn on_error(&self, error: &TransportError) {
        // Snapshot first so the handler may reconfigure without deadlocking.
        let policy = self.store.policy();
        policy.exception_handler.on_exception(
            &policy.exception_message,
            &ExceptionContext::Transport(error.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MockExceptionHandler, PolicyConfig};
    use crate::http::{MockTransport, TransportErrorKind};
    use reqwest::header::{CONTENT_TYPE, HeaderValue};

    fn store_with(config: PolicyConfig) -> Arc<ConfigStore> {
        let mut transport = MockTransport::new();
        transport.expect_register_once().return_const(true);

        let store = Arc::new(ConfigStore::new());
        store.initialize(config, &transport).unwrap();
        store
    }

    #[test]
    fn test_header_merge_adds_defaults() {
        let store = store_with(
            PolicyConfig::new()
                .header("X-App", "demo")
                .extra_header("X-Tenant", "t1"),
        );
        let interceptor = HeaderMergeInterceptor::new(store);

        let mut headers = HeaderMap::new();
        interceptor.intercept(&mut headers);

        assert_eq!(headers.get("x-app").unwrap(), "demo");
        assert_eq!(headers.get("x-tenant").unwrap(), "t1");
    }

    #[test]
    fn test_header_merge_request_wins() {
        let store = store_with(PolicyConfig::new().header("Content-Type", "text/plain"));
        let interceptor = HeaderMergeInterceptor::new(store);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        interceptor.intercept(&mut headers);

        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_header_merge_defaults_win() {
        let store = store_with(
            PolicyConfig::new()
                .header("Content-Type", "text/plain")
                .header_precedence(HeaderPrecedence::DefaultsWin),
        );
        let interceptor = HeaderMergeInterceptor::new(store);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        interceptor.intercept(&mut headers);

        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(headers.get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[test]
    fn test_header_merge_reads_live_policy() {
        let mut transport = MockTransport::new();
        transport.expect_register_once().return_const(true);

        let store = Arc::new(ConfigStore::new());
        store
            .initialize(PolicyConfig::new().header("X-Version", "1"), &transport)
            .unwrap();
        let interceptor = HeaderMergeInterceptor::new(store.clone());

        store
            .initialize(PolicyConfig::new().header("X-Version", "2"), &transport)
            .unwrap();

        let mut headers = HeaderMap::new();
        interceptor.intercept(&mut headers);
        assert_eq!(headers.get("x-version").unwrap(), "2");
    }

    #[test]
    fn test_exception_interceptor_calls_handler_with_exception_message() {
        let mut handler = MockExceptionHandler::new();
        handler
            .expect_on_exception()
            .withf(|msg, ctx| {
                msg == "try later"
                    && ctx.transport_error().map(|e| e.kind) == Some(TransportErrorKind::NotFound)
            })
            .times(1)
            .return_const(());

        let store = store_with(
            PolicyConfig::new()
                .exception_message("try later")
                .exception_handler(Arc::new(handler)),
        );
        let interceptor = ExceptionInterceptor::new(store);

        interceptor.on_error(&TransportError::new(
            TransportErrorKind::NotFound,
            "http://h/x",
            "",
        ));
    }
}
