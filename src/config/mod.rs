//! Configuration store: the live classification policy and the one-time
//! interceptor registration guard.

mod handler;
mod interceptors;

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::http::Transport;

pub use handler::{ExceptionContext, ExceptionHandler, LogOnlyHandler, handler_fn};
pub use interceptors::{ExceptionInterceptor, HeaderMergeInterceptor};

#[cfg(test)]
pub use handler::MockExceptionHandler;

/// Business code of a successful response when none is configured.
pub const DEFAULT_SUCCESS_CODE: i64 = 200;

/// Message handed to the exception handler on transport failures when none is configured.
pub const DEFAULT_EXCEPTION_MESSAGE: &str =
    "The system is temporarily unavailable, please try again later";

/// One success code or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuccessCode {
    Single(i64),
    AnyOf(Vec<i64>),
}

impl SuccessCode {
    pub fn matches(&self, code: i64) -> bool {
        match self {
            SuccessCode::Single(expected) => *expected == code,
            SuccessCode::AnyOf(codes) => codes.contains(&code),
        }
    }
}

impl Default for SuccessCode {
    fn default() -> Self {
        SuccessCode::Single(DEFAULT_SUCCESS_CODE)
    }
}

impl From<i64> for SuccessCode {
    fn from(code: i64) -> Self {
        SuccessCode::Single(code)
    }
}

impl From<Vec<i64>> for SuccessCode {
    fn from(codes: Vec<i64>) -> Self {
        SuccessCode::AnyOf(codes)
    }
}

impl<const N: usize> From<[i64; N]> for SuccessCode {
    fn from(codes: [i64; N]) -> Self {
        SuccessCode::AnyOf(codes.to_vec())
    }
}

/// Which side wins when a configured default header is already on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderPrecedence {
    /// Headers set on the request (per call, or by the body encoding) are kept.
    #[default]
    RequestWins,
    /// Configured defaults overwrite headers already on the request.
    DefaultsWin,
}

/// Input of [`ConfigStore::initialize`]. Unset options take their defaults.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyConfig {
    pub headers: BTreeMap<String, String>,
    pub success_code: Option<SuccessCode>,
    pub exception_message: Option<String>,
    pub expected_codes: Vec<i64>,
    #[serde(skip)]
    pub exception_handler: Option<Arc<dyn ExceptionHandler>>,
    pub extra_headers: BTreeMap<String, String>,
    pub header_precedence: HeaderPrecedence,
}

impl PolicyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn success_code(mut self, code: i64) -> Self {
        self.success_code = Some(SuccessCode::Single(code));
        self
    }

    /// Any of `codes` counts as success.
    pub fn success_codes(mut self, codes: impl IntoIterator<Item = i64>) -> Self {
        self.success_code = Some(SuccessCode::AnyOf(codes.into_iter().collect()));
        self
    }

    pub fn expected_codes(mut self, codes: impl IntoIterator<Item = i64>) -> Self {
        self.expected_codes = codes.into_iter().collect();
        self
    }

    pub fn exception_message(mut self, message: impl Into<String>) -> Self {
        self.exception_message = Some(message.into());
        self
    }

    pub fn exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    pub fn header_precedence(mut self, precedence: HeaderPrecedence) -> Self {
        self.header_precedence = precedence;
        self
    }
}

impl std::fmt::Debug for PolicyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyConfig")
            .field("headers", &self.headers)
            .field("success_code", &self.success_code)
            .field("exception_message", &self.exception_message)
            .field("expected_codes", &self.expected_codes)
            .field("exception_handler", &self.exception_handler.is_some())
            .field("extra_headers", &self.extra_headers)
            .field("header_precedence", &self.header_precedence)
            .finish()
    }
}

/// The resolved classification policy.
#[derive(Clone)]
pub struct Policy {
    pub success_code: SuccessCode,
    pub expected_codes: Vec<i64>,
    pub exception_message: String,
    pub exception_handler: Arc<dyn ExceptionHandler>,
    pub headers: HeaderMap,
    pub extra_headers: HeaderMap,
    pub header_precedence: HeaderPrecedence,
}

impl Policy {
    pub fn is_success(&self, code: i64) -> bool {
        self.success_code.matches(code)
    }

    pub fn is_expected(&self, code: i64) -> bool {
        self.expected_codes.contains(&code)
    }

    /// `headers` overlaid with `extra_headers`.
    pub fn default_headers(&self) -> HeaderMap {
        let mut merged = self.headers.clone();
        merged.extend(self.extra_headers.clone());
        merged
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            success_code: SuccessCode::default(),
            expected_codes: Vec::new(),
            exception_message: DEFAULT_EXCEPTION_MESSAGE.to_string(),
            exception_handler: Arc::new(LogOnlyHandler),
            headers: HeaderMap::new(),
            extra_headers: HeaderMap::new(),
            header_precedence: HeaderPrecedence::default(),
        }
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("success_code", &self.success_code)
            .field("expected_codes", &self.expected_codes)
            .field("exception_message", &self.exception_message)
            .field("headers", &self.headers)
            .field("extra_headers", &self.extra_headers)
            .field("header_precedence", &self.header_precedence)
            .finish_non_exhaustive()
    }
}

impl TryFrom<PolicyConfig> for Policy {
    type Error = anyhow::Error;

    fn try_from(config: PolicyConfig) -> Result<Self> {
        Ok(Self {
            success_code: config.success_code.unwrap_or_default(),
            expected_codes: config.expected_codes,
            exception_message: config
                .exception_message
                .unwrap_or_else(|| DEFAULT_EXCEPTION_MESSAGE.to_string()),
            exception_handler: config
                .exception_handler
                .unwrap_or_else(|| Arc::new(LogOnlyHandler)),
            headers: to_header_map(&config.headers).context("Invalid default headers")?,
            extra_headers: to_header_map(&config.extra_headers)
                .context("Invalid extra headers")?,
            header_precedence: config.header_precedence,
        })
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name: {}", name))?;
        let header_value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid value for header {}", name))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Holds the live [`Policy`] and remembers whether the transport
/// interceptors have been registered.
#[derive(Debug, Default)]
pub struct ConfigStore {
    policy: RwLock<Policy>,
    registered: AtomicBool,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the live policy.
    pub fn policy(&self) -> Policy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether this store's interceptors are registered on a transport.
    pub fn is_initialized(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Replaces the live policy and, on the first call only, registers the
    /// header-merge and exception interceptors on `transport`.
    ///
    /// A transport accepts one pair for its lifetime. If another store got
    /// there first, this store's policy is kept but never consulted by that
    /// transport.
    ///
    /// An invalid configuration is rejected before anything changes.
    #[tracing::instrument(skip(self, transport))]
    pub fn initialize(self: &Arc<Self>, config: PolicyConfig, transport: &dyn Transport) -> Result<()> {
        let policy = Policy::try_from(config)?;
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;

        if self
            .registered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Interceptors already registered, policy updated");
            return Ok(());
        }

        let registered = transport.register_once(
            Arc::new(HeaderMergeInterceptor::new(self.clone())),
            Arc::new(ExceptionInterceptor::new(self.clone())),
        );
        if registered {
            debug!("Registered header-merge and exception interceptors");
        } else {
            self.registered.store(false, Ordering::SeqCst);
            warn!("Transport already carries interceptors from another store, not registering");
        }

        Ok(())
    }
}
