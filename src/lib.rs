//! Response normalization for HTTP APIs that wrap every payload in a
//! `{code, data, message}` envelope.
//!
//! Each call ends in one of three shapes:
//!
//! - [`Classified::Success`]: `code` is a configured success code, the caller gets `data`.
//! - [`Classified::Expected`]: `code` is a declared business error, the caller gets `data`
//!   together with `resultMsg` and the code.
//! - [`Classified::Unhandled`]: anything else. Transport failures and undeclared codes are
//!   reported once to the configured [`ExceptionHandler`]; a missing envelope is dropped
//!   silently.
//!
//! ```no_run
//! use envelope_http::{Classified, Client, PolicyConfig, handler_fn};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = Client::builder().base_url("https://api.example.com").build()?;
//! client.initialize(
//!     PolicyConfig::new()
//!         .success_code(200)
//!         .expected_codes([10001])
//!         .exception_handler(handler_fn(|msg, _| eprintln!("{}", msg))),
//! )?;
//!
//! match client.get::<serde_json::Value, _>("/user", &(), None).await {
//!     Classified::Success(user) => println!("{}", user),
//!     Classified::Expected(e) => println!("business error: {:?}", e.result_msg),
//!     Classified::Unhandled(_) => {}
//! }
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod client;
pub mod config;
pub mod envelope;
pub mod global;
pub mod http;

pub use classify::{Classified, ClassifiedError, ExpectedError, Unhandled, classify};
pub use client::{Client, ClientBuilder};
pub use config::{
    ConfigStore, ExceptionContext, ExceptionHandler, HeaderPrecedence, LogOnlyHandler, Policy,
    PolicyConfig, SuccessCode, handler_fn,
};
pub use envelope::ResponseEnvelope;
pub use http::{Form, RawResponse, RequestConfig, TransportError, TransportErrorKind};
