//! Process-wide facade: one shared [`Client`], configured once at startup
//! and used everywhere through free functions.
//!
//! ```no_run
//! use envelope_http::{global, PolicyConfig, Classified};
//!
//! # async fn run() -> anyhow::Result<()> {
//! global::initialize(PolicyConfig::new().expected_codes([10001]))?;
//!
//! let user: Classified<serde_json::Value> = global::get("https://api.example.com/user", &(), None).await;
//! # Ok(())
//! # }
//! ```

use anyhow::{Result, anyhow};
use log::{debug, error};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::classify::{Classified, Unhandled};
use crate::client::Client;
use crate::config::PolicyConfig;
use crate::http::{Form, RequestConfig};

static CLIENT: OnceLock<Client> = OnceLock::new();

/// Installs a custom client (base URL, timeout, ...) as the shared one.
/// Fails if the shared client already exists.
pub fn install(client: Client) -> Result<()> {
    CLIENT
        .set(client)
        .map_err(|_| anyhow!("The shared client is already installed"))
}

/// The shared client, created with default settings on first use.
pub fn client() -> Result<&'static Client> {
    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }

    let client = Client::builder().build()?;
    // Losing the race drops the client built here; the winner has the same
    // default settings and no policy yet.
    if CLIENT.set(client).is_err() {
        debug!("Shared client created concurrently, keeping the first one");
    }
    CLIENT
        .get()
        .ok_or_else(|| anyhow!("The shared client could not be created"))
}

/// Configures the shared client. See [`Client::initialize`].
pub fn initialize(config: PolicyConfig) -> Result<()> {
    client()?.initialize(config)
}

/// The outcome of a call made when no shared client could be created.
fn unavailable<R>(error: anyhow::Error) -> Classified<R> {
    error!(
        "No shared client available, returning Unhandled::ClientUnavailable: {:#}",
        error
    );
    Classified::Unhandled(Unhandled::ClientUnavailable(format!("{:#}", error)))
}

pub async fn get<R, Q>(url: &str, query: &Q, config: Option<RequestConfig>) -> Classified<R>
where
    R: DeserializeOwned,
    Q: Serialize + ?Sized,
{
    match client() {
        Ok(client) => client.get(url, query, config).await,
        Err(e) => unavailable(e),
    }
}

pub async fn delete<R, Q>(url: &str, query: &Q, config: Option<RequestConfig>) -> Classified<R>
where
    R: DeserializeOwned,
    Q: Serialize + ?Sized,
{
    match client() {
        Ok(client) => client.delete(url, query, config).await,
        Err(e) => unavailable(e),
    }
}

pub async fn post<R, B>(url: &str, body: &B, config: Option<RequestConfig>) -> Classified<R>
where
    R: DeserializeOwned,
    B: Serialize + ?Sized,
{
    match client() {
        Ok(client) => client.post(url, body, config).await,
        Err(e) => unavailable(e),
    }
}

pub async fn put<R, B>(url: &str, body: &B, config: Option<RequestConfig>) -> Classified<R>
where
    R: DeserializeOwned,
    B: Serialize + ?Sized,
{
    match client() {
        Ok(client) => client.put(url, body, config).await,
        Err(e) => unavailable(e),
    }
}

pub async fn form_submit<R>(url: &str, form: Form, config: Option<RequestConfig>) -> Classified<R>
where
    R: DeserializeOwned,
{
    match client() {
        Ok(client) => client.form_submit(url, form, config).await,
        Err(e) => unavailable(e),
    }
}

pub async fn form_url_encoded_submit<R, F>(
    url: &str,
    fields: &F,
    config: Option<RequestConfig>,
) -> Classified<R>
where
    R: DeserializeOwned,
    F: Serialize + ?Sized,
{
    match client() {
        Ok(client) => client.form_url_encoded_submit(url, fields, config).await,
        Err(e) => unavailable(e),
    }
}
