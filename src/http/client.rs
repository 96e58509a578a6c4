//! HTTP transport with an interceptor chain.

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use std::sync::{Arc, PoisonError, RwLock};

use super::error::TransportError;
use super::interceptor::{ErrorInterceptor, RequestInterceptor};
use super::request::{HttpRequest, RequestBody};
use super::response::{RawResponse, TransportOutcome};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// The underlying HTTP client the verb functions delegate to.
///
/// Failures never escape as errors: they are handed to every registered
/// [`ErrorInterceptor`] and reported as [`TransportOutcome::Failed`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and reads its body.
    async fn dispatch(&self, request: HttpRequest) -> TransportOutcome;

    /// Reports a failure that happened before the request could be sent.
    fn reject(&self, error: TransportError) -> TransportOutcome;

    /// Registers the pair unless a pair was already registered through this
    /// method. Returns whether it did.
    fn register_once(
        &self,
        request: Arc<dyn RequestInterceptor>,
        error: Arc<dyn ErrorInterceptor>,
    ) -> bool;
}

#[derive(Default)]
struct Interceptors {
    request: Vec<Arc<dyn RequestInterceptor>>,
    error: Vec<Arc<dyn ErrorInterceptor>>,
    registered: bool,
}

/// [`Transport`] backed by a reqwest [`Client`].
///
/// Each `HttpClient` owns its interceptor chain. Build one per [`Client`](crate::Client)
/// from a shared reqwest client to reuse connections.
pub struct HttpClient {
    client: Client,
    interceptors: Arc<RwLock<Interceptors>>,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            interceptors: Arc::new(RwLock::new(Interceptors::default())),
        }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn request_interceptor_count(&self) -> usize {
        self.read_interceptors(|i| i.request.len())
    }

    pub fn error_interceptor_count(&self) -> usize {
        self.read_interceptors(|i| i.error.len())
    }

    pub fn add_request_interceptor(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.write_interceptors(|i| i.request.push(interceptor));
    }

    pub fn add_error_interceptor(&self, interceptor: Arc<dyn ErrorInterceptor>) {
        self.write_interceptors(|i| i.error.push(interceptor));
    }

    fn write_interceptors<R>(&self, f: impl FnOnce(&mut Interceptors) -> R) -> R {
        let mut guard = self
            .interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn read_interceptors<R>(&self, f: impl FnOnce(&Interceptors) -> R) -> R {
        let guard = self
            .interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Builds, intercepts, sends and reads a single request.
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        let url = request.url.clone();
        let mut request = self.build(request)?;

        // Cloned so no lock is held across the await below.
        let interceptors = self.read_interceptors(|i| i.request.clone());
        for interceptor in &interceptors {
            interceptor.intercept(request.headers_mut());
        }

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| TransportError::from_reqwest(&url, &e))?;

        let response = response
            .error_for_status()
            .map_err(|e| TransportError::from_reqwest(&url, &e))?;

        RawResponse::read(response).await
    }

    fn build(&self, request: HttpRequest) -> Result<reqwest::Request, TransportError> {
        let HttpRequest {
            method,
            url,
            mut headers,
            params,
            query,
            body,
            timeout,
        } = request;

        match &body {
            RequestBody::UrlEncoded(_) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));
            }
            // The boundary has to come from the form itself.
            RequestBody::Multipart(_) => {
                headers.remove(CONTENT_TYPE);
            }
            RequestBody::Empty | RequestBody::Json(_) => {}
        }

        let target = if params.is_empty() {
            url.clone()
        } else {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{}{}{}", url, separator, params)
        };

        let mut builder = self.client.request(method, &target).headers(headers);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::UrlEncoded(encoded) => builder.body(encoded),
            RequestBody::Multipart(form) => {
                let form = form
                    .into_reqwest()
                    .map_err(|e| TransportError::from_reqwest(&url, &e))?;
                builder.multipart(form)
            }
        };

        builder
            .build()
            .map_err(|e| TransportError::from_reqwest(&url, &e))
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[tracing::instrument(skip(self, request))]
    async fn dispatch(&self, request: HttpRequest) -> TransportOutcome {
        debug!("{} {}...", request.method, request.url);

        match self.execute(request).await {
            Ok(response) => {
                debug!("{} answered {}", response.url, response.status);
                TransportOutcome::Delivered(response)
            }
            Err(e) => self.reject(e),
        }
    }

    fn reject(&self, error: TransportError) -> TransportOutcome {
        error!("Request failed: {}", error);

        let interceptors = self.read_interceptors(|i| i.error.clone());
        if interceptors.is_empty() {
            warn!("No error interceptor registered, failure absorbed: {}", error);
        }
        for interceptor in &interceptors {
            interceptor.on_error(&error);
        }

        TransportOutcome::Failed(error)
    }

    fn register_once(
        &self,
        request: Arc<dyn RequestInterceptor>,
        error: Arc<dyn ErrorInterceptor>,
    ) -> bool {
        self.write_interceptors(|i| {
            if i.registered {
                return false;
            }
            i.registered = true;
            i.request.push(request);
            i.error.push(error);
            true
        })
    }
}
