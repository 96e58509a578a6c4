//! Verb wrappers: issue the transport call, then classify its outcome.

use anyhow::{Context, Result};
use log::debug;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::classify::{Classified, classify};
use crate::config::{ConfigStore, Policy, PolicyConfig};
use crate::http::{
    Form, HttpClient, HttpRequest, RequestBody, RequestConfig, Transport, TransportError,
    encode_params,
};

const DEFAULT_USER_AGENT: &str = concat!("envelope-http/", env!("CARGO_PKG_VERSION"));

/// Builds a [`Client`] backed by reqwest.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Prefix for relative request URLs.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Timeout applied to every request unless overridden per call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build(self) -> Result<Client> {
        let mut builder = reqwest::Client::builder().user_agent(
            self.user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        );
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        let mut client = Client::with_transport(HttpClient::new(client));
        client.base_url = self.base_url;
        Ok(client)
    }
}

/// An envelope-aware HTTP client: one configuration store, one transport.
pub struct Client<T: Transport = HttpClient> {
    transport: T,
    store: Arc<ConfigStore>,
    base_url: Option<String>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }
}

impl<T: Transport> Client<T> {
    /// Wraps an existing transport with a fresh, uninitialized store.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            store: Arc::new(ConfigStore::new()),
            base_url: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// A snapshot of the live policy.
    pub fn policy(&self) -> Policy {
        self.store.policy()
    }

    /// Installs `config` as the live policy. Interceptors are registered on
    /// the first successful call only.
    pub fn initialize(&self, config: PolicyConfig) -> Result<()> {
        self.store.initialize(config, &self.transport)
    }

    /// GET with `query` in the query string. Pass `&()` for no parameters.
    #[tracing::instrument(skip(self, query, config))]
    pub async fn get<R, Q>(&self, url: &str, query: &Q, config: Option<RequestConfig>) -> Classified<R>
    where
        R: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.with_query(Method::GET, url, query, config).await
    }

    /// DELETE with `query` in the query string. Pass `&()` for no parameters.
    #[tracing::instrument(skip(self, query, config))]
    pub async fn delete<R, Q>(&self, url: &str, query: &Q, config: Option<RequestConfig>) -> Classified<R>
    where
        R: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.with_query(Method::DELETE, url, query, config).await
    }

    /// POST with a JSON body.
    #[tracing::instrument(skip(self, body, config))]
    pub async fn post<R, B>(&self, url: &str, body: &B, config: Option<RequestConfig>) -> Classified<R>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.with_json(Method::POST, url, body, config).await
    }

    /// PUT with a JSON body.
    #[tracing::instrument(skip(self, body, config))]
    pub async fn put<R, B>(&self, url: &str, body: &B, config: Option<RequestConfig>) -> Classified<R>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.with_json(Method::PUT, url, body, config).await
    }

    /// POST a `multipart/form-data` body.
    #[tracing::instrument(skip(self, form, config))]
    pub async fn form_submit<R>(&self, url: &str, form: Form, config: Option<RequestConfig>) -> Classified<R>
    where
        R: DeserializeOwned,
    {
        self.send(Method::POST, url, String::new(), RequestBody::Multipart(form), config)
            .await
    }

    /// POST an `application/x-www-form-urlencoded` body. Nested maps and
    /// lists use bracket notation (`a[b]=c`, `list[0]=x`).
    #[tracing::instrument(skip(self, fields, config))]
    pub async fn form_url_encoded_submit<R, F>(
        &self,
        url: &str,
        fields: &F,
        config: Option<RequestConfig>,
    ) -> Classified<R>
    where
        R: DeserializeOwned,
        F: Serialize + ?Sized,
    {
        match encode_params(fields) {
            Ok(encoded) => {
                self.send(Method::POST, url, String::new(), RequestBody::UrlEncoded(encoded), config)
                    .await
            }
            Err(e) => self.fail(url, e),
        }
    }

    async fn with_query<R, Q>(
        &self,
        method: Method,
        url: &str,
        query: &Q,
        config: Option<RequestConfig>,
    ) -> Classified<R>
    where
        R: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        match encode_params(query) {
            Ok(params) => self.send(method, url, params, RequestBody::Empty, config).await,
            Err(e) => self.fail(url, e),
        }
    }

    async fn with_json<R, B>(
        &self,
        method: Method,
        url: &str,
        body: &B,
        config: Option<RequestConfig>,
    ) -> Classified<R>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        match serde_json::to_value(body) {
            Ok(value) => {
                self.send(method, url, String::new(), RequestBody::Json(value), config)
                    .await
            }
            Err(e) => self.fail(url, e.to_string()),
        }
    }

    /// `params` is an encoded query string; per-call query pairs follow it.
    async fn send<R: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        params: String,
        body: RequestBody,
        config: Option<RequestConfig>,
    ) -> Classified<R> {
        let config = config.unwrap_or_default();
        let headers = match config.header_map() {
            Ok(headers) => headers,
            Err(e) => return self.fail(url, e),
        };

        let mut request = HttpRequest::new(method, self.resolve_url(url));
        request.headers = headers;
        request.params = params;
        request.query = config.query;
        request.timeout = config.timeout;
        request.body = body;

        let outcome = self.transport.dispatch(request).await;
        classify(outcome, &self.store.policy())
    }

    /// Routes a failure to build the request through the error interceptors.
    fn fail<R: DeserializeOwned>(&self, url: &str, message: String) -> Classified<R> {
        debug!("Could not encode request to {}: {}", url, message);
        let outcome = self
            .transport
            .reject(TransportError::encode(self.resolve_url(url), message));
        classify(outcome, &self.store.policy())
    }

    fn resolve_url(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.starts_with("http://") && !url.starts_with("https://") => {
                format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    url.trim_start_matches('/')
                )
            }
            _ => url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Unhandled;
    use crate::config::{ExceptionContext, MockExceptionHandler};
    use crate::http::{MockTransport, RawResponse, TransportErrorKind, TransportOutcome};
    use reqwest::StatusCode;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Named {
        name: String,
    }

    #[derive(Serialize)]
    struct Page {
        page: u32,
        size: u32,
    }

    fn delivered(body: serde_json::Value) -> TransportOutcome {
        TransportOutcome::Delivered(RawResponse::new(
            StatusCode::OK,
            "http://localhost/api",
            Some(body),
        ))
    }

    fn mock_transport() -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_register_once().times(1).return_const(true);
        transport
    }

    #[tokio::test]
    async fn test_get_places_params_in_query() {
        let mut transport = mock_transport();
        transport
            .expect_dispatch()
            .withf(|req| {
                req.method == Method::GET
                    && req.url == "http://localhost/api/users"
                    && req.params == "page=1&size=20"
                    && req.query == vec![("lang".to_string(), "en".to_string())]
                    && req.body == RequestBody::Empty
            })
            .times(1)
            .returning(|_| delivered(json!({"code": 200, "data": {"name": "x"}})));

        let client = Client::with_transport(transport);
        client.initialize(PolicyConfig::new()).unwrap();

        let result: Classified<Named> = client
            .get(
                "http://localhost/api/users",
                &Page { page: 1, size: 20 },
                Some(RequestConfig::new().query("lang", "en")),
            )
            .await;

        assert_eq!(
            result,
            Classified::Success(Named {
                name: "x".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_delete_places_params_in_query() {
        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .withf(|req| {
                req.method == Method::DELETE
                    && req.params == "id=7"
                    && req.query.is_empty()
                    && req.body == RequestBody::Empty
            })
            .times(1)
            .returning(|_| delivered(json!({"code": 200})));

        let client = Client::with_transport(transport);
        let result: Classified<()> = client
            .delete("http://localhost/api/users", &json!({"id": 7}), None)
            .await;

        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_post_and_put_send_json_body() {
        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .withf(|req| {
                req.method == Method::POST && req.body == RequestBody::Json(json!({"name": "x"}))
            })
            .times(1)
            .returning(|_| delivered(json!({"code": 200, "data": {"name": "x"}})));
        transport
            .expect_dispatch()
            .withf(|req| {
                req.method == Method::PUT && req.body == RequestBody::Json(json!({"name": "y"}))
            })
            .times(1)
            .returning(|_| delivered(json!({"code": 200, "data": {"name": "y"}})));

        let client = Client::with_transport(transport);

        let posted: Classified<Named> = client
            .post("http://localhost/api", &json!({"name": "x"}), None)
            .await;
        let put: Classified<Named> = client
            .put("http://localhost/api", &json!({"name": "y"}), None)
            .await;

        assert_eq!(posted.success().unwrap().name, "x");
        assert_eq!(put.success().unwrap().name, "y");
    }

    #[tokio::test]
    async fn test_form_submit_sends_multipart() {
        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .withf(|req| {
                req.method == Method::POST
                    && matches!(&req.body, RequestBody::Multipart(form) if form.fields().len() == 2)
            })
            .times(1)
            .returning(|_| delivered(json!({"code": 200})));

        let client = Client::with_transport(transport);
        let form = Form::new()
            .text("title", "report")
            .file("file", b"abc".to_vec(), Some("a.txt"), None);

        let result: Classified<()> = client.form_submit("http://localhost/upload", form, None).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_form_url_encoded_submit() {
        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .withf(|req| {
                req.body == RequestBody::UrlEncoded("user[name]=x&user[tags][0]=a".to_string())
                    && req.params.is_empty()
            })
            .times(1)
            .returning(|_| delivered(json!({"code": 200})));

        let client = Client::with_transport(transport);
        let result: Classified<()> = client
            .form_url_encoded_submit(
                "http://localhost/login",
                &json!({"user": {"name": "x", "tags": ["a"]}}),
                None,
            )
            .await;

        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_per_call_headers_and_timeout() {
        let mut transport = MockTransport::new();
        transport
            .expect_dispatch()
            .withf(|req| {
                req.headers.get("x-trace").map(|v| v == "abc") == Some(true)
                    && req.timeout == Some(Duration::from_secs(3))
            })
            .times(1)
            .returning(|_| delivered(json!({"code": 200})));

        let client = Client::with_transport(transport);
        let config = RequestConfig::new()
            .header("X-Trace", "abc")
            .timeout(Duration::from_secs(3));

        let result: Classified<()> = client.get("http://localhost/api", &(), Some(config)).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_invalid_per_call_header_is_rejected() {
        let mut transport = mock_transport();
        transport.expect_dispatch().times(0);
        transport
            .expect_reject()
            .withf(|e| e.kind == TransportErrorKind::Request)
            .times(1)
            .returning(TransportOutcome::Failed);

        let client = Client::with_transport(transport);
        client.initialize(PolicyConfig::new()).unwrap();

        let result: Classified<()> = client
            .get(
                "http://localhost/api",
                &(),
                Some(RequestConfig::new().header("bad header", "v")),
            )
            .await;

        assert_eq!(result, Classified::Unhandled(Unhandled::TransportFailed));
    }

    struct Unencodable(u8);

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not encodable"))
        }
    }

    #[tokio::test]
    async fn test_unencodable_query_is_rejected() {
        let mut transport = MockTransport::new();
        transport.expect_dispatch().times(0);
        transport
            .expect_reject()
            .times(1)
            .returning(TransportOutcome::Failed);

        let client = Client::with_transport(transport);
        let result: Classified<()> = client.get("http://localhost/api", &Unencodable(0), None).await;

        assert_eq!(result, Classified::Unhandled(Unhandled::TransportFailed));
    }

    #[tokio::test]
    async fn test_unexpected_code_reaches_configured_handler() {
        let mut handler = MockExceptionHandler::new();
        handler
            .expect_on_exception()
            .withf(|msg, ctx| msg == "forbidden" && matches!(ctx, ExceptionContext::Response(_)))
            .times(1)
            .return_const(());

        let mut transport = mock_transport();
        transport
            .expect_dispatch()
            .times(1)
            .returning(|_| delivered(json!({"code": 400, "message": "forbidden"})));

        let client = Client::with_transport(transport);
        client
            .initialize(
                PolicyConfig::new()
                    .success_code(200)
                    .exception_handler(Arc::new(handler)),
            )
            .unwrap();

        let result: Classified<Named> = client.get("http://localhost/api", &(), None).await;
        assert!(result.is_unhandled());
    }

    #[tokio::test]
    async fn test_initialize_twice_registers_once() {
        let client = Client::with_transport(mock_transport());

        client
            .initialize(PolicyConfig::new().expected_codes([10001]))
            .unwrap();
        client
            .initialize(PolicyConfig::new().expected_codes([10002]))
            .unwrap();

        assert!(client.store().is_initialized());
        assert_eq!(client.policy().expected_codes, vec![10002]);
    }

    #[test]
    fn test_resolve_url() {
        let mut client = Client::with_transport(MockTransport::new());
        assert_eq!(client.resolve_url("/api/x"), "/api/x");

        client.base_url = Some("http://localhost:8080/".to_string());
        assert_eq!(client.resolve_url("/api/x"), "http://localhost:8080/api/x");
        assert_eq!(client.resolve_url("api/x"), "http://localhost:8080/api/x");
        assert_eq!(
            client.resolve_url("https://other.example/y"),
            "https://other.example/y"
        );
    }

    #[test]
    fn test_builder_builds_uninitialized_client() {
        let client = Client::builder()
            .base_url("http://localhost:1")
            .timeout(Duration::from_secs(5))
            .user_agent("test-agent")
            .build()
            .unwrap();

        assert!(!client.store().is_initialized());
        assert_eq!(client.transport().request_interceptor_count(), 0);
        assert_eq!(client.resolve_url("x"), "http://localhost:1/x");
    }
}
