//! Request descriptions handed to a [`Transport`](super::Transport).

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// The body of an outgoing request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Serialized as `application/json`
    Json(Value),
    /// An encoded `application/x-www-form-urlencoded` body
    UrlEncoded(String),
    /// Serialized as `multipart/form-data`
    Multipart(Form),
}

/// A fully described request, ready to be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    /// Encoded query string, placed before `query`.
    pub params: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            params: String::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }
}

/// A single multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Text(String),
    File {
        bytes: Vec<u8>,
        file_name: Option<String>,
        mime: Option<String>,
    },
}

/// Multipart form data, built field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Form {
    fields: Vec<(String, FormField)>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field to the form.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), FormField::Text(value.into())));
        self
    }

    /// Add a file field from bytes.
    pub fn file(
        mut self,
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        file_name: Option<&str>,
        mime: Option<&str>,
    ) -> Self {
        self.fields.push((
            name.into(),
            FormField::File {
                bytes: bytes.into(),
                file_name: file_name.map(str::to_string),
                mime: mime.map(str::to_string),
            },
        ));
        self
    }

    pub fn fields(&self) -> &[(String, FormField)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert to a reqwest form. Fails on an unparsable MIME type.
    pub(crate) fn into_reqwest(self) -> reqwest::Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for (name, field) in self.fields {
            form = match field {
                FormField::Text(value) => form.text(name, value),
                FormField::File {
                    bytes,
                    file_name,
                    mime,
                } => {
                    let mut part = reqwest::multipart::Part::bytes(bytes);
                    if let Some(file_name) = file_name {
                        part = part.file_name(file_name);
                    }
                    if let Some(mime) = mime {
                        part = part.mime_str(&mime)?;
                    }
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

impl<K, V> FromIterator<(K, V)> for Form
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Form::new(), |form, (k, v)| form.text(k, v))
    }
}

/// Per-call request options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestConfig {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validates the per-call headers into a [`HeaderMap`].
    pub(crate) fn header_map(&self) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("invalid header name '{}': {}", name, e))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("invalid value for header '{}': {}", name, e))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Encodes parameters as a query string with bracket notation for nesting
/// (`a[b]=c`, `list[0]=x`), keeping field and map order. `None` fields are
/// skipped.
///
/// `params` must serialize as a struct or map. Zero-sized parameters such as
/// `()` encode to the empty string.
pub fn encode_params<P: Serialize + ?Sized>(params: &P) -> Result<String, String> {
    if std::mem::size_of_val(params) == 0 {
        return Ok(String::new());
    }
    serde_qs::to_string(&params).map_err(|e| format!("cannot encode parameters: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_encode_params_keeps_declaration_order() {
        #[derive(Serialize)]
        struct Query {
            zeta: u32,
            alpha: bool,
            name: Option<String>,
        }

        let encoded = encode_params(&Query {
            zeta: 7,
            alpha: true,
            name: None,
        })
        .unwrap();
        assert_eq!(encoded, "zeta=7&alpha=true");
    }

    #[test]
    fn test_encode_params_nested() {
        #[derive(Serialize)]
        struct Filter {
            owner: String,
        }

        #[derive(Serialize)]
        struct Query {
            filter: Filter,
            tags: Vec<String>,
        }

        let encoded = encode_params(&Query {
            filter: Filter {
                owner: "me".to_string(),
            },
            tags: vec!["a".to_string(), "b".to_string()],
        })
        .unwrap();

        assert_eq!(encoded, "filter[owner]=me&tags[0]=a&tags[1]=b");
    }

    #[test]
    fn test_encode_params_map() {
        let mut params = BTreeMap::new();
        params.insert("page", "1");
        params.insert("per_page", "10");

        assert_eq!(encode_params(&params).unwrap(), "page=1&per_page=10");
    }

    #[test]
    fn test_encode_params_unit_is_empty() {
        assert_eq!(encode_params(&()).unwrap(), "");
    }

    #[test]
    fn test_encode_params_reports_serializer_errors() {
        struct Broken(u8);

        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("broken"))
            }
        }

        let err = encode_params(&Broken(0)).unwrap_err();
        assert!(err.contains("cannot encode parameters"));
    }

    #[test]
    fn test_form_from_iter() {
        let form: Form = [("name", "x"), ("city", "y")].into_iter().collect();
        assert_eq!(
            form.fields(),
            &[
                ("name".to_string(), FormField::Text("x".to_string())),
                ("city".to_string(), FormField::Text("y".to_string())),
            ]
        );
    }

    #[test]
    fn test_form_into_reqwest_rejects_bad_mime() {
        let form = Form::new().file("upload", b"data".to_vec(), Some("a.txt"), Some("not a mime"));
        assert!(form.into_reqwest().is_err());
    }

    #[test]
    fn test_request_config_header_map() {
        let config = RequestConfig::new()
            .header("X-Trace", "abc")
            .query("lang", "en")
            .timeout(Duration::from_secs(2));

        let headers = config.header_map().unwrap();
        assert_eq!(headers.get("x-trace").unwrap(), "abc");
        assert_eq!(config.query, pairs(&[("lang", "en")]));
        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_request_config_invalid_header() {
        let config = RequestConfig::new().header("bad header", "v");
        let err = config.header_map().unwrap_err();
        assert!(err.contains("invalid header name"));
    }
}
