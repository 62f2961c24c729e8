//! Request construction.
//!
//! This module turns a logical call (verb, endpoint path, parameters) into a
//! [`PreparedRequest`]: a fully formed request with URL, headers, encoded
//! body, and timeout, ready for a [`Transport`](crate::clients::Transport).
//!
//! # Encoding Rules
//!
//! - Query strings are `?k=v&k=v` with keys in sorted order and both keys
//!   and values percent-encoded. An empty mapping adds nothing to the URL.
//! - JSON bodies are objects serialized with sorted keys, so equal inputs
//!   always produce byte-identical bodies.
//! - Form bodies are the query string without the leading `?`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;

use crate::clients::errors::InvalidRequestError;
use crate::config::ServiceConfig;

/// Header name for the content type.
pub const CONTENT_TYPE: &str = "Content-Type";

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const BOUNDARY_LEN: usize = 32;

/// HTTP methods used by the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    /// HTTP GET method for retrieving resources.
    Get,
    /// HTTP POST method for creating resources and uploads.
    Post,
    /// HTTP PUT method for updating resources.
    Put,
    /// HTTP DELETE method for removing resources.
    Delete,
}

impl HttpMethod {
    /// Returns the method as it appears on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully formed request.
///
/// `headers` is the request's own copy of the client's shared headers with
/// any request-specific values applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedRequest {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The absolute URL, query string included.
    pub url: String,
    /// Headers to send.
    pub headers: HashMap<String, String>,
    /// The encoded body, if any.
    pub body: Option<Vec<u8>>,
    /// Transport-level deadline for this request.
    pub timeout: Duration,
    /// Whether the response body should be decoded as JSON.
    pub decode: bool,
}

impl PreparedRequest {
    /// Returns the value of a header, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Builds [`PreparedRequest`]s against one configured endpoint.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use api_service::ServiceConfig;
/// use api_service::clients::{HttpMethod, RequestBuilder};
///
/// let builder = RequestBuilder::new(&ServiceConfig::default());
/// let query = HashMap::from([("tag".to_string(), "sea side".to_string())]);
///
/// let request = builder.get("photos", &query, HashMap::new());
/// assert_eq!(request.method, HttpMethod::Get);
/// assert_eq!(request.url, "https://localhost:8080/photos?tag=sea%20side");
/// assert!(request.body.is_none());
/// ```
#[derive(Clone, Debug)]
pub struct RequestBuilder {
    endpoint_url: String,
    timeout: Duration,
}

impl RequestBuilder {
    /// Creates a builder for the endpoint described by `config`.
    #[must_use]
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            endpoint_url: config.endpoint_url(),
            timeout: config.timeout(),
        }
    }

    /// Returns `{scheme}://{host}{base_path}/{path}{query}`.
    #[must_use]
    pub fn url(&self, path: &str, query: Option<&HashMap<String, String>>) -> String {
        let query = query.map(encode_query).unwrap_or_default();
        format!(
            "{}/{}{}",
            self.endpoint_url,
            path.trim_start_matches('/'),
            query
        )
    }

    fn prepare(
        &self,
        method: HttpMethod,
        url: String,
        headers: HashMap<String, String>,
    ) -> PreparedRequest {
        PreparedRequest {
            method,
            url,
            headers,
            body: None,
            timeout: self.timeout,
            decode: true,
        }
    }

    /// Builds a GET request with `query` on the URL and no body.
    #[must_use]
    pub fn get(
        &self,
        path: &str,
        query: &HashMap<String, String>,
        headers: HashMap<String, String>,
    ) -> PreparedRequest {
        self.prepare(HttpMethod::Get, self.url(path, Some(query)), headers)
    }

    /// Builds a POST request.
    ///
    /// With a `body`, it is sent as JSON and any `query` goes on the URL.
    /// Without one, `query` becomes a form-encoded body.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError::InvalidBody`] if `body` is not a JSON
    /// object.
    pub fn post(
        &self,
        path: &str,
        query: Option<&HashMap<String, String>>,
        body: Option<&Value>,
        mut headers: HashMap<String, String>,
    ) -> Result<PreparedRequest, InvalidRequestError> {
        if let Some(body) = body {
            let encoded = encode_json_body(body)?;
            set_content_type(&mut headers, JSON_CONTENT_TYPE);

            let mut request = self.prepare(HttpMethod::Post, self.url(path, query), headers);
            request.body = Some(encoded);
            return Ok(request);
        }

        let mut request = self.prepare(HttpMethod::Post, self.url(path, None), headers);
        if let Some(query) = query {
            set_content_type(&mut request.headers, FORM_CONTENT_TYPE);
            request.body = Some(encode_form(query).into_bytes());
        }
        Ok(request)
    }

    /// Builds a PUT request with `query` on the URL and an optional JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError::InvalidBody`] if `body` is not a JSON
    /// object.
    pub fn put(
        &self,
        path: &str,
        query: Option<&HashMap<String, String>>,
        body: Option<&Value>,
        mut headers: HashMap<String, String>,
    ) -> Result<PreparedRequest, InvalidRequestError> {
        let encoded = body.map(encode_json_body).transpose()?;
        if encoded.is_some() {
            set_content_type(&mut headers, JSON_CONTENT_TYPE);
        }

        let mut request = self.prepare(HttpMethod::Put, self.url(path, query), headers);
        request.body = encoded;
        Ok(request)
    }

    /// Builds a DELETE request. Its response is never decoded.
    #[must_use]
    pub fn delete(
        &self,
        path: &str,
        query: Option<&HashMap<String, String>>,
        headers: HashMap<String, String>,
    ) -> PreparedRequest {
        let mut request = self.prepare(HttpMethod::Delete, self.url(path, query), headers);
        request.decode = false;
        request
    }

    /// Builds a multipart POST uploading `file` as the single part `file`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError`] if `file` does not exist, is not a
    /// regular file, or cannot be read.
    pub async fn upload(
        &self,
        path: &str,
        file: &Path,
        mut headers: HashMap<String, String>,
    ) -> Result<PreparedRequest, InvalidRequestError> {
        let metadata = tokio::fs::metadata(file).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InvalidRequestError::FileNotFound {
                    path: file.to_path_buf(),
                }
            } else {
                InvalidRequestError::UnreadableFile {
                    path: file.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        })?;
        if !metadata.is_file() {
            return Err(InvalidRequestError::NotAFile {
                path: file.to_path_buf(),
            });
        }

        let contents =
            tokio::fs::read(file)
                .await
                .map_err(|e| InvalidRequestError::UnreadableFile {
                    path: file.to_path_buf(),
                    reason: e.to_string(),
                })?;

        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let boundary = generate_boundary();

        set_content_type(
            &mut headers,
            &format!("multipart/form-data; boundary={boundary}"),
        );

        let mut request = self.prepare(HttpMethod::Post, self.url(path, None), headers);
        request.body = Some(encode_multipart(&boundary, &file_name, &contents));
        Ok(request)
    }
}

/// Replaces any existing content type header, whatever its case.
fn set_content_type(headers: &mut HashMap<String, String>, value: &str) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(CONTENT_TYPE));
    headers.insert(CONTENT_TYPE.to_string(), value.to_string());
}

fn encode_pairs(params: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();

    keys.into_iter()
        .map(|key| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&params[key])
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Encodes `params` as a query string, `?` included. Empty input yields an
/// empty string.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use api_service::clients::encode_query;
///
/// let params = HashMap::from([
///     ("b".to_string(), "2".to_string()),
///     ("a".to_string(), "x&y".to_string()),
/// ]);
/// assert_eq!(encode_query(&params), "?a=x%26y&b=2");
/// assert_eq!(encode_query(&HashMap::new()), "");
/// ```
#[must_use]
pub fn encode_query(params: &HashMap<String, String>) -> String {
    if params.is_empty() {
        return String::new();
    }
    format!("?{}", encode_pairs(params))
}

/// Encodes `params` as an `application/x-www-form-urlencoded` body.
#[must_use]
pub fn encode_form(params: &HashMap<String, String>) -> String {
    encode_pairs(params)
}

/// Serializes a JSON object with its keys sorted at every level.
///
/// `serde_json` is built without `preserve_order`, so object maps are
/// ordered by key and serialize sorted.
///
/// # Errors
///
/// Returns [`InvalidRequestError::InvalidBody`] if `body` is not an object.
pub fn encode_json_body(body: &Value) -> Result<Vec<u8>, InvalidRequestError> {
    if !body.is_object() {
        return Err(InvalidRequestError::InvalidBody {
            reason: format!("expected an object, got {}", json_kind(body)),
        });
    }

    serde_json::to_vec(body).map_err(|e| InvalidRequestError::InvalidBody {
        reason: e.to_string(),
    })
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn generate_boundary() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LEN)
        .map(char::from)
        .collect()
}

/// Builds the multipart body for a single `file` part.
#[must_use]
pub fn encode_multipart(boundary: &str, file_name: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(contents.len() + 256);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", detect_mime(file_name)).as_bytes());
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Maps a file name to a MIME type by its extension.
///
/// # Example
///
/// ```rust
/// use api_service::clients::detect_mime;
///
/// assert_eq!(detect_mime("IMG_0001.JPG"), "image/jpeg");
/// assert_eq!(detect_mime("archive.tar.gz"), "application/octet-stream");
/// ```
#[must_use]
pub fn detect_mime(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" => "image/jpeg",
        "png" => "image/png",
        "m4a" => "audio/mp4",
        "m4v" | "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "tsv" | "tab" => "text/tab-separated-values",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BasePath, ServiceHost};
    use serde_json::json;

    fn builder() -> RequestBuilder {
        let config = ServiceConfig::builder()
            .host(ServiceHost::new("api.example.com").unwrap())
            .base_path(BasePath::new("/v1").unwrap())
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap();
        RequestBuilder::new(&config)
    }

    fn shared_headers() -> HashMap<String, String> {
        HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
        ])
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_get_appends_sorted_encoded_query() {
        let request = builder().get(
            "photos/search",
            &params(&[("text", "blue sky"), ("api_key", "k/1")]),
            shared_headers(),
        );

        assert_eq!(
            request.url,
            "https://api.example.com/v1/photos/search?api_key=k%2F1&text=blue%20sky"
        );
        assert!(request.body.is_none());
        assert!(request.decode);
        assert_eq!(request.timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_empty_query_adds_no_question_mark() {
        let request = builder().get("status", &HashMap::new(), HashMap::new());
        assert_eq!(request.url, "https://api.example.com/v1/status");
    }

    #[test]
    fn test_post_json_body_has_sorted_keys() {
        let body = json!({"zeta": 1, "alpha": {"y": true, "x": null}, "mid": [{"b": 2, "a": 1}]});

        let request = builder()
            .post("items", None, Some(&body), shared_headers())
            .unwrap();

        assert_eq!(
            String::from_utf8(request.body.clone().unwrap()).unwrap(),
            r#"{"alpha":{"x":null,"y":true},"mid":[{"a":1,"b":2}],"zeta":1}"#
        );
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.url, "https://api.example.com/v1/items");
    }

    #[test]
    fn test_json_encoding_is_deterministic() {
        let first = json!({"b": 1, "a": 2, "c": {"e": 3, "d": 4}});
        let second = json!({"c": {"d": 4, "e": 3}, "a": 2, "b": 1});

        assert_eq!(
            encode_json_body(&first).unwrap(),
            encode_json_body(&second).unwrap()
        );
    }

    #[test]
    fn test_post_query_only_becomes_form_body() {
        let request = builder()
            .post(
                "login",
                Some(&params(&[("user", "a b"), ("pass", "p&q")])),
                None,
                shared_headers(),
            )
            .unwrap();

        assert_eq!(request.url, "https://api.example.com/v1/login");
        assert_eq!(request.body.as_deref().unwrap(), b"pass=p%26q&user=a%20b");
        assert_eq!(
            request.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        // The override replaces the shared value instead of adding a second one.
        assert_eq!(
            request
                .headers
                .keys()
                .filter(|k| k.eq_ignore_ascii_case("content-type"))
                .count(),
            1
        );
    }

    #[test]
    fn test_post_with_query_and_body_puts_query_on_url() {
        let request = builder()
            .post(
                "items",
                Some(&params(&[("draft", "1")])),
                Some(&json!({"name": "x"})),
                shared_headers(),
            )
            .unwrap();

        assert_eq!(request.url, "https://api.example.com/v1/items?draft=1");
        assert_eq!(request.body.as_deref().unwrap(), br#"{"name":"x"}"#);
    }

    #[test]
    fn test_post_without_parameters_has_no_body() {
        let request = builder()
            .post("ping", None, None, shared_headers())
            .unwrap();

        assert!(request.body.is_none());
        assert_eq!(request.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        let result = builder().post("items", None, Some(&json!([1, 2])), HashMap::new());

        assert!(matches!(
            result,
            Err(InvalidRequestError::InvalidBody { reason }) if reason.contains("array")
        ));
    }

    #[test]
    fn test_put_keeps_query_on_url() {
        let request = builder()
            .put(
                "items/7",
                Some(&params(&[("force", "true")])),
                Some(&json!({"name": "y"})),
                shared_headers(),
            )
            .unwrap();

        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.url, "https://api.example.com/v1/items/7?force=true");
        assert_eq!(request.body.as_deref().unwrap(), br#"{"name":"y"}"#);
    }

    #[test]
    fn test_delete_is_never_decoded() {
        let request = builder().delete("items/7", None, shared_headers());

        assert_eq!(request.method, HttpMethod::Delete);
        assert_eq!(request.url, "https://api.example.com/v1/items/7");
        assert!(request.body.is_none());
        assert!(!request.decode);
    }

    #[test]
    fn test_leading_slash_in_path_is_not_doubled() {
        let request = builder().get("/photos", &HashMap::new(), HashMap::new());
        assert_eq!(request.url, "https://api.example.com/v1/photos");
    }

    #[test]
    fn test_multipart_layout() {
        let body = encode_multipart("XYZ", "notes.txt", b"hello");

        assert_eq!(
            String::from_utf8(body).unwrap(),
            "\r\n--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--XYZ--\r\n"
        );
    }

    #[test]
    fn test_boundaries_differ_per_request() {
        let first = generate_boundary();
        let second = generate_boundary();

        assert_eq!(first.len(), BOUNDARY_LEN);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_detect_mime_table() {
        assert_eq!(detect_mime("a.jpg"), "image/jpeg");
        assert_eq!(detect_mime("a.PNG"), "image/png");
        assert_eq!(detect_mime("a.m4a"), "audio/mp4");
        assert_eq!(detect_mime("a.m4v"), "video/mp4");
        assert_eq!(detect_mime("a.mp4"), "video/mp4");
        assert_eq!(detect_mime("a.mov"), "video/quicktime");
        assert_eq!(detect_mime("a.txt"), "text/plain");
        assert_eq!(detect_mime("a.csv"), "text/csv");
        assert_eq!(detect_mime("a.tsv"), "text/tab-separated-values");
        assert_eq!(detect_mime("a.tab"), "text/tab-separated-values");
        assert_eq!(detect_mime("a.json"), "application/json");
        assert_eq!(detect_mime("a.zip"), "application/zip");
        assert_eq!(detect_mime("a.jpeg"), "application/octet-stream");
        assert_eq!(detect_mime("README"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails_validation() {
        let result = builder()
            .upload(
                "upload",
                Path::new("/definitely/not/here.jpg"),
                HashMap::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(InvalidRequestError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_directory_is_not_a_file() {
        let dir = std::env::temp_dir();
        let result = builder().upload("upload", &dir, HashMap::new()).await;

        assert!(matches!(result, Err(InvalidRequestError::NotAFile { .. })));
    }

    #[tokio::test]
    async fn test_upload_builds_multipart_request() {
        let path = std::env::temp_dir().join(format!("upload-test-{}.csv", std::process::id()));
        tokio::fs::write(&path, b"a,b\n1,2\n").await.unwrap();

        let request = builder()
            .upload("files", &path, shared_headers())
            .await
            .unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        let content_type = request.header("Content-Type").unwrap().to_string();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        let body = String::from_utf8(request.body.clone().unwrap()).unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://api.example.com/v1/files");
        assert!(body.starts_with(&format!("\r\n--{boundary}\r\n")));
        assert!(body.contains("Content-Type: text/csv\r\n\r\na,b\n1,2\n"));
        assert!(body.ends_with(&format!("\r\n--{boundary}--\r\n")));
        assert_eq!(request.header("Accept"), Some("*/*"));
    }
}
