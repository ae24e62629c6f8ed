// HTTP request and response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or(())
    }
}

/// HTTP request wrapper
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    /// Create a request from a method and a request target.
    ///
    /// A query string in the target is split off and parsed into
    /// `query_params`; `path` never contains a `?`.
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        let target = target.into();
        let (path, query_params) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), parse_query_string(q)),
            None => (target, HashMap::new()),
        };

        Self {
            method,
            path,
            headers: HashMap::new(),
            body: Vec::new(),
            query_params,
        }
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    /// Get a header by name
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Get the response body as a UTF-8 string, if valid
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }
}

/// Parse a query string into a map of parameters
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut split = part.splitn(2, '=');
            let key = split.next()?;
            let value = split.next().unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_round_trip() {
        for m in [
            HttpMethod::GET,
            HttpMethod::POST,
            HttpMethod::PUT,
            HttpMethod::DELETE,
            HttpMethod::PATCH,
            HttpMethod::HEAD,
            HttpMethod::OPTIONS,
        ] {
            assert_eq!(HttpMethod::parse(m.as_str()), Some(m));
        }
        assert_eq!(HttpMethod::parse("BREW"), None);
    }

    #[test]
    fn test_request_splits_query() {
        let req = HttpRequest::new(HttpMethod::GET, "/users?name=ada&limit=10");
        assert_eq!(req.path, "/users");
        assert_eq!(req.query("name"), Some(&"ada".to_string()));
        assert_eq!(req.query("limit"), Some(&"10".to_string()));
    }

    #[test]
    fn test_request_without_query() {
        let req = HttpRequest::new(HttpMethod::GET, "/users");
        assert_eq!(req.path, "/users");
        assert!(req.query_params.is_empty());
    }

    #[test]
    fn test_parse_query_string_no_value() {
        let params = parse_query_string("flag&debug=true");
        assert_eq!(params.get("flag"), Some(&"".to_string()));
        assert_eq!(params.get("debug"), Some(&"true".to_string()));
    }

    #[test]
    fn test_json_body() {
        #[derive(Deserialize)]
        struct Payload {
            name: String,
        }

        let mut req = HttpRequest::new(HttpMethod::POST, "/users");
        req.body = br#"{"name":"ada"}"#.to_vec();
        let payload: Payload = req.json().unwrap();
        assert_eq!(payload.name, "ada");
    }

    #[test]
    fn test_response_builders() {
        let resp = HttpResponse::ok()
            .with_header("X-Test", "1")
            .with_body("hello");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.headers.get("X-Test"), Some(&"1".to_string()));
        assert_eq!(resp.body_string(), Some("hello".to_string()));
    }

    #[test]
    fn test_response_json() {
        let resp = HttpResponse::ok()
            .with_json(&serde_json::json!({"ok": true}))
            .unwrap();
        assert_eq!(
            resp.headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
    }
}
