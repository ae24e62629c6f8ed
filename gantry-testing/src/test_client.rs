// In-process test client

use gantry_core::{DispatchPipeline, Error, HttpMethod, HttpRequest, HttpResponse};
use std::collections::HashMap;
use std::sync::Arc;

/// Drives requests through a dispatch pipeline without a socket.
pub struct TestClient {
    pipeline: Arc<DispatchPipeline>,
}

impl TestClient {
    pub fn new(pipeline: Arc<DispatchPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::GET, path).build())
            .await
    }

    pub async fn post(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::POST, path).body(body).build())
            .await
    }

    pub async fn put(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::PUT, path).body(body).build())
            .await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::DELETE, path).build())
            .await
    }

    pub async fn patch(&self, path: &str, body: Vec<u8>) -> TestResponse {
        self.send(TestRequestBuilder::new(HttpMethod::PATCH, path).body(body).build())
            .await
    }

    /// Send an arbitrary request built with [`TestRequestBuilder`].
    pub async fn send(&self, request: HttpRequest) -> TestResponse {
        TestResponse(self.pipeline.handle(request).await)
    }
}

/// Builder for test requests with headers, query, and JSON bodies.
pub struct TestRequestBuilder {
    method: HttpMethod,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    query_params: Vec<(String, String)>,
}

impl TestRequestBuilder {
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
            query_params: Vec::new(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query_params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> HttpRequest {
        let query_string = if self.query_params.is_empty() {
            String::new()
        } else {
            let params: Vec<String> = self
                .query_params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            format!("?{}", params.join("&"))
        };

        let mut request =
            HttpRequest::new(self.method, format!("{}{}", self.path, query_string));
        request.headers = self.headers;
        request.body = self.body;
        request
    }
}

/// Response wrapper with assertion-friendly accessors.
///
/// The pipeline never fails outright; errors arrive as status-mapped
/// responses, so this wraps a plain [`HttpResponse`].
#[derive(Debug)]
pub struct TestResponse(pub HttpResponse);

impl TestResponse {
    pub fn status(&self) -> u16 {
        self.0.status
    }

    pub fn body_string(&self) -> Option<String> {
        self.0.body_string()
    }

    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_slice(&self.0.body).map_err(|e| e.to_string())
    }

    pub fn header(&self, key: &str) -> Option<&String> {
        self.0.headers.get(key)
    }

    pub fn into_inner(self) -> HttpResponse {
        self.0
    }
}
