//! Middleware chain wrapping the dispatch pipeline
//!
//! Each middleware receives the request and a `Next` continuation; it
//! may short-circuit with its own response or error, or call through.
//! The chain executes in registration order around the single dispatch
//! entry point.

use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

/// Continuation to the rest of the chain (and ultimately the endpoint).
pub type Next = Box<
    dyn FnOnce(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        + Send,
>;

/// The innermost link: the dispatch pipeline's entry point.
pub type Endpoint = Arc<
    dyn Fn(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>
        + Send
        + Sync,
>;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

/// Ordered middleware executor.
#[derive(Clone)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Arc::new(Vec::new()),
        }
    }

    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        let mut mws = (*self.middlewares).clone();
        mws.push(Arc::new(middleware));
        self.middlewares = Arc::new(mws);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run the chain around an endpoint.
    pub async fn apply(&self, req: HttpRequest, endpoint: Endpoint) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "executing middleware chain"
        );
        self.execute_from(0, req, endpoint).await
    }

    fn execute_from(
        &self,
        index: usize,
        req: HttpRequest,
        endpoint: Endpoint,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>> {
        if index >= self.middlewares.len() {
            trace!("middleware chain complete, entering dispatch");
            endpoint(req)
        } else {
            let middleware = self.middlewares[index].clone();
            let chain = self.clone();
            let endpoint = endpoint.clone();

            Box::pin(async move {
                middleware
                    .handle(
                        req,
                        Box::new(move |req| chain.execute_from(index + 1, req, endpoint)),
                    )
                    .await
            })
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Structured request/response logging middleware.
pub struct RequestLogMiddleware {
    /// Log request bodies up to `max_body_size`.
    pub log_request_body: bool,
    pub max_body_size: usize,
}

impl RequestLogMiddleware {
    pub fn new() -> Self {
        Self {
            log_request_body: false,
            max_body_size: 1024,
        }
    }

    pub fn with_request_body(mut self, enable: bool) -> Self {
        self.log_request_body = enable;
        self
    }
}

impl Default for RequestLogMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for RequestLogMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let start = std::time::Instant::now();
        let method = req.method;
        let path = req.path.clone();

        if self.log_request_body && !req.body.is_empty() {
            let shown = req.body.len().min(self.max_body_size);
            info!(
                method = %method,
                path = %path,
                body = %String::from_utf8_lossy(&req.body[..shown]),
                body_bytes = req.body.len(),
                "request received"
            );
        } else {
            info!(method = %method, path = %path, "request received");
        }

        let result = next(req).await;
        let duration_ms = start.elapsed().as_millis();

        match &result {
            Ok(response) => {
                info!(
                    method = %method,
                    path = %path,
                    status = response.status,
                    duration_ms,
                    "response sent"
                );
            }
            Err(err) => {
                error!(
                    method = %method,
                    path = %path,
                    error = %err,
                    duration_ms,
                    "request failed"
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn ok_endpoint() -> Endpoint {
        Arc::new(|_req| Box::pin(async { Ok(HttpResponse::ok()) }))
    }

    struct TagMiddleware(&'static str);

    #[async_trait]
    impl Middleware for TagMiddleware {
        async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
            let mut response = next(req).await?;
            let mut tags = response
                .headers
                .get("X-Tags")
                .cloned()
                .unwrap_or_default();
            if !tags.is_empty() {
                tags.push(',');
            }
            tags.push_str(self.0);
            response.headers.insert("X-Tags".to_string(), tags);
            Ok(response)
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle(&self, _req: HttpRequest, _next: Next) -> Result<HttpResponse, Error> {
            Ok(HttpResponse::new(403))
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(TagMiddleware("outer"));
        chain.use_middleware(TagMiddleware("inner"));

        let req = HttpRequest::new(HttpMethod::GET, "/test");
        let response = chain.apply(req, ok_endpoint()).await.unwrap();
        // Inner completes first on the way back out.
        assert_eq!(response.headers.get("X-Tags"), Some(&"inner,outer".to_string()));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_endpoint() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(ShortCircuit);

        let endpoint: Endpoint = Arc::new(|_req| {
            Box::pin(async { panic!("endpoint must not run") })
        });
        let req = HttpRequest::new(HttpMethod::GET, "/blocked");
        let response = chain.apply(req, endpoint).await.unwrap();
        assert_eq!(response.status, 403);
    }

    #[tokio::test]
    async fn test_empty_chain_calls_endpoint() {
        let chain = MiddlewareChain::new();
        let req = HttpRequest::new(HttpMethod::GET, "/test");
        let response = chain.apply(req, ok_endpoint()).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_request_log_middleware_passes_through() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(RequestLogMiddleware::new().with_request_body(true));

        let mut req = HttpRequest::new(HttpMethod::POST, "/echo");
        req.body = b"hello".to_vec();
        let response = chain.apply(req, ok_endpoint()).await.unwrap();
        assert_eq!(response.status, 200);
    }
}
