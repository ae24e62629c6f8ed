//! Request dispatch pipeline
//!
//! The single entry point [`DispatchPipeline::handle`] runs the
//! middleware chain around the core dispatch sequence:
//!
//! ```text
//! Received -> Matched -> DependenciesResolved -> Bound -> Invoked -> ResponseReady
//! ```
//!
//! Route resolution short-circuits to `NotFound` / `MethodNotAllowed`,
//! and any stage may fail; failures are handed to the registered
//! [`ExceptionResolver`]. The engine itself never formats error bodies;
//! the default resolver emits a status-only response.
//!
//! A request-tier scope is created per dispatch and lives as a local of
//! the dispatch future, so dropping the future (client disconnect, task
//! abort) tears the scope down exactly as completion does.

use crate::error::Error;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::middleware::{Endpoint, MiddlewareChain};
use crate::routing::{RouteMatch, Router};
use crate::scope::{ScopeManager, SharedInstance};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Stages of a dispatch, in order. Used for trace instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Received,
    Matched,
    DependenciesResolved,
    Bound,
    Invoked,
    ResponseReady,
}

/// Maps a failed dispatch to a response.
///
/// This is the seam for an external exception-handling layer; the
/// pipeline hands over the error and never shapes a body itself.
pub trait ExceptionResolver: Send + Sync {
    fn resolve(&self, error: &Error, method: HttpMethod, path: &str) -> HttpResponse;
}

/// Default resolver: status code only, no body.
///
/// A 405 carries the `Allow` header listing the union of methods the
/// path accepts.
pub struct StatusOnlyResolver;

impl ExceptionResolver for StatusOnlyResolver {
    fn resolve(&self, error: &Error, _method: HttpMethod, _path: &str) -> HttpResponse {
        let response = HttpResponse::new(error.status_code());
        if let Error::MethodNotAllowed { allowed, .. } = error {
            let allow = allowed
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            response.with_header("Allow", allow)
        } else {
            response
        }
    }
}

/// The assembled engine: route table, scope manager, middleware chain,
/// and exception resolver.
pub struct DispatchPipeline {
    router: Router,
    scopes: Arc<ScopeManager>,
    chain: MiddlewareChain,
    resolver: Arc<dyn ExceptionResolver>,
    app_handle: Option<SharedInstance>,
}

impl DispatchPipeline {
    pub fn new(router: Router, scopes: Arc<ScopeManager>) -> Self {
        Self {
            router,
            scopes,
            chain: MiddlewareChain::new(),
            resolver: Arc::new(StatusOnlyResolver),
            app_handle: None,
        }
    }

    pub fn with_middleware(mut self, chain: MiddlewareChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ExceptionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Attach an application handle that handler parameters with an
    /// `Application` source bind to.
    pub fn with_app_handle<T: Send + Sync + 'static>(mut self, handle: Arc<T>) -> Self {
        self.app_handle = Some(handle as SharedInstance);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn scopes(&self) -> &Arc<ScopeManager> {
        &self.scopes
    }

    /// Handle one request end to end: middleware chain, dispatch,
    /// exception resolution. Never fails; every error becomes a
    /// response.
    pub async fn handle(self: &Arc<Self>, request: HttpRequest) -> HttpResponse {
        let method = request.method;
        let path = request.path.clone();

        let pipeline = self.clone();
        let endpoint: Endpoint = Arc::new(move |req| {
            let pipeline = pipeline.clone();
            Box::pin(async move { pipeline.dispatch(req).await })
        });

        match self.chain.apply(request, endpoint).await {
            Ok(response) => response,
            Err(error) => {
                if error.is_server_error() {
                    warn!(method = %method, path = %path, error = %error, "dispatch failed");
                } else {
                    debug!(method = %method, path = %path, error = %error, "dispatch rejected");
                }
                self.resolver.resolve(&error, method, &path)
            }
        }
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        trace!(stage = ?DispatchStage::Received, path = %request.path);

        let (route, params) = match self.router.resolve(request.method, &request.path) {
            RouteMatch::Matched { route, params } => (route, params),
            RouteMatch::MethodNotAllowed { allowed } => {
                return Err(Error::MethodNotAllowed {
                    method: request.method,
                    path: request.path,
                    allowed,
                });
            }
            RouteMatch::NotFound => {
                return Err(Error::NotFound {
                    method: request.method,
                    path: request.path,
                });
            }
        };
        trace!(stage = ?DispatchStage::Matched, template = %route.pattern().template());

        // Dropped on every exit from this function, including a dropped
        // future, which is what makes cancellation release request-tier
        // resources.
        let scope = self.scopes.begin_request();
        let request = Arc::new(request);

        let bound = route.plan().bind(
            &request,
            &params,
            &self.scopes,
            route.layer(),
            &scope,
            self.app_handle.as_ref(),
        )?;
        trace!(stage = ?DispatchStage::DependenciesResolved, instances = scope.instance_count());
        trace!(stage = ?DispatchStage::Bound, params = bound.len());

        let result = route.handler().invoke(bound).await;
        trace!(stage = ?DispatchStage::Invoked, ok = result.is_ok());

        self.scopes.end_request(scope);
        trace!(stage = ?DispatchStage::ResponseReady);
        result
    }
}
