//! Route handlers
//!
//! Two flavors, one invocation path: async handlers return a boxed
//! future; blocking handlers run on `tokio::task::spawn_blocking` so
//! they never stall the async worker threads. Both receive the same
//! [`BoundParameters`] and both are awaited to a single completion by
//! the dispatch pipeline.

use crate::binder::BoundParameters;
use crate::error::Error;
use crate::http::HttpResponse;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The future returned by an async handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

type AsyncHandlerFn = Arc<dyn Fn(BoundParameters) -> HandlerFuture + Send + Sync>;
type BlockingHandlerFn = Arc<dyn Fn(BoundParameters) -> Result<HttpResponse, Error> + Send + Sync>;

/// A type-erased route handler.
#[derive(Clone)]
pub enum RouteHandler {
    Async(AsyncHandlerFn),
    Blocking(BlockingHandlerFn),
}

impl RouteHandler {
    /// Wrap an async closure.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(BoundParameters) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
    {
        RouteHandler::Async(Arc::new(move |args| Box::pin(f(args))))
    }

    /// Wrap a blocking closure; it will run on the blocking pool.
    pub fn from_blocking<F>(f: F) -> Self
    where
        F: Fn(BoundParameters) -> Result<HttpResponse, Error> + Send + Sync + 'static,
    {
        RouteHandler::Blocking(Arc::new(f))
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, RouteHandler::Blocking(_))
    }

    /// Invoke the handler with bound parameters.
    ///
    /// A blocking handler that panics surfaces as [`Error::HandlerJoin`]
    /// rather than tearing down the dispatch task.
    pub async fn invoke(&self, args: BoundParameters) -> Result<HttpResponse, Error> {
        match self {
            RouteHandler::Async(f) => f(args).await,
            RouteHandler::Blocking(f) => {
                let f = f.clone();
                tokio::task::spawn_blocking(move || f(args))
                    .await
                    .map_err(|e| Error::HandlerJoin(e.to_string()))?
            }
        }
    }
}

impl std::fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteHandler::Async(_) => f.write_str("RouteHandler::Async"),
            RouteHandler::Blocking(_) => f.write_str("RouteHandler::Blocking"),
        }
    }
}
