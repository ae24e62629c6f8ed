// Application bootstrapper and HTTP server

use crate::dispatch::{DispatchPipeline, ExceptionResolver};
use crate::error::Error;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::logging::LogConfig;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::routing::Router;
use crate::scope::ScopeManager;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming as IncomingBody, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// Assembles a router, scope manager, middleware, and exception
/// resolver into a servable [`Application`].
///
/// All configuration is explicit and threaded through the builder; the
/// engine carries no ambient global state.
pub struct ApplicationBuilder {
    router: Router,
    scopes: ScopeManager,
    chain: MiddlewareChain,
    resolver: Option<Arc<dyn ExceptionResolver>>,
    log_config: Option<LogConfig>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            scopes: ScopeManager::new(),
            chain: MiddlewareChain::new(),
            resolver: None,
            log_config: None,
        }
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn scopes(mut self, scopes: ScopeManager) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn use_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.chain.use_middleware(middleware);
        self
    }

    pub fn exception_resolver(mut self, resolver: Arc<dyn ExceptionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Install a tracing subscriber when the application is built.
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.log_config = Some(config);
        self
    }

    pub fn build(self) -> Application {
        let log_guard = self.log_config.and_then(LogConfig::init);
        let mut pipeline = DispatchPipeline::new(self.router, Arc::new(self.scopes))
            .with_middleware(self.chain);
        if let Some(resolver) = self.resolver {
            pipeline = pipeline.with_resolver(resolver);
        }
        Application {
            pipeline: Arc::new(pipeline),
            _log_guard: log_guard,
        }
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled application.
pub struct Application {
    pipeline: Arc<DispatchPipeline>,
    _log_guard: Option<WorkerGuard>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// The dispatch pipeline, for driving requests in-process.
    pub fn pipeline(&self) -> Arc<DispatchPipeline> {
        self.pipeline.clone()
    }

    /// Serve HTTP/1.1 on the given port until the task is dropped.
    pub async fn listen(self, port: u16) -> Result<(), Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %addr, "server listening");

        let pipeline = self.pipeline.clone();
        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let pipeline = pipeline.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let pipeline = pipeline.clone();
                    async move { serve_request(req, pipeline).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(peer = %peer, error = %err, "connection error");
                }
            });
        }
    }
}

/// Adapt one hyper request through the pipeline and back.
async fn serve_request(
    req: Request<IncomingBody>,
    pipeline: Arc<DispatchPipeline>,
) -> Result<Response<Full<bytes::Bytes>>, hyper::Error> {
    let Some(method) = HttpMethod::parse(req.method().as_str()) else {
        warn!(method = %req.method(), "unsupported method");
        return Ok(Response::builder()
            .status(501)
            .body(Full::new(bytes::Bytes::new()))
            .unwrap());
    };

    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut request = HttpRequest::new(method, target);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.to_string(), value.to_string());
        }
    }
    request.body = req.collect().await?.to_bytes().to_vec();

    let response = pipeline.handle(request).await;
    Ok(to_hyper_response(response))
}

fn to_hyper_response(response: HttpResponse) -> Response<Full<bytes::Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in response.headers {
        builder = builder.header(key, value);
    }
    builder
        .body(Full::new(bytes::Bytes::from(response.body)))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(500)
                .body(Full::new(bytes::Bytes::new()))
                .unwrap()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RouteHandler;
    use crate::routing::Route;

    #[tokio::test]
    async fn test_builder_assembles_pipeline() {
        let mut router = Router::new();
        router
            .register(Route::get(
                "/ping",
                RouteHandler::from_async(|_| async { Ok(HttpResponse::ok().with_body("pong")) }),
            ))
            .unwrap();

        let app = Application::builder().router(router).build();
        let response = app
            .pipeline()
            .handle(HttpRequest::new(HttpMethod::GET, "/ping"))
            .await;
        assert_eq!(response.body_string(), Some("pong".to_string()));
    }

    #[test]
    fn test_hyper_response_conversion() {
        let response = HttpResponse::new(201)
            .with_header("X-Id", "7")
            .with_body("created");
        let converted = to_hyper_response(response);
        assert_eq!(converted.status(), 201);
        assert_eq!(converted.headers().get("X-Id").unwrap(), "7");
    }
}
