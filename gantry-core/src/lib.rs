// Core library for the Gantry routing and dispatch engine
// Path compilation, transformer registry, route table, scoped
// dependency providers, handler binding, and the dispatch pipeline

pub mod application;
pub mod binder;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod pattern;
pub mod routing;
pub mod scope;
pub mod status;
pub mod transform;

// Re-export commonly used types
pub use application::{Application, ApplicationBuilder};
pub use binder::{BindingPlan, BoundParameters, BoundValue, ParamSource, ParamSpec};
pub use dispatch::{DispatchPipeline, DispatchStage, ExceptionResolver, StatusOnlyResolver};
pub use error::{Error, RouteDefinitionError};
pub use handler::RouteHandler;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use middleware::{Middleware, MiddlewareChain, Next, RequestLogMiddleware};
pub use pattern::{ExtractedParams, PathPattern};
pub use routing::{QueryParamSpec, Route, RouteDescriptor, RouteMatch, RouteNode, Router};
pub use scope::{
    factory, LayerId, ProviderFactory, RequestScope, ResolveContext, ScopeManager, ScopeTier,
    SharedInstance, ROOT_LAYER,
};
pub use status::HttpStatus;
pub use transform::{ParamValue, ParseRejection, Transformer, TransformerRegistry};
