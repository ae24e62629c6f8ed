// Gantry - routing and request dispatch for async Rust services
//
// This library provides typed path parameters, scoped dependency
// providers, and a middleware-wrapped dispatch pipeline.

// Re-export core functionality
pub use gantry_core::*;

#[cfg(feature = "testing")]
pub use gantry_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Application, ApplicationBuilder, BindingPlan, BoundParameters, Error, HttpMethod,
        HttpRequest, HttpResponse, LogConfig, MiddlewareChain, ParamSpec, ParamValue, Route,
        RouteHandler, Router, ScopeManager, ScopeTier, TransformerRegistry, ROOT_LAYER,
    };
}
