//! Testing utilities for Gantry applications.
//!
//! Provides an in-process [`TestClient`] that drives requests through a
//! [`DispatchPipeline`](gantry_core::DispatchPipeline) without opening a
//! socket, plus fluent response assertions.
//!
//! ```no_run
//! use gantry_core::{DispatchPipeline, HttpResponse, Route, RouteHandler, Router, ScopeManager};
//! use gantry_testing::TestClient;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mut router = Router::new();
//! router
//!     .register(Route::get(
//!         "/hello",
//!         RouteHandler::from_async(|_| async { Ok(HttpResponse::ok().with_body("hi")) }),
//!     ))
//!     .unwrap();
//! let pipeline = Arc::new(DispatchPipeline::new(router, Arc::new(ScopeManager::new())));
//!
//! let client = TestClient::new(pipeline);
//! let response = client.get("/hello").await;
//! assert_eq!(response.status(), 200);
//! assert_eq!(response.body_string(), Some("hi".to_string()));
//! # });
//! ```

pub mod assertions;
pub mod test_client;

pub use assertions::*;
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};
