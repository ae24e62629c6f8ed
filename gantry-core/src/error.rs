// Error types for the Gantry dispatch engine

use crate::http::HttpMethod;
use crate::status::HttpStatus;
use thiserror::Error;

/// Errors raised while registering routes.
///
/// These are fatal and abort application startup; a malformed template
/// never makes it into the route table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteDefinitionError {
    #[error("duplicate path parameter `{name}` in template `{template}`")]
    DuplicateParameter { template: String, name: String },

    #[error("unknown transformer kind `{kind}` in template `{template}`")]
    UnknownTransformer { template: String, kind: String },

    #[error("catch-all parameter `{name}` must be the final segment of `{template}`")]
    CatchAllNotLast { template: String, name: String },

    #[error("malformed parameter token `{token}` in template `{template}`")]
    MalformedToken { template: String, token: String },
}

/// Runtime errors surfaced by the dispatch pipeline.
///
/// No-match during route scanning is not represented here; it is a
/// control-flow value (`RouteMatch::NotFound`) until the scan completes
/// and the pipeline turns the outcome into `NotFound`/`MethodNotAllowed`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no route matched {method} {path}")]
    NotFound { method: HttpMethod, path: String },

    #[error("method {method} not allowed for {path}; allowed: {allowed:?}")]
    MethodNotAllowed {
        method: HttpMethod,
        path: String,
        allowed: Vec<HttpMethod>,
    },

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("dependency cycle: {}", .chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error("provider `{key}` resolved to an unexpected type")]
    ProviderTypeMismatch { key: String },

    #[error("missing handler parameter `{0}`")]
    MissingParameter(String),

    #[error("handler task failed: {0}")]
    HandlerJoin(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => HttpStatus::NotFound.code(),
            Error::MethodNotAllowed { .. } => HttpStatus::MethodNotAllowed.code(),
            Error::Deserialization(_) => HttpStatus::BadRequest.code(),
            Error::Serialization(_)
            | Error::ProviderNotFound(_)
            | Error::DependencyCycle { .. }
            | Error::ProviderTypeMismatch { .. }
            | Error::MissingParameter(_)
            | Error::HandlerJoin(_)
            | Error::Internal(_)
            | Error::Io(_) => HttpStatus::InternalServerError.code(),
        }
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        HttpStatus::from_code(self.status_code()).unwrap_or(HttpStatus::InternalServerError)
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }
}
