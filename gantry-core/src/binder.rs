//! Handler parameter binding
//!
//! Each route carries a [`BindingPlan`] built once at registration time:
//! an ordered list of parameter specs naming where each handler argument
//! comes from. At dispatch time the plan is walked against the matched
//! path values, the scope manager, and the request, producing a
//! [`BoundParameters`] map that lives only for the handler invocation.
//!
//! Path values arrive already typed by their transformer; the binder
//! never re-coerces them.

use crate::error::Error;
use crate::http::HttpRequest;
use crate::pattern::ExtractedParams;
use crate::scope::{LayerId, RequestScope, ScopeManager, SharedInstance};
use crate::transform::ParamValue;
use compact_str::CompactString;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Where a handler parameter is resolved from.
#[derive(Debug, Clone)]
pub enum ParamSource {
    /// Typed value extracted from the matched path.
    Path,
    /// Provider resolved through the scope manager; keyed by the
    /// parameter name unless an explicit key is given.
    Dependency(Option<CompactString>),
    /// The inbound request itself.
    Request,
    /// The application handle registered on the pipeline.
    Application,
}

/// A single parameter of a binding plan.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: CompactString,
    pub source: ParamSource,
    pub default: Option<serde_json::Value>,
}

impl ParamSpec {
    pub fn path(name: &str) -> Self {
        Self {
            name: CompactString::new(name),
            source: ParamSource::Path,
            default: None,
        }
    }

    /// A dependency keyed by the parameter name.
    pub fn dependency(name: &str) -> Self {
        Self {
            name: CompactString::new(name),
            source: ParamSource::Dependency(None),
            default: None,
        }
    }

    /// A dependency with an explicit provider key.
    pub fn dependency_keyed(name: &str, key: &str) -> Self {
        Self {
            name: CompactString::new(name),
            source: ParamSource::Dependency(Some(CompactString::new(key))),
            default: None,
        }
    }

    pub fn request(name: &str) -> Self {
        Self {
            name: CompactString::new(name),
            source: ParamSource::Request,
            default: None,
        }
    }

    pub fn application(name: &str) -> Self {
        Self {
            name: CompactString::new(name),
            source: ParamSource::Application,
            default: None,
        }
    }

    /// Attach a fallback used when the source cannot supply a value.
    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// A value bound to a handler parameter for one invocation.
#[derive(Clone)]
pub enum BoundValue {
    /// Transformer-typed path value.
    Param(ParamValue),
    /// Scope-managed provider instance.
    Instance(SharedInstance),
    /// The inbound request.
    Request(Arc<HttpRequest>),
    /// Declared default.
    Json(serde_json::Value),
}

impl BoundValue {
    pub fn as_param(&self) -> Option<&ParamValue> {
        match self {
            BoundValue::Param(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&Arc<HttpRequest>> {
        match self {
            BoundValue::Request(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            BoundValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Downcast a provider instance.
    pub fn instance_as<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self {
            BoundValue::Instance(i) => i.clone().downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Param(v) => f.debug_tuple("Param").field(v).finish(),
            BoundValue::Instance(_) => f.write_str("Instance(..)"),
            BoundValue::Request(r) => f
                .debug_tuple("Request")
                .field(&r.method)
                .field(&r.path)
                .finish(),
            BoundValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
        }
    }
}

const INLINE_SPEC_COUNT: usize = 8;

/// Registration-time description of a handler's parameters.
///
/// Built once when the route is registered; dispatch only walks it.
#[derive(Debug, Clone, Default)]
pub struct BindingPlan {
    specs: SmallVec<[ParamSpec; INLINE_SPEC_COUNT]>,
}

impl BindingPlan {
    pub fn new(specs: impl IntoIterator<Item = ParamSpec>) -> Self {
        Self {
            specs: specs.into_iter().collect(),
        }
    }

    /// A plan with no parameters; binds to an empty map.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Bind every spec for one invocation.
    ///
    /// A source that cannot supply a value falls back to the spec's
    /// default; with no default the bind fails with
    /// [`Error::MissingParameter`] naming the parameter. Resolution
    /// errors other than a missing provider (a dependency cycle, a
    /// factory failure) propagate as-is.
    pub fn bind(
        &self,
        request: &Arc<HttpRequest>,
        path_params: &ExtractedParams,
        scopes: &ScopeManager,
        layer: LayerId,
        scope: &RequestScope,
        app: Option<&SharedInstance>,
    ) -> Result<BoundParameters, Error> {
        let mut values = HashMap::with_capacity(self.specs.len());
        for spec in &self.specs {
            let bound = match &spec.source {
                ParamSource::Path => path_params
                    .get(&spec.name)
                    .cloned()
                    .map(BoundValue::Param),
                ParamSource::Dependency(key) => {
                    let key = key.as_deref().unwrap_or(spec.name.as_str());
                    match scopes.resolve(key, layer, scope) {
                        Ok(instance) => Some(BoundValue::Instance(instance)),
                        Err(Error::ProviderNotFound(_)) => None,
                        Err(err) => return Err(err),
                    }
                }
                ParamSource::Request => Some(BoundValue::Request(request.clone())),
                ParamSource::Application => app.cloned().map(BoundValue::Instance),
            };

            let bound = match bound {
                Some(v) => v,
                None => match &spec.default {
                    Some(default) => BoundValue::Json(default.clone()),
                    None => return Err(Error::MissingParameter(spec.name.to_string())),
                },
            };
            values.insert(spec.name.clone(), bound);
        }
        trace!(param_count = values.len(), "handler parameters bound");
        Ok(BoundParameters { values })
    }
}

/// Per-invocation parameter map, discarded after the handler returns.
#[derive(Debug, Clone, Default)]
pub struct BoundParameters {
    values: HashMap<CompactString, BoundValue>,
}

impl BoundParameters {
    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.values.get(name)
    }

    /// Typed path value, if the parameter was bound from the path.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.get(name).and_then(BoundValue::as_param)
    }

    /// Downcast a bound provider instance.
    pub fn dependency<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, Error> {
        self.get(name)
            .and_then(BoundValue::instance_as::<T>)
            .ok_or_else(|| Error::ProviderTypeMismatch {
                key: name.to_string(),
            })
    }

    /// The bound request, if the plan declared one.
    pub fn request(&self, name: &str) -> Option<&Arc<HttpRequest>> {
        self.get(name).and_then(BoundValue::as_request)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::scope::{ScopeTier, factory, ROOT_LAYER};
    use crate::transform::TransformerRegistry;

    fn extracted(pairs: &[(&str, ParamValue)]) -> ExtractedParams {
        let mut params = ExtractedParams::default();
        for (name, value) in pairs {
            params.push(CompactString::new(name), value.clone());
        }
        params
    }

    #[test]
    fn test_path_binding_preserves_typed_value() {
        let plan = BindingPlan::new([ParamSpec::path("id")]);
        let req = Arc::new(HttpRequest::new(HttpMethod::GET, "/users/42"));
        let scopes = ScopeManager::new();
        let scope = scopes.begin_request();

        let bound = plan
            .bind(
                &req,
                &extracted(&[("id", ParamValue::Int(42))]),
                &scopes,
                ROOT_LAYER,
                &scope,
                None,
            )
            .unwrap();
        assert_eq!(bound.param("id"), Some(&ParamValue::Int(42)));
    }

    #[test]
    fn test_dependency_binding() {
        let mut scopes = ScopeManager::new();
        scopes.register(
            ROOT_LAYER,
            "db",
            ScopeTier::Request,
            factory(|_| Ok("connection".to_string())),
        );
        let plan = BindingPlan::new([ParamSpec::dependency("db")]);
        let req = Arc::new(HttpRequest::new(HttpMethod::GET, "/"));
        let scope = scopes.begin_request();

        let bound = plan
            .bind(&req, &ExtractedParams::default(), &scopes, ROOT_LAYER, &scope, None)
            .unwrap();
        let db = bound.dependency::<String>("db").unwrap();
        assert_eq!(*db, "connection");
    }

    #[test]
    fn test_missing_parameter_names_it() {
        let plan = BindingPlan::new([ParamSpec::path("id")]);
        let req = Arc::new(HttpRequest::new(HttpMethod::GET, "/"));
        let scopes = ScopeManager::new();
        let scope = scopes.begin_request();

        let err = plan
            .bind(&req, &ExtractedParams::default(), &scopes, ROOT_LAYER, &scope, None)
            .unwrap_err();
        match err {
            Error::MissingParameter(name) => assert_eq!(name, "id"),
            other => panic!("expected MissingParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_default_fills_missing_dependency() {
        let plan = BindingPlan::new([
            ParamSpec::dependency("limit").with_default(serde_json::json!(10)),
        ]);
        let req = Arc::new(HttpRequest::new(HttpMethod::GET, "/"));
        let scopes = ScopeManager::new();
        let scope = scopes.begin_request();

        let bound = plan
            .bind(&req, &ExtractedParams::default(), &scopes, ROOT_LAYER, &scope, None)
            .unwrap();
        assert_eq!(
            bound.get("limit").and_then(BoundValue::as_json),
            Some(&serde_json::json!(10))
        );
    }

    #[test]
    fn test_request_binding() {
        let plan = BindingPlan::new([ParamSpec::request("req")]);
        let req = Arc::new(HttpRequest::new(HttpMethod::POST, "/users"));
        let scopes = ScopeManager::new();
        let scope = scopes.begin_request();

        let bound = plan
            .bind(&req, &ExtractedParams::default(), &scopes, ROOT_LAYER, &scope, None)
            .unwrap();
        let bound_req = bound.request("req").unwrap();
        assert!(Arc::ptr_eq(bound_req, &req));
    }

    #[test]
    fn test_resolution_error_propagates() {
        let mut scopes = ScopeManager::new();
        scopes.register(
            ROOT_LAYER,
            "a",
            ScopeTier::Request,
            factory(|ctx| ctx.resolve("a").map(|_| ())),
        );
        // A default must not mask a genuine resolution failure.
        let plan = BindingPlan::new([
            ParamSpec::dependency("a").with_default(serde_json::json!(null)),
        ]);
        let req = Arc::new(HttpRequest::new(HttpMethod::GET, "/"));
        let scope = scopes.begin_request();

        let err = plan
            .bind(&req, &ExtractedParams::default(), &scopes, ROOT_LAYER, &scope, None)
            .unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { .. }));
    }

    #[test]
    fn test_no_recoercion_of_path_values() {
        // An int-typed path value stays an Int even if a str transformer
        // exists for the same text.
        let registry = TransformerRegistry::with_builtins();
        let int = registry.resolve("int").unwrap();
        let value = int.parse("42").unwrap();

        let plan = BindingPlan::new([ParamSpec::path("id")]);
        let req = Arc::new(HttpRequest::new(HttpMethod::GET, "/users/42"));
        let scopes = ScopeManager::new();
        let scope = scopes.begin_request();
        let bound = plan
            .bind(&req, &extracted(&[("id", value)]), &scopes, ROOT_LAYER, &scope, None)
            .unwrap();
        assert_eq!(bound.param("id"), Some(&ParamValue::Int(42)));
    }
}
