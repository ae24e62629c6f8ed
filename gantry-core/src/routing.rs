//! Route table and resolution
//!
//! Routes are registered as [`Route`] records and compiled fail-fast
//! into [`RouteNode`]s; a malformed template aborts registration before
//! the table ever serves traffic. Sub-routers are mounted with
//! [`Router::include`], which flattens their routes into the parent
//! table at mount time, so resolution always scans one flat list in
//! declaration order and mount prefixes cost nothing per request.
//!
//! Resolution is first-match: the first structurally matching node whose
//! method set admits the request wins. Nodes that match the path but not
//! the method contribute their methods to the 405 `allowed` union while
//! the scan continues.

use crate::binder::BindingPlan;
use crate::error::RouteDefinitionError;
use crate::handler::RouteHandler;
use crate::http::HttpMethod;
use crate::pattern::{ExtractedParams, PathPattern};
use crate::scope::{LayerId, ROOT_LAYER};
use crate::transform::TransformerRegistry;
use compact_str::CompactString;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A query parameter declared for documentation purposes.
///
/// Purely descriptive: the engine never validates query strings against
/// these specs, it only surfaces them through [`RouteDescriptor`].
#[derive(Debug, Clone)]
pub struct QueryParamSpec {
    pub name: CompactString,
    pub required: bool,
    pub description: Option<String>,
}

impl QueryParamSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: CompactString::new(name),
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }
}

const INLINE_METHOD_COUNT: usize = 4;

type MethodSet = SmallVec<[HttpMethod; INLINE_METHOD_COUNT]>;

/// Registration-time route record.
///
/// An empty method set is a pass-through: the route accepts every
/// method.
#[derive(Debug, Clone)]
pub struct Route {
    template: String,
    methods: MethodSet,
    handler: RouteHandler,
    plan: BindingPlan,
    name: Option<CompactString>,
    include_in_docs: bool,
    query_params: Vec<QueryParamSpec>,
}

impl Route {
    pub fn new(template: &str, handler: RouteHandler) -> Self {
        Self {
            template: template.to_string(),
            methods: MethodSet::new(),
            handler,
            plan: BindingPlan::empty(),
            name: None,
            include_in_docs: true,
            query_params: Vec::new(),
        }
    }

    pub fn get(template: &str, handler: RouteHandler) -> Self {
        Self::new(template, handler).methods([HttpMethod::GET])
    }

    pub fn post(template: &str, handler: RouteHandler) -> Self {
        Self::new(template, handler).methods([HttpMethod::POST])
    }

    pub fn put(template: &str, handler: RouteHandler) -> Self {
        Self::new(template, handler).methods([HttpMethod::PUT])
    }

    pub fn delete(template: &str, handler: RouteHandler) -> Self {
        Self::new(template, handler).methods([HttpMethod::DELETE])
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = HttpMethod>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(CompactString::new(name));
        self
    }

    /// Exclude the route from [`Router::descriptors`] output.
    pub fn hidden(mut self) -> Self {
        self.include_in_docs = false;
        self
    }

    pub fn plan(mut self, plan: BindingPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn query_param(mut self, spec: QueryParamSpec) -> Self {
        self.query_params.push(spec);
        self
    }
}

/// A compiled route in the flattened table.
pub struct RouteNode {
    pattern: PathPattern,
    methods: MethodSet,
    handler: RouteHandler,
    plan: BindingPlan,
    name: Option<CompactString>,
    include_in_docs: bool,
    query_params: Vec<QueryParamSpec>,
    /// Scope layer the route resolves dependencies from.
    layer: LayerId,
}

impl RouteNode {
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    pub fn plan(&self) -> &BindingPlan {
        &self.plan
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    fn allows(&self, method: HttpMethod) -> bool {
        self.methods.is_empty() || self.methods.contains(&method)
    }
}

/// Outcome of a route resolution.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    Matched {
        route: &'a RouteNode,
        params: ExtractedParams,
    },
    /// The path matched at least one route, but none admitted the
    /// method. `allowed` is the union across all path-matching routes,
    /// deduplicated, in declaration order.
    MethodNotAllowed { allowed: Vec<HttpMethod> },
    NotFound,
}

impl std::fmt::Debug for RouteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteNode")
            .field("template", &self.pattern.template())
            .field("methods", &self.methods)
            .field("layer", &self.layer)
            .finish()
    }
}

/// Documentation-facing view of a route.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub template: String,
    pub methods: Vec<HttpMethod>,
    pub name: Option<String>,
    pub include_in_docs: bool,
    /// `(name, kind)` pairs in template order.
    pub path_params: Vec<(String, String)>,
    pub query_params: Vec<QueryParamSpec>,
}

/// Flat, declaration-ordered route table.
pub struct Router {
    transformers: Arc<TransformerRegistry>,
    layer: LayerId,
    routes: Vec<RouteNode>,
}

impl Router {
    /// A router with the built-in transformers, resolving dependencies
    /// from the root scope layer.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(TransformerRegistry::with_builtins()))
    }

    pub fn with_registry(transformers: Arc<TransformerRegistry>) -> Self {
        Self {
            transformers,
            layer: ROOT_LAYER,
            routes: Vec::new(),
        }
    }

    /// Bind the router's own routes to a scope layer. Routes already
    /// registered keep their layer; typically called before any
    /// registration on a sub-router destined for [`Router::include`].
    pub fn layered(mut self, layer: LayerId) -> Self {
        self.layer = layer;
        self
    }

    pub fn transformers(&self) -> &Arc<TransformerRegistry> {
        &self.transformers
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Compile and append a route. Fails fast on a malformed template.
    pub fn register(&mut self, route: Route) -> Result<(), RouteDefinitionError> {
        let pattern = PathPattern::compile(&route.template, &self.transformers)?;
        debug!(
            template = %route.template,
            methods = ?route.methods,
            "route registered"
        );
        self.routes.push(RouteNode {
            pattern,
            methods: route.methods,
            handler: route.handler,
            plan: route.plan,
            name: route.name,
            include_in_docs: route.include_in_docs,
            query_params: route.query_params,
            layer: self.layer,
        });
        Ok(())
    }

    /// Mount a sub-router under a prefix.
    ///
    /// Sub-routes are flattened into this table in their declaration
    /// order, each template prefix-joined and recompiled against this
    /// router's transformer registry. Each flattened route keeps the
    /// scope layer it had in the sub-router, so dependency shadowing
    /// declared on the mount survives flattening.
    pub fn include(&mut self, prefix: &str, sub: Router) -> Result<(), RouteDefinitionError> {
        debug!(prefix = prefix, routes = sub.routes.len(), "mounting sub-router");
        for node in sub.routes {
            let template = join_prefix(prefix, node.pattern.template());
            let pattern = PathPattern::compile(&template, &self.transformers)?;
            self.routes.push(RouteNode {
                pattern,
                methods: node.methods,
                handler: node.handler,
                plan: node.plan,
                name: node.name,
                include_in_docs: node.include_in_docs,
                query_params: node.query_params,
                layer: node.layer,
            });
        }
        Ok(())
    }

    /// Resolve a method and path against the table.
    pub fn resolve(&self, method: HttpMethod, path: &str) -> RouteMatch<'_> {
        let mut allowed: Vec<HttpMethod> = Vec::new();
        for node in &self.routes {
            let Some(params) = node.pattern.match_path(path) else {
                continue;
            };
            if node.allows(method) {
                trace!(
                    template = %node.pattern.template(),
                    path = path,
                    "route matched"
                );
                return RouteMatch::Matched {
                    route: node,
                    params,
                };
            }
            // Path matched, method did not: remember and keep scanning.
            for m in &node.methods {
                if !allowed.contains(m) {
                    allowed.push(*m);
                }
            }
        }
        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed { allowed }
        }
    }

    /// Documentation-facing descriptors for every registered route.
    ///
    /// A declared query spec whose name collides with a path parameter
    /// of the same route is dropped here with a warning; at runtime the
    /// path value always wins for such a name.
    pub fn descriptors(&self) -> Vec<RouteDescriptor> {
        self.routes
            .iter()
            .map(|node| {
                let query_params = node
                    .query_params
                    .iter()
                    .filter(|spec| {
                        if node.pattern.has_param(&spec.name) {
                            warn!(
                                template = %node.pattern.template(),
                                name = %spec.name,
                                "query spec shadowed by path parameter; dropped from descriptor"
                            );
                            false
                        } else {
                            true
                        }
                    })
                    .cloned()
                    .collect();
                RouteDescriptor {
                    template: node.pattern.template().to_string(),
                    methods: node.methods.to_vec(),
                    name: node.name.as_ref().map(|n| n.to_string()),
                    include_in_docs: node.include_in_docs,
                    path_params: node
                        .pattern
                        .params()
                        .map(|(n, k)| (n.to_string(), k.to_string()))
                        .collect(),
                    query_params,
                }
            })
            .collect()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Join a mount prefix and a route template into one template.
fn join_prefix(prefix: &str, template: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let template = template.trim_start_matches('/');
    if template.is_empty() {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }
    } else {
        format!("{prefix}/{template}")
    }
}
