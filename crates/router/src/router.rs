//! The route registry and the request dispatcher.
//!
//! Routes are registered up front through the [`Routes`] trait, which both [`Router`] and
//! [`RouteGroup`] implement. Once registration is done the router is shared read-only between
//! workers: [`Router::serve`] only reads the method trees and touches the context pool.

mod group;

pub use group::{RouteGroup, Routes};

use crate::context::{Context, MAX_HANDLERS};
use crate::error::RouteError;
use crate::handler::{last_name, HandlersChain, IntoHandlers, RouteHandler};
use crate::middleware::{logger, recovery};
use crate::params::Params;
use crate::pool::ContextPool;
use crate::request::RequestHead;
use crate::response::{ResponseBuffer, ResponseWriter};
use crate::tree::MethodTrees;
use crate::utils::ensure;
use bytes::Bytes;
use http::header::ALLOW;
use http::{HeaderValue, Method, Request, Response, StatusCode, Uri};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, error};

const NOT_FOUND_BODY: &str = "404 page not found";
const METHOD_NOT_ALLOWED_BODY: &str = "405 method not allowed";

/// Router options, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Match against the raw, still percent-encoded request path instead of the decoded one.
    pub use_raw_path: bool,
    /// With `use_raw_path`, percent-decode the values bound to path parameters.
    pub unescape_path_values: bool,
    /// Answer 405 instead of 404 when the path is registered under another method.
    pub handle_method_not_allowed: bool,
    /// Upper bound on the number of idle contexts kept for reuse.
    pub max_idle_contexts: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            use_raw_path: false,
            unescape_path_values: true,
            handle_method_not_allowed: false,
            max_idle_contexts: 1024,
        }
    }
}

/// One registered route, as reported by [`Router::routes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    method: Method,
    path: String,
    handler: String,
}

impl RouteInfo {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The registered pattern, group prefixes included
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name of the route's own handler, the last one of its chain
    pub fn handler(&self) -> &str {
        &self.handler
    }
}

/// The outcome of a successful [`Router::resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    handlers: HandlersChain,
    params: Params,
    full_path: Arc<str>,
}

impl Resolved {
    pub fn handlers(&self) -> &HandlersChain {
        &self.handlers
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The pattern the path matched
    pub fn full_path(&self) -> &str {
        &self.full_path
    }
}

/// Main router structure: the method trees, the root middleware, the fallback chains and the
/// context pool.
#[derive(Debug)]
pub struct Router {
    trees: MethodTrees,
    config: RouterConfig,
    middleware: Vec<RouteHandler>,
    no_route: Vec<RouteHandler>,
    no_method: Vec<RouteHandler>,
    all_no_route: HandlersChain,
    all_no_method: HandlersChain,
    pool: ContextPool,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self::from_parts(config, Vec::new())
    }

    /// Creates a router with the access logger and the panic recovery middleware installed.
    pub fn with_default_middleware() -> Self {
        Self::from_parts(RouterConfig::default(), vec![logger(), recovery()])
    }

    fn from_parts(config: RouterConfig, middleware: Vec<RouteHandler>) -> Self {
        let fallback = HandlersChain::from(middleware.clone());
        Self {
            trees: MethodTrees::default(),
            pool: ContextPool::new(config.max_idle_contexts),
            config,
            middleware,
            no_route: Vec::new(),
            no_method: Vec::new(),
            all_no_route: Arc::clone(&fallback),
            all_no_method: fallback,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Registers `handlers` for `method` and the absolute pattern `path`.
    ///
    /// Registering the same method and pattern twice replaces the earlier chain. Fails without
    /// touching the tree if the path is not absolute, the chain is empty or too long, or the
    /// pattern is malformed or conflicts with a registered wildcard.
    pub fn add_route(&mut self, method: Method, path: &str, handlers: Vec<RouteHandler>) -> Result<(), RouteError> {
        ensure!(path.starts_with('/'), RouteError::invalid_path(path));
        ensure!(!handlers.is_empty(), RouteError::empty_handlers(path));
        ensure!(handlers.len() <= MAX_HANDLERS, RouteError::too_many_handlers(path, handlers.len(), MAX_HANDLERS));

        debug!(%method, path, handler = last_name(&handlers), handlers = handlers.len(), "register route");
        self.trees.get_or_create(method).add_route(path, HandlersChain::from(handlers))?;
        Ok(())
    }

    /// Sets the handlers run, after the root middleware, when no route matches.
    pub fn no_route(&mut self, handlers: impl IntoHandlers) -> Result<&mut Self, RouteError> {
        let handlers = handlers.into_handlers();
        self.all_no_route = combine_handlers(&self.middleware, handlers.clone(), "no route")?.into();
        self.no_route = handlers;
        Ok(self)
    }

    /// Sets the handlers run, after the root middleware, when the path only matches under other
    /// methods. Only used with [`RouterConfig::handle_method_not_allowed`].
    pub fn no_method(&mut self, handlers: impl IntoHandlers) -> Result<&mut Self, RouteError> {
        let handlers = handlers.into_handlers();
        self.all_no_method = combine_handlers(&self.middleware, handlers.clone(), "no method")?.into();
        self.no_method = handlers;
        Ok(self)
    }

    /// Finds the route registered for `method` that matches `path`.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<Resolved> {
        let mut params = Params::empty();
        let route = self.trees.get(method)?.get_value(path, &mut params, self.unescape_values())?;
        Some(Resolved { handlers: Arc::clone(&route.handlers), params, full_path: Arc::clone(&route.full_path) })
    }

    /// Lists every registered route, grouped by method in registration order of the methods.
    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut infos = Vec::new();
        for tree in self.trees.iter() {
            let mut routes = Vec::new();
            tree.root.routes(&mut routes);
            infos.extend(routes.into_iter().map(|route| RouteInfo {
                method: tree.method.clone(),
                path: route.full_path.to_string(),
                handler: last_name(&route.handlers).to_string(),
            }));
        }
        infos
    }

    /// Dispatches one request, writing the response to `out`.
    ///
    /// A panicking handler unwinds out of this call unless a recovery middleware catches it; the
    /// context it ran on is then dropped instead of returning to the pool.
    pub fn serve(&self, request: impl Into<RequestHead>, out: impl ResponseWriter + 'static) {
        let mut ctx = self.pool.checkout(request.into(), Box::new(out));
        self.dispatch(&mut ctx);
        self.pool.checkin(ctx);
    }

    /// Dispatches `request` into an in-memory buffer and returns the finished response.
    pub fn respond<B>(&self, request: Request<B>) -> Response<Bytes> {
        let buffer = ResponseBuffer::new();
        self.serve(request, buffer.clone());
        buffer.into_response()
    }

    fn dispatch(&self, ctx: &mut Context) {
        let method = ctx.request().method().clone();
        let uri = ctx.request().uri().clone();
        let path = self.request_path(&uri);

        if let Some(root) = self.trees.get(&method) {
            if let Some(route) = root.get_value(&path, ctx.params_mut(), self.unescape_values()) {
                ctx.set_route(Arc::clone(&route.handlers), Some(Arc::clone(&route.full_path)));
                ctx.next();
                if let Err(e) = ctx.writer_mut().write_header_now() {
                    error!(cause = %e, %method, path = %path, "failed to write response head");
                }
                return;
            }
        }

        if self.config.handle_method_not_allowed {
            let allowed = self.allowed_methods(&method, &path);
            if !allowed.is_empty() {
                if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                    ctx.header(ALLOW, value);
                }
                ctx.set_route(Arc::clone(&self.all_no_method), None);
                serve_error(ctx, StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_BODY);
                return;
            }
        }

        ctx.set_route(Arc::clone(&self.all_no_route), None);
        serve_error(ctx, StatusCode::NOT_FOUND, NOT_FOUND_BODY);
    }

    /// Methods other than `method` whose tree has a route for `path`.
    fn allowed_methods(&self, method: &Method, path: &str) -> Vec<&str> {
        let mut params = Params::empty();
        self.trees
            .iter()
            .filter(|tree| tree.method != *method)
            .filter(|tree| {
                params.clear();
                tree.root.get_value(path, &mut params, false).is_some()
            })
            .map(|tree| tree.method.as_str())
            .collect()
    }

    fn request_path<'u>(&self, uri: &'u Uri) -> Cow<'u, str> {
        if self.config.use_raw_path {
            Cow::Borrowed(uri.path())
        } else {
            percent_decode_str(uri.path()).decode_utf8_lossy()
        }
    }

    fn unescape_values(&self) -> bool {
        self.config.use_raw_path && self.config.unescape_path_values
    }
}

/// Runs the fallback chain with `status` staged, then writes the default body unless a handler
/// already wrote something or changed the status.
fn serve_error(ctx: &mut Context, status: StatusCode, body: &'static str) {
    ctx.status(status);
    ctx.next();
    if ctx.writer().written() {
        return;
    }

    let result = if ctx.writer().status_code() == status {
        ctx.string(status, body)
    } else {
        ctx.writer_mut().write_header_now()
    };
    if let Err(e) = result {
        error!(cause = %e, %status, "failed to write fallback response");
    }
}

/// Appends `handlers` to `base`, failing when the result would exceed the chain limit.
pub(crate) fn combine_handlers(
    base: &[RouteHandler],
    handlers: Vec<RouteHandler>,
    path: &str,
) -> Result<Vec<RouteHandler>, RouteError> {
    let count = base.len() + handlers.len();
    ensure!(count <= MAX_HANDLERS, RouteError::too_many_handlers(path, count, MAX_HANDLERS));

    let mut combined = Vec::with_capacity(count);
    combined.extend_from_slice(base);
    combined.extend(handlers);
    Ok(combined)
}
