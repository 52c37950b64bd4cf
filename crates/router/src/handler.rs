use crate::Context;
use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A request handler or middleware.
///
/// Handlers run synchronously against the live [`Context`]. Middleware is just a handler that
/// calls [`Context::next`] somewhere in its body to run the rest of the chain.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: &mut Context);
}

impl<F> Handler for F
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    #[inline]
    fn call(&self, ctx: &mut Context) {
        (self)(ctx);
    }
}

/// A registered handler together with the name reported by [`Router::routes`](crate::Router::routes).
#[derive(Clone)]
pub struct RouteHandler {
    name: Cow<'static, str>,
    inner: Arc<dyn Handler>,
}

impl RouteHandler {
    pub fn new(name: impl Into<Cow<'static, str>>, handler: impl Handler) -> Self {
        Self { name: name.into(), inner: Arc::new(handler) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn call(&self, ctx: &mut Context) {
        self.inner.call(ctx);
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandler").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Wraps a function as a [`RouteHandler`] named after the function's type.
pub fn handler_fn<F>(f: F) -> RouteHandler
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    RouteHandler::new(type_name::<F>(), f)
}

/// Wraps a function as a [`RouteHandler`] with an explicit name.
pub fn named<F>(name: impl Into<Cow<'static, str>>, f: F) -> RouteHandler
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    RouteHandler::new(name, f)
}

/// The handler chain stored at a route, shared by every request that matches it.
pub type HandlersChain = Arc<[RouteHandler]>;

/// Returns the name of the last handler in the chain, i.e. the route's own handler.
pub(crate) fn last_name(chain: &[RouteHandler]) -> &str {
    chain.last().map_or("", RouteHandler::name)
}

/// Conversion into the ordered handler list accepted by registration methods.
pub trait IntoHandlers {
    fn into_handlers(self) -> Vec<RouteHandler>;
}

impl IntoHandlers for RouteHandler {
    fn into_handlers(self) -> Vec<RouteHandler> {
        vec![self]
    }
}

impl IntoHandlers for Vec<RouteHandler> {
    fn into_handlers(self) -> Vec<RouteHandler> {
        self
    }
}

impl<const N: usize> IntoHandlers for [RouteHandler; N] {
    fn into_handlers(self) -> Vec<RouteHandler> {
        self.into()
    }
}

impl IntoHandlers for &[RouteHandler] {
    fn into_handlers(self) -> Vec<RouteHandler> {
        self.to_vec()
    }
}

impl IntoHandlers for () {
    fn into_handlers(self) -> Vec<RouteHandler> {
        Vec::new()
    }
}
