use super::{combine_handlers, Router};
use crate::error::RouteError;
use crate::handler::{IntoHandlers, RouteHandler};
use crate::utils::{ensure, join_paths};
use http::Method;

/// Methods registered by [`Routes::any`].
const ANY_METHODS: [Method; 9] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
    Method::HEAD,
    Method::CONNECT,
    Method::TRACE,
];

macro_rules! method_routes {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            #[doc = concat!("Registers a `", stringify!($method), "` route.")]
            fn $name(&mut self, relative_path: &str, handlers: impl IntoHandlers) -> Result<&mut Self, RouteError> {
                self.handle_chain(Method::$method, relative_path, handlers.into_handlers())
            }
        )*
    };
}

/// The registration surface shared by [`Router`] and [`RouteGroup`].
///
/// Paths are relative to the implementor's base path, which is `/` for the router itself, and
/// handlers are appended to the implementor's middleware.
pub trait Routes {
    /// The prefix prepended to every relative path.
    fn base_path(&self) -> &str;

    /// Registers `handlers` under `relative_path` for `method`.
    fn handle_chain(
        &mut self,
        method: Method,
        relative_path: &str,
        handlers: Vec<RouteHandler>,
    ) -> Result<&mut Self, RouteError>;

    /// Appends middleware for the routes registered after this call.
    fn use_middleware(&mut self, middleware: impl IntoHandlers) -> Result<&mut Self, RouteError>;

    /// Creates a group whose routes share the prefix `relative_path` and run `handlers` first.
    fn group(&mut self, relative_path: &str, handlers: impl IntoHandlers) -> Result<RouteGroup<'_>, RouteError>;

    /// Registers a route for a method given by name, e.g. `"GET"` or a custom `"LINK"`.
    ///
    /// The name must consist of ASCII uppercase letters only.
    fn handle(
        &mut self,
        method: &str,
        relative_path: &str,
        handlers: impl IntoHandlers,
    ) -> Result<&mut Self, RouteError> {
        ensure!(!method.is_empty(), RouteError::EmptyMethod);
        ensure!(method.bytes().all(|b| b.is_ascii_uppercase()), RouteError::invalid_method(method));

        let Ok(parsed) = Method::from_bytes(method.as_bytes()) else {
            return Err(RouteError::invalid_method(method));
        };
        self.handle_chain(parsed, relative_path, handlers.into_handlers())
    }

    method_routes! {
        get => GET,
        post => POST,
        put => PUT,
        delete => DELETE,
        patch => PATCH,
        options => OPTIONS,
        head => HEAD,
    }

    /// Registers the same handlers under every standard method, `CONNECT` and `TRACE` included.
    fn any(&mut self, relative_path: &str, handlers: impl IntoHandlers) -> Result<&mut Self, RouteError> {
        let handlers = handlers.into_handlers();
        for method in ANY_METHODS {
            self.handle_chain(method, relative_path, handlers.clone())?;
        }
        Ok(self)
    }
}

impl Routes for Router {
    fn base_path(&self) -> &str {
        "/"
    }

    fn handle_chain(
        &mut self,
        method: Method,
        relative_path: &str,
        handlers: Vec<RouteHandler>,
    ) -> Result<&mut Self, RouteError> {
        let absolute_path = join_paths("/", relative_path);
        let handlers = combine_handlers(&self.middleware, handlers, &absolute_path)?;
        self.add_route(method, &absolute_path, handlers)?;
        Ok(self)
    }

    fn use_middleware(&mut self, middleware: impl IntoHandlers) -> Result<&mut Self, RouteError> {
        let middleware = combine_handlers(&self.middleware, middleware.into_handlers(), "/")?;
        let all_no_route = combine_handlers(&middleware, self.no_route.clone(), "no route")?;
        let all_no_method = combine_handlers(&middleware, self.no_method.clone(), "no method")?;

        self.middleware = middleware;
        self.all_no_route = all_no_route.into();
        self.all_no_method = all_no_method.into();
        Ok(self)
    }

    fn group(&mut self, relative_path: &str, handlers: impl IntoHandlers) -> Result<RouteGroup<'_>, RouteError> {
        let base_path = join_paths("/", relative_path);
        let handlers = combine_handlers(&self.middleware, handlers.into_handlers(), &base_path)?;
        Ok(RouteGroup { router: self, base_path, handlers })
    }
}

/// A set of routes sharing a path prefix and middleware.
///
/// A group snapshots its parent's middleware when it is created; middleware added to the parent
/// later does not reach it.
#[derive(Debug)]
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    base_path: String,
    handlers: Vec<RouteHandler>,
}

impl RouteGroup<'_> {
    /// The middleware prepended to every route of the group
    pub fn handlers(&self) -> &[RouteHandler] {
        &self.handlers
    }
}

impl Routes for RouteGroup<'_> {
    fn base_path(&self) -> &str {
        &self.base_path
    }

    fn handle_chain(
        &mut self,
        method: Method,
        relative_path: &str,
        handlers: Vec<RouteHandler>,
    ) -> Result<&mut Self, RouteError> {
        let absolute_path = join_paths(&self.base_path, relative_path);
        let handlers = combine_handlers(&self.handlers, handlers, &absolute_path)?;
        self.router.add_route(method, &absolute_path, handlers)?;
        Ok(self)
    }

    fn use_middleware(&mut self, middleware: impl IntoHandlers) -> Result<&mut Self, RouteError> {
        self.handlers = combine_handlers(&self.handlers, middleware.into_handlers(), &self.base_path)?;
        Ok(self)
    }

    fn group(&mut self, relative_path: &str, handlers: impl IntoHandlers) -> Result<RouteGroup<'_>, RouteError> {
        let base_path = join_paths(&self.base_path, relative_path);
        let handlers = combine_handlers(&self.handlers, handlers.into_handlers(), &base_path)?;
        Ok(RouteGroup { router: &mut *self.router, base_path, handlers })
    }
}

#[cfg(test)]
mod tests {
    use super::Routes;
    use crate::context::MAX_HANDLERS;
    use crate::error::RouteError;
    use crate::handler::{named, RouteHandler};
    use crate::router::Router;
    use crate::Context;
    use http::{Request, StatusCode};
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn record(trace: &Trace, label: &'static str) -> RouteHandler {
        let trace = Arc::clone(trace);
        named(label, move |_ctx: &mut Context| trace.lock().push(label.to_string()))
    }

    fn noop(name: &'static str) -> RouteHandler {
        named(name, |_ctx: &mut Context| {})
    }

    fn sorted_paths(router: &Router) -> Vec<String> {
        let mut paths: Vec<String> = router.routes().iter().map(|route| route.path().to_string()).collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_group_prefixes_and_middleware() {
        let trace = Trace::default();
        let mut router = Router::new();
        router.use_middleware(record(&trace, "root")).unwrap();

        let mut api = router.group("/api", record(&trace, "api")).unwrap();
        assert_eq!(api.base_path(), "/api");
        let names: Vec<&str> = api.handlers().iter().map(RouteHandler::name).collect();
        assert_eq!(names, vec!["root", "api"]);
        api.get("users/:id", record(&trace, "user")).unwrap();
        assert_eq!(api.handlers().len(), 2);

        let mut v1 = api.group("v1/", record(&trace, "v1")).unwrap();
        assert_eq!(v1.base_path(), "/api/v1/");
        v1.use_middleware(record(&trace, "late")).unwrap();
        let names: Vec<&str> = v1.handlers().iter().map(RouteHandler::name).collect();
        assert_eq!(names, vec!["root", "api", "v1", "late"]);
        v1.post("items", record(&trace, "items")).unwrap();

        router.respond(Request::get("/api/users/42").body(()).unwrap());
        assert_eq!(*trace.lock(), vec!["root", "api", "user"]);

        trace.lock().clear();
        router.respond(Request::post("/api/v1/items").body(()).unwrap());
        assert_eq!(*trace.lock(), vec!["root", "api", "v1", "late", "items"]);
    }

    #[test]
    fn test_group_snapshots_parent_middleware() {
        let trace = Trace::default();
        let mut router = Router::new();
        let mut group = router.group("/admin", ()).unwrap();
        group.get("/", record(&trace, "admin")).unwrap();

        router.use_middleware(record(&trace, "after")).unwrap();
        router.get("/", record(&trace, "index")).unwrap();

        router.respond(Request::get("/admin/").body(()).unwrap());
        assert_eq!(*trace.lock(), vec!["admin"]);

        trace.lock().clear();
        router.respond(Request::get("/").body(()).unwrap());
        assert_eq!(*trace.lock(), vec!["after", "index"]);
    }

    #[test]
    fn test_paths_are_cleaned() {
        let mut router = Router::new();
        let mut group = router.group("/api//v1/../v2", ()).unwrap();
        group.get("./users/", noop("users")).unwrap();
        group.get("", noop("root")).unwrap();
        router.get("health", noop("health")).unwrap();

        assert_eq!(sorted_paths(&router), ["/api/v2", "/api/v2/users/", "/health"]);
    }

    #[test]
    fn test_handle_validates_method_name() {
        let mut router = Router::new();
        assert_eq!(router.handle("", "/", noop("x")).err(), Some(RouteError::EmptyMethod));
        assert_eq!(router.handle("get", "/", noop("x")).err(), Some(RouteError::invalid_method("get")));
        assert_eq!(router.handle("GET1", "/", noop("x")).err(), Some(RouteError::invalid_method("GET1")));

        router.handle("LINK", "/resource", noop("link")).unwrap();
        let response = router.respond(Request::builder().method("LINK").uri("/resource").body(()).unwrap());
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_any_registers_every_method() {
        let mut router = Router::new();
        router.any("/ping", noop("ping")).unwrap();

        let methods: Vec<String> = router.routes().iter().map(|route| route.method().to_string()).collect();
        assert_eq!(methods, ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "HEAD", "CONNECT", "TRACE"]);
        assert!(router.routes().iter().all(|route| route.handler() == "ping"));
    }

    #[test]
    fn test_group_rejects_chains_over_the_limit() {
        let mut router = Router::new();
        let middleware: Vec<RouteHandler> = (0..MAX_HANDLERS).map(|_| noop("mw")).collect();
        let mut group = router.group("/deep", middleware).unwrap();

        assert_eq!(
            group.get("/leaf", noop("leaf")).err(),
            Some(RouteError::too_many_handlers("/deep/leaf", MAX_HANDLERS + 1, MAX_HANDLERS))
        );
        assert!(group.use_middleware(noop("one-more")).is_err());
        assert!(router.routes().is_empty());
    }
}
