//! An embeddable HTTP router with middleware chains
//!
//! This crate matches a request's method and path against a table of registered routes, binds
//! the path parameters, and runs the route's handler chain against a pooled per-request
//! [`Context`]. It does no I/O of its own: a transport hands each request head to
//! [`Router::serve`] together with a [`ResponseWriter`], or uses [`Router::respond`] to get an
//! `http::Response` back.
//!
//! # Features
//!
//! - One prefix tree per HTTP method with static, `:param` and `*catch_all` segments
//! - Wildcard conflicts detected at registration time
//! - Middleware that wraps the rest of the chain through [`Context::next`], and short-circuits
//!   it with [`Context::abort`]
//! - Route groups sharing a path prefix and middleware
//! - Pooled contexts with a request-scoped key/value store
//! - 404 and optional 405 fallbacks with customizable handler chains
//! - Access logging and panic recovery middleware
//!
//! # Example
//!
//! ```
//! use http::{Request, StatusCode};
//! use micro_router::{named, Context, RouteError, Router, Routes};
//!
//! fn show_user(ctx: &mut Context) {
//!     let id = ctx.param("id").unwrap_or_default().to_string();
//!     if let Err(e) = ctx.string(StatusCode::OK, format!("user {id}")) {
//!         tracing::warn!(cause = %e, "failed to write response");
//!     }
//! }
//!
//! fn main() -> Result<(), RouteError> {
//!     let mut router = Router::new();
//!     let mut api = router.group("/api", named("auth", |ctx: &mut Context| ctx.next()))?;
//!     api.get("/users/:id", micro_router::handler_fn(show_user))?;
//!
//!     let response = router.respond(Request::get("/api/users/42").body(()).unwrap());
//!     assert_eq!(response.status(), StatusCode::OK);
//!     assert_eq!(response.body().as_ref(), b"user 42");
//!     Ok(())
//! }
//! ```

mod context;
mod error;
mod handler;
mod params;
mod pool;
mod request;
mod response;
mod router;
mod tree;
mod utils;

pub mod middleware;

pub use context::Context;
pub use context::MAX_HANDLERS;
pub use error::RouteError;
pub use handler::handler_fn;
pub use handler::named;
pub use handler::Handler;
pub use handler::HandlersChain;
pub use handler::IntoHandlers;
pub use handler::RouteHandler;
pub use params::Param;
pub use params::Params;
pub use request::RequestHead;
pub use response::ResponseBuffer;
pub use response::ResponseRecorder;
pub use response::ResponseWriter;
pub use router::Resolved;
pub use router::RouteGroup;
pub use router::RouteInfo;
pub use router::Router;
pub use router::RouterConfig;
pub use router::Routes;
