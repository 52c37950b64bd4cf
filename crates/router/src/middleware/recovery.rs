use crate::handler::{named, RouteHandler};
use crate::Context;
use http::StatusCode;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

/// Catches panics raised by the rest of the chain.
///
/// The panic is logged and the chain is aborted. When nothing has been written yet the client
/// gets an empty `500 Internal Server Error`; otherwise the response is left as it is.
pub fn recovery() -> RouteHandler {
    named("micro_router::middleware::recovery", |ctx: &mut Context| {
        let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| ctx.next())) else {
            return;
        };

        error!(
            panic = panic_message(payload.as_ref()),
            method = %ctx.request().method(),
            path = ctx.request().uri().path(),
            "handler panicked, recovered"
        );
        if ctx.writer().written() {
            ctx.abort();
        } else {
            ctx.abort_with_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("Box<dyn Any>")
}

#[cfg(test)]
mod tests {
    use super::recovery;
    use crate::handler::named;
    use crate::router::{Router, Routes};
    use crate::Context;
    use http::{Request, StatusCode};
    use std::panic::AssertUnwindSafe;

    #[test]
    fn test_panic_becomes_internal_server_error() {
        let mut router = Router::new();
        router.use_middleware(recovery()).unwrap();
        router.get("/boom", named("boom", |_ctx: &mut Context| panic!("boom"))).unwrap();
        router.get("/ok", named("ok", |ctx: &mut Context| ctx.string(StatusCode::OK, "fine").unwrap())).unwrap();

        let response = router.respond(Request::get("/boom").body(()).unwrap());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body().is_empty());

        let response = router.respond(Request::get("/ok").body(()).unwrap());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"fine");
    }

    #[test]
    fn test_partial_response_is_kept() {
        let mut router = Router::new();
        router.use_middleware(recovery()).unwrap();
        router
            .get(
                "/partial",
                named("partial", |ctx: &mut Context| {
                    ctx.string(StatusCode::ACCEPTED, "started").unwrap();
                    panic!("late failure");
                }),
            )
            .unwrap();

        let response = router.respond(Request::get("/partial").body(()).unwrap());
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body().as_ref(), b"started");
    }

    #[test]
    fn test_panic_without_recovery_propagates() {
        let mut router = Router::new();
        router.get("/boom", named("boom", |_ctx: &mut Context| panic!("boom"))).unwrap();

        let result =
            std::panic::catch_unwind(AssertUnwindSafe(|| router.respond(Request::get("/boom").body(()).unwrap())));
        assert!(result.is_err());
    }
}
