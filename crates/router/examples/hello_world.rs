use http::{Request, StatusCode};
use micro_router::middleware::{logger_with_config, recovery, LoggerConfig};
use micro_router::{handler_fn, named, Context, RouteError, Router, RouterConfig, Routes};
use serde::Serialize;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Serialize, Debug)]
struct User {
    id: String,
    name: String,
}

fn index(ctx: &mut Context) {
    if let Err(e) = ctx.string(StatusCode::OK, "hello world\r\n") {
        error!(cause = %e, "failed to write response");
    }
}

fn show_user(ctx: &mut Context) {
    let user = User { id: ctx.param("id").unwrap_or_default().to_string(), name: ctx.get_string("user") };
    if let Err(e) = ctx.json(StatusCode::OK, &user) {
        error!(cause = %e, "failed to write response");
    }
}

fn download(ctx: &mut Context) {
    let file = ctx.param("file").unwrap_or_default().to_string();
    if let Err(e) = ctx.string(StatusCode::OK, format!("serving {file}\r\n")) {
        error!(cause = %e, "failed to write response");
    }
}

fn authenticate(ctx: &mut Context) {
    match ctx.request().headers().get("x-user").and_then(|value| value.to_str().ok()) {
        Some(user) => {
            let user = user.to_string();
            ctx.set("user", user);
            ctx.next();
        }
        None => ctx.abort_with_status(StatusCode::UNAUTHORIZED),
    }
}

fn build_router() -> Result<Router, RouteError> {
    let config = RouterConfig { handle_method_not_allowed: true, ..RouterConfig::default() };
    let mut router = Router::with_config(config);
    router.use_middleware([logger_with_config(LoggerConfig::new().skip_paths(["/health"])), recovery()])?;

    router.get("/", handler_fn(index))?;
    router.get("/health", named("health", |_ctx: &mut Context| {}))?;
    router.get("/files/*file", handler_fn(download))?;

    let mut api = router.group("/api/v1", handler_fn(authenticate))?;
    api.get("/users/:id", handler_fn(show_user))?;
    api.handle("DELETE", "/users/:id", named("delete_user", |ctx: &mut Context| ctx.status(StatusCode::NO_CONTENT)))?;

    Ok(router)
}

fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let router = match build_router() {
        Ok(router) => router,
        Err(e) => {
            error!(cause = %e, "invalid route table");
            return;
        }
    };

    for route in router.routes() {
        info!(method = %route.method(), path = route.path(), handler = route.handler(), "route");
    }

    let requests = [
        Request::get("/").body(()),
        Request::get("/files/css/site.css").body(()),
        Request::get("/api/v1/users/42").header("x-user", "alice").body(()),
        Request::get("/api/v1/users/42").body(()),
        Request::post("/").body(()),
        Request::get("/missing").body(()),
    ];

    for request in requests {
        let request = request.expect("request should be valid");
        let path = request.uri().path().to_string();
        let response = router.respond(request);
        info!(
            path = %path,
            status = %response.status(),
            body = %String::from_utf8_lossy(response.body()),
            "response"
        );
    }
}
