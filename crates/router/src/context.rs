//! Per-request state and the middleware chain that runs against it.
//!
//! A [`Context`] is drawn from the router's pool for every request, reset, filled with the
//! matched route's parameters and handler chain, and handed to the handlers one after another.
//! The chain is driven by a cursor:
//!
//! - [`Context::next`] advances the cursor and runs the remaining handlers in order. A handler
//!   may call it itself, which runs everything downstream before the handler continues, so
//!   middleware can wrap the rest of the chain.
//! - [`Context::abort`] moves the cursor to a sentinel past any legal chain length. No further
//!   handler starts, including from `next` loops of outer handlers still on the stack; handlers
//!   that are already running finish normally.

use crate::handler::{last_name, HandlersChain};
use crate::params::Params;
use crate::request::RequestHead;
use crate::response::{ResponseRecorder, ResponseWriter};
use http::header::{IntoHeaderName, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use mime::Mime;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::error;

/// Longest handler chain a route may register, group middleware included.
pub const MAX_HANDLERS: usize = 62;

/// Cursor value that stops the chain, larger than any chain index.
const ABORT_INDEX: isize = 63;

/// Cursor value before the first handler ran.
const BEFORE_START: isize = -1;

type Value = Arc<dyn Any + Send + Sync>;

/// The handlers of the matched route and the position of the one currently running.
struct MiddlewareChain {
    handlers: HandlersChain,
    index: isize,
}

impl MiddlewareChain {
    fn new() -> Self {
        Self { handlers: HandlersChain::from([]), index: BEFORE_START }
    }

    fn detached() -> Self {
        Self { handlers: HandlersChain::from([]), index: ABORT_INDEX }
    }

    fn reset(&mut self) {
        self.handlers = HandlersChain::from([]);
        self.index = BEFORE_START;
    }
}

/// Represents the context of an HTTP request: the request head, the path parameters, the
/// handler chain with its cursor, the response recorder, and a request-scoped key/value store.
pub struct Context {
    request: RequestHead,
    params: Params,
    full_path: Option<Arc<str>>,
    chain: MiddlewareChain,
    keys: Option<HashMap<String, Value>>,
    writer: ResponseRecorder,
}

impl Context {
    pub(crate) fn new() -> Self {
        Self {
            request: RequestHead::default(),
            params: Params::empty(),
            full_path: None,
            chain: MiddlewareChain::new(),
            keys: None,
            writer: ResponseRecorder::new(),
        }
    }

    /// Prepares a pooled context for a new request.
    pub(crate) fn reset(&mut self, request: RequestHead, out: Box<dyn ResponseWriter>) {
        self.request = request;
        self.params.clear();
        self.full_path = None;
        self.chain.reset();
        self.keys = None;
        self.writer.bind(out);
    }

    /// Drops the references a finished request still holds before the context goes idle.
    pub(crate) fn recycle(&mut self) {
        drop(self.writer.release());
        self.chain.reset();
    }

    pub(crate) fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub(crate) fn set_route(&mut self, handlers: HandlersChain, full_path: Option<Arc<str>>) {
        self.chain.handlers = handlers;
        self.full_path = full_path;
    }

    /// Returns the request head
    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    /// Returns the value bound to the named path parameter
    pub fn param(&self, key: impl AsRef<str>) -> Option<&str> {
        self.params.get(key)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the pattern of the matched route, e.g. `/users/:id`
    pub fn full_path(&self) -> Option<&str> {
        self.full_path.as_deref()
    }

    /// Returns the name of the route's own handler, the last one in the chain
    pub fn handler_name(&self) -> &str {
        last_name(&self.chain.handlers)
    }

    /// Runs the remaining handlers of the chain.
    ///
    /// Should only be called from inside middleware.
    pub fn next(&mut self) {
        if self.is_aborted() {
            return;
        }

        // the cursor never passes the chain length, so only `abort` can reach the sentinel
        let handlers = Arc::clone(&self.chain.handlers);
        let len = isize::try_from(handlers.len()).unwrap_or(ABORT_INDEX);
        self.chain.index = (self.chain.index + 1).min(len);
        while let Some(handler) = usize::try_from(self.chain.index).ok().and_then(|index| handlers.get(index)) {
            handler.call(self);
            if self.chain.index < len {
                self.chain.index += 1;
            }
        }
    }

    /// Prevents pending handlers from being called. The current handler keeps running.
    pub fn abort(&mut self) {
        self.chain.index = ABORT_INDEX;
    }

    pub fn is_aborted(&self) -> bool {
        self.chain.index >= ABORT_INDEX
    }

    /// Commits `status` with an empty body and aborts the chain.
    pub fn abort_with_status(&mut self, status: StatusCode) {
        self.writer.status(status);
        if let Err(e) = self.writer.write_header_now() {
            error!(cause = %e, %status, "failed to write response head");
        }
        self.abort();
    }

    /// Stores a value in the request-scoped store, replacing any previous value of the key.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.keys.get_or_insert_with(HashMap::new).insert(key.into(), Arc::new(value));
    }

    /// Returns the stored value if the key exists and holds a `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.keys.as_ref()?.get(key)?.downcast_ref::<T>()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.as_ref().is_some_and(|keys| keys.contains_key(key))
    }

    /// Returns a clone of the stored `T`, or `T::default()` when the key is absent or holds
    /// another type.
    pub fn get_or_default<T: Any + Send + Sync + Clone + Default>(&self, key: &str) -> T {
        self.get::<T>(key).cloned().unwrap_or_default()
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get_or_default(key)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get_or_default(key)
    }

    pub fn get_i64(&self, key: &str) -> i64 {
        self.get_or_default(key)
    }

    pub fn get_f64(&self, key: &str) -> f64 {
        self.get_or_default(key)
    }

    pub fn writer(&self) -> &ResponseRecorder {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut ResponseRecorder {
        &mut self.writer
    }

    /// Stages the response status.
    pub fn status(&mut self, status: StatusCode) {
        self.writer.status(status);
    }

    /// Stages a response header.
    pub fn header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.writer.headers_mut().insert(name, value);
    }

    /// Writes `body` as `text/plain` with the given status.
    pub fn string(&mut self, status: StatusCode, body: impl AsRef<str>) -> io::Result<()> {
        self.render(status, &mime::TEXT_PLAIN_UTF_8, body.as_ref().as_bytes())
    }

    /// Serializes `value` as the `application/json` body with the given status.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> io::Result<()> {
        let body = serde_json::to_vec(value).map_err(io::Error::other)?;
        self.render(status, &mime::APPLICATION_JSON, &body)
    }

    fn render(&mut self, status: StatusCode, mime: &Mime, body: &[u8]) -> io::Result<()> {
        if !self.writer.headers().contains_key(CONTENT_TYPE) {
            self.header(CONTENT_TYPE, content_type(mime));
        }
        self.writer.status(status);
        self.writer.write_all(body)
    }

    /// Returns the client address: the first `X-Forwarded-For` entry, else `X-Real-Ip`, else the
    /// peer address of the connection. Empty when none is known.
    pub fn client_ip(&self) -> String {
        let headers = self.request.headers();
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next());
        let real_ip = headers.get("x-real-ip").and_then(|value| value.to_str().ok());

        forwarded
            .into_iter()
            .chain(real_ip)
            .map(str::trim)
            .find(|ip| !ip.is_empty())
            .map(str::to_string)
            .or_else(|| self.request.remote_addr().map(|addr| addr.ip().to_string()))
            .unwrap_or_default()
    }

    /// Returns a detached copy that can outlive the request.
    ///
    /// The copy shares the parameters, the matched pattern and the key/value store as they are
    /// now. It has no handler chain, reports [`is_aborted`](Context::is_aborted), and its writer is
    /// inert, so it can neither resume the chain nor write to the client.
    #[must_use]
    pub fn copy(&self) -> Context {
        Context {
            request: self.request.clone(),
            params: self.params.clone(),
            full_path: self.full_path.clone(),
            chain: MiddlewareChain::detached(),
            keys: self.keys.clone(),
            writer: self.writer.detached(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = self.keys.as_ref().map(|keys| keys.keys().collect::<Vec<_>>());
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("params", &self.params)
            .field("full_path", &self.full_path)
            .field("handlers", &self.chain.handlers.len())
            .field("index", &self.chain.index)
            .field("keys", &keys)
            .field("writer", &self.writer)
            .finish()
    }
}

fn content_type(mime: &Mime) -> HeaderValue {
    HeaderValue::from_str(mime.as_ref()).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}
