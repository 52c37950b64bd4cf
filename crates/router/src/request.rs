//! The request head carried by a [`Context`](crate::Context).
//!
//! The router only needs the method, the URI and the headers of a request, plus the peer
//! address when the transport knows it. Bodies stay with the transport layer.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};
use std::net::SocketAddr;

/// Represents an HTTP request head.
///
/// Unlike `http::request::Parts` this type is cheap to reset and clone, which lets pooled
/// contexts reuse it and lets [`Context::copy`](crate::Context::copy) detach it.
#[derive(Debug, Clone, Default)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl RequestHead {
    /// Builds a head for `method` and `uri` with no headers
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri, ..Self::default() }
    }

    /// Records the peer address reported by the transport.
    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the peer address, if the transport provided one.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Converts request parts into a RequestHead.
impl From<Parts> for RequestHead {
    fn from(parts: Parts) -> Self {
        Self { method: parts.method, uri: parts.uri, version: parts.version, headers: parts.headers, remote_addr: None }
    }
}

/// Converts a request into a RequestHead, dropping its body.
impl<B> From<Request<B>> for RequestHead {
    fn from(request: Request<B>) -> Self {
        request.into_parts().0.into()
    }
}
