//! Response recording on top of the transport's writer.
//!
//! The transport hands the router a [`ResponseWriter`]. Handlers never talk to it directly:
//! they go through a [`ResponseRecorder`], which stages the status code and headers until the
//! first header or body write commits them, and which remembers whether anything has been sent.
//! That knowledge is what lets the router add its fallback 404/405 bodies without writing twice.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::warn;

/// The outbound half of a transport connection, as seen by the router.
#[cfg_attr(test, mockall::automock)]
pub trait ResponseWriter: Send {
    /// Sends the status line and headers. Called at most once per request.
    fn write_head(&mut self, status: StatusCode, headers: &HeaderMap) -> io::Result<()>;

    /// Sends a chunk of the body. Only called after [`write_head`](ResponseWriter::write_head).
    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// Wraps the live [`ResponseWriter`] of one request.
///
/// The status code is mutable until the head is committed, which happens on the first call to
/// [`write_header_now`](ResponseRecorder::write_header_now) or the first body write. From then on
/// the status is frozen and header changes no longer reach the wire.
///
/// A recorder with no writer (see [`Context::copy`](crate::Context::copy)) is inert: every
/// write fails with [`io::ErrorKind::NotConnected`] and nothing is recorded.
pub struct ResponseRecorder {
    out: Option<Box<dyn ResponseWriter>>,
    status: StatusCode,
    headers: HeaderMap,
    header_written: bool,
    body_written: bool,
    size: usize,
}

impl ResponseRecorder {
    pub(crate) fn new() -> Self {
        Self {
            out: None,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            header_written: false,
            body_written: false,
            size: 0,
        }
    }

    /// Rebinds the recorder to the writer of a new request, clearing all staged state.
    pub(crate) fn bind(&mut self, out: Box<dyn ResponseWriter>) {
        self.out = Some(out);
        self.status = StatusCode::OK;
        self.headers.clear();
        self.header_written = false;
        self.body_written = false;
        self.size = 0;
    }

    pub(crate) fn release(&mut self) -> Option<Box<dyn ResponseWriter>> {
        self.out.take()
    }

    /// Returns a writer-less recorder carrying the same staged state.
    pub(crate) fn detached(&self) -> Self {
        Self {
            out: None,
            status: self.status,
            headers: self.headers.clone(),
            header_written: self.header_written,
            body_written: self.body_written,
            size: self.size,
        }
    }

    /// Stages the status code to send. Ignored once the head has been committed.
    pub fn status(&mut self, status: StatusCode) {
        if self.header_written {
            warn!(current = %self.status, ignored = %status, "headers were already written, status change ignored");
            return;
        }
        self.status = status;
    }

    /// The staged status, or the committed one once the head has been written
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Staged response headers. Changes made after the head was committed are not sent.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Commits the staged status and headers if that has not happened yet.
    pub fn write_header_now(&mut self) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }

        let out = self.out.as_mut().ok_or_else(detached_error)?;
        out.write_head(self.status, &self.headers)?;
        self.header_written = true;
        Ok(())
    }

    /// Whether the head has been committed.
    pub fn written(&self) -> bool {
        self.header_written
    }

    /// Whether any body write went through.
    pub fn body_written(&self) -> bool {
        self.body_written
    }

    /// Number of body bytes written so far
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether this recorder has no live writer behind it.
    pub fn is_detached(&self) -> bool {
        self.out.is_none()
    }
}

impl io::Write for ResponseRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_header_now()?;

        let out = self.out.as_mut().ok_or_else(detached_error)?;
        out.write_body(buf)?;
        self.body_written = true;
        self.size += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Debug for ResponseRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseRecorder")
            .field("detached", &self.is_detached())
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("header_written", &self.header_written)
            .field("body_written", &self.body_written)
            .field("size", &self.size)
            .finish()
    }
}

fn detached_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "response writer is detached from the request")
}

/// An in-memory [`ResponseWriter`] that collects one response.
///
/// Cloning yields another handle to the same buffer, so a transport can hand one clone to the
/// router and turn the other into an `http::Response` once dispatch returns.
#[derive(Debug, Clone, Default)]
pub struct ResponseBuffer {
    inner: Arc<Mutex<BufferedResponse>>,
}

#[derive(Debug, Default)]
struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, if the head has been written
    pub fn status(&self) -> Option<StatusCode> {
        self.inner.lock().status
    }

    /// Takes the buffered response out. A response whose head was never written reports 200.
    pub fn into_response(self) -> Response<Bytes> {
        let mut inner = self.inner.lock();

        let mut response = Response::new(inner.body.split().freeze());
        *response.status_mut() = inner.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = std::mem::take(&mut inner.headers);
        response
    }
}

impl ResponseWriter for ResponseBuffer {
    fn write_head(&mut self, status: StatusCode, headers: &HeaderMap) -> io::Result<()> {
        let mut inner = self.inner.lock();
        inner.status = Some(status);
        inner.headers = headers.clone();
        Ok(())
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.inner.lock().body.extend_from_slice(chunk);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{MockResponseWriter, ResponseBuffer, ResponseRecorder};
    use http::header::CONTENT_TYPE;
    use http::{HeaderValue, StatusCode};
    use std::io::{self, Write};

    fn bound(buffer: &ResponseBuffer) -> ResponseRecorder {
        let mut recorder = ResponseRecorder::new();
        recorder.bind(Box::new(buffer.clone()));
        recorder
    }

    #[test]
    fn test_status_is_staged_until_first_write() {
        let buffer = ResponseBuffer::new();
        let mut recorder = bound(&buffer);

        recorder.status(StatusCode::CREATED);
        recorder.status(StatusCode::ACCEPTED);
        assert!(!recorder.written());
        assert_eq!(buffer.status(), None);

        recorder.write_all(b"done").unwrap();
        assert!(recorder.written());
        assert!(recorder.body_written());
        assert_eq!(recorder.size(), 4);

        recorder.status(StatusCode::NOT_FOUND);
        assert_eq!(recorder.status_code(), StatusCode::ACCEPTED);

        let response = buffer.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body().as_ref(), b"done");
    }

    #[test]
    fn test_write_header_now_defaults_to_ok() {
        let buffer = ResponseBuffer::new();
        let mut recorder = bound(&buffer);
        recorder.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        recorder.write_header_now().unwrap();
        recorder.write_header_now().unwrap();
        assert!(recorder.written());
        assert!(!recorder.body_written());

        let response = buffer.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_head_is_committed_exactly_once() {
        let mut writer = MockResponseWriter::new();
        writer
            .expect_write_head()
            .withf(|status, _headers| *status == StatusCode::CREATED)
            .times(1)
            .returning(|_, _| Ok(()));
        writer.expect_write_body().withf(|chunk| chunk == b"hello").times(2).returning(|_| Ok(()));

        let mut recorder = ResponseRecorder::new();
        recorder.bind(Box::new(writer));
        recorder.status(StatusCode::CREATED);
        recorder.write_all(b"hello").unwrap();
        recorder.write_all(b"hello").unwrap();
        assert_eq!(recorder.size(), 10);
    }

    #[test]
    fn test_failed_head_write_leaves_recorder_uncommitted() {
        let mut writer = MockResponseWriter::new();
        writer.expect_write_head().times(1).returning(|_, _| Err(io::Error::from(io::ErrorKind::BrokenPipe)));

        let mut recorder = ResponseRecorder::new();
        recorder.bind(Box::new(writer));
        let error = recorder.write_all(b"lost").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
        assert!(!recorder.written());
        assert!(!recorder.body_written());
    }

    #[test]
    fn test_detached_recorder_is_inert() {
        let buffer = ResponseBuffer::new();
        let mut recorder = bound(&buffer);
        recorder.status(StatusCode::IM_A_TEAPOT);

        let mut detached = recorder.detached();
        assert!(detached.is_detached());
        assert_eq!(detached.status_code(), StatusCode::IM_A_TEAPOT);

        let error = detached.write_all(b"late").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotConnected);
        assert!(!detached.written());
        assert_eq!(buffer.status(), None);
    }

    #[test]
    fn test_bind_resets_state() {
        let buffer = ResponseBuffer::new();
        let mut recorder = bound(&buffer);
        recorder.status(StatusCode::BAD_GATEWAY);
        recorder.write_all(b"x").unwrap();

        assert!(recorder.release().is_some());
        recorder.bind(Box::new(ResponseBuffer::new()));
        assert_eq!(recorder.status_code(), StatusCode::OK);
        assert!(!recorder.written());
        assert_eq!(recorder.size(), 0);
    }
}
