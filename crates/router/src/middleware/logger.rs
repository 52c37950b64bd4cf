use crate::handler::{named, RouteHandler};
use crate::Context;
use colored::{ColoredString, Colorize};
use http::{Method, StatusCode};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Where access records go.
enum Output {
    /// One `info` event per request on the `micro_router::access` target.
    Tracing,
    /// One text line per request.
    Writer { sink: Mutex<Box<dyn Write + Send>>, colored: bool },
}

/// Options of the access-log middleware.
///
/// ```
/// use micro_router::middleware::{logger_with_config, LoggerConfig};
///
/// let access_log = logger_with_config(LoggerConfig::new().skip_paths(["/health"]).writer(std::io::stdout(), true));
/// ```
pub struct LoggerConfig {
    skip_paths: Vec<String>,
    output: Output,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerConfig {
    /// Logs every request as a tracing event.
    pub fn new() -> Self {
        Self { skip_paths: Vec::new(), output: Output::Tracing }
    }

    /// Paths that are never logged, compared against the request path without its query.
    #[must_use]
    pub fn skip_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Writes one line per request to `sink`, with ANSI colors for status and method when
    /// `colored` is set. `NO_COLOR`, `CLICOLOR_FORCE` and `colored::control` still apply.
    #[must_use]
    pub fn writer(mut self, sink: impl Write + Send + 'static, colored: bool) -> Self {
        self.output = Output::Writer { sink: Mutex::new(Box::new(sink)), colored };
        self
    }
}

impl fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = match &self.output {
            Output::Tracing => "tracing",
            Output::Writer { colored: true, .. } => "writer (colored)",
            Output::Writer { colored: false, .. } => "writer",
        };
        f.debug_struct("LoggerConfig").field("skip_paths", &self.skip_paths).field("output", &output).finish()
    }
}

/// An access logger that emits tracing events.
pub fn logger() -> RouteHandler {
    logger_with_config(LoggerConfig::new())
}

/// An access logger configured by `config`.
///
/// The record is written after the rest of the chain returns, so it carries the final status and
/// the time spent downstream.
pub fn logger_with_config(config: LoggerConfig) -> RouteHandler {
    let skip: HashSet<String> = config.skip_paths.into_iter().collect();
    let output = config.output;

    named("micro_router::middleware::logger", move |ctx: &mut Context| {
        let start = Instant::now();
        ctx.next();

        let uri = ctx.request().uri();
        if skip.contains(uri.path()) {
            return;
        }

        let path = match uri.query() {
            Some(query) => format!("{}?{query}", uri.path()),
            None => uri.path().to_string(),
        };
        let entry = AccessEntry {
            status: ctx.writer().status_code(),
            latency: start.elapsed(),
            client_ip: ctx.client_ip(),
            method: ctx.request().method(),
            path: &path,
        };
        output.emit(&entry);
    })
}

struct AccessEntry<'a> {
    status: StatusCode,
    latency: Duration,
    client_ip: String,
    method: &'a Method,
    path: &'a str,
}

impl Output {
    fn emit(&self, entry: &AccessEntry<'_>) {
        match self {
            Output::Tracing => {
                info!(
                    target: "micro_router::access",
                    status = entry.status.as_u16(),
                    latency = ?entry.latency,
                    client_ip = %entry.client_ip,
                    method = %entry.method,
                    path = %entry.path,
                    "request served"
                );
            }
            Output::Writer { sink, colored } => {
                let line = format_line(entry, *colored);
                if let Err(e) = sink.lock().write_all(line.as_bytes()) {
                    warn!(cause = %e, "failed to write access log");
                }
            }
        }
    }
}

fn format_line(entry: &AccessEntry<'_>, colored: bool) -> String {
    let status = format!(" {:>3} ", entry.status.as_u16());
    let method = format!(" {:<7} ", entry.method.as_str());
    let (status, method) = if colored {
        (status_label(&status, entry.status), method_label(&method, entry.method))
    } else {
        (status.as_str().normal(), method.as_str().normal())
    };

    format!(
        "[ROUTER] |{status}| {:>13} | {:>15} |{method} {:?}\n",
        format!("{:?}", entry.latency),
        entry.client_ip,
        entry.path,
    )
}

fn status_label(label: &str, status: StatusCode) -> ColoredString {
    match status.as_u16() {
        200..300 => label.on_green().bright_white(),
        300..400 => label.on_white().bright_black(),
        400..500 => label.on_yellow().bright_black(),
        _ => label.on_red().bright_white(),
    }
}

fn method_label(label: &str, method: &Method) -> ColoredString {
    match *method {
        Method::GET => label.on_blue().bright_white(),
        Method::POST => label.on_cyan().bright_white(),
        Method::PUT => label.on_yellow().bright_black(),
        Method::DELETE => label.on_red().bright_white(),
        Method::PATCH => label.on_green().bright_white(),
        Method::HEAD => label.on_magenta().bright_white(),
        Method::OPTIONS => label.on_white().bright_black(),
        _ => label.normal(),
    }
}
