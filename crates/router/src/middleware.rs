//! Ready-made middleware: an access logger and panic recovery.
//!
//! Both are plain [`RouteHandler`](crate::RouteHandler)s that call [`Context::next`](crate::Context::next)
//! around the rest of the chain, so they can be installed with `use_middleware` on a router or a
//! group, or put in front of a single route.

mod logger;
mod recovery;

pub use logger::{logger, logger_with_config, LoggerConfig};
pub use recovery::recovery;
