use thiserror::Error;

/// Faults detected while building the route table.
///
/// Every variant is fatal for the table being built: the application is expected to propagate
/// it out of its setup code instead of serving traffic from a partially registered router.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("http method can not be empty")]
    EmptyMethod,

    #[error("http method {method:?} is not valid")]
    InvalidMethod { method: String },

    #[error("path must begin with '/', got {path:?}")]
    InvalidPath { path: String },

    #[error("there must be at least one handler for '{path}'")]
    EmptyHandlers { path: String },

    #[error("too many handlers for '{path}', current: {count} exceed the limit {max}")]
    TooManyHandlers { path: String, count: usize, max: usize },

    #[error("wildcards must be named with a non-empty name in path '{path}'")]
    UnnamedWildcard { path: String },

    #[error("wildcards must start a path segment in path '{path}'")]
    MisplacedWildcard { path: String },

    #[error("only one wildcard per path segment is allowed, has: '{segment}' in path '{path}'")]
    MultipleWildcards { path: String, segment: String },

    #[error("catch-all routes are only allowed at the end of the path in path '{path}'")]
    CatchAllNotLast { path: String },

    #[error("parameter '{name}' appears more than once in path '{path}'")]
    DuplicateParam { path: String, name: String },

    #[error(
        "wildcard '{wildcard}' in new path '{path}' conflicts with existing wildcard '{existing}' \
         in existing route '{existing_path}'"
    )]
    WildcardConflict { path: String, wildcard: String, existing: String, existing_path: String },
}

impl RouteError {
    pub fn invalid_method<S: ToString>(method: S) -> Self {
        Self::InvalidMethod { method: method.to_string() }
    }

    pub fn invalid_path<S: ToString>(path: S) -> Self {
        Self::InvalidPath { path: path.to_string() }
    }

    pub fn empty_handlers<S: ToString>(path: S) -> Self {
        Self::EmptyHandlers { path: path.to_string() }
    }

    pub fn too_many_handlers<S: ToString>(path: S, count: usize, max: usize) -> Self {
        Self::TooManyHandlers { path: path.to_string(), count, max }
    }

    pub fn unnamed_wildcard<S: ToString>(path: S) -> Self {
        Self::UnnamedWildcard { path: path.to_string() }
    }

    pub fn misplaced_wildcard<S: ToString>(path: S) -> Self {
        Self::MisplacedWildcard { path: path.to_string() }
    }

    pub fn multiple_wildcards<S: ToString, G: ToString>(path: S, segment: G) -> Self {
        Self::MultipleWildcards { path: path.to_string(), segment: segment.to_string() }
    }

    pub fn catch_all_not_last<S: ToString>(path: S) -> Self {
        Self::CatchAllNotLast { path: path.to_string() }
    }

    pub fn duplicate_param<S: ToString, N: ToString>(path: S, name: N) -> Self {
        Self::DuplicateParam { path: path.to_string(), name: name.to_string() }
    }
}
