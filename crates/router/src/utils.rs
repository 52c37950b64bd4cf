//! Utility macros and functions for the router crate.
//!
//! This module provides helper macros and path functions that are used internally
//! by route registration.

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
/// It's useful for validation checks where you want to return early with an error
/// if some condition is not satisfied.
///
/// # Arguments
///
/// * `$predicate` - A boolean expression that should evaluate to true
/// * `$error` - The error value to return if the predicate is false
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Joins a group base path with a relative route path.
///
/// The joined path is cleaned (see [`clean_path`]) and keeps the trailing slash of
/// `relative_path` when it has one, so `/api` + `users/` yields `/api/users/`.
pub(crate) fn join_paths(absolute_path: &str, relative_path: &str) -> String {
    if relative_path.is_empty() {
        return absolute_path.to_string();
    }

    let mut final_path = if absolute_path.is_empty() {
        clean_path(relative_path)
    } else {
        clean_path(&format!("{absolute_path}/{relative_path}"))
    };

    if relative_path.ends_with('/') && !final_path.ends_with('/') {
        final_path.push('/');
    }
    final_path
}

/// Returns the shortest path equivalent to `path` by lexical processing only:
/// repeated slashes collapse, `.` elements vanish, and `..` removes the element before it.
///
/// A rooted path never climbs above `/`. The empty path cleans to `.`.
pub(crate) fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
