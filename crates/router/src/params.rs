//! Path parameters extracted from a matched route.
//!
//! A [`Params`] set is ordered: parameters appear in the order their wildcards appear in the
//! registered pattern, so `/users/:id/posts/:post_id` always yields `id` before `post_id`.

use std::slice;
use std::sync::Arc;

/// A single named path parameter and the value it was bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    key: Arc<str>,
    value: String,
}

impl Param {
    /// Returns the wildcard name as written in the pattern, without the leading `:` or `*`
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the path fragment bound to this parameter
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Represents path parameters extracted from the URL path of an HTTP request.
///
/// For example, in the pattern "/users/:id", "id" is a path parameter, and resolving
/// "/users/42" binds it to "42".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: Vec<Param>,
}

impl Params {
    /// Creates an empty parameter set
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if there are no path parameters
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of path parameters
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Gets the value of a path parameter by its name
    /// Returns None if the parameter doesn't exist
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.inner.iter().find(|param| param.key() == key).map(Param::value)
    }

    /// Iterates the parameters in pattern declaration order
    pub fn iter(&self) -> slice::Iter<'_, Param> {
        self.inner.iter()
    }

    pub(crate) fn push(&mut self, key: Arc<str>, value: String) {
        self.inner.push(Param { key, value });
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.inner.truncate(len);
    }

    /// Drops every binding but keeps the allocation for the next request
    pub(crate) fn clear(&mut self) {
        self.inner.clear();
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
