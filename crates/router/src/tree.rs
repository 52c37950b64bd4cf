//! Prefix tree that maps request paths to handler chains, one tree per HTTP method.
//!
//! Nodes own a path fragment. Static nodes hold a literal that must prefix the remaining path;
//! static siblings never share a first character, so at most one of them can match. Wildcards hang
//! off dedicated slots instead of the static child list:
//!
//! - a named parameter (`:name`) binds one path segment, up to the next `/`;
//! - a catch-all (`*name`) binds everything that remains, slashes included, and ends the pattern.
//!
//! Lookup prefers the literal, then the parameter, then the catch-all, and backtracks when a
//! branch dead-ends, so `/users/new` and `/users/:id` can be registered side by side.
//!
//! ```text
//! /users/:id/posts/:post_id
//! /users/new
//! /files/*rest
//!
//! ""
//! └── "/"
//!     ├── "users/"
//!     │   ├── "new"               [route]
//!     │   └── :id
//!     │       └── "/posts/"
//!     │           └── :post_id    [route]
//!     └── "files/"
//!         └── *rest               [route]
//! ```

use crate::error::RouteError;
use crate::handler::HandlersChain;
use crate::params::Params;
use crate::utils::ensure;
use http::Method;
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Static,
    Param,
    CatchAll,
}

/// A registered route: its handler chain and the pattern it was registered with.
#[derive(Debug, Clone)]
pub(crate) struct Route {
    pub(crate) handlers: HandlersChain,
    pub(crate) full_path: Arc<str>,
}

#[derive(Debug)]
pub(crate) struct RouteNode {
    /// The literal for static nodes, the wildcard name for the others
    segment: Arc<str>,
    kind: NodeKind,
    /// Number of routes registered in the subtree rooted here
    priority: u32,
    /// Static children, most routes first
    children: Vec<RouteNode>,
    param_child: Option<Box<RouteNode>>,
    catch_all_child: Option<Box<RouteNode>>,
    route: Option<Route>,
}

/// A validated piece of a route pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'p> {
    Static(&'p str),
    Param(&'p str),
    CatchAll(&'p str),
}

impl RouteNode {
    pub(crate) fn root() -> Self {
        Self::new(NodeKind::Static, "")
    }

    fn new(kind: NodeKind, segment: &str) -> Self {
        Self {
            segment: Arc::from(segment),
            kind,
            priority: 0,
            children: Vec::new(),
            param_child: None,
            catch_all_child: None,
            route: None,
        }
    }

    /// Registers `handlers` under the pattern `path`.
    ///
    /// Registering a pattern that already exists replaces its handler chain; the return value is
    /// `false` in that case. The pattern is validated before the tree is modified.
    pub(crate) fn add_route(&mut self, path: &str, handlers: HandlersChain) -> Result<bool, RouteError> {
        let pieces = parse_pattern(path)?;
        let route = Route { handlers, full_path: Arc::from(path) };
        self.insert(&pieces, path, route)
    }

    fn insert(&mut self, pieces: &[Piece<'_>], path: &str, route: Route) -> Result<bool, RouteError> {
        let inserted = match pieces.split_first() {
            None => match self.route.replace(route) {
                Some(previous) => {
                    warn!(path = %previous.full_path, "route registered twice, the last registration wins");
                    false
                }
                None => true,
            },

            Some((Piece::Static(literal), rest)) => self.insert_static(literal, rest, path, route)?,

            Some((Piece::Param(name), rest)) => {
                if let Some(child) = &self.param_child {
                    ensure!(&*child.segment == *name, child.conflict(path, ':', name));
                }
                let child = self.param_child.get_or_insert_with(|| Box::new(RouteNode::new(NodeKind::Param, name)));
                child.insert(rest, path, route)?
            }

            Some((Piece::CatchAll(name), rest)) => {
                if let Some(child) = &self.catch_all_child {
                    ensure!(&*child.segment == *name, child.conflict(path, '*', name));
                }
                let child =
                    self.catch_all_child.get_or_insert_with(|| Box::new(RouteNode::new(NodeKind::CatchAll, name)));
                child.insert(rest, path, route)?
            }
        };

        if inserted {
            self.priority += 1;
        }
        Ok(inserted)
    }

    fn insert_static(
        &mut self,
        literal: &str,
        rest: &[Piece<'_>],
        path: &str,
        route: Route,
    ) -> Result<bool, RouteError> {
        let first = literal.chars().next();
        let position = self.children.iter().position(|child| child.segment.chars().next() == first);

        let inserted = match position {
            Some(index) => {
                let child = &mut self.children[index];
                let common = common_prefix_len(&child.segment, literal);
                if common < child.segment.len() {
                    child.split_at(common);
                }

                let mut remaining = Vec::with_capacity(rest.len() + 1);
                if common < literal.len() {
                    remaining.push(Piece::Static(&literal[common..]));
                }
                remaining.extend_from_slice(rest);
                child.insert(&remaining, path, route)?
            }
            None => {
                let mut child = RouteNode::new(NodeKind::Static, literal);
                let inserted = child.insert(rest, path, route)?;
                self.children.push(child);
                inserted
            }
        };

        if inserted {
            // stable: equal priorities keep registration order
            self.children.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        Ok(inserted)
    }

    /// Splits a static node so that it keeps `segment[..at]` and a single child owns the rest,
    /// together with everything the node had before.
    fn split_at(&mut self, at: usize) {
        let tail = RouteNode {
            segment: Arc::from(&self.segment[at..]),
            kind: NodeKind::Static,
            priority: self.priority,
            children: std::mem::take(&mut self.children),
            param_child: self.param_child.take(),
            catch_all_child: self.catch_all_child.take(),
            route: self.route.take(),
        };
        self.segment = Arc::from(&self.segment[..at]);
        self.children = vec![tail];
    }

    fn conflict(&self, path: &str, marker: char, name: &str) -> RouteError {
        let existing = match self.kind {
            NodeKind::CatchAll => '*',
            NodeKind::Param | NodeKind::Static => ':',
        };
        RouteError::WildcardConflict {
            path: path.to_string(),
            wildcard: format!("{marker}{name}"),
            existing: format!("{existing}{}", self.segment),
            existing_path: self.first_route().map(|route| route.full_path.to_string()).unwrap_or_default(),
        }
    }

    fn first_route(&self) -> Option<&Route> {
        self.route.as_ref().or_else(|| {
            self.children
                .iter()
                .chain(self.param_child.as_deref())
                .chain(self.catch_all_child.as_deref())
                .find_map(RouteNode::first_route)
        })
    }

    /// Finds the route matching `path`, pushing the bound parameters onto `params`.
    ///
    /// On a miss `params` is left as it was. With `unescape` set, bound values are
    /// percent-decoded.
    pub(crate) fn get_value(&self, path: &str, params: &mut Params, unescape: bool) -> Option<&Route> {
        path.strip_prefix(&*self.segment).and_then(|rest| self.find(rest, params, unescape))
    }

    fn find(&self, path: &str, params: &mut Params, unescape: bool) -> Option<&Route> {
        if path.is_empty() {
            if let Some(route) = &self.route {
                return Some(route);
            }
        }

        if let Some(child) = self.children.iter().find(|child| path.starts_with(&*child.segment)) {
            if let Some(route) = child.find(&path[child.segment.len()..], params, unescape) {
                return Some(route);
            }
        }

        if let Some(child) = &self.param_child {
            let end = path.find('/').unwrap_or(path.len());
            if end > 0 {
                let mark = params.len();
                params.push(Arc::clone(&child.segment), decode(&path[..end], unescape));
                if let Some(route) = child.find(&path[end..], params, unescape) {
                    return Some(route);
                }
                params.truncate(mark);
            }
        }

        if let Some(child) = &self.catch_all_child {
            if let Some(route) = &child.route {
                params.push(Arc::clone(&child.segment), decode(path, unescape));
                return Some(route);
            }
        }

        None
    }

    /// Collects every route of the subtree in depth-first order.
    pub(crate) fn routes<'n>(&'n self, routes: &mut Vec<&'n Route>) {
        if let Some(route) = &self.route {
            routes.push(route);
        }
        for child in self.children.iter().chain(self.param_child.as_deref()).chain(self.catch_all_child.as_deref()) {
            child.routes(routes);
        }
    }
}

/// Length in bytes of the longest common prefix, always on a char boundary of both strings.
fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .take_while(|((_, x), y)| x == y)
        .last()
        .map_or(0, |((index, x), _)| index + x.len_utf8())
}

fn decode(value: &str, unescape: bool) -> String {
    if unescape {
        percent_decode_str(value).decode_utf8_lossy().into_owned()
    } else {
        value.to_string()
    }
}

/// Splits a pattern into static literals and wildcards, rejecting malformed patterns.
fn parse_pattern(path: &str) -> Result<Vec<Piece<'_>>, RouteError> {
    ensure!(path.starts_with('/'), RouteError::invalid_path(path));

    let mut pieces = Vec::new();
    let mut names: Vec<&str> = Vec::new();
    let mut rest = path;

    while !rest.is_empty() {
        let Some(start) = rest.find([':', '*']) else {
            pieces.push(Piece::Static(rest));
            break;
        };

        ensure!(rest[..start].ends_with('/'), RouteError::misplaced_wildcard(path));
        pieces.push(Piece::Static(&rest[..start]));

        let wildcard = &rest[start..];
        let end = wildcard.find('/').unwrap_or(wildcard.len());
        let segment = &wildcard[..end];
        let name = &segment[1..];

        ensure!(!name.is_empty(), RouteError::unnamed_wildcard(path));
        ensure!(!name.contains([':', '*']), RouteError::multiple_wildcards(path, segment));
        ensure!(!names.contains(&name), RouteError::duplicate_param(path, name));
        names.push(name);

        if segment.starts_with('*') {
            ensure!(end == wildcard.len(), RouteError::catch_all_not_last(path));
            pieces.push(Piece::CatchAll(name));
        } else {
            pieces.push(Piece::Param(name));
        }
        rest = &wildcard[end..];
    }

    Ok(pieces)
}

/// The root of one method's route tree.
#[derive(Debug)]
pub(crate) struct MethodTree {
    pub(crate) method: Method,
    pub(crate) root: RouteNode,
}

/// All method trees, created lazily on the first registration for a method.
#[derive(Debug, Default)]
pub(crate) struct MethodTrees {
    trees: Vec<MethodTree>,
}

impl MethodTrees {
    pub(crate) fn get(&self, method: &Method) -> Option<&RouteNode> {
        self.trees.iter().find(|tree| tree.method == *method).map(|tree| &tree.root)
    }

    pub(crate) fn get_or_create(&mut self, method: Method) -> &mut RouteNode {
        let index = match self.trees.iter().position(|tree| tree.method == method) {
            Some(index) => index,
            None => {
                self.trees.push(MethodTree { method, root: RouteNode::root() });
                self.trees.len() - 1
            }
        };
        &mut self.trees[index].root
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &MethodTree> {
        self.trees.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{common_prefix_len, parse_pattern, Piece, RouteNode};
    use crate::error::RouteError;
    use crate::handler::{last_name, named, HandlersChain};
    use crate::params::Params;
    use crate::Context;

    fn chain(name: &'static str) -> HandlersChain {
        HandlersChain::from(vec![named(name, |_ctx: &mut Context| {})])
    }

    fn tree(paths: &[&'static str]) -> RouteNode {
        let mut root = RouteNode::root();
        for &path in paths {
            root.add_route(path, chain(path)).unwrap();
        }
        root
    }

    /// Returns the name of the matched route's handler and the bound params.
    fn lookup(root: &RouteNode, path: &str) -> Option<(String, Vec<(String, String)>)> {
        let mut params = Params::empty();
        let route = root.get_value(path, &mut params, false)?;
        let params = params.iter().map(|p| (p.key().to_string(), p.value().to_string())).collect();
        Some((last_name(&route.handlers).to_string(), params))
    }

    fn pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_params_bound_in_declaration_order() {
        let root = tree(&["/users/:id/posts/:post_id", "/users/:id"]);

        let (name, params) = lookup(&root, "/users/42/posts/7").unwrap();
        assert_eq!(name, "/users/:id/posts/:post_id");
        assert_eq!(params, pairs(&[("id", "42"), ("post_id", "7")]));

        let (name, params) = lookup(&root, "/users/42").unwrap();
        assert_eq!(name, "/users/:id");
        assert_eq!(params, pairs(&[("id", "42")]));

        assert!(lookup(&root, "/users/").is_none());
        assert!(lookup(&root, "/users//posts/7").is_none());
        assert!(lookup(&root, "/users/42/posts").is_none());
    }

    #[test]
    fn test_catch_all_binds_remaining_path() {
        let root = tree(&["/files/*rest", "/"]);

        let (_, params) = lookup(&root, "/files/a/b/c").unwrap();
        assert_eq!(params, pairs(&[("rest", "a/b/c")]));

        let (_, params) = lookup(&root, "/files/").unwrap();
        assert_eq!(params, pairs(&[("rest", "")]));

        assert_eq!(lookup(&root, "/").unwrap().0, "/");
        assert!(lookup(&root, "/files").is_none());
    }

    #[test]
    fn test_static_wins_over_param_with_backtracking() {
        let root = tree(&["/users/:id", "/users/new", "/users/new/edit"]);

        assert_eq!(lookup(&root, "/users/new").unwrap().0, "/users/new");
        assert_eq!(lookup(&root, "/users/new/edit").unwrap().0, "/users/new/edit");

        let (name, params) = lookup(&root, "/users/newer").unwrap();
        assert_eq!(name, "/users/:id");
        assert_eq!(params, pairs(&[("id", "newer")]));
    }

    #[test]
    fn test_param_falls_back_to_catch_all() {
        let root = tree(&["/files/:name", "/files/*rest"]);

        let (name, params) = lookup(&root, "/files/a").unwrap();
        assert_eq!(name, "/files/:name");
        assert_eq!(params, pairs(&[("name", "a")]));

        let (name, params) = lookup(&root, "/files/a/b").unwrap();
        assert_eq!(name, "/files/*rest");
        assert_eq!(params, pairs(&[("rest", "a/b")]));
    }

    #[test]
    fn test_split_keeps_existing_routes() {
        let root = tree(&["/static", "/st/:x", "/stat", "/"]);

        assert_eq!(lookup(&root, "/static").unwrap().0, "/static");
        assert_eq!(lookup(&root, "/stat").unwrap().0, "/stat");
        assert_eq!(lookup(&root, "/").unwrap().0, "/");

        let (name, params) = lookup(&root, "/st/abc").unwrap();
        assert_eq!(name, "/st/:x");
        assert_eq!(params, pairs(&[("x", "abc")]));

        assert!(lookup(&root, "/sta").is_none());
        assert!(lookup(&root, "/statics").is_none());
    }

    #[test]
    fn test_conflicting_param_names() {
        let mut root = tree(&["/a/:x"]);

        let error = root.add_route("/a/:y", chain("/a/:y")).unwrap_err();
        assert_eq!(
            error,
            RouteError::WildcardConflict {
                path: "/a/:y".into(),
                wildcard: ":y".into(),
                existing: ":x".into(),
                existing_path: "/a/:x".into(),
            }
        );
        assert_eq!(lookup(&root, "/a/1").unwrap().1, pairs(&[("x", "1")]));

        root.add_route("/b/*x", chain("/b/*x")).unwrap();
        assert!(matches!(root.add_route("/b/*y", chain("/b/*y")), Err(RouteError::WildcardConflict { .. })));
    }

    #[test]
    fn test_duplicate_registration_overwrites() {
        let mut root = tree(&["/users/:id"]);
        let inserted = root.add_route("/users/:id", chain("second")).unwrap();

        assert!(!inserted);
        assert_eq!(root.priority, 1);
        assert_eq!(lookup(&root, "/users/1").unwrap().0, "second");
    }

    #[test]
    fn test_children_sorted_by_priority() {
        let root = tree(&["/a", "/b/1", "/b/2", "/b/3", "/c", "/c/1"]);
        let slash = &root.children[0];

        let order = slash.children.iter().map(|child| (&*child.segment, child.priority)).collect::<Vec<_>>();
        assert_eq!(order, vec![("b/", 3), ("c", 2), ("a", 1)]);
        assert_eq!(root.priority, 6);
    }

    #[test]
    fn test_unescaped_param_values() {
        let root = tree(&["/search/:term"]);
        let mut params = Params::empty();

        root.get_value("/search/a%20b", &mut params, true).unwrap();
        assert_eq!(params.get("term"), Some("a b"));

        params.clear();
        root.get_value("/search/a%20b", &mut params, false).unwrap();
        assert_eq!(params.get("term"), Some("a%20b"));
    }

    #[test]
    fn test_routes_enumeration() {
        let root = tree(&["/users/:id", "/users/new", "/files/*rest"]);
        let mut routes = Vec::new();
        root.routes(&mut routes);

        let mut paths = routes.iter().map(|route| &*route.full_path).collect::<Vec<_>>();
        paths.sort_unstable();
        assert_eq!(paths, vec!["/files/*rest", "/users/:id", "/users/new"]);
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!(
            parse_pattern("/users/:id/files/*path").unwrap(),
            vec![Piece::Static("/users/"), Piece::Param("id"), Piece::Static("/files/"), Piece::CatchAll("path")]
        );
        assert_eq!(parse_pattern("/").unwrap(), vec![Piece::Static("/")]);

        assert_eq!(parse_pattern("users").unwrap_err(), RouteError::invalid_path("users"));
        assert_eq!(parse_pattern("").unwrap_err(), RouteError::invalid_path(""));
        assert_eq!(parse_pattern("/users/:").unwrap_err(), RouteError::unnamed_wildcard("/users/:"));
        assert_eq!(parse_pattern("/user_:name").unwrap_err(), RouteError::misplaced_wildcard("/user_:name"));
        assert_eq!(parse_pattern("/:a:b").unwrap_err(), RouteError::multiple_wildcards("/:a:b", ":a:b"));
        assert_eq!(parse_pattern("/:id/x/:id").unwrap_err(), RouteError::duplicate_param("/:id/x/:id", "id"));
        assert_eq!(
            parse_pattern("/files/*rest/more").unwrap_err(),
            RouteError::catch_all_not_last("/files/*rest/more")
        );
    }

    #[test]
    fn test_multibyte_literals_split_on_char_boundaries() {
        // "é" and "è" share their first UTF-8 byte
        let root = tree(&["/café", "/cafè", "/café/:id", "/ñ", "/日本/:x", "/日曜"]);

        assert_eq!(lookup(&root, "/café").unwrap().0, "/café");
        assert_eq!(lookup(&root, "/cafè").unwrap().0, "/cafè");
        assert_eq!(lookup(&root, "/ñ").unwrap().0, "/ñ");
        assert_eq!(lookup(&root, "/日曜").unwrap().0, "/日曜");

        let (name, params) = lookup(&root, "/café/7").unwrap();
        assert_eq!(name, "/café/:id");
        assert_eq!(params, pairs(&[("id", "7")]));

        let (name, params) = lookup(&root, "/日本/東京").unwrap();
        assert_eq!(name, "/日本/:x");
        assert_eq!(params, pairs(&[("x", "東京")]));

        assert!(lookup(&root, "/caf").is_none());
        assert!(lookup(&root, "/cafe").is_none());
    }

    #[test]
    fn test_common_prefix_len_stops_before_a_partial_char() {
        assert_eq!(common_prefix_len("café", "cafè"), 3);
        assert_eq!(common_prefix_len("日本", "日曜"), "日".len());
        assert_eq!(common_prefix_len("abc", "abd"), 2);
        assert_eq!(common_prefix_len("", "abc"), 0);
        assert_eq!(common_prefix_len("é", "è"), 0);
    }
}
