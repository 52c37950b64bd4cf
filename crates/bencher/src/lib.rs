#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    routes: RouteSet,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, routes: RouteSet) -> Self {
        Self { name, group, routes }
    }

    pub fn small(name: &'static str, routes: RouteSet) -> Self {
        Self::new(name, TestGroup::Small, routes)
    }

    pub fn normal(name: &'static str, routes: RouteSet) -> Self {
        Self::new(name, TestGroup::Normal, routes)
    }

    pub fn large(name: &'static str, routes: RouteSet) -> Self {
        Self::new(name, TestGroup::Large, routes)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn routes(&self) -> &RouteSet {
        &self.routes
    }
}

/// A route table to register and the request paths to look up in it.
#[derive(Debug, Copy, Clone)]
pub struct RouteSet {
    patterns: &'static [&'static str],
    lookups: &'static [&'static str],
}

impl RouteSet {
    pub const fn new(patterns: &'static [&'static str], lookups: &'static [&'static str]) -> Self {
        Self { patterns, lookups }
    }

    pub fn patterns(&self) -> &'static [&'static str] {
        self.patterns
    }

    pub fn lookups(&self) -> &'static [&'static str] {
        self.lookups
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}
