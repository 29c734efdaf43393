//! Route allow-list and keyword blacklist.
//!
//! # Design Decisions
//! - Flat sets, no matcher tree: a route is servable if it starts with a
//!   registered prefix
//! - Keywords match anywhere in the raw request target and win over routes
//! - Path matching is case-sensitive

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

/// What the filter decided for a request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteVerdict {
    /// Route matches a registered prefix.
    Allowed,
    /// No registered prefix matches.
    NotFound,
    /// The target contains this blacklisted keyword.
    Blacklisted(String),
}

#[derive(Debug, Default)]
pub struct RouteFilter {
    routes: RwLock<BTreeSet<String>>,
    keywords: RwLock<BTreeSet<String>>,
}

impl RouteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter seeded with routes and keywords.
    pub fn with_lists<R, K>(routes: R, keywords: K) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        let filter = Self::new();
        filter.replace(routes, keywords);
        filter
    }

    pub fn add_route(&self, route: &str) -> bool {
        if route.is_empty() {
            return false;
        }
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(route.to_string())
    }

    pub fn remove_route(&self, route: &str) -> bool {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(route)
    }

    pub fn clear_routes(&self) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn add_keyword(&self, keyword: &str) -> bool {
        if keyword.is_empty() {
            return false;
        }
        self.keywords
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(keyword.to_string())
    }

    pub fn remove_keyword(&self, keyword: &str) -> bool {
        self.keywords
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(keyword)
    }

    /// Swap both lists at once (config reload).
    pub fn replace<R, K>(&self, routes: R, keywords: K)
    where
        R: IntoIterator,
        R::Item: Into<String>,
        K: IntoIterator,
        K::Item: Into<String>,
    {
        let routes: BTreeSet<String> = routes
            .into_iter()
            .map(Into::into)
            .filter(|r: &String| !r.is_empty())
            .collect();
        let keywords: BTreeSet<String> = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.is_empty())
            .collect();

        *self.routes.write().unwrap_or_else(PoisonError::into_inner) = routes;
        *self.keywords.write().unwrap_or_else(PoisonError::into_inner) = keywords;
    }

    pub fn routes(&self) -> Vec<String> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Judge a request. `target` is the raw request target, `route` its path.
    pub fn check(&self, target: &str, route: &str) -> RouteVerdict {
        let keywords = self.keywords.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = keywords.iter().find(|k| target.contains(k.as_str())) {
            return RouteVerdict::Blacklisted(hit.clone());
        }
        drop(keywords);

        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        if routes.iter().any(|prefix| route.starts_with(prefix.as_str())) {
            RouteVerdict::Allowed
        } else {
            RouteVerdict::NotFound
        }
    }
}
