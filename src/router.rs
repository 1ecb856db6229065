//! Fetch Router
//!
//! Classifies every intercepted request into exactly one route. The
//! classification is a pure function of method, origin and path.

use std::collections::HashSet;

use axum::http::Method;
use serde::Serialize;
use url::{Origin, Url};

use crate::net::FetchRequest;

/// How an intercepted request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClassification {
    /// Straight to the network, never cached
    Bypass,
    /// Shell asset from the precache manifest
    Precache,
    /// Network first, falling back to the cache
    DynamicCache,
}

impl RouteClassification {
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, RouteClassification::Bypass)
    }
}

// == Fetch Router ==
#[derive(Debug, Clone)]
pub struct FetchRouter {
    origin: Origin,
    api_prefixes: Vec<String>,
    manifest: HashSet<String>,
}

impl FetchRouter {
    /// Creates a router for a worker running on `origin`.
    pub fn new(origin: &Url, api_prefixes: &[String], manifest: &[String]) -> Self {
        Self {
            origin: origin.origin(),
            api_prefixes: api_prefixes.to_vec(),
            manifest: manifest.iter().cloned().collect(),
        }
    }

    // == Classify ==
    /// Returns the route for `request`. Total over all inputs.
    pub fn classify(&self, request: &FetchRequest) -> RouteClassification {
        if request.method != Method::GET {
            return RouteClassification::Bypass;
        }
        if request.url.origin() != self.origin {
            return RouteClassification::Bypass;
        }

        let path = request.url.path();
        if self.api_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return RouteClassification::Bypass;
        }
        if self.manifest.contains(path) {
            return RouteClassification::Precache;
        }
        RouteClassification::DynamicCache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn router() -> FetchRouter {
        let manifest: Vec<String> = ["/", "/index.html", "/manifest.json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        FetchRouter::new(
            &Url::parse("http://localhost:3000").unwrap(),
            &["/api/".to_string()],
            &manifest,
        )
    }

    fn get(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_non_get_bypasses() {
        let mut request = get("http://localhost:3000/dashboard");
        request.method = Method::POST;
        assert_eq!(router().classify(&request), RouteClassification::Bypass);
    }

    #[test]
    fn test_api_prefix_bypasses() {
        assert_eq!(
            router().classify(&get("http://localhost:3000/api/data")),
            RouteClassification::Bypass
        );
    }

    #[test]
    fn test_cross_origin_bypasses() {
        assert_eq!(
            router().classify(&get("https://fonts.googleapis.com/css?family=Inter")),
            RouteClassification::Bypass
        );
        assert_eq!(
            router().classify(&get("http://localhost:8080/index.html")),
            RouteClassification::Bypass
        );
    }

    #[test]
    fn test_manifest_path_is_precache() {
        for path in ["/", "/index.html", "/manifest.json"] {
            let request = get(&format!("http://localhost:3000{}", path));
            assert_eq!(router().classify(&request), RouteClassification::Precache);
        }
    }

    #[test]
    fn test_manifest_match_is_exact() {
        assert_eq!(
            router().classify(&get("http://localhost:3000/index.html.bak")),
            RouteClassification::DynamicCache
        );
    }

    #[test]
    fn test_everything_else_is_dynamic() {
        assert_eq!(
            router().classify(&get("http://localhost:3000/static/js/main.js")),
            RouteClassification::DynamicCache
        );
        // "/apiary" is not under the "/api/" prefix
        assert_eq!(
            router().classify(&get("http://localhost:3000/apiary")),
            RouteClassification::DynamicCache
        );
    }

    fn method_strategy() -> impl Strategy<Value = Method> {
        prop_oneof![
            Just(Method::POST),
            Just(Method::PUT),
            Just(Method::PATCH),
            Just(Method::DELETE),
            Just(Method::HEAD),
            Just(Method::OPTIONS),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Non-GET requests always bypass, whatever the path.
        #[test]
        fn prop_non_get_always_bypasses(method in method_strategy(), path in "/[a-z/.]{0,20}") {
            let mut request = get(&format!("http://localhost:3000{}", path));
            request.method = method;
            prop_assert_eq!(router().classify(&request), RouteClassification::Bypass);
        }

        // Cross-origin requests always bypass, whatever the path.
        #[test]
        fn prop_cross_origin_always_bypasses(host in "[a-z]{1,10}\\.example", path in "/[a-z/.]{0,20}") {
            let request = get(&format!("https://{}{}", host, path));
            prop_assert_eq!(router().classify(&request), RouteClassification::Bypass);
        }
    }
}
