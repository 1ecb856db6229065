//! Intercepted request model.

use axum::http::{header, HeaderMap, Method, Uri};
use bytes::Bytes;
use serde::Serialize;
use url::Url;

use crate::cache::RequestKey;
use crate::error::{Result, ShellError};

/// How the page issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Full-page navigation
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
}

impl RequestMode {
    /// Derives the mode from `Sec-Fetch-Mode`. Without that header, a GET
    /// accepting `text/html` counts as a navigation.
    pub fn from_headers(method: &Method, headers: &HeaderMap) -> Self {
        let fetch_mode = headers
            .get("sec-fetch-mode")
            .and_then(|value| value.to_str().ok());

        match fetch_mode {
            Some("navigate") => RequestMode::Navigate,
            Some("same-origin") => RequestMode::SameOrigin,
            Some("cors") => RequestMode::Cors,
            Some(_) => RequestMode::NoCors,
            None => {
                let accepts_html = headers
                    .get(header::ACCEPT)
                    .and_then(|value| value.to_str().ok())
                    .is_some_and(|accept| accept.contains("text/html"));
                if *method == Method::GET && accepts_html {
                    RequestMode::Navigate
                } else {
                    RequestMode::NoCors
                }
            }
        }
    }
}

// == Fetch Request ==
/// A request intercepted from a page.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// Absolute URL as the page sees it
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub mode: RequestMode,
}

impl FetchRequest {
    /// A body-less GET sub-resource request.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            mode: RequestMode::NoCors,
        }
    }

    /// A full-page navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Builds a request from the parts of an incoming HTTP request.
    ///
    /// Absolute-form targets are kept as-is. Origin-form targets always stay
    /// on `origin`: the path is set verbatim, so a target such as
    /// `//other.host/x` is a path on this origin, not a scheme-relative URL.
    pub fn from_parts(
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        body: Bytes,
        origin: &Url,
    ) -> Result<Self> {
        let url = if uri.scheme().is_some() {
            Url::parse(&uri.to_string()).map_err(|e| {
                ShellError::InvalidRequest(format!("Bad request target {}: {}", uri, e))
            })?
        } else {
            let mut url = origin.clone();
            url.set_path(uri.path());
            url.set_query(uri.query());
            url
        };

        let mode = RequestMode::from_headers(&method, &headers);
        Ok(Self {
            method,
            url,
            headers,
            body,
            mode,
        })
    }

    /// Cache identity of this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn origin() -> Url {
        Url::parse("http://localhost:3000").unwrap()
    }

    #[test]
    fn test_sec_fetch_mode_navigate() {
        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        assert_eq!(
            RequestMode::from_headers(&Method::GET, &headers),
            RequestMode::Navigate
        );
    }

    #[test]
    fn test_sec_fetch_mode_cors() {
        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert_eq!(
            RequestMode::from_headers(&Method::GET, &headers),
            RequestMode::Cors
        );
    }

    #[test]
    fn test_accept_html_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        assert_eq!(
            RequestMode::from_headers(&Method::GET, &headers),
            RequestMode::Navigate
        );
        assert_eq!(
            RequestMode::from_headers(&Method::POST, &headers),
            RequestMode::NoCors
        );
        assert_eq!(
            RequestMode::from_headers(&Method::GET, &HeaderMap::new()),
            RequestMode::NoCors
        );
    }

    #[test]
    fn test_from_parts_origin_form() {
        let uri: Uri = "/jobs?page=2".parse().unwrap();
        let request =
            FetchRequest::from_parts(Method::GET, &uri, HeaderMap::new(), Bytes::new(), &origin())
                .unwrap();

        assert_eq!(request.url.as_str(), "http://localhost:3000/jobs?page=2");
        assert_eq!(request.mode, RequestMode::NoCors);
    }

    #[test]
    fn test_from_parts_double_slash_path_stays_on_origin() {
        let uri: Uri = "//evil.example/steal?x=1".parse().unwrap();
        let request =
            FetchRequest::from_parts(Method::GET, &uri, HeaderMap::new(), Bytes::new(), &origin())
                .unwrap();

        assert_eq!(request.url.origin(), origin().origin());
        assert_eq!(request.url.path(), "//evil.example/steal");
        assert_eq!(request.url.query(), Some("x=1"));
    }

    #[test]
    fn test_from_parts_absolute_form() {
        let uri: Uri = "https://fonts.example.com/inter.woff2".parse().unwrap();
        let request =
            FetchRequest::from_parts(Method::GET, &uri, HeaderMap::new(), Bytes::new(), &origin())
                .unwrap();

        assert_eq!(request.url.as_str(), "https://fonts.example.com/inter.woff2");
    }

    #[test]
    fn test_key_ignores_body() {
        let url = origin().join("/search").unwrap();
        let mut a = FetchRequest::get(url.clone());
        let b = FetchRequest::get(url);
        a.body = Bytes::from_static(b"ignored");
        assert_eq!(a.key(), b.key());
    }
}
