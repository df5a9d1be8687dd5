//! Cross-origin policy for browser callers.
//!
//! Origins on the allow-list get any method and any header. Everyone else
//! gets responses without CORS headers, and their preflights are refused.

use super::http::{HttpRequest, Response};

const ALLOW_METHODS: &str = "DELETE, GET, HEAD, OPTIONS, PATCH, POST, PUT";
const PREFLIGHT_MAX_AGE: &str = "600";

#[derive(Clone, Debug)]
pub(crate) struct CorsPolicy {
    allowed: Vec<String>,
}

impl CorsPolicy {
    pub fn new(origins: &[String]) -> Self {
        Self {
            allowed: origins
                .iter()
                .map(|origin| origin.trim_end_matches('/').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Scheme and host are case-insensitive, so the comparison is too.
    pub fn is_allowed(&self, origin: &str) -> bool {
        let origin = origin.to_ascii_lowercase();
        self.allowed.iter().any(|allowed| *allowed == origin)
    }

    pub fn is_preflight(request: &HttpRequest) -> bool {
        request.method == "OPTIONS"
            && request.header("origin").is_some()
            && request.header("access-control-request-method").is_some()
    }

    pub fn preflight(&self, request: &HttpRequest) -> Response {
        let origin = request.header("origin").unwrap_or_default();
        if !self.is_allowed(origin) {
            return Response::text(400, "Disallowed CORS origin").with_header("Vary", "Origin");
        }
        let mut response = Response::text(200, "OK")
            .with_header("Access-Control-Allow-Origin", origin)
            .with_header("Access-Control-Allow-Methods", ALLOW_METHODS)
            .with_header("Access-Control-Max-Age", PREFLIGHT_MAX_AGE)
            .with_header("Vary", "Origin");
        if let Some(requested) = request.header("access-control-request-headers") {
            response.push_header("Access-Control-Allow-Headers", requested);
        }
        response
    }

    /// Add CORS headers to a non-preflight response.
    pub fn decorate(&self, response: &mut Response, origin: Option<&str>) {
        if let Some(origin) = origin {
            if self.is_allowed(origin) {
                response.push_header("Access-Control-Allow-Origin", origin);
                response.push_header("Vary", "Origin");
            }
        }
    }
}
