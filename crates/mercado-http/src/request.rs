//! Request descriptions: everything the pipeline needs, as plain data.
//!
//! An [`ApiRequest`] is a value, not a wire object. Bodies are owned
//! bytes/JSON rather than streams so the pipeline can rebuild the wire
//! request for every attempt — a 5xx retry or a 401 replay sends the
//! exact same request again, which streaming bodies can't do.

use reqwest::Method;

use mercado_cache::cache_key;

/// Paths that belong to the auth flow itself.
///
/// A 401 from one of these must never trigger a credential refresh:
/// refreshing because the refresh endpoint said 401 is an infinite
/// loop, and a failed login is just a failed login.
const AUTH_PATHS: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/refresh",
    "/auth/token",
];

// ---------------------------------------------------------------------------
// Classification enums
// ---------------------------------------------------------------------------

/// Whether an endpoint requires authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthRequirement {
    /// A bearer credential is required; the token provider is asked
    /// for a valid one (refreshing if needed) before dispatch.
    #[default]
    Protected,

    /// No credential required. One is still attached if it happens to
    /// be available, so the server can personalize responses.
    Public,
}

/// Which timeout budget a request gets.
///
/// Almost everything is `Standard`. A small set of inference-backed
/// calls (price prediction) legitimately run long and get the larger
/// budget instead of a per-request knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutClass {
    /// Ordinary calls: 30 seconds.
    #[default]
    Standard,
    /// Long-running inference-backed calls: 120 seconds.
    LongRunning,
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// One part of a multipart upload, fully buffered.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    /// Form field name.
    pub name: String,
    /// Original file name, if this part is a file.
    pub file_name: Option<String>,
    /// MIME type of the part's data.
    pub mime: Option<String>,
    /// The part's content.
    pub data: Vec<u8>,
}

/// The request body, as replayable owned data.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// A JSON document, serialized on dispatch.
    Json(serde_json::Value),
    /// Raw bytes with an explicit content type.
    Bytes {
        content_type: String,
        data: Vec<u8>,
    },
    /// A multipart form. The transport layer picks the boundary, so no
    /// explicit content-type header survives on these requests.
    Multipart(Vec<MultipartPart>),
}

// ---------------------------------------------------------------------------
// ApiRequest
// ---------------------------------------------------------------------------

/// A description of one API call.
///
/// Built with the short chaining methods and handed to
/// [`HttpClient::send`](crate::HttpClient::send):
///
/// ```rust
/// use mercado_http::ApiRequest;
///
/// let request = ApiRequest::get("/items")
///     .query("q", "bike")
///     .query("page", "2")
///     .cached();
/// ```
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/items/42`.
    pub path: String,
    /// Query parameters, in caller order (sorted only for cache keying).
    pub query: Vec<(String, String)>,
    /// Extra headers. An explicit content-type is dropped for
    /// multipart bodies during request shaping.
    pub headers: Vec<(String, String)>,
    /// The body.
    pub body: RequestBody,
    /// Whether the endpoint is protected.
    pub auth: AuthRequirement,
    /// Opt-in response caching. Only honored for GET.
    pub cache: bool,
    /// Timeout budget.
    pub timeout: TimeoutClass,
}

impl ApiRequest {
    /// Creates a request with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            auth: AuthRequirement::default(),
            cache: false,
            timeout: TimeoutClass::default(),
        }
    }

    /// Shorthand for a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Shorthand for a PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Shorthand for a PATCH request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Shorthand for a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sets a raw byte body with an explicit content type.
    pub fn bytes(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        };
        self
    }

    /// Sets a multipart body.
    pub fn multipart(mut self, parts: Vec<MultipartPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// Marks the endpoint as unprotected.
    pub fn public(mut self) -> Self {
        self.auth = AuthRequirement::Public;
        self
    }

    /// Opts this read into the response cache.
    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }

    /// Gives this request the long-running timeout budget.
    pub fn long_running(mut self) -> Self {
        self.timeout = TimeoutClass::LongRunning;
        self
    }

    /// Whether this request participates in the response cache:
    /// opted in AND an idempotent read.
    pub fn is_cacheable(&self) -> bool {
        self.cache && self.method == Method::GET
    }

    /// Whether this path is part of the auth flow itself (login,
    /// registration, refresh). See [`AUTH_PATHS`].
    pub fn is_auth_endpoint(&self) -> bool {
        let path = self.path.trim_end_matches('/');
        AUTH_PATHS
            .iter()
            .any(|auth| path == *auth || path.starts_with(&format!("{auth}/")))
    }

    /// The response-cache key for this request.
    pub fn cache_key(&self) -> String {
        cache_key(self.method.as_str(), &self.path, &self.query)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_builder_defaults() {
        let request = ApiRequest::get("/items");

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.auth, AuthRequirement::Protected);
        assert_eq!(request.timeout, TimeoutClass::Standard);
        assert!(!request.cache);
        assert!(matches!(request.body, RequestBody::Empty));
    }

    #[test]
    fn test_is_cacheable_requires_get() {
        // Opting a POST into caching is ignored: only idempotent
        // reads may be served from memory.
        assert!(ApiRequest::get("/items").cached().is_cacheable());
        assert!(!ApiRequest::post("/items").cached().is_cacheable());
        assert!(!ApiRequest::get("/items").is_cacheable());
    }

    #[test]
    fn test_is_auth_endpoint_matches_auth_paths() {
        assert!(ApiRequest::post("/auth/login").is_auth_endpoint());
        assert!(ApiRequest::post("/auth/register").is_auth_endpoint());
        assert!(ApiRequest::post("/auth/refresh").is_auth_endpoint());
        assert!(ApiRequest::post("/auth/token").is_auth_endpoint());
        // Trailing slash still counts.
        assert!(ApiRequest::post("/auth/login/").is_auth_endpoint());
    }

    #[test]
    fn test_is_auth_endpoint_rejects_ordinary_paths() {
        assert!(!ApiRequest::get("/items").is_auth_endpoint());
        assert!(!ApiRequest::get("/auth/profile").is_auth_endpoint());
        // Prefix collisions don't count.
        assert!(!ApiRequest::post("/auth/login-history").is_auth_endpoint());
    }

    #[test]
    fn test_cache_key_matches_identical_requests() {
        let a = ApiRequest::get("/items").query("b", "2").query("a", "1");
        let b = ApiRequest::get("/items").query("a", "1").query("b", "2");

        assert_eq!(a.cache_key(), b.cache_key());
    }
}
