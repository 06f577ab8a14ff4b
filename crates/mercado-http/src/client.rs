//! The HTTP client core: the request pipeline itself.
//!
//! One [`HttpClient`] per process, shared by every typed API wrapper.
//! It owns the response cache and the refresh coordinator, and holds
//! the token provider it asks before each protected dispatch.

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use mercado_auth::{IdentityProvider, TokenProvider};
use mercado_cache::ResponseCache;

use crate::error::normalize_error_body;
use crate::refresh::{RefreshCoordinator, RefreshOutcome, RefreshTicket};
use crate::{ApiError, ApiRequest, AuthRequirement, RequestBody, TimeoutClass};

// ---------------------------------------------------------------------------
// SignOutHook
// ---------------------------------------------------------------------------

/// What to do when authentication is terminally expired.
///
/// The client core knows nothing about UI. When a 401 survives the one
/// allowed refresh-and-replay, it clears its own credential cache and
/// calls this hook; the embedding application clears the session store
/// and sends the user to a login surface. Synchronous on purpose: it
/// runs inline on the failing request's task, before the error is
/// returned.
pub trait SignOutHook: Send + Sync + 'static {
    /// Called once per terminal auth failure. Never called for
    /// failures on the auth endpoints themselves.
    fn on_auth_expired(&self);
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Configuration for the HTTP client core.
///
/// The defaults are the production constants; tests shrink the timing
/// knobs instead of sleeping through real backoff schedules.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL all request paths are joined to.
    pub base_url: Url,

    /// Timeout for ordinary calls.
    pub standard_timeout: Duration,

    /// Timeout for long-running inference-backed calls.
    pub long_running_timeout: Duration,

    /// How many times a 5xx response is retried before surfacing.
    pub max_server_error_retries: u32,

    /// Base delay for exponential backoff between 5xx retries:
    /// `base × 2^(retry-1)`.
    pub retry_base_delay: Duration,

    /// Response-cache entry lifetime.
    pub cache_ttl: Duration,
}

impl ClientConfig {
    /// Production defaults for the given base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            standard_timeout: Duration::from_secs(30),
            long_running_timeout: Duration::from_secs(120),
            max_server_error_retries: 2,
            retry_base_delay: Duration::from_millis(1000),
            cache_ttl: mercado_cache::DEFAULT_TTL,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpClient
// ---------------------------------------------------------------------------

/// The request/response pipeline wrapping the underlying network call.
///
/// See the crate docs for the pipeline stages. Cheap to share behind an
/// `Arc`; all interior state (cache, coordinator) is already
/// synchronized.
pub struct HttpClient<P> {
    http: reqwest::Client,
    config: ClientConfig,
    tokens: Arc<TokenProvider<P>>,
    cache: ResponseCache,
    coordinator: RefreshCoordinator,
    sign_out: Option<Arc<dyn SignOutHook>>,
}

impl<P: IdentityProvider> HttpClient<P> {
    /// Creates a client core with the given configuration and token
    /// provider.
    pub fn new(config: ClientConfig, tokens: Arc<TokenProvider<P>>) -> Self {
        let cache = ResponseCache::new(config.cache_ttl);
        Self {
            http: reqwest::Client::new(),
            config,
            tokens,
            cache,
            coordinator: RefreshCoordinator::new(),
            sign_out: None,
        }
    }

    /// Installs the terminal-auth-failure hook.
    pub fn with_sign_out_hook(mut self, hook: Arc<dyn SignOutHook>) -> Self {
        self.sign_out = Some(hook);
        self
    }

    /// Sends a request through the full pipeline and returns the parsed
    /// JSON payload.
    ///
    /// # Errors
    /// One [`ApiError`] per the taxonomy in [`crate::error`]; transient
    /// conditions inside the retry/refresh budgets never surface.
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        // -- Step 2: cache lookup (idempotent reads only) --
        let cache_key = request.cache_key();
        if request.is_cacheable() {
            if let Some(hit) = self.cache.get(&cache_key) {
                return Ok(hit);
            }
        }

        // -- Step 3: credential attachment --
        let mut token = match request.auth {
            AuthRequirement::Protected => self.tokens.valid_token().await,
            // Unprotected endpoints get a token only if one is lying
            // around; no refresh is triggered for them.
            AuthRequirement::Public => self.tokens.current_token(),
        };

        let mut server_retries: u32 = 0;
        let mut replayed_after_refresh = false;

        loop {
            // -- Steps 1 + 4: shape and dispatch --
            let response = self.dispatch(&request, token.as_deref()).await?;
            let status = response.status();

            // -- Step 5: response handling --
            if status.is_success() {
                let payload = Self::parse_payload(response).await?;
                if request.is_cacheable() {
                    self.cache.put(&cache_key, payload.clone());
                }
                return Ok(payload);
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                if request.is_auth_endpoint() {
                    // A 401 from login/register/refresh is a plain
                    // failure: no refresh loop, no sign-out redirect.
                    let body = response.text().await.unwrap_or_default();
                    return Err(ApiError::Api {
                        status: 401,
                        message: normalize_error_body(401, &body),
                    });
                }
                if replayed_after_refresh {
                    // The refreshed credential was rejected too.
                    warn!(path = %request.path, "401 after replay, session is over");
                    self.handle_auth_expired();
                    return Err(ApiError::AuthExpired);
                }
                match self.coordinated_refresh().await {
                    RefreshOutcome::Refreshed(fresh) => {
                        debug!(path = %request.path, "replaying request with refreshed credential");
                        token = Some(fresh);
                        replayed_after_refresh = true;
                        continue;
                    }
                    RefreshOutcome::Failed(reason) => {
                        warn!(path = %request.path, reason = %reason, "credential refresh failed");
                        self.handle_auth_expired();
                        return Err(ApiError::AuthExpired);
                    }
                }
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::RateLimited {
                    message: normalize_error_body(429, &body),
                });
            }

            if status.is_server_error() {
                if server_retries < self.config.max_server_error_retries {
                    server_retries += 1;
                    let delay = self.config.retry_base_delay * 2u32.pow(server_retries - 1);
                    warn!(
                        status = status.as_u16(),
                        attempt = server_retries,
                        delay_ms = delay.as_millis() as u64,
                        "server error, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                let code = status.as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::Transient {
                    status: code,
                    message: normalize_error_body(code, &body),
                });
            }

            // -- Step 6: everything else is normalized and surfaced --
            let code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            let message = normalize_error_body(code, &body);
            return match code {
                400 | 422 => Err(ApiError::Validation { message }),
                _ => Err(ApiError::Api {
                    status: code,
                    message,
                }),
            };
        }
    }

    /// Sends a request and deserializes the payload into `T`.
    ///
    /// # Errors
    /// Everything [`send`](Self::send) can return, plus
    /// [`ApiError::Decode`] when the payload doesn't match `T`.
    pub async fn send_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let payload = self.send(request).await?;
        serde_json::from_value(payload).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// The response cache, exposed for introspection in tests.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Builds and fires one wire request. Consumed and rebuilt per
    /// attempt — bodies are owned data, so replay is exact.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint_url(request)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .timeout(self.timeout_for(request.timeout));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        // Step 1, request shaping: multipart bodies must not carry an
        // explicit content-type — the transport sets one with the
        // boundary baked in, and a caller-supplied value would break it.
        let is_multipart = matches!(request.body, RequestBody::Multipart(_));
        for (name, value) in &request.headers {
            if is_multipart && name.eq_ignore_ascii_case("content-type") {
                debug!("dropping explicit content-type on multipart request");
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Bytes { content_type, data } => builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(data.clone()),
            RequestBody::Multipart(parts) => {
                let mut form = multipart::Form::new();
                for part in parts {
                    let mut piece = multipart::Part::bytes(part.data.clone());
                    if let Some(file_name) = &part.file_name {
                        piece = piece.file_name(file_name.clone());
                    }
                    if let Some(mime) = &part.mime {
                        piece = piece.mime_str(mime).map_err(|e| {
                            ApiError::InvalidRequest(format!("bad MIME type {mime:?}: {e}"))
                        })?;
                    }
                    form = form.part(part.name.clone(), piece);
                }
                builder.multipart(form)
            }
        };

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        builder.send().await.map_err(|e| {
            // No response at all: a distinct error kind, never retried.
            if e.is_timeout() {
                ApiError::Network(format!("request timed out: {e}"))
            } else {
                ApiError::Network(e.to_string())
            }
        })
    }

    fn endpoint_url(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        let joined = format!(
            "{}/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        Url::parse(&joined)
            .map_err(|e| ApiError::InvalidRequest(format!("bad endpoint URL {joined:?}: {e}")))
    }

    fn timeout_for(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Standard => self.config.standard_timeout,
            TimeoutClass::LongRunning => self.config.long_running_timeout,
        }
    }

    /// Runs the coordinated refresh for the 401 path: one leader
    /// refreshes, everyone else queues for the same outcome.
    async fn coordinated_refresh(&self) -> RefreshOutcome {
        match self.coordinator.begin() {
            RefreshTicket::Leader => {
                let outcome = match self.tokens.refresh().await {
                    Ok(session) => RefreshOutcome::Refreshed(session.access_token),
                    Err(e) => RefreshOutcome::Failed(e.to_string()),
                };
                self.coordinator.complete(outcome.clone());
                outcome
            }
            RefreshTicket::Waiter(receiver) => receiver.await.unwrap_or_else(|_| {
                // The leader's request was dropped before settling.
                RefreshOutcome::Failed("in-flight refresh abandoned".into())
            }),
        }
    }

    /// Terminal 401: clear the local credential cache and let the
    /// embedding application clear identity state and redirect.
    fn handle_auth_expired(&self) {
        self.tokens.invalidate();
        if let Some(hook) = &self.sign_out {
            hook.on_auth_expired();
        }
    }

    /// Parses a success body. Empty bodies become `null`; non-JSON
    /// bodies are wrapped as a JSON string rather than rejected.
    async fn parse_payload(response: reqwest::Response) -> Result<Value, ApiError> {
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Construction-level tests. The pipeline behavior (retries,
    //! refresh-and-replay, caching) is exercised end-to-end against
    //! real localhost servers in `tests/client.rs`.

    use super::*;
    use mercado_auth::AuthError;

    struct NoProvider;

    impl IdentityProvider for NoProvider {
        async fn get_session(&self) -> Result<Option<mercado_auth::Session>, AuthError> {
            Ok(None)
        }

        async fn refresh_session(&self) -> Result<mercado_auth::Session, AuthError> {
            Err(AuthError::NoSession)
        }
    }

    fn client() -> HttpClient<NoProvider> {
        let config = ClientConfig::new(Url::parse("https://api.example.com").unwrap());
        HttpClient::new(config, Arc::new(TokenProvider::new(Arc::new(NoProvider))))
    }

    #[test]
    fn test_config_defaults_match_production_constants() {
        let config = ClientConfig::new(Url::parse("https://api.example.com").unwrap());

        assert_eq!(config.standard_timeout, Duration::from_secs(30));
        assert_eq!(config.long_running_timeout, Duration::from_secs(120));
        assert_eq!(config.max_server_error_retries, 2);
        assert_eq!(config.retry_base_delay, Duration::from_millis(1000));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_timeout_for_selects_class_budget() {
        let client = client();

        assert_eq!(
            client.timeout_for(TimeoutClass::Standard),
            Duration::from_secs(30)
        );
        assert_eq!(
            client.timeout_for(TimeoutClass::LongRunning),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_endpoint_url_joins_without_double_slash() {
        let client = client();

        let url = client.endpoint_url(&ApiRequest::get("/items/42")).unwrap();

        assert_eq!(url.as_str(), "https://api.example.com/items/42");
    }

    #[test]
    fn test_endpoint_url_handles_base_with_prefix() {
        let config = ClientConfig::new(Url::parse("https://api.example.com/v1/").unwrap());
        let client =
            HttpClient::new(config, Arc::new(TokenProvider::new(Arc::new(NoProvider))));

        let url = client.endpoint_url(&ApiRequest::get("items")).unwrap();

        assert_eq!(url.as_str(), "https://api.example.com/v1/items");
    }
}
