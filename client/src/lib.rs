//! Bounded-latency HTTP access to named backend services.
//!
//! # Architecture
//!
//! Two independent, composable policies:
//!
//! - [`deadline`] - wall-clock guard for any awaited operation; races a timer
//!   against the operation and yields [`ClientError::Timeout`] when the timer
//!   wins.
//! - [`ServiceClient`] - per-service handle that attaches default headers and
//!   bearer auth, then drives the [`retry`] attempt loop with linear backoff.
//!
//! A single request may pass through both: a handler bounded by
//! [`deadline::run_with_deadline`] can call out through a [`ServiceClient`],
//! and a client can carry its own deadline via
//! [`ServiceClient::with_timeout_policy`].
//!
//! # Error Handling
//!
//! Every failure path yields exactly one [`ClientError`]:
//!
//! | Variant | Meaning | Retried? |
//! |---------|---------|----------|
//! | `Timeout` | deadline exceeded | no (caller's call) |
//! | `Failed` | terminal HTTP status (4xx) | never |
//! | `Exhausted` | retryable failures ate the attempt budget | already was |
//! | `UnknownService` | name missing from the registry | fatal at construction |
//!
//! Retries are invisible to the caller except through latency and the final
//! error.

pub mod deadline;
mod error;
pub mod notify;
pub mod retry;

pub use error::{AttemptFailure, ClientError};
pub use tether_types;

use notify::NotificationSink;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use retry::RetryOutcome;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tether_types::{
    AlertPriority, BearerToken, EndpointRegistry, RetryPolicy, ServiceEndpoint, TimeoutPolicy,
};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Shared process-wide HTTP client.
///
/// Connection pooling lives here, so every [`ServiceClient`] rides the same
/// sockets regardless of which service it talks to.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!("Failed to build tuned HTTP client: {e}. Falling back to defaults.");
            reqwest::Client::new()
        })
    })
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        // Redirects are answers, not detours: a 3xx reaches the caller as-is.
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// Where the ambient bearer token comes from.
///
/// Abstracted as a capability because the storage behind it (session store,
/// keychain, environment) is deployment-specific and out of scope here.
pub trait CredentialProvider: Send + Sync {
    /// The current token, if a session is active.
    fn bearer_token(&self) -> Option<BearerToken>;
}

/// Provider for environments whose token never rotates (tests, batch jobs).
#[derive(Debug, Clone)]
pub struct StaticToken {
    token: BearerToken,
}

impl StaticToken {
    #[must_use]
    pub fn new(token: BearerToken) -> Self {
        Self { token }
    }
}

impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Option<BearerToken> {
        Some(self.token.clone())
    }
}

/// Per-request options for [`ServiceClient::request`].
#[derive(Debug, Default)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header. Caller-supplied headers win over the client defaults on
    /// conflict.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// JSON-encode `body` and send it with the request.
    #[must_use]
    pub fn with_json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A successful response body, classified by the declared `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `application/json` payload.
    Json(serde_json::Value),
    /// Anything else, returned verbatim.
    Text(String),
}

impl ResponseBody {
    /// Deserialize into a concrete shape.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        match self {
            Self::Json(value) => serde_json::from_value(value).map_err(ClientError::Decode),
            Self::Text(raw) => serde_json::from_str(&raw).map_err(ClientError::Decode),
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(raw) => Some(raw),
        }
    }
}

/// Client for one named backend service.
///
/// Construction fails fast with [`ClientError::UnknownService`] when the name
/// is not registered; no network activity happens until the first request.
/// Policies are fixed once the client is built.
#[derive(Clone)]
pub struct ServiceClient {
    endpoint: ServiceEndpoint,
    retry_policy: RetryPolicy,
    timeout_policy: Option<TimeoutPolicy>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("endpoint", &self.endpoint)
            .field("retry_policy", &self.retry_policy)
            .field("timeout_policy", &self.timeout_policy)
            .field("credentials", &self.credentials.is_some())
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

impl ServiceClient {
    /// Look up `service` in the registry and build a client for it.
    pub fn new(service: &str, registry: &EndpointRegistry) -> Result<Self, ClientError> {
        let endpoint = registry
            .get(service)
            .cloned()
            .ok_or_else(|| ClientError::UnknownService {
                name: service.to_string(),
            })?;
        Ok(Self {
            endpoint,
            retry_policy: RetryPolicy::default(),
            timeout_policy: None,
            credentials: None,
            notifier: None,
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Bound every request issued through this client to `policy`.
    ///
    /// Without this, the client retries for as long as its schedule allows
    /// and deadlines are the caller's business.
    #[must_use]
    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Surface terminal failures to `sink` as alerts. Informational only;
    /// control flow is unchanged.
    #[must_use]
    pub fn with_notifier(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(sink);
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Issue a request and classify the outcome.
    ///
    /// Exactly one of {parsed success body, typed error} is produced; retries
    /// happen inside and are invisible except through latency.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ResponseBody, ClientError> {
        match self.timeout_policy {
            Some(policy) => {
                deadline::run_with_deadline(policy, self.execute(method, path, options)).await
            }
            None => self.execute(method, path, options).await,
        }
    }

    /// GET with query-string encoding of flat key→value pairs.
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ResponseBody, ClientError> {
        let path = append_query(path, query);
        self.request(Method::GET, &path, RequestOptions::new()).await
    }

    /// POST with a JSON-encoded body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ResponseBody, ClientError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, RequestOptions::new().with_json_body(body))
            .await
    }

    /// PUT with a JSON-encoded body.
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ResponseBody, ClientError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, RequestOptions::new().with_json_body(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ResponseBody, ClientError> {
        self.request(Method::DELETE, path, RequestOptions::new())
            .await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ResponseBody, ClientError> {
        let url = self.endpoint.url_for(path);
        let headers = self.build_headers(&options)?;
        let body = options.body;

        let build_request = || {
            let mut builder = http_client()
                .request(method.clone(), url.as_str())
                .headers(headers.clone());
            if let Some(body) = &body {
                builder = builder.json(body);
            }
            builder
        };

        match retry::send_with_retry(build_request, self.retry_policy).await {
            RetryOutcome::Success(response) => parse_body(response).await,
            RetryOutcome::Terminal(response) => {
                let status = response.status();
                let error = ClientError::Failed {
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or("unknown").to_string(),
                };
                self.report_terminal(&error, AlertPriority::HIGH);
                Err(error)
            }
            RetryOutcome::Exhausted { attempts, last } => {
                let error = ClientError::Exhausted { attempts, last };
                self.report_terminal(&error, AlertPriority::CRITICAL);
                Err(error)
            }
        }
    }

    fn build_headers(&self, options: &RequestOptions) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(provider) = &self.credentials
            && let Some(token) = provider.bearer_token()
        {
            let raw = format!("Bearer {}", token.as_str());
            let mut value =
                HeaderValue::from_str(&raw).map_err(|_| ClientError::InvalidHeader {
                    name: AUTHORIZATION.to_string(),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        // Caller-supplied headers land last: insert replaces, caller wins.
        for (name, value) in &options.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                ClientError::InvalidHeader { name: name.clone() }
            })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader {
                    name: name.clone(),
                })?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }

    fn report_terminal(&self, error: &ClientError, priority: AlertPriority) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let details = serde_json::json!({
            "service": self.endpoint.name().as_str(),
            "error": error.to_string(),
        });
        notifier.alert("request_failed", &details, priority);
    }
}

async fn parse_body(response: reqwest::Response) -> Result<ResponseBody, ClientError> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("application/json"));

    let raw = response.text().await?;

    if is_json {
        if raw.is_empty() {
            // 204-style JSON responses carry no body at all.
            return Ok(ResponseBody::Json(serde_json::Value::Null));
        }
        Ok(ResponseBody::Json(serde_json::from_str(&raw)?))
    } else {
        Ok(ResponseBody::Text(raw))
    }
}

fn append_query(path: &str, query: &[(&str, &str)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query)
        .finish();
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{encoded}")
}
