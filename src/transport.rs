// Authenticated transport: a blocking reqwest client that attaches the
// caller's identity and the client identification header to every request,
// keeps requests on the configured endpoint and turns low-level failures into
// `ClientError`s. It never interprets status codes on its own; callers do
// that through `Response::error_for_status`.

use std::time::Duration;

use reqwest::blocking::{Body, Client};
use reqwest::header::HeaderMap;
use reqwest::{redirect, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::credentials::{Credentials, Identity};
use crate::error::{ClientError, Result};

/// Identification header sent with every request.
pub const USER_AGENT: &str = concat!(
    "archive-upload-client/",
    env!("CARGO_PKG_VERSION"),
    " (pre-ingest file storage client)"
);

const MAX_REDIRECTS: usize = 5;

/// Selects which timeout applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Listing, browsing, deleting and status polling.
    Metadata,
    /// Archive uploads, which may stream for a long time.
    Transfer,
}

/// Timeouts and TLS settings of a transport.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub request_timeout: Duration,
    pub upload_timeout: Duration,
    pub connect_timeout: Duration,
    pub verify_tls: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            upload_timeout: Duration::from_secs(60 * 60),
            connect_timeout: Duration::from_secs(10),
            verify_tls: true,
        }
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    /// Decode the body as JSON, reporting a shape mismatch as `Parse`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ClientError::Parse(format!("HTTP {} body could not be decoded: {}", self.status.as_u16(), e))
        })
    }

    /// Human-readable error text: the service's `{"error": "..."}` field when
    /// present, otherwise the raw body, otherwise the reason phrase.
    pub fn error_message(&self) -> String {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            if let Some(msg) = value.get("error").and_then(|e| e.as_str()) {
                return msg.to_string();
            }
        }
        let text = String::from_utf8_lossy(&self.body).trim().to_string();
        if !text.is_empty() {
            return text;
        }
        self.status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    }

    /// Map a non-success status onto the error taxonomy, passing 2xx through.
    pub fn error_for_status(self) -> Result<Self> {
        let status = self.status.as_u16();
        if self.status.is_success() {
            return Ok(self);
        }

        let message = self.error_message();
        Err(match status {
            401 | 403 => ClientError::Auth { status, message },
            404 => ClientError::NotFound(message),
            413 | 507 => ClientError::QuotaExceeded(message),
            400 | 422 => ClientError::Validation(message),
            500..=599 => ClientError::Service(format!("HTTP {}: {}", status, message)),
            _ => ClientError::Http(status, message),
        })
    }
}

/// Blocking HTTP transport bound to one set of credentials.
///
/// The pooled connection is reused across sequential calls. Use one
/// transport per thread if requests need to run in parallel.
pub struct Transport {
    http: Client,
    credentials: Credentials,
    options: TransportOptions,
}

impl Transport {
    pub fn new(credentials: Credentials, options: TransportOptions) -> Result<Self> {
        let origin = credentials.endpoint().origin();
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if attempt.url().origin() == origin {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .redirect(policy)
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            credentials,
            options,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// See [`Credentials::resolve_project`].
    pub fn resolve_project(&self, explicit: Option<&str>) -> Result<String> {
        self.credentials.resolve_project(explicit)
    }

    /// Resolve `path` (relative to the endpoint, or an absolute URL) and make
    /// sure it stays on the endpoint's origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        let endpoint = self.credentials.endpoint();
        let url = endpoint
            .join(path)
            .map_err(|e| ClientError::Config(format!("invalid request path '{}': {}", path, e)))?;

        if url.origin() != endpoint.origin() {
            return Err(ClientError::OutsideEndpoint(url.to_string()));
        }
        Ok(url)
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    /// A trailing empty segment keeps a trailing slash.
    pub fn api_url<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Result<Url> {
        let mut url = self.credentials.endpoint().clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Config("endpoint cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one request with credentials attached and read the full response.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Body>,
        headers: HeaderMap,
        kind: RequestKind,
    ) -> Result<Response> {
        let url = self.resolve(path)?;

        let mut req = self.http.request(method.clone(), url.clone()).headers(headers);
        req = match self.credentials.identity() {
            Identity::Basic { username, password } => req.basic_auth(username, Some(password)),
            Identity::Token(token) => req.bearer_auth(token),
        };
        if kind == RequestKind::Transfer {
            req = req.timeout(self.options.upload_timeout);
        }
        if let Some(body) = body {
            req = req.body(body);
        }

        debug!(%method, %url, ?kind, "sending request");
        let response = req.send().map_err(|e| send_error(&url, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().map_err(|e| send_error(&url, e))?.to_vec();
        debug!(%method, %url, status = status.as_u16(), bytes = body.len(), "received response");

        Ok(Response {
            status,
            headers,
            body,
        })
    }

    /// GET `path`, require a 2xx status and decode the JSON body.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None, HeaderMap::new(), RequestKind::Metadata)?
            .error_for_status()?
            .json()
    }
}

fn send_error(url: &Url, err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::RequestTimeout(format!("{}: {}", url, err))
    } else {
        ClientError::Connection(format!("{}: {}", url, err))
    }
}
