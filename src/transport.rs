use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde::de::DeserializeOwned;

use crate::{ClientOptions, RequestError, Result};

/// Everything needed to issue one request. Retries reuse it verbatim.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Overrides the transport's default timeout for this request.
    pub timeout_ms: Option<u64>,
}

impl RequestOptions {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout_ms: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Successful response of one attempt.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl Response {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|err| {
            RequestError::Decode(format!("invalid response JSON: {err}; body: {}", self.body))
        })
    }
}

/// Request execution primitive.
///
/// Implementations must report non-2xx responses as
/// [`RequestError::Http`] so that the status and headers reach the retry
/// policy. The returned future must not borrow `self`.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, options: &RequestOptions) -> BoxFuture<'static, Result<Response>>;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    options: ClientOptions,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("options", &self.options)
            .finish()
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Wraps an already configured `reqwest` client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            options: ClientOptions::default(),
        }
    }

    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }
}

impl Transport for HttpTransport {
    fn send(&self, options: &RequestOptions) -> BoxFuture<'static, Result<Response>> {
        let timeout_ms = options.timeout_ms.unwrap_or(self.options.timeout_ms);
        let mut request = self
            .http
            .request(options.method.clone(), &options.url)
            .headers(options.headers.clone())
            .timeout(Duration::from_millis(timeout_ms));
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }

        Box::pin(async move {
            let response = request.send().await.map_err(RequestError::Transport)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.text().await.map_err(RequestError::Transport)?;

            if !status.is_success() {
                return Err(RequestError::Http {
                    status: status.as_u16(),
                    body,
                    headers,
                });
            }

            Ok(Response {
                status: status.as_u16(),
                headers,
                body,
            })
        })
    }
}
