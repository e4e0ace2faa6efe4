use reqwest::header::HeaderMap;

/// Error type returned by this crate.
///
/// Every variant except [`RequestError::Cancelled`] is a failure of one
/// attempt; the retry decorator forwards the last attempt's failure unchanged
/// once retries are exhausted.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body and headers.
    #[error("http error {status}: {body}")]
    Http {
        status: u16,
        body: String,
        headers: HeaderMap,
    },
    /// The attempt (or the whole retry chain) was cancelled by the caller.
    #[error("request cancelled: {reason}")]
    Cancelled { reason: String },
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl RequestError {
    /// HTTP status code of the failed response, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            Self::Cancelled { .. } | Self::Decode(_) => None,
        }
    }

    /// Response headers of the failed response, if any were received.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            Self::Http { headers, .. } => Some(headers),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    use super::RequestError;

    #[test]
    fn http_error_exposes_status_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        let err = RequestError::Http {
            status: 503,
            body: "busy".to_owned(),
            headers,
        };

        assert_eq!(err.status(), Some(503));
        assert_eq!(
            err.headers().and_then(|h| h.get("retry-after")),
            Some(&HeaderValue::from_static("3"))
        );
        assert_eq!(err.to_string(), "http error 503: busy");
    }

    #[test]
    fn cancelled_has_no_status() {
        let err = RequestError::Cancelled {
            reason: "user".to_owned(),
        };
        assert!(err.is_cancelled());
        assert_eq!(err.status(), None);
        assert!(err.headers().is_none());
    }
}
