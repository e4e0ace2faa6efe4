use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::RequestError;

/// Retry configuration supplied when enabling retry on a request handle.
///
/// `max_attempts` counts the attempts still allowed, the current one
/// included. A value of `0` is treated like `1`: the handle passes its
/// outcome through and never retries.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts remaining, decremented on every retry.
    pub max_attempts: u32,
    /// Delay before a retry when the server sends no usable `Retry-After`.
    pub fixed_delay_ms: u64,
    /// Status codes eligible for retry. `None` retries every failure.
    pub retryable_status_codes: Option<BTreeSet<u16>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            fixed_delay_ms: 0,
            retryable_status_codes: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` total attempts, no delay and
    /// no status filter.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_fixed_delay_ms(mut self, fixed_delay_ms: u64) -> Self {
        self.fixed_delay_ms = fixed_delay_ms;
        self
    }

    /// Restricts retries to failures carrying one of `codes`.
    pub fn with_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retryable_status_codes = Some(codes.into_iter().collect());
        self
    }

    /// Builds a policy from environment variables.
    ///
    /// Reads:
    /// - `HTTP_RETRY_MAX_ATTEMPTS` — total attempts (default `1`)
    /// - `HTTP_RETRY_FIXED_DELAY_MS` — fallback delay (default `0`)
    /// - `HTTP_RETRY_STATUS_CODES` — comma separated codes, e.g. `500,502,503`
    ///
    /// Missing variables keep their defaults; malformed values are an error.
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut policy = Self::default();

        if let Some(raw) = lookup("HTTP_RETRY_MAX_ATTEMPTS") {
            policy.max_attempts = raw
                .trim()
                .parse()
                .map_err(|err| format!("invalid HTTP_RETRY_MAX_ATTEMPTS '{raw}': {err}"))?;
        }
        if let Some(raw) = lookup("HTTP_RETRY_FIXED_DELAY_MS") {
            policy.fixed_delay_ms = raw
                .trim()
                .parse()
                .map_err(|err| format!("invalid HTTP_RETRY_FIXED_DELAY_MS '{raw}': {err}"))?;
        }
        if let Some(raw) = lookup("HTTP_RETRY_STATUS_CODES") {
            if !raw.trim().is_empty() {
                let codes = raw
                    .split(',')
                    .map(|code| {
                        code.trim().parse::<u16>().map_err(|err| {
                            format!("invalid status code '{code}' in HTTP_RETRY_STATUS_CODES: {err}")
                        })
                    })
                    .collect::<std::result::Result<BTreeSet<u16>, String>>()?;
                policy.retryable_status_codes = Some(codes);
            }
        }

        Ok(policy)
    }

    /// Attempts remaining, with `0` normalized to `1`.
    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Policy for the next attempt: same delay and status filter, one attempt
    /// fewer.
    pub fn decrement(&self) -> Self {
        Self {
            max_attempts: self.attempts_remaining() - 1,
            ..self.clone()
        }
    }

    /// Whether `failure` may be retried under this policy, ignoring the
    /// attempt budget.
    pub fn is_retryable(&self, failure: &RequestError) -> bool {
        if failure.is_cancelled() {
            return false;
        }
        match &self.retryable_status_codes {
            None => true,
            Some(codes) => failure.status().is_some_and(|status| codes.contains(&status)),
        }
    }

    /// Whether a retry should follow `failure` given the remaining budget.
    pub fn should_retry(&self, failure: &RequestError) -> bool {
        self.attempts_remaining() > 1 && self.is_retryable(failure)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use reqwest::header::HeaderMap;

    use super::RetryPolicy;
    use crate::RequestError;

    fn http(status: u16) -> RequestError {
        RequestError::Http {
            status,
            body: String::new(),
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn zero_attempts_behaves_like_one() {
        let policy = RetryPolicy::new(0);
        assert_eq!(policy.attempts_remaining(), 1);
        assert!(!policy.should_retry(&http(500)));
        assert_eq!(policy.decrement().max_attempts, 0);
    }

    #[test]
    fn decrement_keeps_delay_and_codes() {
        let policy = RetryPolicy::new(3)
            .with_fixed_delay_ms(250)
            .with_status_codes([500, 502]);
        let next = policy.decrement();
        assert_eq!(next.max_attempts, 2);
        assert_eq!(next.fixed_delay_ms, 250);
        assert_eq!(next.retryable_status_codes, policy.retryable_status_codes);
    }

    #[test]
    fn status_filter_rejects_unlisted_codes() {
        let policy = RetryPolicy::new(3).with_status_codes([500, 502]);
        assert!(policy.should_retry(&http(502)));
        assert!(!policy.should_retry(&http(503)));
    }

    #[test]
    fn without_filter_every_failure_except_cancel_is_retryable() {
        let policy = RetryPolicy::new(2);
        assert!(policy.should_retry(&http(404)));
        assert!(policy.should_retry(&RequestError::Decode("bad".to_owned())));
        assert!(!policy.should_retry(&RequestError::Cancelled {
            reason: "stop".to_owned()
        }));
    }

    #[test]
    fn filter_never_matches_failures_without_status() {
        let policy = RetryPolicy::new(2).with_status_codes([500]);
        assert!(!policy.should_retry(&RequestError::Decode("bad".to_owned())));
    }

    #[test]
    fn from_lookup_reads_all_variables() {
        let vars = HashMap::from([
            ("HTTP_RETRY_MAX_ATTEMPTS", "4"),
            ("HTTP_RETRY_FIXED_DELAY_MS", "150"),
            ("HTTP_RETRY_STATUS_CODES", "503, 500,429"),
        ]);
        let policy =
            RetryPolicy::from_lookup(|name| vars.get(name).map(|value| (*value).to_owned()))
                .expect("policy must parse");

        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.fixed_delay_ms, 150);
        assert_eq!(
            policy.retryable_status_codes,
            Some([429, 500, 503].into_iter().collect())
        );
    }

    #[test]
    fn from_lookup_defaults_when_unset() {
        let policy = RetryPolicy::from_lookup(|_| None).expect("policy must parse");
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn from_lookup_rejects_malformed_codes() {
        let err = RetryPolicy::from_lookup(|name| {
            (name == "HTTP_RETRY_STATUS_CODES").then(|| "500,abc".to_owned())
        })
        .expect_err("malformed code must fail");
        assert!(err.contains("abc"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts": 3, "retryable_status_codes": [500]}"#)
                .expect("policy json must parse");
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.fixed_delay_ms, 0);
        assert_eq!(policy.retryable_status_codes, Some([500].into_iter().collect()));
    }
}
