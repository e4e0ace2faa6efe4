//! Retry decorator for [`RequestHandle`].
//!
//! [`RequestHandle::retry`] turns a single attempt into a [`RetryHandle`]
//! that reissues the same request while the policy allows it and settles
//! with the first success or the last failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::{
    handle::{execute, join_failure, lock, Canceller},
    retry_after::retry_after_delay,
    RequestError, RequestHandle, Response, Result, RetryPolicy,
};

#[derive(Debug)]
struct Slot {
    current: Option<Canceller>,
    settled: bool,
}

/// State shared between the retry loop and the caller's [`RetryHandle`].
#[derive(Debug)]
struct RetryState {
    cancel: Canceller,
    slot: Mutex<Slot>,
    attempts: AtomicU32,
}

impl RetryState {
    fn new(first: Canceller) -> Self {
        Self {
            cancel: Canceller::default(),
            slot: Mutex::new(Slot {
                current: Some(first),
                settled: false,
            }),
            attempts: AtomicU32::new(1),
        }
    }

    fn cancel(&self, reason: String) {
        let slot = lock(&self.slot);
        if slot.settled {
            return;
        }
        self.cancel.cancel(reason.clone());
        if let Some(current) = &slot.current {
            current.cancel(reason);
        }
    }

    /// Issues the next attempt and binds it as the cancellation target,
    /// unless the chain was cancelled first.
    fn issue<F>(&self, start: F) -> Option<RequestHandle>
    where
        F: FnOnce() -> RequestHandle,
    {
        let mut slot = lock(&self.slot);
        if self.cancel.is_cancelled() {
            return None;
        }
        let handle = start();
        slot.current = Some(handle.canceller());
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Some(handle)
    }

    fn settle(&self) {
        let mut slot = lock(&self.slot);
        slot.current = None;
        slot.settled = true;
    }
}

/// Outcome of a request across all of its attempts.
///
/// Awaiting it yields the first successful response, or the failure of the
/// last attempt once the policy stops retrying. [`RetryHandle::cancel`]
/// targets whichever attempt is current, and also stops a pending backoff
/// wait.
///
/// The attempts run on a spawned task. Dropping the handle detaches that
/// task without cancelling it, so retries continue unobserved; call
/// [`RetryHandle::cancel`] first to stop them.
#[derive(Debug)]
pub struct RetryHandle {
    task: JoinHandle<Result<Response>>,
    state: Arc<RetryState>,
}

impl RetryHandle {
    /// Cancels the current attempt and prevents any further ones. The handle
    /// settles with [`RequestError::Cancelled`]. No effect once settled.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.state.cancel(reason.into());
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancel.is_cancelled()
    }

    /// Number of attempts issued so far, the first one included.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

impl Future for RetryHandle {
    type Output = Result<Response>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(err)) => Poll::Ready(Err(join_failure(err))),
        }
    }
}

impl RequestHandle {
    /// Enables retry on this attempt.
    ///
    /// The success path is untouched. On failure, `policy` decides whether
    /// the same request options are issued again, after the server's
    /// `Retry-After` delay or `policy.fixed_delay_ms`. With
    /// `policy.max_attempts <= 1` the returned handle settles exactly like
    /// this one.
    pub fn retry(self, policy: RetryPolicy) -> RetryHandle {
        let state = Arc::new(RetryState::new(self.canceller()));
        let task = tokio::spawn(run_attempts(self, policy, Arc::clone(&state)));
        RetryHandle { task, state }
    }
}

async fn run_attempts(
    first: RequestHandle,
    mut policy: RetryPolicy,
    state: Arc<RetryState>,
) -> Result<Response> {
    let mut handle = first;
    let outcome = loop {
        let failure = match (&mut handle).await {
            Ok(response) => break Ok(response),
            Err(failure) => failure,
        };

        if state.cancel.is_cancelled() {
            break Err(state.cancel.error());
        }
        if !policy.should_retry(&failure) {
            break Err(failure);
        }

        let delay = backoff_delay(&failure, &policy);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            url = %handle.options.url,
            status = ?failure.status(),
            attempts_remaining = policy.attempts_remaining() - 1,
            "retrying request after {} ms",
            delay.as_millis()
        );

        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = state.cancel.cancelled() => break Err(state.cancel.error()),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        policy = policy.decrement();
        let transport = Arc::clone(&handle.transport);
        let options = handle.options.clone();
        match state.issue(|| execute(transport, options)) {
            Some(next) => handle = next,
            None => break Err(state.cancel.error()),
        }
    };

    #[cfg(feature = "tracing")]
    if matches!(outcome, Err(RequestError::Cancelled { .. })) {
        tracing::debug!(url = %handle.options.url, "request cancelled");
    }

    state.settle();
    outcome
}

/// Server hint first, then the policy's fixed delay.
fn backoff_delay(failure: &RequestError, policy: &RetryPolicy) -> Duration {
    failure
        .headers()
        .and_then(|headers| retry_after_delay(headers, Utc::now()))
        .unwrap_or_else(|| Duration::from_millis(policy.fixed_delay_ms))
}
