use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::{RequestError, RequestOptions, Response, Result, Transport};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn join_failure(err: JoinError) -> RequestError {
    if err.is_panic() {
        std::panic::resume_unwind(err.into_panic());
    }
    RequestError::Cancelled {
        reason: "runtime shutting down".to_owned(),
    }
}

/// Cancels one pending operation. Cloning yields another handle to the same
/// operation.
#[derive(Clone, Debug, Default)]
pub struct Canceller {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl Canceller {
    /// Requests cancellation. The first reason given is the one reported.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut slot = lock(&self.reason);
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub(crate) fn reason(&self) -> String {
        lock(&self.reason).clone().unwrap_or_default()
    }

    pub(crate) fn error(&self) -> RequestError {
        RequestError::Cancelled {
            reason: self.reason(),
        }
    }
}

/// One in-flight attempt.
///
/// Awaiting the handle yields the attempt's outcome: `Ok` on a 2xx response,
/// `Err` with status, body and headers otherwise.
pub struct RequestHandle {
    pub(crate) task: JoinHandle<Result<Response>>,
    pub(crate) canceller: Canceller,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) options: RequestOptions,
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("method", &self.options.method)
            .field("url", &self.options.url)
            .field("cancelled", &self.canceller.is_cancelled())
            .finish()
    }
}

/// Issues `options` through `transport` and returns the attempt's handle.
///
/// The request starts immediately on the current tokio runtime, whether or
/// not the handle is awaited.
pub fn execute(transport: Arc<dyn Transport>, options: RequestOptions) -> RequestHandle {
    let canceller = Canceller::default();
    let pending = transport.send(&options);
    let watch = canceller.clone();
    let task = tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = watch.cancelled() => Err(watch.error()),
            outcome = pending => outcome,
        }
    });

    RequestHandle {
        task,
        canceller,
        transport,
        options,
    }
}

impl RequestHandle {
    /// Aborts the attempt if it is still pending; it then settles with
    /// [`RequestError::Cancelled`]. No effect once settled.
    pub fn cancel(&self, reason: impl Into<String>) {
        if !self.task.is_finished() {
            self.canceller.cancel(reason);
        }
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }
}

impl Future for RequestHandle {
    type Output = Result<Response>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(err)) => Poll::Ready(Err(join_failure(err))),
        }
    }
}
