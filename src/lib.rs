//! `retryable-http` adds opt-in retries to asynchronous HTTP request handles.
//!
//! Issue a request with [`execute`], then call [`RequestHandle::retry`] to get
//! a [`RetryHandle`] that:
//! - reissues the identical request while the [`RetryPolicy`] allows it
//! - honors `Retry-After` hints (seconds or HTTP date)
//! - settles with the first success or the last attempt's failure
//! - cancels whichever attempt is current, including a pending backoff wait
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use retryable_http::{execute, HttpTransport, RequestOptions, RetryPolicy};
//!
//! # async fn run() -> retryable_http::Result<()> {
//! let transport = Arc::new(HttpTransport::new());
//! let response = execute(transport, RequestOptions::get("https://example.com/status"))
//!     .retry(RetryPolicy::new(3).with_fixed_delay_ms(500).with_status_codes([502, 503]))
//!     .await?;
//! println!("{}", response.body);
//! # Ok(())
//! # }
//! ```

mod error;
mod handle;
mod options;
mod policy;
mod retry;
mod retry_after;
mod transport;

pub use error::RequestError;
pub use handle::{execute, Canceller, RequestHandle};
pub use options::ClientOptions;
pub use policy::RetryPolicy;
pub use retry::RetryHandle;
pub use retry_after::{parse_http_date, retry_after_delay};
pub use transport::{HttpTransport, RequestOptions, Response, Transport};

pub type Result<T> = std::result::Result<T, RequestError>;
