use std::{future::Future, time::Duration};

use futures::future::LocalBoxFuture;

use crate::FetchError;


/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture<T> = LocalBoxFuture<'static, Result<T, FetchError>>;

/// Asynchronous source of records, one fetch per key.
///
/// The transport behind this trait is external to the crate; the
/// [`FetchPool`](crate::FetchPool) calls [`fetch`](Self::fetch) once per
/// fetch attempt and drops the returned future to cancel it.
pub trait Fetcher<K, T> {
    /// Starts fetching the record for `key`.
    fn fetch(&self, key: &K) -> FetchFuture<T>;

    /// Waits before the next retry attempt.
    ///
    /// The default implementation resolves immediately. Hosts with a timer
    /// should override this so transient failures actually back off.
    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let _ = duration;
        Box::pin(std::future::ready(()))
    }
}

/// Adapts an async closure to a [`Fetcher`].
///
/// ```
/// use queryset::{fetch_fn, FetchError};
///
/// let fetcher = fetch_fn(|key: String| async move { Ok::<_, FetchError>(key.len()) });
/// # let _ = fetcher;
/// ```
pub fn fetch_fn<F>(f: F) -> FnFetcher<F> {
    FnFetcher(f)
}

/// See [`fetch_fn`].
pub struct FnFetcher<F>(F);

impl<K, T, F, Fut> Fetcher<K, T> for FnFetcher<F>
where
    K: Clone,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + 'static,
{
    fn fetch(&self, key: &K) -> FetchFuture<T> {
        Box::pin((self.0)(key.clone()))
    }
}

/// Retry configuration for transient fetch failures.
///
/// A slot's fetch is attempted up to `max_attempts` times; between attempts
/// the pool waits an exponentially growing backoff, starting at
/// `initial_backoff` and capped at `max_backoff`. Permanent failures are
/// never retried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// # Panics
    ///
    /// Panics if `max_attempts` is zero.
    pub fn new(max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "`max_attempts` must be at least 1");
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1)
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retrying after the failure of attempt `attempt`
    /// (zero-based): `initial * 2^attempt`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}
