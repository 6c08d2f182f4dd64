//! Retry/backoff policy: exponential backoff with a 2s base capped
//! at 60s, a strict 60s floor on rate-limit breaches, and elapsed-time
//! accounting for `WaybackRetryError`.
//!
//! `retry` below times the whole attempt sequence and converts an
//! exhausted *transient* error into `Error::WaybackRetry`, while letting
//! semantic errors (robots-blocked, no-memento, etc) pass through
//! unwrapped since retrying them can never change the outcome.

use crate::error::Error;
use core::pin::Pin;
use futures::{
    task::{Context, Poll},
    Future,
};
use log::{log, Level};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tryhard::{
    backoff_strategies::BackoffStrategy, OnRetry, RetryFuture, RetryFutureConfig, RetryPolicy,
};

const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Allows an error type to define retry behavior for specific variants.
///
/// `max_retries` is NOT fixed here: search and memento fetches have
/// different, session-configurable attempt counts, so the caller passes
/// its own limit into [`retry_config`](Retryable::retry_config) rather
/// than this trait hard-coding one number for every call site.
pub trait Retryable {
    fn default_initial_delay() -> Duration;
    fn log_level() -> Option<Level>;
    fn custom_retry_policy(&self) -> Option<RetryPolicy>;

    fn new_backoff() -> ErrorBackoff<Self> {
        ErrorBackoff {
            delay: Self::default_initial_delay(),
            _error: PhantomData,
        }
    }

    fn retry_config(max_retries: u32) -> RetryFutureConfig<ErrorBackoff<Self>, LogOnRetry> {
        RetryFutureConfig::new(max_retries)
            .on_retry(LogOnRetry {
                level: Self::log_level(),
            })
            .custom_backoff(Self::new_backoff())
    }
}

pub struct ErrorBackoff<E: ?Sized> {
    delay: Duration,
    _error: PhantomData<E>,
}

impl<'a, E: Retryable> BackoffStrategy<'a, E> for ErrorBackoff<E> {
    type Output = RetryPolicy;

    fn delay(&mut self, _attempt: u32, error: &'a E) -> RetryPolicy {
        error.custom_retry_policy().unwrap_or_else(|| {
            let prev_delay = self.delay;
            self.delay = (self.delay * 2).min(BACKOFF_CAP);
            RetryPolicy::Delay(prev_delay)
        })
    }
}

pub struct LogFuture {
    level: Option<Level>,
    message: Option<String>,
}

impl Future for LogFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if let Some(level) = self.level {
            log!(
                level,
                "{}",
                self.message
                    .take()
                    .expect("LogFuture polled after completion")
            );
        }
        Poll::Ready(())
    }
}

pub struct LogOnRetry {
    level: Option<Level>,
}

impl<E: Debug> OnRetry<E> for LogOnRetry {
    type Future = LogFuture;

    fn on_retry(
        &mut self,
        attempts: u32,
        next_delay: Option<Duration>,
        previous_error: &E,
    ) -> Self::Future {
        match next_delay {
            Some(delay) => {
                let message = self.level.map(|_| {
                    format!(
                        "Retry {}; waiting {:?} after error: {:?}",
                        attempts, delay, previous_error
                    )
                });
                LogFuture {
                    level: self.level,
                    message,
                }
            }
            None => LogFuture {
                level: None,
                message: None,
            },
        }
    }
}

/// Execute a future with retries where the error type is `Retryable`.
pub fn retry_future<F, Fut, T, E>(
    max_retries: u32,
    f: F,
) -> RetryFuture<F, Fut, ErrorBackoff<E>, LogOnRetry>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    tryhard::retry_fn(f).with_config(E::retry_config(max_retries))
}

/// Execute a future, retrying on transient [`Error`] variants up to
/// `max_retries` attempts (the session's per-endpoint configuration),
/// and convert an exhausted transient error into `Error::WaybackRetry`
/// with the elapsed wall-clock time since the first attempt.
///
/// Two kinds of error are surfaced unwrapped instead: semantic
/// conditions (`custom_retry_policy` returns `Break`), since retrying
/// them can never change the outcome; and an exhausted
/// `Error::RateLimit`, since it already carries the `retry_after` a
/// caller needs to retry at a higher level and wrapping it would throw
/// that away.
pub async fn retry<F, Fut, T>(max_retries: u32, f: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let started = Instant::now();
    match retry_future(max_retries, f).await {
        Ok(value) => Ok(value),
        Err(error @ Error::RateLimit { .. }) => Err(error),
        Err(error) => {
            let is_transient = !matches!(error.custom_retry_policy(), Some(RetryPolicy::Break));
            if is_transient {
                Err(Error::WaybackRetry {
                    elapsed: started.elapsed(),
                    cause: error.to_string(),
                })
            } else {
                Err(error)
            }
        }
    }
}
