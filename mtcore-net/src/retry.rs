//! Reconnect backoff and per-call retry policies.

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::consts::{MAX_RETRY_DELAY_MS, RETRY_STEPS_MS};
use crate::errors::InvocationError;

/// Delay before the next reconnect attempt.
///
/// Walks 1, 2, 3, 1000 ms and then doubles up to 64 s. Any good receive
/// calls [`reset`](Self::reset).
#[derive(Clone, Debug, Default)]
pub struct Backoff {
    attempt: usize,
    last_ms: u64,
}

impl Backoff {
    pub fn new() -> Self { Self::default() }

    /// The delay to wait now; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let ms = match RETRY_STEPS_MS.get(self.attempt) {
            Some(&ms) => ms,
            None => (self.last_ms * 2).min(MAX_RETRY_DELAY_MS),
        };
        self.attempt += 1;
        self.last_ms = ms;
        Duration::from_millis(ms)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_ms = 0;
    }

    /// Attempts since the last reset.
    pub fn attempts(&self) -> usize { self.attempt }
}

/// Controls how [`Session::invoke`](crate::Session::invoke) reacts when a call fails.
pub trait RetryPolicy: Send + Sync + 'static {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> ControlFlow<(), Duration>;
}

/// Context passed to [`RetryPolicy::should_retry`] on each failure.
pub struct RetryContext<'a> {
    pub fail_count:   NonZeroU32,
    pub slept_so_far: Duration,
    pub error:        &'a InvocationError,
}

/// Never retry.
pub struct NoRetries;

impl RetryPolicy for NoRetries {
    fn should_retry(&self, _: &RetryContext<'_>) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Sleep through short `FLOOD_WAIT`s and retry once after a dropped link.
pub struct AutoSleep {
    pub threshold:     Duration,
    pub dropped_delay: Option<Duration>,
}

impl Default for AutoSleep {
    fn default() -> Self {
        Self {
            threshold:     Duration::from_secs(60),
            dropped_delay: Some(Duration::from_secs(1)),
        }
    }
}

impl RetryPolicy for AutoSleep {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> ControlFlow<(), Duration> {
        let first = ctx.fail_count.get() == 1;
        if let Some(secs) = ctx.error.flood_wait_seconds() {
            if first && secs <= self.threshold.as_secs() {
                tracing::info!("[retry] FLOOD_WAIT_{secs}, sleeping before retry");
                return ControlFlow::Continue(Duration::from_secs(secs));
            }
            return ControlFlow::Break(());
        }
        match (first && ctx.error.is_transient(), self.dropped_delay) {
            (true, Some(delay)) => {
                tracing::info!("[retry] {}, retrying in {delay:?}", ctx.error);
                ControlFlow::Continue(delay)
            }
            _ => ControlFlow::Break(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RpcError;

    #[test]
    fn backoff_sequence() {
        let mut b = Backoff::new();
        let seen: Vec<u64> = (0..11).map(|_| b.next_delay().as_millis() as u64).collect();
        assert_eq!(seen, [1, 2, 3, 1000, 2000, 4000, 8000, 16000, 32000, 64000, 64000]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(1));
    }

    #[test]
    fn auto_sleep_honours_short_flood_waits_once() {
        let policy = AutoSleep::default();
        let error = InvocationError::Rpc(RpcError::from_telegram(420, "FLOOD_WAIT_5"));
        let mut ctx = RetryContext {
            fail_count: NonZeroU32::MIN,
            slept_so_far: Duration::ZERO,
            error: &error,
        };
        assert_eq!(policy.should_retry(&ctx), ControlFlow::Continue(Duration::from_secs(5)));
        ctx.fail_count = NonZeroU32::new(2).unwrap();
        assert_eq!(policy.should_retry(&ctx), ControlFlow::Break(()));

        let long = InvocationError::Rpc(RpcError::from_telegram(420, "FLOOD_WAIT_600"));
        let ctx = RetryContext { fail_count: NonZeroU32::MIN, slept_so_far: Duration::ZERO, error: &long };
        assert_eq!(policy.should_retry(&ctx), ControlFlow::Break(()));
    }

    #[test]
    fn rpc_errors_are_final() {
        let error = InvocationError::Rpc(RpcError::from_telegram(400, "BAD_REQUEST"));
        let ctx = RetryContext { fail_count: NonZeroU32::MIN, slept_so_far: Duration::ZERO, error: &error };
        assert_eq!(AutoSleep::default().should_retry(&ctx), ControlFlow::Break(()));
        assert_eq!(NoRetries.should_retry(&ctx), ControlFlow::Break(()));
    }
}
