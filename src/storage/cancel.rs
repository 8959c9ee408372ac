//! Cancellable back-off between connect attempts.

use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

/// Sleeps between connect attempts on a private current-thread runtime,
/// racing the delay against a [`CancellationToken`].
///
/// The runtime is built on the first sleep and kept for later ones.
#[derive(Default)]
pub(crate) struct Backoff {
    runtime: Option<Runtime>,
}

impl Backoff {
    /// Waits for `delay` or until `token` fires.
    ///
    /// Returns `Ok(true)` if the wait ended because of cancellation.
    pub(crate) fn sleep(
        &mut self,
        token: &CancellationToken,
        delay: Duration,
    ) -> std::io::Result<bool> {
        if token.is_cancelled() {
            return Ok(true);
        }
        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => Builder::new_current_thread().enable_time().build()?,
        };
        let cancelled = runtime.block_on(async {
            tokio::select! {
                () = token.cancelled() => true,
                () = tokio::time::sleep(delay) => false,
            }
        });
        self.runtime = Some(runtime);
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_sleep_runs_to_completion_when_not_cancelled() {
        let token = CancellationToken::new();
        let mut backoff = Backoff::default();
        let start = Instant::now();
        assert!(!backoff.sleep(&token, Duration::from_millis(20)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(20));
        // The runtime is reused.
        assert!(!backoff.sleep(&token, Duration::from_millis(1)).unwrap());
    }

    #[test]
    fn test_cancel_interrupts_sleep() {
        let token = CancellationToken::new();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let start = Instant::now();
        assert!(Backoff::default().sleep(&token, Duration::from_secs(10)).unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_already_cancelled_returns_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let mut backoff = Backoff::default();
        assert!(backoff.sleep(&token, Duration::from_secs(10)).unwrap());
        assert!(backoff.runtime.is_none());
    }
}
