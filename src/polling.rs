//! # Bounded Polling
//!
//! Server-side operations (cherry-picks, policy evaluations) finish on their
//! own schedule, so the orchestrator waits for them by re-querying. Waiting
//! here is cooperative: a [`Sleeper`] does the blocking, a
//! [`CancellationToken`] can stop the loop between probes, and a
//! [`PollPolicy`] decides how long to wait between probes and when to give up.
//!
//! The time budget is measured as the sum of requested sleeps, not wall-clock
//! time, so a probe that itself takes long does not eat into it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

/// Shared flag that stops a run at the next phase boundary.
///
/// Cloning shares the flag. Cancelling never interrupts a call that is
/// already in flight.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancelled.
    pub fn check(&self, phase: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                phase: phase.to_string(),
            });
        }
        Ok(())
    }
}

/// Blocks the calling thread between probes.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// How often to probe and for how long.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Multiplier applied to the interval after every probe; `1.0` keeps it
    /// fixed.
    pub backoff_factor: f64,
    pub max_interval: Duration,
    /// `None` waits until the probe reports completion.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Fixed interval, no timeout.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            backoff_factor: 1.0,
            max_interval: interval,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_interval = max_interval;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_factor <= 1.0 {
            return current;
        }
        current
            .mul_f64(self.backoff_factor)
            .min(self.max_interval.max(self.interval))
    }
}

/// What a probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    Pending,
}

/// Probe until it returns [`Poll::Ready`].
///
/// `probe` receives the 1-based attempt number. A probe error ends the loop
/// immediately. Fails with [`Error::Timeout`] once the policy's budget is
/// spent and with [`Error::Cancelled`] when `cancel` fires between probes.
pub fn poll_until<T>(
    what: &str,
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    mut probe: impl FnMut(u32) -> Result<Poll<T>>,
) -> Result<T> {
    let mut attempt = 0u32;
    let mut waited = Duration::ZERO;
    let mut interval = policy.interval;

    loop {
        attempt += 1;
        if let Poll::Ready(value) = probe(attempt)? {
            debug!("{} ready after {} probe(s)", what, attempt);
            return Ok(value);
        }

        let mut pause = interval;
        if let Some(timeout) = policy.timeout {
            if waited >= timeout {
                return Err(Error::Timeout {
                    what: what.to_string(),
                    waited,
                });
            }
            pause = pause.min(timeout - waited);
        }

        cancel.check(what)?;
        debug!("{} pending (probe {}), waiting {:?}", what, attempt, pause);
        sleeper.sleep(pause);
        waited += pause;
        interval = policy.next_interval(interval);
    }
}
