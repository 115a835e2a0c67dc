//! Bounded poll-until-condition waits
//!
//! Used wherever one channel has to catch up with the other: the rendered
//! list after a create, the API listing after the UI reports success.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::debug;

use crate::error::E2eResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Attempt budget for a hand-written poll loop.
///
/// For probes that need `&mut` access (the interface driver) and so cannot be
/// passed to [`poll_until`] as a closure:
///
/// ```ignore
/// let mut poller = Poller::start(policy);
/// let seen = loop {
///     let seen = ui.is_category_visible_in_list(name).await?;
///     if seen || !poller.again().await {
///         break seen;
///     }
/// };
/// ```
#[derive(Debug)]
pub struct Poller {
    policy: PollPolicy,
    start: Instant,
    attempts: usize,
}

impl Poller {
    pub fn start(policy: PollPolicy) -> Self {
        Self {
            policy,
            start: Instant::now(),
            attempts: 1,
        }
    }

    /// Sleep one interval and return `true`, or `false` once another attempt
    /// would overrun the timeout.
    pub async fn again(&mut self) -> bool {
        if self.start.elapsed() + self.policy.interval > self.policy.timeout {
            debug!("Gave up after {} attempts ({:?})", self.attempts, self.start.elapsed());
            return false;
        }
        sleep(self.policy.interval).await;
        self.attempts += 1;
        true
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// What the last probe saw, and whether it satisfied the condition
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome<T> {
    pub satisfied: bool,
    pub last: T,
    pub attempts: usize,
    pub elapsed: Duration,
}

/// Run `probe` until `done` accepts its value or the policy's timeout elapses.
///
/// The probe always runs at least once. Probe errors abort the wait.
pub async fn poll_until<T, F, Fut, P>(policy: PollPolicy, mut probe: F, done: P) -> E2eResult<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<T>>,
    P: Fn(&T) -> bool,
{
    let mut poller = Poller::start(policy);

    loop {
        let value = probe().await?;
        let satisfied = done(&value);

        if satisfied || !poller.again().await {
            return Ok(PollOutcome {
                satisfied,
                last: value,
                attempts: poller.attempts(),
                elapsed: poller.elapsed(),
            });
        }
    }
}
