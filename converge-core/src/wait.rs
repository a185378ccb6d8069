//! Bounded state poller.
//!
//! Every asynchronous remote transition (create -> active, attach, detach,
//! update settling) is awaited through [`await_condition`], parameterized per
//! call site by a [`WaitSpec`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ClientResult, WaitError};

/// Wait parameters for one call site.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitSpec {
    /// Status being waited for, used in log lines.
    pub target: &'static str,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// How long "not found" counts as pending rather than a failure.
    pub not_found_grace: Duration,
    /// Extra random delay per poll as a fraction of the interval, in `0.0..=1.0`.
    pub jitter: f64,
}

impl WaitSpec {
    pub fn new(target: &'static str, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            target,
            timeout,
            poll_interval,
            not_found_grace: Duration::ZERO,
            jitter: 0.0,
        }
    }

    pub fn with_not_found_grace(mut self, grace: Duration) -> Self {
        self.not_found_grace = grace;
        self
    }

    /// Non-finite values disable jitter; the rest are clamped to `0.0..=1.0`.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = bounded_jitter(jitter);
        self
    }

    /// Upper bound on polls for this spec: one per interval plus the first.
    pub fn max_polls(&self) -> u64 {
        let interval = self.poll_interval.as_millis().max(1);
        u64::try_from(self.timeout.as_millis() / interval)
            .unwrap_or(u64::MAX)
            .saturating_add(1)
    }

    fn next_delay(&self) -> Duration {
        let jitter = bounded_jitter(self.jitter);
        if jitter <= 0.0 {
            return self.poll_interval;
        }
        let extra = rand::thread_rng().gen_range(0.0..jitter);
        self.poll_interval.saturating_add(self.poll_interval.mul_f64(extra))
    }
}

fn bounded_jitter(jitter: f64) -> f64 {
    if jitter.is_finite() {
        jitter.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// What one poll saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    Done(T),
    Pending(String),
    Failed { status: String, reason: String },
}

/// Caller-supplied cancellation signal (e.g. process shutdown).
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Option<watch::Receiver<bool>>);

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self(None)
    }

    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self(Some(rx))
    }

    /// Create a sender/cancellation pair; send `true` to cancel.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::new(rx))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancelled. Never resolves if the sender is gone uncancelled.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.0.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

/// Poll `check` until it reports done, reports a terminal failure, the timeout
/// elapses, or `cancel` fires.
///
/// "Not found" from the check is pending while within the `WaitSpec` grace window
/// and an error afterwards. Any other client error is returned as-is: retrying
/// transport failures is the caller's policy. A check already in flight when
/// cancellation fires still completes, and its success is returned.
pub async fn await_condition<T, F, Fut>(
    spec: &WaitSpec,
    cancel: &Cancellation,
    mut check: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<Observation<T>>>,
{
    let started = Instant::now();
    let deadline = started + spec.timeout;
    let mut cancel = cancel.clone();
    let mut last_status: Option<String> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled { last_status });
        }

        match check().await {
            Ok(Observation::Done(value)) => return Ok(value),
            Ok(Observation::Pending(status)) => {
                debug!("Waiting for {}: status {}", spec.target, status);
                last_status = Some(status);
            }
            Ok(Observation::Failed { status, reason }) => {
                return Err(WaitError::Terminal { status, reason });
            }
            Err(e) if e.is_not_found() && started.elapsed() < spec.not_found_grace => {
                debug!("Waiting for {}: not visible yet", spec.target);
                last_status = Some("not found".to_string());
            }
            Err(e) => return Err(WaitError::Client(e)),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                elapsed: now - started,
                last_status,
            });
        }

        let delay = spec.next_delay().min(deadline - now);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(WaitError::Cancelled { last_status });
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                elapsed: now - started,
                last_status,
            });
        }
    }
}
