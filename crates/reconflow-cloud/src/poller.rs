//! State poller
//!
//! Waits for a remote object to reach one of a set of target states. The
//! decision logic lives in [`PollMachine`], a pure step function; the
//! [`StatePoller`] drives it with remote reads, a [`Scheduler`] for time and
//! a [`CancelToken`].

use crate::client::RemoteClient;
use crate::error::{CloudError, Result};
use crate::identity::Identity;
use crate::kind::ResourceKind;
use crate::state::{RemoteState, RemoteStatus};
use async_trait::async_trait;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Polling cadence and limits
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Base interval between reads
    pub interval: Duration,
    /// Random extra delay as a fraction of the interval (0.0 - 1.0)
    pub jitter: f64,
    /// Overall deadline for one wait
    pub deadline: Duration,
    /// How long a freshly created object may stay invisible
    pub not_found_grace: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            jitter: 0.1,
            deadline: Duration::from_secs(20 * 60),
            not_found_grace: Duration::from_secs(60),
        }
    }
}

impl PollConfig {
    /// Upper bound on reads for a wait with the given deadline
    pub fn max_attempts(&self, deadline: Duration) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let attempts = deadline.as_millis() / interval + 1;
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_range = self.interval.as_millis() as f64 * self.jitter;
        let jitter = if jitter_range >= 1.0 {
            rand::thread_rng().gen_range(0.0..jitter_range).floor() as u64
        } else {
            0
        };
        self.interval.saturating_add(Duration::from_millis(jitter))
    }
}

/// Source of time for the poller
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Monotonic time since an arbitrary origin
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock scheduler backed by tokio timers
pub struct TokioScheduler {
    origin: tokio::time::Instant,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Scheduler whose clock only moves when something sleeps
///
/// Lets tests run hour-long waits instantly.
#[derive(Default)]
pub struct VirtualScheduler {
    now: Mutex<Duration>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += duration;
    }
}

#[async_trait]
impl Scheduler for VirtualScheduler {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Cancels every wait holding a clone of the paired [`CancelToken`]
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelToken { rx: Some(rx) })
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// Token that is never canceled
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_canceled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once canceled; pends forever if the handle is dropped first
    pub async fn canceled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
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

/// How `NotFound` is treated during a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// The object was just created and may not be visible yet
    Creation,
    /// The object is known to exist; `NotFound` means it is gone
    Convergence,
}

#[derive(Debug)]
pub enum PollDecision {
    Settled(RemoteState),
    Retry(Duration),
    Failed(CloudError),
}

/// Pure decision logic of one wait
pub struct PollMachine {
    kind: ResourceKind,
    identity: String,
    targets: Vec<RemoteStatus>,
    deadline: Duration,
    mode: WaitMode,
    config: PollConfig,
    attempts: u32,
    last_state: String,
    not_found_since: Option<Duration>,
}

impl PollMachine {
    pub fn new(
        identity: &Identity,
        targets: &[RemoteStatus],
        deadline: Duration,
        mode: WaitMode,
        config: PollConfig,
    ) -> Self {
        Self {
            kind: identity.kind(),
            identity: identity.to_string(),
            targets: targets.to_vec(),
            deadline,
            mode,
            config,
            attempts: 0,
            last_state: "unknown".to_string(),
            not_found_since: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decide what to do after the read that completed `elapsed` into the wait
    pub fn step(&mut self, elapsed: Duration, observation: Result<RemoteState>) -> PollDecision {
        self.attempts += 1;

        match observation {
            Ok(state) => {
                self.not_found_since = None;
                self.last_state = state.status_label();
                if self.kind.behavior().is_failure(state.status) {
                    return PollDecision::Failed(CloudError::ProvisioningFailed {
                        kind: self.kind,
                        identity: self.identity.clone(),
                        state: self.last_state.clone(),
                        message: "remote reported a failure state".to_string(),
                    });
                }
                let settled = match state.status {
                    _ if self.targets.is_empty() => true,
                    Some(status) => self.targets.contains(&status),
                    None => false,
                };
                if settled {
                    return PollDecision::Settled(state);
                }
            }
            Err(err) if err.is_not_found() => {
                if self.mode == WaitMode::Convergence {
                    return PollDecision::Failed(err);
                }
                let since = *self.not_found_since.get_or_insert(elapsed);
                if elapsed.saturating_sub(since) >= self.config.not_found_grace {
                    return PollDecision::Failed(CloudError::ProvisioningFailed {
                        kind: self.kind,
                        identity: self.identity.clone(),
                        state: "not_found".to_string(),
                        message: format!(
                            "object still not visible after {:?}",
                            self.config.not_found_grace
                        ),
                    });
                }
                self.last_state = "not_found".to_string();
            }
            Err(err) if err.is_transient() => {
                tracing::debug!(
                    kind = %self.kind,
                    identity = %self.identity,
                    attempt = self.attempts,
                    "Transient read failure while polling: {}",
                    err
                );
            }
            Err(err) => return PollDecision::Failed(err),
        }

        if elapsed >= self.deadline || self.attempts >= self.config.max_attempts(self.deadline) {
            return PollDecision::Failed(CloudError::Timeout {
                kind: self.kind,
                identity: self.identity.clone(),
                elapsed,
                last_state: self.last_state.clone(),
            });
        }

        let remaining = self.deadline.saturating_sub(elapsed);
        PollDecision::Retry(self.config.next_delay().min(remaining))
    }
}

/// Drives [`PollMachine`] against a remote client
pub struct StatePoller {
    client: Arc<dyn RemoteClient>,
    scheduler: Arc<dyn Scheduler>,
    cancel: CancelToken,
    config: PollConfig,
}

impl StatePoller {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        scheduler: Arc<dyn Scheduler>,
        cancel: CancelToken,
        config: PollConfig,
    ) -> Self {
        Self {
            client,
            scheduler,
            cancel,
            config,
        }
    }

    /// Read until the object reaches one of `targets`
    ///
    /// An empty `targets` set settles on the first successful read.
    pub async fn wait_for_state(
        &self,
        identity: &Identity,
        targets: &[RemoteStatus],
        deadline: Duration,
        mode: WaitMode,
    ) -> Result<RemoteState> {
        let canceled = || CloudError::Canceled {
            kind: identity.kind(),
            identity: identity.to_string(),
        };
        let start = self.scheduler.now();
        let mut machine = PollMachine::new(identity, targets, deadline, mode, self.config.clone());

        loop {
            if self.cancel.is_canceled() {
                return Err(canceled());
            }

            // a read may sit in a retry backoff; dropping it stops the retries
            let observation = tokio::select! {
                observation = self.client.read(identity) => observation,
                _ = self.cancel.canceled() => return Err(canceled()),
            };
            let elapsed = self.scheduler.now().saturating_sub(start);

            match machine.step(elapsed, observation) {
                PollDecision::Settled(state) => {
                    tracing::debug!(
                        kind = %identity.kind(),
                        identity = %identity,
                        attempt = machine.attempts(),
                        state = %state.status_label(),
                        "Reached target state"
                    );
                    return Ok(state);
                }
                PollDecision::Failed(err) => return Err(err),
                PollDecision::Retry(delay) => {
                    tracing::debug!(
                        kind = %identity.kind(),
                        identity = %identity,
                        attempt = machine.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Waiting for target state"
                    );
                    tokio::select! {
                        _ = self.scheduler.sleep(delay) => {}
                        _ = self.cancel.canceled() => return Err(canceled()),
                    }
                }
            }
        }
    }
}
