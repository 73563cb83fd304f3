use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{NoiseError, Result};
use crate::live::policy::PollingPolicy;
use crate::live::window::LiveWindow;
use crate::model::{LivePoint, Reading};
use crate::settings::LiveSettings;
use crate::source::NoiseSource;

/// What a live subscription emits.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdate {
    /// Raw reading of the newest applied poll, on every successful poll.
    Latest { seq: u64, reading: Reading },
    /// A sample just appended to the chart window.
    Sample(LivePoint),
}

#[derive(Debug)]
struct LiveState {
    latest: Option<Reading>,
    applied_seq: u64,
    window: LiveWindow,
    last_sample_ms: Option<i64>,
}

impl LiveState {
    fn new(capacity: usize) -> Self {
        Self {
            latest: None,
            applied_seq: 0,
            window: LiveWindow::new(capacity),
            last_sample_ms: None,
        }
    }

    /// Claim `seq` as the newest applied poll. Responses at or below the
    /// applied sequence are refused.
    fn accept(&mut self, seq: u64) -> bool {
        if seq <= self.applied_seq {
            return false;
        }
        self.applied_seq = seq;
        true
    }
}

fn lock(state: &Mutex<LiveState>) -> MutexGuard<'_, LiveState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wall-clock milliseconds advanced by the runtime's monotonic clock.
struct SampleClock {
    origin_ms: i64,
    origin: Instant,
}

impl SampleClock {
    fn start() -> Self {
        Self {
            origin_ms: Utc::now().timestamp_millis(),
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> i64 {
        self.origin_ms + self.origin.elapsed().as_millis() as i64
    }
}

/// Starts per-sensor polling tasks against one source.
#[derive(Clone)]
pub struct LiveSampler {
    source: Arc<dyn NoiseSource>,
    window_capacity: usize,
    poll_timeout: Duration,
    update_buffer: usize,
}

impl LiveSampler {
    pub fn new(source: Arc<dyn NoiseSource>, settings: &LiveSettings) -> Self {
        Self {
            source,
            window_capacity: settings.window_capacity,
            poll_timeout: settings.poll_timeout(),
            update_buffer: settings.update_buffer.max(1),
        }
    }

    /// Start polling `sensor_id`. The first poll is issued immediately.
    ///
    /// A `Disabled` policy yields an inert subscription: no task, no updates.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, sensor_id: &str, policy: PollingPolicy) -> LiveSubscription {
        let state = Arc::new(Mutex::new(LiveState::new(self.window_capacity)));
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.update_buffer);

        let handle = match policy.interval() {
            Some(interval) => {
                info!(
                    "Live polling sensor {} via {} every {:?} ({:?})",
                    sensor_id, self.source.name(), interval, policy
                );
                let task = PollTask {
                    source: self.source.clone(),
                    sensor_id: sensor_id.to_string(),
                    policy,
                    interval,
                    poll_timeout: self.poll_timeout,
                    state: state.clone(),
                    updates: tx,
                    cancel: cancel.clone(),
                };
                Some(tokio::spawn(task.run()))
            }
            None => {
                warn!("Live polling disabled for sensor {}: unknown source", sensor_id);
                None
            }
        };

        LiveSubscription {
            sensor_id: sensor_id.to_string(),
            policy,
            state,
            updates: rx,
            cancel,
            handle,
        }
    }
}

struct PollTask {
    source: Arc<dyn NoiseSource>,
    sensor_id: String,
    policy: PollingPolicy,
    interval: Duration,
    poll_timeout: Duration,
    state: Arc<Mutex<LiveState>>,
    updates: mpsc::Sender<LiveUpdate>,
    cancel: CancellationToken,
}

impl PollTask {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let (done_tx, mut done_rx) = mpsc::channel::<(u64, Result<Reading>)>(1);
        let clock = SampleClock::start();
        let mut next_seq: u64 = 0;
        let mut in_flight: Option<u64> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some((seq, result)) = done_rx.recv() => {
                    if in_flight == Some(seq) {
                        in_flight = None;
                    }
                    self.apply(seq, result, &clock);
                }
                _ = ticker.tick() => {
                    if let Some(pending) = in_flight {
                        debug!("Sensor {}: poll #{} still in flight, skipping tick", self.sensor_id, pending);
                    } else {
                        next_seq += 1;
                        in_flight = Some(next_seq);
                        self.spawn_poll(next_seq, done_tx.clone());
                    }
                }
            }
        }

        info!("Live polling stopped for sensor {} after {} polls", self.sensor_id, next_seq);
    }

    fn spawn_poll(&self, seq: u64, done: mpsc::Sender<(u64, Result<Reading>)>) {
        let source = self.source.clone();
        let sensor_id = self.sensor_id.clone();
        let cancel = self.cancel.clone();
        let timeout = self.poll_timeout;

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                res = tokio::time::timeout(timeout, source.fetch_recent(&sensor_id)) => Some(match res {
                    Ok(result) => result,
                    Err(_) => Err(NoiseError::FetchFailure(format!("poll timed out after {:?}", timeout))),
                }),
            };
            if let Some(result) = outcome {
                // The loop may already be gone; nothing to deliver to then.
                let _ = done.send((seq, result)).await;
            }
        });
    }

    fn apply(&self, seq: u64, result: Result<Reading>, clock: &SampleClock) {
        let reading = match result {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Sensor {}: poll #{} failed: {}", self.sensor_id, seq, e);
                return;
            }
        };

        let mut state = lock(&self.state);
        if self.cancel.is_cancelled() {
            return;
        }
        if !state.accept(seq) {
            debug!("Sensor {}: discarding stale poll #{} (applied #{})", self.sensor_id, seq, state.applied_seq);
            return;
        }

        let level = reading.noise_equivalent;
        state.latest = Some(reading.clone());
        self.emit(LiveUpdate::Latest { seq, reading });

        let now_ms = clock.now_ms();
        if self.policy.admits_sample(state.last_sample_ms, now_ms) {
            let t = match state.window.last() {
                Some(prev) if prev.t >= now_ms => prev.t + 1,
                _ => now_ms,
            };
            let point = LivePoint { t, dba: level };
            state.window.push(point);
            state.last_sample_ms = Some(t);
            self.emit(LiveUpdate::Sample(point));
        }
    }

    fn emit(&self, update: LiveUpdate) {
        match self.updates.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("Sensor {}: update buffer full, dropping update", self.sensor_id);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Handle to one sensor's polling task.
///
/// Dropping the handle cancels polling. After [`LiveSubscription::stop`]
/// returns, no further update is observable.
pub struct LiveSubscription {
    sensor_id: String,
    policy: PollingPolicy,
    state: Arc<Mutex<LiveState>>,
    updates: mpsc::Receiver<LiveUpdate>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LiveSubscription {
    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn policy(&self) -> PollingPolicy {
        self.policy
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some() && !self.cancel.is_cancelled()
    }

    /// Reading of the most recently issued poll that has completed.
    pub fn latest(&self) -> Option<Reading> {
        lock(&self.state).latest.clone()
    }

    /// Chart samples, oldest first.
    pub fn window(&self) -> Vec<LivePoint> {
        lock(&self.state).window.to_vec()
    }

    pub fn applied_seq(&self) -> u64 {
        lock(&self.state).applied_seq
    }

    /// Next update, or `None` once cancelled or for an inert subscription.
    pub async fn next(&mut self) -> Option<LiveUpdate> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            update = self.updates.recv() => update,
        }
    }

    /// Request cancellation without waiting for the task to wind down.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the polling task to finish. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Sensor {}: polling task ended abnormally: {}", self.sensor_id, e);
            }
        }
        self.updates.close();
        while self.updates.try_recv().is_ok() {}
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
