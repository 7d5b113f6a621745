//! Periodic rate refresh and liveness probing
//!
//! The poller keeps the latest [`RateSnapshot`] in a watch channel. Rates are
//! refetched on one interval and the API is probed on another; both tasks start
//! with an immediate tick and stop when the [`PollerHandle`] is stopped or
//! dropped.
//!
//! A failed rates fetch keeps the previous table. Results are only applied when
//! they belong to the most recently started fetch and the poller has not been
//! stopped since the fetch began, so a response that outlives its consumer is
//! dropped on the floor.

use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::CambioClient;
use crate::connectivity::Signal;
use crate::rates::RateTable;

pub const RATES_ERROR_MESSAGE: &str = "Failed to load exchange rates";

const UPDATE_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Loading,
    Ready,
    Errored,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateSnapshot {
    pub state: PollState,
    pub table: RateTable,
    /// Human-readable time of the last successful fetch
    pub last_update: Option<String>,
    pub error: Option<String>,
    /// A manual refresh is in progress
    pub refreshing: bool,
}

struct PollerInner {
    client: CambioClient,
    snapshot: watch::Sender<RateSnapshot>,
    /// Bumped whenever the consumer goes away
    epoch: AtomicU64,
    /// Sequence number of the latest rates fetch
    fetch_seq: AtomicU64,
    /// State and error from before the current `Loading` phase, restored if
    /// the fetch is abandoned
    settled: Mutex<(PollState, Option<String>)>,
}

#[derive(Clone)]
pub struct RatePoller {
    inner: Arc<PollerInner>,
}

impl RatePoller {
    pub fn new(client: CambioClient) -> Self {
        let (snapshot, _rx) = watch::channel(RateSnapshot::default());
        Self {
            inner: Arc::new(PollerInner {
                client,
                snapshot,
                epoch: AtomicU64::new(0),
                fetch_seq: AtomicU64::new(0),
                settled: Mutex::new((PollState::Idle, None)),
            }),
        }
    }

    pub fn snapshot(&self) -> RateSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn table(&self) -> RateTable {
        self.inner.snapshot.borrow().table.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RateSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Fetch the rate table once
    pub async fn load_rates(&self) {
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let seq = self.inner.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;

        self.inner.snapshot.send_modify(|s| {
            if s.state != PollState::Loading {
                *self.settled() = (s.state, s.error.clone());
            }
            s.state = PollState::Loading;
            s.error = None;
        });

        let outcome = self.inner.client.get_rates().await;

        if !self.is_current(epoch, seq) {
            debug!(seq, "Discarding stale rates response");
            return;
        }

        match outcome {
            Ok(response) => {
                let table = RateTable::from(&response);
                info!(
                    "Loaded {} rates across {} currencies",
                    table.len(),
                    table.available_currencies().len()
                );
                self.inner.snapshot.send_modify(|s| {
                    s.state = PollState::Ready;
                    s.table = table;
                    s.last_update = Some(Local::now().format(UPDATE_FORMAT).to_string());
                    s.error = None;
                });
                self.inner.client.connectivity().record(Signal::RatesFetch, true);
            }
            Err(e) => {
                warn!("Rates fetch failed: {}", e);
                self.inner.snapshot.send_modify(|s| {
                    s.state = PollState::Errored;
                    s.error = Some(RATES_ERROR_MESSAGE.to_string());
                });
                self.inner.client.connectivity().record(Signal::RatesFetch, false);
            }
        }
    }

    /// User-initiated refresh
    pub async fn refresh(&self) {
        self.inner.snapshot.send_modify(|s| s.refreshing = true);
        self.load_rates().await;
        self.inner.snapshot.send_modify(|s| s.refreshing = false);
    }

    /// Probe `/health` and record the outcome
    pub async fn check_liveness(&self) {
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let online = match self.inner.client.health().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Liveness probe failed: {}", e);
                false
            }
        };

        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Discarding stale liveness result");
            return;
        }
        self.inner
            .client
            .connectivity()
            .record(Signal::LivenessProbe, online);
    }

    /// Spawn the rates and liveness tasks. Must be called inside a tokio
    /// runtime.
    pub fn start(&self) -> PollerHandle {
        let config = self.inner.client.config();
        let rates_every = config.rates_interval;
        let liveness_every = config.liveness_interval;
        let cancel = CancellationToken::new();

        let rates_task = {
            let poller = self.clone();
            spawn_periodic(rates_every, cancel.clone(), move || {
                let poller = poller.clone();
                async move { poller.load_rates().await }
            })
        };
        let liveness_task = {
            let poller = self.clone();
            spawn_periodic(liveness_every, cancel.clone(), move || {
                let poller = poller.clone();
                async move { poller.check_liveness().await }
            })
        };

        info!(?rates_every, ?liveness_every, "Rate poller started");
        PollerHandle {
            poller: self.clone(),
            cancel,
            tasks: vec![rates_task, liveness_task],
        }
    }

    /// Abandon everything in flight. A fetch cut short leaves no `Loading`
    /// state behind.
    fn invalidate(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.snapshot.send_if_modified(|s| {
            let mut modified = s.refreshing;
            s.refreshing = false;
            if s.state == PollState::Loading {
                let (state, error) = self.settled().clone();
                s.state = state;
                s.error = error;
                modified = true;
            }
            modified
        });
    }

    fn settled(&self) -> MutexGuard<'_, (PollState, Option<String>)> {
        self.inner
            .settled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64, seq: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
            && self.inner.fetch_seq.load(Ordering::SeqCst) == seq
    }
}

fn spawn_periodic<F, Fut>(
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tick() => {}
            }
        }
    })
}

/// Owns the running poll tasks. Dropping the handle stops them.
pub struct PollerHandle {
    poller: RatePoller,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel both timers and discard any response still in flight
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            self.poller.invalidate();
            info!("Rate poller stopped");
        }
    }

    /// Stop and wait for both tasks to finish
    pub async fn shutdown(mut self) {
        self.stop();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Poll task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
