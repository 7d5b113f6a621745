//! Shared online/offline status
//!
//! Several independent signals report reachability of the API: the rates
//! fetch, the liveness probe and operation submissions. Each source is kept
//! separately, and the headline `online` flag follows whichever reported last.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Which part of the client reported reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    RatesFetch,
    LivenessProbe,
    Submission,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivityStatus {
    /// Last reported value from any source
    pub online: bool,
    pub last_signal: Option<Signal>,
    pub rates: Option<bool>,
    pub liveness: Option<bool>,
    pub submission: Option<bool>,
}

impl ConnectivityStatus {
    pub fn source(&self, signal: Signal) -> Option<bool> {
        match signal {
            Signal::RatesFetch => self.rates,
            Signal::LivenessProbe => self.liveness,
            Signal::Submission => self.submission,
        }
    }

    /// True when the rates fetch and the liveness probe have reported
    /// different answers
    pub fn is_disputed(&self) -> bool {
        matches!((self.rates, self.liveness), (Some(a), Some(b)) if a != b)
    }
}

#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<ConnectivityStatus>>,
}

impl Connectivity {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectivityStatus::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn record(&self, signal: Signal, online: bool) {
        self.tx.send_modify(|status| {
            if status.online != online {
                debug!(?signal, online, "Connectivity changed");
            }
            status.online = online;
            status.last_signal = Some(signal);
            match signal {
                Signal::RatesFetch => status.rates = Some(online),
                Signal::LivenessProbe => status.liveness = Some(online),
                Signal::Submission => status.submission = Some(online),
            }
        });
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.tx.borrow().clone()
    }

    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}
