//! Client configuration

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8081";
pub const DEFAULT_RATES_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(30);

/// Settings shared by every component built from a [`crate::CambioClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server root; the `/api` prefix is appended by the gateway
    pub base_url: String,
    pub rates_interval: Duration,
    pub liveness_interval: Duration,
    /// `None` keeps the HTTP client's default behaviour
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            rates_interval: DEFAULT_RATES_INTERVAL,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_rates_interval(mut self, interval: Duration) -> Self {
        self.rates_interval = interval;
        self
    }

    pub fn with_liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Base URL of the REST API, without a trailing slash
    pub fn api_url(&self) -> String {
        format!("{}/api", self.base_url.trim_end_matches('/'))
    }
}
