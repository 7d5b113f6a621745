use cambio_sdk::ClientConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const SESSION_FILE: &str = "session.json";

/// CLI configuration (from apps/cli/config.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub url: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    pub rates_interval_secs: u64,
    pub liveness_interval_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from config.toml, falling back to built-in defaults
    /// for anything the file leaves out.
    ///
    /// The file path comes from `CAMBIO_CONFIG`, else CARGO_MANIFEST_DIR so the
    /// path is consistent regardless of where the binary is run from.
    /// `CAMBIO_API_URL` overrides `api.url`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("CAMBIO_CONFIG")
            .unwrap_or_else(|_| format!("{}/config.toml", env!("CARGO_MANIFEST_DIR")));
        Self::load_from(&config_path, std::env::var("CAMBIO_API_URL").ok())
    }

    pub fn load_from(path: &str, api_url: Option<String>) -> Result<Self, config::ConfigError> {
        let defaults = ClientConfig::default();

        let builder = config::Config::builder()
            .set_default("api.url", defaults.base_url)?
            .set_default("polling.rates_interval_secs", defaults.rates_interval.as_secs())?
            .set_default(
                "polling.liveness_interval_secs",
                defaults.liveness_interval.as_secs(),
            )?
            .add_source(config::File::with_name(path).required(false))
            .set_override_option("api.url", api_url)?;

        let settings = builder.build()?;
        settings.try_deserialize()
    }

    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(&self.api.url)
            .with_rates_interval(Duration::from_secs(self.polling.rates_interval_secs))
            .with_liveness_interval(Duration::from_secs(self.polling.liveness_interval_secs));

        match self.api.request_timeout_secs {
            Some(secs) => config.with_request_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }

    /// Where the session is persisted between runs
    pub fn session_path(&self) -> PathBuf {
        if let Some(path) = &self.session.path {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join("cambio").join(SESSION_FILE))
            .unwrap_or_else(|| PathBuf::from(format!(".cambio-{}", SESSION_FILE)))
    }
}
