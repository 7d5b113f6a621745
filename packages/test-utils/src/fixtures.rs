use crate::TestServer;
use cambio_sdk::{CambioClient, ClientConfig, SessionStore};
use std::time::Duration;

pub const TEST_EMAIL: &str = "alice@example.com";
pub const TEST_PASSWORD: &str = "secret123";
pub const TEST_NAME: &str = "Alice";

/// High-level test fixture for SDK tests
///
/// Provides a running mock API with one registered user and a client with an
/// in-memory session pointed at it.
///
/// # Example
/// ```rust,ignore
/// let fixture = TestCambio::logged_in().await?;
///
/// fixture.server.state.fail_rates(true);
/// let poller = fixture.client.rate_poller();
/// poller.load_rates().await;
/// ```
pub struct TestCambio {
    pub server: TestServer,
    pub client: CambioClient,
    pub user_id: i64,
}

impl TestCambio {
    /// Mock API with default rates and the test user registered, not logged in
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(|config| config).await
    }

    /// Like [`TestCambio::new`], letting the caller adjust the client config
    /// (e.g. shorter poll intervals)
    pub async fn with_config<F>(configure: F) -> anyhow::Result<Self>
    where
        F: FnOnce(ClientConfig) -> ClientConfig,
    {
        let server = TestServer::start().await?;
        let user_id = server
            .state
            .add_user(TEST_EMAIL, TEST_PASSWORD, TEST_NAME);

        let config = configure(ClientConfig::new(&server.base_url));
        let client = CambioClient::new(config, SessionStore::in_memory())?;

        Ok(Self {
            server,
            client,
            user_id,
        })
    }

    /// Fixture whose client is already logged in as the test user
    pub async fn logged_in() -> anyhow::Result<Self> {
        let fixture = Self::new().await?;
        fixture.login().await?;
        Ok(fixture)
    }

    pub async fn login(&self) -> anyhow::Result<()> {
        self.client
            .auth()
            .login(TEST_EMAIL, TEST_PASSWORD)
            .await
            .map_err(|e| anyhow::anyhow!("Test login failed: {}", e))?;
        Ok(())
    }

    /// A second client sharing nothing with `self.client` but the server
    pub fn fresh_client(&self) -> anyhow::Result<CambioClient> {
        Ok(CambioClient::with_base_url(&self.server.base_url)?)
    }
}

/// Helper to wait for a condition with timeout
pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("Timeout waiting for condition")
}
