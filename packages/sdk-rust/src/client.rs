use serde::{Deserialize, Serialize};

use crate::auth::AuthCoordinator;
use crate::config::ClientConfig;
use crate::connectivity::Connectivity;
use crate::error::SdkResult;
use crate::extract::{Extract, TransactionFilter};
use crate::gateway::{ApiGateway, AuthRejection};
use crate::operation::{OperationRequest, OperationResult, OperationSubmitter};
use crate::poller::RatePoller;
use crate::rates::RatesResponse;
use crate::session::{SessionStore, UserProfile};

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "nome")]
    name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Option<Vec<OperationResult>>,
}

/// REST API client for the exchange service
///
/// Holds the gateway (and through it the session) plus the shared
/// connectivity status. Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct CambioClient {
    gateway: ApiGateway,
    connectivity: Connectivity,
    config: ClientConfig,
}

impl CambioClient {
    pub fn new(config: ClientConfig, session: SessionStore) -> SdkResult<Self> {
        let gateway = ApiGateway::new(&config, session)?;
        Ok(Self {
            gateway,
            connectivity: Connectivity::new(),
            config,
        })
    }

    /// Client with an in-memory session, mostly useful in tests and scripts
    pub fn with_base_url(base_url: impl Into<String>) -> SdkResult<Self> {
        Self::new(ClientConfig::new(base_url), SessionStore::in_memory())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    pub fn session(&self) -> &SessionStore {
        self.gateway.session()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// See [`ApiGateway::on_auth_rejected`]
    pub fn on_auth_rejected<F>(&self, handler: F)
    where
        F: Fn(&AuthRejection) + Send + Sync + 'static,
    {
        self.gateway.on_auth_rejected(handler);
    }

    // ===== Components =====

    pub fn auth(&self) -> AuthCoordinator {
        AuthCoordinator::new(self.clone())
    }

    pub fn rate_poller(&self) -> RatePoller {
        RatePoller::new(self.clone())
    }

    pub fn submitter(&self) -> OperationSubmitter {
        OperationSubmitter::new(self.clone())
    }

    pub fn extract(&self) -> Extract {
        Extract::new(self.clone())
    }

    // ===== Endpoints =====

    /// Liveness probe; any 2xx counts as up
    pub async fn health(&self) -> SdkResult<()> {
        self.gateway.probe("/health").await
    }

    pub async fn get_rates(&self) -> SdkResult<RatesResponse> {
        self.gateway.get("/taxas").await
    }

    pub async fn create_transaction(
        &self,
        request: &OperationRequest,
    ) -> SdkResult<OperationResult> {
        self.gateway.post("/transacoes", request).await
    }

    pub async fn get_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> SdkResult<Vec<OperationResult>> {
        let response: TransactionsResponse = self
            .gateway
            .get_with_query("/transacoes", &filter.query_params())
            .await?;
        Ok(response.transactions.unwrap_or_default())
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> SdkResult<RegisterResponse> {
        let request = RegisterRequest {
            email,
            password,
            name,
        };
        self.gateway.post("/auth/register", &request).await
    }

    pub async fn login(&self, email: &str, password: &str) -> SdkResult<LoginResponse> {
        self.gateway
            .post("/auth/login", &LoginRequest { email, password })
            .await
    }

    pub async fn logout(&self) -> SdkResult<()> {
        self.gateway.post_empty("/auth/logout").await
    }

    pub async fn me(&self) -> SdkResult<UserProfile> {
        self.gateway.get("/auth/me").await
    }
}
