//! HTTP gateway shared by every API call
//!
//! Outgoing requests get `Authorization: Bearer <token>` whenever the session
//! holds a token. A `401 Unauthorized` from any endpoint clears the session and
//! notifies every registered rejection handler before the error is returned to
//! the caller. Each failing call performs its own clear and notification; they
//! are not coalesced across concurrent requests.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{SdkError, SdkResult};
use crate::session::SessionStore;

/// Emitted when the API rejects the current credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection {
    pub method: Method,
    pub path: String,
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

pub type RejectionHandler = Arc<dyn Fn(&AuthRejection) + Send + Sync>;

#[derive(Clone)]
pub struct ApiGateway {
    api_url: String,
    client: Client,
    session: SessionStore,
    handlers: Arc<RwLock<Vec<RejectionHandler>>>,
}

impl ApiGateway {
    pub fn new(config: &ClientConfig, session: SessionStore) -> SdkResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            api_url: config.api_url(),
            client: builder.build()?,
            session,
            handlers: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Register a callback run after the session is cleared because of a 401.
    ///
    /// The application shell uses this to send the user back to its entry
    /// point.
    pub fn on_auth_rejected<F>(&self, handler: F)
    where
        F: Fn(&AuthRejection) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> SdkResult<T> {
        let response = self.send(Method::GET, path, |req| req).await?;
        Self::read_json(response).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> SdkResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self.send(Method::GET, path, |req| req.query(query)).await?;
        Self::read_json(response).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> SdkResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, |req| req.json(body)).await?;
        Self::read_json(response).await
    }

    /// POST without a body, discarding whatever the server answers
    pub async fn post_empty(&self, path: &str) -> SdkResult<()> {
        self.send(Method::POST, path, |req| req).await?;
        Ok(())
    }

    /// GET that only cares about the status being 2xx
    pub async fn probe(&self, path: &str) -> SdkResult<()> {
        self.send(Method::GET, path, |req| req).await?;
        Ok(())
    }

    async fn send<F>(&self, method: Method, path: &str, build: F) -> SdkResult<Response>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let url = format!("{}{}", self.api_url, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }

        debug!(%method, path, "Sending request");
        let response = build(request).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            let (message, json) = Self::error_message(response).await;
            self.reject(AuthRejection {
                method,
                path: path.to_string(),
            });
            return Err(SdkError::Unauthorized { message, json });
        }

        if !status.is_success() {
            let (message, json) = Self::error_message(response).await;
            debug!(%method, path, status = status.as_u16(), %message, "Request failed");
            return Err(SdkError::ApiError {
                status: status.as_u16(),
                message,
                json,
            });
        }

        Ok(response)
    }

    fn reject(&self, rejection: AuthRejection) {
        warn!("Credential rejected on {}, clearing session", rejection);
        self.session.clear();

        // Snapshot so a handler may register further handlers without deadlocking
        let handlers: Vec<RejectionHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler(&rejection);
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> SdkResult<T> {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Prefer the `error` field of a JSON body, else the raw text. The flag
    /// tells which of the two was used.
    async fn error_message(response: Response) -> (String, bool) {
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .map(|message| (message, true))
            .unwrap_or_else(|| (body.trim().to_string(), false))
    }
}
