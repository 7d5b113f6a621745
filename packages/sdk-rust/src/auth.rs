//! Login, registration and logout on top of the session store
//!
//! Every failure is turned into an [`AuthFailure`] carrying a message that can
//! be shown as-is. Nothing is retried; the caller decides whether to prompt
//! again.

use thiserror::Error;
use tracing::{info, warn};

use crate::client::{CambioClient, LoginResponse, RegisterResponse};
use crate::error::SdkError;
use crate::session::UserProfile;

pub const REGISTER_ERROR_MESSAGE: &str = "Failed to register user";
pub const LOGIN_ERROR_MESSAGE: &str = "Invalid email or password";
pub const ME_ERROR_MESSAGE: &str = "Failed to fetch user data";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthFailure {
    pub message: String,
}

impl AuthFailure {
    fn from_sdk(err: &SdkError, fallback: &str) -> Self {
        Self {
            message: err.display_message(fallback),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthFailure>;

#[derive(Clone)]
pub struct AuthCoordinator {
    client: CambioClient,
}

impl AuthCoordinator {
    pub fn new(client: CambioClient) -> Self {
        Self { client }
    }

    /// Create an account. Does not log the user in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> AuthResult<RegisterResponse> {
        self.client
            .register(email, password, name)
            .await
            .inspect(|_| info!("Registered {}", email))
            .map_err(|e| {
                warn!("Registration failed: {}", e);
                AuthFailure::from_sdk(&e, REGISTER_ERROR_MESSAGE)
            })
    }

    /// Authenticate and, on success, persist the token and profile before
    /// returning. A failed login writes nothing, though a 401 answer still
    /// clears any earlier session through the gateway.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<LoginResponse> {
        let response = self.client.login(email, password).await.map_err(|e| {
            warn!("Login failed: {}", e);
            AuthFailure::from_sdk(&e, LOGIN_ERROR_MESSAGE)
        })?;

        match response.token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => {
                self.client.session().set(token, response.user.as_ref());
                info!("Logged in as {}", email);
            }
            None => warn!("Login response for {} carried no token", email),
        }

        Ok(response)
    }

    /// Best-effort server logout. The local session is always cleared, even
    /// when the request fails.
    pub async fn logout(&self) {
        if let Err(e) = self.client.logout().await {
            warn!("Logout request failed: {}", e);
        }
        self.client.session().clear();
        info!("Logged out");
    }

    /// Fetch the profile of the authenticated user from the API
    pub async fn me(&self) -> AuthResult<UserProfile> {
        self.client
            .me()
            .await
            .map_err(|e| AuthFailure::from_sdk(&e, ME_ERROR_MESSAGE))
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.client.session().get().user
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.session().is_authenticated()
    }

    pub fn token(&self) -> Option<String> {
        self.client.session().token()
    }
}
