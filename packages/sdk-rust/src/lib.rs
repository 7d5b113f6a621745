//! Cambio SDK
//!
//! Rust client for the currency exchange API.
//!
//! This SDK provides:
//! - Session store for the bearer token and user profile
//! - API gateway that attaches credentials and reacts to rejected sessions
//! - Login, registration and logout
//! - Periodic rate polling with a liveness probe
//! - Buy/sell submission with client-side validation and estimates
//! - Transaction history with filtering, summary and CSV export
//!
//! # Example
//!
//! ```no_run
//! use cambio_sdk::{CambioClient, ClientConfig, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CambioClient::new(
//!         ClientConfig::new("http://localhost:8081"),
//!         SessionStore::in_memory(),
//!     )?;
//!
//!     client.auth().login("ana@example.com", "secret").await?;
//!
//!     let poller = client.rate_poller();
//!     poller.load_rates().await;
//!     println!("{:?}", poller.table().available_currencies());
//!
//!     let mut submitter = client.submitter();
//!     submitter.form.from_currency = "USD".into();
//!     submitter.form.to_currency = "EUR".into();
//!     submitter.form.amount = "100".into();
//!     submitter.submit().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod extract;
pub mod format;
pub mod gateway;
pub mod operation;
pub mod poller;
pub mod rates;
pub mod session;

pub use auth::{AuthCoordinator, AuthFailure, AuthResult};
pub use client::{CambioClient, LoginResponse, RegisterResponse};
pub use config::ClientConfig;
pub use connectivity::{Connectivity, ConnectivityStatus, Signal};
pub use error::{SdkError, SdkResult, ValidationError};
pub use extract::{
    csv_file_name, summarize, to_csv, Extract, ExtractError, ExtractSummary, TransactionFilter,
    TransactionRecord,
};
pub use format::{format_amount, format_number, format_rate, format_volume, quote_line};
pub use gateway::{ApiGateway, AuthRejection};
pub use operation::{
    OperationForm, OperationKind, OperationRequest, OperationResult, OperationStatus,
    OperationSubmitter, SubmitError,
};
pub use poller::{PollState, PollerHandle, RatePoller, RateSnapshot};
pub use rates::{pair_key, RateTable, RatesResponse};
pub use session::{FileStorage, MemoryStorage, Session, SessionStorage, SessionStore, UserProfile};
