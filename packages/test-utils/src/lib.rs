//! In-process mock of the exchange API plus fixtures for SDK and CLI tests

pub mod fixtures;
pub mod server;

pub use fixtures::{wait_for, TestCambio, TEST_EMAIL, TEST_NAME, TEST_PASSWORD};
pub use server::{MockState, StoredTransaction, TestServer};
