//! Buy/sell operations: form validation, live estimate and submission

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::client::CambioClient;
use crate::connectivity::Signal;
use crate::error::ValidationError;
use crate::rates::RateTable;

pub const SUBMIT_ERROR_MESSAGE: &str = "Failed to process operation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperationKind {
    #[default]
    #[serde(rename = "Compra")]
    Buy,
    #[serde(rename = "Venda")]
    Sell,
}

impl OperationKind {
    /// Label used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Buy => "Compra",
            OperationKind::Sell => "Venda",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" | "compra" => Ok(OperationKind::Buy),
            "sell" | "venda" => Ok(OperationKind::Sell),
            other => Err(format!("unknown operation kind '{other}'")),
        }
    }
}

/// Display classification of a transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Completed,
    Pending,
    Failed,
}

impl OperationStatus {
    pub fn classify(label: &str) -> Self {
        match label {
            "Concluído" | "Concluída" | "Concluido" | "Concluida" => OperationStatus::Completed,
            "Pendente" => OperationStatus::Pending,
            _ => OperationStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationRequest {
    #[serde(rename = "tipo")]
    pub kind: OperationKind,
    #[serde(rename = "moeda_origem")]
    pub from_currency: String,
    #[serde(rename = "moeda_destino")]
    pub to_currency: String,
    #[serde(rename = "valor_origem")]
    pub amount: f64,
}

/// Server-authoritative record of an executed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub id: i64,
    #[serde(rename = "data_transacao")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "tipo")]
    pub kind: OperationKind,
    #[serde(rename = "moeda_origem")]
    pub from_currency: String,
    #[serde(rename = "moeda_destino")]
    pub to_currency: String,
    #[serde(rename = "valor_origem")]
    pub source_amount: f64,
    #[serde(rename = "valor_destino")]
    pub dest_amount: f64,
    #[serde(rename = "taxa_cambio")]
    pub rate: f64,
    pub status: String,
}

impl OperationResult {
    pub fn status_kind(&self) -> OperationStatus {
        OperationStatus::classify(&self.status)
    }
}

/// Raw form input, as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationForm {
    pub kind: OperationKind,
    pub from_currency: String,
    pub to_currency: String,
    pub amount: String,
}

impl OperationForm {
    pub fn new(
        kind: OperationKind,
        from_currency: impl Into<String>,
        to_currency: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            from_currency: from_currency.into(),
            to_currency: to_currency.into(),
            amount: amount.into(),
        }
    }

    /// Check the form in order; the first failure wins
    pub fn validate(&self) -> Result<OperationRequest, ValidationError> {
        let from = self.from_currency.trim();
        let to = self.to_currency.trim();
        let amount = self.amount.trim();

        if from.is_empty() || to.is_empty() || amount.is_empty() {
            return Err(ValidationError::MissingFields);
        }

        let amount = parse_amount(amount)
            .filter(|v| *v > 0.0)
            .ok_or(ValidationError::InvalidAmount)?;

        Ok(OperationRequest {
            kind: self.kind,
            from_currency: from.to_string(),
            to_currency: to.to_string(),
            amount,
        })
    }

    /// Live preview of the converted amount, `None` when it cannot be computed
    pub fn estimate(&self, table: &RateTable) -> Option<f64> {
        let from = self.from_currency.trim();
        let to = self.to_currency.trim();
        if from.is_empty() || to.is_empty() {
            return None;
        }
        let amount = parse_amount(self.amount.trim())?;
        table.estimate(amount, from, to)
    }

    /// Fill both currencies at once, e.g. from a rate card
    pub fn select_pair(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.from_currency = from.into();
        self.to_currency = to.into();
    }

    /// Clear everything except the operation kind
    fn reset_inputs(&mut self) {
        self.from_currency.clear();
        self.to_currency.clear();
        self.amount.clear();
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Request(String),
}

/// Form state plus the outcome of the last submission
pub struct OperationSubmitter {
    client: CambioClient,
    pub form: OperationForm,
    result: Option<OperationResult>,
    error: Option<String>,
    submitting: bool,
}

impl OperationSubmitter {
    pub fn new(client: CambioClient) -> Self {
        Self {
            client,
            form: OperationForm::default(),
            result: None,
            error: None,
            submitting: false,
        }
    }

    pub fn result(&self) -> Option<&OperationResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn estimate(&self, table: &RateTable) -> Option<f64> {
        self.form.estimate(table)
    }

    /// Start a new operation, dropping the previous result
    pub fn clear_result(&mut self) {
        self.result = None;
    }

    /// Validate and send the form.
    ///
    /// On success the result is stored and the inputs cleared (the kind is
    /// kept). On failure the inputs are left as they were so the user can retry.
    pub async fn submit(&mut self) -> Result<OperationResult, SubmitError> {
        let request = match self.form.validate() {
            Ok(request) => request,
            Err(e) => {
                debug!("Operation form rejected: {}", e);
                self.error = Some(e.to_string());
                return Err(e.into());
            }
        };

        self.submitting = true;
        self.error = None;
        self.result = None;

        let outcome = self.client.create_transaction(&request).await;
        self.submitting = false;

        match outcome {
            Ok(result) => {
                info!(
                    id = result.id,
                    "{} {} {} -> {} {}",
                    result.kind,
                    result.source_amount,
                    result.from_currency,
                    result.dest_amount,
                    result.to_currency
                );
                self.client.connectivity().record(Signal::Submission, true);
                self.form.reset_inputs();
                self.result = Some(result.clone());
                Ok(result)
            }
            Err(e) => {
                let message = e
                    .json_error_message()
                    .unwrap_or(SUBMIT_ERROR_MESSAGE)
                    .to_string();
                self.client.connectivity().record(Signal::Submission, false);
                self.error = Some(message.clone());
                Err(SubmitError::Request(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RateTable {
        let response: crate::rates::RatesResponse =
            serde_json::from_str(r#"{"taxas":{"USD":{"EUR":0.9}}}"#).unwrap();
        RateTable::from(&response)
    }

    #[test]
    fn test_validate_ok() {
        let form = OperationForm::new(OperationKind::Sell, "USD", "EUR", " 100.5 ");
        let request = form.validate().unwrap();
        assert_eq!(request.kind, OperationKind::Sell);
        assert_eq!(request.from_currency, "USD");
        assert_eq!(request.amount, 100.5);
    }

    #[test]
    fn test_validate_missing_fields_first() {
        let form = OperationForm::new(OperationKind::Buy, "", "EUR", "abc");
        assert_eq!(form.validate(), Err(ValidationError::MissingFields));

        let form = OperationForm::new(OperationKind::Buy, "USD", "  ", "10");
        assert_eq!(form.validate(), Err(ValidationError::MissingFields));

        let form = OperationForm::new(OperationKind::Buy, "USD", "EUR", "");
        assert_eq!(form.validate(), Err(ValidationError::MissingFields));
    }

    #[test]
    fn test_validate_amount() {
        for bad in ["abc", "0", "-5", "NaN", "inf"] {
            let form = OperationForm::new(OperationKind::Buy, "USD", "EUR", bad);
            assert_eq!(form.validate(), Err(ValidationError::InvalidAmount), "{bad}");
        }
    }

    #[test]
    fn test_estimate() {
        let form = OperationForm::new(OperationKind::Buy, "USD", "EUR", "100");
        let estimate = form.estimate(&table()).unwrap();
        assert!((estimate - 90.0).abs() < 1e-9);

        let unknown = OperationForm::new(OperationKind::Buy, "EUR", "JPY", "100");
        assert_eq!(unknown.estimate(&table()), None);

        let garbage = OperationForm::new(OperationKind::Buy, "USD", "EUR", "x");
        assert_eq!(garbage.estimate(&table()), None);

        let empty = OperationForm::default();
        assert_eq!(empty.estimate(&table()), None);
    }

    #[test]
    fn test_reset_keeps_kind() {
        let mut form = OperationForm::new(OperationKind::Sell, "USD", "EUR", "10");
        form.reset_inputs();
        assert_eq!(form, OperationForm::new(OperationKind::Sell, "", "", ""));
    }

    #[test]
    fn test_select_pair() {
        let mut form = OperationForm::default();
        form.select_pair("GBP", "JPY");
        assert_eq!(form.from_currency, "GBP");
        assert_eq!(form.to_currency, "JPY");
    }

    #[test]
    fn test_kind_wire_format() {
        assert_eq!(serde_json::to_string(&OperationKind::Buy).unwrap(), r#""Compra""#);
        assert_eq!(
            serde_json::from_str::<OperationKind>(r#""Venda""#).unwrap(),
            OperationKind::Sell
        );
        assert_eq!("sell".parse::<OperationKind>().unwrap(), OperationKind::Sell);
        assert_eq!("Compra".parse::<OperationKind>().unwrap(), OperationKind::Buy);
        assert!("hold".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_request_wire_format() {
        let request = OperationForm::new(OperationKind::Buy, "USD", "EUR", "10")
            .validate()
            .unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "tipo": "Compra",
                "moeda_origem": "USD",
                "moeda_destino": "EUR",
                "valor_origem": 10.0
            })
        );
    }

    #[test]
    fn test_result_parses_server_payload() {
        let result: OperationResult = serde_json::from_str(
            r#"{
                "id": 42,
                "user_id": 1,
                "data_transacao": "2024-03-05T14:07:00.123456-03:00",
                "tipo": "Venda",
                "moeda_origem": "USD",
                "moeda_destino": "BRL",
                "valor_origem": 100,
                "valor_destino": 500.5,
                "taxa_cambio": 5.005,
                "status": "Concluído",
                "created_at": "2024-03-05T14:07:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(result.id, 42);
        assert_eq!(result.kind, OperationKind::Sell);
        assert_eq!(result.source_amount, 100.0);
        assert_eq!(result.timestamp.to_rfc3339(), "2024-03-05T17:07:00.123456+00:00");
        assert_eq!(result.status_kind(), OperationStatus::Completed);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(OperationStatus::classify("Concluída"), OperationStatus::Completed);
        assert_eq!(OperationStatus::classify("Pendente"), OperationStatus::Pending);
        assert_eq!(OperationStatus::classify("Cancelado"), OperationStatus::Failed);
    }
}
