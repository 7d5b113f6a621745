//! Transaction history ("extract"): query, filtering, summary and CSV export

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use std::fmt;
use tracing::{info, warn};

use crate::client::CambioClient;
use crate::error::{SdkError, SdkResult};
use crate::format::{format_amount, format_rate};
use crate::operation::{OperationKind, OperationResult, OperationStatus};

/// Why a transaction query produced nothing to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// The server has no transaction repository behind it (HTTP 503)
    #[error("Transaction service not configured")]
    ServiceUnavailable,

    #[error("Failed to load transactions")]
    Request,
}

impl From<&SdkError> for ExtractError {
    fn from(err: &SdkError) -> Self {
        if err.status() == Some(503) {
            ExtractError::ServiceUnavailable
        } else {
            ExtractError::Request
        }
    }
}

const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

pub const CSV_HEADER: [&str; 9] = [
    "Date",
    "Time",
    "Type",
    "From Currency",
    "To Currency",
    "Amount",
    "Converted Amount",
    "Rate",
    "Status",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub currency: Option<String>,
    pub kind: Option<OperationKind>,
}

impl TransactionFilter {
    /// Query string pairs understood by `GET /transacoes`; unset fields are omitted
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(date) = self.date_from {
            params.push(("data_inicio", date.format(QUERY_DATE_FORMAT).to_string()));
        }
        if let Some(date) = self.date_to {
            params.push(("data_fim", date.format(QUERY_DATE_FORMAT).to_string()));
        }
        if let Some(kind) = self.kind {
            params.push(("tipo", kind.as_str().to_string()));
        }
        if let Some(currency) = self.currency() {
            params.push(("moeda_origem", currency.to_string()));
        }
        params
    }

    /// Client-side check. The date range is inclusive on the record's local
    /// calendar date and the currency may match either side of the pair.
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if self.date_from.is_some_and(|from| record.local_date < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| record.local_date > to) {
            return false;
        }
        if let Some(currency) = self.currency() {
            if !record.from_currency.contains(currency) && !record.to_currency.contains(currency) {
                return false;
            }
        }
        if self.kind.is_some_and(|kind| record.kind != kind) {
            return false;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.kind.is_none()
            && self.currency().is_none()
    }

    fn currency(&self) -> Option<&str> {
        self.currency.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

/// A transaction with display-ready fields
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub local_date: NaiveDate,
    /// `d/M/YYYY`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    pub kind: OperationKind,
    pub from_currency: String,
    pub to_currency: String,
    pub source_amount: f64,
    pub dest_amount: f64,
    pub rate: f64,
    pub status: String,
}

impl TransactionRecord {
    /// Build a record with date and time rendered in `tz`
    pub fn from_result<Tz>(result: &OperationResult, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let local = result.timestamp.with_timezone(tz);
        Self {
            id: result.id,
            timestamp: result.timestamp,
            local_date: local.date_naive(),
            date: local.format("%-d/%-m/%Y").to_string(),
            time: local.format("%H:%M").to_string(),
            kind: result.kind,
            from_currency: result.from_currency.clone(),
            to_currency: result.to_currency.clone(),
            source_amount: result.source_amount,
            dest_amount: result.dest_amount,
            rate: result.rate,
            status: result.status.clone(),
        }
    }

    pub fn amount(&self) -> String {
        format_amount(self.source_amount)
    }

    pub fn converted_amount(&self) -> String {
        format_amount(self.dest_amount)
    }

    pub fn rate_display(&self) -> String {
        format_rate(self.rate)
    }

    pub fn status_kind(&self) -> OperationStatus {
        OperationStatus::classify(&self.status)
    }

    fn csv_row(&self) -> [String; 9] {
        [
            self.date.clone(),
            self.time.clone(),
            self.kind.to_string(),
            self.from_currency.clone(),
            self.to_currency.clone(),
            self.amount(),
            self.converted_amount(),
            self.rate_display(),
            self.status.clone(),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExtractSummary {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Sum of source amounts
    pub volume: f64,
}

pub fn summarize<'a, I>(records: I) -> ExtractSummary
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    records
        .into_iter()
        .fold(ExtractSummary::default(), |mut summary, record| {
            summary.total += 1;
            match record.status_kind() {
                OperationStatus::Completed => summary.completed += 1,
                OperationStatus::Pending => summary.pending += 1,
                OperationStatus::Failed => {}
            }
            summary.volume += record.source_amount;
            summary
        })
}

/// Render records as CSV with a header row
pub fn to_csv<'a, I>(records: I) -> SdkResult<String>
where
    I: IntoIterator<Item = &'a TransactionRecord>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(csv_error)?;
    for record in records {
        writer.write_record(record.csv_row()).map_err(csv_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| SdkError::StorageError(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| SdkError::InvalidResponse(e.to_string()))
}

fn csv_error(err: csv::Error) -> SdkError {
    SdkError::StorageError(std::io::Error::other(err))
}

/// Default export file name for a given day
pub fn csv_file_name(date: NaiveDate) -> String {
    format!("extrato-cambio-{}.csv", date.format(QUERY_DATE_FORMAT))
}

/// Result of one query/filter cycle
pub struct Extract {
    client: CambioClient,
    records: Vec<TransactionRecord>,
    error: Option<ExtractError>,
    loading: bool,
}

impl Extract {
    pub fn new(client: CambioClient) -> Self {
        Self {
            client,
            records: Vec::new(),
            error: None,
            loading: false,
        }
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn error(&self) -> Option<ExtractError> {
        self.error
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Query the API, rendering times in the local timezone
    pub async fn fetch(&mut self, filter: &TransactionFilter) -> Result<usize, ExtractError> {
        self.fetch_in(filter, &Local).await
    }

    /// Query the API, rendering times in `tz`. Previous records are replaced
    /// on success and cleared on failure.
    pub async fn fetch_in<Tz>(
        &mut self,
        filter: &TransactionFilter,
        tz: &Tz,
    ) -> Result<usize, ExtractError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        self.loading = true;
        self.error = None;

        let outcome = self.client.get_transactions(filter).await;
        self.loading = false;

        match outcome {
            Ok(results) => {
                self.records = results
                    .iter()
                    .map(|r| TransactionRecord::from_result(r, tz))
                    .collect();
                info!("Loaded {} transactions", self.records.len());
                Ok(self.records.len())
            }
            Err(e) => {
                warn!("Transaction query failed: {}", e);
                let error = ExtractError::from(&e);
                self.records.clear();
                self.error = Some(error);
                Err(error)
            }
        }
    }

    pub fn filtered<'a>(
        &'a self,
        filter: &'a TransactionFilter,
    ) -> impl Iterator<Item = &'a TransactionRecord> + 'a {
        self.records.iter().filter(move |r| filter.matches(r))
    }

    pub fn summary(&self, filter: &TransactionFilter) -> ExtractSummary {
        summarize(self.filtered(filter))
    }

    pub fn to_csv(&self, filter: &TransactionFilter) -> SdkResult<String> {
        to_csv(self.filtered(filter))
    }
}
