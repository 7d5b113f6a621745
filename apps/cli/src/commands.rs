//! Command handlers. Each writes user-facing output to the given writer and
//! leaves diagnostics to tracing.

use anyhow::{bail, Context, Result};
use cambio_sdk::{
    csv_file_name, format_amount, format_rate, format_volume, quote_line, CambioClient,
    OperationForm, OperationKind, OperationResult, PollState, RateSnapshot, TransactionFilter,
};
use chrono::Local;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::cli::{ExtractArgs, OperateArgs};

pub struct App {
    client: CambioClient,
}

impl App {
    pub fn new(client: CambioClient) -> Self {
        Self { client }
    }

    pub async fn register(
        &self,
        out: &mut dyn Write,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<()> {
        let response = self
            .client
            .auth()
            .register(email, password, name)
            .await?;
        let message = response
            .message
            .unwrap_or_else(|| "Account created".to_string());
        writeln!(out, "{}", message)?;
        writeln!(out, "Run `cambio login --email {}` to sign in.", email)?;
        Ok(())
    }

    pub async fn login(&self, out: &mut dyn Write, email: &str, password: &str) -> Result<()> {
        let auth = self.client.auth();
        auth.login(email, password).await?;
        match auth.current_user() {
            Some(user) => writeln!(out, "Logged in as {} <{}>", user.name, user.email)?,
            None => writeln!(out, "Logged in")?,
        }
        Ok(())
    }

    pub async fn logout(&self, out: &mut dyn Write) -> Result<()> {
        self.client.auth().logout().await;
        writeln!(out, "Logged out")?;
        Ok(())
    }

    pub async fn whoami(&self, out: &mut dyn Write, remote: bool) -> Result<()> {
        let auth = self.client.auth();
        let user = if remote {
            Some(auth.me().await?)
        } else {
            auth.current_user()
        };

        match user {
            Some(user) => writeln!(out, "{} <{}>", user.name, user.email)?,
            None if auth.is_authenticated() => writeln!(out, "Logged in (no profile stored)")?,
            None => writeln!(out, "Not logged in")?,
        }
        Ok(())
    }

    pub async fn status(&self, out: &mut dyn Write) -> Result<()> {
        self.client.rate_poller().check_liveness().await;
        let online = self.client.connectivity().is_online();
        writeln!(
            out,
            "API {}: {}",
            self.client.gateway().api_url(),
            if online { "online" } else { "offline" }
        )?;
        Ok(())
    }

    /// Fetch once and print the table
    pub async fn rates(&self, out: &mut dyn Write) -> Result<()> {
        let poller = self.client.rate_poller();
        poller.load_rates().await;
        let snapshot = poller.snapshot();
        if let Some(error) = &snapshot.error {
            bail!("{}", error);
        }
        render_rates(out, &snapshot)
    }

    /// Poll until Ctrl+C, printing every update
    pub async fn watch_rates(&self, out: &mut dyn Write) -> Result<()> {
        let poller = self.client.rate_poller();
        let mut updates = poller.subscribe();
        let mut connectivity = self.client.connectivity().subscribe();
        let handle = poller.start();

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl+C")?;
                    break;
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    match snapshot.state {
                        PollState::Ready => render_rates(out, &snapshot)?,
                        PollState::Errored => {
                            writeln!(out, "{}", snapshot.error.as_deref().unwrap_or_default())?;
                            if !snapshot.table.is_empty() {
                                writeln!(out, "Showing last known rates:")?;
                                render_rates(out, &snapshot)?;
                            }
                        }
                        PollState::Idle | PollState::Loading => {}
                    }
                }
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = connectivity.borrow_and_update().clone();
                    writeln!(out, "[{}]", if status.online { "online" } else { "offline" })?;
                }
            }
        }

        handle.shutdown().await;
        info!("Stopped watching rates");
        Ok(())
    }

    pub async fn operate(
        &self,
        out: &mut dyn Write,
        kind: OperationKind,
        args: &OperateArgs,
    ) -> Result<()> {
        let from = args.from.trim().to_uppercase();
        let to = args.to.trim().to_uppercase();
        let mut submitter = self.client.submitter();
        submitter.form = OperationForm::new(kind, &from, &to, &args.amount);

        // The estimate is advisory, so a failed rates fetch is not fatal
        let poller = self.client.rate_poller();
        poller.load_rates().await;
        let table = poller.table();
        match (submitter.estimate(&table), table.rate(&from, &to)) {
            (Some(estimate), Some(rate)) => {
                writeln!(out, "{}", quote_line(&from, &to, rate))?;
                writeln!(out, "Estimated: {} {}", format_amount(estimate), to)?;
            }
            _ => writeln!(out, "No estimate available for {}/{}", from, to)?,
        }

        if args.dry_run {
            return Ok(());
        }

        let result = submitter.submit().await?;
        render_result(out, &result)?;
        Ok(())
    }

    pub async fn extract(&self, out: &mut dyn Write, args: &ExtractArgs) -> Result<()> {
        let filter = TransactionFilter {
            date_from: args.since,
            date_to: args.until,
            currency: args.currency.clone(),
            kind: args.kind,
        };

        let mut extract = self.client.extract();
        extract.fetch(&filter).await?;

        let records: Vec<_> = extract.filtered(&filter).collect();
        if records.is_empty() {
            writeln!(out, "No operations found")?;
        }
        for record in &records {
            writeln!(
                out,
                "{} {}  {:<6} {} {} -> {} {} @ {}  {}",
                record.date,
                record.time,
                record.kind,
                record.amount(),
                record.from_currency,
                record.converted_amount(),
                record.to_currency,
                record.rate_display(),
                record.status
            )?;
        }

        let summary = extract.summary(&filter);
        writeln!(
            out,
            "Total: {}  Completed: {}  Pending: {}  Volume: {}",
            summary.total,
            summary.completed,
            summary.pending,
            format_volume(summary.volume)
        )?;

        if args.csv {
            let path = args
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(csv_file_name(Local::now().date_naive())));
            let csv = extract.to_csv(&filter)?;
            std::fs::write(&path, csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            writeln!(out, "Saved {}", path.display())?;
        }
        Ok(())
    }
}

fn render_rates(out: &mut dyn Write, snapshot: &RateSnapshot) -> Result<()> {
    for (from, to, rate) in snapshot.table.pairs() {
        writeln!(out, "{:<4} -> {:<4} {}", from, to, format_rate(rate))?;
    }
    writeln!(
        out,
        "Currencies: {}",
        snapshot.table.available_currencies().join(", ")
    )?;
    if let Some(updated) = &snapshot.last_update {
        writeln!(out, "Last update: {}", updated)?;
    }
    Ok(())
}

fn render_result(out: &mut dyn Write, result: &OperationResult) -> Result<()> {
    writeln!(
        out,
        "Operation #{}: {} {} {} -> {} {} at {} ({})",
        result.id,
        result.kind,
        format_amount(result.source_amount),
        result.from_currency,
        format_amount(result.dest_amount),
        result.to_currency,
        format_rate(result.rate),
        result.status
    )?;
    Ok(())
}
