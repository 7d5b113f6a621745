//! Command-line definition.

use cambio_sdk::OperationKind;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cambio")]
#[command(version)]
#[command(about = "Currency exchange client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API base URL (overrides config and CAMBIO_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Session file (default: user data dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub session: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "CAMBIO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in and keep the session for later commands
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CAMBIO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the session
    Logout,

    /// Show the logged-in user
    Whoami {
        /// Ask the server instead of reading the stored profile
        #[arg(long)]
        remote: bool,
    },

    /// Check whether the API is reachable
    Status,

    /// Show exchange rates
    Rates {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Buy currency
    Buy(OperateArgs),

    /// Sell currency
    Sell(OperateArgs),

    /// List past operations
    Extract(ExtractArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct OperateArgs {
    /// Source currency code, e.g. USD
    pub from: String,
    /// Target currency code, e.g. EUR
    pub to: String,
    /// Amount in the source currency
    pub amount: String,

    /// Only print the estimate
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ExtractArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub since: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub until: Option<NaiveDate>,

    /// Currency on either side of the operation
    #[arg(long)]
    pub currency: Option<String>,

    /// buy or sell
    #[arg(long = "type", value_name = "KIND")]
    pub kind: Option<OperationKind>,

    /// Write the listing as CSV
    #[arg(long)]
    pub csv: bool,

    /// CSV destination (default: extrato-cambio-<today>.csv)
    #[arg(long, requires = "csv", value_name = "PATH")]
    pub output: Option<PathBuf>,
}
