use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use drivesweep::models::IdFilterMode;

#[derive(Parser)]
#[command(name = "drivesweep")]
#[command(about = "Crawl Google Drive group folders and download meeting transcripts and notes as text")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate an access token and store it for later runs
    Login {
        /// OAuth access token (with or without the "Bearer " prefix)
        #[arg(short, long)]
        token: String,

        /// Database file path
        #[arg(short, long)]
        database: Option<String>,
    },

    /// Crawl, filter and download
    Run(RunArgs),

    /// Print the identifiers found in some text
    ExtractIds {
        /// Text to scan (reads stdin when neither TEXT nor --file is given)
        text: Option<String>,

        /// File to scan
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Show recent runs
    History {
        /// Maximum number of runs
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Database file path
        #[arg(short, long)]
        database: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Root folder id holding one folder per group
    #[arg(short, long)]
    pub root: Option<String>,

    /// Start date (YYYY-MM-DD)
    #[arg(long = "from")]
    pub from_date: Option<NaiveDate>,

    /// End date (YYYY-MM-DD), inclusive
    #[arg(long = "to")]
    pub to_date: Option<NaiveDate>,

    /// Target identifiers as free text (any separators)
    #[arg(long)]
    pub ids: Option<String>,

    /// File to read target identifiers from
    #[arg(long)]
    pub ids_file: Option<String>,

    /// Identifier mode (included, excluded, both)
    #[arg(long)]
    pub id_mode: Option<String>,

    /// Ignore identifiers, download everything that matches
    #[arg(long, conflicts_with_all = ["ids", "ids_file", "id_mode"])]
    pub no_id_filter: bool,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<String>,

    /// Spreadsheet id to append the run report to
    #[arg(long, conflicts_with = "report_csv")]
    pub report_sheet: Option<String>,

    /// Sheet tab (or CSV suffix) for the report
    #[arg(long, default_value = "Sheet1")]
    pub report_tab: String,

    /// Directory to write the run report to as CSV
    #[arg(long)]
    pub report_csv: Option<String>,

    /// Access token for this run (validated, then stored)
    #[arg(short, long)]
    pub token: Option<String>,

    /// Database file path
    #[arg(short, long)]
    pub database: Option<String>,

    /// Read the date range in UTC instead of the local time zone
    #[arg(long)]
    pub utc: bool,
}

impl Commands {
    pub fn parse_id_mode(mode: &str) -> Result<IdFilterMode, anyhow::Error> {
        match mode.to_lowercase().as_str() {
            "included" | "only-included" | "include" => Ok(IdFilterMode::OnlyIncluded),
            "excluded" | "only-excluded" | "exclude" => Ok(IdFilterMode::OnlyExcluded),
            "both" => Ok(IdFilterMode::Both),
            _ => Err(anyhow::anyhow!(
                "Invalid identifier mode: {} (expected included, excluded or both)",
                mode
            )),
        }
    }
}
