use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use drivesweep::cancel::CancelFlag;
use drivesweep::config::Config;
use drivesweep::downloader::sink::FsSink;
use drivesweep::filter::WindowZone;
use drivesweep::drive::DriveClient;
use drivesweep::identifiers::{extract_ids, IdentifierSet};
use drivesweep::models::{DateRange, FilterConfig, IdFilter, RunState};
use drivesweep::report::{CsvReportSink, ReportSink, ReportTarget, SheetsReportSink};
use drivesweep::runner::{Pipeline, RunContext, RunEvent, RunSettings};
use drivesweep::session::{
    resolve_credential, Credential, CredentialSource, CredentialValidator, DriveValidator,
};
use drivesweep::storage::{Storage, StoredConfig};

mod cli;

use cli::{Cli, Commands, RunArgs};

/// Resource name used for CSV reports
const CSV_REPORT_NAME: &str = "drivesweep";

#[tokio::main]
async fn main() -> Result<()> {
    // Set default log level to INFO if not specified
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "drivesweep=info");
    }

    // Log to both console and file
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let file_appender = tracing_appender::rolling::never(".", "drivesweep.log");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Login { token, database } => {
            if let Some(database) = database {
                config.database_path = database.into();
            }
            let storage = Storage::new(config.database_path_str()).await?;
            let mut stored = storage.load_config().await?;

            let validator = DriveValidator::new(&config);
            let (_, source) =
                resolve_credential(Some(&token), &mut stored, Utc::now(), &validator).await?;
            storage.save_config(&stored).await?;

            if let CredentialSource::Validated(user) = source {
                println!(
                    "Logged in as {} <{}>",
                    user.display_name.as_deref().unwrap_or("unknown user"),
                    user.email_address.as_deref().unwrap_or("no email")
                );
            }
        }

        Commands::Run(args) => {
            if let Some(database) = &args.database {
                config.database_path = database.into();
            }
            if let Some(output) = &args.output {
                config.download_dir = output.into();
            }
            config.validate()?;

            let storage = Storage::new(config.database_path_str()).await?;
            let mut stored = storage.load_config().await?;

            let validator = DriveValidator::new(&config);
            let (settings, credential) =
                prepare_run(&args, &config, &mut stored, &validator).await?;
            storage.save_config(&stored).await?;

            let reporter: Option<Box<dyn ReportSink>> = match (&settings.report, &args.report_csv) {
                (Some(_), Some(dir)) => Some(Box::new(CsvReportSink::new(dir)) as Box<dyn ReportSink>),
                (Some(_), None) => Some(
                    Box::new(SheetsReportSink::new(&config, credential.clone())?) as Box<dyn ReportSink>,
                ),
                (None, _) => None,
            };

            let client = DriveClient::new(&config, credential)?;
            let sink = FsSink::new(&config.download_dir);

            let cancel = CancelFlag::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current file");
                    ctrl_c.cancel();
                }
            });

            let (tx, rx) = mpsc::unbounded_channel();
            let printer = tokio::spawn(print_events(rx));
            let mut ctx = RunContext::with_cancel(cancel).with_events(tx);

            let mut pipeline = Pipeline::new(&client, &client, &sink);
            if let Some(reporter) = reporter.as_deref() {
                pipeline = pipeline.with_reporter(reporter);
            }

            let summary = pipeline.run(&settings, &mut ctx).await?;
            drop(ctx);
            if let Err(e) = printer.await {
                error!("Progress printer stopped: {}", e);
            }

            remember_settings(&mut stored, &settings, args.report_csv.is_some());
            storage.save_config(&stored).await?;
            storage.record_run(&summary.to_record()).await?;

            let stats = summary.stats;
            println!();
            println!("Run {} {}", summary.run_id, summary.state.as_str());
            println!("  Processed:  {}", stats.processed);
            println!("  Downloaded: {}", stats.downloaded);
            println!("  Errors:     {}", stats.errors);
            if settings.filter.id_filter.enabled {
                println!("  Included:   {}", stats.included);
                println!("  Excluded:   {}", stats.excluded);
            }
            if summary.reported_rows > 0 {
                println!("  Reported:   {}", summary.reported_rows);
            }
            println!("  Output:     {}", config.download_dir.display());

            if summary.state == RunState::Failed {
                bail!(
                    "Run failed: {}",
                    summary.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        Commands::ExtractIds { text, file } => {
            let input = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read file: {}", path))?,
                (None, None) => std::io::read_to_string(std::io::stdin())
                    .context("Cannot read standard input")?,
            };

            let ids = extract_ids(&input);
            info!("Found {} identifiers", ids.len());
            for id in ids {
                println!("{}", id);
            }
        }

        Commands::History { limit, database } => {
            if let Some(database) = database {
                config.database_path = database.into();
            }
            let storage = Storage::new(config.database_path_str()).await?;
            let runs = storage.recent_runs(limit).await?;

            println!("Found {} runs:", runs.len());
            for run in runs {
                println!(
                    "{} - {} - {} - root {} - processed {}, downloaded {}, errors {}, included {}, excluded {}",
                    run.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                    run.state.as_str(),
                    run.id,
                    run.root_folder_id,
                    run.stats.processed,
                    run.stats.downloaded,
                    run.stats.errors,
                    run.stats.included,
                    run.stats.excluded
                );
            }
        }
    }

    Ok(())
}

/// Build and check the run's settings from the command line and stored
/// defaults. Touches neither the network nor `stored`.
fn plan_run(args: &RunArgs, config: &Config, stored: &StoredConfig) -> Result<RunSettings> {
    let root_folder_id = args
        .root
        .clone()
        .or_else(|| config.root_folder_id.clone())
        .or_else(|| stored.root_folder_id.clone())
        .unwrap_or_default();

    let date_range = DateRange::new(
        args.from_date
            .or(stored.start_date)
            .context("Start date is required (--from YYYY-MM-DD)")?,
        args.to_date
            .or(stored.end_date)
            .context("End date is required (--to YYYY-MM-DD)")?,
    );

    let mode = match &args.id_mode {
        Some(mode) => Commands::parse_id_mode(mode)?,
        None => stored.id_filter_mode,
    };
    let id_filter = if args.no_id_filter {
        IdFilter::disabled()
    } else if args.ids.is_some() || args.ids_file.is_some() {
        let mut target_ids = IdentifierSet::new();
        if let Some(text) = &args.ids {
            target_ids.extend_from_text(text);
        }
        if let Some(path) = &args.ids_file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read identifier file: {}", path))?;
            target_ids.extend_from_text(&text);
        }
        IdFilter::enabled(mode, target_ids)
    } else if stored.id_filter_enabled {
        IdFilter::enabled(mode, stored.target_ids.iter().collect())
    } else {
        IdFilter::disabled()
    };

    let report = match (&args.report_sheet, &args.report_csv) {
        (Some(sheet), _) => Some(ReportTarget {
            resource_id: sheet.clone(),
            subsection: args.report_tab.clone(),
        }),
        (None, Some(_)) => Some(ReportTarget {
            resource_id: CSV_REPORT_NAME.to_string(),
            subsection: args.report_tab.clone(),
        }),
        (None, None) => stored.report_resource_id.clone().map(|resource_id| ReportTarget {
            resource_id,
            subsection: stored
                .report_subsection
                .clone()
                .unwrap_or_else(|| args.report_tab.clone()),
        }),
    };

    let settings = RunSettings {
        root_folder_id,
        filter: FilterConfig {
            date_range,
            id_filter,
        },
        window_zone: if args.utc {
            WindowZone::Utc
        } else {
            WindowZone::Local
        },
        rules: config.rules.clone(),
        throttle: config.download_delay(),
        report,
    };
    settings.validate()?;
    Ok(settings)
}

/// Settings first, credential second: a bad request fails before any request is sent
async fn prepare_run(
    args: &RunArgs,
    config: &Config,
    stored: &mut StoredConfig,
    validator: &dyn CredentialValidator,
) -> Result<(RunSettings, Credential)> {
    let settings = plan_run(args, config, stored)?;
    let (credential, _) =
        resolve_credential(args.token.as_deref(), stored, Utc::now(), validator).await?;
    Ok((settings, credential))
}

/// Keep this run's choices as the defaults for the next one
fn remember_settings(
    stored: &mut StoredConfig,
    settings: &RunSettings,
    csv_report: bool,
) {
    stored.root_folder_id = Some(settings.root_folder_id.clone()).filter(|id| !id.is_empty());
    stored.start_date = Some(settings.filter.date_range.start);
    stored.end_date = Some(settings.filter.date_range.end);

    let id_filter = &settings.filter.id_filter;
    stored.id_filter_enabled = id_filter.enabled;
    stored.id_filter_mode = id_filter.mode;
    if id_filter.enabled {
        stored.target_ids = id_filter.target_ids.iter().map(str::to_string).collect();
    }

    if let Some(target) = settings.report.as_ref().filter(|_| !csv_report) {
        stored.report_resource_id = Some(target.resource_id.clone());
        stored.report_subsection = Some(target.subsection.clone());
    }
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<RunEvent>) {
    let mut last_progress = 0;
    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::Progress(percent) if percent != last_progress => {
                last_progress = percent;
                println!("Progress: {}%", percent);
            }
            RunEvent::State(state) if state.is_terminal() || state == RunState::Stopping => {
                println!("State: {}", state.as_str());
            }
            _ => {}
        }
    }
}
