//! Run controller: validation, phase sequencing, state and progress

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cancel::CancelFlag;
use crate::config::ContentRules;
use crate::crawler::Crawler;
use crate::downloader::sink::DownloadSink;
use crate::downloader::Dispatcher;
use crate::drive::{ContentBackend, DriveError, ListingBackend, RetrievalStrategy, DEFAULT_STRATEGIES};
use crate::filter::{filter_files, DateWindow, WindowZone};
use crate::models::{FilterConfig, RunState, RunStats};
use crate::policy::classify;
use crate::report::{ReportRow, ReportSink, ReportTarget};
use crate::storage::RunRecord;

/// Share of the progress bar spent discovering and crawling groups
pub const DISCOVERY_WEIGHT: f64 = 20.0;
/// Progress once filtering and classification are done
pub const SELECTION_END: f64 = 25.0;
const DISPATCH_WEIGHT: f64 = 75.0;
const DISPATCH_WEIGHT_WITH_REPORT: f64 = 60.0;
/// Only a completed run shows 100
const MAX_RUNNING_PROGRESS: f64 = 99.0;

/// Blocks `Idle -> Running`; nothing has touched the network yet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Root folder id is required")]
    MissingRootFolder,

    #[error("Identifier filtering is enabled but no valid identifiers were given")]
    NoTargetIds,

    #[error("Reporting is enabled but no report resource id was given")]
    MissingReportTarget,

    #[error("Reporting is enabled but no report sink is configured")]
    MissingReportSink,

    #[error("Start date {start} is after end date {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Date range {start} to {end} is outside the supported calendar")]
    DateOutOfRange { start: String, end: String },

    #[error("A run is already in progress")]
    AlreadyRunning,
}

/// Fatal phase errors; the run ends `Failed`
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Listing failed: {0}")]
    Listing(#[source] DriveError),

    #[error("No group folders found under {0}")]
    NoGroups(String),
}

/// Live updates for whoever is presenting the run
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    State(RunState),
    Status(String),
    Progress(u8),
    Stats(RunStats),
    Log(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Everything one run mutates. Passed explicitly to each phase.
pub struct RunContext {
    run_id: Uuid,
    state: RunState,
    cancel: CancelFlag,
    progress: f64,
    status: String,
    stats: RunStats,
    log: Vec<LogLine>,
    report_rows: Vec<ReportRow>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    events: Option<UnboundedSender<RunEvent>>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self::with_cancel(CancelFlag::new())
    }

    pub fn with_cancel(cancel: CancelFlag) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Idle,
            cancel,
            progress: 0.0,
            status: String::new(),
            stats: RunStats::default(),
            log: Vec::new(),
            report_rows: Vec::new(),
            started_at: None,
            finished_at: None,
            events: None,
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            // Receiver gone just means nobody is watching
            let _ = events.send(event);
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// `Idle -> Running`: fresh id, stats, log and report buffer
    pub fn begin(&mut self) {
        self.run_id = Uuid::new_v4();
        self.cancel.reset();
        self.progress = 0.0;
        self.status.clear();
        self.stats = RunStats::default();
        self.log.clear();
        self.report_rows.clear();
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.state = RunState::Running;
        self.emit(RunEvent::State(self.state));
        self.emit(RunEvent::Progress(0));
        self.emit(RunEvent::Stats(self.stats));
    }

    /// Cancellation checkpoint. Moves `Running -> Stopping` the first time a
    /// stop request is seen; returns whether the caller should stop.
    pub fn checkpoint(&mut self) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        if self.state == RunState::Running {
            self.state = RunState::Stopping;
            self.emit(RunEvent::State(self.state));
            self.log("Stop requested, finishing current step");
        }
        true
    }

    pub fn status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        info!("{}", self.status);
        self.emit(RunEvent::Status(self.status.clone()));
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push_log(message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.push_log(message);
    }

    fn push_log(&mut self, message: String) {
        self.emit(RunEvent::Log(message.clone()));
        self.log.push(LogLine {
            at: Utc::now(),
            message,
        });
    }

    pub fn log_lines(&self) -> &[LogLine] {
        &self.log
    }

    /// Raise progress to `percent`; lower values are ignored
    pub fn set_progress(&mut self, percent: f64) {
        let before = self.progress();
        self.progress = percent.min(MAX_RUNNING_PROGRESS).max(self.progress);
        if self.progress() != before {
            self.emit(RunEvent::Progress(self.progress()));
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress.floor() as u8
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn update_stats(&mut self, update: impl FnOnce(&mut RunStats)) {
        update(&mut self.stats);
        self.emit(RunEvent::Stats(self.stats));
    }

    pub fn push_report_row(&mut self, row: ReportRow) {
        self.report_rows.push(row);
    }

    pub fn report_rows(&self) -> &[ReportRow] {
        &self.report_rows
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Enter a terminal state
    pub fn finish(&mut self, state: RunState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
        if state == RunState::Completed {
            self.progress = 100.0;
            self.emit(RunEvent::Progress(100));
        }
        self.emit(RunEvent::State(state));
    }
}

/// What one run should do
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub root_folder_id: String,
    pub filter: FilterConfig,
    pub window_zone: WindowZone,
    pub rules: ContentRules,
    pub throttle: Duration,
    pub report: Option<ReportTarget>,
}

impl RunSettings {
    /// Check the settings and resolve the date window they describe
    pub fn validate(&self) -> Result<DateWindow, ValidationError> {
        if self.root_folder_id.trim().is_empty() {
            return Err(ValidationError::MissingRootFolder);
        }

        let id_filter = &self.filter.id_filter;
        if id_filter.enabled && id_filter.target_ids.is_empty() {
            return Err(ValidationError::NoTargetIds);
        }

        let range = &self.filter.date_range;
        if !range.is_ordered() {
            return Err(ValidationError::InvalidDateRange {
                start: range.start.to_string(),
                end: range.end.to_string(),
            });
        }
        let window = self
            .window_zone
            .window(range)
            .ok_or_else(|| ValidationError::DateOutOfRange {
                start: range.start.to_string(),
                end: range.end.to_string(),
            })?;

        if let Some(target) = &self.report {
            if target.resource_id.trim().is_empty() {
                return Err(ValidationError::MissingReportTarget);
            }
        }

        Ok(window)
    }
}

/// Outcome of a run that got past validation
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub state: RunState,
    pub stats: RunStats,
    pub root_folder_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
    pub reported_rows: usize,
}

impl RunSummary {
    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            id: self.run_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            state: self.state,
            root_folder_id: self.root_folder_id.clone(),
            stats: self.stats,
        }
    }
}

/// Crawl, filter, classify, dispatch and (optionally) report
pub struct Pipeline<'a> {
    listing: &'a dyn ListingBackend,
    content: &'a dyn ContentBackend,
    sink: &'a dyn DownloadSink,
    reporter: Option<&'a dyn ReportSink>,
    strategies: &'a [RetrievalStrategy],
}

impl<'a> Pipeline<'a> {
    pub fn new(
        listing: &'a dyn ListingBackend,
        content: &'a dyn ContentBackend,
        sink: &'a dyn DownloadSink,
    ) -> Self {
        Self {
            listing,
            content,
            sink,
            reporter: None,
            strategies: &DEFAULT_STRATEGIES,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn ReportSink) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_strategies(mut self, strategies: &'a [RetrievalStrategy]) -> Self {
        self.strategies = strategies;
        self
    }

    pub async fn run(
        &self,
        settings: &RunSettings,
        ctx: &mut RunContext,
    ) -> Result<RunSummary, ValidationError> {
        if matches!(ctx.state(), RunState::Running | RunState::Stopping) {
            return Err(ValidationError::AlreadyRunning);
        }
        let window = settings.validate()?;
        if settings.report.is_some() && self.reporter.is_none() {
            return Err(ValidationError::MissingReportSink);
        }

        ctx.begin();
        info!(
            "Run {} started for root {}",
            ctx.run_id(),
            settings.root_folder_id
        );

        let mut reported_rows = 0;
        let outcome = self.execute(settings, &window, ctx, &mut reported_rows).await;
        let error = match outcome {
            Ok(()) if ctx.checkpoint() => {
                ctx.status("Stopped");
                ctx.finish(RunState::Stopped);
                None
            }
            Ok(()) => {
                ctx.status("Completed");
                ctx.finish(RunState::Completed);
                None
            }
            Err(e) => {
                error!("Run {} failed: {}", ctx.run_id(), e);
                ctx.status(format!("Failed: {}", e));
                ctx.finish(RunState::Failed);
                Some(e.to_string())
            }
        };

        let stats = ctx.stats();
        info!(
            "Run {} {}: processed {}, downloaded {}, errors {}, included {}, excluded {}",
            ctx.run_id(),
            ctx.state().as_str(),
            stats.processed,
            stats.downloaded,
            stats.errors,
            stats.included,
            stats.excluded
        );

        let started_at = ctx.started_at().unwrap_or_else(Utc::now);
        Ok(RunSummary {
            run_id: ctx.run_id(),
            state: ctx.state(),
            stats,
            root_folder_id: settings.root_folder_id.clone(),
            started_at,
            finished_at: ctx.finished_at().unwrap_or(started_at),
            error,
            reported_rows,
        })
    }

    async fn execute(
        &self,
        settings: &RunSettings,
        window: &DateWindow,
        ctx: &mut RunContext,
        reported_rows: &mut usize,
    ) -> Result<(), RunError> {
        let crawler = Crawler::new(self.listing, &settings.rules.content_folders);
        let files = crawler.crawl(&settings.root_folder_id, ctx).await?;
        if ctx.checkpoint() {
            return Ok(());
        }

        ctx.status("Filtering files");
        let total = files.len();
        let filtered = filter_files(files, window, &settings.rules.keywords);
        ctx.log(format!(
            "{} of {} files match the date range and keywords",
            filtered.len(),
            total
        ));

        let id_filter = &settings.filter.id_filter;
        let tasks = classify(filtered, id_filter);
        if id_filter.enabled {
            ctx.log(format!(
                "{} files selected by identifier filter ({}, {} ids)",
                tasks.len(),
                id_filter.mode.as_str(),
                id_filter.target_ids.len()
            ));
        }
        ctx.set_progress(SELECTION_END);

        let weight = match (settings.report.as_ref(), self.reporter) {
            (Some(_), Some(_)) => DISPATCH_WEIGHT_WITH_REPORT,
            _ => DISPATCH_WEIGHT,
        };
        Dispatcher::new(self.content, self.sink, self.strategies)
            .with_throttle(settings.throttle)
            .dispatch(&tasks, ctx, SELECTION_END, weight)
            .await;

        let stats = ctx.stats();
        ctx.log(format!(
            "Downloads finished: {} saved, {} failed",
            stats.downloaded, stats.errors
        ));

        if ctx.checkpoint() {
            return Ok(());
        }

        if let (Some(target), Some(reporter)) = (settings.report.as_ref(), self.reporter) {
            *reported_rows = self.report(reporter, target, ctx).await;
        }

        Ok(())
    }

    /// Report hand-off; failures are logged, never fatal
    async fn report(
        &self,
        reporter: &dyn ReportSink,
        target: &ReportTarget,
        ctx: &mut RunContext,
    ) -> usize {
        let report_start = SELECTION_END + DISPATCH_WEIGHT_WITH_REPORT;
        ctx.status(format!("Reporting to {}", target.resource_id));

        if let Err(e) = reporter.check_reachable(target).await {
            ctx.warn(format!("Report skipped: {}", e));
            return 0;
        }
        ctx.set_progress(report_start + (MAX_RUNNING_PROGRESS - report_start) / 2.0);

        let rows = ctx.report_rows().to_vec();
        if rows.is_empty() {
            ctx.log("Nothing to report");
            return 0;
        }

        match reporter.submit(target, &rows).await {
            Ok(accepted) => {
                ctx.log(format!(
                    "Reported {} rows to {} ({})",
                    accepted, target.resource_id, target.subsection
                ));
                ctx.set_progress(MAX_RUNNING_PROGRESS);
                accepted
            }
            Err(e) => {
                ctx.warn(format!("Report failed: {}", e));
                0
            }
        }
    }
}
