//! Per-run report rows and the sinks they are handed to

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::drive::{GoogleErrorResponse, SheetsApi};
use crate::identifiers::extract_ids;
use crate::models::DownloadTask;
use crate::session::Credential;

static NAME_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[-/](\d{2})[-/](\d{2})").unwrap());

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report target {resource_id} is not reachable: {message}")]
    Unreachable { resource_id: String, message: String },

    #[error("Report API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Invalid report URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Spreadsheet-like resource and the tab the rows go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    pub resource_id: String,
    pub subsection: String,
}

/// One downloaded file as it appears in the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub file_id: String,
    pub name: String,
    pub target_category: String,
    pub included: Option<bool>,
    pub extracted_ids: Vec<String>,
    pub extracted_date: NaiveDate,
    pub source_link: String,
}

impl ReportRow {
    pub const HEADER: [&'static str; 7] = [
        "file_id",
        "name",
        "target_category",
        "included",
        "extracted_ids",
        "extracted_date",
        "source_link",
    ];

    pub fn from_task(task: &DownloadTask) -> Self {
        let file = &task.file;
        Self {
            file_id: file.id.clone(),
            name: file.name.clone(),
            target_category: task.category.as_str().to_string(),
            included: task.included,
            extracted_ids: extract_ids(&file.name),
            extracted_date: extract_date(&file.name)
                .unwrap_or_else(|| file.modified_at.date_naive()),
            source_link: file.source_link.clone(),
        }
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.file_id.clone(),
            self.name.clone(),
            self.target_category.clone(),
            match self.included {
                Some(true) => "yes".to_string(),
                Some(false) => "no".to_string(),
                None => String::new(),
            },
            self.extracted_ids.join(", "),
            self.extracted_date.format("%Y-%m-%d").to_string(),
            self.source_link.clone(),
        ]
    }
}

/// First `YYYY-MM-DD` or `YYYY/MM/DD` calendar date in a file name
pub fn extract_date(name: &str) -> Option<NaiveDate> {
    NAME_DATE.captures_iter(name).find_map(|caps| {
        NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )
    })
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn check_reachable(&self, target: &ReportTarget) -> Result<(), ReportError>;

    /// Hand the rows over; returns how many were accepted
    async fn submit(&self, target: &ReportTarget, rows: &[ReportRow]) -> Result<usize, ReportError>;
}

/// Appends rows to a Google Sheets tab
pub struct SheetsReportSink {
    client: Client,
    base_url: String,
    credential: Credential,
}

impl SheetsReportSink {
    pub fn new(config: &Config, credential: Credential) -> Result<Self, ReportError> {
        let client = Client::builder()
            .user_agent(&config.http.user_agent)
            .timeout(config.http_timeout())
            .build()?;
        Ok(Self::with_client(client, &config.api.sheets_base_url, credential))
    }

    pub fn with_client(client: Client, base_url: &str, credential: Credential) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
        }
    }

    fn spreadsheet_url(&self, resource_id: &str, extra: &[&str]) -> Result<Url, ReportError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ReportError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ReportError::InvalidUrl(self.base_url.clone()))?;
            segments.pop_if_empty();
            segments.extend(SheetsApi::SPREADSHEETS_ENDPOINT.trim_start_matches('/').split('/'));
            segments.push(resource_id);
            segments.extend(extra);
        }
        Ok(url)
    }
}

/// `spreadsheets.values.get` response; `values` is absent for an empty range
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl SheetsReportSink {
    /// Whether the first cell of the tab already holds something
    async fn tab_has_rows(&self, target: &ReportTarget) -> Result<bool, ReportError> {
        let range = format!("{}!A1:A1", target.subsection);
        let url = self.spreadsheet_url(&target.resource_id, &["values", range.as_str()])?;
        let response = self
            .client
            .get(url)
            .header("Authorization", self.credential.header_value())
            .send()
            .await?;

        if !response.status().is_success() {
            let (status_code, message) = error_message(response).await;
            return Err(ReportError::ApiError {
                status_code,
                message,
            });
        }

        let text = response.text().await?;
        let parsed: ValueRange = serde_json::from_str(&text).map_err(|e| ReportError::ApiError {
            status_code: 200,
            message: format!("unexpected values response: {}", e),
        })?;
        Ok(!parsed.values.is_empty())
    }
}

async fn error_message(response: reqwest::Response) -> (u16, String) {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GoogleErrorResponse>(&text)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| if text.is_empty() { status.to_string() } else { text });
    (status.as_u16(), message)
}

#[async_trait]
impl ReportSink for SheetsReportSink {
    async fn check_reachable(&self, target: &ReportTarget) -> Result<(), ReportError> {
        let url = self.spreadsheet_url(&target.resource_id, &[])?;
        let response = self
            .client
            .get(url)
            .query(&[("fields", "spreadsheetId")])
            .header("Authorization", self.credential.header_value())
            .send()
            .await?;

        if response.status().is_success() {
            debug!("Spreadsheet {} is reachable", target.resource_id);
            return Ok(());
        }

        let (status, message) = error_message(response).await;
        Err(ReportError::Unreachable {
            resource_id: target.resource_id.clone(),
            message: format!("status {}: {}", status, message),
        })
    }

    async fn submit(&self, target: &ReportTarget, rows: &[ReportRow]) -> Result<usize, ReportError> {
        let range = format!("{}!A1:append", target.subsection);
        let url = self.spreadsheet_url(&target.resource_id, &["values", range.as_str()])?;

        let mut values = Vec::with_capacity(rows.len() + 1);
        if !self.tab_has_rows(target).await? {
            debug!("Tab {} is empty, writing the header first", target.subsection);
            values.push(ReportRow::HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>());
        }
        values.extend(rows.iter().map(ReportRow::to_cells));

        let response = self
            .client
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .header("Authorization", self.credential.header_value())
            .json(&json!({ "values": values }))
            .send()
            .await?;

        if !response.status().is_success() {
            let (status_code, message) = error_message(response).await;
            return Err(ReportError::ApiError {
                status_code,
                message,
            });
        }

        info!(
            "Appended {} rows to spreadsheet {} ({})",
            rows.len(),
            target.resource_id,
            target.subsection
        );
        Ok(rows.len())
    }
}

/// Writes `<dir>/<resource>-<subsection>.csv`, appending to an existing file
pub struct CsvReportSink {
    dir: PathBuf,
}

impl CsvReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, target: &ReportTarget) -> PathBuf {
        let clean = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
                .collect()
        };
        self.dir.join(format!(
            "{}-{}.csv",
            clean(&target.resource_id),
            clean(&target.subsection)
        ))
    }
}

#[async_trait]
impl ReportSink for CsvReportSink {
    async fn check_reachable(&self, target: &ReportTarget) -> Result<(), ReportError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ReportError::Unreachable {
            resource_id: target.resource_id.clone(),
            message: format!("{}: {}", self.dir.display(), e),
        })
    }

    async fn submit(&self, target: &ReportTarget, rows: &[ReportRow]) -> Result<usize, ReportError> {
        let path = self.path_for(target);
        let is_new = !path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        let mut writer = csv::Writer::from_writer(file);
        if is_new {
            writer.write_record(ReportRow::HEADER)?;
        }
        for row in rows {
            writer.write_record(row.to_cells())?;
        }
        writer.flush()?;

        info!("Wrote {} report rows to {}", rows.len(), path.display());
        Ok(rows.len())
    }
}
