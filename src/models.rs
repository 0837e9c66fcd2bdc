use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::IdentifierSet;

/// A leaf file found during the crawl, annotated with the folders above it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub modified_at: DateTime<Utc>,
    /// Container names from the group folder down to the file's parent
    pub path: Vec<String>,
    pub source_link: String,
}

impl FileRecord {
    /// Top-level group folder this file was found under
    pub fn group(&self) -> Option<&str> {
        self.path.first().map(String::as_str)
    }
}

/// A folder seen during traversal; dropped once its subtree is expanded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
}

/// Inclusive calendar-day range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdFilterMode {
    /// Only files whose name carries a target identifier
    #[default]
    OnlyIncluded,
    /// Only files whose name carries none of the target identifiers
    OnlyExcluded,
    /// Everything, routed to INCLUDED or EXCLUDED
    Both,
}

impl IdFilterMode {
    pub fn as_str(&self) -> &str {
        match self {
            IdFilterMode::OnlyIncluded => "only-included",
            IdFilterMode::OnlyExcluded => "only-excluded",
            IdFilterMode::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdFilter {
    pub enabled: bool,
    pub mode: IdFilterMode,
    pub target_ids: IdentifierSet,
}

impl IdFilter {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn enabled(mode: IdFilterMode, target_ids: IdentifierSet) -> Self {
        Self {
            enabled: true,
            mode,
            target_ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub date_range: DateRange,
    pub id_filter: IdFilter,
}

/// Logical output grouping; also the first segment of the destination path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetCategory {
    All,
    Included,
    Excluded,
}

impl TargetCategory {
    pub fn as_str(&self) -> &str {
        match self {
            TargetCategory::All => "ALL",
            TargetCategory::Included => "INCLUDED",
            TargetCategory::Excluded => "EXCLUDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub file: FileRecord,
    pub category: TargetCategory,
    /// `None` when identifier filtering is disabled
    pub included: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: u64,
    pub downloaded: u64,
    pub errors: u64,
    pub included: u64,
    pub excluded: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
            RunState::Stopped => "stopped",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(RunState::Idle),
            "running" => Some(RunState::Running),
            "stopping" => Some(RunState::Stopping),
            "stopped" => Some(RunState::Stopped),
            "completed" => Some(RunState::Completed),
            "failed" => Some(RunState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Stopped | RunState::Completed | RunState::Failed
        )
    }
}
