//! Date-window and keyword filtering of crawled files

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::models::{DateRange, FileRecord};

/// Half-open instant range `[start 00:00, day after end 00:00)`, each bound
/// taken at midnight of its own date in the chosen zone. Every instant of the
/// end day is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: DateTime<Utc>,
    end_exclusive: DateTime<Utc>,
}

impl DateWindow {
    /// `None` when a bound sits too close to the calendar limits to be placed
    /// in any zone.
    pub fn new<Tz: TimeZone>(range: &DateRange, zone: &Tz) -> Option<Self> {
        let after_end = range.end.succ_opt()?;
        // One spare day on both sides keeps every offset in range
        range.start.pred_opt()?;
        after_end.succ_opt()?;

        Some(Self {
            start: midnight(range.start, zone)?,
            end_exclusive: midnight(after_end, zone)?,
        })
    }

    /// Window in the machine's time zone, DST rules included
    pub fn local(range: &DateRange) -> Option<Self> {
        Self::new(range, &Local)
    }

    pub fn utc(range: &DateRange) -> Option<Self> {
        Self::new(range, &Utc)
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant < self.end_exclusive
    }
}

/// Zone the date-only bounds are read in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowZone {
    #[default]
    Local,
    Utc,
}

impl WindowZone {
    pub fn window(&self, range: &DateRange) -> Option<DateWindow> {
        match self {
            WindowZone::Local => DateWindow::local(range),
            WindowZone::Utc => DateWindow::utc(range),
        }
    }
}

fn midnight<Tz: TimeZone>(date: NaiveDate, zone: &Tz) -> Option<DateTime<Utc>> {
    let local = date.and_time(NaiveTime::MIN);
    zone.from_local_datetime(&local)
        .earliest()
        // Midnight skipped by a DST jump: the day starts an hour later
        .or_else(|| {
            local
                .checked_add_signed(Duration::hours(1))
                .and_then(|later| zone.from_local_datetime(&later).earliest())
        })
        .map(|instant| instant.with_timezone(&Utc))
}

/// Case-insensitive substring match against any keyword
pub fn matches_keywords(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords
        .iter()
        .any(|keyword| name.contains(keyword.to_lowercase().as_str()))
}

/// Keep files modified inside the window whose name contains a keyword.
/// Input order is preserved.
pub fn filter_files(files: Vec<FileRecord>, window: &DateWindow, keywords: &[String]) -> Vec<FileRecord> {
    files
        .into_iter()
        .filter(|file| window.contains(&file.modified_at))
        .filter(|file| matches_keywords(&file.name, keywords))
        .collect()
}
