//! Sequential, throttled download of classified files

pub mod sanitize;
pub mod sink;

use std::time::Duration;

use crate::drive::{retrieve_content, ContentBackend, RetrievalStrategy};
use crate::models::DownloadTask;
use crate::report::ReportRow;
use crate::runner::RunContext;
use sanitize::sanitize_filename;
use sink::{ConflictPolicy, DownloadSink};

/// `{CATEGORY}/{sanitized name}`
pub fn destination_for(task: &DownloadTask) -> String {
    format!(
        "{}/{}",
        task.category.as_str(),
        sanitize_filename(&task.file.name)
    )
}

pub struct Dispatcher<'a> {
    content: &'a dyn ContentBackend,
    sink: &'a dyn DownloadSink,
    strategies: &'a [RetrievalStrategy],
    throttle: Duration,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        content: &'a dyn ContentBackend,
        sink: &'a dyn DownloadSink,
        strategies: &'a [RetrievalStrategy],
    ) -> Self {
        Self {
            content,
            sink,
            strategies,
            throttle: Duration::ZERO,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Download `tasks` one at a time, in order.
    ///
    /// Per-item failures are counted and logged, never returned. Progress moves
    /// from `progress_start` to `progress_start + weight`. Returns how many tasks
    /// were attempted before the list ran out or the run was cancelled.
    pub async fn dispatch(
        &self,
        tasks: &[DownloadTask],
        ctx: &mut RunContext,
        progress_start: f64,
        weight: f64,
    ) -> usize {
        let total = tasks.len();
        if total == 0 {
            ctx.log("No files to download");
            ctx.set_progress(progress_start + weight);
            return 0;
        }

        ctx.log(format!("Downloading {} files", total));
        let mut attempted = 0;

        for (i, task) in tasks.iter().enumerate() {
            if i > 0 && !self.throttle.is_zero() {
                tokio::time::sleep(self.throttle).await;
            }
            if ctx.checkpoint() {
                ctx.log(format!("Stopped after {} of {} files", attempted, total));
                break;
            }

            attempted += 1;
            ctx.update_stats(|stats| stats.processed += 1);
            ctx.status(format!("Downloading {}/{}: {}", i + 1, total, task.file.name));

            self.dispatch_one(task, ctx).await;

            let fraction = (i + 1) as f64 / total as f64;
            ctx.set_progress(progress_start + fraction * weight);
        }

        attempted
    }

    async fn dispatch_one(&self, task: &DownloadTask, ctx: &mut RunContext) {
        let text = match retrieve_content(self.content, &task.file.id, self.strategies).await {
            Ok((text, _)) => text,
            Err(failure) => {
                ctx.update_stats(|stats| stats.errors += 1);
                ctx.warn(format!("✗ {}: {}", task.file.name, failure));
                return;
            }
        };

        let destination = destination_for(task);
        match self
            .sink
            .save(text.as_bytes(), &destination, ConflictPolicy::Uniquify)
            .await
        {
            Ok(saved) => {
                ctx.update_stats(|stats| {
                    stats.downloaded += 1;
                    match task.included {
                        Some(true) => stats.included += 1,
                        Some(false) => stats.excluded += 1,
                        None => {}
                    }
                });
                ctx.log(format!("✓ {}", saved.display()));
                ctx.push_report_row(ReportRow::from_task(task));
            }
            Err(e) => {
                ctx.update_stats(|stats| stats.errors += 1);
                ctx.warn(format!("✗ Failed to save {}: {}", destination, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::DEFAULT_STRATEGIES;
    use crate::models::{FileRecord, RunState, TargetCategory};
    use crate::testing::{FakeDrive, FakeFolder, MemorySink};

    fn task(id: &str, name: &str, category: TargetCategory, included: Option<bool>) -> DownloadTask {
        DownloadTask {
            file: FileRecord {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: "application/vnd.google-apps.document".to_string(),
                modified_at: "2024-06-10T10:00:00Z".parse().unwrap(),
                path: vec!["Team A".to_string()],
                source_link: format!("https://drive.test/{id}"),
            },
            category,
            included,
        }
    }

    fn empty_drive() -> FakeDrive {
        FakeDrive::new(FakeFolder::new("root", "root"))
    }

    fn started() -> RunContext {
        let mut ctx = RunContext::new();
        ctx.begin();
        ctx
    }

    #[test]
    fn test_destination_uses_category_and_sanitized_name() {
        let t = task("a", "Call 1234567: Notes by Gemini.docx", TargetCategory::Included, Some(true));
        assert_eq!(destination_for(&t), "INCLUDED/Call_1234567_Notes_by_Gemini.txt");
    }

    #[tokio::test]
    async fn test_fallback_and_per_item_failures() {
        let drive = empty_drive()
            .with_content("a", RetrievalStrategy::ExportText, "exported")
            .with_content("b", RetrievalStrategy::RawMedia, "raw bytes");
        let sink = MemorySink::new();
        let tasks = vec![
            task("a", "first transcript", TargetCategory::All, None),
            task("missing", "gone transcript", TargetCategory::All, None),
            task("b", "second transcript", TargetCategory::All, None),
        ];
        let mut ctx = started();

        let attempted = Dispatcher::new(&drive, &sink, &DEFAULT_STRATEGIES)
            .dispatch(&tasks, &mut ctx, 25.0, 75.0)
            .await;

        assert_eq!(attempted, 3);
        let stats = ctx.stats();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.downloaded, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.processed, stats.downloaded + stats.errors);
        assert_eq!(stats.included + stats.excluded, 0);
        assert_eq!(sink.contents_of("ALL/first_transcript.txt").as_deref(), Some("exported"));
        assert_eq!(sink.contents_of("ALL/second_transcript.txt").as_deref(), Some("raw bytes"));
        assert_eq!(ctx.report_rows().len(), 2);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_the_run() {
        let drive = empty_drive()
            .with_content("a", RetrievalStrategy::ExportText, "one")
            .with_content("b", RetrievalStrategy::ExportText, "two");
        let sink = MemorySink::new().failing_on("INCLUDED/a_1234567.txt");
        let tasks = vec![
            task("a", "a 1234567", TargetCategory::Included, Some(true)),
            task("b", "b notes", TargetCategory::Excluded, Some(false)),
        ];
        let mut ctx = started();

        Dispatcher::new(&drive, &sink, &DEFAULT_STRATEGIES)
            .dispatch(&tasks, &mut ctx, 25.0, 75.0)
            .await;

        let stats = ctx.stats();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.downloaded, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.included, 0);
        assert_eq!(stats.excluded, 1);
        assert_eq!(sink.destinations(), vec!["EXCLUDED/b_notes.txt"]);
    }

    #[tokio::test]
    async fn test_name_collisions_are_uniquified() {
        let drive = empty_drive()
            .with_content("a", RetrievalStrategy::ExportText, "one")
            .with_content("b", RetrievalStrategy::ExportText, "two");
        let sink = MemorySink::new();
        let tasks = vec![
            task("a", "transcript", TargetCategory::All, None),
            task("b", "transcript", TargetCategory::All, None),
        ];
        let mut ctx = started();

        Dispatcher::new(&drive, &sink, &DEFAULT_STRATEGIES)
            .dispatch(&tasks, &mut ctx, 25.0, 75.0)
            .await;

        assert_eq!(
            sink.destinations(),
            vec!["ALL/transcript.txt", "ALL/transcript (1).txt"]
        );
        assert_eq!(sink.contents_of("ALL/transcript.txt").as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn test_cancelled_run_dispatches_nothing() {
        let drive = empty_drive().with_content("a", RetrievalStrategy::ExportText, "one");
        let sink = MemorySink::new();
        let tasks = vec![task("a", "transcript", TargetCategory::All, None)];
        let mut ctx = started();
        ctx.cancel_flag().cancel();

        let attempted = Dispatcher::new(&drive, &sink, &DEFAULT_STRATEGIES)
            .dispatch(&tasks, &mut ctx, 25.0, 75.0)
            .await;

        assert_eq!(attempted, 0);
        assert_eq!(ctx.stats().processed, 0);
        assert!(sink.destinations().is_empty());
    }

    #[tokio::test]
    async fn test_stop_between_items_leaves_the_rest_untouched() {
        let drive = empty_drive()
            .with_content("a", RetrievalStrategy::ExportText, "one")
            .with_content("b", RetrievalStrategy::ExportText, "two");
        let mut ctx = started();
        let sink = MemorySink::new().cancel_after_save(ctx.cancel_flag());
        let tasks = vec![
            task("a", "first transcript", TargetCategory::All, None),
            task("b", "second transcript", TargetCategory::All, None),
        ];

        let attempted = Dispatcher::new(&drive, &sink, &DEFAULT_STRATEGIES)
            .dispatch(&tasks, &mut ctx, 25.0, 75.0)
            .await;

        assert_eq!(attempted, 1);
        assert_eq!(ctx.stats().processed, 1);
        assert_eq!(ctx.stats().downloaded, 1);
        assert_eq!(drive.fetched(), vec!["a"]);
        assert_eq!(sink.destinations(), vec!["ALL/first_transcript.txt"]);
        assert_eq!(ctx.state(), RunState::Stopping);
    }

    #[tokio::test]
    async fn test_progress_advances_through_the_phase() {
        let drive = empty_drive().with_content("a", RetrievalStrategy::ExportText, "one");
        let sink = MemorySink::new();
        let mut ctx = started();
        ctx.set_progress(25.0);

        Dispatcher::new(&drive, &sink, &DEFAULT_STRATEGIES)
            .dispatch(&[], &mut ctx, 25.0, 60.0)
            .await;
        assert_eq!(ctx.progress(), 85);

        let tasks = vec![task("a", "transcript", TargetCategory::All, None)];
        Dispatcher::new(&drive, &sink, &DEFAULT_STRATEGIES)
            .dispatch(&tasks, &mut ctx, 85.0, 14.0)
            .await;
        assert_eq!(ctx.progress(), 99);
    }
}
