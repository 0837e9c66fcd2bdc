//! Folder discovery and depth-first crawl of content folders

use tracing::{debug, info};

use crate::cancel::CancelFlag;
use crate::drive::{list_children, DriveEntry, DriveError, ListingBackend};
use crate::models::{ContainerRecord, FileRecord};
use crate::runner::{RunContext, RunError, DISCOVERY_WEIGHT};

/// Whether the crawler may descend into a folder with this name
pub fn is_content_folder(name: &str, vocabulary: &[String]) -> bool {
    let name = name.to_lowercase();
    vocabulary
        .iter()
        .any(|word| name.contains(word.to_lowercase().as_str()))
}

struct Frame {
    path: Vec<String>,
    entries: std::vec::IntoIter<DriveEntry>,
}

pub struct Crawler<'a> {
    backend: &'a dyn ListingBackend,
    content_folders: &'a [String],
}

impl<'a> Crawler<'a> {
    pub fn new(backend: &'a dyn ListingBackend, content_folders: &'a [String]) -> Self {
        Self {
            backend,
            content_folders,
        }
    }

    /// Group folders directly under the root; files at the root are ignored
    pub async fn discover_groups(
        &self,
        root_id: &str,
        cancel: &CancelFlag,
    ) -> Result<Vec<ContainerRecord>, DriveError> {
        let entries = list_children(self.backend, root_id, cancel).await?;
        let total = entries.len();
        let groups: Vec<ContainerRecord> = entries
            .iter()
            .filter(|entry| entry.is_container())
            .map(DriveEntry::to_container)
            .collect();

        if groups.len() < total {
            debug!(
                "Ignoring {} non-folder entries at the root",
                total - groups.len()
            );
        }
        Ok(groups)
    }

    /// Crawl every group under `root_id`, reporting discovery progress on `ctx`
    pub async fn crawl(
        &self,
        root_id: &str,
        ctx: &mut RunContext,
    ) -> Result<Vec<FileRecord>, RunError> {
        ctx.status("Discovering group folders");
        let groups = self
            .discover_groups(root_id, &ctx.cancel_flag())
            .await
            .map_err(RunError::Listing)?;

        if groups.is_empty() {
            // Stopped before any folder came back
            if ctx.checkpoint() {
                return Ok(Vec::new());
            }
            return Err(RunError::NoGroups(root_id.to_string()));
        }

        ctx.log(format!("Found {} group folders", groups.len()));
        for (i, group) in groups.iter().enumerate() {
            ctx.log(format!("   {}. {}", i + 1, group.name));
        }

        let mut files = Vec::new();
        for (i, group) in groups.iter().enumerate() {
            if ctx.checkpoint() {
                break;
            }

            ctx.status(format!(
                "Exploring group {}/{}: {}",
                i + 1,
                groups.len(),
                group.name
            ));

            let found = self
                .crawl_group(group, &ctx.cancel_flag())
                .await
                .map_err(RunError::Listing)?;
            ctx.log(format!("   {}: {} files found", group.name, found.len()));
            files.extend(found);

            let fraction = (i + 1) as f64 / groups.len() as f64;
            ctx.set_progress(fraction * DISCOVERY_WEIGHT);
        }

        info!("Crawl collected {} files", files.len());
        ctx.log(format!("Total files mapped: {}", files.len()));
        Ok(files)
    }

    /// Depth-first walk of one group folder.
    ///
    /// Files directly in the group are always collected; sub-folders are only
    /// entered when their name matches the content-folder vocabulary. Siblings
    /// keep listing order and each sub-folder is exhausted before the next
    /// sibling. On cancellation the files collected so far are returned.
    pub async fn crawl_group(
        &self,
        group: &ContainerRecord,
        cancel: &CancelFlag,
    ) -> Result<Vec<FileRecord>, DriveError> {
        let mut files = Vec::new();
        let children = list_children(self.backend, &group.id, cancel).await?;
        let mut stack = vec![Frame {
            path: vec![group.name.clone()],
            entries: children.into_iter(),
        }];

        while let Some(frame) = stack.last_mut() {
            let Some(entry) = frame.entries.next() else {
                stack.pop();
                continue;
            };

            if cancel.is_cancelled() {
                debug!("Crawl of {} cancelled", group.name);
                break;
            }

            if !entry.is_container() {
                files.push(entry.into_file_record(frame.path.clone()));
                continue;
            }

            if !is_content_folder(&entry.name, self.content_folders) {
                debug!("Skipping folder {:?} under {}", entry.name, frame.path.join("/"));
                continue;
            }

            let mut path = frame.path.clone();
            path.push(entry.name.clone());
            let children = list_children(self.backend, &entry.id, cancel).await?;
            stack.push(Frame {
                path,
                entries: children.into_iter(),
            });
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContentRules;
    use crate::models::RunState;
    use crate::testing::{FakeDrive, FakeFolder};

    const T: &str = "2024-02-01T10:00:00Z";

    fn vocabulary() -> Vec<String> {
        ContentRules::default().content_folders
    }

    fn group(id: &str, name: &str) -> ContainerRecord {
        ContainerRecord {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_content_folder_matching() {
        let vocab = vocabulary();
        assert!(is_content_folder("Meet Recordings", &vocab));
        assert!(is_content_folder("TRANSCRIPTS 2024", &vocab));
        assert!(is_content_folder("Notas de reunión", &vocab));
        assert!(is_content_folder("Gravações", &vocab));
        assert!(!is_content_folder("Invoices", &vocab));
        assert!(!is_content_folder("Maria Silva", &vocab));
    }

    #[tokio::test]
    async fn test_crawl_group_is_strict_dfs_with_paths() {
        let drive = FakeDrive::new(
            FakeFolder::new("root", "root").folder(
                FakeFolder::new("g1", "Team A")
                    .file("a", "top notes", T)
                    .folder(
                        FakeFolder::new("r1", "Recordings")
                            .file("b", "first", T)
                            .folder(FakeFolder::new("t1", "Transcripts").file("c", "deep", T))
                            .file("d", "after deep", T),
                    )
                    .file("e", "last", T),
            ),
        );
        let vocab = vocabulary();
        let crawler = Crawler::new(&drive, &vocab);

        let files = crawler
            .crawl_group(&group("g1", "Team A"), &CancelFlag::new())
            .await
            .unwrap();

        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(files[0].path, vec!["Team A"]);
        assert_eq!(files[2].path, vec!["Team A", "Recordings", "Transcripts"]);
        assert_eq!(files[3].path, vec!["Team A", "Recordings"]);
    }

    #[tokio::test]
    async fn test_non_content_folders_are_pruned_unlisted() {
        let drive = FakeDrive::new(
            FakeFolder::new("root", "root").folder(
                FakeFolder::new("g1", "Team A").folder(
                    FakeFolder::new("x1", "Invoices").folder(
                        FakeFolder::new("x2", "Transcripts").file("hidden", "transcript 1", T),
                    ),
                ),
            ),
        );
        let vocab = vocabulary();
        let crawler = Crawler::new(&drive, &vocab);

        let files = crawler
            .crawl_group(&group("g1", "Team A"), &CancelFlag::new())
            .await
            .unwrap();

        assert!(files.is_empty());
        assert_eq!(drive.listed(), vec!["g1"]);
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_results() {
        let cancel = CancelFlag::new();
        let drive = FakeDrive::new(
            FakeFolder::new("root", "root").folder(
                FakeFolder::new("g1", "Team A")
                    .file("a", "one", T)
                    .folder(FakeFolder::new("r1", "Recordings").file("b", "two", T))
                    .folder(FakeFolder::new("r2", "Notes").file("c", "three", T)),
            ),
        )
        .cancel_when_listing("r1", cancel.clone());
        let vocab = vocabulary();
        let crawler = Crawler::new(&drive, &vocab);

        let files = crawler
            .crawl_group(&group("g1", "Team A"), &cancel)
            .await
            .unwrap();

        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert!(!drive.listed().contains(&"r2".to_string()));
    }

    #[tokio::test]
    async fn test_crawl_fails_without_groups() {
        let drive = FakeDrive::new(FakeFolder::new("root", "root").file("loose", "notes", T));
        let vocab = vocabulary();
        let crawler = Crawler::new(&drive, &vocab);
        let mut ctx = RunContext::new();
        ctx.begin();

        let result = crawler.crawl("root", &mut ctx).await;
        assert!(matches!(result, Err(RunError::NoGroups(_))));
        assert_eq!(ctx.state(), RunState::Running);
    }

    #[tokio::test]
    async fn test_stop_during_root_listing_is_not_an_empty_root() {
        let cancel = CancelFlag::new();
        let drive = FakeDrive::new(
            FakeFolder::new("root", "root")
                .file("loose", "notes", T)
                .folder(FakeFolder::new("g1", "Team A").file("a", "one", T)),
        )
        .with_page_size(1)
        .cancel_when_listing("root", cancel.clone());
        let vocab = vocabulary();
        let crawler = Crawler::new(&drive, &vocab);
        let mut ctx = RunContext::with_cancel(cancel);
        ctx.begin();

        let files = crawler.crawl("root", &mut ctx).await.unwrap();
        assert!(files.is_empty());
        assert_eq!(ctx.state(), RunState::Stopping);
        assert_eq!(drive.listed(), vec!["root"]);
    }

    #[tokio::test]
    async fn test_crawl_visits_groups_in_order_and_reports_progress() {
        let drive = FakeDrive::new(
            FakeFolder::new("root", "root")
                .folder(FakeFolder::new("g1", "Team A").file("a", "one", T))
                .folder(FakeFolder::new("g2", "Team B").file("b", "two", T)),
        );
        let vocab = vocabulary();
        let crawler = Crawler::new(&drive, &vocab);
        let mut ctx = RunContext::new();
        ctx.begin();

        let files = crawler.crawl("root", &mut ctx).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].group(), Some("Team B"));
        assert_eq!(ctx.progress(), DISCOVERY_WEIGHT as u8);
    }
}
