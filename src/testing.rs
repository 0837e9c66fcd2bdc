//! In-memory collaborators for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cancel::CancelFlag;
use crate::downloader::sink::{ConflictPolicy, DownloadSink, SinkError};
use crate::drive::{
    ContentBackend, DriveApi, DriveEntry, DriveError, DriveFileList, ListingBackend,
    RetrievalStrategy,
};
use crate::report::{ReportError, ReportRow, ReportSink, ReportTarget};

const DEFAULT_MODIFIED: &str = "2024-01-01T00:00:00Z";

/// Folder tree builder
pub struct FakeFolder {
    id: String,
    name: String,
    children: Vec<FakeNode>,
}

enum FakeNode {
    Folder(FakeFolder),
    File(DriveEntry),
}

impl FakeFolder {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            children: Vec::new(),
        }
    }

    pub fn folder(mut self, child: FakeFolder) -> Self {
        self.children.push(FakeNode::Folder(child));
        self
    }

    pub fn file(mut self, id: &str, name: &str, modified: &str) -> Self {
        self.children.push(FakeNode::File(DriveEntry {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: "application/vnd.google-apps.document".to_string(),
            modified_time: modified.parse().unwrap(),
            web_view_link: Some(format!("https://drive.test/{id}")),
        }));
        self
    }

    fn entry(&self) -> DriveEntry {
        DriveEntry {
            id: self.id.clone(),
            name: self.name.clone(),
            mime_type: DriveApi::FOLDER_MIME_TYPE.to_string(),
            modified_time: DEFAULT_MODIFIED.parse().unwrap(),
            web_view_link: None,
        }
    }

    fn flatten(self, listings: &mut HashMap<String, Vec<DriveEntry>>) {
        let mut entries = Vec::new();
        for child in self.children {
            match child {
                FakeNode::File(entry) => entries.push(entry),
                FakeNode::Folder(folder) => {
                    entries.push(folder.entry());
                    folder.flatten(listings);
                }
            }
        }
        listings.insert(self.id, entries);
    }
}

pub struct FakeDrive {
    listings: HashMap<String, Vec<DriveEntry>>,
    page_size: usize,
    failing_pages: HashSet<(String, usize)>,
    contents: HashMap<(String, RetrievalStrategy), String>,
    cancel_on_list: Option<(String, CancelFlag)>,
    list_calls: AtomicUsize,
    listed: Mutex<Vec<String>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeDrive {
    pub fn new(root: FakeFolder) -> Self {
        let mut listings = HashMap::new();
        root.flatten(&mut listings);
        Self {
            listings,
            page_size: 100,
            failing_pages: HashSet::new(),
            contents: HashMap::new(),
            cancel_on_list: None,
            list_calls: AtomicUsize::new(0),
            listed: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_content(mut self, file_id: &str, strategy: RetrievalStrategy, text: &str) -> Self {
        self.contents
            .insert((file_id.to_string(), strategy), text.to_string());
        self
    }

    pub fn fail_listing_page(mut self, container_id: &str, page: usize) -> Self {
        self.failing_pages.insert((container_id.to_string(), page));
        self
    }

    /// Raise `flag` as soon as `container_id` is listed
    pub fn cancel_when_listing(mut self, container_id: &str, flag: CancelFlag) -> Self {
        self.cancel_on_list = Some((container_id.to_string(), flag));
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Containers listed so far, in call order (one entry per page)
    pub fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }

    /// File ids whose content was requested, once per file
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingBackend for FakeDrive {
    async fn query(
        &self,
        container_id: &str,
        page_token: Option<&str>,
    ) -> Result<DriveFileList, DriveError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.listed.lock().unwrap().push(container_id.to_string());

        if let Some((trigger, flag)) = &self.cancel_on_list {
            if trigger == container_id {
                flag.cancel();
            }
        }

        let page: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        if self
            .failing_pages
            .contains(&(container_id.to_string(), page))
        {
            return Err(DriveError::ApiError {
                operation: format!("listing folder {container_id}"),
                status_code: 500,
                message: "backend unavailable".to_string(),
            });
        }

        let all = self.listings.get(container_id).cloned().unwrap_or_default();
        let start = page * self.page_size;
        let end = (start + self.page_size).min(all.len());
        let files = all.get(start..end).map(<[DriveEntry]>::to_vec).unwrap_or_default();
        let next_page_token = (end < all.len()).then(|| (page + 1).to_string());

        Ok(DriveFileList {
            next_page_token,
            files,
        })
    }
}

#[async_trait]
impl ContentBackend for FakeDrive {
    async fn fetch_text(
        &self,
        file_id: &str,
        strategy: RetrievalStrategy,
    ) -> Result<Option<String>, DriveError> {
        let mut fetched = self.fetched.lock().unwrap();
        if !fetched.iter().any(|id| id == file_id) {
            fetched.push(file_id.to_string());
        }
        drop(fetched);

        Ok(self
            .contents
            .get(&(file_id.to_string(), strategy))
            .cloned())
    }
}

/// Sink that keeps artifacts in memory, uniquifying like a browser download
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, Vec<u8>)>>,
    failing: HashSet<String>,
    cancel_after_save: Option<CancelFlag>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, destination: &str) -> Self {
        self.failing.insert(destination.to_string());
        self
    }

    /// Raise `flag` once a save succeeds
    pub fn cancel_after_save(mut self, flag: CancelFlag) -> Self {
        self.cancel_after_save = Some(flag);
        self
    }

    pub fn destinations(&self) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn contents_of(&self, destination: &str) -> Option<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .find(|(path, _)| path == destination)
            .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[async_trait]
impl DownloadSink for MemorySink {
    async fn save(
        &self,
        bytes: &[u8],
        destination: &str,
        _policy: ConflictPolicy,
    ) -> Result<PathBuf, SinkError> {
        if self.failing.contains(destination) {
            return Err(SinkError::InvalidDestination(destination.to_string()));
        }

        let mut saved = self.saved.lock().unwrap();
        let taken = |candidate: &str| saved.iter().any(|(path, _)| path == candidate);
        let mut target = destination.to_string();
        let mut n = 1;
        while taken(&target) {
            target = crate::downloader::sink::numbered_name(destination, n);
            n += 1;
        }
        saved.push((target.clone(), bytes.to_vec()));

        if let Some(flag) = &self.cancel_after_save {
            flag.cancel();
        }
        Ok(PathBuf::from(target))
    }
}

#[derive(Default)]
pub struct MemoryReportSink {
    pub unreachable: bool,
    submitted: Mutex<Vec<ReportRow>>,
}

impl MemoryReportSink {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<ReportRow> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    async fn check_reachable(&self, target: &ReportTarget) -> Result<(), ReportError> {
        if self.unreachable {
            return Err(ReportError::Unreachable {
                resource_id: target.resource_id.clone(),
                message: "not found".to_string(),
            });
        }
        Ok(())
    }

    async fn submit(&self, _target: &ReportTarget, rows: &[ReportRow]) -> Result<usize, ReportError> {
        self.submitted.lock().unwrap().extend_from_slice(rows);
        Ok(rows.len())
    }
}
