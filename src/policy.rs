//! Identifier-based routing of files into download tasks

use crate::models::{DownloadTask, FileRecord, IdFilter, IdFilterMode, TargetCategory};

/// Decide the task (if any) for one file
pub fn classify_file(file: FileRecord, id_filter: &IdFilter) -> Option<DownloadTask> {
    if !id_filter.enabled {
        return Some(DownloadTask {
            file,
            category: TargetCategory::All,
            included: None,
        });
    }

    let has_match = id_filter.target_ids.matches_text(&file.name);
    let keep = match id_filter.mode {
        IdFilterMode::OnlyIncluded => has_match,
        IdFilterMode::OnlyExcluded => !has_match,
        IdFilterMode::Both => true,
    };
    if !keep {
        return None;
    }

    let category = if has_match {
        TargetCategory::Included
    } else {
        TargetCategory::Excluded
    };
    Some(DownloadTask {
        file,
        category,
        included: Some(has_match),
    })
}

/// Turn filtered files into download tasks; files rejected by the mode are dropped
pub fn classify(files: Vec<FileRecord>, id_filter: &IdFilter) -> Vec<DownloadTask> {
    files
        .into_iter()
        .filter_map(|file| classify_file(file, id_filter))
        .collect()
}
