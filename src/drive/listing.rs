//! Paginated folder listing

use async_trait::async_trait;
use tracing::debug;

use super::{DriveEntry, DriveError, DriveFileList};
use crate::cancel::CancelFlag;

/// One page of children under a container
#[async_trait]
pub trait ListingBackend: Send + Sync {
    async fn query(
        &self,
        container_id: &str,
        page_token: Option<&str>,
    ) -> Result<DriveFileList, DriveError>;
}

/// List every child of `container_id`, following continuation tokens until the
/// backend reports none remain.
///
/// When `cancel` is set the next page is not requested and the entries already
/// fetched are returned. An error on any page fails the whole call.
pub async fn list_children(
    backend: &dyn ListingBackend,
    container_id: &str,
    cancel: &CancelFlag,
) -> Result<Vec<DriveEntry>, DriveError> {
    let mut entries = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = backend.query(container_id, page_token.as_deref()).await?;
        pages += 1;
        entries.extend(page.files);

        match page.next_page_token {
            Some(token) if !token.is_empty() => {
                if cancel.is_cancelled() {
                    debug!(
                        "Listing of {} stopped after {} page(s): cancelled",
                        container_id, pages
                    );
                    break;
                }
                page_token = Some(token);
            }
            _ => break,
        }
    }

    debug!(
        "Listed {} entries under {} in {} page(s)",
        entries.len(),
        container_id,
        pages
    );
    Ok(entries)
}
