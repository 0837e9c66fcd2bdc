//! File content retrieval with ordered fallback strategies

use async_trait::async_trait;
use tracing::debug;

use super::DriveError;

/// Ways to get a file's text, tried in order until one succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalStrategy {
    /// Export a native document as `text/plain`
    ExportText,
    /// Download the stored bytes (`alt=media`)
    RawMedia,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            RetrievalStrategy::ExportText => "export",
            RetrievalStrategy::RawMedia => "media",
        }
    }
}

pub const DEFAULT_STRATEGIES: [RetrievalStrategy; 2] =
    [RetrievalStrategy::ExportText, RetrievalStrategy::RawMedia];

#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// `Ok(None)` means the backend answered but this strategy has no content
    async fn fetch_text(
        &self,
        file_id: &str,
        strategy: RetrievalStrategy,
    ) -> Result<Option<String>, DriveError>;
}

/// Every strategy came back empty or failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalFailure {
    pub attempts: Vec<String>,
}

impl std::fmt::Display for RetrievalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.attempts.is_empty() {
            write!(f, "no retrieval strategy configured")
        } else {
            write!(f, "no content ({})", self.attempts.join("; "))
        }
    }
}

/// Try each strategy in turn; the first one that yields text wins
pub async fn retrieve_content(
    backend: &dyn ContentBackend,
    file_id: &str,
    strategies: &[RetrievalStrategy],
) -> Result<(String, RetrievalStrategy), RetrievalFailure> {
    let mut attempts = Vec::new();

    for strategy in strategies {
        match backend.fetch_text(file_id, *strategy).await {
            Ok(Some(text)) => {
                debug!("Fetched {} via {}", file_id, strategy.as_str());
                return Ok((text, *strategy));
            }
            Ok(None) => attempts.push(format!("{}: not available", strategy.as_str())),
            Err(e) => attempts.push(format!("{}: {}", strategy.as_str(), e)),
        }
    }

    Err(RetrievalFailure { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDrive, FakeFolder};

    #[tokio::test]
    async fn test_falls_back_to_raw_media() {
        let drive = FakeDrive::new(FakeFolder::new("root", "root"))
            .with_content("doc-1", RetrievalStrategy::RawMedia, "raw text");

        let (text, used) = retrieve_content(&drive, "doc-1", &DEFAULT_STRATEGIES)
            .await
            .unwrap();
        assert_eq!(text, "raw text");
        assert_eq!(used, RetrievalStrategy::RawMedia);
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let drive = FakeDrive::new(FakeFolder::new("root", "root"))
            .with_content("doc-1", RetrievalStrategy::ExportText, "exported")
            .with_content("doc-1", RetrievalStrategy::RawMedia, "raw");

        let (text, used) = retrieve_content(&drive, "doc-1", &DEFAULT_STRATEGIES)
            .await
            .unwrap();
        assert_eq!(text, "exported");
        assert_eq!(used, RetrievalStrategy::ExportText);
    }

    #[tokio::test]
    async fn test_reports_every_failed_attempt() {
        let drive = FakeDrive::new(FakeFolder::new("root", "root"));
        let failure = retrieve_content(&drive, "missing", &DEFAULT_STRATEGIES)
            .await
            .unwrap_err();
        assert_eq!(failure.attempts.len(), 2);
        assert!(failure.to_string().starts_with("no content"));
    }
}
