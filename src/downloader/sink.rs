//! Where downloaded artifacts end up

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const MAX_UNIQUIFY_ATTEMPTS: usize = 10_000;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid destination path: {0}")]
    InvalidDestination(String),

    #[error("No free name for {0}")]
    NameExhausted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to do when the destination already exists. Existing artifacts are
/// never replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep the existing file and pick `name (n).ext`
    Uniquify,
}

#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Store `bytes` at `destination` (forward-slash separated logical path)
    /// and return where they actually landed.
    async fn save(
        &self,
        bytes: &[u8],
        destination: &str,
        policy: ConflictPolicy,
    ) -> Result<PathBuf, SinkError>;
}

/// `INCLUDED/call.txt` -> `INCLUDED/call (2).txt`
pub fn numbered_name(destination: &str, n: usize) -> String {
    let (dir, file) = match destination.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, destination),
    };
    let numbered = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", file, n),
    };
    match dir {
        Some(dir) => format!("{}/{}", dir, numbered),
        None => numbered,
    }
}

/// Writes artifacts below a root directory on the local filesystem
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a logical destination onto the root, refusing anything that could escape it
    fn resolve(&self, destination: &str) -> Result<PathBuf, SinkError> {
        let mut path = self.root.clone();
        for segment in destination.split('/') {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) if !segment.contains('\\') => path.push(part),
                _ => return Err(SinkError::InvalidDestination(destination.to_string())),
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl DownloadSink for FsSink {
    async fn save(
        &self,
        bytes: &[u8],
        destination: &str,
        _policy: ConflictPolicy,
    ) -> Result<PathBuf, SinkError> {
        let target = self.resolve(destination)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        for n in 0..MAX_UNIQUIFY_ATTEMPTS {
            let candidate = if n == 0 {
                target.clone()
            } else {
                self.resolve(&numbered_name(destination, n))?
            };

            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await;

            match opened {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    if n > 0 {
                        debug!("{} existed, saved as {}", destination, candidate.display());
                    }
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(SinkError::NameExhausted(destination.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("INCLUDED/call.txt", 1), "INCLUDED/call (1).txt");
        assert_eq!(numbered_name("call", 3), "call (3)");
        assert_eq!(numbered_name("ALL/.hidden", 2), "ALL/.hidden (2)");
    }

    #[tokio::test]
    async fn test_save_creates_category_directory() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FsSink::new(temp_dir.path());

        let path = sink
            .save(b"hello", "INCLUDED/call.txt", ConflictPolicy::Uniquify)
            .await
            .unwrap();
        assert_eq!(path, temp_dir.path().join("INCLUDED").join("call.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_uniquify_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FsSink::new(temp_dir.path());

        for body in ["one", "two", "three"] {
            sink.save(body.as_bytes(), "ALL/call.txt", ConflictPolicy::Uniquify)
                .await
                .unwrap();
        }

        let dir = temp_dir.path().join("ALL");
        assert_eq!(std::fs::read_to_string(dir.join("call.txt")).unwrap(), "one");
        assert_eq!(std::fs::read_to_string(dir.join("call (1).txt")).unwrap(), "two");
        assert_eq!(std::fs::read_to_string(dir.join("call (2).txt")).unwrap(), "three");
    }

    #[tokio::test]
    async fn test_rejects_escaping_destinations() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FsSink::new(temp_dir.path());

        for bad in ["../x.txt", "ALL/../../x.txt", "/etc/x.txt", "ALL//x.txt", "ALL\\x.txt"] {
            let result = sink.save(b"x", bad, ConflictPolicy::Uniquify).await;
            assert!(
                matches!(result, Err(SinkError::InvalidDestination(_))),
                "accepted {bad}"
            );
        }
    }
}
