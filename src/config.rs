//! Centralized configuration management for drivesweep

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::drive::{DriveApi, SheetsApi};

/// Name keywords a file must contain (any of them) to be downloaded
pub const DEFAULT_KEYWORDS: &[&str] = &["gemini", "transcript", "transcrip", "anotações", "notas"];

/// Folder names the crawler descends into (case-insensitive substring match)
pub const DEFAULT_CONTENT_FOLDERS: &[&str] = &[
    "recording",
    "transcript",
    "notes",
    "grabacion",
    "grabación",
    "transcrip",
    "notas",
    "gravaç",
    "transcriç",
    "anotaç",
];

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database holding stored settings and run history
    pub database_path: PathBuf,
    /// Directory downloads are written under
    pub download_dir: PathBuf,
    /// Drive folder that holds the group folders
    pub root_folder_id: Option<String>,
    /// Rate limiting configuration
    pub rate_limits: RateLimits,
    /// HTTP client configuration
    pub http: HttpConfig,
    /// API endpoints
    pub api: ApiConfig,
    /// Content selection rules
    pub rules: ContentRules,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimits {
    /// Delay between downloads (milliseconds)
    pub download_delay_ms: u64,
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub drive_base_url: String,
    pub sheets_base_url: String,
}

/// Which folders are crawled and which file names are kept
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRules {
    pub keywords: Vec<String>,
    pub content_folders: Vec<String>,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            download_delay_ms: 200,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: "drivesweep/0.1.0".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            drive_base_url: DriveApi::BASE_URL.to_string(),
            sheets_base_url: SheetsApi::BASE_URL.to_string(),
        }
    }
}

impl Default for ContentRules {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            content_folders: DEFAULT_CONTENT_FOLDERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self> {
        let database_path = std::env::var("DRIVESWEEP_DB_PATH")
            .unwrap_or_else(|_| "./drivesweep.db".to_string())
            .into();

        let download_dir = std::env::var("DRIVESWEEP_DOWNLOAD_DIR")
            .unwrap_or_else(|_| "./downloads".to_string())
            .into();

        let root_folder_id = std::env::var("DRIVESWEEP_ROOT_FOLDER_ID")
            .ok()
            .filter(|id| !id.trim().is_empty());

        let rate_limits = RateLimits {
            download_delay_ms: parse_env_var("DRIVESWEEP_DOWNLOAD_DELAY_MS")?.unwrap_or(200),
        };

        let http = HttpConfig {
            timeout_seconds: parse_env_var("DRIVESWEEP_HTTP_TIMEOUT_SECONDS")?.unwrap_or(30),
            user_agent: std::env::var("DRIVESWEEP_USER_AGENT")
                .unwrap_or_else(|_| "drivesweep/0.1.0".to_string()),
        };

        let defaults = ApiConfig::default();
        let api = ApiConfig {
            drive_base_url: std::env::var("DRIVESWEEP_DRIVE_BASE_URL")
                .unwrap_or(defaults.drive_base_url),
            sheets_base_url: std::env::var("DRIVESWEEP_SHEETS_BASE_URL")
                .unwrap_or(defaults.sheets_base_url),
        };

        let defaults = ContentRules::default();
        let rules = ContentRules {
            keywords: parse_list_var("DRIVESWEEP_KEYWORDS").unwrap_or(defaults.keywords),
            content_folders: parse_list_var("DRIVESWEEP_CONTENT_FOLDERS")
                .unwrap_or(defaults.content_folders),
        };

        Ok(Config {
            database_path,
            download_dir,
            root_folder_id,
            rate_limits,
            http,
            api,
            rules,
        })
    }

    /// Get database path as string
    pub fn database_path_str(&self) -> &str {
        self.database_path.to_str().unwrap_or("./drivesweep.db")
    }

    /// Get delay between downloads as Duration
    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limits.download_delay_ms)
    }

    /// Get HTTP timeout as Duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(anyhow::anyhow!(
                    "Database parent directory does not exist: {}",
                    parent.display()
                ));
            }
        }

        std::fs::create_dir_all(&self.download_dir).with_context(|| {
            format!(
                "Cannot create download directory: {}",
                self.download_dir.display()
            )
        })?;

        if self.rules.keywords.is_empty() {
            return Err(anyhow::anyhow!("Keyword list is empty"));
        }

        Ok(())
    }
}

/// Helper function to parse environment variable as a specific type
fn parse_env_var<T>(var_name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display + Send + Sync + std::error::Error + 'static,
{
    match std::env::var(var_name) {
        Ok(val) => val.parse().map(Some).with_context(|| {
            format!("Failed to parse environment variable {} = '{}'", var_name, val)
        }),
        Err(_) => Ok(None),
    }
}

/// Comma-separated, lowercased list; `None` when unset or empty
fn parse_list_var(var_name: &str) -> Option<Vec<String>> {
    let raw = std::env::var(var_name).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.database_path_str(), "./drivesweep.db");
        assert_eq!(config.rate_limits.download_delay_ms, 200);
        assert_eq!(config.http.timeout_seconds, 30);
        assert_eq!(config.api.drive_base_url, "https://www.googleapis.com");
        assert!(config.rules.keywords.iter().any(|k| k == "gemini"));
    }

    #[test]
    fn test_parse_list_var() {
        std::env::set_var("DRIVESWEEP_TEST_LIST", " Minutes, ,ACTAS ");
        assert_eq!(
            parse_list_var("DRIVESWEEP_TEST_LIST"),
            Some(vec!["minutes".to_string(), "actas".to_string()])
        );
        std::env::set_var("DRIVESWEEP_TEST_LIST", " , ");
        assert_eq!(parse_list_var("DRIVESWEEP_TEST_LIST"), None);
        assert_eq!(parse_list_var("DRIVESWEEP_TEST_UNSET_LIST"), None);
    }

    #[test]
    fn test_config_validation() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::from_env().unwrap();
        config.database_path = temp_dir.path().join("drivesweep.db");
        config.download_dir = temp_dir.path().join("downloads");
        config.validate().unwrap();
        assert!(config.download_dir.exists());

        config.rules.keywords.clear();
        assert!(config.validate().is_err());
    }
}
