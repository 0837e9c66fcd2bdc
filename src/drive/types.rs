//! Shared Drive API types and constants

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{ContainerRecord, FileRecord};

/// One page of a `files.list` query
#[derive(Debug, Deserialize, Default)]
pub struct DriveFileList {
    /// Continuation token; absent on the last page
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub files: Vec<DriveEntry>,
}

/// Entry metadata as returned by `files.list`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DriveEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "modifiedTime")]
    pub modified_time: DateTime<Utc>,
    #[serde(rename = "webViewLink", default)]
    pub web_view_link: Option<String>,
}

impl DriveEntry {
    pub fn is_container(&self) -> bool {
        self.mime_type == DriveApi::FOLDER_MIME_TYPE
    }

    pub fn to_container(&self) -> ContainerRecord {
        ContainerRecord {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    pub fn into_file_record(self, path: Vec<String>) -> FileRecord {
        FileRecord {
            id: self.id,
            name: self.name,
            mime_type: self.mime_type,
            modified_at: self.modified_time,
            path,
            source_link: self.web_view_link.unwrap_or_default(),
        }
    }
}

/// Standard Google API error envelope
#[derive(Debug, Deserialize)]
pub struct GoogleErrorResponse {
    pub error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct GoogleErrorBody {
    pub code: u16,
    pub message: String,
}

/// `about.get` response restricted to `fields=user`
#[derive(Debug, Deserialize)]
pub struct AboutResponse {
    pub user: DriveUser,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveUser {
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "emailAddress", default)]
    pub email_address: Option<String>,
}

/// Drive API endpoints and constants
pub struct DriveApi;

impl DriveApi {
    /// Base URL for the Drive API
    pub const BASE_URL: &'static str = "https://www.googleapis.com";
    /// File listing and metadata endpoint
    pub const FILES_ENDPOINT: &'static str = "/drive/v3/files";
    /// Account information endpoint
    pub const ABOUT_ENDPOINT: &'static str = "/drive/v3/about";
    /// Fields requested from `files.list`
    pub const LIST_FIELDS: &'static str =
        "nextPageToken,files(id,name,mimeType,modifiedTime,webViewLink)";
    /// Largest page size the API accepts
    pub const PAGE_SIZE: u32 = 1000;
    /// MIME type that marks a folder
    pub const FOLDER_MIME_TYPE: &'static str = "application/vnd.google-apps.folder";
}

/// Sheets API constants used by the report sink
pub struct SheetsApi;

impl SheetsApi {
    pub const BASE_URL: &'static str = "https://sheets.googleapis.com";
    pub const SPREADSHEETS_ENDPOINT: &'static str = "/v4/spreadsheets";
}
