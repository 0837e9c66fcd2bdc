//! reqwest-backed Drive API client

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use super::{
    AboutResponse, ContentBackend, DriveApi, DriveError, DriveFileList, DriveUser,
    GoogleErrorResponse, ListingBackend, RetrievalStrategy,
};
use crate::config::Config;
use crate::session::Credential;

pub struct DriveClient {
    client: Client,
    base_url: String,
    credential: Credential,
}

impl DriveClient {
    /// Build a client using the configured user agent, timeout and base URL
    pub fn new(config: &Config, credential: Credential) -> Result<Self, DriveError> {
        let client = Client::builder()
            .user_agent(&config.http.user_agent)
            .timeout(config.http_timeout())
            .build()?;

        Ok(Self::with_client(client, &config.api.drive_base_url, credential))
    }

    pub fn with_client(client: Client, base_url: &str, credential: Credential) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
        }
    }

    /// Look up the account behind the credential; fails if it is rejected
    pub async fn about(&self) -> Result<DriveUser, DriveError> {
        let url = format!("{}{}", self.base_url, DriveApi::ABOUT_ENDPOINT);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "user")])
            .header("Authorization", self.credential.header_value())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error("validating credential", response).await);
        }

        let body = response.text().await?;
        let about: AboutResponse =
            serde_json::from_str(&body).map_err(|source| DriveError::ResponseError {
                operation: "validating credential".to_string(),
                source,
            })?;
        Ok(about.user)
    }

    fn file_url(&self, file_id: &str, suffix: &str) -> String {
        format!("{}{}/{}{}", self.base_url, DriveApi::FILES_ENDPOINT, file_id, suffix)
    }
}

#[async_trait]
impl ListingBackend for DriveClient {
    async fn query(
        &self,
        container_id: &str,
        page_token: Option<&str>,
    ) -> Result<DriveFileList, DriveError> {
        let url = format!("{}{}", self.base_url, DriveApi::FILES_ENDPOINT);
        let q = children_query(container_id);
        let page_size = DriveApi::PAGE_SIZE.to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("q", q.as_str()),
            ("fields", DriveApi::LIST_FIELDS),
            ("pageSize", page_size.as_str()),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        debug!("Listing children of {} (page token: {:?})", container_id, page_token);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .header("Authorization", self.credential.header_value())
            .send()
            .await?;

        let operation = format!("listing folder {}", container_id);
        if !response.status().is_success() {
            return Err(api_error(&operation, response).await);
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|source| DriveError::ResponseError { operation, source })
    }
}

#[async_trait]
impl ContentBackend for DriveClient {
    async fn fetch_text(
        &self,
        file_id: &str,
        strategy: RetrievalStrategy,
    ) -> Result<Option<String>, DriveError> {
        let request = match strategy {
            RetrievalStrategy::ExportText => self
                .client
                .get(self.file_url(file_id, "/export"))
                .query(&[("mimeType", "text/plain")]),
            RetrievalStrategy::RawMedia => self
                .client
                .get(self.file_url(file_id, ""))
                .query(&[("alt", "media"), ("supportsAllDrives", "true")]),
        };

        let response = request
            .header("Authorization", self.credential.header_value())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(Some(response.text().await?));
        }

        // Export refuses non-native files and media refuses native docs;
        // those answers just mean "try the next strategy".
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            debug!("{} of {} not available: {}", strategy.as_str(), file_id, status);
            return Ok(None);
        }

        let operation = format!("fetching {} via {}", file_id, strategy.as_str());
        Err(api_error(&operation, response).await)
    }
}

/// Query selecting the non-trashed children of a folder
fn children_query(container_id: &str) -> String {
    format!(
        "'{}' in parents and trashed=false",
        container_id.replace('\\', "\\\\").replace('\'', "\\'")
    )
}

/// Turn a non-success response into an error, keeping Google's message when present
async fn api_error(operation: &str, response: Response) -> DriveError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    let message = match serde_json::from_str::<GoogleErrorResponse>(&text) {
        Ok(parsed) => parsed.error.message,
        Err(_) if text.is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => text,
    };

    DriveError::ApiError {
        operation: operation.to_string(),
        status_code: status.as_u16(),
        message,
    }
}
