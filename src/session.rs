//! Bearer credential handling and reuse of recently validated credentials

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::drive::{DriveClient, DriveError, DriveUser};
use crate::storage::StoredConfig;

/// A stored credential younger than this is reused without re-validation
pub const CREDENTIAL_FRESHNESS_MINUTES: i64 = 45;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Access token is empty")]
    EmptyCredential,

    #[error("No access token available. Pass --token or run 'drivesweep login' first")]
    MissingCredential,

    #[error("Access token rejected: {0}")]
    Rejected(#[from] DriveError),
}

/// Opaque `Authorization` header value
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Accepts a raw token or a full `Bearer ...` value
    pub fn new(raw: &str) -> Result<Self, SessionError> {
        let trimmed = raw.trim();
        let token = trimmed.strip_prefix(BEARER_PREFIX).unwrap_or(trimmed).trim();
        if token.is_empty() {
            return Err(SessionError::EmptyCredential);
        }
        Ok(Self(format!("{}{}", BEARER_PREFIX, token)))
    }

    pub fn header_value(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(Bearer ****)")
    }
}

/// Whether a credential saved at `saved_at` may be reused at `now`
pub fn is_fresh(saved_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let age = now - saved_at;
    age >= Duration::zero() && age < Duration::minutes(CREDENTIAL_FRESHNESS_MINUTES)
}

#[async_trait]
pub trait CredentialValidator: Send + Sync {
    async fn validate(&self, credential: &Credential) -> Result<DriveUser, DriveError>;
}

/// Validates credentials against the Drive `about` endpoint
pub struct DriveValidator {
    config: Config,
}

impl DriveValidator {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl CredentialValidator for DriveValidator {
    async fn validate(&self, credential: &Credential) -> Result<DriveUser, DriveError> {
        DriveClient::new(&self.config, credential.clone())?.about().await
    }
}

/// How the credential for this invocation was obtained
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Stored credential still inside the freshness window
    Reused,
    /// Checked against the API just now
    Validated(DriveUser),
}

/// Pick the credential for this invocation.
///
/// An explicit token always gets validated. Otherwise the stored one is reused
/// while fresh and re-validated once stale. Every successful validation
/// updates `stored` so the caller can persist it.
pub async fn resolve_credential(
    explicit: Option<&str>,
    stored: &mut StoredConfig,
    now: DateTime<Utc>,
    validator: &dyn CredentialValidator,
) -> Result<(Credential, CredentialSource), SessionError> {
    let credential = match explicit {
        Some(raw) => Credential::new(raw)?,
        None => {
            let raw = stored
                .credential
                .as_deref()
                .ok_or(SessionError::MissingCredential)?;
            let credential = Credential::new(raw)?;
            if let Some(saved_at) = stored.credential_saved_at {
                if is_fresh(saved_at, now) {
                    debug!("Reusing stored credential saved at {}", saved_at);
                    return Ok((credential, CredentialSource::Reused));
                }
            }
            credential
        }
    };

    let user = validator.validate(&credential).await?;
    info!(
        "Credential valid for {} <{}>",
        user.display_name.as_deref().unwrap_or("unknown user"),
        user.email_address.as_deref().unwrap_or("no email")
    );

    stored.credential = Some(credential.header_value().to_string());
    stored.credential_saved_at = Some(now);
    Ok((credential, CredentialSource::Validated(user)))
}
