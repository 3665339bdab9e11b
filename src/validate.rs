//! Session validation
//!
//! Offline diagnostics about the artifact, then a lightweight authenticated
//! call to decide valid vs expired. Network errors other than authorization
//! failures are surfaced as errors, not as "invalid".

use std::path::Path;
use std::time::SystemTime;

use crate::client;
use crate::config::ApiCredentials;
use crate::formats::{self, SessionFormat};
use crate::session::SessionRecord;
use crate::{Error, Result};

/// Offline facts about a session artifact
#[derive(Debug)]
pub struct ArtifactInfo {
    pub format: SessionFormat,
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
}

/// Outcome of the online check
#[derive(Debug)]
pub enum SessionStatus {
    /// The session authorizes; account details attached
    Valid(AccountInfo),
    /// The server no longer accepts the key
    Invalid,
}

/// Account details fetched from a valid session
#[derive(Debug)]
pub struct AccountInfo {
    pub id: i64,
    pub full_name: String,
    pub username: Option<String>,
    pub phone: Option<String>,
}

/// Classify an artifact and report file facts without touching the network
pub fn inspect(input: &str) -> Result<ArtifactInfo> {
    let format = formats::detect_format(input)?;

    let (size, modified) = match Path::new(input).metadata() {
        Ok(meta) => (Some(meta.len()), meta.modified().ok()),
        Err(_) => (None, None),
    };

    Ok(ArtifactInfo {
        format,
        size,
        modified,
    })
}

/// Check a session against the live network
pub async fn check(record: &SessionRecord, creds: &ApiCredentials) -> Result<SessionStatus> {
    let client = client::connect(record, creds).await?;

    if !client.is_authorized().await.map_err(Error::telegram)? {
        tracing::info!(dc_id = record.dc_id, "session key is not authorized");
        return Ok(SessionStatus::Invalid);
    }

    let me = client.get_me().await.map_err(Error::telegram)?;
    Ok(SessionStatus::Valid(AccountInfo {
        id: me.id(),
        full_name: me.full_name(),
        username: me.username().map(str::to_string),
        phone: me.phone().map(str::to_string),
    }))
}
