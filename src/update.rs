//! Background release check
//!
//! Asks a GitHub-style releases endpoint for the latest tag once, shortly
//! after startup. At most one event is sent, and nothing at all if the
//! check fails or takes longer than [`UPDATE_CHECK_DEADLINE`].

use crate::version::{VersionError, is_newer};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const UPDATE_CHECK_DEADLINE: Duration = Duration::from_secs(30);

/// Sent to the UI when a newer release exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub current: String,
    pub latest: String,
    pub url: Option<String>,
}

/// Why a release check produced no answer
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("release request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unusable release tag: {0}")]
    Version(#[from] VersionError),
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    html_url: Option<String>,
}

/// Spawn the one-shot check. The task ends after sending, or silently on
/// any failure.
pub fn spawn_update_check(
    current: impl Into<String>,
    releases_url: impl Into<String>,
    events: mpsc::Sender<UpdateEvent>,
) -> JoinHandle<()> {
    let current = current.into();
    let releases_url = releases_url.into();
    tokio::spawn(async move {
        match tokio::time::timeout(UPDATE_CHECK_DEADLINE, check(&current, &releases_url)).await {
            Ok(Ok(Some(event))) => {
                tracing::info!(latest = %event.latest, "Update available");
                let _ = events.send(event).await;
            }
            Ok(Ok(None)) => tracing::debug!(current = %current, "Up to date"),
            Ok(Err(e)) => tracing::debug!(error = %e, "Update check failed"),
            Err(_) => tracing::debug!("Update check timed out"),
        }
    })
}

async fn check(current: &str, releases_url: &str) -> Result<Option<UpdateEvent>, UpdateError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("dbpilot/", env!("CARGO_PKG_VERSION")))
        .timeout(UPDATE_CHECK_DEADLINE)
        .build()?;
    let release: Release = client
        .get(releases_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(event_for(current, release)?)
}

fn event_for(current: &str, release: Release) -> Result<Option<UpdateEvent>, VersionError> {
    if !is_newer(current, &release.tag_name)? {
        return Ok(None);
    }
    Ok(Some(UpdateEvent {
        current: current.to_string(),
        latest: release.tag_name.trim_start_matches('v').to_string(),
        url: release.html_url,
    }))
}
