//! TestFlight release metadata
//!
//! After an upload, two optional updates can be applied to the build:
//! - the "What to Test" release notes, stored on the build's beta build
//!   localization
//! - the export compliance flag `usesNonExemptEncryption` on the build itself
//!
//! Inputs are validated up front by [`ReleaseMetadata::from_inputs`] so a bad
//! encryption value fails before any upload work is done.

use crate::apps::lookup_app_id;
use crate::artifact::extract_app_metadata;
use crate::builds::{BuildQuery, lookup_build_id_with_retry};
use crate::client::{AscClient, resource_path};
use crate::config::{PollPolicy, PollingConfig};
use crate::error::{Error, Result};
use crate::poll::poll;
use crate::types::{Event, Platform, WaitPhase};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Maximum length of `whatsNew`, in characters
pub const MAX_RELEASE_NOTES_CHARS: usize = 4000;

/// Validated metadata updates for a build
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseMetadata {
    /// Trimmed, non-empty release notes
    pub release_notes: Option<String>,
    /// Export compliance flag
    pub uses_non_exempt_encryption: Option<bool>,
}

impl ReleaseMetadata {
    /// Validate raw inputs
    ///
    /// Release notes are trimmed; blank notes mean "not requested".
    pub fn from_inputs(release_notes: Option<&str>, uses_non_exempt_encryption: Option<&str>) -> Result<Self> {
        let release_notes = release_notes
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            release_notes,
            uses_non_exempt_encryption: parse_uses_non_exempt_encryption(uses_non_exempt_encryption)?,
        })
    }

    /// True when no update was requested
    pub fn is_empty(&self) -> bool {
        self.release_notes.is_none() && self.uses_non_exempt_encryption.is_none()
    }
}

/// Parse the tri-state encryption input
///
/// Absent or blank is `None`; "true"/"false" in any case, surrounded by any
/// whitespace, is the corresponding bool.
///
/// # Errors
///
/// [`Error::InvalidEncryptionValue`] for anything else.
pub fn parse_uses_non_exempt_encryption(input: Option<&str>) -> Result<Option<bool>> {
    let Some(raw) = input else {
        return Ok(None);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" => Ok(Some(true)),
        "false" => Ok(Some(false)),
        _ => Err(Error::InvalidEncryptionValue {
            input: raw.to_string(),
        }),
    }
}

/// First [`MAX_RELEASE_NOTES_CHARS`] characters of `notes`
pub fn truncate_release_notes(notes: &str) -> &str {
    match notes.char_indices().nth(MAX_RELEASE_NOTES_CHARS) {
        Some((byte_index, _)) => &notes[..byte_index],
        None => notes,
    }
}

/// How the submitter finds the build to update
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildRef {
    /// Build id already known from the processing wait
    Known(String),
    /// App id known; poll the build listing for the id
    Query(BuildQuery),
    /// Nothing resolved yet; read the artifact and resolve the app first
    Artifact {
        /// Path to the uploaded `.ipa`
        app_path: PathBuf,
        /// Target platform
        platform: Platform,
    },
}

/// What the submitter changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionOutcome {
    /// Build that was updated, if any update was made
    pub build_id: Option<String>,
    /// App id resolved on the way, for [`BuildRef::Artifact`]
    pub app_id: Option<String>,
    /// Whether the release notes were patched
    pub release_notes_updated: bool,
    /// Value sent for `usesNonExemptEncryption`
    pub encryption_compliance: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LocalizationsResponse {
    #[serde(default)]
    data: Vec<LocalizationResource>,
}

#[derive(Debug, Deserialize)]
struct LocalizationResource {
    #[serde(default)]
    id: Option<String>,
}

/// Apply the requested updates
///
/// Makes no network call at all when `metadata` is empty. Release notes are
/// patched before the compliance flag.
pub async fn submit(
    client: &AscClient,
    metadata: &ReleaseMetadata,
    build: BuildRef,
    polling: &PollingConfig,
    events: &broadcast::Sender<Event>,
) -> Result<SubmissionOutcome> {
    if metadata.is_empty() {
        tracing::info!(
            "no release note or encryption compliance requested, skipping TestFlight metadata update"
        );
        events.send(Event::MetadataSkipped).ok();
        return Ok(SubmissionOutcome::default());
    }

    let mut outcome = SubmissionOutcome::default();
    let build_id = match build {
        BuildRef::Known(id) => id,
        BuildRef::Query(query) => {
            lookup_build_id_with_retry(client, &query, &polling.build_lookup, events).await?
        }
        BuildRef::Artifact { app_path, platform } => {
            let app = extract_app_metadata(&app_path).await?;
            let app_id = lookup_app_id(client, &app.bundle_id).await?;
            let query = BuildQuery {
                app_id: app_id.clone(),
                build_number: app.build_number,
                platform,
            };
            outcome.app_id = Some(app_id);
            lookup_build_id_with_retry(client, &query, &polling.build_lookup, events).await?
        }
    };

    if let Some(notes) = &metadata.release_notes {
        let localization_id =
            lookup_localization_id(client, &build_id, &polling.localization, events).await?;
        let chars = update_release_notes(client, &localization_id, notes).await?;
        events
            .send(Event::ReleaseNotesUpdated {
                build_id: build_id.clone(),
                chars,
            })
            .ok();
        outcome.release_notes_updated = true;
    }

    if let Some(value) = metadata.uses_non_exempt_encryption {
        update_encryption_compliance(client, &build_id, value).await?;
        events
            .send(Event::EncryptionComplianceUpdated {
                build_id: build_id.clone(),
                uses_non_exempt_encryption: value,
            })
            .ok();
        outcome.encryption_compliance = Some(value);
    }

    outcome.build_id = Some(build_id);
    Ok(outcome)
}

/// Poll for the build's beta build localization id
pub async fn lookup_localization_id(
    client: &AscClient,
    build_id: &str,
    policy: &PollPolicy,
    events: &broadcast::Sender<Event>,
) -> Result<String> {
    let path = format!("{}/betaBuildLocalizations", resource_path("builds", build_id));
    let path = path.as_str();

    poll(
        policy,
        &format!("localization for build {}", build_id),
        || async move {
            // Docs: https://developer.apple.com/documentation/appstoreconnectapi/betabuildlocalizations
            client
                .get_json::<LocalizationsResponse>(path, "Failed to query beta build localizations.")
                .await
                .map(|response| {
                    response
                        .data
                        .into_iter()
                        .next()
                        .and_then(|l| l.id)
                        .filter(|id| !id.is_empty())
                })
        },
        |_| true,
        |notice| {
            events
                .send(Event::WaitingForBuild {
                    phase: WaitPhase::Localization,
                    attempt: notice.attempt,
                    attempts: notice.attempts,
                    next_delay: notice.next_delay,
                })
                .ok();
        },
    )
    .await
}

/// Patch `whatsNew` on a localization, returning the number of characters sent
pub async fn update_release_notes(client: &AscClient, localization_id: &str, notes: &str) -> Result<usize> {
    let whats_new = truncate_release_notes(notes);
    if whats_new.len() < notes.len() {
        tracing::debug!(
            max_chars = MAX_RELEASE_NOTES_CHARS,
            "release notes truncated"
        );
    }
    let payload = json!({
        "data": {
            "id": localization_id,
            "type": "betaBuildLocalizations",
            "attributes": {"whatsNew": whats_new}
        }
    });

    client
        .send_json::<Value>(
            Method::PATCH,
            &resource_path("betaBuildLocalizations", localization_id),
            &payload,
            "Failed to update TestFlight release note.",
        )
        .await?;

    let chars = whats_new.chars().count();
    tracing::info!(localization_id, chars, "updated TestFlight release note");
    Ok(chars)
}

/// Patch `usesNonExemptEncryption` on a build
pub async fn update_encryption_compliance(client: &AscClient, build_id: &str, value: bool) -> Result<()> {
    let payload = json!({
        "data": {
            "id": build_id,
            "type": "builds",
            "attributes": {"usesNonExemptEncryption": value}
        }
    });

    client
        .send_json::<Value>(
            Method::PATCH,
            &resource_path("builds", build_id),
            &payload,
            "Failed to update encryption compliance for build.",
        )
        .await?;

    tracing::info!(build_id, uses_non_exempt_encryption = value, "updated encryption compliance");
    Ok(())
}
