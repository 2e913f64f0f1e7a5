//! Core types for asc-upload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifying metadata read from the build artifact's Info.plist
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// CFBundleIdentifier
    pub bundle_id: String,
    /// CFBundleVersion
    pub build_number: String,
    /// CFBundleShortVersionString
    pub short_version: String,
}

/// App Store Connect platform identifier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    /// iOS and iPadOS (default)
    #[default]
    Ios,
    /// macOS
    MacOs,
    /// tvOS
    TvOs,
    /// visionOS
    VisionOs,
}

impl Platform {
    /// Map an app-type string ("ios", "macos", "appletvos", "visionos") to a platform
    ///
    /// Empty input selects iOS. Unknown values also fall back to iOS with a warning.
    pub fn from_app_type(app_type: &str) -> Self {
        match app_type.trim().to_ascii_lowercase().as_str() {
            "" | "ios" | "iphoneos" => Platform::Ios,
            "macos" | "osx" => Platform::MacOs,
            "appletvos" | "tvos" => Platform::TvOs,
            "visionos" | "xros" => Platform::VisionOs,
            other => {
                tracing::warn!(app_type = other, "unknown app type, defaulting to IOS");
                Platform::Ios
            }
        }
    }

    /// Wire value used in API attributes and filters
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "IOS",
            Platform::MacOs => "MAC_OS",
            Platform::TvOs => "TV_OS",
            Platform::VisionOs => "VISION_OS",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-reported processing state of an uploaded build
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProcessingState {
    /// Build is visible and still being processed
    Processing,
    /// Processing finished successfully
    Valid,
    /// Processing finished, build rejected
    Invalid,
    /// Processing failed
    Failed,
    /// Any state this crate does not know about, kept verbatim
    Other(String),
}

impl ProcessingState {
    /// Wire value
    pub fn as_str(&self) -> &str {
        match self {
            ProcessingState::Processing => "PROCESSING",
            ProcessingState::Valid => "VALID",
            ProcessingState::Invalid => "INVALID",
            ProcessingState::Failed => "FAILED",
            ProcessingState::Other(s) => s,
        }
    }

    /// Only PROCESSING and VALID count as the build being visible
    pub fn is_visible(&self) -> bool {
        matches!(self, ProcessingState::Processing | ProcessingState::Valid)
    }

    /// States from which the build can never become VALID
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, ProcessingState::Invalid | ProcessingState::Failed)
    }
}

impl From<String> for ProcessingState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PROCESSING" => ProcessingState::Processing,
            "VALID" => ProcessingState::Valid,
            "INVALID" => ProcessingState::Invalid,
            "FAILED" => ProcessingState::Failed,
            _ => ProcessingState::Other(value),
        }
    }
}

impl From<ProcessingState> for String {
    fn from(state: ProcessingState) -> Self {
        match state {
            ProcessingState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header the server asks us to send with a chunk
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

/// One byte-range transfer dictated by the server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOperation {
    /// HTTP method (usually PUT)
    pub method: String,
    /// Pre-signed target URL
    pub url: String,
    /// Start of the byte range within the artifact
    pub offset: u64,
    /// Number of bytes in the range
    pub length: u64,
    /// Headers to send verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Vec<RequestHeader>>,
}

/// A build upload session with everything needed to transfer and finalize
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BuildUploadSession {
    /// buildUploads resource id
    pub id: String,
    /// buildUploadFiles resource id, required to finalize
    pub file_id: String,
    /// Chunk plan, in the order the server listed it
    pub operations: Vec<UploadOperation>,
}

/// First build matching an app/version/platform query
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Build {
    /// builds resource id; a listing may carry the state before the id
    pub id: Option<String>,
    /// Processing state, absent while the build is not yet visible
    pub processing_state: Option<ProcessingState>,
}

/// Phase of the post-upload wait
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPhase {
    /// Waiting for the build to appear in queries
    Visibility,
    /// Waiting for processing to finish
    Processing,
    /// Waiting for the beta build localization
    Localization,
    /// Waiting for the build id to resolve
    BuildLookup,
}

/// Event emitted during a publish run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Upload is starting
    UploadStarted {
        /// Backend name
        backend: String,
        /// Artifact file name
        file_name: String,
        /// Artifact size in bytes
        file_size: u64,
    },

    /// Bundle id resolved to an App Store Connect app
    AppResolved {
        /// Bundle identifier
        bundle_id: String,
        /// App id
        app_id: String,
    },

    /// Upload session created
    SessionCreated {
        /// buildUploads id
        upload_id: String,
        /// Number of chunks to transfer
        operations: usize,
    },

    /// One chunk transferred
    ChunkUploaded {
        /// 1-based chunk number
        index: usize,
        /// Total number of chunks
        total: usize,
        /// Bytes sent in this chunk
        bytes: u64,
    },

    /// Upload file marked as uploaded
    UploadFinalized {
        /// buildUploadFiles id
        file_id: String,
    },

    /// A poll attempt was unsuccessful and another will follow
    WaitingForBuild {
        /// What is being waited for
        phase: WaitPhase,
        /// 1-based attempt number that just failed
        attempt: u32,
        /// Maximum attempts
        attempts: u32,
        /// Sleep before the next attempt
        #[serde(with = "duration_millis")]
        next_delay: Duration,
    },

    /// Build appeared in queries
    BuildVisible {
        /// builds id, when listed
        #[serde(skip_serializing_if = "Option::is_none")]
        build_id: Option<String>,
        /// Observed state
        state: ProcessingState,
    },

    /// Build processing reached VALID
    BuildReady {
        /// builds id, when listed
        #[serde(skip_serializing_if = "Option::is_none")]
        build_id: Option<String>,
    },

    /// TestFlight release notes updated
    ReleaseNotesUpdated {
        /// builds id
        build_id: String,
        /// Characters sent (after truncation)
        chars: usize,
    },

    /// Export compliance flag updated
    EncryptionComplianceUpdated {
        /// builds id
        build_id: String,
        /// New value of usesNonExemptEncryption
        uses_non_exempt_encryption: bool,
    },

    /// No release metadata was requested
    MetadataSkipped,

    /// Publish run finished successfully
    PublishComplete {
        /// builds id, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        build_id: Option<String>,
    },
}

/// Outcome of a successful publish run
#[derive(Clone, Debug, Serialize)]
pub struct PublishResult {
    /// Backend that performed the upload
    pub backend: String,
    /// App id, when the backend resolved it
    pub app_id: Option<String>,
    /// buildUploads id (API backend only)
    pub upload_id: Option<String>,
    /// builds id, when known
    pub build_id: Option<String>,
    /// Last observed processing state
    pub processing_state: Option<ProcessingState>,
    /// Whether release notes were patched
    pub release_notes_updated: bool,
    /// Value sent for usesNonExemptEncryption, if any
    pub encryption_compliance: Option<bool>,
    /// When the run finished
    pub completed_at: DateTime<Utc>,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
