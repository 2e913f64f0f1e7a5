//! Error types for asc-upload
//!
//! Every failure aborts the publish run. Variants carry enough context to tell
//! the caller which stage failed and what the server said, for example:
//! - upload session and chunk transfer failures (with HTTP status and body)
//! - polling exhaustion, naming the condition that was awaited
//! - input validation failures (encryption flag, configuration)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for asc-upload operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for asc-upload
#[derive(Debug, Error)]
pub enum Error {
    /// The build artifact does not carry the identifying metadata we need
    #[error("build metadata missing: {reason}")]
    MetadataMissing {
        /// What was missing or unreadable
        reason: String,
    },

    /// No App Store Connect app matches the bundle identifier
    #[error("unable to find App Store Connect app for bundle id {bundle_id}")]
    AppNotFound {
        /// The bundle identifier that was looked up
        bundle_id: String,
    },

    /// More than one app matches the bundle identifier
    #[error("multiple apps ({count}) found for bundle id {bundle_id}; please disambiguate")]
    AppAmbiguous {
        /// The bundle identifier that was looked up
        bundle_id: String,
        /// Number of matching apps
        count: usize,
    },

    /// The server did not hand out a file id or any upload operations
    #[error("App Store Connect returned no upload operations for build upload {upload_id}")]
    UploadOperationsMissing {
        /// The build upload session id
        upload_id: String,
    },

    /// An upload operation describes a byte range outside the artifact
    #[error(
        "upload operation {index} range {offset}+{length} exceeds artifact length {artifact_len}"
    )]
    InvalidUploadOperation {
        /// Position of the operation in the server-supplied list
        index: usize,
        /// Byte offset requested by the server
        offset: u64,
        /// Byte length requested by the server
        length: u64,
        /// Actual artifact size
        artifact_len: u64,
    },

    /// A chunk transfer returned a non-success status
    #[error("failed to upload build chunk {index} (status {status}): {body}")]
    ChunkUploadFailed {
        /// Position of the operation in the server-supplied list
        index: usize,
        /// HTTP status returned by the upload target
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// All chunks were transferred but the file could not be marked uploaded
    ///
    /// The remote session is left with its bytes in place but not committed.
    /// A fresh run creates a new session; nothing here reconciles the old one.
    #[error("build upload file {file_id} transferred but not finalized: {source}")]
    FinalizeFailed {
        /// The build upload file id
        file_id: String,
        /// Underlying request failure
        #[source]
        source: Box<Error>,
    },

    /// Polling gave up before the awaited condition held
    #[error("timed out after {attempts} attempts waiting for {label}")]
    PollTimeout {
        /// Description of the awaited condition
        label: String,
        /// Number of probe attempts made
        attempts: u32,
        /// Retryable failure of the final attempt, if it failed rather than
        /// returning a value that was not accepted
        #[source]
        last_error: Option<Box<Error>>,
    },

    /// Server-side processing reached a state that can never become VALID
    #[error("build {build_number} processing ended in state {state}")]
    BuildProcessingFailed {
        /// The build number (CFBundleVersion)
        build_number: String,
        /// The terminal processing state reported by the server
        state: String,
    },

    /// The uses-non-exempt-encryption input is neither "true" nor "false"
    #[error("invalid uses-non-exempt-encryption value \"{input}\"; use \"true\" or \"false\"")]
    InvalidEncryptionValue {
        /// The raw input
        input: String,
    },

    /// The API rejected our bearer token (expired or revoked)
    #[error("{context} (unauthorized): {body}")]
    Unauthorized {
        /// Caller-supplied description of the request
        context: String,
        /// Response body
        body: String,
    },

    /// The API returned a non-success status
    #[error("{context} (status {status}): {body}")]
    Api {
        /// Caller-supplied description of the request
        context: String,
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The API answered successfully but the document lacked a required field
    #[error("malformed App Store Connect response: {0}")]
    MalformedResponse(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// The build artifact could not be read as an IPA archive
    #[error("invalid build artifact {path}: {reason}")]
    Archive {
        /// Path of the artifact
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// External tool execution failed (iTMSTransporter)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported on this host
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::MetadataMissing { .. } => "metadata_missing",
            Error::AppNotFound { .. } => "app_not_found",
            Error::AppAmbiguous { .. } => "app_ambiguous",
            Error::UploadOperationsMissing { .. } => "upload_operations_missing",
            Error::InvalidUploadOperation { .. } => "invalid_upload_operation",
            Error::ChunkUploadFailed { .. } => "chunk_upload_failed",
            Error::FinalizeFailed { .. } => "finalize_failed",
            Error::PollTimeout { .. } => "poll_timeout",
            Error::BuildProcessingFailed { .. } => "build_processing_failed",
            Error::InvalidEncryptionValue { .. } => "invalid_encryption_value",
            Error::Unauthorized { .. } => "unauthorized",
            Error::Api { .. } => "api_error",
            Error::MalformedResponse(_) => "malformed_response",
            Error::Config { .. } => "config_error",
            Error::Archive { .. } => "archive_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Returns true once the upload bytes may have reached the server
    ///
    /// Callers use this to warn that a remote build upload may be left
    /// half-committed when the run aborts.
    pub fn is_post_transfer(&self) -> bool {
        matches!(
            self,
            Error::FinalizeFailed { .. }
                | Error::PollTimeout { .. }
                | Error::BuildProcessingFailed { .. }
        )
    }
}
