//! Upload backends
//!
//! Two ways to get a build into App Store Connect:
//! - [`AppStoreApiUploader`]: the build upload REST API, with chunked transfer
//!   and an optional processing wait
//! - [`TransporterUploader`]: Apple's iTMSTransporter tool (macOS only)
//!
//! The [`Backend`](crate::config::Backend) configuration tag selects one via
//! [`uploader_for`].

mod api;
mod transporter;

pub use api::AppStoreApiUploader;
pub use transporter::{DEFAULT_TRANSPORTER_PATH, TransporterUploader};

use crate::client::AscClient;
use crate::config::{Backend, Config};
use crate::types::{AppMetadata, Build, Event};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What to upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRequest {
    /// Path to the `.ipa`
    pub app_path: PathBuf,
    /// App type ("ios", "macos", "appletvos", "visionos"); empty means iOS
    pub app_type: String,
}

/// What a backend learned while uploading
///
/// The transporter backend learns nothing beyond success, so every field is
/// optional.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Metadata read from the artifact
    pub metadata: Option<AppMetadata>,
    /// Resolved app id
    pub app_id: Option<String>,
    /// buildUploads id
    pub upload_id: Option<String>,
    /// Processed build, when the backend waited for processing
    pub build: Option<Build>,
}

/// A way to upload a build
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload the artifact
    async fn upload(&self, request: &UploadRequest) -> crate::Result<UploadOutcome>;

    /// Name of the backend for logs and results
    fn name(&self) -> &'static str;
}

/// Build the uploader the configuration selects
pub fn uploader_for(
    config: &Config,
    client: AscClient,
    events: broadcast::Sender<Event>,
) -> Arc<dyn Uploader> {
    match &config.backend {
        Backend::AppStoreApi => Arc::new(AppStoreApiUploader::new(
            client,
            config.polling.clone(),
            config.wait_for_processing,
            events,
        )),
        Backend::Transporter { executable_path } => Arc::new(TransporterUploader::from_config(
            executable_path.as_deref(),
            config.credentials.clone(),
        )),
    }
}
