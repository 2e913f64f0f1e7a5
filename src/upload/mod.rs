//! Build upload sessions
//!
//! An upload goes through three server-side steps:
//! - [`create_session`] creates a `buildUploads` resource and its
//!   `buildUploadFiles` resource, then reconciles their operation lists
//! - [`transfer`] sends each byte range to the pre-signed target
//! - [`finalize`] marks the file as uploaded, which starts processing

mod transfer;

pub use transfer::transfer;

use crate::client::{AscClient, resource_path};
use crate::error::{Error, Result};
use crate::types::{BuildUploadSession, Platform, UploadOperation};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

/// Everything the server needs to open an upload session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBuildUpload {
    /// App Store Connect app id
    pub app_id: String,
    /// Target platform
    pub platform: Platform,
    /// CFBundleShortVersionString
    pub short_version: String,
    /// CFBundleVersion
    pub build_number: String,
    /// Artifact file name
    pub file_name: String,
    /// Artifact size in bytes
    pub file_size: u64,
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    #[serde(default)]
    data: Option<UploadResource>,
}

#[derive(Debug, Deserialize)]
struct UploadResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attributes: Option<UploadAttributes>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadAttributes {
    #[serde(default)]
    upload_operations: Option<Vec<UploadOperation>>,
}

impl ResourceResponse {
    fn into_parts(self) -> (Option<String>, Vec<UploadOperation>) {
        match self.data {
            Some(resource) => (
                resource.id.filter(|id| !id.is_empty()),
                resource
                    .attributes
                    .and_then(|a| a.upload_operations)
                    .unwrap_or_default(),
            ),
            None => (None, Vec::new()),
        }
    }
}

/// Open a build upload session
///
/// The file resource is always created since only it yields the file id that
/// [`finalize`] needs.
pub async fn create_session(client: &AscClient, request: &NewBuildUpload) -> Result<BuildUploadSession> {
    let payload = json!({
        "data": {
            "type": "buildUploads",
            "attributes": {
                "platform": request.platform.as_str(),
                "cfBundleShortVersionString": request.short_version,
                "cfBundleVersion": request.build_number,
            },
            "relationships": {
                "app": {"data": {"type": "apps", "id": request.app_id}}
            }
        }
    });

    let (upload_id, inline_operations) = client
        .send_json::<ResourceResponse>(
            Method::POST,
            "/buildUploads",
            &payload,
            "Failed to create App Store build upload.",
        )
        .await?
        .into_parts();
    let upload_id = upload_id.ok_or_else(|| {
        Error::MalformedResponse("buildUploads response missing id".to_string())
    })?;

    tracing::debug!(
        upload_id = %upload_id,
        inline_operations = inline_operations.len(),
        "created build upload"
    );

    let payload = json!({
        "data": {
            "type": "buildUploadFiles",
            "attributes": {
                "fileName": request.file_name,
                "fileSize": request.file_size,
                "assetType": "ASSET",
                "uti": "com.apple.ipa",
            },
            "relationships": {
                "buildUpload": {"data": {"type": "buildUploads", "id": upload_id}}
            }
        }
    });

    let (file_id, file_operations) = client
        .send_json::<ResourceResponse>(
            Method::POST,
            "/buildUploadFiles",
            &payload,
            "Failed to create App Store build upload file.",
        )
        .await?
        .into_parts();

    reconcile_session(upload_id, inline_operations, file_id, file_operations)
}

/// Merge the session and file responses into one canonical session
///
/// Inline operations on the session win; otherwise the file resource's
/// operations are used.
///
/// # Errors
///
/// [`Error::UploadOperationsMissing`] when there is no file id or no
/// operations remain.
pub fn reconcile_session(
    upload_id: String,
    inline_operations: Vec<UploadOperation>,
    file_id: Option<String>,
    file_operations: Vec<UploadOperation>,
) -> Result<BuildUploadSession> {
    let operations = if inline_operations.is_empty() {
        file_operations
    } else {
        inline_operations
    };

    match file_id {
        Some(file_id) if !operations.is_empty() => Ok(BuildUploadSession {
            id: upload_id,
            file_id,
            operations,
        }),
        _ => Err(Error::UploadOperationsMissing { upload_id }),
    }
}

/// Mark the upload file as uploaded
///
/// # Errors
///
/// Any failure is wrapped in [`Error::FinalizeFailed`]: the bytes are on the
/// server but the upload is not committed.
pub async fn finalize(client: &AscClient, file_id: &str) -> Result<()> {
    let payload = json!({
        "data": {
            "id": file_id,
            "type": "buildUploadFiles",
            "attributes": {"uploaded": true}
        }
    });

    client
        .send_json::<Value>(
            Method::PATCH,
            &resource_path("buildUploadFiles", file_id),
            &payload,
            "Failed to finalize App Store build upload.",
        )
        .await
        .map_err(|e| Error::FinalizeFailed {
            file_id: file_id.to_string(),
            source: Box::new(e),
        })?;

    tracing::info!(file_id, "marked build upload as complete");
    Ok(())
}
