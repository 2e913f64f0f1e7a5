//! Build artifact inspection
//!
//! An `.ipa` is a zip archive holding `Payload/<Name>.app/Info.plist`. The
//! plist may be XML or binary; both are decoded by the `plist` crate.

use crate::error::{Error, Result};
use crate::types::AppMetadata;
use std::io::Read;
use std::path::Path;
use tokio::task::spawn_blocking;

/// File name and size of the artifact as sent to the upload API
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactInfo {
    /// Base file name (e.g. "MyApp.ipa")
    pub file_name: String,
    /// Size in bytes
    pub file_size: u64,
}

/// Stat the artifact
pub async fn describe_artifact(path: &Path) -> Result<ArtifactInfo> {
    let meta = tokio::fs::metadata(path).await?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Archive {
            path: path.to_path_buf(),
            reason: "artifact path has no file name".to_string(),
        })?
        .to_string();

    Ok(ArtifactInfo {
        file_name,
        file_size: meta.len(),
    })
}

/// Read bundle id, build number and short version from the IPA's Info.plist
pub async fn extract_app_metadata(path: &Path) -> Result<AppMetadata> {
    let owned = path.to_path_buf();
    spawn_blocking(move || extract_app_metadata_blocking(&owned))
        .await
        .map_err(|e| Error::Archive {
            path: path.to_path_buf(),
            reason: format!("metadata task panicked: {}", e),
        })?
}

fn extract_app_metadata_blocking(path: &Path) -> Result<AppMetadata> {
    let archive_err = |reason: String| Error::Archive {
        path: path.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| archive_err(format!("not a zip archive: {}", e)))?;

    let entry_name = archive
        .file_names()
        .find(|name| is_app_info_plist(name))
        .map(str::to_string)
        .ok_or_else(|| Error::MetadataMissing {
            reason: "unable to locate Info.plist inside the IPA Payload".to_string(),
        })?;

    let mut buffer = Vec::new();
    archive
        .by_name(&entry_name)
        .map_err(|e| archive_err(format!("failed to open {}: {}", entry_name, e)))?
        .read_to_end(&mut buffer)?;

    tracing::debug!(entry = %entry_name, bytes = buffer.len(), "read Info.plist");
    parse_info_plist(&buffer)
}

/// Matches `Payload/<anything without slash>.app/Info.plist`
fn is_app_info_plist(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("Payload/") else {
        return false;
    };
    let Some(app_dir) = rest.strip_suffix("/Info.plist") else {
        return false;
    };
    app_dir.ends_with(".app") && !app_dir.contains('/') && app_dir.len() > ".app".len()
}

/// Decode an Info.plist (XML or binary) into [`AppMetadata`]
pub fn parse_info_plist(bytes: &[u8]) -> Result<AppMetadata> {
    let value = plist::Value::from_reader(std::io::Cursor::new(bytes)).map_err(|e| {
        Error::MetadataMissing {
            reason: format!("Info.plist could not be parsed: {}", e),
        }
    })?;

    let dict = value.as_dictionary().ok_or_else(|| Error::MetadataMissing {
        reason: "Info.plist root is not a dictionary".to_string(),
    })?;

    let field = |key: &str| {
        dict.get(key)
            .and_then(|v| v.as_string())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match (
        field("CFBundleIdentifier"),
        field("CFBundleVersion"),
        field("CFBundleShortVersionString"),
    ) {
        (Some(bundle_id), Some(build_number), Some(short_version)) => Ok(AppMetadata {
            bundle_id,
            build_number,
            short_version,
        }),
        _ => Err(Error::MetadataMissing {
            reason: "Info.plist missing CFBundleIdentifier, CFBundleVersion, or CFBundleShortVersionString"
                .to_string(),
        }),
    }
}
