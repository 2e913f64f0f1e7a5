//! Upload via Apple's iTMSTransporter binary

use super::{UploadOutcome, UploadRequest, Uploader};
use crate::config::ApiCredentials;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Install location used by Xcode's Transporter when nothing else is found
pub const DEFAULT_TRANSPORTER_PATH: &str = "/usr/local/itms/bin/iTMSTransporter";

/// Backend that shells out to `iTMSTransporter`
///
/// Authentication uses the API key id and issuer; the tool finds the private
/// key itself (in `~/.appstoreconnect/private_keys` or similar).
pub struct TransporterUploader {
    binary_path: PathBuf,
    credentials: ApiCredentials,
}

impl TransporterUploader {
    /// Create a handler with an explicit binary path
    pub fn new(binary_path: PathBuf, credentials: ApiCredentials) -> Self {
        Self {
            binary_path,
            credentials,
        }
    }

    /// Resolve the binary: configured path, then `PATH`, then the default install location
    pub fn from_config(executable_path: Option<&Path>, credentials: ApiCredentials) -> Self {
        let binary_path = executable_path
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .or_else(|| which::which("iTMSTransporter").ok())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRANSPORTER_PATH));

        Self::new(binary_path, credentials)
    }

    /// Binary that will be executed
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Argument vector for an upload of `app_path`
    pub fn arguments(&self, app_path: &Path, app_type: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-m".into(),
            "upload".into(),
            "-assetFile".into(),
            app_path.into(),
            "-apiKey".into(),
            self.credentials.api_key_id.as_str().into(),
            "-apiIssuer".into(),
            self.credentials.issuer_id.as_str().into(),
            "-v".into(),
            "eXtreme".into(),
        ];

        let app_type = app_type.trim();
        if !app_type.is_empty() {
            args.push("-appPlatform".into());
            args.push(app_type.into());
        }
        args
    }
}

#[async_trait]
impl Uploader for TransporterUploader {
    async fn upload(&self, request: &UploadRequest) -> crate::Result<UploadOutcome> {
        if !cfg!(target_os = "macos") {
            return Err(crate::Error::NotSupported(
                "the transporter backend requires a macOS runner".to_string(),
            ));
        }

        tracing::info!(
            binary = %self.binary_path.display(),
            path = %request.app_path.display(),
            "starting iTMSTransporter upload"
        );

        let output = Command::new(&self.binary_path)
            .args(self.arguments(&request.app_path, &request.app_type))
            .output()
            .await
            .map_err(|e| {
                crate::Error::ExternalTool(format!("Failed to execute iTMSTransporter: {}", e))
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: "asc_upload::transporter", "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(crate::Error::ExternalTool(format!(
                "iTMSTransporter exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!("iTMSTransporter upload finished");
        Ok(UploadOutcome::default())
    }

    fn name(&self) -> &'static str {
        "transporter"
    }
}
