//! Upload through the App Store Connect build upload API

use super::{UploadOutcome, UploadRequest, Uploader};
use crate::apps::lookup_app_id;
use crate::artifact::{describe_artifact, extract_app_metadata};
use crate::builds::BuildQuery;
use crate::client::AscClient;
use crate::config::PollingConfig;
use crate::types::{Event, Platform};
use crate::upload::{NewBuildUpload, create_session, finalize, transfer};
use crate::waiter::wait_for_build_processing;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

/// Native API backend
///
/// Sequence: read metadata, resolve the app, open a session, transfer the
/// chunks, finalize, and (optionally) wait for processing to reach VALID.
pub struct AppStoreApiUploader {
    client: AscClient,
    polling: PollingConfig,
    wait_for_processing: bool,
    events: broadcast::Sender<Event>,
}

impl AppStoreApiUploader {
    /// Create the backend
    ///
    /// # Arguments
    ///
    /// * `wait_for_processing` - Wait for the build to reach VALID before returning
    /// * `events` - Progress events are sent here
    pub fn new(
        client: AscClient,
        polling: PollingConfig,
        wait_for_processing: bool,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            polling,
            wait_for_processing,
            events,
        }
    }
}

#[async_trait]
impl Uploader for AppStoreApiUploader {
    async fn upload(&self, request: &UploadRequest) -> crate::Result<UploadOutcome> {
        tracing::info!(path = %request.app_path.display(), "starting App Store API upload");

        let metadata = extract_app_metadata(&request.app_path).await?;
        let platform = Platform::from_app_type(&request.app_type);
        let artifact = describe_artifact(&request.app_path).await?;

        tracing::debug!(
            bundle_id = %metadata.bundle_id,
            build_number = %metadata.build_number,
            short_version = %metadata.short_version,
            %platform,
            file_name = %artifact.file_name,
            file_size = artifact.file_size,
            "preparing build upload"
        );
        self.events
            .send(Event::UploadStarted {
                backend: self.name().to_string(),
                file_name: artifact.file_name.clone(),
                file_size: artifact.file_size,
            })
            .ok();

        let app_id = lookup_app_id(&self.client, &metadata.bundle_id).await?;
        tracing::debug!(%app_id, bundle_id = %metadata.bundle_id, "resolved app");
        self.events
            .send(Event::AppResolved {
                bundle_id: metadata.bundle_id.clone(),
                app_id: app_id.clone(),
            })
            .ok();

        let session = create_session(
            &self.client,
            &NewBuildUpload {
                app_id: app_id.clone(),
                platform,
                short_version: metadata.short_version.clone(),
                build_number: metadata.build_number.clone(),
                file_name: artifact.file_name,
                file_size: artifact.file_size,
            },
        )
        .await?;
        tracing::debug!(
            upload_id = %session.id,
            operations = session.operations.len(),
            "created build upload session"
        );
        self.events
            .send(Event::SessionCreated {
                upload_id: session.id.clone(),
                operations: session.operations.len(),
            })
            .ok();

        let bytes = Bytes::from(tokio::fs::read(&request.app_path).await?);
        transfer(self.client.http(), &session, &bytes, &self.events).await?;
        drop(bytes);

        finalize(&self.client, &session.file_id).await?;
        self.events
            .send(Event::UploadFinalized {
                file_id: session.file_id.clone(),
            })
            .ok();

        let build = if self.wait_for_processing {
            let query = BuildQuery {
                app_id: app_id.clone(),
                build_number: metadata.build_number.clone(),
                platform,
            };
            Some(wait_for_build_processing(&self.client, &query, &self.polling, &self.events).await?)
        } else {
            tracing::info!("not waiting for build processing");
            None
        };

        Ok(UploadOutcome {
            metadata: Some(metadata),
            app_id: Some(app_id),
            upload_id: Some(session.id),
            build,
        })
    }

    fn name(&self) -> &'static str {
        "appstore-api"
    }
}
