//! Publish entry point
//!
//! [`Publisher`] ties the pieces together: validate the release metadata
//! inputs, run the configured upload backend, then apply the optional
//! TestFlight metadata updates, and report one [`PublishResult`].

use crate::backend::{UploadOutcome, UploadRequest, Uploader, uploader_for};
use crate::builds::BuildQuery;
use crate::client::{AscClient, TokenProvider};
use crate::config::Config;
use crate::error::Result;
use crate::release_metadata::{BuildRef, ReleaseMetadata, submit};
use crate::types::{Event, Platform, PublishResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Inputs of one publish run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishRequest {
    /// Path to the `.ipa`
    pub app_path: PathBuf,
    /// App type ("ios", "macos", "appletvos", "visionos"); empty means iOS
    pub app_type: String,
    /// TestFlight "What to Test" notes; blank means not requested
    pub release_notes: Option<String>,
    /// Raw uses-non-exempt-encryption input ("true", "false" or blank)
    pub uses_non_exempt_encryption: Option<String>,
}

/// Uploads builds and applies TestFlight metadata
///
/// # Example
///
/// ```no_run
/// use asc_upload::{Config, PublishRequest, Publisher, StaticToken};
/// use std::sync::Arc;
///
/// # async fn example() -> asc_upload::Result<()> {
/// let publisher = Publisher::new(Config::default(), Arc::new(StaticToken::new("signed-jwt")))?;
/// let mut events = publisher.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{:?}", event);
///     }
/// });
///
/// let result = publisher
///     .publish(PublishRequest {
///         app_path: "build/App.ipa".into(),
///         app_type: "ios".to_string(),
///         release_notes: Some("Bug fixes".to_string()),
///         uses_non_exempt_encryption: Some("false".to_string()),
///     })
///     .await?;
/// println!("build {:?} is {:?}", result.build_id, result.processing_state);
/// # Ok(())
/// # }
/// ```
pub struct Publisher {
    config: Config,
    client: AscClient,
    uploader: Arc<dyn Uploader>,
    event_tx: broadcast::Sender<Event>,
}

impl Publisher {
    /// Validate `config` and set up the client and backend
    pub fn new(config: Config, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        config.validate()?;

        let client = AscClient::new(&config.api, tokens)?;
        let (event_tx, _rx) = broadcast::channel(1000);
        let uploader = uploader_for(&config, client.clone(), event_tx.clone());

        Ok(Self {
            config,
            client,
            uploader,
            event_tx,
        })
    }

    /// Subscribe to progress events
    ///
    /// Events sent before subscribing are not replayed. A slow receiver may
    /// lag and miss events (see [`broadcast::error::RecvError::Lagged`]).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Upload a build and apply the requested metadata
    ///
    /// Metadata inputs are validated before anything is uploaded.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishResult> {
        let release = ReleaseMetadata::from_inputs(
            request.release_notes.as_deref(),
            request.uses_non_exempt_encryption.as_deref(),
        )?;

        tracing::info!(
            backend = self.uploader.name(),
            path = %request.app_path.display(),
            release_notes = release.release_notes.is_some(),
            encryption_compliance = ?release.uses_non_exempt_encryption,
            "publishing build"
        );

        let outcome = self
            .uploader
            .upload(&UploadRequest {
                app_path: request.app_path.clone(),
                app_type: request.app_type.clone(),
            })
            .await?;

        let platform = Platform::from_app_type(&request.app_type);
        let build_ref = build_ref_for(&outcome, request.app_path, platform);
        let submission = submit(
            &self.client,
            &release,
            build_ref,
            &self.config.polling,
            &self.event_tx,
        )
        .await?;

        let build_id = outcome
            .build
            .as_ref()
            .and_then(|b| b.id.clone())
            .or(submission.build_id);

        self.event_tx
            .send(Event::PublishComplete {
                build_id: build_id.clone(),
            })
            .ok();
        tracing::info!(build_id = ?build_id, "publish complete");

        Ok(PublishResult {
            backend: self.uploader.name().to_string(),
            app_id: outcome.app_id.or(submission.app_id),
            upload_id: outcome.upload_id,
            build_id,
            processing_state: outcome.build.and_then(|b| b.processing_state),
            release_notes_updated: submission.release_notes_updated,
            encryption_compliance: submission.encryption_compliance,
            completed_at: chrono::Utc::now(),
        })
    }
}

/// Cheapest way to find the build, given what the upload learned
fn build_ref_for(outcome: &UploadOutcome, app_path: PathBuf, platform: Platform) -> BuildRef {
    if let Some(id) = outcome.build.as_ref().and_then(|b| b.id.clone()) {
        return BuildRef::Known(id);
    }

    match (&outcome.app_id, &outcome.metadata) {
        (Some(app_id), Some(metadata)) => BuildRef::Query(BuildQuery {
            app_id: app_id.clone(),
            build_number: metadata.build_number.clone(),
            platform,
        }),
        _ => BuildRef::Artifact { app_path, platform },
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("backend", &self.uploader.name())
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
