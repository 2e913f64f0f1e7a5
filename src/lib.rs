//! # asc-upload
//!
//! Library for publishing packaged app builds (`.ipa`) to App Store Connect.
//!
//! ## What a publish run does
//!
//! 1. reads bundle id, build number and version from the artifact's Info.plist
//! 2. resolves the App Store Connect app for the bundle id
//! 3. opens a build upload session and transfers the artifact in the chunks
//!    the server dictates
//! 4. finalizes the upload and waits, with exponential backoff, until the
//!    build is visible and its processing state is `VALID`
//! 5. optionally sets the TestFlight release notes and the export compliance flag
//!
//! Alternatively, the upload can be handed to Apple's `iTMSTransporter`
//! (macOS only), see [`Backend`].
//!
//! Authentication is pluggable: anything implementing [`TokenProvider`] can
//! supply the signed bearer token.
//!
//! ## Quick Start
//!
//! ```no_run
//! use asc_upload::{Config, PublishRequest, Publisher, StaticToken};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let publisher = Publisher::new(Config::default(), Arc::new(StaticToken::new("signed-jwt")))?;
//!
//!     // Subscribe to events
//!     let mut events = publisher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let result = publisher
//!         .publish(PublishRequest {
//!             app_path: "build/App.ipa".into(),
//!             app_type: "ios".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("build {:?} ready", result.build_id);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// App id resolution
pub mod apps;
/// IPA inspection
pub mod artifact;
/// Upload backends
pub mod backend;
/// Build lookups
pub mod builds;
/// HTTP client and token providers
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Bounded polling with backoff
pub mod poll;
/// Publish orchestration
pub mod publisher;
/// TestFlight release notes and export compliance
pub mod release_metadata;
/// Core types and events
pub mod types;
/// Build upload sessions and chunk transfer
pub mod upload;
/// Post-upload processing wait
pub mod waiter;

// Re-export commonly used types
pub use backend::{AppStoreApiUploader, TransporterUploader, UploadOutcome, UploadRequest, Uploader};
pub use client::{AscClient, StaticToken, TokenProvider};
pub use config::{ApiConfig, ApiCredentials, Backend, Backoff, Config, PollPolicy, PollingConfig};
pub use error::{Error, Result};
pub use publisher::{PublishRequest, Publisher};
pub use release_metadata::{BuildRef, ReleaseMetadata};
pub use types::{
    AppMetadata, Build, BuildUploadSession, Event, Platform, ProcessingState, PublishResult,
    UploadOperation, WaitPhase,
};
