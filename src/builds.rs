//! Build state collection
//!
//! Builds are found by app, marketing version filter and platform. The
//! `filter[version]` filter matches `CFBundleVersion` (the build number).

use crate::client::AscClient;
use crate::config::PollPolicy;
use crate::error::Result;
use crate::poll::poll;
use crate::types::{Build, Event, Platform, ProcessingState, WaitPhase};
use serde::Deserialize;
use tokio::sync::broadcast;
use url::form_urlencoded;

/// Identifies the build an upload produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildQuery {
    /// App Store Connect app id
    pub app_id: String,
    /// CFBundleVersion
    pub build_number: String,
    /// Target platform
    pub platform: Platform,
}

impl BuildQuery {
    /// Relative request path including the filter query string
    pub fn path(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("filter[app]", &self.app_id)
            .append_pair("filter[version]", &self.build_number)
            .append_pair("filter[preReleaseVersion.platform]", self.platform.as_str())
            .finish();
        format!("/builds?{}", query)
    }
}

#[derive(Debug, Default, Deserialize)]
struct BuildsResponse {
    #[serde(default)]
    data: Vec<BuildResource>,
}

#[derive(Debug, Deserialize)]
struct BuildResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attributes: Option<BuildAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildAttributes {
    #[serde(default)]
    processing_state: Option<ProcessingState>,
}

/// First build matching `query`, or `None` when the server lists none yet
pub async fn lookup_build(client: &AscClient, query: &BuildQuery) -> Result<Option<Build>> {
    let response: BuildsResponse = client
        .get_json(&query.path(), "Failed to query App Store Connect builds.")
        .await?;

    let build = response.data.into_iter().next().map(|resource| Build {
        id: resource.id.filter(|id| !id.is_empty()),
        processing_state: resource.attributes.and_then(|a| a.processing_state),
    });

    tracing::debug!(
        build_number = %query.build_number,
        build_id = build.as_ref().and_then(|b| b.id.as_deref()),
        state = build
            .as_ref()
            .and_then(|b| b.processing_state.as_ref())
            .map(ProcessingState::as_str),
        "build query"
    );

    Ok(build)
}

/// Processing state of the first matching build, `None` while not visible
pub async fn lookup_build_state(
    client: &AscClient,
    query: &BuildQuery,
) -> Result<Option<ProcessingState>> {
    Ok(lookup_build(client, query)
        .await?
        .and_then(|build| build.processing_state))
}

/// Resolve the build id, polling at a fixed cadence until the build is listed
/// with an id
///
/// Used when the upload path did not already yield a build id (transporter
/// uploads, or runs that skip the processing wait).
pub async fn lookup_build_id_with_retry(
    client: &AscClient,
    query: &BuildQuery,
    policy: &PollPolicy,
    events: &broadcast::Sender<Event>,
) -> Result<String> {
    let label = format!("build {} to be listed in App Store Connect", query.build_number);

    poll(
        policy,
        &label,
        || async move {
            lookup_build(client, query)
                .await
                .map(|found| found.and_then(|build| build.id))
        },
        |_| true,
        |notice| {
            events
                .send(Event::WaitingForBuild {
                    phase: WaitPhase::BuildLookup,
                    attempt: notice.attempt,
                    attempts: notice.attempts,
                    next_delay: notice.next_delay,
                })
                .ok();
        },
    )
    .await
}
