//! Two-phase wait for an uploaded build
//!
//! After finalize the server needs time before the build shows up at all, and
//! more time before processing completes. The wait is:
//! 1. one unconditional visibility delay
//! 2. visibility: exponential polling until the state is PROCESSING or VALID
//! 3. processing: exponential polling until the state is VALID
//!
//! INVALID and FAILED are treated like PROCESSING unless
//! `fail_fast_on_invalid` is set, in which case they end the wait immediately.

use crate::builds::{BuildQuery, lookup_build};
use crate::client::AscClient;
use crate::config::PollingConfig;
use crate::error::{Error, Result};
use crate::poll::{RetryNotice, poll};
use crate::types::{Build, Event, ProcessingState, WaitPhase};
use tokio::sync::broadcast;

fn waiting_event(phase: WaitPhase, notice: &RetryNotice) -> Event {
    Event::WaitingForBuild {
        phase,
        attempt: notice.attempt,
        attempts: notice.attempts,
        next_delay: notice.next_delay,
    }
}

/// Wait until the build behind `query` is processed and VALID
///
/// # Errors
///
/// - [`Error::PollTimeout`] when either phase exhausts its attempts
/// - [`Error::BuildProcessingFailed`] when processing ends INVALID or FAILED
///   and `polling.fail_fast_on_invalid` is set
pub async fn wait_for_build_processing(
    client: &AscClient,
    query: &BuildQuery,
    polling: &PollingConfig,
    events: &broadcast::Sender<Event>,
) -> Result<Build> {
    tracing::info!(
        build_number = %query.build_number,
        delay_secs = polling.visibility.delay.as_secs_f64(),
        "waiting before first build lookup"
    );
    tokio::time::sleep(polling.visibility.delay).await;

    let visible = poll(
        &polling.visibility,
        &format!("build {} to appear in App Store Connect", query.build_number),
        || lookup_build(client, query),
        |build: &Build| {
            build
                .processing_state
                .as_ref()
                .is_some_and(ProcessingState::is_visible)
        },
        |notice| {
            events.send(waiting_event(WaitPhase::Visibility, notice)).ok();
        },
    )
    .await?;

    let state = visible
        .processing_state
        .clone()
        .unwrap_or(ProcessingState::Processing);
    tracing::info!(build_id = ?visible.id, %state, "build visible in App Store Connect");
    events
        .send(Event::BuildVisible {
            build_id: visible.id.clone(),
            state,
        })
        .ok();

    let fail_fast = polling.fail_fast_on_invalid;
    let build_number = query.build_number.as_str();
    let ready = poll(
        &polling.processing,
        &format!("build {} processing to finish", query.build_number),
        || async move {
            let build = lookup_build(client, query).await?;
            if let Some(state) = build
                .as_ref()
                .and_then(|b| b.processing_state.as_ref())
                .filter(|s| fail_fast && s.is_terminal_failure())
            {
                return Err(Error::BuildProcessingFailed {
                    build_number: build_number.to_string(),
                    state: state.to_string(),
                });
            }
            Ok(build)
        },
        |build: &Build| build.processing_state == Some(ProcessingState::Valid),
        |notice| {
            events.send(waiting_event(WaitPhase::Processing, notice)).ok();
        },
    )
    .await?;

    tracing::info!(build_id = ?ready.id, "build processing is VALID");
    events
        .send(Event::BuildReady {
            build_id: ready.id.clone(),
        })
        .ok();

    Ok(ready)
}
