//! Test configuration helpers

use asc_upload::{ApiConfig, Config, PollPolicy, PollingConfig, Publisher, StaticToken};
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

/// Token every mocked API request must carry
pub const TEST_TOKEN: &str = "test-jwt";

/// Polling policies with millisecond delays
///
/// Attempt counts match the production defaults so exhaustion behaves the
/// same, just quickly.
pub fn fast_polling() -> PollingConfig {
    let backoff = PollPolicy::exponential(10, Duration::from_millis(5), Duration::from_millis(40));
    let fixed = PollPolicy::fixed(20, Duration::from_millis(5));
    PollingConfig {
        visibility: backoff.clone(),
        processing: backoff,
        localization: fixed.clone(),
        build_lookup: fixed,
        fail_fast_on_invalid: false,
    }
}

/// Config pointing the API at `server` with fast polling
pub fn test_config(server: &MockServer) -> Config {
    Config {
        api: ApiConfig {
            base_url: format!("{}/v1", server.uri()),
            request_timeout: Duration::from_secs(10),
        },
        polling: fast_polling(),
        ..Default::default()
    }
}

/// Publisher for `config` authenticated with [`TEST_TOKEN`]
pub fn publisher_for(config: Config) -> Publisher {
    Publisher::new(config, Arc::new(StaticToken::new(TEST_TOKEN))).expect("valid test config")
}
