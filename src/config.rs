//! Configuration types for asc-upload

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Default App Store Connect API root
pub const DEFAULT_BASE_URL: &str = "https://api.appstoreconnect.apple.com/v1";

/// Main configuration for a publish run
///
/// Every field has a sensible default except the credentials, which only the
/// transporter backend reads (the API backend authenticates through a
/// [`TokenProvider`](crate::client::TokenProvider)).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// App Store Connect API endpoint and HTTP behavior
    #[serde(default)]
    pub api: ApiConfig,

    /// API key identifiers (the private key itself stays with the token provider)
    #[serde(default)]
    pub credentials: ApiCredentials,

    /// Which upload backend to use
    #[serde(default)]
    pub backend: Backend,

    /// Poll policies for the visibility, processing and metadata waits
    #[serde(default)]
    pub polling: PollingConfig,

    /// Wait for server-side processing to reach VALID after upload (default: true)
    #[serde(default = "default_true")]
    pub wait_for_processing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            credentials: ApiCredentials::default(),
            backend: Backend::default(),
            polling: PollingConfig::default(),
            wait_for_processing: true,
        }
    }
}

impl Config {
    /// Check the configuration for values that would make a run fail later
    pub fn validate(&self) -> Result<()> {
        let base = self.api.base_url.trim();
        if base.is_empty() {
            return Err(config_error("base URL must not be empty", "api.base_url"));
        }
        url::Url::parse(base).map_err(|e| {
            config_error(format!("invalid base URL '{}': {}", base, e), "api.base_url")
        })?;

        for (key, policy) in [
            ("polling.visibility", &self.polling.visibility),
            ("polling.processing", &self.polling.processing),
            ("polling.localization", &self.polling.localization),
            ("polling.build_lookup", &self.polling.build_lookup),
        ] {
            policy.validate(key)?;
        }

        if let Backend::Transporter { .. } = self.backend {
            if self.credentials.api_key_id.trim().is_empty() {
                return Err(config_error(
                    "transporter backend requires an API key id",
                    "credentials.api_key_id",
                ));
            }
            if self.credentials.issuer_id.trim().is_empty() {
                return Err(config_error(
                    "transporter backend requires an issuer id",
                    "credentials.issuer_id",
                ));
            }
        }

        Ok(())
    }
}

/// App Store Connect API endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API root, every request path is appended to it
    /// (default: "https://api.appstoreconnect.apple.com/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout, applies to chunk uploads too (default: 120 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// API key identifiers
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiCredentials {
    /// Issuer id of the App Store Connect API key
    #[serde(default)]
    pub issuer_id: String,

    /// Key id of the App Store Connect API key
    #[serde(default)]
    pub api_key_id: String,
}

/// Upload backend selection
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    /// Native App Store Connect build upload API (default)
    #[default]
    AppStoreApi,
    /// Apple's iTMSTransporter command line tool (macOS only)
    Transporter {
        /// Path to the iTMSTransporter binary (searched in PATH if None)
        #[serde(default)]
        executable_path: Option<PathBuf>,
    },
}

/// How the delay between poll attempts evolves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles after every unsuccessful attempt, up to `cap`
    Exponential {
        /// Upper bound for a single delay (default: 5 minutes)
        #[serde(default = "default_backoff_cap", with = "duration_serde")]
        cap: Duration,
    },
}

/// Bounded polling policy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Maximum number of probe attempts
    pub attempts: u32,

    /// Delay before the second attempt (constant for [`Backoff::Fixed`])
    #[serde(with = "duration_serde")]
    pub delay: Duration,

    /// Delay growth
    pub backoff: Backoff,

    /// Randomize each sleep between `delay` and `2 * delay` (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl PollPolicy {
    /// Constant-cadence policy
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    /// Doubling policy capped at `cap`
    pub fn exponential(attempts: u32, initial_delay: Duration, cap: Duration) -> Self {
        Self {
            attempts,
            delay: initial_delay,
            backoff: Backoff::Exponential { cap },
            jitter: false,
        }
    }

    fn validate(&self, key: &str) -> Result<()> {
        if self.attempts == 0 {
            return Err(config_error(
                "poll attempts must be at least 1",
                format!("{}.attempts", key),
            ));
        }
        match self.backoff {
            Backoff::Exponential { cap } if cap < self.delay => Err(config_error(
                format!(
                    "backoff cap {}s is below the initial delay {}s",
                    cap.as_secs(),
                    self.delay.as_secs()
                ),
                format!("{}.backoff.cap", key),
            )),
            _ => Ok(()),
        }
    }
}

/// Poll policies for each wait in the publish flow
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Waiting for the uploaded build to show up in queries
    /// (default: 10 attempts, 30s doubling, 5 minute cap)
    #[serde(default = "default_visibility_policy")]
    pub visibility: PollPolicy,

    /// Waiting for processing to reach VALID
    /// (default: 10 attempts, 30s doubling, 5 minute cap)
    #[serde(default = "default_processing_policy")]
    pub processing: PollPolicy,

    /// Waiting for the beta build localization to exist (default: 20 attempts every 30s)
    #[serde(default = "default_lookup_policy")]
    pub localization: PollPolicy,

    /// Resolving a build id when it is not already known (default: 20 attempts every 30s)
    #[serde(default = "default_lookup_policy")]
    pub build_lookup: PollPolicy,

    /// Stop waiting as soon as processing reports INVALID or FAILED (default: false)
    ///
    /// By default the processing wait keeps polling through those states until
    /// attempts run out, since App Store Connect may report them transiently.
    #[serde(default)]
    pub fail_fast_on_invalid: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            visibility: default_visibility_policy(),
            processing: default_processing_policy(),
            localization: default_lookup_policy(),
            build_lookup: default_lookup_policy(),
            fail_fast_on_invalid: false,
        }
    }
}

fn config_error(message: impl Into<String>, key: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.into()),
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_true() -> bool {
    true
}

fn default_backoff_cap() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_visibility_policy() -> PollPolicy {
    PollPolicy::exponential(10, Duration::from_secs(30), default_backoff_cap())
}

fn default_processing_policy() -> PollPolicy {
    PollPolicy::exponential(10, Duration::from_secs(30), default_backoff_cap())
}

fn default_lookup_policy() -> PollPolicy {
    PollPolicy::fixed(20, Duration::from_secs(30))
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
