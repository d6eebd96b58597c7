use std::time::Duration;

use crate::constants::{DEFAULT_POWER_OFF_STABLE_AFTER, DEFAULT_SCAN_TIMEOUT};

/// Runtime options recognized by the flows
///
/// The binary populates this from CLI flags with environment-variable
/// fallbacks (`SCAN_TIMEOUT_SECONDS`, `POWER_OFF_STABLE_AFTER_SECONDS`,
/// `IFTTT_API_KEY`).
#[derive(Debug, Clone)]
pub struct Config {
    /// How long to scan the network for devices
    pub scan_timeout: Duration,
    /// Seconds after the most recent On update required for treating an Off
    /// update as stable
    pub power_off_stable_after: u64,
    /// IFTTT Webhooks API key; `None` disables webhook publishing
    pub ifttt_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan_timeout: Duration::from_secs(DEFAULT_SCAN_TIMEOUT),
            power_off_stable_after: DEFAULT_POWER_OFF_STABLE_AFTER,
            ifttt_api_key: None,
        }
    }
}
