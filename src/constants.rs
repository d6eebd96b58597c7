/// Filename of the credentials JSON file, relative to the working directory.
///
/// If you change this, be sure to add the new filename to your VCS ignore
/// list to avoid committing your credentials.
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// Reserved credentials key storing the MAC address of the device that was
/// most recently connected successfully.
pub const LAST_CONNECTED_KEY: &str = "_last_connected";

/// Default number of seconds to scan the network for devices.
pub const DEFAULT_SCAN_TIMEOUT: u64 = 5;

/// Default number of seconds after the most recent On update required for
/// treating an Off update as stable.
pub const DEFAULT_POWER_OFF_STABLE_AFTER: u64 = 20;

/// Base URL for IFTTT Webhooks integrations (see: https://ifttt.com/maker_webhooks).
pub const IFTTT_ENDPOINT: &str = "https://maker.ifttt.com";

/// Webhook event published on a stable power-on transition.
pub const POWER_ON_EVENT: &str = "atv_power_on";

/// Webhook event published on a stable power-off transition.
pub const POWER_OFF_EVENT: &str = "atv_power_off";

/// Upper bound on scan-pair-rescan rounds before the connect flow gives up.
pub const MAX_PAIRING_ROUNDS: usize = 3;
