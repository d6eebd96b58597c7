use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::atv::Protocol;
use crate::error::Result;

/// Full contents of the credentials file
///
/// Top-level keys are device MAC addresses mapping protocol names to opaque
/// credential blobs, plus the reserved `_last_connected` key. Protocol names
/// that this build does not recognize are carried through untouched so a
/// newer credential file survives a read-modify-write cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(rename = "_last_connected", default, skip_serializing_if = "Option::is_none")]
    last_connected: Option<String>,
    #[serde(flatten)]
    devices: BTreeMap<String, BTreeMap<String, String>>,
}

impl CredentialRecord {
    /// MAC address of the most recently connected device, if recorded.
    ///
    /// The value may be stale: nothing guarantees the device is still
    /// discoverable, or even still present as a key in this record.
    pub fn last_connected(&self) -> Option<&str> {
        self.last_connected.as_deref()
    }

    /// Protocol-to-credential map for the given device
    pub fn credentials(&self, mac: &str) -> Option<&BTreeMap<String, String>> {
        self.devices.get(mac)
    }

    /// Whether the given device has any entry in the record
    pub fn is_paired(&self, mac: &str) -> bool {
        self.devices.contains_key(mac)
    }
}

/// Persistent store of per-device, per-protocol pairing credentials
///
/// Every operation reads the whole file and every mutation rewrites it in
/// full. There is no locking: concurrent writers race and the last one wins.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        CredentialStore { path: path.into() }
    }

    /// Read the full record, treating a missing or unparseable file as empty
    pub fn read(&self) -> CredentialRecord {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => CredentialRecord::default(),
        }
    }

    /// Overwrite the persisted record entirely
    pub fn write(&self, record: &CredentialRecord) -> Result<()> {
        let contents = serde_json::to_string_pretty(record)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Protocol-to-credential map for the given device, or `None` if the
    /// device has never been paired
    pub fn get_credentials(&self, mac: &str) -> Option<BTreeMap<String, String>> {
        self.read().credentials(mac).cloned()
    }

    /// Add or update one protocol credential for the given device
    pub fn save_credential(&self, mac: &str, protocol: Protocol, blob: &str) -> Result<()> {
        let mut record = self.read();
        record
            .devices
            .entry(mac.to_string())
            .or_default()
            .insert(protocol.to_string(), blob.to_string());
        self.write(&record)
    }

    /// Record the given device as the most recently connected one
    pub fn save_last_connected(&self, mac: &str) -> Result<()> {
        let mut record = self.read();
        record.last_connected = Some(mac.to_string());
        self.write(&record)
    }
}
