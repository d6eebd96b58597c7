//! Contract with the external protocol implementation.
//!
//! Everything protocol-shaped (scanning the network, pairing handshakes,
//! encrypted sessions, push notifications) happens behind the traits in this
//! module. The production implementation is [`bridge::PyatvBridge`], which
//! drives the pyatv command-line helpers; the test suite substitutes scripted
//! fakes.

use async_trait::async_trait;
use serde::Deserialize;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub mod bridge;

/// Wire protocols an Apple TV may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Mrp,
    Dmap,
    AirPlay,
    Companion,
    Raop,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Mrp,
        Protocol::Dmap,
        Protocol::AirPlay,
        Protocol::Companion,
        Protocol::Raop,
    ];

    /// Canonical name, as used for credential-file keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mrp => "MRP",
            Self::Dmap => "DMAP",
            Self::AirPlay => "AirPlay",
            Self::Companion => "Companion",
            Self::Raop => "RAOP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mrp" => Ok(Self::Mrp),
            "dmap" => Ok(Self::Dmap),
            "airplay" => Ok(Self::AirPlay),
            "companion" => Ok(Self::Companion),
            "raop" => Ok(Self::Raop),
            other => Err(Error::Other(format!("Unknown protocol: '{}'", other))),
        }
    }
}

/// Operating-system classification reported by discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingSystem {
    TvOs,
    Legacy,
    AirPortOs,
    MacOs,
    Unknown,
}

impl OperatingSystem {
    pub(crate) fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "tvos" => Self::TvOs,
            "legacy" => Self::Legacy,
            "airportos" => Self::AirPortOs,
            "macos" => Self::MacOs,
            _ => Self::Unknown,
        }
    }
}

/// Power state of a connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "On"),
            Self::Off => write!(f, "Off"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Keyboard focus state of a connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    Focused,
    Unfocused,
    Unknown,
}

impl fmt::Display for FocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Focused => write!(f, "Focused"),
            Self::Unfocused => write!(f, "Unfocused"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One protocol service exposed by a discovered device
#[derive(Debug, Clone)]
pub struct Service {
    pub protocol: Protocol,
    pub enabled: bool,
}

/// A device found by network discovery
///
/// Candidates are transient: they live for one discovery call and are never
/// persisted. The MAC address is the durable identifier that ties a candidate
/// back to stored credentials.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub mac: String,
    pub address: Option<String>,
    pub os: OperatingSystem,
    pub services: Vec<Service>,
}

impl Candidate {
    /// Summary string with the key details about this device
    pub fn summary(&self) -> String {
        format!("{} ({})", self.name, self.mac)
    }

    /// Whether this device belongs to the target device class
    pub fn is_apple_tv(&self) -> bool {
        self.os == OperatingSystem::TvOs
    }
}

/// Currently-playing metadata delivered with a push update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Playing {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub device_state: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default)]
    pub total_time: Option<u64>,
}

impl fmt::Display for Playing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.device_state.as_deref().unwrap_or("idle"),
            self.media_type.as_deref().unwrap_or("unknown"),
            self.title.as_deref().unwrap_or("<no title>"),
        )?;
        if let (Some(position), Some(total)) = (self.position, self.total_time) {
            write!(f, " ({}/{}s)", position, total)?;
        }
        if let Some(app) = &self.app {
            write!(f, " via {}", app)?;
        }
        Ok(())
    }
}

/// Observer of device connectivity notifications
pub trait DeviceListener: Send {
    fn connection_lost(&mut self, cause: &str);
    fn connection_closed(&mut self);
}

/// Observer of power-state notifications
pub trait PowerListener: Send {
    fn powerstate_update(&mut self, old_state: PowerState, new_state: PowerState);
}

/// Observer of audio notifications
pub trait AudioListener: Send {
    fn volume_update(&mut self, old_level: f32, new_level: f32);
    fn outputdevices_update(&mut self, old_devices: &[String], new_devices: &[String]);
}

/// Observer of keyboard focus notifications
pub trait KeyboardListener: Send {
    fn focusstate_update(&mut self, old_state: FocusState, new_state: FocusState);
}

/// Observer of playback push updates
pub trait PushListener: Send {
    fn playstatus_update(&mut self, playing: &Playing);
    fn playstatus_error(&mut self, error: &str);
}

/// One pairing handshake for a single (device, protocol) pair
///
/// The expected call order is `begin`, optionally `pin`, `finish`, then
/// `close`. `close` must be called whether or not the handshake succeeded.
#[async_trait]
pub trait Pairing: Send {
    async fn begin(&mut self) -> Result<()>;

    /// Whether the device displays the PIN (operator types it here), as
    /// opposed to this side generating one for the operator to enter on the
    /// device
    fn device_provides_pin(&self) -> bool;

    async fn pin(&mut self, pin: &str) -> Result<()>;

    async fn finish(&mut self) -> Result<()>;

    /// Whether `finish` reported a successful pairing
    fn has_paired(&self) -> bool;

    /// Credential blob produced by a successful pairing
    fn credentials(&self) -> Option<String>;

    async fn close(&mut self) -> Result<()>;
}

/// A live connection to one device
#[async_trait]
pub trait Session: Send {
    /// Most recently observed power state
    fn power_state(&self) -> PowerState;

    fn set_device_listener(&mut self, listener: Box<dyn DeviceListener>);
    fn set_power_listener(&mut self, listener: Box<dyn PowerListener>);
    fn set_audio_listener(&mut self, listener: Box<dyn AudioListener>);
    fn set_keyboard_listener(&mut self, listener: Box<dyn KeyboardListener>);
    fn set_push_listener(&mut self, listener: Box<dyn PushListener>);

    /// Tear the connection down, releasing any underlying resources
    async fn close(&mut self) -> Result<()>;
}

/// The external protocol implementation: discovery, pairing, connection
#[async_trait]
pub trait Backend {
    type Pairing: Pairing;
    type Session: Session;

    /// Scan the network for devices, waiting up to `timeout`
    async fn scan(&self, timeout: Duration) -> Result<Vec<Candidate>>;

    /// Start a pairing handshake for one of the device's protocols
    async fn pair(&self, device: &Candidate, protocol: Protocol) -> Result<Self::Pairing>;

    /// Establish a session with the device, applying the given
    /// protocol-name-to-credential map
    async fn connect(
        &self,
        device: &Candidate,
        credentials: &BTreeMap<String, String>,
    ) -> Result<Self::Session>;
}
