//! Backend implementation driving the pyatv command-line helpers.
//!
//! `atvscript` handles scanning and the connected event stream, `atvremote`
//! handles pairing and one-shot queries. Both run as child processes; this
//! module only launches them, feeds PINs on stdin, and parses their output.

use async_trait::async_trait;
use log::{debug, error, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use std::collections::BTreeMap;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    AudioListener, Backend, Candidate, DeviceListener, FocusState, KeyboardListener,
    OperatingSystem, Pairing, Playing, PowerListener, PowerState, Protocol, PushListener,
    Service, Session,
};
use crate::error::{Error, Result};

const SUCCESS_MARKER: &str = "seems to have succeeded";
const CREDENTIALS_MARKER: &str = "credentials:";

/// Protocol implementation backed by the pyatv helper executables
#[derive(Debug, Clone)]
pub struct PyatvBridge {
    atvscript: String,
    atvremote: String,
}

impl PyatvBridge {
    /// Bridge using `atvscript` and `atvremote` from `PATH`
    pub fn new() -> Self {
        Self::with_commands("atvscript", "atvremote")
    }

    /// Bridge using explicit helper commands
    pub fn with_commands<S: Into<String>>(atvscript: S, atvremote: S) -> Self {
        PyatvBridge {
            atvscript: atvscript.into(),
            atvremote: atvremote.into(),
        }
    }

    async fn run_helper(&self, program: &str, args: &[String]) -> Result<String> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Helper(format!("Failed to launch {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Helper(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn query_power_state(&self, mac: &str) -> Result<PowerState> {
        let args = vec!["--id".to_string(), mac.to_string(), "power_state".to_string()];
        let output = self.run_helper(&self.atvremote, &args).await?;
        Ok(parse_power_text(output.trim()))
    }
}

impl Default for PyatvBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for PyatvBridge {
    type Pairing = BridgePairing;
    type Session = BridgeSession;

    async fn scan(&self, timeout: Duration) -> Result<Vec<Candidate>> {
        let args = vec![
            "--scan-timeout".to_string(),
            timeout.as_secs().max(1).to_string(),
            "scan".to_string(),
        ];
        let raw = self.run_helper(&self.atvscript, &args).await?;
        parse_scan(&raw)
    }

    async fn pair(&self, device: &Candidate, protocol: Protocol) -> Result<BridgePairing> {
        Ok(BridgePairing {
            program: self.atvremote.clone(),
            args: vec![
                "--id".to_string(),
                device.mac.clone(),
                "--protocol".to_string(),
                protocol.as_str().to_ascii_lowercase(),
                "pair".to_string(),
            ],
            protocol,
            child: None,
            stdin: None,
            has_paired: false,
            credentials: None,
        })
    }

    async fn connect(
        &self,
        device: &Candidate,
        credentials: &BTreeMap<String, String>,
    ) -> Result<BridgeSession> {
        // Seed the session's power state; the stream only carries changes
        let initial = match self.query_power_state(&device.mac).await {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Could not query initial power state for {}: {}",
                    device.summary(),
                    e
                );
                PowerState::Unknown
            }
        };

        let mut args = vec!["--id".to_string(), device.mac.clone()];
        for (name, blob) in credentials {
            match Protocol::from_str(name) {
                Ok(protocol) => {
                    args.push(credential_flag(protocol).to_string());
                    args.push(blob.clone());
                }
                Err(_) => warn!("Ignoring stored credentials for unknown protocol '{}'", name),
            }
        }
        args.push("push_updates".to_string());

        let mut child = Command::new(&self.atvscript)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Helper(format!("Failed to launch {}: {}", self.atvscript, e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Helper("Event stream has no stdout handle".to_string()))?;

        let shared = Arc::new(SessionShared {
            power: Mutex::new(initial),
            listeners: Mutex::new(ListenerSet::default()),
            closing: AtomicBool::new(false),
        });
        let reader = tokio::spawn(read_events(stdout, Arc::clone(&shared)));

        Ok(BridgeSession {
            child: Some(child),
            reader: Some(reader),
            shared,
        })
    }
}

fn credential_flag(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Mrp => "--mrp-credentials",
        Protocol::Dmap => "--dmap-credentials",
        Protocol::AirPlay => "--airplay-credentials",
        Protocol::Companion => "--companion-credentials",
        Protocol::Raop => "--raop-credentials",
    }
}

#[derive(Deserialize)]
struct ScanOutput {
    result: String,
    #[serde(default)]
    devices: Vec<ScanDevice>,
}

#[derive(Deserialize)]
struct ScanDevice {
    name: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    device_info: Option<ScanDeviceInfo>,
    #[serde(default)]
    services: Vec<ScanService>,
}

#[derive(Deserialize)]
struct ScanDeviceInfo {
    #[serde(default)]
    mac: Option<String>,
    #[serde(default)]
    operating_system: Option<String>,
}

#[derive(Deserialize)]
struct ScanService {
    protocol: String,
    #[serde(default = "enabled_default")]
    enabled: bool,
}

fn enabled_default() -> bool {
    true
}

fn parse_scan(raw: &str) -> Result<Vec<Candidate>> {
    let output: ScanOutput = serde_json::from_str(raw)?;
    if output.result != "success" {
        return Err(Error::Helper(format!(
            "Scan helper reported result '{}'",
            output.result
        )));
    }

    let mut candidates = Vec::new();
    for device in output.devices {
        let info = device.device_info.unwrap_or(ScanDeviceInfo {
            mac: None,
            operating_system: None,
        });
        let mac = match info.mac {
            Some(mac) if !mac.is_empty() => mac,
            _ => {
                warn!("Skipping device '{}' with no MAC address", device.name);
                continue;
            }
        };
        let services = device
            .services
            .iter()
            .filter_map(|service| match Protocol::from_str(&service.protocol) {
                Ok(protocol) => Some(Service {
                    protocol,
                    enabled: service.enabled,
                }),
                Err(_) => {
                    debug!(
                        "Skipping unknown protocol '{}' on '{}'",
                        service.protocol, device.name
                    );
                    None
                }
            })
            .collect();
        candidates.push(Candidate {
            name: device.name,
            mac,
            address: device.address,
            os: OperatingSystem::parse(info.operating_system.as_deref().unwrap_or("")),
            services,
        });
    }
    Ok(candidates)
}

/// One `atvremote ... pair` run, phased into the handshake contract
///
/// `begin` launches the helper (the device enters pairing mode), `pin` writes
/// a line to its stdin, `finish` drains its output and extracts the verdict,
/// `close` reaps the process if it is still alive.
pub struct BridgePairing {
    program: String,
    args: Vec<String>,
    protocol: Protocol,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    has_paired: bool,
    credentials: Option<String>,
}

#[async_trait]
impl Pairing for BridgePairing {
    async fn begin(&mut self) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Helper(format!("Failed to launch {}: {}", self.program, e)))?;
        self.stdin = child.stdin.take();
        self.child = Some(child);
        Ok(())
    }

    fn device_provides_pin(&self) -> bool {
        // DMAP is the one protocol where this side generates the PIN and the
        // operator enters it on the device
        !matches!(self.protocol, Protocol::Dmap)
    }

    async fn pin(&mut self, pin: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Helper("Pairing has not begun".to_string()))?;
        stdin.write_all(pin.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| Error::Helper("Pairing has not begun".to_string()))?;
        // Closing stdin unblocks a helper still waiting for input
        self.stdin.take();

        let mut output = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout.read_to_string(&mut output).await?;
        }
        let status = child.wait().await?;

        let (succeeded, credentials) = parse_pair_output(&output);
        self.has_paired = succeeded && status.success();
        self.credentials = credentials;
        if !self.has_paired && !output.trim().is_empty() {
            debug!("Pairing helper output: {}", output.trim());
        }
        Ok(())
    }

    fn has_paired(&self) -> bool {
        self.has_paired
    }

    fn credentials(&self) -> Option<String> {
        self.credentials.clone()
    }

    async fn close(&mut self) -> Result<()> {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            // Err here means the helper already exited on its own
            let _ = child.kill().await;
        }
        Ok(())
    }
}

fn parse_pair_output(output: &str) -> (bool, Option<String>) {
    let succeeded = output.to_ascii_lowercase().contains(SUCCESS_MARKER);
    let credentials = output
        .lines()
        .find_map(|line| {
            line.to_ascii_lowercase()
                .find(CREDENTIALS_MARKER)
                .map(|idx| line[idx + CREDENTIALS_MARKER.len()..].trim().to_string())
        })
        .filter(|credentials| !credentials.is_empty());
    (succeeded, credentials)
}

#[derive(Default)]
struct ListenerSet {
    device: Option<Box<dyn DeviceListener>>,
    power: Option<Box<dyn PowerListener>>,
    audio: Option<Box<dyn AudioListener>>,
    keyboard: Option<Box<dyn KeyboardListener>>,
    push: Option<Box<dyn PushListener>>,
}

struct SessionShared {
    power: Mutex<PowerState>,
    listeners: Mutex<ListenerSet>,
    closing: AtomicBool,
}

/// Live connection fed by an `atvscript ... push_updates` event stream
pub struct BridgeSession {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    shared: Arc<SessionShared>,
}

#[async_trait]
impl Session for BridgeSession {
    fn power_state(&self) -> PowerState {
        *self.shared.power.lock().unwrap()
    }

    fn set_device_listener(&mut self, listener: Box<dyn DeviceListener>) {
        self.shared.listeners.lock().unwrap().device = Some(listener);
    }

    fn set_power_listener(&mut self, listener: Box<dyn PowerListener>) {
        self.shared.listeners.lock().unwrap().power = Some(listener);
    }

    fn set_audio_listener(&mut self, listener: Box<dyn AudioListener>) {
        self.shared.listeners.lock().unwrap().audio = Some(listener);
    }

    fn set_keyboard_listener(&mut self, listener: Box<dyn KeyboardListener>) {
        self.shared.listeners.lock().unwrap().keyboard = Some(listener);
    }

    fn set_push_listener(&mut self, listener: Box<dyn PushListener>) {
        self.shared.listeners.lock().unwrap().push = Some(listener);
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.closing.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        Ok(())
    }
}

enum BridgeEvent {
    Power(PowerState),
    Volume(f32),
    OutputDevices(Vec<String>),
    Focus(FocusState),
    Play(Playing),
    Failure(String),
}

fn parse_event(line: &str) -> Option<BridgeEvent> {
    let value: Value = serde_json::from_str(line).ok()?;
    if let Some(exception) = value.get("exception").and_then(Value::as_str) {
        return Some(BridgeEvent::Failure(exception.to_string()));
    }
    // Playstatus lines carry media fields; check them before power_state so a
    // combined line is not misrouted
    if value.get("media_type").is_some() || value.get("device_state").is_some() {
        return serde_json::from_value(value).ok().map(BridgeEvent::Play);
    }
    if let Some(state) = value.get("power_state").and_then(Value::as_str) {
        return Some(BridgeEvent::Power(parse_power_text(state)));
    }
    if let Some(devices) = value.get("output_devices").and_then(Value::as_array) {
        let names = devices
            .iter()
            .filter_map(|device| {
                device
                    .get("name")
                    .and_then(Value::as_str)
                    .or_else(|| device.as_str())
                    .map(str::to_string)
            })
            .collect();
        return Some(BridgeEvent::OutputDevices(names));
    }
    if let Some(volume) = value.get("volume").and_then(Value::as_f64) {
        return Some(BridgeEvent::Volume(volume as f32));
    }
    if let Some(focus) = value.get("focus_state").and_then(Value::as_str) {
        return Some(BridgeEvent::Focus(parse_focus_text(focus)));
    }
    None
}

fn parse_power_text(s: &str) -> PowerState {
    // Helpers print either bare names or "PowerState.On"
    let name = s.trim().rsplit('.').next().unwrap_or(s);
    match name.to_ascii_lowercase().as_str() {
        "on" => PowerState::On,
        "off" => PowerState::Off,
        _ => PowerState::Unknown,
    }
}

fn parse_focus_text(s: &str) -> FocusState {
    let name = s.trim().rsplit('.').next().unwrap_or(s);
    match name.to_ascii_lowercase().as_str() {
        "focused" => FocusState::Focused,
        "unfocused" => FocusState::Unfocused,
        _ => FocusState::Unknown,
    }
}

async fn read_events(stdout: ChildStdout, shared: Arc<SessionShared>) {
    let mut lines = BufReader::new(stdout).lines();
    let mut volume: f32 = 0.0;
    let mut output_devices: Vec<String> = Vec::new();
    let mut focus = FocusState::Unknown;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let mut listeners = shared.listeners.lock().unwrap();
                match parse_event(line) {
                    Some(BridgeEvent::Power(new_state)) => {
                        let old_state =
                            std::mem::replace(&mut *shared.power.lock().unwrap(), new_state);
                        if let Some(listener) = listeners.power.as_mut() {
                            listener.powerstate_update(old_state, new_state);
                        }
                    }
                    Some(BridgeEvent::Volume(new_level)) => {
                        if let Some(listener) = listeners.audio.as_mut() {
                            listener.volume_update(volume, new_level);
                        }
                        volume = new_level;
                    }
                    Some(BridgeEvent::OutputDevices(devices)) => {
                        if let Some(listener) = listeners.audio.as_mut() {
                            listener.outputdevices_update(&output_devices, &devices);
                        }
                        output_devices = devices;
                    }
                    Some(BridgeEvent::Focus(new_state)) => {
                        if let Some(listener) = listeners.keyboard.as_mut() {
                            listener.focusstate_update(focus, new_state);
                        }
                        focus = new_state;
                    }
                    Some(BridgeEvent::Play(playing)) => {
                        if let Some(listener) = listeners.push.as_mut() {
                            listener.playstatus_update(&playing);
                        }
                    }
                    Some(BridgeEvent::Failure(exception)) => {
                        if let Some(listener) = listeners.push.as_mut() {
                            listener.playstatus_error(&exception);
                        }
                    }
                    None => debug!("Unrecognized event line: {}", line),
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Failed reading event stream: {}", e);
                break;
            }
        }
    }

    let mut listeners = shared.listeners.lock().unwrap();
    if let Some(listener) = listeners.device.as_mut() {
        if shared.closing.load(Ordering::SeqCst) {
            listener.connection_closed();
        } else {
            listener.connection_lost("event stream ended unexpectedly");
        }
    }
}
