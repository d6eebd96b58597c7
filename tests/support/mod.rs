#![allow(dead_code)]

//! Scripted stand-ins for the protocol backend and the operator, letting the
//! flows run end-to-end without a network, a device, or a terminal.

use async_trait::async_trait;
use tokio::io::BufReader;

use atvlink::atv::{
    AudioListener, Backend, Candidate, DeviceListener, KeyboardListener, OperatingSystem,
    Pairing, PowerListener, PowerState, Protocol, PushListener, Service, Session,
};
use atvlink::error::{Error, Result};
use atvlink::prompt::Prompt;
use atvlink::store::CredentialStore;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared record of everything the flows asked the backend to do
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count_of(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn position_of(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Scripted outcome for one (device, protocol) handshake
#[derive(Debug, Clone)]
pub struct PairPlan {
    pub succeed: bool,
    pub device_provides_pin: bool,
    pub credentials: &'static str,
}

impl Default for PairPlan {
    fn default() -> Self {
        PairPlan {
            succeed: true,
            device_provides_pin: true,
            credentials: "fake-credentials",
        }
    }
}

pub struct FakeBackend {
    scans: Mutex<VecDeque<Vec<Candidate>>>,
    pair_plans: Mutex<HashMap<(String, Protocol), PairPlan>>,
    connect_fails: bool,
    pub log: CallLog,
    pub pins: Arc<Mutex<Vec<String>>>,
}

impl FakeBackend {
    /// Backend whose scans pop from the given list, repeating the final one
    pub fn new(scans: Vec<Vec<Candidate>>) -> Self {
        FakeBackend {
            scans: Mutex::new(scans.into()),
            pair_plans: Mutex::default(),
            connect_fails: false,
            log: CallLog::default(),
            pins: Arc::default(),
        }
    }

    pub fn failing_connect(mut self) -> Self {
        self.connect_fails = true;
        self
    }

    pub fn plan_pair(self, mac: &str, protocol: Protocol, plan: PairPlan) -> Self {
        self.pair_plans
            .lock()
            .unwrap()
            .insert((mac.to_string(), protocol), plan);
        self
    }

    pub fn submitted_pins(&self) -> Vec<String> {
        self.pins.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    type Pairing = FakePairing;
    type Session = FakeSession;

    async fn scan(&self, _timeout: Duration) -> Result<Vec<Candidate>> {
        self.log.push("scan".to_string());
        let mut scans = self.scans.lock().unwrap();
        let result = if scans.len() > 1 {
            scans.pop_front().unwrap_or_default()
        } else {
            scans.front().cloned().unwrap_or_default()
        };
        Ok(result)
    }

    async fn pair(&self, device: &Candidate, protocol: Protocol) -> Result<FakePairing> {
        let key = format!("{}:{}", device.mac, protocol);
        self.log.push(format!("pair:{}", key));
        let plan = self
            .pair_plans
            .lock()
            .unwrap()
            .get(&(device.mac.clone(), protocol))
            .cloned()
            .unwrap_or_default();
        Ok(FakePairing {
            plan,
            key,
            log: self.log.clone(),
            pins: Arc::clone(&self.pins),
            paired: false,
        })
    }

    async fn connect(
        &self,
        device: &Candidate,
        credentials: &BTreeMap<String, String>,
    ) -> Result<FakeSession> {
        let creds: Vec<String> = credentials
            .iter()
            .map(|(name, blob)| format!("{}={}", name, blob))
            .collect();
        self.log
            .push(format!("connect:{}:[{}]", device.mac, creds.join(",")));
        if self.connect_fails {
            return Err(Error::Other("simulated connection failure".to_string()));
        }
        Ok(FakeSession {
            log: self.log.clone(),
        })
    }
}

pub struct FakePairing {
    plan: PairPlan,
    key: String,
    log: CallLog,
    pins: Arc<Mutex<Vec<String>>>,
    paired: bool,
}

#[async_trait]
impl Pairing for FakePairing {
    async fn begin(&mut self) -> Result<()> {
        self.log.push(format!("begin:{}", self.key));
        Ok(())
    }

    fn device_provides_pin(&self) -> bool {
        self.plan.device_provides_pin
    }

    async fn pin(&mut self, pin: &str) -> Result<()> {
        self.pins.lock().unwrap().push(pin.to_string());
        self.log.push(format!("pin:{}", self.key));
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.paired = self.plan.succeed;
        self.log.push(format!("finish:{}", self.key));
        Ok(())
    }

    fn has_paired(&self) -> bool {
        self.paired
    }

    fn credentials(&self) -> Option<String> {
        self.paired.then(|| self.plan.credentials.to_string())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.push(format!("close:{}", self.key));
        Ok(())
    }
}

pub struct FakeSession {
    log: CallLog,
}

#[async_trait]
impl Session for FakeSession {
    fn power_state(&self) -> PowerState {
        PowerState::Unknown
    }

    fn set_device_listener(&mut self, _listener: Box<dyn DeviceListener>) {}
    fn set_power_listener(&mut self, _listener: Box<dyn PowerListener>) {}
    fn set_audio_listener(&mut self, _listener: Box<dyn AudioListener>) {}
    fn set_keyboard_listener(&mut self, _listener: Box<dyn KeyboardListener>) {}
    fn set_push_listener(&mut self, _listener: Box<dyn PushListener>) {}

    async fn close(&mut self) -> Result<()> {
        self.log.push("session_close".to_string());
        Ok(())
    }
}

pub fn candidate(name: &str, mac: &str, services: &[(Protocol, bool)]) -> Candidate {
    Candidate {
        name: name.to_string(),
        mac: mac.to_string(),
        address: None,
        os: OperatingSystem::TvOs,
        services: services
            .iter()
            .map(|(protocol, enabled)| Service {
                protocol: *protocol,
                enabled: *enabled,
            })
            .collect(),
    }
}

pub fn non_apple_tv(name: &str, mac: &str) -> Candidate {
    Candidate {
        os: OperatingSystem::MacOs,
        ..candidate(name, mac, &[])
    }
}

/// Operator answering from a canned script
pub fn scripted(input: &'static str) -> Prompt<BufReader<&'static [u8]>> {
    Prompt::from_reader(BufReader::new(input.as_bytes()))
}

pub fn temp_store() -> (tempfile::TempDir, CredentialStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path().join("credentials.json"));
    (dir, store)
}
