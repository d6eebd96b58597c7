use clap::{Parser, Subcommand};
use log::{error, info, warn};

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use atvlink::atv::bridge::PyatvBridge;
use atvlink::atv::Session;
use atvlink::config::Config;
use atvlink::connect;
use atvlink::constants::{
    CREDENTIALS_FILE_NAME, DEFAULT_POWER_OFF_STABLE_AFTER, DEFAULT_SCAN_TIMEOUT,
};
use atvlink::error::Error;
use atvlink::listeners::{
    ConnectionLogger, FocusLogger, PlaybackLogger, PowerWatcher, VolumeLogger,
};
use atvlink::pair;
use atvlink::prompt::Prompt;
use atvlink::store::CredentialStore;
use atvlink::webhook::WebhookPublisher;

#[derive(Parser)]
#[command(
    name = "atvlink",
    about = "Discover, pair with, and monitor Apple TV devices on the local network",
    version
)]
struct Cli {
    /// Seconds to scan the network for devices
    #[arg(long, env = "SCAN_TIMEOUT_SECONDS", default_value_t = DEFAULT_SCAN_TIMEOUT)]
    scan_timeout: u64,

    /// Seconds after the most recent On update required for treating an Off
    /// update as stable
    #[arg(long, env = "POWER_OFF_STABLE_AFTER_SECONDS", default_value_t = DEFAULT_POWER_OFF_STABLE_AFTER)]
    power_off_stable_after: u64,

    /// IFTTT Webhooks API key; leave unset to disable webhook publishing
    #[arg(long, env = "IFTTT_API_KEY")]
    ifttt_api_key: Option<String>,

    /// Path of the credentials file
    #[arg(long, default_value = CREDENTIALS_FILE_NAME)]
    credentials_file: PathBuf,

    /// pyatv helper used for scanning and the event stream
    #[arg(long, default_value = "atvscript")]
    atvscript: String,

    /// pyatv helper used for pairing and one-shot queries
    #[arg(long, default_value = "atvremote")]
    atvremote: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to an Apple TV, watch its state, and publish stable power
    /// transitions (the default)
    Connect,
    /// Run the pairing flow for one or more Apple TVs without connecting
    Pair,
}

#[tokio::main]
async fn main() {
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();
    let config = Config {
        scan_timeout: Duration::from_secs(cli.scan_timeout),
        power_off_stable_after: cli.power_off_stable_after,
        ifttt_api_key: cli.ifttt_api_key.filter(|key| !key.is_empty()),
    };
    let store = CredentialStore::new(cli.credentials_file);
    let backend = PyatvBridge::with_commands(cli.atvscript, cli.atvremote);

    let code = match cli.command.unwrap_or(Command::Connect) {
        Command::Connect => run_connect(&backend, &store, &config).await,
        Command::Pair => run_pair(&backend, &store, &config).await,
    };
    process::exit(code);
}

async fn run_connect(backend: &PyatvBridge, store: &CredentialStore, config: &Config) -> i32 {
    let mut prompt = Prompt::new();
    let flow = connect::connect_device(backend, store, &mut prompt, config);
    let mut session = tokio::select! {
        result = flow => match result {
            Ok(Some(session)) => session,
            Ok(None) => return 1,
            Err(Error::NoDevices) => {
                error!("{}", Error::NoDevices);
                return 1;
            }
            Err(e) => {
                error!("An error was thrown in the connect flow! Details: {}", e);
                return 1;
            }
        },
        _ = tokio::signal::ctrl_c() => {
            println!();
            info!("Interrupted, exiting...");
            return 130;
        }
    };

    session.set_device_listener(Box::new(ConnectionLogger::new()));
    session.set_power_listener(Box::new(PowerWatcher::new(
        session.power_state(),
        WebhookPublisher::new(config.ifttt_api_key.clone()),
        config.power_off_stable_after,
    )));
    session.set_audio_listener(Box::new(VolumeLogger::new()));
    session.set_keyboard_listener(Box::new(FocusLogger::new()));
    session.set_push_listener(Box::new(PlaybackLogger::new()));
    info!("Successfully added listeners!");

    wait_for_exit().await;

    info!("Closing connection and exiting...");
    if let Err(e) = session.close().await {
        warn!("Failed to close session cleanly: {}", e);
    }
    0
}

async fn run_pair(backend: &PyatvBridge, store: &CredentialStore, config: &Config) -> i32 {
    let mut prompt = Prompt::new();
    let flow = pair::pair_devices(backend, store, &mut prompt, config);
    tokio::select! {
        result = flow => match result {
            Ok(()) => 0,
            Err(Error::NoDevices) => {
                error!("{}", Error::NoDevices);
                1
            }
            Err(e) => {
                error!("An error was thrown in the pairing flow! Details: {}", e);
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            println!();
            info!("Interrupted, exiting...");
            130
        }
    }
}

#[cfg(unix)]
async fn wait_for_exit() {
    use tokio::signal::unix::{signal, SignalKind};

    info!("Press Ctrl+C to close connection and exit");
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Could not install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
    println!();
}

#[cfg(not(unix))]
async fn wait_for_exit() {
    use tokio::io::{AsyncBufReadExt, BufReader};

    info!("Type \"exit\" to close connection and exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim() == "exit" => break,
                Ok(Some(_)) => info!("Type \"exit\" to close connection and exit"),
                _ => break,
            }
        }
    }
}
