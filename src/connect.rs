use log::{error, info};
use tokio::io::AsyncBufRead;

use crate::atv::{Backend, Candidate};
use crate::config::Config;
use crate::constants::MAX_PAIRING_ROUNDS;
use crate::error::{Error, Result};
use crate::pair;
use crate::prompt::Prompt;
use crate::store::CredentialStore;

pub(crate) fn s_if_plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Scan the network and keep only Apple TVs
///
/// Zero Apple TVs is a fatal condition for every flow, reported as
/// [`Error::NoDevices`].
pub async fn discover<B: Backend>(backend: &B, config: &Config) -> Result<Vec<Candidate>> {
    info!("Discovering devices on network...");
    let devices = backend.scan(config.scan_timeout).await?;
    let apple_tvs: Vec<Candidate> = devices
        .iter()
        .filter(|device| device.is_apple_tv())
        .cloned()
        .collect();

    info!(
        "Found {} device{}, including {} Apple TV{}, on network",
        devices.len(),
        s_if_plural(devices.len()),
        apple_tvs.len(),
        s_if_plural(apple_tvs.len()),
    );

    if apple_tvs.is_empty() {
        return Err(Error::NoDevices);
    }
    Ok(apple_tvs)
}

/// Select one Apple TV, pair it if needed, and establish a session
///
/// Selection order when the operator is not asked (single candidate) or as
/// the prompt's pre-selected default: the last-connected device if it is
/// still discoverable, else the first already-paired candidate, else the
/// first candidate. Pairing a previously unpaired choice restarts the whole
/// procedure with a fresh scan so the new credentials are picked up; after
/// [`MAX_PAIRING_ROUNDS`] fruitless rounds the flow gives up rather than
/// looping forever.
///
/// Session establishment failure is not an error here: it returns `Ok(None)`
/// and the caller decides how to proceed.
pub async fn connect_device<B, R>(
    backend: &B,
    store: &CredentialStore,
    prompt: &mut Prompt<R>,
    config: &Config,
) -> Result<Option<B::Session>>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
{
    for _ in 0..MAX_PAIRING_ROUNDS {
        let candidates = discover(backend, config).await?;
        let record = store.read();

        let paired: Vec<bool> = candidates
            .iter()
            .map(|candidate| record.is_paired(&candidate.mac))
            .collect();
        let summaries: Vec<String> = candidates
            .iter()
            .zip(&paired)
            .map(|(candidate, is_paired)| {
                format!(
                    "{}{}",
                    candidate.summary(),
                    if *is_paired { " - paired" } else { "" }
                )
            })
            .collect();

        let default = record
            .last_connected()
            .and_then(|last| candidates.iter().position(|c| c.mac == last))
            .or_else(|| paired.iter().position(|is_paired| *is_paired))
            .unwrap_or(0);

        let choice = if candidates.len() > 1 {
            prompt
                .select(
                    "Which Apple TV would you like to connect to?",
                    &summaries,
                    default,
                )
                .await?
        } else {
            default
        };
        let selected = &candidates[choice];

        if !paired[choice] {
            // Pair, then restart with a fresh scan so the selection sees the
            // newly written credentials
            pair::pair_device(backend, selected, store, prompt).await?;
            continue;
        }

        info!("Connecting to {}...", selected.summary());
        let credentials = store.get_credentials(&selected.mac).unwrap_or_default();
        match backend.connect(selected, &credentials).await {
            Ok(session) => {
                info!("Successfully connected to {}!", selected.summary());
                store.save_last_connected(&selected.mac)?;
                return Ok(Some(session));
            }
            Err(e) => {
                error!("Failed to connect to {}! Details: {}", selected.summary(), e);
                return Ok(None);
            }
        }
    }

    Err(Error::PairingStalled)
}
