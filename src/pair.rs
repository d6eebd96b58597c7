use log::{error, info, warn};
use rand::Rng;
use tokio::io::AsyncBufRead;

use crate::atv::{Backend, Candidate, Pairing, Protocol};
use crate::config::Config;
use crate::connect::{discover, s_if_plural};
use crate::error::Result;
use crate::prompt::Prompt;
use crate::store::CredentialStore;

/// Pair every enabled protocol service of one device, in discovery order
///
/// A failed protocol is logged and skipped; it never aborts the remaining
/// protocols. Each successful handshake's credential blob is persisted
/// immediately.
pub async fn pair_device<B, R>(
    backend: &B,
    device: &Candidate,
    store: &CredentialStore,
    prompt: &mut Prompt<R>,
) -> Result<()>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
{
    info!("Starting pairing flow for {}...", device.summary());

    let protocol_names: Vec<String> = device
        .services
        .iter()
        .map(|service| service.protocol.to_string())
        .collect();
    info!(
        "{} supports {} protocol{}: {}",
        device.name,
        protocol_names.len(),
        s_if_plural(protocol_names.len()),
        protocol_names.join(", ")
    );

    if !device.services.is_empty() {
        // Asked once, before the first pairing attempt of the flow
        prompt
            .confirm_yes(
                &format!("Is {} powered on?", device.name),
                &format!(
                    "Please power on {}, wait, and then enter \"y\" to continue",
                    device.name
                ),
            )
            .await?;
    }

    for service in &device.services {
        let protocol = service.protocol;
        if !service.enabled {
            warn!(
                "Skipping {} pairing for {} because the service is disabled!",
                protocol, device.name
            );
            continue;
        }

        info!("Starting {} pairing on {}...", protocol, device.name);
        match pair_service(backend, device, protocol, store, prompt).await {
            Ok(true) => info!(
                "{} pairing on {} completed successfully!",
                protocol, device.name
            ),
            Ok(false) => error!("{} pairing on {} failed!", protocol, device.name),
            Err(e) => error!(
                "{} pairing on {} failed! Details: {}",
                protocol, device.name, e
            ),
        }
    }

    info!("Finished pairing flow for {}!", device.summary());
    Ok(())
}

/// Run one handshake to completion, persisting the credential on success
///
/// The handshake resource is closed whatever the outcome.
async fn pair_service<B, R>(
    backend: &B,
    device: &Candidate,
    protocol: Protocol,
    store: &CredentialStore,
    prompt: &mut Prompt<R>,
) -> Result<bool>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
{
    let mut pairing = backend.pair(device, protocol).await?;
    let outcome = drive_handshake(&mut pairing, device, protocol, store, prompt).await;
    if let Err(e) = pairing.close().await {
        warn!(
            "Failed to close {} pairing handshake on {}: {}",
            protocol, device.name, e
        );
    }
    outcome
}

async fn drive_handshake<P, R>(
    pairing: &mut P,
    device: &Candidate,
    protocol: Protocol,
    store: &CredentialStore,
    prompt: &mut Prompt<R>,
) -> Result<bool>
where
    P: Pairing,
    R: AsyncBufRead + Unpin,
{
    pairing.begin().await?;

    if pairing.device_provides_pin() {
        let pin = prompt
            .pin(&format!("Enter the PIN from {}", device.name))
            .await?;
        pairing.pin(&pin).await?;
    } else {
        let random_pin = format!("{:04}", rand::thread_rng().gen_range(1..=9999));
        pairing.pin(&random_pin).await?;
        prompt
            .confirm_yes(
                &format!("Enter this PIN: \"{}\" on {}", random_pin, device.name),
                "Enter \"y\" to continue",
            )
            .await?;
    }

    pairing.finish().await?;
    if !pairing.has_paired() {
        return Ok(false);
    }
    if let Some(credentials) = pairing.credentials() {
        store.save_credential(&device.mac, protocol, &credentials)?;
    }
    Ok(true)
}

/// Standalone pairing flow: scan, choose one or more Apple TVs, pair each
pub async fn pair_devices<B, R>(
    backend: &B,
    store: &CredentialStore,
    prompt: &mut Prompt<R>,
    config: &Config,
) -> Result<()>
where
    B: Backend,
    R: AsyncBufRead + Unpin,
{
    let candidates = discover(backend, config).await?;
    let summaries: Vec<String> = candidates.iter().map(Candidate::summary).collect();

    let choices = if candidates.len() > 1 {
        prompt
            .multi_select(
                "Which Apple TVs would you like to pair?",
                &summaries,
                "You must select at least one Apple TV to pair!",
            )
            .await?
    } else {
        vec![0]
    };

    for choice in choices {
        pair_device(backend, &candidates[choice], store, prompt).await?;
    }
    Ok(())
}
