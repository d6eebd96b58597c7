mod support;

use support::{candidate, non_apple_tv, scripted, temp_store, FakeBackend, PairPlan};

use atvlink::atv::Protocol;
use atvlink::config::Config;
use atvlink::connect::connect_device;
use atvlink::error::Error;

const MAC0: &str = "AA:AA:AA:AA:AA:AA";
const MAC1: &str = "BB:BB:BB:BB:BB:BB";

fn two_devices() -> Vec<atvlink::atv::Candidate> {
    vec![
        candidate("Living Room", MAC0, &[(Protocol::Mrp, true)]),
        candidate("Bedroom", MAC1, &[(Protocol::Mrp, true)]),
    ]
}

#[tokio::test]
async fn unpaired_default_is_first_candidate_and_pairing_restarts_the_scan() {
    let (_dir, store) = temp_store();
    let backend = FakeBackend::new(vec![two_devices()]);
    let config = Config::default();

    // Round one: accept the default choice, confirm power, type the PIN.
    // Round two: accept the default again (now the freshly paired device).
    let mut prompt = scripted("\ny\n1234\n\n");
    let session = connect_device(&backend, &store, &mut prompt, &config)
        .await
        .unwrap();
    assert!(session.is_some());

    let entries = backend.log.entries();
    assert_eq!(entries[0], "scan");
    let paired_at = backend
        .log
        .position_of(&format!("pair:{}:MRP", MAC0))
        .expect("device 0 should have been paired");
    let connected_at = backend
        .log
        .position_of(&format!("connect:{}:[MRP=fake-credentials]", MAC0))
        .expect("device 0 should have been connected with its new credentials");
    assert!(paired_at < connected_at);
    // Pairing forces a second scan before connecting
    assert_eq!(backend.log.count_of("scan"), 2);
    assert_eq!(store.read().last_connected(), Some(MAC0));
}

#[tokio::test]
async fn last_connected_device_is_the_default_choice() {
    let (_dir, store) = temp_store();
    store.save_credential(MAC1, Protocol::Mrp, "tok").unwrap();
    store.save_last_connected(MAC1).unwrap();
    let backend = FakeBackend::new(vec![two_devices()]);

    let mut prompt = scripted("\n");
    let session = connect_device(&backend, &store, &mut prompt, &Config::default())
        .await
        .unwrap();

    assert!(session.is_some());
    assert!(backend
        .log
        .position_of(&format!("connect:{}:[MRP=tok]", MAC1))
        .is_some());
}

#[tokio::test]
async fn stale_last_connected_falls_back_to_first_paired() {
    let (_dir, store) = temp_store();
    store.save_credential(MAC1, Protocol::Mrp, "tok").unwrap();
    store.save_last_connected("FF:FF:FF:FF:FF:FF").unwrap();
    let backend = FakeBackend::new(vec![two_devices()]);

    let mut prompt = scripted("\n");
    connect_device(&backend, &store, &mut prompt, &Config::default())
        .await
        .unwrap();

    assert!(backend
        .log
        .position_of(&format!("connect:{}:[MRP=tok]", MAC1))
        .is_some());
}

#[tokio::test]
async fn single_candidate_is_used_without_prompting() {
    let (_dir, store) = temp_store();
    store.save_credential(MAC0, Protocol::Mrp, "tok").unwrap();
    let backend = FakeBackend::new(vec![vec![candidate(
        "Living Room",
        MAC0,
        &[(Protocol::Mrp, true)],
    )]]);

    // An empty script: any prompt read would fail the flow
    let mut prompt = scripted("");
    let session = connect_device(&backend, &store, &mut prompt, &Config::default())
        .await
        .unwrap();

    assert!(session.is_some());
    assert_eq!(store.read().last_connected(), Some(MAC0));
}

#[tokio::test]
async fn operator_choice_overrides_the_default() {
    let (_dir, store) = temp_store();
    store.save_credential(MAC0, Protocol::Mrp, "t0").unwrap();
    store.save_credential(MAC1, Protocol::Mrp, "t1").unwrap();
    store.save_last_connected(MAC0).unwrap();
    let backend = FakeBackend::new(vec![two_devices()]);

    let mut prompt = scripted("2\n");
    connect_device(&backend, &store, &mut prompt, &Config::default())
        .await
        .unwrap();

    assert!(backend
        .log
        .position_of(&format!("connect:{}:[MRP=t1]", MAC1))
        .is_some());
    assert_eq!(store.read().last_connected(), Some(MAC1));
}

#[tokio::test]
async fn every_stored_credential_is_applied() {
    let (_dir, store) = temp_store();
    store.save_credential(MAC0, Protocol::Mrp, "tok").unwrap();
    store
        .save_credential(MAC0, Protocol::AirPlay, "fly")
        .unwrap();
    let backend = FakeBackend::new(vec![vec![candidate(
        "Living Room",
        MAC0,
        &[(Protocol::Mrp, true)],
    )]]);

    let mut prompt = scripted("");
    connect_device(&backend, &store, &mut prompt, &Config::default())
        .await
        .unwrap();

    assert!(backend
        .log
        .position_of(&format!("connect:{}:[AirPlay=fly,MRP=tok]", MAC0))
        .is_some());
}

#[tokio::test]
async fn connection_failure_is_not_an_error_and_leaves_no_history() {
    let (_dir, store) = temp_store();
    store.save_credential(MAC0, Protocol::Mrp, "tok").unwrap();
    let backend = FakeBackend::new(vec![vec![candidate(
        "Living Room",
        MAC0,
        &[(Protocol::Mrp, true)],
    )]])
    .failing_connect();

    let mut prompt = scripted("");
    let session = connect_device(&backend, &store, &mut prompt, &Config::default())
        .await
        .unwrap();

    assert!(session.is_none());
    assert_eq!(store.read().last_connected(), None);
}

#[tokio::test]
async fn no_apple_tvs_is_fatal() {
    let (_dir, store) = temp_store();
    let backend = FakeBackend::new(vec![Vec::new()]);

    let mut prompt = scripted("");
    let result = connect_device(&backend, &store, &mut prompt, &Config::default()).await;

    assert!(matches!(result, Err(Error::NoDevices)));
}

#[tokio::test]
async fn other_device_classes_do_not_count() {
    let (_dir, store) = temp_store();
    let backend = FakeBackend::new(vec![vec![non_apple_tv("iMac", "CC:CC:CC:CC:CC:CC")]]);

    let mut prompt = scripted("");
    let result = connect_device(&backend, &store, &mut prompt, &Config::default()).await;

    assert!(matches!(result, Err(Error::NoDevices)));
}

#[tokio::test]
async fn pairing_that_never_converges_gives_up() {
    let (_dir, store) = temp_store();
    let backend = FakeBackend::new(vec![vec![candidate(
        "Living Room",
        MAC0,
        &[(Protocol::Mrp, true)],
    )]])
    .plan_pair(
        MAC0,
        Protocol::Mrp,
        PairPlan {
            succeed: false,
            ..PairPlan::default()
        },
    );

    // Three rounds of power confirmation plus PIN entry
    let mut prompt = scripted("y\n1234\ny\n1234\ny\n1234\n");
    let result = connect_device(&backend, &store, &mut prompt, &Config::default()).await;

    assert!(matches!(result, Err(Error::PairingStalled)));
    assert_eq!(backend.log.count_of("scan"), 3);
}
