use log::info;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::atv::{PowerListener, PowerState};
use crate::constants::{POWER_OFF_EVENT, POWER_ON_EVENT};
use crate::webhook::WebhookPublisher;

/// Debounce filter turning raw power notifications into stable transitions
///
/// When powering on, the observed device alternates between On and Off for
/// roughly 30 seconds. An Off update is therefore only accepted once the
/// configured cooldown has elapsed since the most recent On update; On
/// updates refresh that cooldown even when they are themselves unstable
/// repeats.
#[derive(Debug)]
pub struct PowerDebounce {
    off_stable_after: u64,
    last_power_on_time: u64,
    prev_stable_state: PowerState,
}

impl PowerDebounce {
    pub fn new(initial_state: PowerState, off_stable_after: u64) -> Self {
        PowerDebounce {
            off_stable_after,
            last_power_on_time: 0,
            prev_stable_state: initial_state,
        }
    }

    /// Feed one raw update observed at `now` (seconds since the epoch)
    ///
    /// Returns the new stable state when the update is accepted, `None` when
    /// it is ignored as unstable.
    pub fn observe(&mut self, new_state: PowerState, now: u64) -> Option<PowerState> {
        // Stable means: a definite On/Off that differs from the previous
        // stable state
        let mut is_stable = matches!(new_state, PowerState::On | PowerState::Off)
            && new_state != self.prev_stable_state;

        if new_state == PowerState::On {
            self.last_power_on_time = now;
        } else if new_state == PowerState::Off {
            is_stable = is_stable
                && now.saturating_sub(self.last_power_on_time) >= self.off_stable_after;
        }

        if is_stable {
            self.prev_stable_state = new_state;
            Some(new_state)
        } else {
            None
        }
    }
}

/// Power listener publishing debounced transitions to IFTTT
pub struct PowerWatcher {
    debounce: PowerDebounce,
    publisher: WebhookPublisher,
}

impl PowerWatcher {
    pub fn new(
        initial_state: PowerState,
        publisher: WebhookPublisher,
        off_stable_after: u64,
    ) -> Self {
        info!("Initialized with initial power state: {}", initial_state);
        PowerWatcher {
            debounce: PowerDebounce::new(initial_state, off_stable_after),
            publisher,
        }
    }
}

impl PowerListener for PowerWatcher {
    fn powerstate_update(&mut self, _old_state: PowerState, new_state: PowerState) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);

        match self.debounce.observe(new_state, now) {
            Some(stable_state) => {
                info!("Stable update: {}", stable_state);
                let publisher = self.publisher.clone();
                let event_name = if stable_state == PowerState::On {
                    POWER_ON_EVENT
                } else {
                    POWER_OFF_EVENT
                };
                // Publishing must never block the notification callback
                tokio::spawn(async move { publisher.publish(event_name).await });
            }
            None => info!("Ignoring unstable update: {}", new_state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: u64 = 20;

    #[test]
    fn off_accepted_only_after_cooldown() {
        let mut debounce = PowerDebounce::new(PowerState::Off, COOLDOWN);

        assert_eq!(debounce.observe(PowerState::On, 0), Some(PowerState::On));
        assert_eq!(debounce.observe(PowerState::Off, 5), None);
        assert_eq!(debounce.observe(PowerState::Off, 25), Some(PowerState::Off));
    }

    #[test]
    fn repeated_state_is_never_reemitted() {
        let mut debounce = PowerDebounce::new(PowerState::Off, COOLDOWN);

        assert_eq!(debounce.observe(PowerState::On, 0), Some(PowerState::On));
        assert_eq!(debounce.observe(PowerState::On, 1), None);
        assert_eq!(debounce.observe(PowerState::Off, 100), Some(PowerState::Off));
        assert_eq!(debounce.observe(PowerState::Off, 200), None);
    }

    #[test]
    fn unstable_on_still_refreshes_the_cooldown() {
        let mut debounce = PowerDebounce::new(PowerState::Off, COOLDOWN);

        assert_eq!(debounce.observe(PowerState::On, 0), Some(PowerState::On));
        // Unstable repeat at t=15 pushes the cooldown window forward
        assert_eq!(debounce.observe(PowerState::On, 15), None);
        assert_eq!(debounce.observe(PowerState::Off, 30), None);
        assert_eq!(debounce.observe(PowerState::Off, 35), Some(PowerState::Off));
    }

    #[test]
    fn transient_states_are_ignored() {
        let mut debounce = PowerDebounce::new(PowerState::Off, COOLDOWN);

        assert_eq!(debounce.observe(PowerState::Unknown, 50), None);
        assert_eq!(debounce.observe(PowerState::On, 51), Some(PowerState::On));
    }

    #[test]
    fn initial_on_state_suppresses_early_flapping() {
        let mut debounce = PowerDebounce::new(PowerState::On, COOLDOWN);

        // Wall-clock epoch seconds: any realistic now exceeds the cooldown
        // measured from 0, so the first Off is stable
        assert_eq!(
            debounce.observe(PowerState::Off, 1_600_000_000),
            Some(PowerState::Off)
        );
        assert_eq!(debounce.observe(PowerState::On, 1_600_000_001), Some(PowerState::On));
        // Flapping Off right after an On stays suppressed
        assert_eq!(debounce.observe(PowerState::Off, 1_600_000_002), None);
    }

    mod watcher {
        use super::*;

        use warp::Filter;

        use std::sync::{Arc, Mutex};
        use std::time::Duration;

        fn trigger_server() -> (String, Arc<Mutex<Vec<String>>>) {
            let hits: Arc<Mutex<Vec<String>>> = Arc::default();
            let recorded = Arc::clone(&hits);
            let route = warp::post()
                .and(warp::path!("trigger" / String / "with" / "key" / String))
                .map(move |event: String, _key: String| {
                    recorded.lock().unwrap().push(event);
                    "ok"
                });
            let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
            tokio::spawn(server);
            (format!("http://{}", addr), hits)
        }

        #[tokio::test]
        async fn stable_transition_publishes_event() {
            let (endpoint, hits) = trigger_server();
            let publisher = WebhookPublisher::with_endpoint(Some("key".into()), endpoint);
            let mut watcher = PowerWatcher::new(PowerState::Off, publisher, COOLDOWN);

            watcher.powerstate_update(PowerState::Off, PowerState::On);

            // The publish task is detached; give it a moment to land
            for _ in 0..50 {
                if !hits.lock().unwrap().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(hits.lock().unwrap().as_slice(), &["atv_power_on".to_string()]);
        }

        #[tokio::test]
        async fn unstable_update_publishes_nothing() {
            let (endpoint, hits) = trigger_server();
            let publisher = WebhookPublisher::with_endpoint(Some("key".into()), endpoint);
            let mut watcher = PowerWatcher::new(PowerState::On, publisher, COOLDOWN);

            // Already stable-On: a repeated On must not trigger anything
            watcher.powerstate_update(PowerState::On, PowerState::On);

            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(hits.lock().unwrap().is_empty());
        }
    }
}
