use log::info;

use crate::atv::{FocusState, KeyboardListener};

/// Logs keyboard focus notifications
#[derive(Debug, Default)]
pub struct FocusLogger;

impl FocusLogger {
    pub fn new() -> Self {
        FocusLogger
    }
}

impl KeyboardListener for FocusLogger {
    fn focusstate_update(&mut self, old_state: FocusState, new_state: FocusState) {
        info!(
            "focusstate_update() - changed from {} to {}",
            old_state, new_state
        );
    }
}
