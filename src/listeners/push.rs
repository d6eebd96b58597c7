use log::{error, info};

use crate::atv::{Playing, PushListener};

/// Logs playback push updates
#[derive(Debug, Default)]
pub struct PlaybackLogger;

impl PlaybackLogger {
    pub fn new() -> Self {
        PlaybackLogger
    }
}

impl PushListener for PlaybackLogger {
    fn playstatus_update(&mut self, playing: &Playing) {
        info!("playstatus_update(): {}", playing);
    }

    fn playstatus_error(&mut self, error: &str) {
        error!("playstatus_error(): {}", error);
    }
}
