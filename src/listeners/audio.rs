use log::info;

use crate::atv::AudioListener;

/// Logs volume and output-device notifications
#[derive(Debug, Default)]
pub struct VolumeLogger;

impl VolumeLogger {
    pub fn new() -> Self {
        VolumeLogger
    }
}

impl AudioListener for VolumeLogger {
    fn volume_update(&mut self, old_level: f32, new_level: f32) {
        info!("volume_update() - changed from {} to {}", old_level, new_level);
    }

    fn outputdevices_update(&mut self, old_devices: &[String], new_devices: &[String]) {
        info!(
            "outputdevices_update() - changed from {:?} to {:?}",
            old_devices, new_devices
        );
    }
}
