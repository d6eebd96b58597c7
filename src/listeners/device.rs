use log::{error, info};

use crate::atv::DeviceListener;

/// Logs connectivity notifications
#[derive(Debug, Default)]
pub struct ConnectionLogger;

impl ConnectionLogger {
    pub fn new() -> Self {
        ConnectionLogger
    }
}

impl DeviceListener for ConnectionLogger {
    fn connection_lost(&mut self, cause: &str) {
        error!("connection_lost(): {}", cause);
    }

    fn connection_closed(&mut self) {
        info!("connection_closed()");
    }
}
