use std::io;

use mac_address::MacAddress;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error("station query failed to run: {0}")]
    Io(#[from] io::Error),
    #[error("station query exited with {0}")]
    Failed(std::process::ExitStatus),
}

/// Passive client list of the wireless access function, obtained by
/// running an external command (`iw dev <if> station dump` or
/// equivalent) and scraping hardware addresses out of its output.
pub struct StationPoller {
    command: Option<String>,
}

impl StationPoller {
    pub fn new(command: Option<String>) -> Self {
        StationPoller { command }
    }

    pub fn enabled(&self) -> bool {
        self.command.is_some()
    }

    pub async fn poll(&self) -> Result<Vec<MacAddress>, StationError> {
        let Some(command) = &self.command else {
            return Ok(Vec::new());
        };
        let output = Command::new("sh").arg("-c").arg(command).output().await?;
        if !output.status.success() {
            return Err(StationError::Failed(output.status));
        }
        Ok(parse_station_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

// Accepts `iw station dump` blocks ("Station aa:bb:cc:dd:ee:ff (on
// wlan0)") as well as one bare address per line (hostapd_cli all_sta).
fn parse_station_list(output: &str) -> Vec<MacAddress> {
    let mut stations = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        let candidate = match line.strip_prefix("Station ") {
            Some(rest) => rest.split_whitespace().next().unwrap_or(""),
            None => line,
        };
        if let Ok(mac) = candidate.parse::<MacAddress>() {
            stations.push(mac);
        }
    }
    stations
}
