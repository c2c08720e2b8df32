use std::collections::HashMap;
use std::net::IpAddr;

use mac_address::MacAddress;

pub const CAPACITY: usize = 128;

/// Sentinel for "no reading yet"; live readings are in 0..=100.
pub const UNKNOWN_PERCENT: f32 = -1.0;

#[derive(Debug, Clone)]
pub struct Slot {
    pub mac: Option<MacAddress>,
    pub name: String,
    pub ip: Option<IpAddr>,
    pub rssi: i8,
    pub percent: f32,
    pub total_height_cm: f32,
    pub sensor_to_max_cm: f32,
    pub last_seen_ms: u64,
}

impl Slot {
    fn fresh() -> Self {
        Slot {
            mac: None,
            name: String::new(),
            ip: None,
            rssi: 0,
            percent: UNKNOWN_PERCENT,
            total_height_cm: 0.0,
            sensor_to_max_cm: 0.0,
            last_seen_ms: 0,
        }
    }

    pub fn percent_known(&self) -> bool {
        self.percent >= 0.0
    }

    // last_seen_ms == 0 means the device has never been seen this boot.
    pub fn age_seconds(&self, now_ms: u64) -> Option<u64> {
        (self.last_seen_ms != 0).then(|| now_ms.saturating_sub(self.last_seen_ms) / 1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    MatchedByAddress(usize),
    MatchedByName(usize),
    Allocated(usize),
}

impl Resolution {
    pub fn index(&self) -> usize {
        match *self {
            Resolution::MatchedByAddress(idx)
            | Resolution::MatchedByName(idx)
            | Resolution::Allocated(idx) => idx,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("device table full")]
    CapacityExceeded,
}

/// Fields a sensor report may carry, plus what the transport knows
/// about the peer.
#[derive(Debug, Default)]
pub struct ReportUpdate {
    pub mac: Option<MacAddress>,
    pub name: Option<String>,
    pub percent: Option<f32>,
    pub total_height_cm: f32,
    pub sensor_to_max_cm: f32,
    pub source_ip: Option<IpAddr>,
    pub rssi: Option<i8>,
}

/// Durable subset of a slot: what survives a restart.
#[derive(Debug, Clone, PartialEq)]
pub struct DurableRecord {
    pub mac: Option<MacAddress>,
    pub name: String,
    pub total_height_cm: f32,
    pub sensor_to_max_cm: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreStats {
    pub loaded: usize,
    pub dropped: usize,
}

/// Fixed-capacity device table. Slots are allocated on first sight of
/// an identity and never freed; the whole table is only rebuilt by
/// `restore`. The lookup maps mirror the slot contents on every write.
pub struct Registry {
    slots: Vec<Slot>,
    by_mac: HashMap<MacAddress, usize>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            slots: Vec::new(),
            by_mac: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn device_count(&self) -> usize {
        self.slots.len()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Slot> {
        self.by_name.get(name).map(|&idx| &self.slots[idx])
    }

    /// Map an identity hint to a slot. Hardware address outranks name;
    /// a slot known only by name is claimed by the first caller that
    /// carries both the name and an address.
    pub fn resolve(
        &mut self,
        mac: Option<MacAddress>,
        name: Option<&str>,
    ) -> Result<Resolution, RegistryError> {
        if let Some(mac) = mac {
            if let Some(&idx) = self.by_mac.get(&mac) {
                return Ok(Resolution::MatchedByAddress(idx));
            }
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                if let Some(&idx) = self.by_name.get(name) {
                    if self.slots[idx].mac.is_none() {
                        self.slots[idx].mac = Some(mac);
                        self.by_mac.insert(mac, idx);
                        return Ok(Resolution::MatchedByName(idx));
                    }
                }
            }
            let idx = self.allocate()?;
            self.slots[idx].mac = Some(mac);
            self.by_mac.insert(mac, idx);
            return Ok(Resolution::Allocated(idx));
        }

        if let Some(name) = name.filter(|n| !n.is_empty()) {
            if let Some(&idx) = self.by_name.get(name) {
                return Ok(Resolution::MatchedByName(idx));
            }
        }

        Ok(Resolution::Allocated(self.allocate()?))
    }

    /// Apply a self-reported reading. Volatile fields only; nothing
    /// here touches the persisted document.
    pub fn apply_report(
        &mut self,
        report: &ReportUpdate,
        now_ms: u64,
    ) -> Result<Resolution, RegistryError> {
        let resolution = self.resolve(report.mac, report.name.as_deref())?;
        let idx = resolution.index();
        if let Some(name) = report.name.as_deref().filter(|n| !n.is_empty()) {
            self.set_name(idx, name);
        }
        let slot = &mut self.slots[idx];
        slot.percent = normalize_percent(report.percent);
        slot.total_height_cm = report.total_height_cm;
        slot.sensor_to_max_cm = report.sensor_to_max_cm;
        if let Some(ip) = report.source_ip {
            slot.ip = Some(ip);
        }
        if let Some(rssi) = report.rssi {
            slot.rssi = rssi;
        }
        slot.last_seen_ms = now_ms;
        Ok(resolution)
    }

    /// Passive sighting from the access point's client list. Seeds a
    /// slot for an unknown address; for a known one refreshes
    /// `last_seen_ms` only, so an idle station never loses its reading.
    pub fn observe_station(
        &mut self,
        mac: MacAddress,
        now_ms: u64,
    ) -> Result<Resolution, RegistryError> {
        let resolution = self.resolve(Some(mac), None)?;
        self.slots[resolution.index()].last_seen_ms = now_ms;
        Ok(resolution)
    }

    /// Configuration write: name and calibration, never the reading or
    /// the timestamp. `name` must be non-empty.
    pub fn configure(
        &mut self,
        mac: Option<MacAddress>,
        name: &str,
        total_height_cm: f32,
        sensor_to_max_cm: f32,
    ) -> Result<Resolution, RegistryError> {
        let resolution = self.resolve(mac, Some(name))?;
        let idx = resolution.index();
        if !name.is_empty() {
            self.set_name(idx, name);
        }
        let slot = &mut self.slots[idx];
        slot.total_height_cm = total_height_cm;
        slot.sensor_to_max_cm = sensor_to_max_cm;
        Ok(resolution)
    }

    pub fn durable_records(&self) -> Vec<DurableRecord> {
        self.slots
            .iter()
            .map(|slot| DurableRecord {
                mac: slot.mac,
                name: slot.name.clone(),
                total_height_cm: slot.total_height_cm,
                sensor_to_max_cm: slot.sensor_to_max_cm,
            })
            .collect()
    }

    /// Bulk replace from the persisted document. Volatile fields come
    /// back at their defaults. Records beyond capacity are dropped and
    /// counted so the caller can complain.
    pub fn restore(&mut self, records: Vec<DurableRecord>) -> RestoreStats {
        self.slots.clear();
        self.by_mac.clear();
        self.by_name.clear();
        let total = records.len();
        for record in records.into_iter().take(CAPACITY) {
            let idx = self.slots.len();
            let mut slot = Slot::fresh();
            slot.mac = record.mac;
            slot.name = record.name;
            slot.total_height_cm = record.total_height_cm;
            slot.sensor_to_max_cm = record.sensor_to_max_cm;
            if let Some(mac) = slot.mac {
                self.by_mac.insert(mac, idx);
            }
            if !slot.name.is_empty() {
                self.by_name.insert(slot.name.clone(), idx);
            }
            self.slots.push(slot);
        }
        RestoreStats {
            loaded: self.slots.len(),
            dropped: total - self.slots.len(),
        }
    }

    fn allocate(&mut self) -> Result<usize, RegistryError> {
        if self.slots.len() >= CAPACITY {
            return Err(RegistryError::CapacityExceeded);
        }
        self.slots.push(Slot::fresh());
        Ok(self.slots.len() - 1)
    }

    // Names are best-effort unique: the map entry goes to the most
    // recent writer, earlier slots keep the string but lose lookups.
    fn set_name(&mut self, idx: usize, name: &str) {
        let previous = std::mem::replace(&mut self.slots[idx].name, name.to_string());
        if !previous.is_empty() && previous != name && self.by_name.get(&previous) == Some(&idx) {
            self.by_name.remove(&previous);
        }
        self.by_name.insert(name.to_string(), idx);
    }
}

fn normalize_percent(percent: Option<f32>) -> f32 {
    match percent {
        Some(p) if p >= 0.0 => p.min(100.0),
        _ => UNKNOWN_PERCENT,
    }
}
