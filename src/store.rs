use std::fs;
use std::io;
use std::path::PathBuf;

use log::info;
use serde_derive::{Deserialize, Serialize};

use crate::registry::{DurableRecord, Registry, RestoreStats};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("device store not found")]
    NotFound,
    #[error("failed to parse device store: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("device store i/o failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Serialize, Deserialize, Debug)]
struct StoredDevice {
    mac: Option<String>,
    name: Option<String>,
    #[serde(rename = "totalHeightCm", default)]
    total_height_cm: f32,
    #[serde(rename = "sensorToMaxCm", default)]
    sensor_to_max_cm: f32,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct DeviceDocument {
    #[serde(default)]
    devices: Vec<StoredDevice>,
}

/// Flash-backed document holding the durable subset of the device
/// table. Written only on explicit configuration saves.
pub struct DeviceStore {
    path: PathBuf,
}

impl DeviceStore {
    pub fn new(path: PathBuf) -> Self {
        DeviceStore { path }
    }

    pub fn save(&self, registry: &Registry) -> Result<(), StoreError> {
        let doc = DeviceDocument {
            devices: registry
                .durable_records()
                .into_iter()
                .map(|record| StoredDevice {
                    mac: record.mac.map(|mac| mac.to_string()),
                    name: (!record.name.is_empty()).then_some(record.name),
                    total_height_cm: record.total_height_cm,
                    sensor_to_max_cm: record.sensor_to_max_cm,
                })
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        // write-then-rename so a power cut never leaves a torn document
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        info!(
            "saved {} devices to {}",
            doc.devices.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Rebuild the table from disk. Returns how many records were
    /// loaded and how many were dropped for exceeding capacity; the
    /// table is untouched unless the document parses.
    pub fn load(&self, registry: &mut Registry) -> Result<RestoreStats, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound);
            }
            Err(err) => return Err(err.into()),
        };
        let doc: DeviceDocument = serde_json::from_slice(&bytes)?;
        let records = doc
            .devices
            .into_iter()
            .map(|stored| DurableRecord {
                // an unparseable mac string loads as address-unknown
                mac: stored.mac.and_then(|mac| mac.parse().ok()),
                name: stored.name.unwrap_or_default(),
                total_height_cm: stored.total_height_cm,
                sensor_to_max_cm: stored.sensor_to_max_cm,
            })
            .collect();
        Ok(registry.restore(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CAPACITY, ReportUpdate, UNKNOWN_PERCENT};
    use mac_address::MacAddress;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> DeviceStore {
        DeviceStore::new(dir.path().join("devices.json"))
    }

    #[test]
    fn round_trip_survives_restart() {
        let tmp = tempdir().unwrap();
        let store = store_in(&tmp);

        let mut reg = Registry::new();
        let mac: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        reg.configure(Some(mac), "Tank-1", 90.0, 5.0).unwrap();
        reg.apply_report(
            &ReportUpdate {
                mac: Some(mac),
                percent: Some(42.0),
                total_height_cm: 90.0,
                sensor_to_max_cm: 5.0,
                ..ReportUpdate::default()
            },
            8000,
        )
        .unwrap();
        store.save(&reg).unwrap();

        let mut restarted = Registry::new();
        let stats = store.load(&mut restarted).unwrap();
        assert_eq!(stats, RestoreStats { loaded: 1, dropped: 0 });

        let slot = restarted.find_by_name("Tank-1").unwrap();
        assert_eq!(slot.mac, Some(mac));
        assert_eq!(slot.total_height_cm, 90.0);
        assert_eq!(slot.sensor_to_max_cm, 5.0);
        // volatile fields do not survive the restart
        assert_eq!(slot.percent, UNKNOWN_PERCENT);
        assert_eq!(slot.last_seen_ms, 0);
        assert!(slot.ip.is_none());
        assert_eq!(slot.rssi, 0);
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = tempdir().unwrap();
        let mut reg = Registry::new();
        let err = store_in(&tmp).load(&mut reg).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert_eq!(reg.device_count(), 0);
    }

    #[test]
    fn corrupt_document_is_a_parse_error() {
        let tmp = tempdir().unwrap();
        let store = store_in(&tmp);
        fs::write(tmp.path().join("devices.json"), b"{not json").unwrap();
        let mut reg = Registry::new();
        let err = store.load(&mut reg).unwrap_err();
        assert!(matches!(err, StoreError::Parse(_)));
        assert_eq!(reg.device_count(), 0);
    }

    #[test]
    fn sparse_records_use_defaults() {
        let tmp = tempdir().unwrap();
        let store = store_in(&tmp);
        fs::write(
            tmp.path().join("devices.json"),
            br#"{"devices":[{"mac":null,"name":"Tank-9"},{"mac":"garbage","name":null}]}"#,
        )
        .unwrap();
        let mut reg = Registry::new();
        let stats = store.load(&mut reg).unwrap();
        assert_eq!(stats.loaded, 2);
        let named = reg.find_by_name("Tank-9").unwrap();
        assert!(named.mac.is_none());
        assert_eq!(named.total_height_cm, 0.0);
        assert!(reg.slots()[1].mac.is_none());
        assert_eq!(reg.slots()[1].name, "");
    }

    #[test]
    fn document_without_devices_key_loads_empty() {
        let tmp = tempdir().unwrap();
        let store = store_in(&tmp);
        fs::write(tmp.path().join("devices.json"), b"{}").unwrap();
        let mut reg = Registry::new();
        let stats = store.load(&mut reg).unwrap();
        assert_eq!(stats, RestoreStats { loaded: 0, dropped: 0 });
    }

    #[test]
    fn overflowing_document_reports_dropped_records() {
        let tmp = tempdir().unwrap();
        let store = store_in(&tmp);
        let devices: Vec<String> = (0..CAPACITY + 3)
            .map(|i| format!(r#"{{"name":"tank-{i}","totalHeightCm":80,"sensorToMaxCm":2}}"#))
            .collect();
        fs::write(
            tmp.path().join("devices.json"),
            format!(r#"{{"devices":[{}]}}"#, devices.join(",")),
        )
        .unwrap();
        let mut reg = Registry::new();
        let stats = store.load(&mut reg).unwrap();
        assert_eq!(stats.loaded, CAPACITY);
        assert_eq!(stats.dropped, 3);
    }

    #[test]
    fn save_writes_nulls_for_unknown_identity() {
        let tmp = tempdir().unwrap();
        let store = store_in(&tmp);
        let mut reg = Registry::new();
        reg.apply_report(
            &ReportUpdate {
                name: Some("NoMac".to_string()),
                ..ReportUpdate::default()
            },
            100,
        )
        .unwrap();
        store.save(&reg).unwrap();
        let raw = fs::read_to_string(tmp.path().join("devices.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(doc["devices"][0]["mac"].is_null());
        assert_eq!(doc["devices"][0]["name"], "NoMac");
    }
}
