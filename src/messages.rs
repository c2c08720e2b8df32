use serde_derive::{Deserialize, Serialize};

use crate::registry::Slot;

#[derive(Deserialize, Debug)]
pub struct ReportRequest {
    pub name: Option<String>,
    pub percent: Option<f32>,
    #[serde(rename = "totalHeightCm", default)]
    pub total_height_cm: f32,
    #[serde(rename = "sensorToMaxCm", default)]
    pub sensor_to_max_cm: f32,
    pub mac: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct SaveDeviceRequest {
    pub name: String,
    #[serde(rename = "totalHeightCm", default)]
    pub total_height_cm: f32,
    #[serde(rename = "sensorToMaxCm", default)]
    pub sensor_to_max_cm: f32,
    pub mac: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ConfigQuery {
    pub name: String,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct DeviceView {
    pub mac: Option<String>,
    pub ip: String,
    pub rssi: i8,
    pub name: Option<String>,
    pub percent: Option<f32>,
    pub age_seconds: Option<u64>,
    #[serde(rename = "totalHeightCm")]
    pub total_height_cm: f32,
    #[serde(rename = "sensorToMaxCm")]
    pub sensor_to_max_cm: f32,
}

impl DeviceView {
    pub fn from_slot(slot: &Slot, now_ms: u64) -> Self {
        DeviceView {
            mac: slot.mac.map(|mac| mac.to_string()),
            ip: slot
                .ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            rssi: slot.rssi,
            name: (!slot.name.is_empty()).then(|| slot.name.clone()),
            percent: slot.percent_known().then_some(slot.percent),
            age_seconds: slot.age_seconds(now_ms),
            total_height_cm: slot.total_height_cm,
            sensor_to_max_cm: slot.sensor_to_max_cm,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ConfigView {
    pub name: String,
    #[serde(rename = "totalHeightCm")]
    pub total_height_cm: f32,
    #[serde(rename = "sensorToMaxCm")]
    pub sensor_to_max_cm: f32,
}

#[derive(Serialize, Debug)]
pub struct Ack {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Ack { ok: true, msg: None }
    }

    pub fn error(msg: &str) -> Self {
        Ack {
            ok: false,
            msg: Some(msg.to_string()),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct StatusView {
    pub ok: bool,
    pub devices: usize,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, ReportUpdate};
    use mac_address::MacAddress;

    #[test]
    fn view_uses_nulls_for_unknown_fields() {
        let mut reg = Registry::new();
        reg.observe_station(MacAddress::new([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]), 1000)
            .unwrap();
        let view = DeviceView::from_slot(&reg.slots()[0], 6000);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["mac"], "DE:AD:BE:EF:00:01");
        assert_eq!(json["ip"], "0.0.0.0");
        assert!(json["name"].is_null());
        assert!(json["percent"].is_null());
        assert_eq!(json["age_seconds"], 5);
        assert_eq!(json["totalHeightCm"], 0.0);
    }

    #[test]
    fn view_of_reported_device() {
        let mut reg = Registry::new();
        reg.apply_report(
            &ReportUpdate {
                name: Some("Tank-1".to_string()),
                percent: Some(61.5),
                total_height_cm: 90.0,
                sensor_to_max_cm: 5.0,
                source_ip: Some("192.168.4.17".parse().unwrap()),
                ..ReportUpdate::default()
            },
            2000,
        )
        .unwrap();
        let view = DeviceView::from_slot(&reg.slots()[0], 2000);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json["mac"].is_null());
        assert_eq!(json["ip"], "192.168.4.17");
        assert_eq!(json["name"], "Tank-1");
        assert_eq!(json["percent"], 61.5);
        assert_eq!(json["age_seconds"], 0);
        assert_eq!(json["sensorToMaxCm"], 5.0);
    }

    #[test]
    fn report_request_tolerates_missing_fields() {
        let req: ReportRequest = serde_json::from_str(r#"{"name":"Tank-1","seq":12}"#).unwrap();
        assert_eq!(req.name.as_deref(), Some("Tank-1"));
        assert!(req.percent.is_none());
        assert_eq!(req.total_height_cm, 0.0);
        assert!(req.mac.is_none());
    }
}
