use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, info, warn};
use mac_address::MacAddress;
use tokio::sync::Mutex;

use crate::messages::{
    Ack, ConfigQuery, ConfigView, DeviceView, ReportRequest, SaveDeviceRequest, StatusView,
};
use crate::registry::{Registry, RegistryError, ReportUpdate};
use crate::stations::StationPoller;
use crate::store::{DeviceStore, StoreError};

/// Monotonic millisecond clock anchored at process start; 0 is "never".
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Clock {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

pub struct AppState {
    pub registry: Mutex<Registry>,
    pub store: DeviceStore,
    pub stations: StationPoller,
    pub clock: Clock,
}

impl AppState {
    pub fn new(registry: Registry, store: DeviceStore, stations: StationPoller) -> Self {
        AppState {
            registry: Mutex::new(registry),
            store,
            stations,
            clock: Clock::new(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/api/devices", get(list_devices))
        .route("/api/report", post(report))
        .route("/api/device", post(save_device))
        .route("/api/config", get(get_config))
        .with_state(state)
}

#[derive(Debug)]
enum ApiError {
    TableFull,
    Malformed(&'static str),
    UnknownDevice,
    Store(StoreError),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::CapacityExceeded => ApiError::TableFull,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, msg) = match &self {
            ApiError::TableFull => (StatusCode::INTERNAL_SERVER_ERROR, "table full".to_string()),
            ApiError::Malformed(what) => (StatusCode::BAD_REQUEST, what.to_string()),
            ApiError::UnknownDevice => (StatusCode::NOT_FOUND, "unknown".to_string()),
            ApiError::Store(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        (code, Json(Ack::error(&msg))).into_response()
    }
}

// Sensor firmware sometimes sends an empty or mangled mac field; it
// means "no address", not a bad request.
fn parse_mac(raw: Option<&str>) -> Option<MacAddress> {
    raw.and_then(|s| s.parse().ok())
}

async fn report(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<Ack>, ApiError> {
    let update = ReportUpdate {
        mac: parse_mac(request.mac.as_deref()),
        name: request.name,
        percent: request.percent,
        total_height_cm: request.total_height_cm,
        sensor_to_max_cm: request.sensor_to_max_cm,
        source_ip: Some(peer.ip()),
        rssi: None,
    };
    let mut registry = state.registry.lock().await;
    let resolution = registry.apply_report(&update, state.clock.now_ms())?;
    let slot = &registry.slots()[resolution.index()];
    debug!(
        "report: slot={} name={:?} ip={} percent={}",
        resolution.index(),
        slot.name,
        peer.ip(),
        slot.percent
    );
    Ok(Json(Ack::ok()))
}

async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceView>> {
    refresh_stations(&state).await;
    let registry = state.registry.lock().await;
    let now_ms = state.clock.now_ms();
    Json(
        registry
            .slots()
            .iter()
            .map(|slot| DeviceView::from_slot(slot, now_ms))
            .collect(),
    )
}

async fn save_device(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveDeviceRequest>,
) -> Result<Json<Ack>, ApiError> {
    if request.name.is_empty() {
        return Err(ApiError::Malformed("name required"));
    }
    let mac = parse_mac(request.mac.as_deref());
    let mut registry = state.registry.lock().await;
    registry.configure(
        mac,
        &request.name,
        request.total_height_cm,
        request.sensor_to_max_cm,
    )?;
    info!("saved device {:?} mac={:?}", request.name, mac);
    // a failed flash write is reported while the in-memory slot keeps
    // the new config; the caller may retry the save
    state.store.save(&registry)?;
    Ok(Json(Ack::ok()))
}

async fn get_config(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConfigQuery>,
) -> Result<Json<ConfigView>, ApiError> {
    let registry = state.registry.lock().await;
    let slot = registry
        .find_by_name(&query.name)
        .ok_or(ApiError::UnknownDevice)?;
    Ok(Json(ConfigView {
        name: slot.name.clone(),
        total_height_cm: slot.total_height_cm,
        sensor_to_max_cm: slot.sensor_to_max_cm,
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusView> {
    let registry = state.registry.lock().await;
    Json(StatusView {
        ok: true,
        devices: registry.device_count(),
        uptime_seconds: state.clock.now_ms() / 1000,
    })
}

/// One passive-discovery pass. Query failures are logged and skipped;
/// the next tick retries.
pub async fn refresh_stations(state: &AppState) {
    if !state.stations.enabled() {
        return;
    }
    let stations = match state.stations.poll().await {
        Ok(stations) => stations,
        Err(err) => {
            debug!("station query failed: {err}");
            return;
        }
    };
    let mut registry = state.registry.lock().await;
    let now_ms = state.clock.now_ms();
    for mac in stations {
        if let Err(RegistryError::CapacityExceeded) = registry.observe_station(mac, now_ms) {
            warn!("table full, ignoring station {mac}");
        }
    }
}
