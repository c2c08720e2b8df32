use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub http: Option<HttpConfig>,
    pub store: Option<StoreConfig>,
    pub stations: Option<StationsConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct HttpConfig {
    pub bind: Option<String>,
}

impl HttpConfig {
    pub fn bind_addr(&self) -> String {
        self.bind.clone().unwrap_or("0.0.0.0:80".to_string())
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct StoreConfig {
    pub path: Option<String>,
}

impl StoreConfig {
    pub fn path(&self) -> String {
        self.path.clone().unwrap_or("devices.json".to_string())
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct StationsConfig {
    pub command: Option<String>,
    pub poll_interval_seconds: Option<u64>,
}

impl StationsConfig {
    pub fn poll_interval_seconds(&self) -> u64 {
        self.poll_interval_seconds.unwrap_or(3)
    }
}
