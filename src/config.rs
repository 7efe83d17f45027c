use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
    /// How often settings are re-read from the store (real seconds).
    #[serde(default = "default_settings_refresh_secs")]
    pub settings_refresh_secs: u64,
}

fn default_settings_refresh_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// OWFS directory holding one directory per device (e.g. /mnt/1wire/uncached).
    pub root: String,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// How often to log app stats (cycles, devices, published points) at INFO level.
    pub stats_log_interval_secs: u64,
    /// Max number of cycle outputs kept in the broadcast channel for /ws/current (slow clients may lag).
    pub broadcast_capacity: usize,
}

impl AppConfig {
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_string(),
            None => std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into()),
        };
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.store.path.is_empty(), "store.path must be non-empty");
        anyhow::ensure!(
            self.store.settings_refresh_secs > 0,
            "store.settings_refresh_secs must be > 0, got {}",
            self.store.settings_refresh_secs
        );
        anyhow::ensure!(!self.bus.root.is_empty(), "bus.root must be non-empty");
        anyhow::ensure!(
            self.bus.poll_interval_ms > 0,
            "bus.poll_interval_ms must be > 0, got {}",
            self.bus.poll_interval_ms
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.broadcast_capacity > 0,
            "monitoring.broadcast_capacity must be > 0, got {}",
            self.monitoring.broadcast_capacity
        );
        Ok(())
    }
}
