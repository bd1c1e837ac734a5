use crate::error::{TrackerError, TrackerResult};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "TRACKER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "tracker.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tracking: TrackingConfig,
    pub fanout: FanoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Requests slower than this are logged at warn level.
    pub slow_request_ms: u64,
    /// Sockets are pinged this often.
    pub heartbeat_secs: u64,
    /// A socket silent for this long is closed.
    pub client_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: num_cpus::get(),
            slow_request_ms: 500,
            heartbeat_secs: 10,
            client_timeout_secs: 30,
        }
    }
}

/// Without a `url` the in-memory store is used, optionally seeded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub min_movement_m: f64,
    pub stale_after_secs: i64,
    pub avg_speed_kmh: f64,
    pub stop_delay_secs: f64,
    pub smoothing_alpha: f64,
    pub pickup_dedup_window_secs: i64,
    pub message_history_limit: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_movement_m: 25.0,
            stale_after_secs: 300,
            avg_speed_kmh: 25.0,
            stop_delay_secs: 60.0,
            smoothing_alpha: 0.3,
            pickup_dedup_window_secs: 3600,
            message_history_limit: 200,
        }
    }
}

/// Which legacy chat topics receive a copy of every chat message.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub legacy_room: bool,
    pub legacy_sender_echo: bool,
    /// Events buffered per connection before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            legacy_room: true,
            legacy_sender_echo: true,
            queue_capacity: 128,
        }
    }
}

impl Config {
    /// Loads `TRACKER_CONFIG` (or `tracker.toml` when present) and applies
    /// environment overrides on top.
    pub fn load() -> TrackerResult<Self> {
        dotenv::dotenv().ok();

        let explicit = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> TrackerResult<Self> {
        info!("Loading config from {}", path.display());
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> TrackerResult<Self> {
        let config: Config = toml::from_str(raw).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> TrackerResult<()> {
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Ok(seed) = env::var("SEED_FILE") {
            self.database.seed_file = Some(PathBuf::from(seed));
        }
        if let Ok(host) = env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("SERVER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| TrackerError::Config(format!("SERVER_PORT is not a port: {}", port)))?;
        }
        Ok(())
    }

    fn validate(&self) -> TrackerResult<()> {
        let t = &self.tracking;
        if !(0.0..=1.0).contains(&t.smoothing_alpha) {
            return Err(TrackerError::Config(format!(
                "smoothing_alpha must be within [0, 1], got {}",
                t.smoothing_alpha
            )));
        }
        if t.avg_speed_kmh <= 0.0 {
            return Err(TrackerError::Config("avg_speed_kmh must be positive".into()));
        }
        if t.min_movement_m < 0.0 || t.stop_delay_secs < 0.0 {
            return Err(TrackerError::Config(
                "min_movement_m and stop_delay_secs cannot be negative".into(),
            ));
        }
        if self.fanout.queue_capacity == 0 {
            return Err(TrackerError::Config("fanout.queue_capacity must be positive".into()));
        }
        if self.server.heartbeat_secs == 0 || self.server.client_timeout_secs <= self.server.heartbeat_secs {
            return Err(TrackerError::Config(
                "server.client_timeout_secs must exceed a non-zero server.heartbeat_secs".into(),
            ));
        }
        if self.server.workers == 0 {
            warn!("server.workers is 0, actix will fall back to its own default");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_tracking_model() {
        let config = Config::default();
        assert_eq!(config.tracking.min_movement_m, 25.0);
        assert_eq!(config.tracking.stale_after_secs, 300);
        assert_eq!(config.tracking.avg_speed_kmh, 25.0);
        assert_eq!(config.tracking.smoothing_alpha, 0.3);
        assert!(config.fanout.legacy_room);
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 9001\n\n[tracking]\navg_speed_kmh = 30.0\n\n[fanout]\nlegacy_sender_echo = false"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.tracking.avg_speed_kmh, 30.0);
        assert_eq!(config.tracking.min_movement_m, 25.0);
        assert!(config.fanout.legacy_room);
        assert!(!config.fanout.legacy_sender_echo);
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let err = Config::from_toml("[tracking]\nsmoothing_alpha = 1.5").unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_socket_limits() {
        for raw in [
            "[fanout]\nqueue_capacity = 0",
            "[server]\nheartbeat_secs = 0",
            "[server]\nheartbeat_secs = 30\nclient_timeout_secs = 30",
        ] {
            assert!(matches!(Config::from_toml(raw), Err(TrackerError::Config(_))), "{}", raw);
        }
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(Config::from_toml("[server\nport = ").is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config/tracker.toml"));
        let config = Config::from_file(path).unwrap();
        assert!(config.database.url.is_none());
        assert_eq!(config.database.seed_file, Some(PathBuf::from("config/seed.toml")));
        assert!(config.fanout.legacy_room);
    }
}
