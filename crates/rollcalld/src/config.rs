use rollcall_core::TardyRule;
use serde::Deserialize;
use std::path::PathBuf;

/// Daemon configuration: compiled defaults, overridden by an optional
/// `rollcalld.toml`, overridden by `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the detection/schedule service.
    pub service_url: String,
    /// V4L2 device path.
    pub camera_device: String,
    /// Detection tick period in milliseconds.
    pub capture_interval_ms: u64,
    /// Per-request deadline for detection calls, in seconds.
    pub request_timeout_secs: u64,
    /// Absence sweep period in seconds.
    pub sweep_interval_secs: u64,
    /// Tardiness rule: minutes after start, "none", or a clock time.
    pub tardy_rule: TardyRule,
    /// JPEG quality for frames posted to the service (1-100).
    pub jpeg_quality: u8,
    /// Frames to discard at camera startup (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Path to the SQLite attendance history database.
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "http://127.0.0.1:5000".to_string(),
            camera_device: "/dev/video0".to_string(),
            capture_interval_ms: 1500,
            request_timeout_secs: 10,
            sweep_interval_secs: 60,
            tardy_rule: TardyRule::AfterMinutes(15),
            jpeg_quality: 90,
            warmup_frames: 4,
            db_path: rollcall_store::default_db_path(),
        }
    }
}

impl Config {
    /// Load configuration with file and environment overrides applied.
    pub fn load() -> Self {
        let mut cfg = Self::from_file().unwrap_or_default();
        cfg.apply_env();
        cfg
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("ROLLCALL_CONFIG") {
            return PathBuf::from(path);
        }
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config")
            })
            .join("rollcall/rollcalld.toml")
    }

    fn from_file() -> Option<Self> {
        let path = Self::config_path();
        let raw = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&raw) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Some(cfg)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "bad config file; using defaults");
                None
            }
        }
    }

    fn apply_env(&mut self) {
        env_string("ROLLCALL_SERVICE_URL", &mut self.service_url);
        env_string("ROLLCALL_CAMERA_DEVICE", &mut self.camera_device);
        env_parse("ROLLCALL_CAPTURE_INTERVAL_MS", &mut self.capture_interval_ms);
        env_parse("ROLLCALL_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        env_parse("ROLLCALL_SWEEP_INTERVAL_SECS", &mut self.sweep_interval_secs);
        env_parse("ROLLCALL_TARDY", &mut self.tardy_rule);
        env_parse("ROLLCALL_JPEG_QUALITY", &mut self.jpeg_quality);
        env_parse("ROLLCALL_WARMUP_FRAMES", &mut self.warmup_frames);
        if let Ok(path) = std::env::var("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
    }
}

fn env_string(key: &str, slot: &mut String) {
    if let Ok(value) = std::env::var(key) {
        *slot = value;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Some(value) = std::env::var(key).ok().and_then(|v| v.parse().ok()) {
        *slot = value;
    }
}
