use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::backends::fast::DEFAULT_FAST_THRESHOLD;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["https://mtakira.github.io", "https://Oshota501.github.io"];
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_CONNECTIONS: usize = 64;
const DEFAULT_MODEL_INPUT_SIZE: u32 = 256;
const DEFAULT_FACE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    api: Option<ApiConfigFile>,
    detect: Option<DetectConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    allowed_origins: Option<Vec<String>>,
    max_upload_bytes: Option<usize>,
    read_timeout_secs: Option<u64>,
    max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    landmark_model: Option<PathBuf>,
    model_input_size: Option<u32>,
    face_threshold: Option<f32>,
    keypoint_threshold: Option<u8>,
    keypoint_backend: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api: ApiSettings,
    pub detect: DetectSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub addr: String,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub read_timeout: Duration,
    /// Connections served at once; further ones get 503.
    pub max_connections: usize,
}

#[derive(Debug, Clone)]
pub struct DetectSettings {
    /// MediaPipe face-mesh ONNX model. Without one no face is ever found.
    pub landmark_model: Option<PathBuf>,
    pub model_input_size: u32,
    pub face_threshold: f32,
    pub keypoint_threshold: u8,
    /// Registered keypoint backend to use instead of the default.
    pub keypoint_backend: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            addr: DEFAULT_API_ADDR.to_string(),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| origin.to_string())
                .collect(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Default for DetectSettings {
    fn default() -> Self {
        Self {
            landmark_model: None,
            model_input_size: DEFAULT_MODEL_INPUT_SIZE,
            face_threshold: DEFAULT_FACE_THRESHOLD,
            keypoint_threshold: DEFAULT_FAST_THRESHOLD,
            keypoint_backend: None,
        }
    }
}

impl ServiceConfig {
    /// Load from the file named by `POINTCLOUD_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POINTCLOUD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let api_defaults = ApiSettings::default();
        let detect_defaults = DetectSettings::default();
        let api = file.api.unwrap_or_default();
        let detect = file.detect.unwrap_or_default();
        Self {
            api: ApiSettings {
                addr: api.addr.unwrap_or(api_defaults.addr),
                allowed_origins: api.allowed_origins.unwrap_or(api_defaults.allowed_origins),
                max_upload_bytes: api
                    .max_upload_bytes
                    .unwrap_or(api_defaults.max_upload_bytes),
                read_timeout: api
                    .read_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(api_defaults.read_timeout),
                max_connections: api
                    .max_connections
                    .unwrap_or(api_defaults.max_connections),
            },
            detect: DetectSettings {
                landmark_model: detect.landmark_model,
                model_input_size: detect
                    .model_input_size
                    .unwrap_or(detect_defaults.model_input_size),
                face_threshold: detect
                    .face_threshold
                    .unwrap_or(detect_defaults.face_threshold),
                keypoint_threshold: detect
                    .keypoint_threshold
                    .unwrap_or(detect_defaults.keypoint_threshold),
                keypoint_backend: detect.keypoint_backend,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("POINTCLOUD_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api.addr = addr.trim().to_string();
            }
        }
        if let Ok(origins) = std::env::var("POINTCLOUD_ALLOWED_ORIGINS") {
            let parsed = split_csv(&origins);
            if !parsed.is_empty() {
                self.api.allowed_origins = parsed;
            }
        }
        if let Ok(limit) = std::env::var("POINTCLOUD_MAX_UPLOAD_BYTES") {
            self.api.max_upload_bytes = limit.trim().parse().map_err(|_| {
                anyhow!("POINTCLOUD_MAX_UPLOAD_BYTES must be an integer number of bytes")
            })?;
        }
        if let Ok(limit) = std::env::var("POINTCLOUD_MAX_CONNECTIONS") {
            self.api.max_connections = limit
                .trim()
                .parse()
                .map_err(|_| anyhow!("POINTCLOUD_MAX_CONNECTIONS must be an integer"))?;
        }
        if let Ok(path) = std::env::var("POINTCLOUD_LANDMARK_MODEL") {
            if !path.trim().is_empty() {
                self.detect.landmark_model = Some(PathBuf::from(path.trim()));
            }
        }
        if let Ok(threshold) = std::env::var("POINTCLOUD_FACE_THRESHOLD") {
            self.detect.face_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("POINTCLOUD_FACE_THRESHOLD must be a number"))?;
        }
        if let Ok(threshold) = std::env::var("POINTCLOUD_KEYPOINT_THRESHOLD") {
            self.detect.keypoint_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("POINTCLOUD_KEYPOINT_THRESHOLD must be an integer in 0..=255")
            })?;
        }
        if let Ok(name) = std::env::var("POINTCLOUD_KEYPOINT_BACKEND") {
            if !name.trim().is_empty() {
                self.detect.keypoint_backend = Some(name.trim().to_string());
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.api.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        if self.api.max_connections == 0 {
            return Err(anyhow!("max_connections must be greater than zero"));
        }
        if self.api.read_timeout.is_zero() {
            return Err(anyhow!("read_timeout_secs must be greater than zero"));
        }
        for origin in &self.api.allowed_origins {
            if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                return Err(anyhow!("allowed origin '{}' must include a scheme", origin));
            }
        }
        self.api.allowed_origins = self
            .api
            .allowed_origins
            .iter()
            .map(|origin| origin.trim_end_matches('/').to_string())
            .collect();

        if !(0.0..=1.0).contains(&self.detect.face_threshold) {
            return Err(anyhow!("face_threshold must be within 0..=1"));
        }
        if self.detect.model_input_size == 0 {
            return Err(anyhow!("model_input_size must be greater than zero"));
        }
        if let Some(path) = &self.detect.landmark_model {
            if cfg!(not(feature = "backend-tract")) {
                return Err(anyhow!(
                    "landmark model {} configured, but this build lacks the backend-tract feature",
                    path.display()
                ));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: ServiceConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
