use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::common::error::{Result, VisiRideError};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String { "0.0.0.0:8081".to_string() }
fn default_max_body_bytes() -> usize { 16 * 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProximityConfig {
    /// Applies to both the scooter-driven and the user-driven update path.
    #[serde(default = "default_radius")]
    pub radius_meters: f64,
}

fn default_radius() -> f64 { 50.0 }

impl Default for ProximityConfig {
    fn default() -> Self {
        Self { radius_meters: default_radius() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_recognition_program")]
    pub recognition_program: String,
    #[serde(default)]
    pub recognition_args: Vec<String>,
    #[serde(default = "default_detection_program")]
    pub detection_program: String,
    #[serde(default)]
    pub detection_args: Vec<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_probe_width")]
    pub probe_width: u32,
    #[serde(default = "default_probe_height")]
    pub probe_height: u32,
}

fn default_recognition_program() -> String { "face_recognition".to_string() }
fn default_detection_program() -> String { "face_detection".to_string() }
fn default_timeout_seconds() -> u64 { 30 }
fn default_probe_width() -> u32 { 720 }
fn default_probe_height() -> u32 { 480 }

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            recognition_program: default_recognition_program(),
            recognition_args: Vec::new(),
            detection_program: default_detection_program(),
            detection_args: Vec::new(),
            timeout_seconds: default_timeout_seconds(),
            probe_width: default_probe_width(),
            probe_height: default_probe_height(),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Overrides the platform data directory when set.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_initial_backoff_ms() -> u64 { 100 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "configs/visiride.toml";
        Self::load_from_path(Path::new(config_path))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VisiRideError::Other(anyhow::anyhow!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| VisiRideError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Radius must be a usable distance
        if !self.proximity.radius_meters.is_finite()
            || self.proximity.radius_meters <= 0.0
            || self.proximity.radius_meters > 10_000.0
        {
            return Err(VisiRideError::Other(anyhow::anyhow!(
                "Proximity radius must be between 0 and 10000 meters, got {}",
                self.proximity.radius_meters
            )));
        }

        if self.classifier.timeout_seconds < 1 || self.classifier.timeout_seconds > 600 {
            return Err(VisiRideError::Other(anyhow::anyhow!(
                "Classifier timeout must be between 1 and 600 seconds, got {}",
                self.classifier.timeout_seconds
            )));
        }

        if self.classifier.probe_width == 0 || self.classifier.probe_width > 4096 {
            return Err(VisiRideError::Other(anyhow::anyhow!(
                "Probe width must be between 1 and 4096, got {}", self.classifier.probe_width
            )));
        }
        if self.classifier.probe_height == 0 || self.classifier.probe_height > 4096 {
            return Err(VisiRideError::Other(anyhow::anyhow!(
                "Probe height must be between 1 and 4096, got {}", self.classifier.probe_height
            )));
        }

        if self.classifier.recognition_program.trim().is_empty() {
            return Err(VisiRideError::Other(anyhow::anyhow!(
                "Recognition program must not be empty"
            )));
        }

        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(VisiRideError::Other(anyhow::anyhow!(
                "Retry attempts must be between 1 and 10, got {}", self.retry.max_attempts
            )));
        }

        Ok(())
    }
}
