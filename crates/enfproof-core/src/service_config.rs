//! Service configuration
//!
//! TOML-based configuration for the storage backend, intake staging
//! directory, worker tuning, and the ENF algorithm parameters.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::EnfConfig;

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub enf: EnfConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// PostgreSQL connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_database() -> String {
    "enfproof".to_string()
}
fn default_user() -> String {
    "enfproof_user".to_string()
}
fn default_password() -> String {
    "enfproof_pass".to_string()
}
fn default_max_connections() -> u32 {
    10
}

/// Rendered-artifact blob directory
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifact_directory")]
    pub base_directory: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            base_directory: default_artifact_directory(),
        }
    }
}

fn default_artifact_directory() -> String {
    "./artifacts".to_string()
}

/// Intake staging directory for submitted inputs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntakeConfig {
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
        }
    }
}

fn default_data_directory() -> String {
    "./data/jobs".to_string()
}

/// Worker loop tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    /// A `Processing` job older than this is treated as abandoned.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,
    /// Decode target before ENF downsampling; also the rate of the staged
    /// WAV handed to the audio-fingerprint collaborator.
    #[serde(default = "default_decode_sample_rate")]
    pub decode_sample_rate: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_attempts: default_max_attempts(),
            stale_after_secs: default_stale_after_secs(),
            decode_sample_rate: default_decode_sample_rate(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    2
}
fn default_max_attempts() -> i32 {
    3
}
fn default_stale_after_secs() -> i64 {
    7200
}
fn default_decode_sample_rate() -> u32 {
    44100
}

impl ServiceConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let config: ServiceConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?;
        config.enf.validate()?;
        Ok(config)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                postgres: PostgresConfig::default(),
                artifacts: ArtifactsConfig::default(),
            },
            intake: IntakeConfig::default(),
            worker: WorkerConfig::default(),
            enf: EnfConfig::default(),
        }
    }
}
