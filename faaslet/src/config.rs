//! Configuration management

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use faaslet_functions::{DockerRuntimeConfig, FunctionsConfig, InvokerConfig};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub invocations: InvocationsConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Directory holding the function registry
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// Docker daemon address; unset uses the local defaults
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Seconds a timed-out container gets to stop before it is killed
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_host: None,
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InvocationsConfig {
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// How long finished async invocations stay pollable. 0 keeps them forever.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

impl Default for InvocationsConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            retention_secs: default_retention_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct MetricsConfig {
    /// Count failed invocations by function and failure kind
    #[serde(default)]
    pub record_failures: bool,
}

fn default_port() -> u16 {
    8300
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_stop_grace_secs() -> u64 {
    2
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_reap_interval_secs() -> u64 {
    60
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("function")
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Without an explicit path, `faaslet.toml` in the working directory is
    /// read if present. `FAASLET__SECTION__KEY` variables override the file.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("faaslet").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("FAASLET")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    pub fn docker(&self) -> DockerRuntimeConfig {
        DockerRuntimeConfig {
            docker_host: self.runtime.docker_host.clone(),
            ..Default::default()
        }
    }

    pub fn functions(&self) -> FunctionsConfig {
        FunctionsConfig {
            default_timeout: Duration::from_secs(self.invocations.default_timeout_secs),
            max_upload_bytes: self.server.max_upload_bytes,
            invoker: InvokerConfig {
                stop_grace: Duration::from_secs(self.runtime.stop_grace_secs),
                record_failures: self.metrics.record_failures,
            },
        }
    }
}
