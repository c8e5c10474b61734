use std::env;
use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::message::MAX_PAYLOAD_BYTES;
use crate::transport::{ApnEndpoint, ConnectionTarget};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub apn: ApnConfig,
    #[serde(default)]
    pub failures: FailureSinkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApnConfig {
    /// Use the sandbox gateway and certificate
    #[serde(default)]
    pub sandbox: bool,
    /// Production certificate (PKCS#12), relative to `storage_path` unless absolute
    pub certificate: String,
    /// Sandbox certificate (PKCS#12), relative to `storage_path` unless absolute
    pub certificate_sandbox: String,
    /// Base directory for certificate files
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Certificate passphrase (optional)
    pub passphrase: Option<String>,
    /// `apns-topic` header, usually the app bundle id (optional)
    pub topic: Option<String>,
    /// Reject oversized payloads before sending them
    #[serde(default = "default_validate_payload_size")]
    pub validate_payload_size: bool,
    /// Largest encoded payload accepted when validation is on
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// Per-request timeout in seconds, applied by the transport
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailureSinkConfig {
    /// Sink backend: "log" (default), "broadcast" or "redis"
    #[serde(default = "default_failure_backend")]
    pub backend: String,
    /// Redis URL for the redis backend
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Pub/Sub channel failure events are published to
    #[serde(default = "default_failure_channel")]
    pub redis_channel: String,
    /// Buffer size of the broadcast backend
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_storage_path() -> String {
    "storage".to_string()
}

fn default_validate_payload_size() -> bool {
    true
}

fn default_max_payload_bytes() -> usize {
    MAX_PAYLOAD_BYTES
}

fn default_request_timeout() -> u64 {
    20
}

fn default_failure_backend() -> String {
    "log".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_failure_channel() -> String {
    "notifications:failed".to_string()
}

fn default_broadcast_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "ara-apn-channel".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("apn.sandbox", false)?
            .set_default("apn.storage_path", default_storage_path())?
            .set_default("failures.backend", default_failure_backend())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // APN__SANDBOX, APN__CERTIFICATE_SANDBOX, FAILURES__BACKEND, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl ApnConfig {
    pub fn endpoint(&self) -> ApnEndpoint {
        if self.sandbox {
            ApnEndpoint::Sandbox
        } else {
            ApnEndpoint::Production
        }
    }

    /// Certificate for the selected environment, joined onto `storage_path`
    pub fn certificate_path(&self) -> PathBuf {
        let certificate = if self.sandbox {
            &self.certificate_sandbox
        } else {
            &self.certificate
        };
        PathBuf::from(&self.storage_path).join(certificate)
    }

    /// Resolve endpoint and certificate once, before building a channel
    pub fn resolve(&self) -> ConnectionTarget {
        ConnectionTarget {
            endpoint: self.endpoint(),
            certificate_path: self.certificate_path(),
        }
    }
}

impl Default for FailureSinkConfig {
    fn default() -> Self {
        Self {
            backend: default_failure_backend(),
            redis_url: default_redis_url(),
            redis_channel: default_failure_channel(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
