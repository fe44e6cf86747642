use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the relay. Loopback by default; the relay serves
    /// exactly one local consumer.
    pub host: String,
    /// Port 0 asks the OS for an ephemeral port at bind time.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub connect_timeout_seconds: u64,
    /// Total per-attempt bound for manifest fetches.
    pub manifest_timeout_seconds: u64,
    /// Per-read bound for streamed media fetches. Long transfers are never
    /// cut short; a stalled upstream still times out between reads.
    pub read_timeout_seconds: u64,
    /// Attempt ceiling for transient upstream failures.
    pub max_attempts: u32,
    /// Linear backoff base: retry n waits `backoff_base_ms * n`.
    pub backoff_base_ms: u64,
    /// Applied when the caller-supplied headers carry no User-Agent.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 10,
            manifest_timeout_seconds: 15,
            read_timeout_seconds: 15,
            max_attempts: 3,
            backoff_base_ms: 500,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    #[must_use]
    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_seconds)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Chunk ceiling when relaying segments and encryption keys.
    pub segment_chunk_bytes: usize,
    /// Chunk ceiling when relaying whole-file media.
    pub file_chunk_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            segment_chunk_bytes: 8 * 1024,
            file_chunk_bytes: 16 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Load config file if provided
        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (REELPIPE_SERVER_HOST, etc.)
        builder = builder.add_source(
            Environment::with_prefix("REELPIPE")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Requested bind address (the effective port is known after bind when
    /// the configured port is 0)
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Validate the configuration, collecting every problem at once
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.upstream.max_attempts == 0 {
            errors.push("upstream.max_attempts must be at least 1".to_string());
        }
        if self.upstream.manifest_timeout_seconds == 0 {
            errors.push("upstream.manifest_timeout_seconds must be at least 1".to_string());
        }
        if self.upstream.read_timeout_seconds == 0 {
            errors.push("upstream.read_timeout_seconds must be at least 1".to_string());
        }
        if self.relay.segment_chunk_bytes == 0 {
            errors.push("relay.segment_chunk_bytes must be positive".to_string());
        }
        if self.relay.file_chunk_bytes == 0 {
            errors.push("relay.file_chunk_bytes must be positive".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got \"{}\"",
                self.logging.format
            ));
        }
        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("unknown logging.level \"{}\"", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. REELPIPE_CONFIG_PATH environment variable (explicit path)
/// 2. ./config.yaml (current working directory)
/// 3. Fall back to environment variables only
pub fn load_config() -> anyhow::Result<Config> {
    let config_path = std::env::var("REELPIPE_CONFIG_PATH")
        .ok()
        .filter(|p| Path::new(p).exists())
        .or_else(|| {
            let cwd = "config.yaml";
            Path::new(cwd).exists().then(|| cwd.to_string())
        });

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        match Config::from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                eprintln!("Falling back to environment variables");
                Config::from_env().unwrap_or_default()
            }
        }
    } else {
        Config::from_env().unwrap_or_default()
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 0);
        assert_eq!(config.upstream.max_attempts, 3);
        assert_eq!(config.upstream.backoff_base(), Duration::from_millis(500));
        assert_eq!(config.upstream.manifest_timeout(), Duration::from_secs(15));
        assert_eq!(config.relay.segment_chunk_bytes, 8192);
        assert_eq!(config.relay.file_chunk_bytes, 16384);
        assert!(!config.upstream.user_agent.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bind_address() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 4455,
            },
            ..Config::default()
        };

        assert_eq!(config.bind_address(), "127.0.0.1:4455");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.upstream.max_attempts = 0;
        config.relay.segment_chunk_bytes = 0;
        config.logging.format = "xml".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("max_attempts")));
        assert!(errors.iter().any(|e| e.contains("segment_chunk_bytes")));
        assert!(errors.iter().any(|e| e.contains("logging.format")));
    }
}
