use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::soda::transport::{DEFAULT_BASELINE_RETRY_AFTER, DEFAULT_MAX_ATTEMPTS};
use crate::soda::workflow::{DEFAULT_GEOCODING_CHECK_INTERVAL, DEFAULT_GEOCODING_MAX_CHECKS};
use crate::soda::{GeocodingDrainPolicy, PollPolicy};

/// Main configuration structure for soda-workflow
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SodaWorkflowConfig {
    /// Remote service connection settings
    pub service: ServiceConfig,
    /// Long-running operation polling
    pub polling: PollingConfig,
    /// Geocoding drain loop
    pub geocoding: GeocodingConfig,
    /// Where the outstanding operation is kept between runs
    pub persistence: PersistenceConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the data domain, e.g. https://data.example.gov
    pub base_url: String,
    /// App token sent as X-App-Token (can be set via env var)
    pub app_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Client-side rate limit
    pub requests_per_second: u32,
    pub burst_capacity: u32,
    pub request_timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            app_token: None,
            username: None,
            password: None,
            requests_per_second: 5,
            burst_capacity: 10,
            request_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Polls allowed per accepted operation before giving up
    pub max_attempts: u32,
    /// Wait between polls when the server does not suggest one
    pub baseline_retry_after_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            baseline_retry_after_seconds: DEFAULT_BASELINE_RETRY_AFTER.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub check_interval_seconds: u64,
    /// Checks before giving up; 0 waits indefinitely
    pub max_checks: u32,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: DEFAULT_GEOCODING_CHECK_INTERVAL.as_secs(),
            max_checks: DEFAULT_GEOCODING_MAX_CHECKS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub state_file: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(".soda-workflow/outstanding.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or EnvFilter directive
    pub log_level: String,
    /// Emit JSON lines instead of human readable output
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl SodaWorkflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (soda-workflow.toml, .soda-workflow-rc)
    /// 3. Environment variables (prefixed with SODA_WORKFLOW_, sections split by `__`)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("soda-workflow.toml").exists() {
            builder = builder.add_source(File::with_name("soda-workflow"));
        }

        if Path::new(".soda-workflow-rc").exists() {
            builder = builder.add_source(File::new(".soda-workflow-rc", FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("SODA_WORKFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: SodaWorkflowConfig = builder.build()?.try_deserialize()?;

        if loaded.service.app_token.is_none() {
            if let Ok(token) = std::env::var("SODA_APP_TOKEN") {
                loaded.service.app_token = Some(token);
            }
        }

        Ok(loaded)
    }

    /// Parse configuration from TOML text, filling gaps with defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            max_attempts: self.polling.max_attempts,
            baseline_retry_after: Duration::from_secs(self.polling.baseline_retry_after_seconds),
        }
    }

    pub fn geocoding_policy(&self) -> GeocodingDrainPolicy {
        GeocodingDrainPolicy {
            check_interval: Duration::from_secs(self.geocoding.check_interval_seconds),
            max_checks: (self.geocoding.max_checks > 0).then_some(self.geocoding.max_checks),
        }
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<SodaWorkflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = SodaWorkflowConfig::load_env_file();
        SodaWorkflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static SodaWorkflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
