use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for the ticket pipeline
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Workflow engine and notification hub settings
    pub engine: EngineConfig,
    /// Built-in stage processor settings
    pub processors: ProcessorConfig,
    /// Input data locations
    pub data: DataConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable output
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Events queued per observer before it is considered failed and dropped
    pub observer_buffer: usize,
    /// Time allowed for in-flight advance requests on shutdown
    pub shutdown_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Category accepted by the category check
    pub required_category: String,
    /// Days before the SLA deadline at or below which risk is High
    pub high_risk_days: i64,
    /// Days before the SLA deadline at or below which risk is Medium
    pub medium_risk_days: i64,
    /// Owner spaces accepted by the app owner check
    pub allowed_owner_spaces: Vec<String>,
    /// Owner email domains accepted by the app owner check
    pub allowed_owner_domains: Vec<String>,
    /// JSON file with ownership records keyed by AIT number
    pub ownership_data_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// JSON file with the initial ticket batch
    pub tickets_file: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            observer_buffer: 256,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            required_category: "IAM".to_string(),
            high_risk_days: 2,
            medium_risk_days: 5,
            allowed_owner_spaces: vec!["IAM-Space".to_string(), "Security-Space".to_string()],
            allowed_owner_domains: vec!["example.com".to_string()],
            ownership_data_file: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (ticket-pipeline.toml, or `path` when given)
    /// 3. Environment variables (prefixed with TICKET_PIPELINE__)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path.to_path_buf()));
            }
            None if Path::new("ticket-pipeline.toml").exists() => {
                builder = builder.add_source(File::with_name("ticket-pipeline"));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("TICKET_PIPELINE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("processors.allowed_owner_spaces")
                .with_list_parse_key("processors.allowed_owner_domains"),
        );

        let config = builder.build().context("Failed to read configuration sources")?;
        let pipeline_config: PipelineConfig = config
            .try_deserialize()
            .context("Invalid pipeline configuration")?;
        pipeline_config.validate()?;
        Ok(pipeline_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.processors.high_risk_days > self.processors.medium_risk_days {
            anyhow::bail!(
                "processors.high_risk_days ({}) must not exceed processors.medium_risk_days ({})",
                self.processors.high_risk_days,
                self.processors.medium_risk_days
            );
        }
        if self.engine.observer_buffer == 0 {
            anyhow::bail!("engine.observer_buffer must be at least 1");
        }
        Ok(())
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
}
