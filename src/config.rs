use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings for ssbird
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SsbirdConfig {
    /// Native host process settings
    pub host: HostConfig,
    /// Remote endpoint settings
    pub remote: RemoteConfig,
    /// Local persistence of the publish configuration
    pub storage: StorageConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    /// Executable implementing the native messaging host
    pub command: String,
    /// Extra arguments passed to the host
    pub args: Vec<String>,
    /// How long to wait for the host to answer a request
    pub reply_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Download URL for the config document; `{index}` is the identity slot, `{id}` the document id
    pub config_url_template: String,
    /// Identity slots tried when the download is refused with 403
    pub max_config_attempts: u32,
    /// Per-request HTTP timeout
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the locally entered fields
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log directive when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON lines instead of human readable logs
    pub json_logs: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            command: "ssbird-host".to_string(),
            args: Vec::new(),
            reply_timeout_seconds: 300, // cloning a large repository can take minutes
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            config_url_template:
                "https://drive.google.com/u/{index}/uc?export=download&id={id}".to_string(),
            max_config_attempts: 5,
            request_timeout_seconds: 60,
            user_agent: concat!("ssbird/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".ssbird/config.json"),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl Default for SsbirdConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            remote: RemoteConfig::default(),
            storage: StorageConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl HostConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_seconds)
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Resolve the config document URL for one identity slot
    pub fn config_url(&self, index: u32, config_file_id: &str) -> String {
        self.config_url_template
            .replace("{index}", &index.to_string())
            .replace("{id}", config_file_id)
    }
}

impl SsbirdConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (ssbird.toml, .ssbird-rc)
    /// 3. Environment variables (prefixed with SSBIRD_)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("ssbird.toml").exists() {
            builder = builder.add_source(File::with_name("ssbird"));
        }

        if Path::new(".ssbird-rc").exists() {
            builder = builder.add_source(File::new(".ssbird-rc", config::FileFormat::Toml));
        }

        // SSBIRD_HOST__COMMAND=/usr/local/bin/ssbird-host
        builder = builder.add_source(
            Environment::with_prefix("SSBIRD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: SsbirdConfig = builder.build()?.try_deserialize()?;
        Ok(settings)
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

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<SsbirdConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = SsbirdConfig::load_env_file();
        SsbirdConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static SsbirdConfig> {
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
