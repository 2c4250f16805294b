// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub push: PushConfig,
    pub meeting_token: MeetingTokenConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection string, e.g. `sqlite://notifications.db`
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on how long the timer task sleeps between checks
    pub poll_interval_ms: u64,
    /// Maximum number of simultaneously armed triggers, 0 for unlimited
    #[serde(default)]
    pub max_armed_triggers: usize,
    /// Re-arm future jobs from the job store when the process starts
    #[serde(default = "default_recover_on_startup")]
    pub recover_on_startup: bool,
}

fn default_recover_on_startup() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingTokenConfig {
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Config::try_from(&Settings::default())?;

        let builder = Config::builder()
            // Built-in defaults so a missing file never leaves a section unset
            .add_source(defaults)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.database.min_connections > self.database.max_connections {
            return Err("Database min_connections cannot exceed max_connections".to_string());
        }

        if self.scheduler.poll_interval_ms == 0 {
            return Err("Scheduler poll_interval_ms must be greater than 0".to_string());
        }

        if self.push.endpoint.is_empty() {
            return Err("Push endpoint cannot be empty".to_string());
        }
        if self.push.timeout_seconds == 0 {
            return Err("Push timeout_seconds must be greater than 0".to_string());
        }

        if self.meeting_token.expiration_hours <= 0 {
            return Err("Meeting token expiration_hours must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://notifications.db".to_string(),
                max_connections: 5,
                min_connections: 1,
                connect_timeout_seconds: 30,
            },
            scheduler: SchedulerConfig {
                poll_interval_ms: 1000,
                max_armed_triggers: 0,
                recover_on_startup: true,
            },
            push: PushConfig {
                endpoint: "https://exp.host/--/api/v2/push/send".to_string(),
                timeout_seconds: 10,
                access_token: None,
            },
            meeting_token: MeetingTokenConfig {
                app_key: String::new(),
                app_secret: String::new(),
                expiration_hours: 23,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                tracing_endpoint: None,
            },
        }
    }
}
