//! Configuration management
//!
//! Settings come from built-in defaults, an optional TOML file and
//! `JAILED_FTP_*` environment variables, in increasing priority. The result is
//! immutable for the life of the process.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::auth::{MemoryUserStore, UserRecord};
use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "JAILED_FTP_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";
const ENV_PREFIX: &str = "JAILED_FTP";

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// IP address the control, passive and static listeners bind to
    pub bind_address: String,

    /// Port for FTP control connections
    pub control_port: u16,

    /// Inclusive port range for PASV data connections
    pub passive_port_min: u16,
    pub passive_port_max: u16,

    /// Address advertised in PASV replies. Defaults to the local address of
    /// each control connection.
    #[serde(default)]
    pub passive_address: Option<String>,

    /// Port for the read-only HTTP file server
    pub static_port: u16,

    /// Directory holding every instance's data
    pub base_data_dir: String,

    /// Namespace below `base_data_dir`; generated and stored when absent
    #[serde(default)]
    pub instance_id: Option<String>,

    /// How long a PASV listener waits for the client to connect
    pub data_connection_timeout_secs: u64,

    /// Maximum FTP command line length
    pub max_command_length: usize,

    /// Buffer size for file transfers
    pub buffer_size: usize,

    /// Text of the 220 greeting
    pub greeting: String,

    #[serde(default)]
    pub users: Vec<UserRecord>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            control_port: 2100,
            passive_port_min: 2101,
            passive_port_max: 2109,
            passive_address: None,
            static_port: 8000,
            base_data_dir: "./userdata".to_string(),
            instance_id: None,
            data_connection_timeout_secs: 30,
            max_command_length: 512,
            buffer_size: 8192,
            greeting: "Welcome to the FTP Server!".to_string(),
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Loads the file named by `JAILED_FTP_CONFIG` (or `config.toml`) if it
    /// exists, with environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(Path::new(&path))
    }

    /// Loads configuration from `path` (optional) with environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let settings = Config::builder()
            .set_default("bind_address", defaults.bind_address)?
            .set_default("control_port", i64::from(defaults.control_port))?
            .set_default("passive_port_min", i64::from(defaults.passive_port_min))?
            .set_default("passive_port_max", i64::from(defaults.passive_port_max))?
            .set_default("static_port", i64::from(defaults.static_port))?
            .set_default("base_data_dir", defaults.base_data_dir)?
            .set_default(
                "data_connection_timeout_secs",
                defaults.data_connection_timeout_secs as i64,
            )?
            .set_default("max_command_length", defaults.max_command_length as i64)?
            .set_default("buffer_size", defaults.buffer_size as i64)?
            .set_default("greeting", defaults.greeting)?
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.passive_port_min > self.passive_port_max {
            return Err(ConfigError::Invalid(
                "passive_port_min must not exceed passive_port_max".into(),
            ));
        }

        if self.passive_port_min == 0 {
            return Err(ConfigError::Invalid("passive ports cannot be 0".into()));
        }

        if self.base_data_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("base_data_dir cannot be empty".into()));
        }

        self.bind_ip()?;
        self.passive_ip()?;

        if let Some(id) = &self.instance_id {
            let mut components = Path::new(id).components();
            let single = matches!(components.next(), Some(Component::Normal(_)))
                && components.next().is_none();
            if !single {
                return Err(ConfigError::Invalid(format!(
                    "instance_id must be a single directory name, got {id:?}"
                )));
            }
        }

        if self.data_connection_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "data_connection_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.buffer_size == 0 || self.max_command_length == 0 {
            return Err(ConfigError::Invalid(
                "buffer_size and max_command_length must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind_address {:?}", self.bind_address)))
    }

    /// Address advertised in PASV replies, if configured.
    pub fn passive_ip(&self) -> Result<Option<Ipv4Addr>, ConfigError> {
        self.passive_address
            .as_deref()
            .map(|addr| {
                addr.parse().map_err(|_| {
                    ConfigError::Invalid(format!("passive_address must be IPv4, got {addr:?}"))
                })
            })
            .transpose()
    }

    /// Get bind address and control port as socket address
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    pub fn static_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.static_port)
    }

    pub fn base_data_path(&self) -> PathBuf {
        PathBuf::from(&self.base_data_dir)
    }

    pub fn data_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.data_connection_timeout_secs)
    }

    /// Builds the user store from the configured records.
    pub fn user_store(&self) -> Result<MemoryUserStore, ConfigError> {
        Ok(MemoryUserStore::from_records(self.users.iter().cloned())?)
    }
}
