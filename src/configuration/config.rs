use super::types::ServerRole;
use crate::error_handling::types::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Runtime parameters of the capture layer.
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration. The values end up in the capture file name
/// (`<log_dir>/<role>_<packet_version>_<packet_type>_<stamp>.txt`) and in the
/// `#packetversion` header line.
///
/// # Examples
///
/// ```
/// use packet_logger::configuration::{Config, ServerRole};
///
/// let config = Config::from_toml_str("role = \"login\"\npacket_type = \"main\"").unwrap();
/// assert_eq!(config.role, ServerRole::Login);
/// assert_eq!(config.packet_type, "main");
/// ```
///
/// # Fields Overview
///
/// - `role`: server process the layer is attached to (`login`, `char` or `map`)
/// - `packet_version`: protocol version number written in the name and header
/// - `packet_type`: protocol flavour label, embedded verbatim in the file name
/// - `log_dir`: directory receiving one capture file per connection
/// - `sync_records`: force each record to stable storage with `sync_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub role: ServerRole,
    pub packet_version: u32,
    pub packet_type: String,
    pub log_dir: PathBuf,
    pub sync_records: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: ServerRole::default(),
            packet_version: 20190530,
            packet_type: String::from("unknown"),
            log_dir: PathBuf::from("log"),
            sync_records: false,
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that end up in file names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_version == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "packet_version must be greater than 0",
            )));
        }

        let safe = Regex::new(r"^[A-Za-z0-9.-]+$")
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        if !safe.is_match(&self.packet_type) {
            return Err(ConfigError::InvalidValue(format!(
                "packet_type {:?} must only contain letters, digits, '.' or '-'",
                self.packet_type
            )));
        }

        if self.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(String::from(
                "log_dir must not be empty",
            )));
        }
        Ok(())
    }
}
