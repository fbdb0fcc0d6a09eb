//! Configuration module for netcfg
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/netcfg/netcfg.toml)
//! - User configuration (~/.netcfg.toml)
//! - Project configuration (./netcfg.toml)
//! - The file named by `NETCFG_CONFIG`
//! - Environment variables
//! - Command-line arguments
//!
//! Device inventory entries may live in the same file under `[[devices]]`,
//! or in a separate inventory file loaded with [`Config::load_inventory`].

use crate::vendor::{AdapterSettings, NetworkPlatform, NetworkTransport};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default settings
    pub defaults: Defaults,

    /// Colors and output settings
    pub colors: ColorsConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Device inventory
    pub devices: Vec<DeviceConfig>,
}

/// Default values applied to every device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Devices worked on concurrently
    pub forks: usize,

    /// Seconds allowed per device round-trip
    pub timeout: u64,

    /// Login user
    pub username: Option<String>,

    /// Login password
    pub password: Option<String>,

    /// Device platform
    pub platform: String,

    /// Session transport
    pub transport: String,

    /// Candidate file name on device storage
    pub candidate_file: String,

    /// Device file system for candidate and rollback files
    pub dest_file_system: String,

    /// Rollback artifact file name on device storage
    pub rollback_file: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            forks: 5,
            timeout: 60,
            username: None,
            password: None,
            platform: "cisco_ios".to_string(),
            transport: "ssh".to_string(),
            candidate_file: "candidate_config.txt".to_string(),
            dest_file_system: "flash:".to_string(),
            rollback_file: "rollback_config.txt".to_string(),
        }
    }
}

/// Colors and output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    /// Colorize human output
    pub enabled: bool,

    /// Color for added diff lines
    pub added: String,

    /// Color for removed diff lines
    pub removed: String,

    /// Color for errors
    pub error: String,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            added: "green".to_string(),
            removed: "red".to_string(),
            error: "bright red".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when no `-v` flag or `RUST_LOG` is given
    pub log_level: String,

    /// Output format: pretty, compact or json
    pub log_format: String,

    /// Include timestamps
    pub log_timestamp: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_format: "compact".to_string(),
            log_timestamp: true,
        }
    }
}

/// One device inventory entry. Unset fields fall back to [`Defaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Inventory name
    pub name: String,
    /// Address; the name is used when unset
    pub host: Option<String>,
    /// Port; 22 for SSH, 443 or 80 for the command API
    pub port: Option<u16>,
    /// Device platform
    pub platform: Option<String>,
    /// Session transport
    pub transport: Option<String>,
    /// Login user
    pub username: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Enable secret
    pub secret: Option<String>,
    /// Private key for key-based login
    pub key_file: Option<PathBuf>,
    /// Try key-based login
    pub use_keys: Option<bool>,
    /// Candidate file name on device storage
    pub candidate_file: Option<String>,
    /// Device file system
    pub dest_file_system: Option<String>,
    /// Rollback artifact file name
    pub rollback_file: Option<String>,
    /// Use HTTPS for the command API
    pub eapi_use_ssl: Option<bool>,
    /// Verify the command API's TLS certificate
    pub eapi_validate_certs: Option<bool>,
    /// Seconds per round-trip
    pub timeout: Option<u64>,
}

impl DeviceConfig {
    /// An entry with only a name set
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A device entry with every default applied.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// Inventory name
    pub name: String,
    /// Address
    pub host: String,
    /// Explicit port, if any
    pub port: Option<u16>,
    /// Device platform
    pub platform: NetworkPlatform,
    /// Session transport
    pub transport: NetworkTransport,
    /// Login user
    pub username: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// Enable secret
    pub secret: Option<String>,
    /// Private key file
    pub key_file: Option<PathBuf>,
    /// Try key-based login
    pub use_keys: bool,
    /// HTTPS for the command API
    pub eapi_use_ssl: bool,
    /// TLS verification for the command API
    pub eapi_validate_certs: bool,
    /// Adapter settings
    pub adapter: AdapterSettings,
}

impl DeviceSettings {
    /// Port the session connects to, explicit or the transport's default
    pub fn effective_port(&self) -> u16 {
        match (self.port, self.transport) {
            (Some(port), _) => port,
            (None, NetworkTransport::Ssh) => 22,
            (None, NetworkTransport::Eapi) if self.eapi_use_ssl => 443,
            (None, NetworkTransport::Eapi) => 80,
        }
    }

    /// `host:port` of the device, identifying it across inventory aliases
    pub fn address(&self) -> String {
        format!("{}:{}", self.host.to_lowercase(), self.effective_port())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InventoryFile {
    devices: Vec<DeviceConfig>,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        // Explicit path replaces the search
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        let mut paths = vec![PathBuf::from("/etc/netcfg/netcfg.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".netcfg.toml"));
            paths.push(home.join(".netcfg/config.toml"));
        }

        paths.push(PathBuf::from("netcfg.toml"));

        if let Ok(env_config) = std::env::var("NETCFG_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    fn parse<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parsed = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML: {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON: {}", path.display()))?,
            "toml" => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML: {}", path.display()))?,
            _ => toml::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };
        Ok(parsed)
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let file_config: Config = Self::parse(path)?;
        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; `other` wins for non-default values
    fn merge(&self, other: Config) -> Config {
        let base = Defaults::default();
        let pick = |theirs: String, ours: &String, default: &String| {
            if &theirs != default {
                theirs
            } else {
                ours.clone()
            }
        };

        let mut devices = self.devices.clone();
        for device in other.devices {
            match devices.iter_mut().find(|d| d.name == device.name) {
                Some(existing) => *existing = device,
                None => devices.push(device),
            }
        }

        Config {
            defaults: Defaults {
                forks: if other.defaults.forks != base.forks {
                    other.defaults.forks
                } else {
                    self.defaults.forks
                },
                timeout: if other.defaults.timeout != base.timeout {
                    other.defaults.timeout
                } else {
                    self.defaults.timeout
                },
                username: other
                    .defaults
                    .username
                    .or_else(|| self.defaults.username.clone()),
                password: other
                    .defaults
                    .password
                    .or_else(|| self.defaults.password.clone()),
                platform: pick(other.defaults.platform, &self.defaults.platform, &base.platform),
                transport: pick(
                    other.defaults.transport,
                    &self.defaults.transport,
                    &base.transport,
                ),
                candidate_file: pick(
                    other.defaults.candidate_file,
                    &self.defaults.candidate_file,
                    &base.candidate_file,
                ),
                dest_file_system: pick(
                    other.defaults.dest_file_system,
                    &self.defaults.dest_file_system,
                    &base.dest_file_system,
                ),
                rollback_file: pick(
                    other.defaults.rollback_file,
                    &self.defaults.rollback_file,
                    &base.rollback_file,
                ),
            },
            colors: ColorsConfig {
                enabled: self.colors.enabled && other.colors.enabled,
                ..other.colors
            },
            logging: other.logging,
            devices,
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // NETCFG_FORKS
        if let Ok(forks) = std::env::var("NETCFG_FORKS") {
            if let Ok(n) = forks.parse() {
                self.defaults.forks = n;
            }
        }

        // NETCFG_TIMEOUT
        if let Ok(timeout) = std::env::var("NETCFG_TIMEOUT") {
            if let Ok(n) = timeout.parse() {
                self.defaults.timeout = n;
            }
        }

        // NETCFG_USERNAME
        if let Ok(user) = std::env::var("NETCFG_USERNAME") {
            self.defaults.username = Some(user);
        }

        // NETCFG_PASSWORD
        if let Ok(password) = std::env::var("NETCFG_PASSWORD") {
            self.defaults.password = Some(password);
        }

        // NO_COLOR
        if std::env::var("NO_COLOR").is_ok() || std::env::var("NETCFG_NO_COLOR").is_ok() {
            self.colors.enabled = false;
        }

        // NETCFG_LOG_FORMAT
        if let Ok(format) = std::env::var("NETCFG_LOG_FORMAT") {
            self.logging.log_format = format;
        }
    }

    /// Add the devices listed in an inventory file (YAML, TOML or JSON)
    pub fn load_inventory(&mut self, path: &Path) -> Result<usize> {
        let inventory: InventoryFile = Self::parse(path)?;
        let count = inventory.devices.len();
        self.merge_devices(inventory.devices);
        Ok(count)
    }

    fn merge_devices(&mut self, devices: Vec<DeviceConfig>) {
        for device in devices {
            match self.devices.iter_mut().find(|d| d.name == device.name) {
                Some(existing) => *existing = device,
                None => self.devices.push(device),
            }
        }
    }

    /// Look up a device by inventory name
    pub fn device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Apply defaults to an inventory entry.
    pub fn resolve_device(&self, device: &DeviceConfig) -> Result<DeviceSettings> {
        if device.name.is_empty() && device.host.is_none() {
            bail!("Device entry needs a name or a host");
        }

        let platform_name = device
            .platform
            .as_deref()
            .unwrap_or(&self.defaults.platform);
        let platform: NetworkPlatform = platform_name
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("Device '{}'", device.name))?;

        let transport_name = device
            .transport
            .as_deref()
            .unwrap_or(&self.defaults.transport);
        let transport: NetworkTransport = transport_name
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("Device '{}'", device.name))?;

        let host = device.host.clone().unwrap_or_else(|| device.name.clone());
        let name = if device.name.is_empty() {
            host.clone()
        } else {
            device.name.clone()
        };

        Ok(DeviceSettings {
            name,
            host,
            port: device.port,
            platform,
            transport,
            username: device
                .username
                .clone()
                .or_else(|| self.defaults.username.clone()),
            password: device
                .password
                .clone()
                .or_else(|| self.defaults.password.clone()),
            secret: device.secret.clone(),
            key_file: device.key_file.clone(),
            use_keys: device.use_keys.unwrap_or(false),
            eapi_use_ssl: device.eapi_use_ssl.unwrap_or(true),
            eapi_validate_certs: device.eapi_validate_certs.unwrap_or(true),
            adapter: AdapterSettings {
                timeout: Some(device.timeout.unwrap_or(self.defaults.timeout)),
                candidate_file: device
                    .candidate_file
                    .clone()
                    .unwrap_or_else(|| self.defaults.candidate_file.clone()),
                dest_file_system: device
                    .dest_file_system
                    .clone()
                    .unwrap_or_else(|| self.defaults.dest_file_system.clone()),
                rollback_file: device
                    .rollback_file
                    .clone()
                    .unwrap_or_else(|| self.defaults.rollback_file.clone()),
            },
        })
    }

    /// Load from a specific file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.defaults.forks, 5);
        assert_eq!(config.defaults.timeout, 60);
        assert_eq!(config.defaults.platform, "cisco_ios");
        assert_eq!(config.defaults.dest_file_system, "flash:");
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_config_merge() {
        let base = Config {
            devices: vec![DeviceConfig::named("r1")],
            ..Config::default()
        };
        let other = Config {
            defaults: Defaults {
                forks: 10,
                platform: "arista_eos".to_string(),
                ..Defaults::default()
            },
            devices: vec![
                DeviceConfig {
                    host: Some("192.0.2.1".to_string()),
                    ..DeviceConfig::named("r1")
                },
                DeviceConfig::named("sw1"),
            ],
            ..Config::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.defaults.forks, 10);
        assert_eq!(merged.defaults.platform, "arista_eos");
        assert_eq!(merged.devices.len(), 2);
        assert_eq!(merged.devices[0].host.as_deref(), Some("192.0.2.1"));
    }

    #[test]
    fn test_device_address_uses_transport_port() {
        let config = Config::default();
        let ssh = config
            .resolve_device(&DeviceConfig {
                host: Some("R1.lab".to_string()),
                ..DeviceConfig::named("r1")
            })
            .unwrap();
        assert_eq!(ssh.address(), "r1.lab:22");

        let eapi = config
            .resolve_device(&DeviceConfig {
                host: Some("r1.lab".to_string()),
                transport: Some("eapi".to_string()),
                ..DeviceConfig::named("r1-api")
            })
            .unwrap();
        assert_eq!(eapi.address(), "r1.lab:443");

        let plain = config
            .resolve_device(&DeviceConfig {
                host: Some("r1.lab".to_string()),
                transport: Some("eapi".to_string()),
                eapi_use_ssl: Some(false),
                port: Some(8080),
                ..DeviceConfig::named("r1-http")
            })
            .unwrap();
        assert_eq!(plain.address(), "r1.lab:8080");
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("NETCFG_FORKS", "20");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.defaults.forks, 20);
        std::env::remove_var("NETCFG_FORKS");
    }

    #[test]
    fn test_resolve_device_applies_defaults() {
        let mut config = Config::default();
        config.defaults.username = Some("admin".to_string());
        let device = DeviceConfig {
            platform: Some("eos".to_string()),
            transport: Some("eapi".to_string()),
            timeout: Some(15),
            ..DeviceConfig::named("sw1")
        };

        let settings = config.resolve_device(&device).unwrap();
        assert_eq!(settings.host, "sw1");
        assert_eq!(settings.platform, NetworkPlatform::AristaEos);
        assert_eq!(settings.transport, NetworkTransport::Eapi);
        assert_eq!(settings.username.as_deref(), Some("admin"));
        assert_eq!(settings.adapter.timeout, Some(15));
        assert_eq!(settings.adapter.candidate_file, "candidate_config.txt");
        assert!(settings.eapi_use_ssl);
    }

    #[test]
    fn test_resolve_device_rejects_unknown_platform() {
        let device = DeviceConfig {
            platform: Some("vyos".to_string()),
            ..DeviceConfig::named("edge1")
        };
        let err = Config::default().resolve_device(&device).unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown platform"));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[defaults]
forks = 8
dest_file_system = "bootflash:"

[[devices]]
name = "r1"
host = "192.0.2.10"
secret = "enable"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.defaults.forks, 8);
        assert_eq!(config.defaults.dest_file_system, "bootflash:");
        assert_eq!(config.device("r1").and_then(|d| d.secret.as_deref()), Some("enable"));
    }

    #[test]
    fn test_load_yaml_inventory() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "devices:\n  - name: sw1\n    platform: arista_eos\n    transport: eapi\n  - name: r1\n"
        )
        .unwrap();

        let mut config = Config::default();
        assert_eq!(config.load_inventory(file.path()).unwrap(), 2);
        assert_eq!(
            config.device("sw1").and_then(|d| d.transport.as_deref()),
            Some("eapi")
        );
    }
}
