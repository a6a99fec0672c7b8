//! Settings parser for the murmur config.toml

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_FILENAME: &str = "config.toml";

/// Daemon (Tor) related settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonSettings {
    /// Explicit path to the tor executable. When unset, PATH is searched.
    pub executable: Option<PathBuf>,
    /// Loopback SOCKS listener port.
    pub socks_port: u16,
    /// Loopback control listener port.
    pub control_port: u16,
    /// GeoIP database file, when bundled.
    pub geoip_file: Option<PathBuf>,
    /// GeoIPv6 database file, when bundled.
    pub geoip6_file: Option<PathBuf>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            executable: None,
            socks_port: 9150,
            control_port: 9151,
            geoip_file: None,
            geoip6_file: None,
        }
    }
}

impl DaemonSettings {
    /// Loopback address the SOCKS listener binds to. Never non-local.
    pub fn socks_addr(&self) -> (IpAddr, u16) {
        (IpAddr::V4(Ipv4Addr::LOCALHOST), self.socks_port)
    }
}

/// Engine subprocess settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Program to launch, e.g. a bundled engine binary.
    pub program: PathBuf,
    /// Extra arguments placed before the generated ones.
    pub args: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("murmur-engine"),
            args: Vec::new(),
        }
    }
}

/// Top-level settings, loaded from `<config_dir>/murmur/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub daemon: DaemonSettings,
    pub engine: EngineSettings,
    /// Default per-request timeout for bridge commands, in seconds.
    /// Generous by default: requests ride onion-routed circuits.
    pub request_timeout_secs: Option<u64>,
}

impl Settings {
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Load settings from the given directory, falling back to defaults when
    /// the file does not exist.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILENAME);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Load settings from the user config directory.
    pub fn load() -> Result<Self> {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::load_from(&base.join("murmur"))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(Self::DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.daemon.socks_port, 9150);
        assert_eq!(
            settings.request_timeout(),
            std::time::Duration::from_secs(30)
        );
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME),
            "[daemon]\nsocks_port = 9250\n",
        )
        .unwrap();

        let settings = Settings::load_from(dir.path()).unwrap();
        assert_eq!(settings.daemon.socks_port, 9250);
        assert_eq!(settings.daemon.control_port, 9151);
        assert_eq!(settings.engine.program, PathBuf::from("murmur-engine"));
    }

    #[test]
    fn test_full_config_parsed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"
request_timeout_secs = 45

[daemon]
executable = "/opt/tor/bin/tor"
socks_port = 9050
control_port = 9051
geoip_file = "/opt/tor/share/geoip"

[engine]
program = "/usr/local/bin/engine"
args = ["--verbose"]
"#,
        )
        .unwrap();

        let settings = Settings::load_from(dir.path()).unwrap();
        assert_eq!(
            settings.daemon.executable,
            Some(PathBuf::from("/opt/tor/bin/tor"))
        );
        assert_eq!(settings.daemon.socks_port, 9050);
        assert_eq!(settings.engine.args, vec!["--verbose".to_string()]);
        assert_eq!(
            settings.request_timeout(),
            std::time::Duration::from_secs(45)
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "daemon = [[[").unwrap();

        let err = Settings::load_from(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_socks_addr_is_loopback() {
        let settings = Settings::default();
        let (addr, port) = settings.daemon.socks_addr();
        assert!(addr.is_loopback());
        assert_eq!(port, 9150);
    }
}
