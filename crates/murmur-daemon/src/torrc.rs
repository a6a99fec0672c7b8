//! Runtime configuration file generation for the Tor daemon
//!
//! The daemon is always run from a generated torrc scoped to the
//! application's private data directory. Listeners bind to loopback only;
//! disk caching and connection padding are disabled for constrained devices.

use std::path::{Path, PathBuf};

use murmur_core::prelude::*;

/// Description of the torrc the supervisor generates before each launch.
#[derive(Debug, Clone)]
pub struct TorConfig {
    pub data_dir: PathBuf,
    pub socks_port: u16,
    pub control_port: u16,
    pub geoip_file: Option<PathBuf>,
    pub geoip6_file: Option<PathBuf>,
}

impl TorConfig {
    pub fn new(data_dir: impl Into<PathBuf>, socks_port: u16, control_port: u16) -> Self {
        Self {
            data_dir: data_dir.into(),
            socks_port,
            control_port,
            geoip_file: None,
            geoip6_file: None,
        }
    }

    /// Render the torrc contents. Pure so the directives can be tested
    /// without touching the filesystem.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("DataDirectory {}\n", self.data_dir.display()));
        out.push_str(&format!("SocksPort 127.0.0.1:{}\n", self.socks_port));
        out.push_str(&format!("ControlPort 127.0.0.1:{}\n", self.control_port));
        out.push_str("CookieAuthentication 1\n");
        out.push_str("ClientOnly 1\n");

        if let Some(geoip) = &self.geoip_file {
            out.push_str(&format!("GeoIPFile {}\n", geoip.display()));
        }
        if let Some(geoip6) = &self.geoip6_file {
            out.push_str(&format!("GeoIPv6File {}\n", geoip6.display()));
        }

        // Constrained-device directives: no on-disk caching, no padding
        // variability.
        out.push_str("AvoidDiskWrites 1\n");
        out.push_str("ConnectionPadding 0\n");
        out.push_str("ReducedConnectionPadding 1\n");

        // Progress markers arrive on stdout; the monitor depends on this.
        out.push_str("Log notice stdout\n");

        out
    }

    /// Write the rendered torrc into the data directory, creating it if
    /// needed. Returns the torrc path for the daemon invocation.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        let path = dir.join("torrc");
        std::fs::write(&path, self.render())?;
        debug!("Wrote torrc to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TorConfig {
        TorConfig::new("/private/tor-data", 9150, 9151)
    }

    #[test]
    fn test_listeners_bind_loopback_only() {
        let rendered = config().render();
        assert!(rendered.contains("SocksPort 127.0.0.1:9150"));
        assert!(rendered.contains("ControlPort 127.0.0.1:9151"));
        assert!(!rendered.contains("0.0.0.0"));
    }

    #[test]
    fn test_control_auth_and_client_only() {
        let rendered = config().render();
        assert!(rendered.contains("CookieAuthentication 1"));
        assert!(rendered.contains("ClientOnly 1"));
    }

    #[test]
    fn test_constrained_device_directives() {
        let rendered = config().render();
        assert!(rendered.contains("AvoidDiskWrites 1"));
        assert!(rendered.contains("ConnectionPadding 0"));
        assert!(rendered.contains("ReducedConnectionPadding 1"));
    }

    #[test]
    fn test_geoip_directives_only_when_present() {
        let rendered = config().render();
        assert!(!rendered.contains("GeoIPFile"));

        let mut cfg = config();
        cfg.geoip_file = Some(PathBuf::from("/opt/geoip"));
        cfg.geoip6_file = Some(PathBuf::from("/opt/geoip6"));
        let rendered = cfg.render();
        assert!(rendered.contains("GeoIPFile /opt/geoip"));
        assert!(rendered.contains("GeoIPv6File /opt/geoip6"));
    }

    #[test]
    fn test_progress_logging_on_stdout() {
        assert!(config().render().contains("Log notice stdout"));
    }

    #[test]
    fn test_write_creates_dirs_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TorConfig::new(tmp.path().join("tor-data"), 9150, 9151);

        let path = cfg.write(tmp.path()).unwrap();
        assert!(path.exists());
        assert!(tmp.path().join("tor-data").exists());

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("DataDirectory"));
    }
}
