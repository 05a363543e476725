//! tunelink-server specific configuration
//!
//! Merges command-line overrides with the TOML file into the settings the
//! service actually runs with.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tunelink_common::config::{prepare_root_folder, resolve_root_folder, TomlConfig};
use tunelink_common::{Error, Result};

/// Values given on the command line (or their environment fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
    pub jwt_secret: Option<String>,
}

/// Realtime channel settings
#[derive(Debug, Clone, Copy)]
pub struct RealtimeSettings {
    /// Close a bound channel after this long without an inbound frame
    pub idle_timeout: Duration,
    /// Outbound events queued per channel before further sends are dropped
    pub outbound_buffer: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            outbound_buffer: 64,
        }
    }
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub root_folder: PathBuf,
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub realtime: RealtimeSettings,
}

impl Config {
    /// Resolve configuration, creating the root folder if needed
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let root_folder = resolve_root_folder(cli.root_folder.as_deref(), toml);
        let db_path = prepare_root_folder(&root_folder)?;

        let port = cli.port.unwrap_or(toml.server.port);
        let bind_addr: SocketAddr = format!("{}:{}", toml.server.bind_address, port)
            .parse()
            .map_err(|e| {
                Error::Config(format!(
                    "invalid bind address {}:{}: {}",
                    toml.server.bind_address, port, e
                ))
            })?;

        let jwt_secret = cli
            .jwt_secret
            .clone()
            .or_else(|| toml.auth.jwt_secret.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "no token secret configured (set --jwt-secret or [auth].jwt_secret)".to_string(),
                )
            })?;

        if toml.realtime.outbound_buffer == 0 {
            return Err(Error::Config(
                "[realtime].outbound_buffer must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            root_folder,
            db_path,
            bind_addr,
            jwt_secret,
            jwt_issuer: toml.auth.issuer.clone().filter(|s| !s.is_empty()),
            realtime: RealtimeSettings {
                idle_timeout: Duration::from_secs(toml.realtime.idle_timeout_secs.max(1)),
                outbound_buffer: toml.realtime.outbound_buffer,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn overrides(dir: &TempDir) -> CliOverrides {
        CliOverrides {
            root_folder: Some(dir.path().join("root")),
            port: None,
            jwt_secret: Some("cli-secret".to_string()),
        }
    }

    #[test]
    fn test_resolve_merges_sources() {
        let dir = TempDir::new().unwrap();
        let mut toml = TomlConfig::default();
        toml.auth.jwt_secret = Some("toml-secret".to_string());
        toml.realtime.idle_timeout_secs = 45;

        let mut cli = overrides(&dir);
        cli.port = Some(6001);

        let config = Config::resolve(&cli, &toml).unwrap();
        assert_eq!(config.jwt_secret, "cli-secret");
        assert_eq!(config.bind_addr.port(), 6001);
        assert_eq!(config.realtime.idle_timeout, Duration::from_secs(45));
        assert!(config.db_path.ends_with("tunelink.db"));
        assert!(config.root_folder.is_dir());
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cli = overrides(&dir);
        cli.jwt_secret = None;

        let result = Config::resolve(&cli, &TomlConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut toml = TomlConfig::default();
        toml.server.bind_address = "not an address".to_string();

        assert!(Config::resolve(&overrides(&dir), &toml).is_err());
    }
}
