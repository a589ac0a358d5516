//! Connection settings
//!
//! Node address, private key and request TTL come from command-line flags,
//! environment variables or the configuration file, in that order.
//! [`SettingsManager`] validates values before persisting them and merges
//! all sources into [`Settings`].

use std::net::SocketAddr;

use crate::config::{ConfigManager, Defaults, TransferSettings};
use crate::error::{Error, Result};
use crate::identity::{Identity, KeyIdentity};
use crate::ids::OwnerId;

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub key: Option<String>,
    pub ttl: Option<u32>,
}

/// Fully resolved connection settings
#[derive(Debug)]
pub struct Settings {
    pub host: SocketAddr,
    pub identity: KeyIdentity,
    pub ttl: u32,
    pub transfer: TransferSettings,
    pub defaults: Defaults,
}

/// Parse a `host:port` node address and resolve it to a socket address.
///
/// An empty host part means `0.0.0.0`. Names are resolved on the runtime's
/// blocking pool.
pub async fn parse_host(addr: &str) -> Result<SocketAddr> {
    let addr = addr.trim();
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidInput(format!("address '{addr}' must have form host:port")))?;

    let port: u16 = port
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid port in address '{addr}'")))?;
    let host = match host.trim_start_matches('[').trim_end_matches(']') {
        "" => "0.0.0.0",
        h => h,
    };

    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::InvalidInput(format!("can't resolve '{addr}': {e}")))?
        .next()
        .ok_or_else(|| Error::InvalidInput(format!("'{addr}' resolved to no addresses")))
}

/// Manager for persisted connection settings
#[derive(Debug, Clone)]
pub struct SettingsManager {
    config_manager: ConfigManager,
}

impl SettingsManager {
    /// Create a new SettingsManager with a specific ConfigManager
    pub fn with_config_manager(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Create a new SettingsManager using the default config location
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_manager: ConfigManager::new()?,
        })
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    /// Validate and persist the node address, returning the resolved form
    pub async fn set_host(&self, addr: &str) -> Result<SocketAddr> {
        let resolved = parse_host(addr).await?;
        let mut config = self.config_manager.load()?;
        config.host = Some(resolved.to_string());
        self.config_manager.save(&config)?;
        tracing::info!(host = %resolved, "Node address saved");
        Ok(resolved)
    }

    /// Validate and persist the private key, returning its owner id
    pub fn set_key(&self, key: &str) -> Result<OwnerId> {
        let identity = KeyIdentity::load(key)?;
        let mut config = self.config_manager.load()?;
        config.key = Some(key.to_string());
        self.config_manager.save(&config)?;
        let owner = identity.owner_id();
        tracing::info!(%owner, "Private key saved");
        Ok(owner)
    }

    /// Merge overrides with the configuration file
    pub async fn resolve(&self, overrides: &Overrides) -> Result<Settings> {
        let config = self.config_manager.load()?;

        let host = overrides
            .host
            .as_deref()
            .or(config.host.as_deref())
            .ok_or_else(|| {
                Error::Config("node address is not set; use --host or 'ocli set host'".into())
            })?;
        let key = overrides
            .key
            .as_deref()
            .or(config.key.as_deref())
            .ok_or_else(|| {
                Error::Config("private key is not set; use --key or 'ocli set key'".into())
            })?;

        Ok(Settings {
            host: parse_host(host).await?,
            identity: KeyIdentity::load(key)?,
            ttl: overrides.ttl.unwrap_or(config.ttl),
            transfer: config.transfer,
            defaults: config.defaults,
        })
    }
}
