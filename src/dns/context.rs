//! The `ResolverContext` holds the state shared by every resolution

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use derive_more::{Display, Error};
use serde_derive::Deserialize;

use crate::dns::client::{DnsClient, DnsNetworkClient, DNS_PORT};

/// IPv4 addresses of a.root-servers.net through m.root-servers.net
pub const ROOT_SERVERS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(170, 247, 170, 2),
    Ipv4Addr::new(192, 33, 4, 12),
    Ipv4Addr::new(199, 7, 91, 13),
    Ipv4Addr::new(192, 203, 230, 10),
    Ipv4Addr::new(192, 5, 5, 241),
    Ipv4Addr::new(192, 112, 36, 4),
    Ipv4Addr::new(198, 97, 190, 53),
    Ipv4Addr::new(192, 36, 148, 17),
    Ipv4Addr::new(192, 58, 128, 30),
    Ipv4Addr::new(193, 0, 14, 129),
    Ipv4Addr::new(199, 7, 83, 42),
    Ipv4Addr::new(202, 12, 27, 33),
];

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    #[display(fmt = "invalid configuration: {}", reason)]
    Invalid { reason: String },
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err)
    }
}

type Result<T> = std::result::Result<T, ConfigError>;

/// Tunables for the referral walk
///
/// Every field has a default, so a TOML file only needs to name the values
/// it changes.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Servers every walk (and every alias restart) begins from
    pub root_servers: Vec<Ipv4Addr>,
    /// Destination port for all queries
    pub port: u16,
    /// Receive timeout for a single exchange, in milliseconds
    pub timeout_ms: u64,
    /// Queries one resolution may send, sub-resolutions included
    pub max_hops: usize,
    /// How deep glue-less nameserver lookups may nest
    pub max_ns_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            root_servers: ROOT_SERVERS.to_vec(),
            port: DNS_PORT,
            timeout_ms: 2000,
            max_hops: 64,
            max_ns_depth: 4,
        }
    }
}

impl ResolverConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ResolverConfig> {
        let contents = fs::read_to_string(path)?;
        ResolverConfig::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<ResolverConfig> {
        let config: ResolverConfig = toml::from_str(contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_servers.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "root_servers must not be empty".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "timeout_ms must be positive".to_string(),
            });
        }
        if self.max_hops == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_hops must be positive".to_string(),
            });
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration plus the transport used to reach nameservers
pub struct ResolverContext {
    pub config: ResolverConfig,
    pub client: Box<dyn DnsClient + Sync + Send>,
}

impl ResolverContext {
    /// Context talking UDP to the configured port
    pub fn new(config: ResolverConfig) -> Arc<ResolverContext> {
        let client = DnsNetworkClient::new(config.timeout()).with_port(config.port);

        ResolverContext::with_client(config, Box::new(client))
    }

    pub fn with_client(
        config: ResolverConfig,
        client: Box<dyn DnsClient + Sync + Send>,
    ) -> Arc<ResolverContext> {
        Arc::new(ResolverContext { config, client })
    }
}
