//! Configuration for an overlay receiver.

use overlay_discovery::relay::{RELAY_CONNECT_TIMEOUT, RELAY_KEEPALIVE_INTERVAL};
use overlay_discovery::{RegionId, RelayMap, RelayRegion};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Overlay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OverlayConfig {
    /// STUN discovery channel
    #[serde(default)]
    pub stun: StunConfig,
    /// Relay channel and region selection
    #[serde(default)]
    pub relay: RelayConfig,
    /// Node update channels
    #[serde(default)]
    pub channels: ChannelConfig,
}

/// STUN discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StunConfig {
    /// Public binding-discovery service, `host:port`
    #[serde(default = "default_stun_server")]
    pub server: String,
    /// Local bind address for the shared socket
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Seconds between binding probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    /// Receive buffer size in bytes
    #[serde(default = "default_max_datagram")]
    pub max_datagram_size: usize,
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// Region used when path measurement has no preference
    #[serde(default = "default_region_id")]
    pub default_region: RegionId,
    /// Name logged for the default region
    #[serde(default = "default_region_name")]
    pub default_region_name: String,
    /// Seconds to wait for the relay to acknowledge registration
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Seconds between relay keepalives
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    /// Seconds each region gets to answer a latency probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Candidate relay regions
    #[serde(default)]
    pub regions: Vec<RelayRegion>,
}

/// Node channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    /// Buffer size of the inbound and outbound node channels
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

// Default values

fn default_stun_server() -> String {
    "stun.l.google.com:19302".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:0".to_string()
}

fn default_probe_interval() -> u64 {
    30
}

fn default_max_datagram() -> usize {
    4 * 1024
}

fn default_region_id() -> RegionId {
    1
}

fn default_region_name() -> String {
    "NYC".to_string()
}

fn default_connect_timeout() -> u64 {
    RELAY_CONNECT_TIMEOUT.as_secs()
}

fn default_keepalive_interval() -> u64 {
    RELAY_KEEPALIVE_INTERVAL.as_secs()
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_capacity() -> usize {
    8
}

impl Default for StunConfig {
    fn default() -> Self {
        Self {
            server: default_stun_server(),
            bind_addr: default_bind_addr(),
            probe_interval_secs: default_probe_interval(),
            max_datagram_size: default_max_datagram(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_region: default_region_id(),
            default_region_name: default_region_name(),
            connect_timeout_secs: default_connect_timeout(),
            keepalive_interval_secs: default_keepalive_interval(),
            probe_timeout_secs: default_probe_timeout(),
            regions: Vec::new(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl StunConfig {
    /// Probe period as a `Duration`
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

impl RelayConfig {
    /// Registration timeout as a `Duration`
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Keepalive period as a `Duration`
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Per-region probe timeout as a `Duration`
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Candidate regions as a map.
    #[must_use]
    pub fn relay_map(&self) -> RelayMap {
        self.regions.iter().cloned().collect()
    }
}

impl OverlayConfig {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_host_port(&self.stun.server, "STUN server")?;

        self.stun
            .bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {e}", self.stun.bind_addr))?;

        if self.stun.probe_interval_secs == 0 {
            anyhow::bail!("STUN probe interval must be at least 1 second");
        }

        if !(512..=65535).contains(&self.stun.max_datagram_size) {
            anyhow::bail!("Max datagram size must be between 512 and 65535 bytes");
        }

        if self.relay.connect_timeout_secs == 0
            || self.relay.keepalive_interval_secs == 0
            || self.relay.probe_timeout_secs == 0
        {
            anyhow::bail!("Relay timeouts and intervals must be at least 1 second");
        }

        // Region 0 stands for "no relay home"
        if self.relay.default_region == 0 {
            anyhow::bail!("Default relay region must not be 0");
        }

        for region in &self.relay.regions {
            if region.region_id == 0 {
                anyhow::bail!("Relay region '{}' must not use id 0", region.region_name);
            }
            validate_host_port(&region.addr, "Relay region")?;
        }

        if self.channels.capacity == 0 {
            anyhow::bail!("Node channel capacity must be at least 1");
        }

        Ok(())
    }
}

/// Validate host:port format
fn validate_host_port(addr: &str, name: &str) -> anyhow::Result<()> {
    let Some((host, port_str)) = addr.rsplit_once(':') else {
        anyhow::bail!("{name} '{addr}' missing port (expected format: host:port)");
    };

    let port: u16 = port_str
        .parse()
        .map_err(|_| anyhow::anyhow!("{name} '{addr}' has invalid port: {port_str}"))?;

    if port == 0 {
        anyhow::bail!("{name} '{addr}' has invalid port: 0");
    }

    if host.is_empty() {
        anyhow::bail!("{name} '{addr}' has empty hostname");
    }

    if host.contains("..") || host.contains('/') || host.contains('\\') {
        anyhow::bail!("{name} '{addr}' contains invalid characters");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OverlayConfig::default();
        assert_eq!(config.stun.server, "stun.l.google.com:19302");
        assert_eq!(config.stun.probe_interval(), Duration::from_secs(30));
        assert_eq!(config.stun.max_datagram_size, 4096);
        assert_eq!(config.relay.default_region, 1);
        assert_eq!(config.relay.default_region_name, "NYC");
        assert_eq!(config.channels.capacity, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = OverlayConfig::default();

        config.stun.server = "no-port".to_string();
        assert!(config.validate().is_err());

        config.stun.server = default_stun_server();
        config.stun.max_datagram_size = 100;
        assert!(config.validate().is_err());

        config.stun.max_datagram_size = 4096;
        config.channels.capacity = 0;
        assert!(config.validate().is_err());

        config.channels.capacity = 8;
        config.relay.regions.push(RelayRegion::new(2, "bad", "Bad", "relay:0"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_region_zero_rejected() {
        let mut config = OverlayConfig::default();
        config.relay.default_region = 0;
        assert!(config.validate().is_err());

        config.relay.default_region = 1;
        config
            .relay
            .regions
            .push(RelayRegion::new(0, "zzz", "Nowhere", "127.0.0.1:3340"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Nowhere"), "{err}");
    }

    #[test]
    fn test_host_port() {
        assert!(validate_host_port("relay.example.com:3340", "x").is_ok());
        assert!(validate_host_port("[::1]:3340", "x").is_ok());
        assert!(validate_host_port(":3340", "x").is_err());
        assert!(validate_host_port("host:http", "x").is_err());
        assert!(validate_host_port("../etc:1", "x").is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: OverlayConfig = toml::from_str(
            r#"
            [stun]
            probe_interval_secs = 5

            [[relay.regions]]
            region_id = 7
            region_code = "sea"
            region_name = "Seattle"
            addr = "127.0.0.1:3340"
            "#,
        )
        .unwrap();

        assert_eq!(config.stun.probe_interval_secs, 5);
        assert_eq!(config.stun.server, "stun.l.google.com:19302");
        assert_eq!(config.relay.relay_map().get(7).unwrap().region_name, "Seattle");
        assert_eq!(config.channels.capacity, 8);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/overlay.toml");

        let mut config = OverlayConfig::default();
        config
            .relay
            .regions
            .push(RelayRegion::new(1, "nyc", "New York City", "127.0.0.1:3340"));
        config.save(&path).unwrap();

        let loaded = OverlayConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
