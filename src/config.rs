// src/config.rs
use serde::Deserialize;
use std::{fs, net::Ipv4Addr, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub general: General,
    pub ingress: IngressCfg,
    pub egress: EgressCfg,
    #[serde(default)]
    pub telemetry: Telemetry,
    #[serde(default)]
    pub cpu: Cpu,
    pub metrics: Option<MetricsCfg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// SPSC ring capacity; rounded up to the next power of two.
    pub ring_capacity: usize,
    #[serde(default)]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngressCfg {
    /// Multicast group to join. Absent -> plain unicast listener.
    #[serde(default)]
    pub group: Option<Ipv4Addr>,
    pub port: u16,
    /// Local interface for the multicast join; wildcard when unset.
    #[serde(default)]
    pub iface_addr: Option<Ipv4Addr>,
    /// SO_RCVBUF hint; 0 leaves the OS default.
    #[serde(default)]
    pub recv_buffer_bytes: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressCfg {
    pub group: Ipv4Addr,
    pub port: u16,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Heartbeat cadence; 0 disables heartbeats.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Telemetry {
    /// Emit a latency/counter summary every N processed events.
    #[serde(default = "default_summary_every")]
    pub summary_every: u64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            summary_every: default_summary_every(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cpu {
    pub producer_core: Option<usize>,
    pub consumer_core: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsCfg {
    /// Bind address for the Prometheus exporter (e.g. "0.0.0.0:9100").
    pub bind: String,
}

fn default_ttl() -> u32 {
    1
}
fn default_heartbeat_ms() -> u64 {
    1000
}
fn default_summary_every() -> u64 {
    10
}

impl AppConfig {
    pub fn from_file(p: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(p)?;
        let cfg: AppConfig = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(group) = self.ingress.group {
            if !group.is_multicast() {
                anyhow::bail!("ingress.group must be a multicast IPv4 address");
            }
        }
        if !self.egress.group.is_multicast() {
            anyhow::bail!("egress.group must be a multicast IPv4 address");
        }
        if self.general.ring_capacity < 2 {
            anyhow::bail!("general.ring_capacity must be >= 2");
        }
        if self.egress.ttl > 255 {
            anyhow::bail!("egress.ttl must be in [0, 255]");
        }
        if self.telemetry.summary_every == 0 {
            anyhow::bail!("telemetry.summary_every must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> anyhow::Result<AppConfig> {
        let cfg: AppConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    const MINIMAL: &str = r#"
        [general]
        ring_capacity = 1024

        [ingress]
        group = "224.0.0.1"
        port = 12345

        [egress]
        group = "224.0.0.1"
        port = 12346
    "#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.egress.ttl, 1);
        assert_eq!(cfg.egress.heartbeat_interval_ms, 1000);
        assert_eq!(cfg.telemetry.summary_every, 10);
        assert!(cfg.metrics.is_none());
        assert!(cfg.cpu.producer_core.is_none());
    }

    #[test]
    fn unicast_ingress_allowed() {
        let cfg = parse(
            r#"
            [general]
            ring_capacity = 64
            [ingress]
            port = 9000
            [egress]
            group = "239.1.1.1"
            port = 9001
        "#,
        )
        .unwrap();
        assert!(cfg.ingress.group.is_none());
    }

    #[test]
    fn non_multicast_groups_rejected() {
        assert!(parse(&MINIMAL.replace("224.0.0.1", "10.0.0.1")).is_err());
    }

    #[test]
    fn tiny_ring_rejected() {
        assert!(parse(&MINIMAL.replace("ring_capacity = 1024", "ring_capacity = 1")).is_err());
    }
}
