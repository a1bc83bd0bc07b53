// src/net.rs
use crate::config::{EgressCfg, IngressCfg};
use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

/// Build the ingress datagram socket: wildcard bind, address reuse, optional
/// multicast join, nonblocking. A failed join is fatal to initialization.
pub fn ingress_socket(cfg: &IngressCfg) -> anyhow::Result<UdpSocket> {
    let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket")?;

    sock.set_reuse_address(true).ok();
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    sock.set_reuse_port(true).ok();

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), cfg.port);
    sock.bind(&bind_addr.into()).context("bind")?;

    // Tolerate bursts while the producer is parsing
    if cfg.recv_buffer_bytes > 0 {
        let _ = sock.set_recv_buffer_size(cfg.recv_buffer_bytes as usize);
    }

    if let Some(group) = cfg.group {
        let iface = cfg.iface_addr.unwrap_or(Ipv4Addr::UNSPECIFIED);
        sock.join_multicast_v4(&group, &iface)
            .context("join_multicast_v4")?;
    }

    let s: UdpSocket = sock.into();
    s.set_nonblocking(true).context("set nonblocking")?;
    Ok(s)
}

/// Build the egress sender socket and the destination group address.
pub fn egress_socket(cfg: &EgressCfg) -> anyhow::Result<(UdpSocket, SocketAddrV4)> {
    let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket")?;
    sock.set_reuse_address(true).ok();
    sock.set_multicast_ttl_v4(cfg.ttl).context("set ttl")?;

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    sock.bind(&bind_addr.into()).context("bind")?;

    let dst = SocketAddrV4::new(cfg.group, cfg.port);
    Ok((sock.into(), dst))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicast_ingress_binds_ephemeral() {
        let cfg = IngressCfg {
            group: None,
            port: 0,
            iface_addr: None,
            recv_buffer_bytes: 0,
        };
        let sock = ingress_socket(&cfg).unwrap();
        assert_ne!(sock.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn egress_socket_carries_group_destination() {
        let cfg = EgressCfg {
            group: Ipv4Addr::new(224, 0, 0, 1),
            port: 12346,
            ttl: 1,
            heartbeat_interval_ms: 1000,
        };
        let (_sock, dst) = egress_socket(&cfg).unwrap();
        assert_eq!(dst, SocketAddrV4::new(Ipv4Addr::new(224, 0, 0, 1), 12346));
    }
}
