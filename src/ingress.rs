// src/ingress.rs
//
// Producer half of the pipeline: one datagram socket, one reusable receive
// buffer, decode on the producer thread so the consumer sees typed events.
use crate::codec::{self, MAX_DATAGRAM};
use crate::config::IngressCfg;
use crate::event::BookEvent;
use crate::metrics;
use crate::net;
use crate::stats::PipelineStats;
use crate::util::{now_nanos, ShutdownFlag};
use anyhow::Context;
use log::{debug, info};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

/// Inter-poll sleep when no datagram is ready. Bounds CPU use and shutdown
/// latency, nothing else.
const IDLE_SLEEP: Duration = Duration::from_micros(100);

pub struct UdpIngress {
    sock: UdpSocket,
    joined: Option<(Ipv4Addr, Ipv4Addr)>,
    buf: Box<[u8; MAX_DATAGRAM]>,
    stats: Arc<PipelineStats>,
    shutdown: Arc<ShutdownFlag>,
}

impl UdpIngress {
    /// Bind (and optionally join) the ingress socket. Any failure here is
    /// fatal to startup.
    pub fn bind(
        cfg: &IngressCfg,
        stats: Arc<PipelineStats>,
        shutdown: Arc<ShutdownFlag>,
    ) -> anyhow::Result<Self> {
        let sock = net::ingress_socket(cfg).context("ingress socket")?;
        let joined = cfg
            .group
            .map(|g| (g, cfg.iface_addr.unwrap_or(Ipv4Addr::UNSPECIFIED)));
        match joined {
            Some((g, _)) => info!("ingress joined {}:{}", g, cfg.port),
            None => info!("ingress bound on {}", sock.local_addr().context("local addr")?),
        }
        Ok(Self {
            sock,
            joined,
            buf: Box::new([0u8; MAX_DATAGRAM]),
            stats,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.sock.local_addr()?)
    }

    /// Receive loop. Each good datagram is decoded, stamped with `t_rx` and
    /// handed to `sink`; the sink owns the enqueue stamp and the ring push.
    /// Parse failures are counted and skipped. Returns on shutdown, or with
    /// an error on a non-transient receive failure.
    pub fn listen(mut self, mut sink: impl FnMut(BookEvent)) -> anyhow::Result<()> {
        loop {
            if self.shutdown.is_raised() {
                break;
            }
            match self.sock.recv_from(&mut self.buf[..]) {
                Ok((n, _from)) => {
                    let t_rx = now_nanos();
                    match codec::decode(&self.buf[..n]) {
                        Ok(mut ev) => {
                            ev.t_rx = t_rx;
                            metrics::inc_ingress(n);
                            sink(ev);
                        }
                        Err(e) => {
                            self.stats.inc_parse_errors();
                            metrics::inc_parse_error();
                            debug!("dropping bad datagram ({n} bytes): {e}");
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(IDLE_SLEEP);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.leave_group();
                    return Err(e).context("ingress recv");
                }
            }
        }
        self.leave_group();
        info!("ingress listener stopped");
        Ok(())
    }

    fn leave_group(&self) {
        if let Some((group, iface)) = self.joined {
            let _ = self.sock.leave_multicast_v4(&group, &iface);
        }
    }
}

/// The producer-side sink: stamp `t_enq`, then a non-blocking push. A full
/// ring is a counted drop, never a wait.
pub fn ring_sink<'a>(
    ring: &'a crate::spsc::SpscRing<BookEvent>,
    stats: &'a PipelineStats,
) -> impl FnMut(BookEvent) + 'a {
    move |mut ev: BookEvent| {
        ev.t_enq = now_nanos();
        match ring.try_push(ev) {
            Ok(()) => stats.inc_pushed(),
            Err(_dropped) => {
                stats.inc_dropped();
                metrics::inc_ring_drop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spsc::SpscRing;

    #[test]
    fn ring_sink_counts_pushes_and_drops() {
        let ring = SpscRing::with_capacity(2); // one usable slot
        let stats = PipelineStats::default();
        {
            let mut sink = ring_sink(&ring, &stats);
            sink(BookEvent::default());
            sink(BookEvent::default());
        }
        let snap = stats.snapshot();
        assert_eq!(snap.events_pushed, 1);
        assert_eq!(snap.events_dropped, 1);
        let queued = ring.try_pop().unwrap();
        assert!(queued.t_enq > 0);
        assert!(ring.try_pop().is_none());
    }
}
