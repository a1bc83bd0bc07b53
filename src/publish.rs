// src/publish.rs
//
// Downstream fan-out: one JSON envelope per datagram onto the egress
// multicast group. Best-effort; a failed send is a counted error, never a
// retry. The socket is written only by the consumer thread.
use crate::book::TopOfBook;
use crate::config::EgressCfg;
use crate::event::Side;
use crate::net;
use crate::util::now_nanos;
use log::debug;
use serde::Serialize;
use std::net::{SocketAddrV4, UdpSocket};

pub const MSG_BOOK_SUMMARY: u8 = 0;
pub const MSG_TRADE_UPDATE: u8 = 1;
pub const MSG_HEARTBEAT: u8 = 2;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: u8,
    symbol: &'a str,
    timestamp: u64,
    data: T,
}

/// Top-of-book digest published after every order-affecting event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BookSummary {
    pub best_bid_price: f64,
    pub best_bid_size: u64,
    pub best_ask_price: f64,
    pub best_ask_size: u64,
    pub spread: f64,
    pub midprice: f64,
    pub quote_imbalance: f64,
}

impl BookSummary {
    /// Derive the digest from a top-of-book snapshot. Spread and midprice
    /// need both sides quoted; imbalance needs any size at all.
    pub fn from_top(top: &TopOfBook) -> Self {
        let (spread, midprice) = if top.bid_price > 0.0 && top.ask_price > 0.0 {
            (
                top.ask_price - top.bid_price,
                (top.bid_price + top.ask_price) / 2.0,
            )
        } else {
            (0.0, 0.0)
        };
        let total = top.bid_size + top.ask_size;
        let quote_imbalance = if total > 0 {
            (top.bid_size as f64 - top.ask_size as f64) / total as f64
        } else {
            0.0
        };
        Self {
            best_bid_price: top.bid_price,
            best_bid_size: top.bid_size,
            best_ask_price: top.ask_price,
            best_ask_size: top.ask_size,
            spread,
            midprice,
            quote_imbalance,
        }
    }
}

#[derive(Serialize)]
struct TradeBody {
    price: f64,
    size: u32,
    aggressor_side: &'static str,
}

#[derive(Serialize)]
struct HeartbeatBody {
    messages_sent: u64,
    bytes_sent: u64,
}

/// Serialize one envelope into `scratch` (cleared first). Split out from the
/// socket so the framing is testable.
pub fn encode_envelope<T: Serialize>(
    scratch: &mut Vec<u8>,
    kind: u8,
    symbol: &str,
    timestamp: u64,
    data: T,
) -> serde_json::Result<()> {
    scratch.clear();
    serde_json::to_writer(
        &mut *scratch,
        &Envelope {
            kind,
            symbol,
            timestamp,
            data,
        },
    )
}

pub struct MulticastPublisher {
    sock: UdpSocket,
    dst: SocketAddrV4,
    scratch: Vec<u8>,
    messages_sent: u64,
    bytes_sent: u64,
    send_errors: u64,
}

impl MulticastPublisher {
    pub fn bind(cfg: &EgressCfg) -> anyhow::Result<Self> {
        let (sock, dst) = net::egress_socket(cfg)?;
        Ok(Self {
            sock,
            dst,
            scratch: Vec::with_capacity(512),
            messages_sent: 0,
            bytes_sent: 0,
            send_errors: 0,
        })
    }

    pub fn destination(&self) -> SocketAddrV4 {
        self.dst
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }

    pub fn publish_book_summary(&mut self, symbol: &str, summary: BookSummary) {
        self.send(MSG_BOOK_SUMMARY, symbol, now_nanos(), summary);
    }

    pub fn publish_trade(
        &mut self,
        symbol: &str,
        price: f64,
        size: u32,
        aggressor: Side,
        timestamp: u64,
    ) {
        self.send(
            MSG_TRADE_UPDATE,
            symbol,
            timestamp,
            TradeBody {
                price,
                size,
                aggressor_side: aggressor.as_wire(),
            },
        );
    }

    pub fn publish_heartbeat(&mut self) {
        let body = HeartbeatBody {
            messages_sent: self.messages_sent,
            bytes_sent: self.bytes_sent,
        };
        self.send(MSG_HEARTBEAT, "", now_nanos(), body);
    }

    fn send<T: Serialize>(&mut self, kind: u8, symbol: &str, timestamp: u64, data: T) {
        if encode_envelope(&mut self.scratch, kind, symbol, timestamp, data).is_err() {
            self.send_errors += 1;
            crate::metrics::inc_publish_error();
            return;
        }
        match self.sock.send_to(&self.scratch, self.dst) {
            Ok(n) => {
                self.messages_sent += 1;
                self.bytes_sent += n as u64;
                crate::metrics::inc_publish(n);
            }
            Err(e) => {
                self.send_errors += 1;
                crate::metrics::inc_publish_error();
                debug!("multicast send failed: {e}");
            }
        }
    }
}
