//! Low-latency market-data pipeline: UDP ingress, SPSC hand-off, per-symbol
//! limit-order-book reconstruction, and multicast republishing.
//!
//! The hot path is two threads. The producer owns the ingress socket,
//! decodes each datagram into a [`event::BookEvent`], stamps it, and pushes
//! it onto a lock-free [`spsc::SpscRing`]. The consumer pops, applies the
//! event to the [`book::BookEngine`], republishes top-of-book summaries and
//! trade prints via [`publish::MulticastPublisher`], and owns all printing.

pub mod book;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod event;
pub mod ingress;
pub mod latency;
pub mod metrics;
pub mod net;
pub mod publish;
pub mod spsc;
pub mod stats;
pub mod util;
