// src/metrics.rs
use crate::latency::StageDeltas;
use crossbeam_channel::Sender;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::net::ToSocketAddrs;
use std::thread;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static INGRESS_PACKETS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("ingress_packets", "Datagrams received by the listener")
        .expect("ingress_packets");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static INGRESS_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("ingress_bytes", "Bytes received by the listener")
        .expect("ingress_bytes");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static PARSE_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("parse_errors", "Datagrams rejected by the wire codec")
        .expect("parse_errors");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static RING_DROPS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("ring_drops", "Events dropped on SPSC ring overflow")
        .expect("ring_drops");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static EVENTS_PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("events_processed", "Events consumed by the book engine")
        .expect("events_processed");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static BOOK_ANOMALIES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("book_anomalies", "Semantic anomalies skipped by the book engine"),
        &["kind"],
    )
    .expect("book_anomalies");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static LIVE_ORDERS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("book_live_orders", "Resting orders across all symbols")
        .expect("book_live_orders");
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

static PUBLISH_MESSAGES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("publish_messages", "Multicast messages republished")
        .expect("publish_messages");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static PUBLISH_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("publish_bytes", "Multicast bytes republished").expect("publish_bytes");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static PUBLISH_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("publish_errors", "Failed multicast sends").expect("publish_errors");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

const STAGE_BUCKETS: &[f64] = &[1e-7, 2e-7, 5e-7, 1e-6, 2e-6, 5e-6, 1e-5, 2e-5, 5e-5, 1e-4];

fn stage_histogram(name: &str, help: &str) -> Histogram {
    let h = Histogram::with_opts(HistogramOpts::new(name, help).buckets(STAGE_BUCKETS.to_vec()))
        .expect("stage histogram");
    REGISTRY.register(Box::new(h.clone())).ok();
    h
}

static STAGE_EXCH_TO_RX: Lazy<Histogram> =
    Lazy::new(|| stage_histogram("stage_exch_to_rx_seconds", "Exchange to UDP receive latency"));
static STAGE_RX_TO_ENQ: Lazy<Histogram> =
    Lazy::new(|| stage_histogram("stage_rx_to_enq_seconds", "Receive to ring enqueue latency"));
static STAGE_ENQ_TO_DEQ: Lazy<Histogram> =
    Lazy::new(|| stage_histogram("stage_enq_to_deq_seconds", "Ring residence latency"));
static E2E_LATENCY: Lazy<Histogram> =
    Lazy::new(|| stage_histogram("e2e_latency_seconds", "End-to-end event latency"));

pub fn inc_ingress(bytes: usize) {
    INGRESS_PACKETS.inc();
    INGRESS_BYTES.inc_by(bytes as u64);
}

pub fn inc_parse_error() {
    PARSE_ERRORS.inc();
}

pub fn inc_ring_drop() {
    RING_DROPS.inc();
}

pub fn inc_events_processed() {
    EVENTS_PROCESSED.inc();
}

pub fn inc_book_anomaly(kind: &str) {
    BOOK_ANOMALIES.with_label_values(&[kind]).inc();
}

pub fn set_live_orders(n: usize) {
    LIVE_ORDERS.set(n as i64);
}

pub fn inc_publish(bytes: usize) {
    PUBLISH_MESSAGES.inc();
    PUBLISH_BYTES.inc_by(bytes as u64);
}

pub fn inc_publish_error() {
    PUBLISH_ERRORS.inc();
}

pub fn observe_stage_ns(d: StageDeltas) {
    const NS: f64 = 1e-9;
    STAGE_EXCH_TO_RX.observe(d.exch_to_rx as f64 * NS);
    STAGE_RX_TO_ENQ.observe(d.rx_to_enq as f64 * NS);
    STAGE_ENQ_TO_DEQ.observe(d.enq_to_deq as f64 * NS);
    E2E_LATENCY.observe(d.total as f64 * NS);
}

/// Serve the Prometheus scrape endpoint plus liveness probes. `/summary`
/// asks the consumer (via the channel) to emit an immediate stats summary.
pub fn spawn_http<A: ToSocketAddrs + Send + 'static>(
    addr: A,
    summary_trigger: Option<Sender<()>>,
) -> thread::JoinHandle<()> {
    let addr_string = addr
        .to_socket_addrs()
        .ok()
        .and_then(|mut it| it.next())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "0.0.0.0:9100".to_string());

    thread::spawn(move || {
        let server = tiny_http::Server::http(&addr_string).expect("start metrics http");
        log::info!("prometheus metrics listening on http://{addr_string}/metrics");
        let encoder = TextEncoder::new();
        loop {
            if let Ok(req) = server.recv() {
                let url = req.url().to_string();
                if url == "/metrics" {
                    let metric_families = REGISTRY.gather();
                    let mut buf = Vec::with_capacity(16 * 1024);
                    encoder.encode(&metric_families, &mut buf).ok();
                    let resp = tiny_http::Response::from_data(buf)
                        .with_status_code(200)
                        .with_header(
                            tiny_http::Header::from_bytes(
                                &b"Content-Type"[..],
                                &b"text/plain; version=0.0.4"[..],
                            )
                            .unwrap(),
                        );
                    let _ = req.respond(resp);
                } else if url == "/summary" {
                    let ok = summary_trigger
                        .as_ref()
                        .map(|tx| tx.try_send(()).is_ok())
                        .unwrap_or(false);
                    let status = if ok { 202 } else { 503 };
                    let _ = req.respond(tiny_http::Response::empty(status));
                } else if url == "/live" || url == "/healthz" {
                    let _ =
                        req.respond(tiny_http::Response::from_string("OK").with_status_code(200));
                } else if url == "/ready" {
                    let _ = req
                        .respond(tiny_http::Response::from_string("READY").with_status_code(200));
                } else if url == "/shutdown" {
                    let _ =
                        req.respond(tiny_http::Response::from_string("BYE").with_status_code(200));
                    break;
                } else {
                    let _ = req.respond(tiny_http::Response::empty(404));
                }
            }
        }
    })
}
