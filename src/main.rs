// src/main.rs
use bookfeed::config::AppConfig;
use bookfeed::consumer::{consume_loop, ConsumerCfg};
use bookfeed::event::BookEvent;
use bookfeed::ingress::{ring_sink, UdpIngress};
use bookfeed::metrics;
use bookfeed::publish::MulticastPublisher;
use bookfeed::spsc::SpscRing;
use bookfeed::stats::PipelineStats;
use bookfeed::util::{pin_to_core_if_set, ShutdownFlag};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let cfg_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    // Load config before logger to allow JSON formatting choice
    let cfg = AppConfig::from_file(&cfg_path)?;

    if cfg.general.json_logs {
        let mut b =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        b.format(|buf, record| {
            use std::io::Write;
            let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            writeln!(
                buf,
                "{{\"ts\":\"{}\",\"level\":\"{}\",\"target\":\"{}\",\"msg\":\"{}\"}}",
                ts,
                record.level(),
                record.target(),
                record.args().to_string().replace('"', "'")
            )
        })
        .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("loaded config: {cfg:?}");

    let shutdown = Arc::new(ShutdownFlag::default());
    {
        let s = shutdown.clone();
        ctrlc::set_handler(move || {
            s.raise();
        })?;
    }

    // Summary trigger channel (for HTTP /summary) and metrics HTTP
    let (summary_tx, summary_rx): (Sender<()>, Receiver<()>) = bounded(8);
    let metrics_handle = cfg
        .metrics
        .as_ref()
        .map(|m| metrics::spawn_http(m.bind.clone(), Some(summary_tx)));

    let stats = Arc::new(PipelineStats::default());
    let ring: Arc<SpscRing<BookEvent>> = Arc::new(SpscRing::with_capacity(cfg.general.ring_capacity));

    // Egress before ingress: a publisher that cannot initialize should fail
    // startup before we join the feed group.
    let publisher = MulticastPublisher::bind(&cfg.egress)?;
    info!("republishing to {}", publisher.destination());

    let ingress = UdpIngress::bind(&cfg.ingress, stats.clone(), shutdown.clone())?;

    let consumer_cfg = ConsumerCfg {
        summary_every: cfg.telemetry.summary_every,
        heartbeat_interval: Duration::from_millis(cfg.egress.heartbeat_interval_ms),
    };
    let t_consumer = {
        let ring = ring.clone();
        let stats = stats.clone();
        let shutdown = shutdown.clone();
        let core = cfg.cpu.consumer_core;
        thread::Builder::new().name("book".into()).spawn(move || {
            pin_to_core_if_set(core);
            if let Err(e) = consume_loop(ring, publisher, stats, consumer_cfg, shutdown, Some(summary_rx)) {
                error!("consumer failed: {e:?}");
            }
        })?
    };

    let t_producer = {
        let ring = ring.clone();
        let stats = stats.clone();
        let shutdown = shutdown.clone();
        let core = cfg.cpu.producer_core;
        thread::Builder::new().name("ingress".into()).spawn(move || {
            pin_to_core_if_set(core);
            let sink = ring_sink(&ring, &stats);
            if let Err(e) = ingress.listen(sink) {
                error!("ingress failed: {e:?}");
                // A dead listener means nothing will ever reach the book.
                shutdown.raise();
            }
        })?
    };

    // Join (log panics explicitly to aid diagnosis in production)
    if t_producer.join().is_err() {
        error!("ingress thread panicked");
        shutdown.raise();
    }
    if t_consumer.join().is_err() {
        error!("consumer thread panicked");
    }

    // Gracefully stop metrics HTTP (poke /shutdown and join)
    if let Some(m) = &cfg.metrics {
        request_http_shutdown(&m.bind);
    }
    if let Some(h) = metrics_handle {
        let _ = h.join();
    }
    info!("clean shutdown");
    Ok(())
}

fn request_http_shutdown(addr: &str) {
    use std::io::Write;
    if let Ok(mut s) = std::net::TcpStream::connect(addr) {
        let _ = s.write_all(b"GET /shutdown HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        let _ = s.flush();
    }
}
