// src/consumer.rs
//
// Consumer half: pop, stamp `t_deq`, apply to the book, republish, account
// latency. This thread is the only writer of the book table, the egress
// socket and the terminal.
use crate::book::{Applied, BookEngine};
use crate::event::BookEvent;
use crate::latency::LatencyRecorder;
use crate::metrics;
use crate::publish::{BookSummary, MulticastPublisher};
use crate::spsc::SpscRing;
use crate::stats::PipelineStats;
use crate::util::{now_nanos, ShutdownFlag};
use crossbeam_channel::Receiver;
use log::{info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct ConsumerCfg {
    /// Emit an aggregate summary every N processed events.
    pub summary_every: u64,
    /// Heartbeat cadence; zero disables.
    pub heartbeat_interval: Duration,
}

pub fn consume_loop(
    ring: Arc<SpscRing<BookEvent>>,
    mut publisher: MulticastPublisher,
    stats: Arc<PipelineStats>,
    cfg: ConsumerCfg,
    shutdown: Arc<ShutdownFlag>,
    summary_trigger: Option<Receiver<()>>,
) -> anyhow::Result<()> {
    let mut engine = BookEngine::new();
    let mut latency = LatencyRecorder::new();
    let mut processed: u64 = 0;
    let mut last_heartbeat = Instant::now();

    while !shutdown.is_raised() {
        if let Some(mut ev) = ring.try_pop() {
            ev.t_deq = now_nanos();
            latency.record(&ev);
            processed += 1;
            metrics::inc_events_processed();

            match engine.apply(&ev) {
                Applied::Book => {
                    let summary = BookSummary::from_top(&engine.top(&ev.symbol));
                    publisher.publish_book_summary(&ev.symbol, summary);
                }
                Applied::Trade {
                    price,
                    size,
                    aggressor,
                    timestamp,
                } => {
                    publisher.publish_trade(&ev.symbol, price, size, aggressor, timestamp);
                }
                Applied::Status { halted } => {
                    if halted {
                        warn!(
                            "trading halted on {}: {}",
                            ev.symbol,
                            if ev.status_message.is_empty() {
                                "(no reason given)"
                            } else {
                                &ev.status_message
                            }
                        );
                    }
                }
                Applied::Ignored | Applied::Rejected(_) => {}
            }

            if processed % cfg.summary_every == 0 {
                emit_summary(processed, &engine, &latency, &stats, &publisher);
            }
        } else {
            if let Some(ref rx) = summary_trigger {
                if rx.try_recv().is_ok() {
                    emit_summary(processed, &engine, &latency, &stats, &publisher);
                }
            }
            std::thread::yield_now();
        }

        if !cfg.heartbeat_interval.is_zero() && last_heartbeat.elapsed() >= cfg.heartbeat_interval {
            publisher.publish_heartbeat();
            last_heartbeat = Instant::now();
        }
    }

    // Remaining queued events are discarded on shutdown by design.
    emit_summary(processed, &engine, &latency, &stats, &publisher);
    info!("consumer stopped after {processed} events, {} left in ring", ring.len());
    Ok(())
}

fn emit_summary(
    processed: u64,
    engine: &BookEngine,
    latency: &LatencyRecorder,
    stats: &PipelineStats,
    publisher: &MulticastPublisher,
) {
    let snap = stats.snapshot();
    let anomalies = engine.anomalies();
    metrics::set_live_orders(engine.live_orders());
    info!(
        "processed={} symbols={} live_orders={} pushed={} dropped={} parse_errors={} \
         anomalies={} published={} publish_errors={} {}",
        processed,
        engine.symbol_count(),
        engine.live_orders(),
        snap.events_pushed,
        snap.events_dropped,
        snap.parse_errors,
        anomalies.total(),
        publisher.messages_sent(),
        publisher.send_errors(),
        latency.summary_line(),
    );
}
