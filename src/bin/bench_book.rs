// Synthetic book-engine throughput check: phased adds, size modifies and
// cancels across a handful of symbols, reporting events/sec per phase.
use bookfeed::book::BookEngine;
use bookfeed::event::{BookEvent, EventKind, Side};
use std::time::Instant;

fn parse_arg_usize(args: &[String], idx: usize, default: usize) -> usize {
    args.get(idx)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

fn symbol_for(i: usize) -> String {
    format!("SYM{:02}", i)
}

fn add_event(symbol: &str, oid: u64, i: usize) -> BookEvent {
    BookEvent {
        kind: EventKind::AddOrder,
        symbol: symbol.into(),
        order_id: format!("o{oid}"),
        side: if i & 1 == 0 { Side::Bid } else { Side::Ask },
        price: 100.0 + (i % 200) as f64 * 0.01,
        size: 100 + (i % 50) as u32,
        ..BookEvent::default()
    }
}

fn main() {
    // Args: [symbol_count] [orders_per_symbol]
    let args: Vec<String> = std::env::args().collect();
    let symbol_count = parse_arg_usize(&args, 1, 8);
    let orders_per_symbol = parse_arg_usize(&args, 2, 50_000);

    let mut engine = BookEngine::new();
    let mut total_events: usize = 0;
    let start_total = Instant::now();

    // Phase 1: Adds
    let t0 = Instant::now();
    for s in 0..symbol_count {
        let symbol = symbol_for(s);
        for i in 0..orders_per_symbol {
            let oid = ((s as u64) << 32) | (i as u64);
            engine.apply(&add_event(&symbol, oid, i));
            total_events += 1;
        }
    }
    let adds_dur = t0.elapsed();

    // Phase 2: Mods on about half of the orders
    let t1 = Instant::now();
    for s in 0..symbol_count {
        let symbol = symbol_for(s);
        let mut x: u64 = 0x9E3779B97F4A7C15; // xorshift64* state
        for _ in 0..orders_per_symbol / 2 {
            x ^= x >> 12;
            x ^= x << 25;
            x ^= x >> 27;
            x = x.wrapping_mul(0x2545F4914F6CDD1D);
            let i = (x as usize) % orders_per_symbol;
            let oid = ((s as u64) << 32) | (i as u64);
            let ev = BookEvent {
                kind: EventKind::ModifyOrder,
                symbol: symbol.clone(),
                order_id: format!("o{oid}"),
                size: 1 + (x & 0xFF) as u32,
                ..BookEvent::default()
            };
            engine.apply(&ev);
            total_events += 1;
        }
    }
    let mods_dur = t1.elapsed();

    // Phase 3: Cancel every 3rd order
    let t2 = Instant::now();
    for s in 0..symbol_count {
        let symbol = symbol_for(s);
        for i in (0..orders_per_symbol).step_by(3) {
            let oid = ((s as u64) << 32) | (i as u64);
            let ev = BookEvent {
                kind: EventKind::CancelOrder,
                symbol: symbol.clone(),
                order_id: format!("o{oid}"),
                ..BookEvent::default()
            };
            engine.apply(&ev);
            total_events += 1;
        }
    }
    let dels_dur = t2.elapsed();

    // Touch the tops so the hot accessors stay in the measurement
    let mut depth_levels = 0usize;
    for s in 0..symbol_count {
        if let Some(book) = engine.book(&symbol_for(s)) {
            let (bids, asks) = book.depth(5);
            depth_levels += bids.len() + asks.len();
        }
    }

    let total_dur = start_total.elapsed();
    println!(
        "bench_book: symbols={} orders/symbol={} total_events={} live_orders={} depth_levels={} \
         total_time_ms={:.3} adds_ms={:.3} mods_ms={:.3} dels_ms={:.3} throughput_meps={:.3}",
        symbol_count,
        orders_per_symbol,
        total_events,
        engine.live_orders(),
        depth_levels,
        total_dur.as_secs_f64() * 1000.0,
        adds_dur.as_secs_f64() * 1000.0,
        mods_dur.as_secs_f64() * 1000.0,
        dels_dur.as_secs_f64() * 1000.0,
        (total_events as f64) / 1_000_000.0 / total_dur.as_secs_f64(),
    );
}
