// src/book.rs
//
// Per-symbol limit order book keyed by exchange order id, with price-level
// aggregation and intrusive FIFO queues for price-time priority. Owned
// exclusively by the consumer thread; no interior synchronization.
use crate::event::{BookEvent, EventKind, Side};
use hashbrown::HashMap;
use slab::Slab;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BTreeMap;

type Handle = usize;

/// Total-order key over IEEE doubles so the price ladders can live in a
/// `BTreeMap`. Prices are compared exactly; the feed owns canonical tick
/// representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceKey(pub f64);

impl Eq for PriceKey {}

impl PartialOrd for PriceKey {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceKey {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone)]
struct Node {
    order_id: Box<str>,
    side: Side,
    price: f64,
    size: u32,
    // Exchange wall-clock stamp carried for downstream inspection
    #[allow(dead_code)]
    timestamp: u64,
    prev: Option<Handle>,
    next: Option<Handle>,
}

#[derive(Debug, Clone, Default)]
struct Level {
    head: Option<Handle>,
    tail: Option<Handle>,
    total_size: u64,
    count: usize,
}

impl Level {
    #[inline]
    fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Top-of-book snapshot; zeroed sides mean "no resting orders there".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TopOfBook {
    pub bid_price: f64,
    pub bid_size: u64,
    pub ask_price: f64,
    pub ask_size: u64,
}

/// One symbol's book: slab arena of order nodes, per-side price ladders of
/// FIFO levels, and an id index for O(1) order-keyed mutation.
#[derive(Default)]
pub struct OrderBook {
    orders: Slab<Node>,
    by_id: HashMap<Box<str>, Handle>,
    bids: BTreeMap<PriceKey, Level>,
    asks: BTreeMap<PriceKey, Level>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn levels_mut(&mut self, side: Side) -> &mut BTreeMap<PriceKey, Level> {
        match side {
            Side::Ask => &mut self.asks,
            _ => &mut self.bids,
        }
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.by_id.contains_key(order_id)
    }

    pub fn order_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Add a new order at the tail of its price level, creating the level on
    /// first use. Duplicate ids and unknown sides are anomalies.
    pub fn try_add(
        &mut self,
        order_id: &str,
        side: Side,
        price: f64,
        size: u32,
        timestamp: u64,
    ) -> Result<(), Anomaly> {
        if side == Side::Unknown {
            return Err(Anomaly::BadSide);
        }
        if self.by_id.contains_key(order_id) {
            return Err(Anomaly::DuplicateOrder);
        }
        self.add(order_id, side, price, size, timestamp);
        Ok(())
    }

    /// Size-only modify. A nonzero wire price that disagrees with the
    /// resting price is a price-changing modify, which the feed must express
    /// as cancel+add; size zero removes the order.
    pub fn try_modify(&mut self, order_id: &str, wire_price: f64, new_size: u32) -> Result<(), Anomaly> {
        let Some(&h) = self.by_id.get(order_id) else {
            return Err(Anomaly::UnknownOrder);
        };
        let resting = self.orders[h].price;
        if wire_price != 0.0 && wire_price != resting {
            return Err(Anomaly::PriceChangeModify);
        }
        if new_size == 0 {
            self.remove(h);
        } else {
            self.set_size(h, new_size);
        }
        Ok(())
    }

    pub fn try_cancel(&mut self, order_id: &str) -> Result<(), Anomaly> {
        let Some(&h) = self.by_id.get(order_id) else {
            return Err(Anomaly::UnknownOrder);
        };
        self.remove(h);
        Ok(())
    }

    fn add(&mut self, order_id: &str, side: Side, price: f64, size: u32, timestamp: u64) {
        let h = self.orders.insert(Node {
            order_id: order_id.into(),
            side,
            price,
            size,
            timestamp,
            prev: None,
            next: None,
        });
        let prev_tail = {
            let lvl = self.levels_mut(side).entry(PriceKey(price)).or_default();
            lvl.tail
        };
        if let Some(t) = prev_tail {
            self.orders[t].next = Some(h);
        }
        self.orders[h].prev = prev_tail;
        {
            let lvl = self.levels_mut(side).entry(PriceKey(price)).or_default();
            if prev_tail.is_none() {
                lvl.head = Some(h);
            }
            lvl.tail = Some(h);
            lvl.count += 1;
            lvl.total_size += u64::from(size);
        }
        self.by_id.insert(order_id.into(), h);
    }

    /// Replace an order's size in place; level aggregate follows. FIFO
    /// position is retained (size-only modifies keep time priority here).
    fn set_size(&mut self, h: Handle, new_size: u32) {
        let (price, side, old_size) = {
            let n = &self.orders[h];
            (n.price, n.side, n.size)
        };
        self.orders[h].size = new_size;
        if let Some(lvl) = self.levels_mut(side).get_mut(&PriceKey(price)) {
            lvl.total_size = lvl.total_size - u64::from(old_size) + u64::from(new_size);
        }
    }

    /// Unlink an order from its level FIFO, erase the level if it empties,
    /// and drop the node and id entry.
    fn remove(&mut self, h: Handle) {
        let (price, side, prev, next, size) = {
            let n = &self.orders[h];
            (n.price, n.side, n.prev, n.next, n.size)
        };
        if let Some(p) = prev {
            self.orders[p].next = next;
        }
        if let Some(nh) = next {
            self.orders[nh].prev = prev;
        }
        if let Some(lvl) = self.levels_mut(side).get_mut(&PriceKey(price)) {
            if prev.is_none() {
                lvl.head = next;
            }
            if next.is_none() {
                lvl.tail = prev;
            }
            lvl.count -= 1;
            lvl.total_size -= u64::from(size);
            if lvl.is_empty() {
                self.levels_mut(side).remove(&PriceKey(price));
            }
        }
        let node = self.orders.remove(h);
        self.by_id.remove(&node.order_id);
    }

    pub fn best_bid(&self) -> Option<(f64, u64)> {
        self.bids.iter().next_back().map(|(p, l)| (p.0, l.total_size))
    }

    pub fn best_ask(&self) -> Option<(f64, u64)> {
        self.asks.iter().next().map(|(p, l)| (p.0, l.total_size))
    }

    pub fn top(&self) -> TopOfBook {
        let (bid_price, bid_size) = self.best_bid().unwrap_or((0.0, 0));
        let (ask_price, ask_size) = self.best_ask().unwrap_or((0.0, 0));
        TopOfBook {
            bid_price,
            bid_size,
            ask_price,
            ask_size,
        }
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Top-n depth per side, best first.
    pub fn depth(&self, n: usize) -> (SmallVec<[(f64, u64); 8]>, SmallVec<[(f64, u64); 8]>) {
        let mut bids = SmallVec::new();
        let mut asks = SmallVec::new();
        for (p, l) in self.bids.iter().rev().take(n) {
            bids.push((p.0, l.total_size));
        }
        for (p, l) in self.asks.iter().take(n) {
            asks.push((p.0, l.total_size));
        }
        (bids, asks)
    }

    /// FIFO order of ids resting at one price. Diagnostic/test accessor.
    pub fn level_queue(&self, side: Side, price: f64) -> Vec<&str> {
        let ladder = match side {
            Side::Ask => &self.asks,
            _ => &self.bids,
        };
        let mut out = Vec::new();
        if let Some(lvl) = ladder.get(&PriceKey(price)) {
            let mut cur = lvl.head;
            while let Some(h) = cur {
                out.push(&*self.orders[h].order_id);
                cur = self.orders[h].next;
            }
        }
        out
    }

    /// Structural consistency sweep used by the test suites.
    #[doc(hidden)]
    pub fn check_invariants(&self) {
        let mut seen = 0usize;
        for ladder in [&self.bids, &self.asks] {
            for (price, lvl) in ladder {
                assert!(!lvl.is_empty(), "empty level left at {}", price.0);
                let mut sum = 0u64;
                let mut count = 0usize;
                let mut cur = lvl.head;
                let mut prev: Option<Handle> = None;
                while let Some(h) = cur {
                    let n = &self.orders[h];
                    assert_eq!(n.prev, prev, "broken back-link at {}", n.order_id);
                    assert_eq!(n.price, price.0);
                    assert_eq!(self.by_id.get(&n.order_id), Some(&h));
                    sum += u64::from(n.size);
                    count += 1;
                    prev = cur;
                    cur = n.next;
                }
                assert_eq!(lvl.tail, prev);
                assert_eq!(lvl.total_size, sum, "level aggregate drift at {}", price.0);
                assert_eq!(lvl.count, count);
                seen += count;
            }
        }
        assert_eq!(seen, self.by_id.len());
        assert_eq!(seen, self.orders.len());
    }
}

/// Book-engine anomaly classes. All are non-fatal: the event is discarded
/// and the book is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    EmptySymbol,
    UnknownKind,
    DuplicateOrder,
    UnknownOrder,
    PriceChangeModify,
    BadSide,
}

impl Anomaly {
    pub fn label(&self) -> &'static str {
        match self {
            Anomaly::EmptySymbol => "empty_symbol",
            Anomaly::UnknownKind => "unknown_kind",
            Anomaly::DuplicateOrder => "duplicate_add",
            Anomaly::UnknownOrder => "unknown_order",
            Anomaly::PriceChangeModify => "price_change_modify",
            Anomaly::BadSide => "bad_side",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyCounts {
    pub empty_symbol: u64,
    pub unknown_kind: u64,
    pub duplicate_add: u64,
    pub unknown_order: u64,
    pub price_change_modify: u64,
    pub bad_side: u64,
}

impl AnomalyCounts {
    pub fn total(&self) -> u64 {
        self.empty_symbol
            + self.unknown_kind
            + self.duplicate_add
            + self.unknown_order
            + self.price_change_modify
            + self.bad_side
    }
}

/// What the engine did with one event; tells the consumer what to republish.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Book mutated -> publish a summary for the event's symbol.
    Book,
    /// Trade observed (book untouched) -> publish a trade update.
    Trade {
        price: f64,
        size: u32,
        aggressor: Side,
        timestamp: u64,
    },
    /// Market-status pass-through; `halted` worth surfacing in the log.
    Status { halted: bool },
    /// Quote updates and other non-mutating events.
    Ignored,
    Rejected(Anomaly),
}

/// All symbols' books plus anomaly accounting. Single-threaded by design;
/// lives on the consumer thread only.
#[derive(Default)]
pub struct BookEngine {
    books: HashMap<String, OrderBook>,
    anomalies: AnomalyCounts,
}

impl BookEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn book(&self, symbol: &str) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    pub fn top(&self, symbol: &str) -> TopOfBook {
        self.books.get(symbol).map(OrderBook::top).unwrap_or_default()
    }

    pub fn anomalies(&self) -> AnomalyCounts {
        self.anomalies
    }

    pub fn symbol_count(&self) -> usize {
        self.books.len()
    }

    pub fn live_orders(&self) -> usize {
        self.books.values().map(OrderBook::order_count).sum()
    }

    fn reject(&mut self, a: Anomaly) -> Applied {
        match a {
            Anomaly::EmptySymbol => self.anomalies.empty_symbol += 1,
            Anomaly::UnknownKind => self.anomalies.unknown_kind += 1,
            Anomaly::DuplicateOrder => self.anomalies.duplicate_add += 1,
            Anomaly::UnknownOrder => self.anomalies.unknown_order += 1,
            Anomaly::PriceChangeModify => self.anomalies.price_change_modify += 1,
            Anomaly::BadSide => self.anomalies.bad_side += 1,
        }
        crate::metrics::inc_book_anomaly(a.label());
        Applied::Rejected(a)
    }

    /// Route one event by kind. Rejections leave no partial mutation behind.
    pub fn apply(&mut self, ev: &BookEvent) -> Applied {
        if ev.symbol.is_empty() {
            return self.reject(Anomaly::EmptySymbol);
        }
        match ev.kind {
            EventKind::AddOrder => {
                if ev.side == Side::Unknown {
                    // Checked before the symbol entry so a bad add cannot
                    // materialize an empty book.
                    return self.reject(Anomaly::BadSide);
                }
                let out = self
                    .books
                    .entry(ev.symbol.clone())
                    .or_default()
                    .try_add(&ev.order_id, ev.side, ev.price, ev.size, ev.timestamp);
                match out {
                    Ok(()) => Applied::Book,
                    Err(a) => self.reject(a),
                }
            }
            EventKind::ModifyOrder => {
                let out = match self.books.get_mut(&ev.symbol) {
                    Some(book) => book.try_modify(&ev.order_id, ev.price, ev.size),
                    None => Err(Anomaly::UnknownOrder),
                };
                match out {
                    Ok(()) => Applied::Book,
                    Err(a) => self.reject(a),
                }
            }
            EventKind::CancelOrder | EventKind::DeleteOrder => {
                let out = match self.books.get_mut(&ev.symbol) {
                    Some(book) => book.try_cancel(&ev.order_id),
                    None => Err(Anomaly::UnknownOrder),
                };
                match out {
                    Ok(()) => Applied::Book,
                    Err(a) => self.reject(a),
                }
            }
            EventKind::Trade => {
                // Trade prints never touch resting orders; the feed sends
                // explicit modifies/cancels for executed liquidity.
                Applied::Trade {
                    price: ev.trade_price,
                    size: ev.trade_size,
                    aggressor: if ev.is_aggressor { Side::Bid } else { Side::Ask },
                    timestamp: ev.timestamp,
                }
            }
            EventKind::MarketStatus => Applied::Status {
                halted: ev.is_trading_halted,
            },
            EventKind::QuoteUpdate => Applied::Ignored,
            EventKind::Unknown => self.reject(Anomaly::UnknownKind),
        }
    }
}
