// src/event.rs
use serde::{Deserialize, Serialize};

/// Event classes carried by the feed. Drives the dispatch switch in the
/// book engine; anything the codec cannot classify becomes `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    AddOrder,
    ModifyOrder,
    CancelOrder,
    DeleteOrder,
    Trade,
    QuoteUpdate,
    MarketStatus,
    Unknown,
}

impl EventKind {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "ADD_ORDER" => EventKind::AddOrder,
            "MODIFY_ORDER" => EventKind::ModifyOrder,
            "CANCEL_ORDER" => EventKind::CancelOrder,
            "DELETE_ORDER" => EventKind::DeleteOrder,
            "TRADE" => EventKind::Trade,
            "QUOTE_UPDATE" => EventKind::QuoteUpdate,
            "MARKET_STATUS" => EventKind::MarketStatus,
            _ => EventKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
    Unknown,
}

impl Side {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "BID" => Side::Bid,
            "ASK" => Side::Ask,
            _ => Side::Unknown,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Side::Bid => "BID",
            Side::Ask => "ASK",
            Side::Unknown => "UNKNOWN",
        }
    }
}

/// One decoded feed event. Constructed by the codec on the producer thread,
/// moved through the SPSC ring, consumed by the book engine.
///
/// `timestamp` is the exchange's wall clock and is never mixed with the
/// monotonic stamps: `t_exch` is written by the feed producer, `t_rx` by the
/// listener, `t_enq` by the producer just before the ring push, `t_deq` by
/// the consumer just after the pop. All four share one clock epoch.
#[derive(Debug, Clone)]
pub struct BookEvent {
    pub kind: EventKind,
    pub symbol: String,
    pub exchange: String,
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    pub size: u32,
    pub remaining_size: u32,

    pub trade_price: f64,
    pub trade_size: u32,
    pub is_aggressor: bool,

    pub status_message: String,
    pub is_trading_halted: bool,

    pub timestamp: u64,
    pub seq: u64,

    pub t_exch: u64,
    pub t_rx: u64,
    pub t_enq: u64,
    pub t_deq: u64,
}

impl Default for BookEvent {
    fn default() -> Self {
        Self {
            kind: EventKind::Unknown,
            symbol: String::new(),
            exchange: String::new(),
            order_id: String::new(),
            side: Side::Unknown,
            price: 0.0,
            size: 0,
            remaining_size: 0,
            trade_price: 0.0,
            trade_size: 0,
            is_aggressor: false,
            status_message: String::new(),
            is_trading_halted: false,
            timestamp: 0,
            seq: 0,
            t_exch: 0,
            t_rx: 0,
            t_enq: 0,
            t_deq: 0,
        }
    }
}
