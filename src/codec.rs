// src/codec.rs
use crate::event::{BookEvent, EventKind, Side};
use serde::Deserialize;
use std::borrow::Cow;
use thiserror::Error;

/// Hard upper bound on one ingress datagram. One datagram == one event; the
/// feed never fragments or concatenates.
pub const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty datagram")]
    Empty,
    #[error("malformed event json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wire image of one ingress datagram. Every field is optional: the feed is
/// permissive about which keys appear, strict about their types. String
/// fields borrow from the receive buffer unless escapes force a copy.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEvent<'a> {
    #[serde(borrow)]
    event_type: Option<Cow<'a, str>>,
    #[serde(borrow)]
    symbol: Option<Cow<'a, str>>,
    #[serde(borrow)]
    exchange: Option<Cow<'a, str>>,
    #[serde(borrow)]
    order_id: Option<Cow<'a, str>>,
    #[serde(borrow)]
    side: Option<Cow<'a, str>>,
    price: Option<f64>,
    size: Option<u32>,
    remaining_size: Option<u32>,
    trade_price: Option<f64>,
    trade_size: Option<u32>,
    is_aggressor: Option<bool>,
    is_trading_halted: Option<bool>,
    #[serde(borrow)]
    status_message: Option<Cow<'a, str>>,
    timestamp: Option<u64>,
    sequence_number: Option<u64>,
    exchange_mono_ns: Option<u64>,
}

/// Decode one datagram into a typed event. Pure: nothing is retained from
/// `payload` after return. Monotonic stamps are left at zero for the
/// listener and ring stages to fill in.
pub fn decode(payload: &[u8]) -> Result<BookEvent, ParseError> {
    if payload.is_empty() {
        return Err(ParseError::Empty);
    }
    let raw: RawEvent = serde_json::from_slice(payload)?;

    Ok(BookEvent {
        kind: EventKind::from_wire(raw.event_type.as_deref().unwrap_or("")),
        symbol: raw.symbol.map(Cow::into_owned).unwrap_or_default(),
        exchange: raw.exchange.map(Cow::into_owned).unwrap_or_default(),
        order_id: raw.order_id.map(Cow::into_owned).unwrap_or_default(),
        side: Side::from_wire(raw.side.as_deref().unwrap_or("")),
        price: raw.price.unwrap_or(0.0),
        size: raw.size.unwrap_or(0),
        remaining_size: raw.remaining_size.unwrap_or(0),
        trade_price: raw.trade_price.unwrap_or(0.0),
        trade_size: raw.trade_size.unwrap_or(0),
        is_aggressor: raw.is_aggressor.unwrap_or(false),
        is_trading_halted: raw.is_trading_halted.unwrap_or(false),
        status_message: raw.status_message.map(Cow::into_owned).unwrap_or_default(),
        timestamp: raw.timestamp.unwrap_or(0),
        seq: raw.sequence_number.unwrap_or(0),
        t_exch: raw.exchange_mono_ns.unwrap_or(0),
        t_rx: 0,
        t_enq: 0,
        t_deq: 0,
    })
}
