use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar data for one symbol over a fixed interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
    #[serde(default)]
    pub trade_count: Option<u64>,
}

impl Bar {
    /// A bar where every price field equals `price`; used when ticks and
    /// order books are funneled through the bar path.
    pub fn flat(timestamp: DateTime<Utc>, symbol: impl Into<String>, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            vwap: None,
            trade_count: None,
        }
    }
}

/// A single trade print.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
}

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Order book snapshot, bids and asks ordered best-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Mid price from the top of book; 0 when either side is empty.
    pub fn mid(&self) -> f64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => (bid.price + ask.price) / 2.0,
            _ => 0.0,
        }
    }
}

/// Any market data event the pipeline consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    Bar(Bar),
    Tick(Tick),
    Book(OrderBook),
}

impl MarketEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MarketEvent::Bar(bar) => bar.timestamp,
            MarketEvent::Tick(tick) => tick.timestamp,
            MarketEvent::Book(book) => book.timestamp,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Bar(bar) => &bar.symbol,
            MarketEvent::Tick(tick) => &tick.symbol,
            MarketEvent::Book(book) => &book.symbol,
        }
    }

    /// Reference price used for fills: bar close, tick price, or book mid.
    pub fn reference_price(&self) -> f64 {
        match self {
            MarketEvent::Bar(bar) => bar.close,
            MarketEvent::Tick(tick) => tick.price,
            MarketEvent::Book(book) => book.mid(),
        }
    }
}
