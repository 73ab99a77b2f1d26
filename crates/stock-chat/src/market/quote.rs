//! Quotes and market depth

use super::instrument::Instrument;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Maximum depth levels shown per side
pub const MAX_DEPTH_LEVELS: usize = 5;

/// One price level of the order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub quantity: u64,
    pub orders: u32,
}

/// Best bids and asks, best first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

impl MarketDepth {
    /// Build from raw levels, dropping empty ones and keeping five per side
    pub fn new(bids: Vec<DepthLevel>, asks: Vec<DepthLevel>) -> Self {
        let keep = |levels: Vec<DepthLevel>| -> Vec<DepthLevel> {
            levels
                .into_iter()
                .filter(|l| l.quantity > 0 && l.price > 0.0)
                .take(MAX_DEPTH_LEVELS)
                .collect()
        };
        Self {
            bids: keep(bids),
            asks: keep(asks),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.asks.first()
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }
}

/// Session open/high/low/close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A price snapshot for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub instrument: Instrument,
    pub last_price: f64,
    pub volume: u64,
    pub ohlc: Option<Ohlc>,
    pub previous_close: Option<f64>,
    pub depth: MarketDepth,
    /// Time of the last trade included in the quote, IST
    pub timestamp: DateTime<FixedOffset>,
    /// True when served without an authenticated session
    pub delayed: bool,
}

impl Quote {
    /// Absolute change against the previous close
    pub fn change(&self) -> Option<f64> {
        self.previous_close.map(|prev| self.last_price - prev)
    }

    /// Percent change against the previous close
    pub fn change_percent(&self) -> Option<f64> {
        match self.previous_close {
            Some(prev) if prev > 0.0 => Some((self.last_price - prev) / prev * 100.0),
            _ => None,
        }
    }
}
