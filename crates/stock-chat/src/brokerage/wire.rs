//! Upstox v2 response shapes and their conversion into the market model

use crate::market::time::{ist, market_close};
use crate::market::{
    Bar, DepthLevel, Exchange, Instrument, InstrumentKey, InstrumentType, MarketDepth, Ohlc, Quote,
};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Every Upstox response is wrapped in `{status, data, errors}`
#[derive(Debug, Deserialize)]
pub(super) struct Envelope<T> {
    #[serde(default)]
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorDetail {
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// First error message in an error body, if the body has the usual shape
pub(super) fn error_message(body: &str) -> Option<String> {
    let envelope: Envelope<Value> = serde_json::from_str(body).ok()?;
    envelope.errors.into_iter().find_map(|e| match (e.error_code, e.message) {
        (Some(code), Some(message)) => Some(format!("{message} [{code}]")),
        (None, Some(message)) => Some(message),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireOhlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireLevel {
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub orders: f64,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct WireDepth {
    #[serde(default)]
    pub buy: Vec<WireLevel>,
    #[serde(default)]
    pub sell: Vec<WireLevel>,
}

/// Entry of `/v2/market-quote/quotes`, keyed by `SEGMENT:SYMBOL` in the response
#[derive(Debug, Deserialize)]
pub(super) struct FullQuote {
    pub instrument_token: String,
    pub last_price: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub net_change: Option<f64>,
    #[serde(default)]
    pub ohlc: Option<WireOhlc>,
    #[serde(default)]
    pub depth: Option<WireDepth>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

pub(super) type QuoteMap = HashMap<String, FullQuote>;

#[derive(Debug, Deserialize)]
pub(super) struct CandleData {
    #[serde(default)]
    pub candles: Vec<Vec<Value>>,
}

/// One `[timestamp, open, high, low, close, volume, oi]` row
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Candle {
    pub at: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub open_interest: Option<u64>,
}

impl Candle {
    fn date(&self) -> NaiveDate {
        self.at.with_timezone(&ist()).date_naive()
    }
}

fn parse_candle(row: &[Value]) -> Option<Candle> {
    let at = DateTime::parse_from_rfc3339(row.first()?.as_str()?).ok()?;
    let num = |idx: usize| row.get(idx).and_then(Value::as_f64);
    Some(Candle {
        at,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5).unwrap_or_default() as u64,
        open_interest: num(6).map(|oi| oi as u64),
    })
}

/// Candles oldest first; malformed rows are skipped
pub(super) fn candles(data: CandleData) -> Vec<Candle> {
    let mut parsed: Vec<Candle> = data
        .candles
        .iter()
        .filter_map(|row| {
            let candle = parse_candle(row);
            if candle.is_none() {
                warn!(?row, "skipping malformed candle");
            }
            candle
        })
        .collect();
    parsed.sort_by_key(|c| c.at);
    parsed
}

pub(super) fn bars_from_candles(candles: &[Candle]) -> Vec<Bar> {
    candles
        .iter()
        .map(|c| Bar {
            date: c.date(),
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
            open_interest: c.open_interest,
        })
        .collect()
}

pub(super) fn live_quote(instrument: &Instrument, full: FullQuote) -> Quote {
    let depth = full.depth.unwrap_or_default();
    let level = |l: WireLevel| DepthLevel {
        price: l.price,
        quantity: l.quantity as u64,
        orders: l.orders as u32,
    };
    let timestamp = full
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .unwrap_or_else(|| Utc::now().with_timezone(&ist()));

    Quote {
        instrument: instrument.clone(),
        last_price: full.last_price,
        volume: full.volume as u64,
        ohlc: full.ohlc.map(|o| Ohlc {
            open: o.open,
            high: o.high,
            low: o.low,
            close: o.close,
        }),
        previous_close: full.net_change.map(|change| full.last_price - change),
        depth: MarketDepth::new(
            depth.buy.into_iter().map(level).collect(),
            depth.sell.into_iter().map(level).collect(),
        ),
        timestamp: timestamp.with_timezone(&ist()),
        delayed: false,
    }
}

/// Build a delayed quote from public candles.
///
/// Intraday candles stamped after `cutoff` are ignored. Without a qualifying
/// intraday candle the last daily candle that closed before `cutoff` is used.
pub(super) fn delayed_quote(
    instrument: &Instrument,
    intraday: &[Candle],
    daily: &[Candle],
    cutoff: DateTime<FixedOffset>,
) -> Option<Quote> {
    let visible: Vec<&Candle> = intraday.iter().filter(|c| c.at <= cutoff).collect();

    if let Some(last) = visible.iter().max_by_key(|c| c.at) {
        let day = last.date();
        let session: Vec<&&Candle> = visible.iter().filter(|c| c.date() == day).collect();
        let open = session.iter().min_by_key(|c| c.at).map_or(last.open, |c| c.open);
        let high = session.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = session.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let previous_close = daily
            .iter()
            .filter(|c| c.date() < day)
            .max_by_key(|c| c.at)
            .map(|c| c.close);

        return Some(Quote {
            instrument: instrument.clone(),
            last_price: last.close,
            volume: session.iter().map(|c| c.volume).sum(),
            ohlc: Some(Ohlc {
                open,
                high,
                low,
                close: last.close,
            }),
            previous_close,
            depth: MarketDepth::default(),
            timestamp: last.at.with_timezone(&ist()),
            delayed: true,
        });
    }

    let closed: Vec<&Candle> = daily
        .iter()
        .filter(|c| market_close(c.date()) <= cutoff)
        .collect();
    let (last, before) = closed.split_last()?;

    Some(Quote {
        instrument: instrument.clone(),
        last_price: last.close,
        volume: last.volume,
        ohlc: Some(Ohlc {
            open: last.open,
            high: last.high,
            low: last.low,
            close: last.close,
        }),
        previous_close: before.last().map(|c| c.close),
        depth: MarketDepth::default(),
        timestamp: market_close(last.date()),
        delayed: true,
    })
}

/// Row of the instrument master (`complete.json.gz`)
#[derive(Debug, Deserialize)]
pub(super) struct RawInstrument {
    pub instrument_key: String,
    #[serde(alias = "tradingsymbol")]
    pub trading_symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub exchange: String,
    pub instrument_type: String,
    #[serde(default)]
    pub isin: Option<String>,
    #[serde(default)]
    pub lot_size: Option<f64>,
    #[serde(default)]
    pub tick_size: Option<f64>,
    #[serde(default)]
    pub expiry: Option<Value>,
    #[serde(default, alias = "strike")]
    pub strike_price: Option<f64>,
    #[serde(default)]
    pub underlying_symbol: Option<String>,
    #[serde(default)]
    pub asset_symbol: Option<String>,
}

/// Expiry arrives as epoch milliseconds or as `YYYY-MM-DD`
fn parse_expiry(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?)
            .map(|dt| dt.with_timezone(&ist()).date_naive()),
        Value::String(s) if !s.is_empty() => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
        _ => None,
    }
}

/// Convert a master row; rows on other exchanges or of other types are dropped
pub(super) fn instrument_from_raw(raw: RawInstrument) -> Option<Instrument> {
    let exchange = Exchange::from_token(&raw.exchange)?;
    let instrument_type = InstrumentType::from_broker_code(&raw.instrument_type)?;
    let symbol = raw.trading_symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return None;
    }

    let underlying = matches!(instrument_type, InstrumentType::Future | InstrumentType::Option)
        .then(|| raw.underlying_symbol.or(raw.asset_symbol))
        .flatten()
        .map(|u| u.trim().to_uppercase())
        .filter(|u| !u.is_empty());

    Some(Instrument {
        key: InstrumentKey::new(raw.instrument_key),
        name: raw
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| symbol.clone()),
        symbol,
        exchange,
        instrument_type,
        isin: raw.isin.filter(|i| !i.is_empty()),
        lot_size: raw.lot_size.map(|l| l as u32),
        tick_size: raw.tick_size,
        expiry: raw.expiry.as_ref().and_then(parse_expiry),
        strike: raw.strike_price.filter(|s| *s > 0.0),
        underlying,
    })
}
