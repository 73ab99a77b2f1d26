//! Exchanges, instrument types and instruments

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported Indian exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    /// National Stock Exchange
    Nse,
    /// Bombay Stock Exchange
    Bse,
}

impl Exchange {
    pub const ALL: [Self; 2] = [Self::Nse, Self::Bse];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Bse => "BSE",
        }
    }

    /// Parse a user token (`nse`, `BSE`, ...)
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "NSE" => Some(Self::Nse),
            "BSE" => Some(Self::Bse),
            _ => None,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s.trim()).ok_or_else(|| format!("unknown exchange '{s}' (expected NSE or BSE)"))
    }
}

/// Instrument types the assistant understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstrumentType {
    #[serde(rename = "EQ")]
    Equity,
    #[serde(rename = "FUT")]
    Future,
    #[serde(rename = "OPT")]
    Option,
    #[serde(rename = "IDX")]
    Index,
}

impl InstrumentType {
    pub const ALL: [Self; 4] = [Self::Equity, Self::Future, Self::Option, Self::Index];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equity => "EQ",
            Self::Future => "FUT",
            Self::Option => "OPT",
            Self::Index => "IDX",
        }
    }

    /// Parse a user token; long forms are accepted too
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "EQ" | "EQUITY" => Some(Self::Equity),
            "FUT" | "FUTURE" | "FUTURES" => Some(Self::Future),
            "OPT" | "OPTION" | "OPTIONS" => Some(Self::Option),
            "IDX" | "INDEX" => Some(Self::Index),
            _ => None,
        }
    }

    /// Map an Upstox `instrument_type` code
    pub fn from_broker_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "EQ" | "BE" | "BZ" | "SM" | "ST" => Some(Self::Equity),
            "FUT" | "FUTIDX" | "FUTSTK" => Some(Self::Future),
            "CE" | "PE" | "OPTIDX" | "OPTSTK" => Some(Self::Option),
            "INDEX" | "IDX" => Some(Self::Index),
            _ => None,
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s.trim())
            .ok_or_else(|| format!("unknown instrument type '{s}' (expected EQ, FUT, OPT or IDX)"))
    }
}

/// Broker key of an instrument, e.g. `NSE_EQ|INE002A01018`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentKey(String);

impl InstrumentKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segment part of the key (`NSE_EQ`)
    pub fn segment(&self) -> &str {
        self.0.split('|').next().unwrap_or_default()
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tradable instrument from the broker's instrument master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub key: InstrumentKey,
    /// Trading symbol, upper case
    pub symbol: String,
    pub name: String,
    pub exchange: Exchange,
    pub instrument_type: InstrumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<f64>,
    /// Symbol a future or option is written on (`RELIANCE`, `NIFTY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying: Option<String>,
}

impl Instrument {
    /// Minimal instrument with only the identifying fields set
    pub fn new(
        key: impl Into<String>,
        symbol: impl Into<String>,
        exchange: Exchange,
        instrument_type: InstrumentType,
    ) -> Self {
        let symbol = symbol.into().to_uppercase();
        Self {
            key: InstrumentKey::new(key),
            name: symbol.clone(),
            symbol,
            exchange,
            instrument_type,
            isin: None,
            lot_size: None,
            tick_size: None,
            expiry: None,
            strike: None,
            underlying: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_isin(mut self, isin: impl Into<String>) -> Self {
        self.isin = Some(isin.into());
        self
    }

    pub fn with_underlying(mut self, underlying: impl Into<String>) -> Self {
        self.underlying = Some(underlying.into().to_uppercase());
        self
    }

    pub fn is_derivative(&self) -> bool {
        matches!(self.instrument_type, InstrumentType::Future | InstrumentType::Option)
    }

    /// `RELIANCE (NSE EQ)`
    pub fn label(&self) -> String {
        format!("{} ({} {})", self.symbol, self.exchange, self.instrument_type)
    }
}

/// What the user asked for: a symbol with optional exchange and type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentQuery {
    pub symbol: String,
    pub exchange: Option<Exchange>,
    pub instrument_type: Option<InstrumentType>,
}

impl InstrumentQuery {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            exchange: None,
            instrument_type: None,
        }
    }

    pub fn on(mut self, exchange: Exchange) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn of_type(mut self, instrument_type: InstrumentType) -> Self {
        self.instrument_type = Some(instrument_type);
        self
    }

    /// Fill omitted fields from the configured defaults
    pub fn resolved(&self, defaults: InstrumentDefaults) -> (Exchange, InstrumentType) {
        (
            self.exchange.unwrap_or(defaults.exchange),
            self.instrument_type.unwrap_or(defaults.instrument_type),
        )
    }
}

impl fmt::Display for InstrumentQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)?;
        if let Some(exchange) = self.exchange {
            write!(f, " {exchange}")?;
        }
        if let Some(kind) = self.instrument_type {
            write!(f, " {kind}")?;
        }
        Ok(())
    }
}

/// Exchange and type used when a query omits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentDefaults {
    pub exchange: Exchange,
    pub instrument_type: InstrumentType,
}

impl Default for InstrumentDefaults {
    fn default() -> Self {
        Self {
            exchange: Exchange::Nse,
            instrument_type: InstrumentType::Equity,
        }
    }
}
