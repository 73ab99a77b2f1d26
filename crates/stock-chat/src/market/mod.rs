//! Market data model

pub mod instrument;
pub mod quote;
pub mod sectors;
pub mod series;
pub mod time;

pub use instrument::{
    Exchange, Instrument, InstrumentDefaults, InstrumentKey, InstrumentQuery, InstrumentType,
};
pub use quote::{DepthLevel, MarketDepth, Ohlc, Quote};
pub use sectors::{SectorTable, benchmark_indices};
pub use series::{Bar, BarInsert, HistoricalSeries, SeriesSummary};
