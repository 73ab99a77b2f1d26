//! Daily bar series with closed-day immutability

use super::instrument::Instrument;
use crate::error::{Result, StockError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One daily candle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<u64>,
}

/// Outcome of inserting a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarInsert {
    Added,
    /// The open day's bar was replaced
    Updated,
    /// Identical bar already present
    Unchanged,
}

/// Ordered daily bars for one instrument.
///
/// Once a day is closed its bar is fixed: re-inserting the same bar is a
/// no-op and a different bar is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalSeries {
    instrument: Instrument,
    bars: BTreeMap<NaiveDate, Bar>,
    closed_through: Option<NaiveDate>,
}

impl HistoricalSeries {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            bars: BTreeMap::new(),
            closed_through: None,
        }
    }

    /// Assemble a series from fetched bars; every day before `today` is closed.
    pub fn assemble(
        instrument: Instrument,
        bars: impl IntoIterator<Item = Bar>,
        today: NaiveDate,
    ) -> Result<Self> {
        let mut series = Self::new(instrument);
        for bar in bars {
            series.insert(bar)?;
        }
        if let Some(yesterday) = today.pred_opt() {
            series.close_through(yesterday);
        }
        Ok(series)
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn insert(&mut self, bar: Bar) -> Result<BarInsert> {
        match self.bars.get(&bar.date) {
            Some(existing) if *existing == bar => Ok(BarInsert::Unchanged),
            Some(_) if self.is_closed(bar.date) => {
                Err(StockError::ClosedDayConflict { date: bar.date })
            }
            Some(_) => {
                self.bars.insert(bar.date, bar);
                Ok(BarInsert::Updated)
            }
            None if self.is_closed(bar.date) => {
                Err(StockError::ClosedDayConflict { date: bar.date })
            }
            None => {
                self.bars.insert(bar.date, bar);
                Ok(BarInsert::Added)
            }
        }
    }

    /// Mark every day up to and including `date` as closed
    pub fn close_through(&mut self, date: NaiveDate) {
        self.closed_through = Some(self.closed_through.map_or(date, |d| d.max(date)));
    }

    pub fn is_closed(&self, date: NaiveDate) -> bool {
        self.closed_through.is_some_and(|d| date <= d)
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Bar> {
        self.bars.get(&date)
    }

    /// Bars in date order
    pub fn bars(&self) -> impl DoubleEndedIterator<Item = &Bar> + ExactSizeIterator {
        self.bars.values()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.values().map(|b| b.close).collect()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.values().next()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.values().next_back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Keep only the most recent `count` bars
    pub fn tail(&self, count: usize) -> Self {
        let skip = self.bars.len().saturating_sub(count);
        Self {
            instrument: self.instrument.clone(),
            bars: self.bars.iter().skip(skip).map(|(d, b)| (*d, *b)).collect(),
            closed_through: self.closed_through,
        }
    }

    /// Period statistics, `None` for an empty series
    pub fn summary(&self) -> Option<SeriesSummary> {
        let first = self.first()?;
        let last = self.last()?;
        let high = self.bars.values().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = self.bars.values().map(|b| b.low).fold(f64::MAX, f64::min);
        let total_volume: u64 = self.bars.values().map(|b| b.volume).sum();
        let change_percent = if first.close > 0.0 {
            (last.close - first.close) / first.close * 100.0
        } else {
            0.0
        };

        Some(SeriesSummary {
            from: first.date,
            to: last.date,
            bars: self.bars.len(),
            first_close: first.close,
            last_close: last.close,
            change_percent,
            high,
            low,
            average_volume: total_volume / self.bars.len() as u64,
        })
    }
}

/// Headline numbers over a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub bars: usize,
    pub first_close: f64,
    pub last_close: f64,
    pub change_percent: f64,
    pub high: f64,
    pub low: f64,
    pub average_volume: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Exchange, InstrumentType};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn bar(d: u32, close: f64) -> Bar {
        Bar {
            date: date(d),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
            open_interest: None,
        }
    }

    fn instrument() -> Instrument {
        Instrument::new("NSE_EQ|INE002A01018", "RELIANCE", Exchange::Nse, InstrumentType::Equity)
    }

    #[test]
    fn test_assemble_closes_days_before_today() {
        let series =
            HistoricalSeries::assemble(instrument(), vec![bar(3, 102.0), bar(2, 101.0)], date(3))
                .unwrap();
        assert!(series.is_closed(date(2)));
        assert!(!series.is_closed(date(3)));
        assert_eq!(series.first().unwrap().date, date(2));
        assert_eq!(series.closes(), vec![101.0, 102.0]);
    }

    #[test]
    fn test_closed_day_is_immutable() {
        let mut series =
            HistoricalSeries::assemble(instrument(), vec![bar(2, 101.0)], date(3)).unwrap();

        assert_eq!(series.insert(bar(2, 101.0)).unwrap(), BarInsert::Unchanged);
        assert!(matches!(
            series.insert(bar(2, 99.0)),
            Err(StockError::ClosedDayConflict { .. })
        ));
        assert!(matches!(
            series.insert(bar(1, 99.0)),
            Err(StockError::ClosedDayConflict { .. })
        ));
        assert!((series.get(date(2)).unwrap().close - 101.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_open_day_can_update() {
        let mut series =
            HistoricalSeries::assemble(instrument(), vec![bar(3, 102.0)], date(3)).unwrap();
        assert_eq!(series.insert(bar(3, 103.5)).unwrap(), BarInsert::Updated);
        assert_eq!(series.insert(bar(4, 104.0)).unwrap(), BarInsert::Added);
    }

    #[test]
    fn test_summary_and_tail() {
        let series = HistoricalSeries::assemble(
            instrument(),
            vec![bar(1, 100.0), bar(2, 110.0), bar(3, 90.0)],
            date(10),
        )
        .unwrap();
        let summary = series.summary().unwrap();
        assert_eq!(summary.bars, 3);
        assert!((summary.change_percent - -10.0).abs() < 1e-9);
        assert!((summary.high - 111.0).abs() < 1e-9);
        assert!((summary.low - 89.0).abs() < 1e-9);

        let tail = series.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.first().unwrap().date, date(2));
        assert!(tail.is_closed(date(3)));
    }
}
