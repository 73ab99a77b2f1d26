//! Indicator snapshot over a daily series
//!
//! All indicator math comes from the `ta` crate; this module only feeds it
//! closes and reports the latest values once each indicator has warmed up.

use crate::error::{Result, StockError};
use crate::market::{HistoricalSeries, Quote, SeriesSummary};
use serde::Serialize;
use ta::Next;
use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, Maximum, Minimum, MovingAverageConvergenceDivergence,
    RelativeStrengthIndex, SimpleMovingAverage, StandardDeviation,
};

const RSI_PERIOD: usize = 14;
const BOLLINGER_PERIOD: usize = 20;
const LEVEL_WINDOW: usize = 20;
const VOLATILITY_WINDOW: usize = 20;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Direction of the series relative to its mean and the last move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Bullish,
    BullishWithCorrection,
    Bearish,
    BearishWithPullback,
}

impl Trend {
    pub fn label(self) -> &'static str {
        match self {
            Self::Bullish => "Bullish",
            Self::BullishWithCorrection => "Bullish with correction",
            Self::Bearish => "Bearish",
            Self::BearishWithPullback => "Bearish with pullback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Latest indicator values; `None` until enough bars exist
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub rsi14: Option<f64>,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub ema20: Option<f64>,
    pub macd: Option<Macd>,
    pub bollinger: Option<Bands>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    /// Annualised, percent
    pub volatility: Option<f64>,
    /// Worst peak-to-trough fall, percent (negative)
    pub max_drawdown: Option<f64>,
    pub trend: Option<Trend>,
}

impl IndicatorSnapshot {
    pub fn rsi_reading(&self) -> Option<&'static str> {
        self.rsi14.map(interpret_rsi)
    }
}

pub fn interpret_rsi(rsi: f64) -> &'static str {
    if rsi > 70.0 {
        "Overbought"
    } else if rsi < 30.0 {
        "Oversold"
    } else {
        "Neutral"
    }
}

fn indicator_error(e: impl std::fmt::Display) -> StockError {
    StockError::IndicatorError(e.to_string())
}

fn last_of<I: Next<f64>>(mut indicator: I, values: &[f64], period: usize) -> Option<I::Output> {
    if values.len() < period {
        return None;
    }
    values.iter().map(|v| indicator.next(*v)).last()
}

fn sma(values: &[f64], period: usize) -> Result<Option<f64>> {
    Ok(last_of(
        SimpleMovingAverage::new(period).map_err(indicator_error)?,
        values,
        period,
    ))
}

/// Compute every indicator the series is long enough for
pub fn snapshot(series: &HistoricalSeries) -> Result<IndicatorSnapshot> {
    let closes = series.closes();
    if closes.is_empty() {
        return Ok(IndicatorSnapshot::default());
    }
    let highs: Vec<f64> = series.bars().map(|b| b.high).collect();
    let lows: Vec<f64> = series.bars().map(|b| b.low).collect();

    let rsi14 = last_of(
        RelativeStrengthIndex::new(RSI_PERIOD).map_err(indicator_error)?,
        &closes,
        RSI_PERIOD + 1,
    );
    let ema20 = last_of(
        ExponentialMovingAverage::new(20).map_err(indicator_error)?,
        &closes,
        20,
    );
    let macd = last_of(
        MovingAverageConvergenceDivergence::new(12, 26, 9).map_err(indicator_error)?,
        &closes,
        26 + 9,
    )
    .map(|out| Macd {
        macd: out.macd,
        signal: out.signal,
        histogram: out.histogram,
    });
    let bollinger = last_of(
        BollingerBands::new(BOLLINGER_PERIOD, 2.0).map_err(indicator_error)?,
        &closes,
        BOLLINGER_PERIOD,
    )
    .map(|out| Bands {
        upper: out.upper,
        middle: out.average,
        lower: out.lower,
    });

    let window = LEVEL_WINDOW.min(closes.len());
    let support = last_of(Minimum::new(window).map_err(indicator_error)?, &lows, window);
    let resistance = last_of(Maximum::new(window).map_err(indicator_error)?, &highs, window);

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    let volatility = last_of(
        StandardDeviation::new(VOLATILITY_WINDOW).map_err(indicator_error)?,
        &returns,
        VOLATILITY_WINDOW,
    )
    .map(|sd| sd * TRADING_DAYS_PER_YEAR.sqrt() * 100.0);

    Ok(IndicatorSnapshot {
        rsi14,
        sma20: sma(&closes, 20)?,
        sma50: sma(&closes, 50)?,
        sma200: sma(&closes, 200)?,
        ema20,
        macd,
        bollinger,
        support,
        resistance,
        volatility,
        max_drawdown: max_drawdown(&closes),
        trend: trend(&closes),
    })
}

fn max_drawdown(closes: &[f64]) -> Option<f64> {
    let mut peak = *closes.first()?;
    let mut worst = 0.0_f64;
    for &close in closes {
        peak = peak.max(close);
        if peak > 0.0 {
            worst = worst.min((close - peak) / peak * 100.0);
        }
    }
    Some(worst)
}

fn trend(closes: &[f64]) -> Option<Trend> {
    let [.., previous, last] = closes else {
        return None;
    };
    let mean = closes.iter().sum::<f64>() / closes.len() as f64;
    Some(match (last > &mean, last > previous, last < previous) {
        (true, true, _) => Trend::Bullish,
        (true, false, _) => Trend::BullishWithCorrection,
        (false, _, true) => Trend::Bearish,
        (false, _, false) => Trend::BearishWithPullback,
    })
}

/// Everything shown for `analyze`
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub quote: Quote,
    pub summary: Option<SeriesSummary>,
    pub indicators: IndicatorSnapshot,
    /// Narrative from the insight model
    pub insight: Option<String>,
    /// Why the insight is missing, when it was attempted
    pub insight_note: Option<String>,
}

/// Two analyses shown side by side for `compare`
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub first: AnalysisReport,
    pub second: AnalysisReport,
}

impl Comparison {
    /// Symbol with the better period return, if both have history
    pub fn outperformer(&self) -> Option<&str> {
        let a = self.first.summary?.change_percent;
        let b = self.second.summary?.change_percent;
        Some(if a >= b {
            &self.first.quote.instrument.symbol
        } else {
            &self.second.quote.instrument.symbol
        })
    }
}
