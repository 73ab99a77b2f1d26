//! In-memory instrument master with a dated on-disk snapshot

use crate::error::{Result, StockError};
use crate::market::time::ist_date;
use crate::market::{Exchange, Instrument, InstrumentDefaults, InstrumentQuery, InstrumentType};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Below this score a search hit is not worth suggesting
const RELEVANCE_THRESHOLD: f64 = 50.0;

/// Suggestions offered with an unknown-instrument error
const SUGGESTION_LIMIT: usize = 5;

/// A search hit with its relevance score
#[derive(Debug, Clone)]
pub struct ScoredInstrument {
    pub instrument: Instrument,
    pub score: f64,
}

/// All instruments known to the broker, indexed by trading symbol.
/// Futures and options are also indexed under their underlying so that
/// `RELIANCE FUT` finds contracts whose trading symbol is longer.
#[derive(Debug, Clone, Default)]
pub struct InstrumentMaster {
    instruments: Vec<Instrument>,
    by_symbol: HashMap<String, Vec<usize>>,
    loaded_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    last_update: DateTime<Utc>,
    instruments: Vec<Instrument>,
}

impl InstrumentMaster {
    pub fn new(instruments: Vec<Instrument>, loaded_at: DateTime<Utc>) -> Self {
        let mut by_symbol: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, instrument) in instruments.iter().enumerate() {
            let symbol = instrument.symbol.to_uppercase();
            if let Some(underlying) = instrument.underlying.as_ref().filter(|u| **u != symbol) {
                by_symbol.entry(underlying.clone()).or_default().push(idx);
            }
            by_symbol.entry(symbol).or_default().push(idx);
        }
        Self {
            instruments,
            by_symbol,
            loaded_at: Some(loaded_at),
        }
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Instruments listed under `symbol`, minus contracts expired before `today`
    fn candidates(&self, symbol: &str, today: NaiveDate) -> impl Iterator<Item = &Instrument> {
        self.by_symbol
            .get(&symbol.to_uppercase())
            .into_iter()
            .flatten()
            .map(|&idx| &self.instruments[idx])
            .filter(move |i| i.expiry.is_none_or(|expiry| expiry >= today))
    }

    /// Resolve a query to exactly one instrument.
    ///
    /// Omitted fields take the defaults. If nothing matches with defaults
    /// applied, the explicitly given fields alone are used and a single
    /// remaining candidate wins. Otherwise the error carries suggestions.
    pub fn resolve(&self, query: &InstrumentQuery, defaults: InstrumentDefaults) -> Result<Instrument> {
        self.resolve_on(query, defaults, ist_date(Utc::now()))
    }

    /// [`resolve`](Self::resolve) as of a given IST trading date
    pub fn resolve_on(
        &self,
        query: &InstrumentQuery,
        defaults: InstrumentDefaults,
        today: NaiveDate,
    ) -> Result<Instrument> {
        let (exchange, kind) = query.resolved(defaults);
        let exact: Vec<&Instrument> = self
            .candidates(&query.symbol, today)
            .filter(|i| i.exchange == exchange && i.instrument_type == kind)
            .collect();

        if let Some(found) = pick(&exact, query)? {
            return Ok(found);
        }

        // derivatives are only reached by naming FUT or OPT
        let relaxed: Vec<&Instrument> = self
            .candidates(&query.symbol, today)
            .filter(|i| query.exchange.is_none_or(|e| i.exchange == e))
            .filter(|i| match query.instrument_type {
                Some(t) => i.instrument_type == t,
                None => !i.is_derivative(),
            })
            .collect();

        match relaxed.as_slice() {
            [only] => {
                debug!(symbol = %query.symbol, resolved = %only.key, "resolved outside defaults");
                Ok((*only).clone())
            }
            [] => Err(StockError::InstrumentNotFound {
                query: query.to_string(),
                suggestions: self
                    .search(&query.to_string(), SUGGESTION_LIMIT)
                    .into_iter()
                    .map(|hit| hit.instrument.label())
                    .collect(),
            }),
            many => Err(StockError::AmbiguousQuery(format!(
                "{} is listed as {}",
                query.symbol,
                many.iter()
                    .take(SUGGESTION_LIMIT)
                    .map(|i| format!("{} {}", i.exchange, i.instrument_type))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Resolve a list of symbols on one exchange/type, skipping unknown ones
    pub fn resolve_all<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a String>,
        defaults: InstrumentDefaults,
    ) -> (Vec<Instrument>, Vec<String>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for symbol in symbols {
            let query = InstrumentQuery::new(symbol.as_str())
                .on(defaults.exchange)
                .of_type(defaults.instrument_type);
            match self.resolve(&query, defaults) {
                Ok(instrument) => found.push(instrument),
                Err(_) => missing.push(symbol.clone()),
            }
        }
        (found, missing)
    }

    /// Ranked free-text search over symbol, name and ISIN
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredInstrument> {
        let query = query.trim().to_uppercase();
        if query.is_empty() {
            return Vec::new();
        }
        let parts: Vec<&str> = query.split_whitespace().collect();

        let mut hits: Vec<ScoredInstrument> = self
            .instruments
            .iter()
            .filter_map(|instrument| {
                let score = relevance(instrument, &query, &parts);
                (score > RELEVANCE_THRESHOLD).then(|| ScoredInstrument {
                    instrument: instrument.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.instrument.symbol.cmp(&b.instrument.symbol))
        });
        hits.truncate(limit);
        hits
    }

    /// Read a snapshot if it exists and is younger than `ttl`
    pub fn load_snapshot(path: &Path, ttl: Duration) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable instrument snapshot");
                return Ok(None);
            }
        };

        let age = Utc::now().signed_duration_since(snapshot.last_update);
        if !age.to_std().is_ok_and(|age| age < ttl) {
            info!(path = %path.display(), "instrument snapshot expired");
            return Ok(None);
        }

        info!(
            path = %path.display(),
            instruments = snapshot.instruments.len(),
            "loaded instrument snapshot"
        );
        Ok(Some(Self::new(snapshot.instruments, snapshot.last_update)))
    }

    /// Persist the master so the next start can skip the download
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            last_update: self.loaded_at.unwrap_or_else(Utc::now),
            instruments: self.instruments.clone(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec(&snapshot)?)?;
        debug!(path = %path.display(), instruments = self.len(), "saved instrument snapshot");
        Ok(())
    }
}

/// Choose among exact matches. Futures resolve to the nearest known expiry;
/// other duplicates are ambiguous.
fn pick(exact: &[&Instrument], query: &InstrumentQuery) -> Result<Option<Instrument>> {
    match exact {
        [] => Ok(None),
        [only] => Ok(Some((*only).clone())),
        many if many.iter().all(|i| i.instrument_type == InstrumentType::Future) => Ok(many
            .iter()
            .min_by_key(|i| i.expiry.unwrap_or(NaiveDate::MAX))
            .map(|i| (*i).clone())),
        many => Err(StockError::AmbiguousQuery(format!(
            "{} matches {} contracts; add an expiry or strike",
            query,
            many.len()
        ))),
    }
}

fn relevance(instrument: &Instrument, query: &str, parts: &[&str]) -> f64 {
    let mut score = 0.0;
    let symbol = instrument.symbol.as_str();

    if symbol == query {
        score += 100.0;
    } else if parts.iter().any(|p| *p == symbol) {
        score += 80.0;
    }

    score += partial_ratio(query, &instrument.name.to_uppercase()) * 0.5;
    if !parts.is_empty() {
        score += partial_ratio(parts[0], symbol) * 0.3;
    }

    if query.len() == 12 && query.starts_with("IN") && instrument.isin.as_deref() == Some(query) {
        score += 100.0;
    }

    let type_hint = parts
        .iter()
        .filter_map(|p| InstrumentType::from_token(p))
        .any(|t| t == instrument.instrument_type);
    if type_hint {
        score += 50.0;
    }
    let exchange_hint = parts
        .iter()
        .filter_map(|p| Exchange::from_token(p))
        .any(|e| e == instrument.exchange);
    if exchange_hint {
        score += 50.0;
    }

    score
}

/// Rough 0-100 similarity: containment scores 100, otherwise the shared
/// prefix relative to the shorter string.
fn partial_ratio(needle: &str, haystack: &str) -> f64 {
    if needle.is_empty() || haystack.is_empty() {
        return 0.0;
    }
    if haystack.contains(needle) {
        return 100.0;
    }
    let shared = needle
        .chars()
        .zip(haystack.chars())
        .take_while(|(a, b)| a == b)
        .count();
    let shorter = needle.chars().count().min(haystack.chars().count());
    shared as f64 / shorter as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn contract(key: &str, symbol: &str, kind: InstrumentType, expiry: Option<NaiveDate>) -> Instrument {
        let mut instrument = Instrument::new(key, symbol, Exchange::Nse, kind).with_underlying("RELIANCE");
        instrument.expiry = expiry;
        instrument
    }

    fn master() -> InstrumentMaster {
        let far = contract("NSE_FO|1002", "RELIANCE FUT 27 JUN 24", InstrumentType::Future, Some(date(2024, 6, 27)));
        let near = contract("NSE_FO|1001", "RELIANCE FUT 30 MAY 24", InstrumentType::Future, Some(date(2024, 5, 30)));
        let expired = contract("NSE_FO|1000", "RELIANCE FUT 25 APR 24", InstrumentType::Future, Some(date(2024, 4, 25)));
        let undated = contract("NSE_FO|1003", "RELIANCE FUT", InstrumentType::Future, None);
        let call = contract("NSE_FO|2001", "RELIANCE 2900 CE 30 MAY 24", InstrumentType::Option, Some(date(2024, 5, 30)));
        let put = contract("NSE_FO|2002", "RELIANCE 2800 PE 30 MAY 24", InstrumentType::Option, Some(date(2024, 5, 30)));

        InstrumentMaster::new(
            vec![
                Instrument::new("NSE_EQ|INE002A01018", "RELIANCE", Exchange::Nse, InstrumentType::Equity)
                    .with_name("RELIANCE INDUSTRIES LTD")
                    .with_isin("INE002A01018"),
                Instrument::new("BSE_EQ|INE002A01018", "RELIANCE", Exchange::Bse, InstrumentType::Equity)
                    .with_name("RELIANCE INDUSTRIES LTD")
                    .with_isin("INE002A01018"),
                Instrument::new("BSE_EQ|INE000X00001", "BSEONLY", Exchange::Bse, InstrumentType::Equity),
                Instrument::new("NSE_EQ|INE467B01029", "TCS", Exchange::Nse, InstrumentType::Equity)
                    .with_name("TATA CONSULTANCY SERV LT"),
                far,
                near,
                expired,
                undated,
                call,
                put,
            ],
            Utc::now(),
        )
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let found = master()
            .resolve(&InstrumentQuery::new("reliance"), InstrumentDefaults::default())
            .unwrap();
        assert_eq!(found.key.as_str(), "NSE_EQ|INE002A01018");
    }

    #[test]
    fn test_resolve_explicit_exchange() {
        let found = master()
            .resolve(
                &InstrumentQuery::new("RELIANCE").on(Exchange::Bse),
                InstrumentDefaults::default(),
            )
            .unwrap();
        assert_eq!(found.exchange, Exchange::Bse);
    }

    #[test]
    fn test_resolve_falls_back_to_single_other_exchange() {
        let found = master()
            .resolve(&InstrumentQuery::new("BSEONLY"), InstrumentDefaults::default())
            .unwrap();
        assert_eq!(found.exchange, Exchange::Bse);
    }

    #[test]
    fn test_explicit_exchange_is_not_relaxed() {
        let err = master()
            .resolve(
                &InstrumentQuery::new("BSEONLY").on(Exchange::Nse),
                InstrumentDefaults::default(),
            )
            .unwrap_err();
        assert!(matches!(err, StockError::InstrumentNotFound { .. }));
    }

    #[test]
    fn test_futures_resolve_to_nearest_live_expiry() {
        let found = master()
            .resolve_on(
                &InstrumentQuery::new("RELIANCE").of_type(InstrumentType::Future),
                InstrumentDefaults::default(),
                date(2024, 5, 15),
            )
            .unwrap();
        assert_eq!(found.key.as_str(), "NSE_FO|1001");

        let rolled = master()
            .resolve_on(
                &InstrumentQuery::new("RELIANCE").of_type(InstrumentType::Future),
                InstrumentDefaults::default(),
                date(2024, 6, 1),
            )
            .unwrap();
        assert_eq!(rolled.key.as_str(), "NSE_FO|1002");
    }

    #[test]
    fn test_undated_future_is_last_resort() {
        let found = master()
            .resolve_on(
                &InstrumentQuery::new("RELIANCE").of_type(InstrumentType::Future),
                InstrumentDefaults::default(),
                date(2024, 7, 1),
            )
            .unwrap();
        assert_eq!(found.key.as_str(), "NSE_FO|1003");
    }

    #[test]
    fn test_several_options_need_expiry_or_strike() {
        let err = master()
            .resolve_on(
                &InstrumentQuery::new("RELIANCE").of_type(InstrumentType::Option),
                InstrumentDefaults::default(),
                date(2024, 5, 15),
            )
            .unwrap_err();
        match err {
            StockError::AmbiguousQuery(message) => assert!(message.contains("expiry or strike")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_underlying_index_keeps_bare_symbol_on_equity() {
        let found = master()
            .resolve_on(&InstrumentQuery::new("RELIANCE"), InstrumentDefaults::default(), date(2024, 5, 15))
            .unwrap();
        assert_eq!(found.key.as_str(), "NSE_EQ|INE002A01018");

        let only_derivatives = InstrumentMaster::new(
            vec![contract("NSE_FO|1001", "RELIANCE FUT 30 MAY 24", InstrumentType::Future, Some(date(2024, 5, 30)))],
            Utc::now(),
        );
        let err = only_derivatives
            .resolve_on(&InstrumentQuery::new("RELIANCE"), InstrumentDefaults::default(), date(2024, 5, 15))
            .unwrap_err();
        assert!(matches!(err, StockError::InstrumentNotFound { .. }));
    }

    #[test]
    fn test_unknown_symbol_suggests_close_matches() {
        let err = master()
            .resolve(&InstrumentQuery::new("RELIANC"), InstrumentDefaults::default())
            .unwrap_err();
        match err {
            StockError::InstrumentNotFound { suggestions, .. } => {
                assert!(suggestions.iter().any(|s| s.starts_with("RELIANCE")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_search_ranks_exact_symbol_first() {
        let hits = master().search("TCS", 3);
        assert_eq!(hits[0].instrument.symbol, "TCS");
    }

    #[test]
    fn test_search_by_isin() {
        let hits = master().search("INE002A01018", 5);
        assert!(hits.iter().all(|h| h.instrument.symbol == "RELIANCE"));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_exchange_hint_prefers_exchange() {
        let hits = master().search("RELIANCE BSE", 2);
        assert_eq!(hits[0].instrument.exchange, Exchange::Bse);
    }

    #[test]
    fn test_snapshot_roundtrip_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instruments.json");
        let original = master();
        original.save_snapshot(&path).unwrap();

        let loaded = InstrumentMaster::load_snapshot(&path, Duration::from_secs(3600))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.len(), original.len());

        let expired = InstrumentMaster::load_snapshot(&path, Duration::ZERO).unwrap();
        assert!(expired.is_none());
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded =
            InstrumentMaster::load_snapshot(&dir.path().join("nope.json"), Duration::from_secs(60))
                .unwrap();
        assert!(loaded.is_none());
    }
}
