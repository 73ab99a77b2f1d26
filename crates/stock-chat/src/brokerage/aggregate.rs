//! Sector listings, top performers and market overview built from batch quotes

use super::{BrokerageClient, DataAccess};
use crate::error::{Result, StockError};
use crate::instruments::InstrumentMaster;
use crate::market::time::now_ist;
use crate::market::{Instrument, InstrumentDefaults, Quote, SectorTable};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// One sector member with its latest price
#[derive(Debug, Clone, Serialize)]
pub struct SectorEntry {
    pub instrument: Instrument,
    pub last_price: f64,
    pub change_percent: Option<f64>,
    pub delayed: bool,
}

/// Members of a sector, best performer first
#[derive(Debug, Clone, Serialize)]
pub struct SectorListing {
    pub sector: String,
    pub entries: Vec<SectorEntry>,
    /// Members that could not be resolved or quoted
    pub missing: Vec<String>,
    pub as_of: DateTime<FixedOffset>,
}

impl SectorListing {
    pub fn delayed(&self) -> bool {
        self.entries.iter().any(|e| e.delayed)
    }

    /// Mean percent change over members that have one
    pub fn average_change(&self) -> Option<f64> {
        let changes: Vec<f64> = self.entries.iter().filter_map(|e| e.change_percent).collect();
        (!changes.is_empty()).then(|| changes.iter().sum::<f64>() / changes.len() as f64)
    }
}

/// Advance/decline counts over a set of quotes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Breadth {
    pub advances: usize,
    pub declines: usize,
    pub unchanged: usize,
}

/// Benchmark indices plus breadth of the tracked universe
#[derive(Debug, Clone, Serialize)]
pub struct MarketOverview {
    pub indices: Vec<Quote>,
    /// `None` when constituent quotes could not be fetched
    pub breadth: Option<Breadth>,
    pub leaders: Vec<Quote>,
    pub laggards: Vec<Quote>,
    pub as_of: DateTime<FixedOffset>,
    pub delayed: bool,
}

fn by_change_desc(a: &Quote, b: &Quote) -> Ordering {
    let a = a.change_percent().unwrap_or(f64::NEG_INFINITY);
    let b = b.change_percent().unwrap_or(f64::NEG_INFINITY);
    b.total_cmp(&a)
}

/// Best `count` quotes by percent change; quotes without a change are skipped
pub fn rank_by_change(quotes: &[Quote], count: usize) -> Vec<Quote> {
    let mut ranked: Vec<Quote> = quotes
        .iter()
        .filter(|q| q.change_percent().is_some())
        .cloned()
        .collect();
    ranked.sort_by(by_change_desc);
    ranked.truncate(count);
    ranked
}

pub fn breadth(quotes: &[Quote]) -> Breadth {
    quotes.iter().filter_map(Quote::change).fold(Breadth::default(), |mut b, change| {
        if change > 0.0 {
            b.advances += 1;
        } else if change < 0.0 {
            b.declines += 1;
        } else {
            b.unchanged += 1;
        }
        b
    })
}

/// Quote every member of a sector on the default exchange and type
pub async fn sector_listing(
    client: &dyn BrokerageClient,
    master: &InstrumentMaster,
    sectors: &SectorTable,
    name: &str,
    defaults: InstrumentDefaults,
    access: &DataAccess,
) -> Result<SectorListing> {
    let (sector, symbols) = sectors.lookup(name).ok_or_else(|| StockError::InstrumentNotFound {
        query: format!("sector {name}"),
        suggestions: sectors.names().map(|n| format!("sector {n}")).collect(),
    })?;

    let (instruments, mut missing) = master.resolve_all(symbols, defaults);
    if instruments.is_empty() {
        return Err(StockError::DataUnavailable {
            symbol: sector.to_string(),
            reason: "none of the sector's instruments are in the instrument master".to_string(),
        });
    }

    let quotes = client.quotes(&instruments, access).await?;
    for instrument in &instruments {
        if !quotes.iter().any(|q| q.instrument.key == instrument.key) {
            missing.push(instrument.symbol.clone());
        }
    }
    debug!(sector, quoted = quotes.len(), missing = missing.len(), "sector quotes");

    let mut quotes = quotes;
    quotes.sort_by(by_change_desc);
    let entries = quotes
        .into_iter()
        .map(|q| SectorEntry {
            change_percent: q.change_percent(),
            last_price: q.last_price,
            delayed: q.delayed,
            instrument: q.instrument,
        })
        .collect();

    Ok(SectorListing {
        sector: sector.to_string(),
        entries,
        missing,
        as_of: now_ist(),
    })
}

/// Top performers across every sector member
pub async fn top_performers(
    client: &dyn BrokerageClient,
    master: &InstrumentMaster,
    sectors: &SectorTable,
    count: usize,
    defaults: InstrumentDefaults,
    access: &DataAccess,
) -> Result<Vec<Quote>> {
    let universe = sectors.universe();
    let (instruments, missing) = master.resolve_all(&universe, defaults);
    if !missing.is_empty() {
        debug!(?missing, "universe members not in instrument master");
    }
    if instruments.is_empty() {
        return Err(StockError::DataUnavailable {
            symbol: "top performers".to_string(),
            reason: "no tracked instruments are in the instrument master".to_string(),
        });
    }

    let quotes = client.quotes(&instruments, access).await?;
    Ok(rank_by_change(&quotes, count))
}

/// Index quotes plus advance/decline counts over the tracked universe
pub async fn market_overview(
    client: &dyn BrokerageClient,
    master: &InstrumentMaster,
    sectors: &SectorTable,
    indices: &[Instrument],
    defaults: InstrumentDefaults,
    access: &DataAccess,
) -> Result<MarketOverview> {
    let universe = sectors.universe();
    let (members, _) = master.resolve_all(&universe, defaults);

    let (index_quotes, member_quotes) = futures::join!(
        client.quotes(indices, access),
        client.quotes(&members, access)
    );
    let index_quotes = index_quotes?;
    let member_quotes = match member_quotes {
        Ok(quotes) => quotes,
        Err(e) => {
            warn!(error = %e, members = members.len(), "constituent quotes unavailable");
            Vec::new()
        }
    };
    if index_quotes.is_empty() && member_quotes.is_empty() {
        return Err(StockError::DataUnavailable {
            symbol: "market".to_string(),
            reason: "no index or constituent quotes were returned".to_string(),
        });
    }

    let mut ranked = rank_by_change(&member_quotes, member_quotes.len());
    let leaders: Vec<Quote> = ranked.iter().take(3).cloned().collect();
    ranked.reverse();
    let laggards: Vec<Quote> = ranked.into_iter().take(3).collect();

    Ok(MarketOverview {
        delayed: access.is_delayed(),
        breadth: (!member_quotes.is_empty()).then(|| breadth(&member_quotes)),
        indices: index_quotes,
        leaders,
        laggards,
        as_of: now_ist(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokerage::MockBrokerageClient;
    use crate::market::{Exchange, InstrumentType, MarketDepth};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn eq(symbol: &str) -> Instrument {
        Instrument::new(format!("NSE_EQ|{symbol}"), symbol, Exchange::Nse, InstrumentType::Equity)
    }

    fn quote(instrument: Instrument, last: f64, prev: f64) -> Quote {
        Quote {
            instrument,
            last_price: last,
            volume: 100,
            ohlc: None,
            previous_close: Some(prev),
            depth: MarketDepth::default(),
            timestamp: now_ist(),
            delayed: true,
        }
    }

    fn delayed() -> DataAccess {
        DataAccess::Delayed {
            delay: Duration::from_secs(900),
        }
    }

    fn table() -> SectorTable {
        let mut sectors = BTreeMap::new();
        sectors.insert(
            "IT".to_string(),
            vec!["TCS".to_string(), "INFY".to_string(), "GHOST".to_string()],
        );
        sectors.insert("BANK".to_string(), vec!["SBIN".to_string()]);
        SectorTable::new(sectors)
    }

    fn master() -> InstrumentMaster {
        InstrumentMaster::new(vec![eq("TCS"), eq("INFY"), eq("SBIN")], Utc::now())
    }

    /// Mock that answers every requested instrument with a fixed move
    fn mock_client() -> MockBrokerageClient {
        let mut client = MockBrokerageClient::new();
        client.expect_quotes().returning(|instruments, _| {
            Ok(instruments
                .iter()
                .filter(|i| i.instrument_type == InstrumentType::Equity)
                .map(|i| match i.symbol.as_str() {
                    "TCS" => quote(i.clone(), 105.0, 100.0),
                    "INFY" => quote(i.clone(), 98.0, 100.0),
                    _ => quote(i.clone(), 100.0, 100.0),
                })
                .collect())
        });
        client.expect_name().return_const("Mock");
        client
    }

    #[test]
    fn test_rank_and_breadth() {
        let quotes = vec![
            quote(eq("A"), 101.0, 100.0),
            quote(eq("B"), 99.0, 100.0),
            quote(eq("C"), 110.0, 100.0),
            quote(eq("D"), 100.0, 100.0),
        ];
        let top = rank_by_change(&quotes, 2);
        assert_eq!(top[0].instrument.symbol, "C");
        assert_eq!(top[1].instrument.symbol, "A");

        assert_eq!(
            breadth(&quotes),
            Breadth {
                advances: 2,
                declines: 1,
                unchanged: 1
            }
        );
    }

    #[tokio::test]
    async fn test_sector_listing_orders_members_and_reports_missing() {
        let client = mock_client();
        let listing = sector_listing(
            &client,
            &master(),
            &table(),
            "it",
            InstrumentDefaults::default(),
            &delayed(),
        )
        .await
        .unwrap();

        assert_eq!(listing.sector, "IT");
        let symbols: Vec<&str> = listing.entries.iter().map(|e| e.instrument.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["TCS", "INFY"]);
        assert_eq!(listing.missing, vec!["GHOST"]);
        assert!(listing.delayed());
        assert!((listing.average_change().unwrap() - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_sector_lists_known_ones() {
        let client = MockBrokerageClient::new();
        let err = sector_listing(
            &client,
            &master(),
            &table(),
            "shipping",
            InstrumentDefaults::default(),
            &delayed(),
        )
        .await
        .unwrap_err();
        match err {
            StockError::InstrumentNotFound { suggestions, .. } => {
                assert!(suggestions.contains(&"sector IT".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_top_performers_limits_count() {
        let client = mock_client();
        let top = top_performers(
            &client,
            &master(),
            &table(),
            2,
            InstrumentDefaults::default(),
            &delayed(),
        )
        .await
        .unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].instrument.symbol, "TCS");
    }

    #[tokio::test]
    async fn test_market_overview_breadth() {
        let mut client = MockBrokerageClient::new();
        client.expect_quotes().returning(|instruments, _| {
            Ok(instruments
                .iter()
                .map(|i| match i.symbol.as_str() {
                    "TCS" => quote(i.clone(), 105.0, 100.0),
                    "INFY" => quote(i.clone(), 98.0, 100.0),
                    _ => quote(i.clone(), 100.0, 100.0),
                })
                .collect())
        });
        let indices = vec![Instrument::new(
            "NSE_INDEX|Nifty 50",
            "NIFTY 50",
            Exchange::Nse,
            InstrumentType::Index,
        )];

        let overview = market_overview(
            &client,
            &master(),
            &table(),
            &indices,
            InstrumentDefaults::default(),
            &delayed(),
        )
        .await
        .unwrap();

        assert_eq!(overview.indices.len(), 1);
        assert_eq!(
            overview.breadth,
            Some(Breadth {
                advances: 1,
                declines: 1,
                unchanged: 1
            })
        );
        assert_eq!(overview.leaders[0].instrument.symbol, "TCS");
        assert_eq!(overview.laggards[0].instrument.symbol, "INFY");
        assert!(overview.delayed);
    }

    #[tokio::test]
    async fn test_market_overview_without_constituents() {
        let mut client = MockBrokerageClient::new();
        client.expect_quotes().returning(|instruments, _| {
            if instruments.iter().all(|i| i.instrument_type == InstrumentType::Index) {
                Ok(instruments.iter().map(|i| quote(i.clone(), 101.0, 100.0)).collect())
            } else {
                Err(StockError::RateLimitExceeded {
                    provider: "upstox".to_string(),
                })
            }
        });
        let indices = vec![Instrument::new(
            "NSE_INDEX|Nifty 50",
            "NIFTY 50",
            Exchange::Nse,
            InstrumentType::Index,
        )];

        let overview = market_overview(
            &client,
            &master(),
            &table(),
            &indices,
            InstrumentDefaults::default(),
            &delayed(),
        )
        .await
        .unwrap();

        assert_eq!(overview.indices.len(), 1);
        assert_eq!(overview.breadth, None);
        assert!(overview.leaders.is_empty());
    }
}
