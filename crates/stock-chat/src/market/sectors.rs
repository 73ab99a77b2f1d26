//! Sector membership and benchmark indices

use super::instrument::{Exchange, Instrument, InstrumentType};
use std::collections::{BTreeMap, BTreeSet};

const SECTORS: &[(&str, &[&str])] = &[
    (
        "IT",
        &["TCS", "INFY", "HCLTECH", "WIPRO", "TECHM", "LTIM", "PERSISTENT", "COFORGE", "MPHASIS"],
    ),
    (
        "BANK",
        &["HDFCBANK", "ICICIBANK", "SBIN", "KOTAKBANK", "AXISBANK", "INDUSINDBK", "BANKBARODA", "PNB"],
    ),
    (
        "AUTO",
        &["MARUTI", "TATAMOTORS", "M&M", "BAJAJ-AUTO", "EICHERMOT", "HEROMOTOCO", "TVSMOTOR"],
    ),
    (
        "PHARMA",
        &["SUNPHARMA", "DRREDDY", "CIPLA", "DIVISLAB", "LUPIN", "AUROPHARMA"],
    ),
    (
        "FMCG",
        &["HINDUNILVR", "ITC", "NESTLEIND", "BRITANNIA", "DABUR", "TATACONSUM"],
    ),
    ("ENERGY", &["RELIANCE", "ONGC", "NTPC", "POWERGRID", "BPCL", "IOC"]),
    ("METAL", &["TATASTEEL", "JSWSTEEL", "HINDALCO", "VEDL", "COALINDIA"]),
    ("FINANCE", &["BAJFINANCE", "BAJAJFINSV", "HDFCLIFE", "SBILIFE", "CHOLAFIN"]),
];

const ALIASES: &[(&str, &str)] = &[
    ("TECH", "IT"),
    ("TECHNOLOGY", "IT"),
    ("SOFTWARE", "IT"),
    ("BANKS", "BANK"),
    ("BANKING", "BANK"),
    ("AUTOMOBILE", "AUTO"),
    ("AUTOMOBILES", "AUTO"),
    ("HEALTHCARE", "PHARMA"),
    ("CONSUMER", "FMCG"),
    ("OIL", "ENERGY"),
    ("POWER", "ENERGY"),
    ("METALS", "METAL"),
    ("FINANCIALS", "FINANCE"),
    ("NBFC", "FINANCE"),
];

/// Index instruments used for the market overview
pub fn benchmark_indices() -> Vec<Instrument> {
    vec![
        Instrument::new("NSE_INDEX|Nifty 50", "NIFTY 50", Exchange::Nse, InstrumentType::Index)
            .with_name("Nifty 50"),
        Instrument::new("NSE_INDEX|Nifty Bank", "NIFTY BANK", Exchange::Nse, InstrumentType::Index)
            .with_name("Nifty Bank"),
        Instrument::new("BSE_INDEX|SENSEX", "SENSEX", Exchange::Bse, InstrumentType::Index)
            .with_name("S&P BSE Sensex"),
    ]
}

/// Sector name to member symbols
#[derive(Debug, Clone)]
pub struct SectorTable {
    sectors: BTreeMap<String, Vec<String>>,
    aliases: BTreeMap<String, String>,
}

impl Default for SectorTable {
    fn default() -> Self {
        let sectors = SECTORS
            .iter()
            .map(|(name, symbols)| {
                (
                    (*name).to_string(),
                    symbols.iter().map(|s| (*s).to_string()).collect(),
                )
            })
            .collect();
        let aliases = ALIASES
            .iter()
            .map(|(alias, name)| ((*alias).to_string(), (*name).to_string()))
            .collect();
        Self { sectors, aliases }
    }
}

impl SectorTable {
    pub fn new(sectors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            sectors: sectors
                .into_iter()
                .map(|(name, symbols)| (name.to_uppercase(), symbols))
                .collect(),
            aliases: BTreeMap::new(),
        }
    }

    /// Look up a sector by name or alias, case-insensitively
    pub fn lookup(&self, name: &str) -> Option<(&str, &[String])> {
        let key = name.trim().to_uppercase();
        let canonical = self.aliases.get(&key).unwrap_or(&key);
        self.sectors
            .get_key_value(canonical)
            .map(|(name, symbols)| (name.as_str(), symbols.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sectors.keys().map(String::as_str)
    }

    /// Every symbol in any sector, deduplicated and sorted
    pub fn universe(&self) -> Vec<String> {
        self.sectors
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn sector_of(&self, symbol: &str) -> Option<&str> {
        let symbol = symbol.to_uppercase();
        self.sectors
            .iter()
            .find(|(_, members)| members.contains(&symbol))
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive_and_follows_aliases() {
        let table = SectorTable::default();
        let (name, symbols) = table.lookup("it").unwrap();
        assert_eq!(name, "IT");
        assert!(symbols.contains(&"TCS".to_string()));

        assert_eq!(table.lookup("Banking").unwrap().0, "BANK");
        assert!(table.lookup("shipping").is_none());
    }

    #[test]
    fn test_universe_is_deduplicated() {
        let mut sectors = BTreeMap::new();
        sectors.insert("a".to_string(), vec!["X".to_string(), "Y".to_string()]);
        sectors.insert("b".to_string(), vec!["Y".to_string()]);
        let table = SectorTable::new(sectors);
        assert_eq!(table.universe(), vec!["X", "Y"]);
        assert_eq!(table.sector_of("y"), Some("A"));
    }

    #[test]
    fn test_benchmarks_are_indices() {
        assert!(
            benchmark_indices()
                .iter()
                .all(|i| i.instrument_type == InstrumentType::Index)
        );
    }
}
