//! Conversational phrasings of the keyword commands

use super::{Command, parse_lookup};
use crate::error::{Result, StockError};
use crate::market::InstrumentQuery;
use regex::{Captures, Regex};

#[derive(Debug, Clone, Copy)]
enum Phrase {
    History,
    TopPerformers,
    Indicators,
    Compare,
    Sector,
    MarketOverview,
    Quote,
}

const PATTERNS: &[(Phrase, &str)] = &[
    (
        Phrase::History,
        r"(?i)^(?:get|show|display|give)\s+(?:me\s+)?(?:the\s+)?(?:last\s+)?(\d+)\s+(day|week|month|year)s?\s+(?:of\s+)?(?:data|history|prices?)\s+(?:of|for)\s+(.+?)\s*\??$",
    ),
    (
        Phrase::TopPerformers,
        r"(?i)^(?:show|get|display|give|list)\s+(?:me\s+)?(?:the\s+)?top\s+(\d+)(?:\s+performing)?\s+(?:stocks|performers|shares)\b",
    ),
    (
        Phrase::Indicators,
        r"(?i)^(?:(?:show|get|give|calculate|find|do)\s+(?:me\s+)?(?:a\s+|the\s+)?)?(?:trend\s+analysis|technical\s+analysis|rsi(?:\s+analysis)?|(?:\d+\s+day\s+)?moving\s+averages?|support\s+and\s+resistance(?:\s+levels)?)\s+(?:of|for)\s+(.+?)\s*\??$",
    ),
    (
        Phrase::Compare,
        r"(?i)^(?:show\s+(?:me\s+)?)?(?:the\s+)?(?:performance\s+of\s+)?(.+?)\s+(?:vs\.?|versus)\s+(.+?)\s*\??$",
    ),
    (
        Phrase::Sector,
        r"(?i)^(?:how|what)\s+is\s+(?:the\s+)?(.+?)\s+sector(?:\s+(?:performance|doing|performing))?\s*\??$",
    ),
    (
        Phrase::MarketOverview,
        r"(?i)^(?:how\s+is\s+the\s+market(?:\s+doing)?(?:\s+today)?|(?:show\s+(?:me\s+)?)?(?:the\s+)?market\s+(?:overview|summary))\s*\??$",
    ),
    (
        Phrase::Quote,
        r"(?i)^(?:(?:what\s+is|what's|show|get)\s+(?:me\s+)?)?(?:the\s+)?(?:price|quote|details|info)\s+(?:of|for)\s+(.+?)\s*\??$",
    ),
];

/// Compiled phrase patterns, tried in order
#[derive(Debug)]
pub(super) struct PhrasePatterns {
    patterns: Vec<(Phrase, Regex)>,
}

impl PhrasePatterns {
    pub(super) fn compile() -> Result<Self> {
        let patterns = PATTERNS
            .iter()
            .map(|(phrase, pattern)| {
                Regex::new(pattern)
                    .map(|re| (*phrase, re))
                    .map_err(|e| StockError::ConfigError(format!("bad phrase pattern: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// First phrase that matches the whole line, if any
    pub(super) fn match_phrase(&self, line: &str) -> Result<Option<Command>> {
        for (phrase, regex) in &self.patterns {
            if let Some(caps) = regex.captures(line) {
                return build(*phrase, &caps).map(Some);
            }
        }
        Ok(None)
    }
}

fn group<'a>(caps: &'a Captures<'_>, idx: usize) -> &'a str {
    caps.get(idx).map_or("", |m| m.as_str())
}

fn instrument(text: &str) -> Result<InstrumentQuery> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    parse_lookup(&tokens)
}

fn build(phrase: Phrase, caps: &Captures<'_>) -> Result<Command> {
    Ok(match phrase {
        Phrase::History => {
            let count: u32 = group(caps, 1).parse().unwrap_or(1);
            let days_per_unit = match group(caps, 2).to_lowercase().as_str() {
                "week" => 7,
                "month" => 30,
                "year" => 365,
                _ => 1,
            };
            Command::History {
                query: instrument(group(caps, 3))?,
                days: Some(count.saturating_mul(days_per_unit).max(1)),
            }
        }
        Phrase::TopPerformers => Command::TopPerformers {
            count: group(caps, 1).parse::<usize>().ok().filter(|n| *n > 0),
        },
        Phrase::Indicators => Command::Analyze(instrument(group(caps, 1))?),
        Phrase::Compare => Command::Compare {
            first: instrument(group(caps, 1))?,
            second: instrument(group(caps, 2))?,
        },
        Phrase::Sector => Command::Sector {
            name: group(caps, 1).trim().to_uppercase(),
        },
        Phrase::MarketOverview => Command::MarketOverview,
        Phrase::Quote => Command::Lookup(instrument(group(caps, 1))?),
    })
}
