//! Turns one line of user text into a [`Command`]
//!
//! Keywords are tried first, then conversational phrases, and whatever is
//! left is read as an instrument lookup (`SYMBOL [EXCHANGE] [TYPE]`).

mod phrases;

use crate::error::{Result, StockError};
use crate::market::{Exchange, InstrumentQuery, InstrumentType};
use phrases::PhrasePatterns;

/// Longest multi-word symbol accepted for a bare lookup (`NIFTY BANK`)
const MAX_SYMBOL_WORDS: usize = 3;

/// Words that separate the two sides of a comparison
const COMPARE_CONNECTORS: &[&str] = &["with", "and", "vs", "vs.", "versus"];

/// Words dropped from `compare the performance of A with B`
const COMPARE_FILLER: &[&str] = &["the", "performance", "of", "price", "prices"];

/// Structured query produced by the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Current quote for one instrument
    Lookup(InstrumentQuery),
    /// Quote, indicators and optional narrative insight
    Analyze(InstrumentQuery),
    /// Recent daily bars; `days` falls back to the configured default
    History {
        query: InstrumentQuery,
        days: Option<u32>,
    },
    /// Side-by-side comparison of two instruments
    Compare {
        first: InstrumentQuery,
        second: InstrumentQuery,
    },
    /// Best performers by percent change
    TopPerformers { count: Option<usize> },
    /// Benchmark indices and market breadth
    MarketOverview,
    /// Members of a sector with their last price
    Sector { name: String },
    /// Stream quotes until cancelled
    Watch(InstrumentQuery),
    /// Start the login flow
    Authenticate,
    /// Finish the login flow with a pasted authorization code
    CompleteLogin { code: String },
    Logout,
    /// Re-download instrument metadata
    RefreshData,
    Status,
    Help,
    Exit,
}

impl Command {
    /// Short description of the command
    pub fn description(&self) -> &'static str {
        match self {
            Command::Lookup(_) => "Instrument quote",
            Command::Analyze(_) => "Instrument analysis",
            Command::History { .. } => "Price history",
            Command::Compare { .. } => "Instrument comparison",
            Command::TopPerformers { .. } => "Top performers",
            Command::MarketOverview => "Market overview",
            Command::Sector { .. } => "Sector listing",
            Command::Watch(_) => "Live quote stream",
            Command::Authenticate => "Log in to Upstox",
            Command::CompleteLogin { .. } => "Complete Upstox login",
            Command::Logout => "Log out",
            Command::RefreshData => "Refresh instrument data",
            Command::Status => "Session status",
            Command::Help => "Show help",
            Command::Exit => "Exit",
        }
    }

    /// The instrument the command is about, if any
    pub fn subject(&self) -> Option<&InstrumentQuery> {
        match self {
            Command::Lookup(q) | Command::Analyze(q) | Command::Watch(q) => Some(q),
            Command::History { query, .. } => Some(query),
            Command::Compare { first, .. } => Some(first),
            _ => None,
        }
    }

    /// Get help text for all commands
    pub fn help_text() -> &'static str {
        r"Stock Assistant Commands
========================

Quotes and analysis:
  SYMBOL [EXCHANGE] [TYPE]        Quote, e.g. `RELIANCE`, `RELIANCE BSE`, `NIFTY 50 IDX`
  analyze SYMBOL [EX] [TYPE]      Quote, indicators and AI insight
  history SYMBOL [EX] [TYPE] [N]  Last N days of daily bars (default 30)
  compare A B                     Compare two instruments
  watch SYMBOL                    Stream quotes (Ctrl+C or `stop` to end)

Market:
  top_performers [N]              Best performers today (alias: top)
  market_overview                 Indices and breadth (alias: overview)
  sector NAME                     Sector listing, e.g. `sector IT`

Session:
  login                           Log in to Upstox for live data
  login CODE                      Finish login with the code from the redirect
  logout                          Drop the Upstox session
  refresh                         Re-download instrument data
  status                          Session and data status
  help                            Show this help
  exit                            Leave

Exchanges: NSE, BSE. Types: EQ, FUT, OPT, IDX.
Without login, quotes are delayed by 15 minutes.

You can also ask in plain English:
  - show 3 month data of TCS
  - top 10 performing stocks
  - trend analysis of INFY
  - compare HDFCBANK with ICICIBANK
  - how is the IT sector doing"
    }
}

/// Parses user input into commands
#[derive(Debug)]
pub struct Interpreter {
    phrases: PhrasePatterns,
}

impl Interpreter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            phrases: PhrasePatterns::compile()?,
        })
    }

    /// Parse one line of input
    pub fn parse(&self, input: &str) -> Result<Command> {
        let line = input.trim();
        let line = line.strip_prefix('/').unwrap_or(line).trim();
        if line.is_empty() {
            return Err(StockError::UnrecognizedCommand(input.trim().to_string()));
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let keyword = tokens[0].to_lowercase();
        let args = &tokens[1..];

        if let Some(command) = parse_keyword(&keyword, args)? {
            return Ok(command);
        }

        if let Some(command) = self.phrases.match_phrase(line)? {
            return Ok(command);
        }

        parse_lookup(&tokens)
            .map(Command::Lookup)
            .map_err(|e| match e {
                StockError::UnrecognizedCommand(_) => {
                    StockError::UnrecognizedCommand(line.to_string())
                }
                other => other,
            })
    }
}

fn missing(command: &str, argument: &str) -> StockError {
    StockError::MissingArgument {
        command: command.to_string(),
        argument: argument.to_string(),
    }
}

fn parse_keyword(keyword: &str, args: &[&str]) -> Result<Option<Command>> {
    let command = match keyword {
        "analyze" | "analyse" | "a" => {
            if args.is_empty() {
                return Err(missing("analyze", "symbol"));
            }
            Command::Analyze(parse_lookup(args)?)
        }
        "history" | "hist" => {
            if args.is_empty() {
                return Err(missing("history", "symbol"));
            }
            let (days, rest) = match args.split_last() {
                Some((last, rest)) if !rest.is_empty() && last.parse::<u32>().is_ok() => {
                    (last.parse::<u32>().ok(), rest)
                }
                _ => (None, args),
            };
            if days == Some(0) {
                return Err(StockError::AmbiguousQuery(
                    "history needs at least one day".to_string(),
                ));
            }
            Command::History {
                query: parse_lookup(rest)?,
                days,
            }
        }
        "compare" | "cmp" => parse_compare(args)?,
        "top_performers" | "top" | "topperformers" => {
            let count = match args.first() {
                Some(n) => Some(n.parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                    StockError::AmbiguousQuery(format!("'{n}' is not a valid count"))
                })?),
                None => None,
            };
            Command::TopPerformers { count }
        }
        "market_overview" | "overview" | "market" | "marketoverview" => Command::MarketOverview,
        "sector" => {
            if args.is_empty() {
                return Err(missing("sector", "name"));
            }
            Command::Sector {
                name: args.join(" ").to_uppercase(),
            }
        }
        "watch" | "w" => {
            if args.is_empty() {
                return Err(missing("watch", "symbol"));
            }
            Command::Watch(parse_lookup(args)?)
        }
        "login" | "authenticate" | "auth" => match args.first() {
            Some(code) => Command::CompleteLogin {
                code: (*code).to_string(),
            },
            None => Command::Authenticate,
        },
        "logout" => Command::Logout,
        "refresh" | "reload" => Command::RefreshData,
        "status" => Command::Status,
        "help" | "h" | "?" => Command::Help,
        "exit" | "quit" | "q" => Command::Exit,
        _ => return Ok(None),
    };
    Ok(Some(command))
}

fn parse_compare(args: &[&str]) -> Result<Command> {
    let args: Vec<&str> = args
        .iter()
        .copied()
        .filter(|t| !COMPARE_FILLER.contains(&t.to_lowercase().as_str()))
        .collect();
    let split = args
        .iter()
        .position(|t| COMPARE_CONNECTORS.contains(&t.to_lowercase().as_str()));

    let (left, right): (&[&str], &[&str]) = match split {
        Some(idx) => (&args[..idx], &args[idx + 1..]),
        None if args.len() == 2 => (&args[..1], &args[1..]),
        None => {
            return Err(StockError::MissingArgument {
                command: "compare".to_string(),
                argument: "pair of symbols (e.g. `compare TCS INFY`)".to_string(),
            });
        }
    };

    if left.is_empty() || right.is_empty() {
        return Err(missing("compare", "second symbol"));
    }

    Ok(Command::Compare {
        first: parse_lookup(left)?,
        second: parse_lookup(right)?,
    })
}

fn is_symbol_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '&' | '-' | '_' | '.'))
}

/// Parse `SYMBOL [EXCHANGE] [TYPE]`.
///
/// Trailing exchange and type codes are pulled off; the rest is the symbol,
/// upper-cased. Two different exchanges (or types) make the query ambiguous.
pub fn parse_lookup(tokens: &[&str]) -> Result<InstrumentQuery> {
    let mut end = tokens.len();
    let mut exchange: Option<Exchange> = None;
    let mut kind: Option<InstrumentType> = None;

    while end > 1 {
        let token = tokens[end - 1];
        if let Some(found) = Exchange::from_token(token) {
            if exchange.is_some_and(|e| e != found) {
                return Err(StockError::AmbiguousQuery(format!(
                    "both {} and {found} were given as the exchange",
                    exchange.map_or("", Exchange::as_str)
                )));
            }
            exchange = Some(found);
        } else if let Some(found) = InstrumentType::from_token(token) {
            if kind.is_some_and(|k| k != found) {
                return Err(StockError::AmbiguousQuery(format!(
                    "both {} and {found} were given as the instrument type",
                    kind.map_or("", InstrumentType::as_str)
                )));
            }
            kind = Some(found);
        } else {
            break;
        }
        end -= 1;
    }

    let symbol_tokens = &tokens[..end];
    if symbol_tokens.is_empty()
        || symbol_tokens.len() > MAX_SYMBOL_WORDS
        || !symbol_tokens.iter().all(|t| is_symbol_token(t))
    {
        return Err(StockError::UnrecognizedCommand(tokens.join(" ")));
    }

    let mut query = InstrumentQuery::new(symbol_tokens.join(" "));
    query.exchange = exchange;
    query.instrument_type = kind;
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Command> {
        Interpreter::new().unwrap().parse(input)
    }

    fn lookup(input: &str) -> InstrumentQuery {
        match parse(input).unwrap() {
            Command::Lookup(q) => q,
            other => panic!("expected lookup, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_symbol_is_lookup_without_overrides() {
        let q = lookup("RELIANCE");
        assert_eq!(q.symbol, "RELIANCE");
        assert_eq!(q.exchange, None);
        assert_eq!(q.instrument_type, None);
    }

    #[test]
    fn test_trailing_exchange_is_extracted() {
        let q = lookup("RELIANCE NSE");
        assert_eq!(q.symbol, "RELIANCE");
        assert_eq!(q.exchange, Some(Exchange::Nse));
        assert_eq!(q.instrument_type, None);
    }

    #[test]
    fn test_trailing_exchange_and_type_in_any_order() {
        let a = lookup("tcs bse eq");
        let b = lookup("TCS EQ BSE");
        assert_eq!(a, b);
        assert_eq!(a.symbol, "TCS");
        assert_eq!(a.exchange, Some(Exchange::Bse));
        assert_eq!(a.instrument_type, Some(InstrumentType::Equity));
    }

    #[test]
    fn test_symbol_characters_are_kept() {
        assert_eq!(lookup("m&m").symbol, "M&M");
        assert_eq!(lookup("BAJAJ-AUTO").symbol, "BAJAJ-AUTO");
        assert_eq!(lookup("NIFTY 50 IDX").symbol, "NIFTY 50");
    }

    #[test]
    fn test_conflicting_exchanges_are_ambiguous() {
        assert!(matches!(
            parse("RELIANCE NSE BSE"),
            Err(StockError::AmbiguousQuery(_))
        ));
        assert!(matches!(
            parse("NIFTY FUT OPT"),
            Err(StockError::AmbiguousQuery(_))
        ));
    }

    #[test]
    fn test_named_commands_are_not_lookups() {
        assert!(matches!(parse("analyze TCS").unwrap(), Command::Analyze(q) if q.symbol == "TCS"));
        assert_eq!(
            parse("top_performers").unwrap(),
            Command::TopPerformers { count: None }
        );
        assert_eq!(parse("market_overview").unwrap(), Command::MarketOverview);
        assert_eq!(
            parse("sector it").unwrap(),
            Command::Sector {
                name: "IT".to_string()
            }
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive_with_optional_slash() {
        assert_eq!(parse("/HELP").unwrap(), Command::Help);
        assert_eq!(parse("Market_Overview").unwrap(), Command::MarketOverview);
        assert_eq!(
            parse("/top 10").unwrap(),
            Command::TopPerformers { count: Some(10) }
        );
    }

    #[test]
    fn test_history_days() {
        match parse("history INFY BSE 90").unwrap() {
            Command::History { query, days } => {
                assert_eq!(query.symbol, "INFY");
                assert_eq!(query.exchange, Some(Exchange::Bse));
                assert_eq!(days, Some(90));
            }
            other => panic!("unexpected {other:?}"),
        }
        // a lone number is the symbol (BSE scrip codes)
        assert!(matches!(
            parse("history 500325").unwrap(),
            Command::History { days: None, .. }
        ));
    }

    #[test]
    fn test_compare_forms() {
        let expected = Command::Compare {
            first: InstrumentQuery::new("TCS"),
            second: InstrumentQuery::new("INFY"),
        };
        assert_eq!(parse("compare TCS INFY").unwrap(), expected);
        assert_eq!(parse("compare tcs with infy").unwrap(), expected);
        assert_eq!(
            parse("compare the performance of TCS vs INFY").unwrap(),
            expected
        );
        assert!(matches!(
            parse("compare TCS"),
            Err(StockError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_login_with_and_without_code() {
        assert_eq!(parse("login").unwrap(), Command::Authenticate);
        assert_eq!(
            parse("login abc123").unwrap(),
            Command::CompleteLogin {
                code: "abc123".to_string()
            }
        );
    }

    #[test]
    fn test_missing_arguments() {
        assert!(matches!(parse("analyze"), Err(StockError::MissingArgument { .. })));
        assert!(matches!(parse("sector"), Err(StockError::MissingArgument { .. })));
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        assert!(matches!(parse(""), Err(StockError::UnrecognizedCommand(_))));
        assert!(matches!(parse("   /  "), Err(StockError::UnrecognizedCommand(_))));
        assert!(matches!(parse("$$$"), Err(StockError::UnrecognizedCommand(_))));
        assert!(matches!(
            parse("please tell me something nice"),
            Err(StockError::UnrecognizedCommand(_))
        ));
    }

    #[test]
    fn test_bad_top_count() {
        assert!(parse("top many").is_err());
        assert!(parse("top 0").is_err());
    }
}
