//! Rendering of market data for chat (Markdown) and terminal (plain text)

use super::SessionStatus;
use crate::analysis::{AnalysisReport, Comparison, IndicatorSnapshot};
use crate::brokerage::{MarketOverview, SectorListing};
use crate::interpreter::Command;
use crate::market::time::{format_ist, ist};
use crate::market::{HistoricalSeries, Quote};
use comfy_table::{Table, presets};
use std::fmt::Write;

/// Indian digit grouping: 12,34,567
fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    if digits.len() <= 3 {
        return digits;
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut out = String::new();
    for (i, c) in head.chars().enumerate() {
        if i > 0 && (head.len() - i) % 2 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push(',');
    out.push_str(tail);
    out
}

fn price(value: f64) -> String {
    format!("{value:.2}")
}

fn signed(value: f64) -> String {
    format!("{value:+.2}")
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:+.2}%"))
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), price)
}

fn change_line(quote: &Quote) -> String {
    match (quote.change(), quote.change_percent()) {
        (Some(abs), pct) => format!("{} ({})", signed(abs), percent(pct)),
        (None, _) => "n/a".to_string(),
    }
}

fn indicator_rows(ind: &IndicatorSnapshot) -> Vec<Vec<String>> {
    let mut rows = vec![
        vec![
            "RSI (14)".to_string(),
            ind.rsi14.map_or_else(
                || "n/a".to_string(),
                |v| format!("{v:.2} ({})", crate::analysis::interpret_rsi(v)),
            ),
        ],
        vec!["SMA (20)".to_string(), optional(ind.sma20)],
        vec!["SMA (50)".to_string(), optional(ind.sma50)],
        vec!["SMA (200)".to_string(), optional(ind.sma200)],
        vec!["EMA (20)".to_string(), optional(ind.ema20)],
    ];
    if let Some(macd) = ind.macd {
        rows.push(vec![
            "MACD (12, 26, 9)".to_string(),
            format!("{:.2} / signal {:.2}", macd.macd, macd.signal),
        ]);
    }
    if let Some(bands) = ind.bollinger {
        rows.push(vec![
            "Bollinger (20, 2)".to_string(),
            format!("{} / {} / {}", price(bands.lower), price(bands.middle), price(bands.upper)),
        ]);
    }
    rows.push(vec!["Support (20d low)".to_string(), optional(ind.support)]);
    rows.push(vec!["Resistance (20d high)".to_string(), optional(ind.resistance)]);
    rows.push(vec![
        "Volatility (annualised)".to_string(),
        ind.volatility.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}%")),
    ]);
    rows.push(vec![
        "Max drawdown".to_string(),
        ind.max_drawdown.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}%")),
    ]);
    rows.push(vec![
        "Trend".to_string(),
        ind.trend.map_or("n/a", |t| t.label()).to_string(),
    ]);
    rows
}

/// Response rendering; implementors supply the markup primitives
pub trait Formatter: Send + Sync {
    fn heading(&self, text: &str) -> String;
    fn emphasis(&self, text: &str) -> String;
    fn table_preset(&self) -> &'static str;
    fn format_help(&self) -> String;

    fn format_table(&self, headers: &[&str], rows: Vec<Vec<String>>) -> String {
        let mut table = Table::new();
        table.load_preset(self.table_preset()).set_header(headers.to_vec());
        for row in rows {
            table.add_row(row);
        }
        table.to_string()
    }

    fn format_quote(&self, quote: &Quote) -> String {
        let inst = &quote.instrument;
        let mut out = self.heading(&inst.label());
        if !inst.name.is_empty() && inst.name != inst.symbol {
            let _ = writeln!(out, "{}", inst.name);
        }
        let _ = writeln!(
            out,
            "{} {}",
            self.emphasis("Last price:"),
            price(quote.last_price)
        );
        let _ = writeln!(out, "{} {}", self.emphasis("Change:"), change_line(quote));
        if let Some(ohlc) = quote.ohlc {
            let _ = writeln!(
                out,
                "Open {} | High {} | Low {} | Close {}",
                price(ohlc.open),
                price(ohlc.high),
                price(ohlc.low),
                price(ohlc.close)
            );
        }
        if let Some(prev) = quote.previous_close {
            let _ = writeln!(out, "Previous close: {}", price(prev));
        }
        let _ = writeln!(out, "Volume: {}", group_digits(quote.volume));

        if !quote.depth.is_empty() {
            let levels = quote.depth.bids.len().max(quote.depth.asks.len());
            let rows = (0..levels)
                .map(|i| {
                    let bid = quote.depth.bids.get(i);
                    let ask = quote.depth.asks.get(i);
                    vec![
                        bid.map(|l| group_digits(l.quantity)).unwrap_or_default(),
                        bid.map(|l| price(l.price)).unwrap_or_default(),
                        ask.map(|l| price(l.price)).unwrap_or_default(),
                        ask.map(|l| group_digits(l.quantity)).unwrap_or_default(),
                    ]
                })
                .collect();
            out.push('\n');
            out.push_str(&self.format_table(&["Bid qty", "Bid", "Ask", "Ask qty"], rows));
            out.push('\n');
        }

        let _ = write!(out, "As of {}", format_ist(quote.timestamp));
        if quote.delayed {
            out.push_str(" (delayed)");
        }
        out
    }

    fn format_series(&self, series: &HistoricalSeries) -> String {
        let inst = series.instrument();
        let mut out = self.heading(&format!("{} daily history", inst.label()));
        let Some(summary) = series.summary() else {
            out.push_str("No bars in the requested range.");
            return out;
        };
        let _ = writeln!(
            out,
            "{} sessions from {} to {}: {} → {} ({})",
            summary.bars,
            summary.from,
            summary.to,
            price(summary.first_close),
            price(summary.last_close),
            percent(Some(summary.change_percent))
        );
        let _ = writeln!(
            out,
            "Range {} – {}, average volume {}",
            price(summary.low),
            price(summary.high),
            group_digits(summary.average_volume)
        );
        out.push('\n');

        let rows = series
            .bars()
            .rev()
            .map(|b| {
                vec![
                    b.date.to_string(),
                    price(b.open),
                    price(b.high),
                    price(b.low),
                    price(b.close),
                    group_digits(b.volume),
                ]
            })
            .collect();
        out.push_str(&self.format_table(&["Date", "Open", "High", "Low", "Close", "Volume"], rows));
        out
    }

    fn format_sector(&self, listing: &SectorListing) -> String {
        let mut out = self.heading(&format!("{} sector", listing.sector));
        let rows = listing
            .entries
            .iter()
            .map(|e| {
                vec![
                    e.instrument.symbol.clone(),
                    e.instrument.name.clone(),
                    price(e.last_price),
                    percent(e.change_percent),
                ]
            })
            .collect();
        out.push_str(&self.format_table(&["Symbol", "Name", "Last", "Change"], rows));
        out.push('\n');
        if let Some(avg) = listing.average_change() {
            let _ = writeln!(out, "Sector average: {}", percent(Some(avg)));
        }
        if !listing.missing.is_empty() {
            let _ = writeln!(out, "No data for: {}", listing.missing.join(", "));
        }
        let _ = write!(out, "As of {}", format_ist(listing.as_of));
        out
    }

    fn format_performers(&self, quotes: &[Quote]) -> String {
        let mut out = self.heading(&format!("Top {} performers", quotes.len()));
        let rows = quotes
            .iter()
            .enumerate()
            .map(|(i, q)| {
                vec![
                    (i + 1).to_string(),
                    q.instrument.symbol.clone(),
                    price(q.last_price),
                    percent(q.change_percent()),
                ]
            })
            .collect();
        out.push_str(&self.format_table(&["#", "Symbol", "Last", "Change"], rows));
        if let Some(first) = quotes.first() {
            let _ = write!(out, "\nAs of {}", format_ist(first.timestamp));
        }
        out
    }

    fn format_overview(&self, overview: &MarketOverview) -> String {
        let mut out = self.heading("Market overview");
        let rows = overview
            .indices
            .iter()
            .map(|q| {
                vec![
                    q.instrument.symbol.clone(),
                    price(q.last_price),
                    change_line(q),
                ]
            })
            .collect();
        out.push_str(&self.format_table(&["Index", "Level", "Change"], rows));
        out.push('\n');

        match overview.breadth {
            Some(b) => {
                let _ = writeln!(
                    out,
                    "{} {} advancing, {} declining, {} unchanged",
                    self.emphasis("Breadth:"),
                    b.advances,
                    b.declines,
                    b.unchanged
                );
            }
            None => {
                let _ = writeln!(out, "{} unavailable", self.emphasis("Breadth:"));
            }
        }
        let list = |quotes: &[Quote]| {
            quotes
                .iter()
                .map(|q| format!("{} {}", q.instrument.symbol, percent(q.change_percent())))
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !overview.leaders.is_empty() {
            let _ = writeln!(out, "{} {}", self.emphasis("Leaders:"), list(&overview.leaders));
        }
        if !overview.laggards.is_empty() {
            let _ = writeln!(out, "{} {}", self.emphasis("Laggards:"), list(&overview.laggards));
        }
        let _ = write!(out, "As of {}", format_ist(overview.as_of));
        out
    }

    fn format_analysis(&self, report: &AnalysisReport) -> String {
        let mut out = self.format_quote(&report.quote);
        out.push_str("\n\n");

        if let Some(s) = report.summary {
            let _ = writeln!(
                out,
                "{} {} over {} sessions ({} to {}), range {} – {}",
                self.emphasis("Period change:"),
                percent(Some(s.change_percent)),
                s.bars,
                s.from,
                s.to,
                price(s.low),
                price(s.high)
            );
            out.push('\n');
        }

        out.push_str(&self.heading("Technical indicators"));
        out.push_str(&self.format_table(&["Indicator", "Value"], indicator_rows(&report.indicators)));

        if let Some(insight) = &report.insight {
            out.push_str("\n\n");
            out.push_str(&self.heading("AI insight"));
            out.push_str(insight.trim());
        } else if let Some(note) = &report.insight_note {
            let _ = write!(out, "\n\nAI insight unavailable: {note}");
        }
        out
    }

    fn format_comparison(&self, comparison: &Comparison) -> String {
        let (a, b) = (&comparison.first, &comparison.second);
        let (sa, sb) = (&a.quote.instrument.symbol, &b.quote.instrument.symbol);
        let mut out = self.heading(&format!("{sa} vs {sb}"));

        let period = |r: &AnalysisReport| percent(r.summary.map(|s| s.change_percent));
        let rsi = |r: &AnalysisReport| {
            r.indicators
                .rsi14
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
        };
        let vol = |r: &AnalysisReport| {
            r.indicators
                .volatility
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}%"))
        };
        let trend = |r: &AnalysisReport| r.indicators.trend.map_or("n/a", |t| t.label()).to_string();

        let rows = vec![
            vec!["Last price".to_string(), price(a.quote.last_price), price(b.quote.last_price)],
            vec![
                "Day change".to_string(),
                percent(a.quote.change_percent()),
                percent(b.quote.change_percent()),
            ],
            vec!["Period change".to_string(), period(a), period(b)],
            vec!["RSI (14)".to_string(), rsi(a), rsi(b)],
            vec![
                "SMA (20)".to_string(),
                optional(a.indicators.sma20),
                optional(b.indicators.sma20),
            ],
            vec!["Volatility".to_string(), vol(a), vol(b)],
            vec!["Trend".to_string(), trend(a), trend(b)],
        ];
        out.push_str(&self.format_table(&["", sa.as_str(), sb.as_str()], rows));

        if let Some(winner) = comparison.outperformer() {
            let _ = write!(out, "\n{} {winner}", self.emphasis("Better period return:"));
        }
        for report in [a, b] {
            if let Some(insight) = &report.insight {
                out.push_str("\n\n");
                out.push_str(&self.heading(&format!("AI insight: {}", report.quote.instrument.symbol)));
                out.push_str(insight.trim());
            }
        }
        let _ = write!(out, "\nAs of {}", format_ist(a.quote.timestamp));
        out
    }

    fn format_status(&self, status: &SessionStatus) -> String {
        let mut out = self.heading("Session status");
        let mut rows = vec![
            vec!["Session".to_string(), status.session_id.clone()],
            vec!["Broker".to_string(), status.broker.to_string()],
            vec!["Login".to_string(), status.auth.to_string()],
        ];
        if let Some(user) = &status.user_name {
            rows.push(vec!["User".to_string(), user.clone()]);
        }
        if let Some(expiry) = status.token_expires_at {
            rows.push(vec![
                "Token expires".to_string(),
                format_ist(expiry.with_timezone(&ist())),
            ]);
        }
        rows.push(vec![
            "Data".to_string(),
            if status.token_expires_at.is_some() {
                "live".to_string()
            } else {
                format!("delayed {} min", status.data_delay_minutes)
            },
        ]);
        rows.push(vec!["Instruments loaded".to_string(), group_digits(status.instruments as u64)]);
        if let Some(at) = status.instruments_loaded_at {
            rows.push(vec![
                "Instruments updated".to_string(),
                format_ist(at.with_timezone(&ist())),
            ]);
        }
        rows.push(vec![
            "Defaults".to_string(),
            format!(
                "{} {}",
                status.defaults.exchange,
                status.defaults.instrument_type.as_str()
            ),
        ]);
        rows.push(vec![
            "AI insights".to_string(),
            if status.insights { "on" } else { "off" }.to_string(),
        ]);
        out.push_str(&self.format_table(&["", ""], rows));
        out
    }

    fn format_login(&self, url: &str, timeout_secs: u64) -> String {
        let mut out = self.heading("Upstox login");
        let _ = writeln!(out, "Open this link and sign in:\n{url}\n");
        let _ = write!(
            out,
            "The chat completes the login automatically when the browser returns. \
             If it can't reach this machine, copy the `code` value from the redirect \
             address and type `login CODE`. The link is valid for {timeout_secs} seconds."
        );
        out
    }

    /// One line per update while watching
    fn format_watch_update(&self, quote: &Quote) -> String {
        format!(
            "{} {} {} {}{}",
            quote.timestamp.with_timezone(&ist()).format("%H:%M:%S IST"),
            quote.instrument.symbol,
            price(quote.last_price),
            percent(quote.change_percent()),
            if quote.delayed { " (delayed)" } else { "" }
        )
    }
}

/// Markdown for chat front ends
pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn heading(&self, text: &str) -> String {
        format!("### {text}\n\n")
    }

    fn emphasis(&self, text: &str) -> String {
        format!("**{text}**")
    }

    fn table_preset(&self) -> &'static str {
        presets::ASCII_MARKDOWN
    }

    fn format_help(&self) -> String {
        format!("```\n{}\n```", Command::help_text())
    }
}

/// Plain text with box-drawn tables for terminals
pub struct PlainTextFormatter;

impl Formatter for PlainTextFormatter {
    fn heading(&self, text: &str) -> String {
        format!("{text}\n{}\n", "=".repeat(text.chars().count()))
    }

    fn emphasis(&self, text: &str) -> String {
        text.to_string()
    }

    fn table_preset(&self) -> &'static str {
        presets::UTF8_FULL_CONDENSED
    }

    fn format_help(&self) -> String {
        Command::help_text().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokerage::{Breadth, SectorEntry};
    use crate::market::time::now_ist;
    use crate::market::{
        Bar, DepthLevel, Exchange, Instrument, InstrumentType, MarketDepth, Ohlc,
    };
    use chrono::NaiveDate;

    fn reliance() -> Instrument {
        Instrument::new("NSE_EQ|INE002A01018", "RELIANCE", Exchange::Nse, InstrumentType::Equity)
            .with_name("RELIANCE INDUSTRIES LTD")
    }

    fn quote(delayed: bool) -> Quote {
        Quote {
            instrument: reliance(),
            last_price: 2912.5,
            volume: 1_234_567,
            ohlc: Some(Ohlc {
                open: 2890.0,
                high: 2920.0,
                low: 2885.0,
                close: 2912.5,
            }),
            previous_close: Some(2900.0),
            depth: MarketDepth::new(
                vec![DepthLevel {
                    price: 2912.0,
                    quantity: 150,
                    orders: 3,
                }],
                vec![DepthLevel {
                    price: 2913.0,
                    quantity: 90,
                    orders: 2,
                }],
            ),
            timestamp: now_ist(),
            delayed,
        }
    }

    #[test]
    fn test_group_digits() {
        assert_eq!(group_digits(999), "999");
        assert_eq!(group_digits(1_234), "1,234");
        assert_eq!(group_digits(1_234_567), "12,34,567");
        assert_eq!(group_digits(123_456_789), "12,34,56,789");
    }

    #[test]
    fn test_plain_quote() {
        let text = PlainTextFormatter.format_quote(&quote(true));
        assert!(text.starts_with("RELIANCE (NSE EQ)\n"));
        assert!(text.contains("Last price: 2912.50"));
        assert!(text.contains("+12.50 (+0.43%)"));
        assert!(text.contains("Volume: 12,34,567"));
        assert!(text.contains("Bid qty"));
        assert!(text.contains("IST (delayed)"));
    }

    #[test]
    fn test_markdown_quote_uses_markup() {
        let text = MarkdownFormatter.format_quote(&quote(false));
        assert!(text.starts_with("### RELIANCE (NSE EQ)"));
        assert!(text.contains("**Last price:** 2912.50"));
        assert!(text.contains("| Bid qty"));
        assert!(!text.contains("delayed"));
    }

    #[test]
    fn test_sector_listing() {
        let listing = SectorListing {
            sector: "IT".into(),
            entries: vec![SectorEntry {
                instrument: Instrument::new("NSE_EQ|TCS", "TCS", Exchange::Nse, InstrumentType::Equity),
                last_price: 3900.0,
                change_percent: Some(1.25),
                delayed: true,
            }],
            missing: vec!["WIPRO".into()],
            as_of: now_ist(),
        };
        let text = PlainTextFormatter.format_sector(&listing);
        assert!(text.starts_with("IT sector"));
        assert!(text.contains("TCS"));
        assert!(text.contains("3900.00"));
        assert!(text.contains("+1.25%"));
        assert!(text.contains("No data for: WIPRO"));
    }

    #[test]
    fn test_overview_breadth() {
        let mut overview = MarketOverview {
            indices: vec![quote(false)],
            breadth: Some(Breadth {
                advances: 12,
                declines: 7,
                unchanged: 1,
            }),
            leaders: vec![quote(false)],
            laggards: Vec::new(),
            as_of: now_ist(),
            delayed: false,
        };
        let text = PlainTextFormatter.format_overview(&overview);
        assert!(text.contains("Breadth: 12 advancing, 7 declining, 1 unchanged"));
        assert!(text.contains("Leaders: RELIANCE +0.43%"));

        overview.breadth = None;
        let text = PlainTextFormatter.format_overview(&overview);
        assert!(text.contains("Breadth: unavailable"));
        assert!(!text.contains("advancing"));
    }

    #[test]
    fn test_series_lists_newest_first() {
        let bars = [(1, 100.0), (2, 102.0)].map(|(d, close)| Bar {
            date: NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10,
            open_interest: None,
        });
        let series = HistoricalSeries::assemble(
            reliance(),
            bars,
            NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
        )
        .unwrap();
        let text = PlainTextFormatter.format_series(&series);
        assert!(text.contains("2 sessions from 2024-05-01 to 2024-05-02"));
        let newer = text.find("2024-05-02 ").unwrap_or(usize::MAX);
        let older = text.rfind("2024-05-01").unwrap();
        assert!(newer < older);
    }

    #[test]
    fn test_markdown_help_is_fenced() {
        let help = MarkdownFormatter.format_help();
        assert!(help.starts_with("```"));
        assert!(help.contains("top_performers"));
    }
}
