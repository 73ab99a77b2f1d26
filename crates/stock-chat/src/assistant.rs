//! The conversational assistant: one text line in, one [`ChatResponse`] out

use crate::analysis::{self, AnalysisReport, Comparison};
use crate::auth::{AuthState, Authenticator};
use crate::brokerage::{self, BrokerageClient, DataAccess, UpstoxClient, aggregate};
use crate::config::AssistantConfig;
use crate::error::{Result, StockError};
use crate::insights::{InsightProvider, InsightRequest, LlmInsightProvider};
use crate::instruments::InstrumentMaster;
use crate::interpreter::{Command, Interpreter};
use crate::market::time::{format_ist, ist, ist_date};
use crate::market::{
    HistoricalSeries, Instrument, InstrumentQuery, SectorTable, benchmark_indices,
};
use crate::presentation::{
    ChatAction, ChatResponse, Formatter, PlainTextFormatter, SessionStatus,
};
use crate::session::SessionContext;
use crate::subscription::{PollingQuoteFeed, QuoteFeed, Subscription};
use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// What a command produced, plus the instruments it was about
struct Outcome {
    response: ChatResponse,
    instruments: Vec<Instrument>,
}

impl Outcome {
    fn new(response: ChatResponse) -> Self {
        Self {
            response,
            instruments: Vec::new(),
        }
    }

    fn about(mut self, instruments: impl IntoIterator<Item = Instrument>) -> Self {
        self.instruments.extend(instruments);
        self
    }
}

/// Fill in exchange and type from the instrument a reference stood for
fn pin(query: InstrumentQuery, referent: Option<&InstrumentQuery>) -> InstrumentQuery {
    match referent {
        Some(cur)
            if cur.symbol == query.symbol
                && query.exchange.is_none()
                && query.instrument_type.is_none() =>
        {
            cur.clone()
        }
        _ => query,
    }
}

fn pin_command(command: Command, referent: Option<&InstrumentQuery>) -> Command {
    match command {
        Command::Lookup(q) => Command::Lookup(pin(q, referent)),
        Command::Analyze(q) => Command::Analyze(pin(q, referent)),
        Command::Watch(q) => Command::Watch(pin(q, referent)),
        Command::History { query, days } => Command::History {
            query: pin(query, referent),
            days,
        },
        Command::Compare { first, second } => Command::Compare {
            first: pin(first, referent),
            second: pin(second, referent),
        },
        other => other,
    }
}

/// Stock assistant over a brokerage client
pub struct StockAssistant {
    config: AssistantConfig,
    client: Arc<dyn BrokerageClient>,
    authenticator: Authenticator,
    master: RwLock<InstrumentMaster>,
    sectors: SectorTable,
    indices: Vec<Instrument>,
    insights: Option<Arc<dyn InsightProvider>>,
    formatter: Box<dyn Formatter>,
    feed: Arc<dyn QuoteFeed>,
    interpreter: Interpreter,
}

impl StockAssistant {
    pub fn new(config: AssistantConfig, client: Arc<dyn BrokerageClient>) -> Result<Self> {
        let feed = Arc::new(PollingQuoteFeed::new(
            Arc::clone(&client),
            config.watch_interval,
        ));
        Ok(Self {
            authenticator: Authenticator::new(Arc::clone(&client)),
            master: RwLock::new(InstrumentMaster::default()),
            sectors: SectorTable::default(),
            indices: benchmark_indices(),
            insights: None,
            formatter: Box::new(PlainTextFormatter),
            feed,
            interpreter: Interpreter::new()?,
            config,
            client,
        })
    }

    /// Upstox client and, when configured, the insight model
    pub fn from_config(config: AssistantConfig) -> Result<Self> {
        config.validate()?;
        let client: Arc<dyn BrokerageClient> = Arc::new(UpstoxClient::new(config.upstox.clone())?);
        let insights = LlmInsightProvider::from_config(&config.insights)?;
        let mut assistant = Self::new(config, client)?;
        if let Some(provider) = insights {
            assistant = assistant.with_insights(Arc::new(provider));
        }
        Ok(assistant)
    }

    pub fn with_insights(mut self, provider: Arc<dyn InsightProvider>) -> Self {
        self.insights = Some(provider);
        self
    }

    pub fn with_formatter(mut self, formatter: Box<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_sectors(mut self, sectors: SectorTable) -> Self {
        self.sectors = sectors;
        self
    }

    pub fn with_indices(mut self, indices: Vec<Instrument>) -> Self {
        self.indices = indices;
        self
    }

    pub fn with_feed(mut self, feed: Arc<dyn QuoteFeed>) -> Self {
        self.feed = feed;
        self
    }

    pub fn with_instruments(self, master: InstrumentMaster) -> Self {
        Self {
            master: RwLock::new(master),
            ..self
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn formatter(&self) -> &dyn Formatter {
        self.formatter.as_ref()
    }

    /// Load instruments from the snapshot, downloading when it is stale
    pub async fn init(&self) -> Result<usize> {
        let path = &self.config.instrument_cache_path;
        match InstrumentMaster::load_snapshot(path, self.config.instrument_cache_ttl) {
            Ok(Some(master)) => {
                let count = master.len();
                *self.master.write().await = master;
                return Ok(count);
            }
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "instrument snapshot unreadable"),
        }
        self.refresh_instruments().await
    }

    /// Download the instrument master and persist a snapshot
    pub async fn refresh_instruments(&self) -> Result<usize> {
        let instruments = self.client.instrument_master().await?;
        let master = InstrumentMaster::new(instruments, Utc::now());
        if let Err(e) = master.save_snapshot(&self.config.instrument_cache_path) {
            warn!(error = %e, "could not save instrument snapshot");
        }
        let count = master.len();
        *self.master.write().await = master;
        info!(instruments = count, "instrument master refreshed");
        Ok(count)
    }

    async fn resolve(&self, query: &InstrumentQuery) -> Result<Instrument> {
        self.master.read().await.resolve(query, self.config.defaults)
    }

    async fn access(&self, ctx: &SessionContext) -> DataAccess {
        ctx.auth
            .read()
            .await
            .access(Utc::now(), self.config.data_delay)
    }

    fn delay_minutes(&self, delayed: bool) -> Option<u64> {
        delayed.then(|| self.config.data_delay_minutes())
    }

    fn today() -> NaiveDate {
        ist_date(Utc::now())
    }

    /// Resolve references in `input` and parse it into a command
    ///
    /// A query whose symbol came from "it" or "this stock" keeps the exchange
    /// and type of the instrument being discussed.
    pub async fn prepare(&self, ctx: &SessionContext, input: &str) -> Result<Command> {
        let resolved = ctx.conversation.lock().await.resolve_references(input);
        if resolved.referent.is_some() {
            debug!(input, resolved = %resolved.text, "resolved reference");
        }
        let command = self.interpreter.parse(&resolved.text)?;
        Ok(pin_command(command, resolved.referent.as_ref()))
    }

    /// Handle one line of user input
    pub async fn handle(&self, ctx: &SessionContext, input: &str) -> ChatResponse {
        ctx.touch();
        ctx.auth.write().await.refresh(Utc::now());

        let outcome = match self.prepare(ctx, input).await {
            Ok(command) => {
                debug!(session = ctx.id(), command = command.description(), "executing");
                self.execute(ctx, command).await
            }
            Err(e) => Err(e),
        };

        let outcome = outcome.unwrap_or_else(|e| {
            debug!(session = ctx.id(), error = %e, "command failed");
            Outcome::new(ChatResponse::error(&e))
        });
        ctx.conversation
            .lock()
            .await
            .add_turn(input, &outcome.response.content, &outcome.instruments);
        outcome.response
    }

    /// Run a parsed command
    async fn execute(&self, ctx: &SessionContext, command: Command) -> Result<Outcome> {
        match command {
            Command::Lookup(query) => {
                let instrument = self.resolve(&query).await?;
                let access = self.access(ctx).await;
                let quote = brokerage::quote(self.client.as_ref(), &instrument, &access).await?;
                let content = self.formatter.format_quote(&quote);
                Ok(Outcome::new(ChatResponse::financial(
                    content,
                    self.delay_minutes(quote.delayed),
                ))
                .about([instrument]))
            }
            Command::Analyze(query) => {
                let instrument = self.resolve(&query).await?;
                let access = self.access(ctx).await;
                let report = self.analyze(&instrument, &access).await?;
                let content = self.formatter.format_analysis(&report);
                Ok(Outcome::new(ChatResponse::financial(
                    content,
                    self.delay_minutes(report.quote.delayed),
                ))
                .about([instrument]))
            }
            Command::History { query, days } => {
                let instrument = self.resolve(&query).await?;
                let access = self.access(ctx).await;
                let days = days.unwrap_or(self.config.history_days);
                let series = self.history(&instrument, days, &access).await?;
                let content = self.formatter.format_series(&series);
                Ok(Outcome::new(ChatResponse::financial(content, None)).about([instrument]))
            }
            Command::Compare { first, second } => {
                let (a, b) = futures::try_join!(self.resolve(&first), self.resolve(&second))?;
                if a.key == b.key {
                    return Err(StockError::AmbiguousQuery(format!(
                        "both sides of the comparison are {}",
                        a.label()
                    )));
                }
                let access = self.access(ctx).await;
                let (first, second) =
                    futures::try_join!(self.analyze(&a, &access), self.analyze(&b, &access))?;
                let delayed = first.quote.delayed || second.quote.delayed;
                let content = self
                    .formatter
                    .format_comparison(&Comparison { first, second });
                Ok(
                    Outcome::new(ChatResponse::financial(content, self.delay_minutes(delayed)))
                        .about([a, b]),
                )
            }
            Command::TopPerformers { count } => {
                let count = count.unwrap_or(self.config.top_performers_default);
                let access = self.access(ctx).await;
                let master = self.master.read().await;
                let top = aggregate::top_performers(
                    self.client.as_ref(),
                    &master,
                    &self.sectors,
                    count,
                    self.config.defaults,
                    &access,
                )
                .await?;
                let delayed = top.iter().any(|q| q.delayed);
                let content = self.formatter.format_performers(&top);
                Ok(Outcome::new(ChatResponse::financial(
                    content,
                    self.delay_minutes(delayed),
                )))
            }
            Command::MarketOverview => {
                let access = self.access(ctx).await;
                let master = self.master.read().await;
                let overview = aggregate::market_overview(
                    self.client.as_ref(),
                    &master,
                    &self.sectors,
                    &self.indices,
                    self.config.defaults,
                    &access,
                )
                .await?;
                let content = self.formatter.format_overview(&overview);
                Ok(Outcome::new(ChatResponse::financial(
                    content,
                    self.delay_minutes(overview.delayed),
                )))
            }
            Command::Sector { name } => {
                let access = self.access(ctx).await;
                let master = self.master.read().await;
                let listing = aggregate::sector_listing(
                    self.client.as_ref(),
                    &master,
                    &self.sectors,
                    &name,
                    self.config.defaults,
                    &access,
                )
                .await?;
                let content = self.formatter.format_sector(&listing);
                Ok(Outcome::new(ChatResponse::financial(
                    content,
                    self.delay_minutes(listing.delayed()),
                )))
            }
            Command::Watch(query) => {
                let instrument = self.resolve(&query).await?;
                let access = self.access(ctx).await;
                let quote = brokerage::quote(self.client.as_ref(), &instrument, &access).await?;
                let content = format!(
                    "{}\n\nStreaming {} every {}s; press Enter to stop.",
                    self.formatter.format_quote(&quote),
                    instrument.symbol,
                    self.config.watch_interval.as_secs().max(1)
                );
                Ok(Outcome::new(ChatResponse::financial(
                    content,
                    self.delay_minutes(quote.delayed),
                ))
                .about([instrument]))
            }
            Command::Authenticate => {
                let ticket = self.authenticator.begin_login(&ctx.auth).await?;
                let content = self
                    .formatter
                    .format_login(ticket.url.as_str(), self.config.auth_timeout.as_secs());
                Ok(Outcome::new(ChatResponse::text(content).with_action(
                    ChatAction::Authenticate {
                        url: Some(ticket.url.to_string()),
                    },
                )))
            }
            Command::CompleteLogin { code } => {
                Ok(Outcome::new(self.complete_login(ctx, &code, None).await))
            }
            Command::Logout => {
                let had_token = ctx.auth.write().await.logout();
                let content = if had_token {
                    format!(
                        "Logged out. Quotes are delayed by {} minutes again.",
                        self.config.data_delay_minutes()
                    )
                } else {
                    "You were not logged in.".to_string()
                };
                Ok(Outcome::new(ChatResponse::text(content)))
            }
            Command::RefreshData => {
                let count = self.refresh_instruments().await?;
                Ok(Outcome::new(ChatResponse::text(format!(
                    "Instrument data refreshed: {count} instruments loaded."
                ))))
            }
            Command::Status => {
                let status = self.status(ctx).await;
                Ok(Outcome::new(ChatResponse::text(
                    self.formatter.format_status(&status),
                )))
            }
            Command::Help => Ok(Outcome::new(ChatResponse::text(self.formatter.format_help()))),
            Command::Exit => Ok(Outcome::new(ChatResponse::text("Goodbye!"))),
        }
    }

    async fn history(
        &self,
        instrument: &Instrument,
        days: u32,
        access: &DataAccess,
    ) -> Result<HistoricalSeries> {
        let today = Self::today();
        let from = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(today);
        let bars = self
            .client
            .daily_bars(instrument, from, today, access)
            .await?;
        HistoricalSeries::assemble(instrument.clone(), bars, today)
    }

    /// Quote, indicators over the lookback window and an optional insight
    pub async fn analyze(&self, instrument: &Instrument, access: &DataAccess) -> Result<AnalysisReport> {
        let (quote, series) = futures::try_join!(
            brokerage::quote(self.client.as_ref(), instrument, access),
            self.history(instrument, self.config.analysis_lookback_days, access)
        )?;
        let indicators = analysis::snapshot(&series)?;
        let summary = series
            .tail(self.config.history_days as usize)
            .summary();

        let mut report = AnalysisReport {
            quote,
            summary,
            indicators,
            insight: None,
            insight_note: None,
        };

        if let Some(provider) = &self.insights {
            let request = InsightRequest {
                quote: report.quote.clone(),
                summary: report.summary,
                indicators: report.indicators.clone(),
                delay_minutes: self.delay_minutes(report.quote.delayed).unwrap_or(0),
            };
            match provider.insight(&request).await {
                Ok(text) => report.insight = Some(text),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "insight unavailable");
                    report.insight_note = Some(e.user_message());
                }
            }
        }
        Ok(report)
    }

    /// Finish a pending login with an authorization code
    ///
    /// `state` comes from the redirect; `None` when the code was typed in.
    pub async fn complete_login(
        &self,
        ctx: &SessionContext,
        code: &str,
        state: Option<&str>,
    ) -> ChatResponse {
        ctx.touch();
        match self.authenticator.complete_login(&ctx.auth, code, state).await {
            Ok(token) => {
                let who = token
                    .user_name
                    .as_deref()
                    .map(|u| format!(" as {u}"))
                    .unwrap_or_default();
                let until = format_ist(token.expires_at.with_timezone(&ist()));
                ChatResponse::text(format!(
                    "Logged in{who}. Quotes are now live until {until}."
                ))
            }
            Err(e) => ChatResponse::error(&e),
        }
    }

    /// Start streaming quotes for an instrument
    pub async fn watch(&self, ctx: &SessionContext, query: &InstrumentQuery) -> Result<Subscription> {
        ctx.touch();
        let instrument = self.resolve(query).await?;
        let access = self.access(ctx).await;
        Ok(self.feed.subscribe(instrument, access))
    }

    pub async fn status(&self, ctx: &SessionContext) -> SessionStatus {
        let now = Utc::now();
        let (auth, user_name, token_expires_at) = {
            let mut session = ctx.auth.write().await;
            session.refresh(now);
            let state = session.state();
            match state {
                AuthState::Authenticated { token } => (
                    state.label(),
                    token.user_name.clone(),
                    Some(token.expires_at),
                ),
                AuthState::Expired { user_name } => {
                    (state.label(), user_name.clone(), None)
                }
                _ => (state.label(), None, None),
            }
        };
        let master = self.master.read().await;
        SessionStatus {
            session_id: ctx.id().to_string(),
            auth,
            user_name,
            token_expires_at,
            instruments: master.len(),
            instruments_loaded_at: master.loaded_at(),
            defaults: self.config.defaults,
            data_delay_minutes: self.config.data_delay_minutes(),
            insights: self.insights.is_some(),
            broker: self.client.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokerage::{AccessToken, MockBrokerageClient};
    use crate::insights::MockInsightProvider;
    use crate::market::time::now_ist;
    use crate::market::{Bar, Exchange, InstrumentType, MarketDepth, Quote};
    use crate::presentation::{DISCLAIMER, ResponseKind};
    use chrono::TimeDelta;
    use std::collections::BTreeMap;
    use url::Url;

    fn eq(symbol: &str, exchange: Exchange) -> Instrument {
        let segment = match exchange {
            Exchange::Nse => "NSE_EQ",
            Exchange::Bse => "BSE_EQ",
        };
        Instrument::new(format!("{segment}|{symbol}"), symbol, exchange, InstrumentType::Equity)
    }

    fn master() -> InstrumentMaster {
        InstrumentMaster::new(
            vec![
                eq("RELIANCE", Exchange::Nse),
                eq("RELIANCE", Exchange::Bse),
                eq("TCS", Exchange::Nse),
                eq("INFY", Exchange::Nse),
            ],
            Utc::now(),
        )
    }

    fn sectors() -> SectorTable {
        let mut table = BTreeMap::new();
        table.insert("IT".to_string(), vec!["TCS".to_string(), "INFY".to_string()]);
        SectorTable::new(table)
    }

    fn quote_for(instrument: &Instrument, access: &DataAccess) -> Quote {
        let last = match instrument.symbol.as_str() {
            "TCS" => 3900.0,
            "INFY" => 1500.0,
            _ => 2900.0,
        };
        Quote {
            instrument: instrument.clone(),
            last_price: last,
            volume: 1_000,
            ohlc: None,
            previous_close: Some(last - 10.0),
            depth: MarketDepth::default(),
            timestamp: now_ist(),
            delayed: access.is_delayed(),
        }
    }

    fn client() -> MockBrokerageClient {
        let mut client = MockBrokerageClient::new();
        client.expect_quotes().returning(|instruments, access| {
            Ok(instruments.iter().map(|i| quote_for(i, access)).collect())
        });
        client.expect_daily_bars().returning(|_, from, to, _| {
            Ok(from
                .iter_days()
                .take_while(|d| *d <= to)
                .enumerate()
                .map(|(i, date)| {
                    let close = 100.0 + (i % 7) as f64;
                    Bar {
                        date,
                        open: close - 0.5,
                        high: close + 1.0,
                        low: close - 1.0,
                        close,
                        volume: 500,
                        open_interest: None,
                    }
                })
                .collect())
        });
        client.expect_authorization_url().returning(|state| {
            Ok(Url::parse(&format!("https://login.example/dialog?state={state}")).unwrap())
        });
        client.expect_exchange_code().returning(|_| {
            let now = Utc::now();
            Ok(AccessToken::new("tok", Some("trader".into()), now, now + TimeDelta::hours(8)))
        });
        client.expect_name().return_const("Mock");
        client
    }

    fn assistant(client: MockBrokerageClient) -> StockAssistant {
        StockAssistant::new(AssistantConfig::default(), Arc::new(client))
            .unwrap()
            .with_instruments(master())
            .with_sectors(sectors())
    }

    fn session() -> SessionContext {
        SessionContext::from_config("test", &AssistantConfig::default())
    }

    #[tokio::test]
    async fn test_unauthenticated_lookup_is_delayed_with_disclaimer() {
        let assistant = assistant(client());
        let ctx = session();

        let response = assistant.handle(&ctx, "RELIANCE").await;
        assert_eq!(response.kind, ResponseKind::Financial);
        assert!(response.content.starts_with("RELIANCE (NSE EQ)"));
        assert!(response.content.contains("(delayed)"));
        assert!(response.content.contains("delayed by 15 minutes"));
        assert!(response.content.ends_with(DISCLAIMER));
    }

    #[tokio::test]
    async fn test_exchange_suffix_selects_listing() {
        let assistant = assistant(client());
        let response = assistant.handle(&session(), "reliance bse").await;
        assert!(response.content.starts_with("RELIANCE (BSE EQ)"));
    }

    #[tokio::test]
    async fn test_sector_listing_has_prices_and_disclaimer() {
        let assistant = assistant(client());
        let response = assistant.handle(&session(), "sector IT").await;

        assert_eq!(response.kind, ResponseKind::Financial);
        assert!(response.content.contains("TCS"));
        assert!(response.content.contains("3900.00"));
        assert!(response.content.contains("INFY"));
        assert!(response.has_disclaimer());
    }

    #[tokio::test]
    async fn test_login_makes_quotes_live() {
        let assistant = assistant(client());
        let ctx = session();

        let response = assistant.handle(&ctx, "login").await;
        assert!(matches!(
            response.actions.as_slice(),
            [ChatAction::Authenticate { url: Some(url) }] if url.contains("state=")
        ));

        let again = assistant.handle(&ctx, "login").await;
        assert!(again.is_error());

        let done = assistant.handle(&ctx, "login the-code").await;
        assert!(done.content.contains("Logged in as trader"), "{}", done.content);

        let quote = assistant.handle(&ctx, "TCS").await;
        assert!(!quote.content.contains("(delayed)"));
        assert!(quote.has_disclaimer());

        let logout = assistant.handle(&ctx, "logout").await;
        assert!(logout.content.starts_with("Logged out"));
    }

    #[tokio::test]
    async fn test_failed_login_offers_authenticate_action() {
        let mut client = MockBrokerageClient::new();
        client
            .expect_authorization_url()
            .returning(|_| Ok(Url::parse("https://login.example/dialog").unwrap()));
        client
            .expect_exchange_code()
            .returning(|_| Err(StockError::AuthFailed("code rejected".into())));
        client.expect_name().return_const("Mock");
        let assistant = assistant(client);
        let ctx = session();

        assistant.handle(&ctx, "login").await;
        let response = assistant.handle(&ctx, "login bad-code").await;
        assert!(response.is_error());
        assert!(response.content.contains("code rejected"));
        assert_eq!(response.actions, vec![ChatAction::Authenticate { url: None }]);
    }

    #[tokio::test]
    async fn test_unknown_input_is_error() {
        let assistant = assistant(client());
        let response = assistant.handle(&session(), "what's up??").await;
        assert!(response.is_error());
        assert!(response.content.contains("help"));
    }

    #[tokio::test]
    async fn test_unknown_symbol_offers_refresh() {
        let assistant = assistant(client());
        let response = assistant.handle(&session(), "NOSUCHCO").await;
        assert!(response.is_error());
        assert!(response.actions.contains(&ChatAction::RefreshData));
    }

    #[tokio::test]
    async fn test_follow_up_keeps_exchange() {
        let assistant = assistant(client());
        let ctx = session();
        assistant.handle(&ctx, "RELIANCE BSE").await;

        let response = assistant.handle(&ctx, "history it 10").await;
        assert!(response.content.starts_with("RELIANCE (BSE EQ) daily history"), "{}", response.content);
    }

    #[tokio::test]
    async fn test_bare_symbol_uses_defaults_after_other_listing() {
        let assistant = assistant(client());
        let ctx = session();
        let bse = assistant.handle(&ctx, "RELIANCE BSE").await;
        assert!(bse.content.starts_with("RELIANCE (BSE EQ)"));

        let response = assistant.handle(&ctx, "RELIANCE").await;
        assert!(response.content.starts_with("RELIANCE (NSE EQ)"), "{}", response.content);
    }

    #[tokio::test]
    async fn test_sector_question_after_lookup() {
        let assistant = assistant(client());
        let ctx = session();
        assistant.handle(&ctx, "TCS").await;

        let response = assistant.handle(&ctx, "how is the it sector doing?").await;
        assert_eq!(response.kind, ResponseKind::Financial, "{}", response.content);
        assert!(response.content.starts_with("IT sector"));
    }

    #[tokio::test]
    async fn test_prepare_pins_only_references() {
        let assistant = assistant(client());
        let ctx = session();
        assistant.handle(&ctx, "RELIANCE BSE").await;

        let Command::Watch(query) = assistant.prepare(&ctx, "watch it").await.unwrap() else {
            panic!("expected a watch command");
        };
        assert_eq!(query.exchange, Some(Exchange::Bse));

        let Command::Watch(query) = assistant.prepare(&ctx, "watch RELIANCE").await.unwrap() else {
            panic!("expected a watch command");
        };
        assert_eq!(query.exchange, None);
    }

    #[tokio::test]
    async fn test_analysis_includes_insight() {
        let mut insights = MockInsightProvider::new();
        insights
            .expect_insight()
            .withf(|req| req.quote.instrument.symbol == "TCS" && req.delay_minutes == 15)
            .returning(|_| Ok("Range-bound around 3900.".to_string()));
        insights.expect_name().return_const("mock");

        let assistant = assistant(client()).with_insights(Arc::new(insights));
        let response = assistant.handle(&session(), "analyze TCS").await;

        assert_eq!(response.kind, ResponseKind::Financial);
        assert!(response.content.contains("Technical indicators"));
        assert!(response.content.contains("Range-bound around 3900."));
        assert!(response.has_disclaimer());
    }

    #[tokio::test]
    async fn test_insight_failure_degrades_to_note() {
        let mut insights = MockInsightProvider::new();
        insights
            .expect_insight()
            .returning(|_| Err(StockError::InsightError("model offline".into())));
        insights.expect_name().return_const("mock");

        let assistant = assistant(client()).with_insights(Arc::new(insights));
        let response = assistant.handle(&session(), "analyze TCS").await;
        assert_eq!(response.kind, ResponseKind::Financial);
        assert!(response.content.contains("AI insight unavailable"));
    }

    #[tokio::test]
    async fn test_compare_and_top_performers() {
        let assistant = assistant(client());
        let ctx = session();

        let response = assistant.handle(&ctx, "compare TCS INFY").await;
        assert!(response.content.starts_with("TCS vs INFY"), "{}", response.content);
        assert!(response.has_disclaimer());

        let response = assistant.handle(&ctx, "top 1").await;
        assert!(response.content.contains("Top 1 performers"));
        // INFY moves 10 on 1490, more than TCS's 10 on 3890
        assert!(response.content.contains("INFY"));
    }

    #[tokio::test]
    async fn test_status_and_help_are_plain_text() {
        let assistant = assistant(client());
        let ctx = session();
        let status = assistant.handle(&ctx, "status").await;
        assert_eq!(status.kind, ResponseKind::Text);
        assert!(status.content.contains("not logged in"));
        assert!(!status.has_disclaimer());

        let help = assistant.handle(&ctx, "help").await;
        assert!(help.content.contains("market_overview"));
    }

    #[test]
    fn test_pin_only_fills_bare_queries() {
        let current = InstrumentQuery::new("RELIANCE")
            .on(Exchange::Bse)
            .of_type(InstrumentType::Equity);
        let pinned = pin(InstrumentQuery::new("RELIANCE"), Some(&current));
        assert_eq!(pinned.exchange, Some(Exchange::Bse));

        let explicit = pin(InstrumentQuery::new("RELIANCE").on(Exchange::Nse), Some(&current));
        assert_eq!(explicit.exchange, Some(Exchange::Nse));

        let other = pin(InstrumentQuery::new("TCS"), Some(&current));
        assert_eq!(other.exchange, None);
    }
}
