//! Narrative "AI insight" requests to an external chat model

use crate::analysis::IndicatorSnapshot;
use crate::config::InsightConfig;
use crate::error::{Result, StockError};
use crate::market::{Quote, SeriesSummary};
use async_trait::async_trait;
use chat_llm::providers::{OpenAIConfig, OpenAIProvider};
use chat_llm::{CompletionRequest, LLMError, LLMProvider, Message};
use minijinja::Environment;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a market analyst covering Indian equities on NSE and BSE. \
Be concise and factual, quote the numbers you are given, and never give buy or sell advice.";

const INSIGHT_TEMPLATE: &str = r"Analyze the following data for {{ symbol }} ({{ name }}, {{ exchange }} {{ kind }}):

Current price: {{ price }}{% if change_percent is not none %} ({{ change_percent }}% vs previous close){% endif %}
{%- if delayed %}
Data is delayed by about {{ delay_minutes }} minutes.
{%- endif %}
{%- if summary %}

Last {{ summary.bars }} sessions ({{ summary.from }} to {{ summary.to }}):
- Change: {{ summary.change_percent }}%
- High / low: {{ summary.high }} / {{ summary.low }}
- Average volume: {{ summary.average_volume }}
{%- endif %}
{%- if indicators %}

Indicators:
{%- for name, value in indicators %}
- {{ name }}: {{ value }}
{%- endfor %}
{%- endif %}

Provide:
1. Price trend analysis
2. Key support and resistance levels
3. Trading volume analysis
4. Short-term outlook";

/// What the insight model is told about an instrument
#[derive(Debug, Clone)]
pub struct InsightRequest {
    pub quote: Quote,
    pub summary: Option<SeriesSummary>,
    pub indicators: IndicatorSnapshot,
    pub delay_minutes: u64,
}

/// Source of narrative insights
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InsightProvider: Send + Sync {
    async fn insight(&self, request: &InsightRequest) -> Result<String>;

    fn name(&self) -> &'static str;
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render the user prompt for a request
pub fn render_prompt(request: &InsightRequest) -> Result<String> {
    let quote = &request.quote;
    let ind = &request.indicators;

    let mut indicators = serde_json::Map::new();
    let mut put = |name: &str, value: Option<f64>| {
        if let Some(v) = value {
            indicators.insert(name.to_string(), json!(round2(v)));
        }
    };
    put("RSI(14)", ind.rsi14);
    put("SMA(20)", ind.sma20);
    put("SMA(50)", ind.sma50);
    put("SMA(200)", ind.sma200);
    put("EMA(20)", ind.ema20);
    put("MACD", ind.macd.map(|m| m.macd));
    put("MACD signal", ind.macd.map(|m| m.signal));
    put("Bollinger upper", ind.bollinger.map(|b| b.upper));
    put("Bollinger lower", ind.bollinger.map(|b| b.lower));
    put("20-day support", ind.support);
    put("20-day resistance", ind.resistance);
    put("Annualised volatility %", ind.volatility);
    put("Max drawdown %", ind.max_drawdown);

    let summary = request.summary.as_ref().map(|s| {
        json!({
            "bars": s.bars,
            "from": s.from.to_string(),
            "to": s.to.to_string(),
            "change_percent": round2(s.change_percent),
            "high": round2(s.high),
            "low": round2(s.low),
            "average_volume": s.average_volume,
        })
    });

    let context = json!({
        "symbol": quote.instrument.symbol,
        "name": quote.instrument.name,
        "exchange": quote.instrument.exchange.as_str(),
        "kind": quote.instrument.instrument_type.as_str(),
        "price": round2(quote.last_price),
        "change_percent": quote.change_percent().map(round2),
        "delayed": quote.delayed,
        "delay_minutes": request.delay_minutes,
        "summary": summary,
        "indicators": if indicators.is_empty() { None } else { Some(indicators) },
    });

    let env = Environment::new();
    env.render_str(INSIGHT_TEMPLATE, context)
        .map_err(|e| StockError::InsightError(format!("prompt template failed: {e}")))
}

/// Insight provider backed by an OpenAI-compatible chat model
pub struct LlmInsightProvider {
    llm: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmInsightProvider {
    pub fn new(llm: Arc<dyn LLMProvider>, config: &InsightConfig) -> Self {
        Self {
            llm,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Build from config; `None` when insights are off or no key is set
    pub fn from_config(config: &InsightConfig) -> Result<Option<Self>> {
        let Some(key) = config.api_key.as_deref().filter(|_| config.enabled) else {
            return Ok(None);
        };
        let provider = OpenAIProvider::with_config(
            OpenAIConfig::new(key).with_api_base(config.api_base.clone()),
        )
        .map_err(|e| StockError::ConfigError(format!("insight provider: {e}")))?;
        Ok(Some(Self::new(Arc::new(provider), config)))
    }
}

fn describe(error: &LLMError) -> String {
    match error {
        LLMError::AuthenticationFailed => "the insight service rejected the API key".to_string(),
        LLMError::RateLimitExceeded(_) => "the insight service is rate limiting requests".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl InsightProvider for LlmInsightProvider {
    async fn insight(&self, request: &InsightRequest) -> Result<String> {
        let prompt = render_prompt(request)?;
        debug!(symbol = %request.quote.instrument.symbol, model = %self.model, "requesting insight");

        let completion = CompletionRequest::builder(self.model.clone())
            .system(SYSTEM_PROMPT)
            .add_message(Message::user(prompt))
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build();

        let response = self.llm.complete(completion).await.map_err(|e| {
            warn!(provider = self.llm.name(), error = %e, "insight request failed");
            StockError::InsightError(describe(&e))
        })?;

        let text = response.text().trim().to_string();
        if text.is_empty() {
            return Err(StockError::InsightError("the model returned no text".to_string()));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::time::now_ist;
    use crate::market::{Exchange, Instrument, InstrumentType, MarketDepth};
    use chat_llm::{CompletionResponse, Role, StopReason, TokenUsage};
    use mockall::mock;

    mock! {
        Llm {}

        #[async_trait]
        impl LLMProvider for Llm {
            async fn complete(&self, request: CompletionRequest) -> chat_llm::Result<CompletionResponse>;
            fn name(&self) -> &str;
        }
    }

    fn quote() -> Quote {
        Quote {
            instrument: Instrument::new("NSE_EQ|INE467B01029", "TCS", Exchange::Nse, InstrumentType::Equity)
                .with_name("TATA CONSULTANCY SERV LT"),
            last_price: 3912.456,
            volume: 1_000,
            ohlc: None,
            previous_close: Some(3900.0),
            depth: MarketDepth::default(),
            timestamp: now_ist(),
            delayed: true,
        }
    }

    fn request(delay_minutes: u64) -> InsightRequest {
        InsightRequest {
            quote: quote(),
            summary: None,
            indicators: IndicatorSnapshot {
                rsi14: Some(61.234),
                ..IndicatorSnapshot::default()
            },
            delay_minutes,
        }
    }

    #[test]
    fn test_prompt_mentions_instrument_and_indicators() {
        let prompt = render_prompt(&request(15)).unwrap();

        assert!(prompt.contains("TCS (TATA CONSULTANCY SERV LT, NSE EQ)"));
        assert!(prompt.contains("Current price: 3912.46"));
        assert!(prompt.contains("RSI(14): 61.23"));
        assert!(prompt.contains("delayed by about 15 minutes"));
        assert!(!prompt.contains("sessions"));
    }

    #[tokio::test]
    async fn test_llm_provider_sends_configured_model() {
        let mut llm = MockLlm::new();
        llm.expect_complete()
            .withf(|req| {
                req.model == "grok-beta"
                    && req.max_tokens == 1000
                    && req.system.as_deref() == Some(SYSTEM_PROMPT)
                    && req.messages.len() == 1
                    && req.messages[0].content.contains("TCS")
            })
            .returning(|_| {
                Ok(CompletionResponse {
                    message: Message {
                        role: Role::Assistant,
                        content: "  Steady uptrend.  ".to_string(),
                    },
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                })
            });

        let provider = LlmInsightProvider::new(Arc::new(llm), &InsightConfig::default());
        let text = provider.insight(&request(15)).await.unwrap();
        assert_eq!(text, "Steady uptrend.");
    }

    #[tokio::test]
    async fn test_llm_failure_becomes_insight_error() {
        let mut llm = MockLlm::new();
        llm.expect_complete()
            .returning(|_| Err(LLMError::AuthenticationFailed));
        llm.expect_name().return_const("mock".to_string());

        let provider = LlmInsightProvider::new(Arc::new(llm), &InsightConfig::default());
        let err = provider.insight(&request(0)).await.unwrap_err();
        assert!(matches!(err, StockError::InsightError(msg) if msg.contains("API key")));
    }

    #[test]
    fn test_no_provider_without_key() {
        assert!(LlmInsightProvider::from_config(&InsightConfig::default()).unwrap().is_none());
    }
}
