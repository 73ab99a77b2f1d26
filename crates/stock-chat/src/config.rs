//! Configuration for the stock assistant

use crate::error::{Result, StockError};
use crate::market::{Exchange, InstrumentDefaults, InstrumentType};
use chat_utils::{EnvError, env_parse, env_var};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Upstox connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstoxConfig {
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    /// Where Upstox redirects after login; the callback listener binds its port
    pub redirect_uri: String,
    pub api_base: String,
    pub instruments_url: String,
    pub request_timeout: Duration,
    /// Requests per second allowed towards Upstox
    pub requests_per_second: u32,
}

impl Default for UpstoxConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost:5000/callback".to_string(),
            api_base: "https://api.upstox.com".to_string(),
            instruments_url:
                "https://assets.upstox.com/market-quote/instruments/exchange/complete.json.gz"
                    .to_string(),
            request_timeout: Duration::from_secs(30),
            requests_per_second: 10,
        }
    }
}

/// Settings for the narrative insight model (xAI Grok by default)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub enabled: bool,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.x.ai/v1".to_string(),
            model: "grok-beta".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            enabled: true,
        }
    }
}

impl InsightConfig {
    /// Insights run only when enabled and a key is present
    pub fn is_active(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }
}

/// Configuration for the stock assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub upstox: UpstoxConfig,
    pub insights: InsightConfig,

    /// Exchange and type filled in when a query omits them
    pub defaults: InstrumentDefaults,

    /// Delay applied to quotes served without a session
    pub data_delay: Duration,

    /// How long a pending login waits for the callback
    pub auth_timeout: Duration,

    /// On-disk snapshot of the instrument master
    pub instrument_cache_path: PathBuf,
    pub instrument_cache_ttl: Duration,

    /// Days shown by `history` when none are given
    pub history_days: u32,

    /// Calendar days fetched for indicator calculation
    pub analysis_lookback_days: u32,

    /// Entries shown by `top_performers` when no count is given
    pub top_performers_default: usize,

    /// Conversation turns remembered per session
    pub max_history: usize,

    /// Idle sessions older than this are dropped
    pub session_ttl: Duration,

    /// Poll interval for `watch`
    pub watch_interval: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            upstox: UpstoxConfig::default(),
            insights: InsightConfig::default(),
            defaults: InstrumentDefaults::default(),
            data_delay: Duration::from_secs(15 * 60),
            auth_timeout: Duration::from_secs(120),
            instrument_cache_path: PathBuf::from("instrument_cache.json"),
            instrument_cache_ttl: Duration::from_secs(24 * 3600),
            history_days: 30,
            analysis_lookback_days: 300,
            top_performers_default: 5,
            max_history: 20,
            session_ttl: Duration::from_secs(3600),
            watch_interval: Duration::from_secs(5),
        }
    }
}

fn env_error(e: EnvError) -> StockError {
    StockError::ConfigError(e.to_string())
}

impl AssistantConfig {
    /// Create a new configuration builder
    pub fn builder() -> AssistantConfigBuilder {
        AssistantConfigBuilder::default()
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self::default().with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of `self`
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(id) = env_var("UPSTOX_CLIENT_ID") {
            self.upstox.client_id = Some(id);
        }
        if let Some(secret) = env_var("UPSTOX_CLIENT_SECRET") {
            self.upstox.client_secret = Some(secret);
        }
        if let Some(uri) = env_var("REDIRECT_URI") {
            self.upstox.redirect_uri = uri;
        }
        if let Some(base) = env_var("UPSTOX_API_BASE") {
            self.upstox.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(url) = env_var("UPSTOX_INSTRUMENTS_URL") {
            self.upstox.instruments_url = url;
        }
        if let Some(key) = env_var("XAI_API_KEY") {
            self.insights.api_key = Some(key);
        }
        if let Some(base) = env_var("XAI_API_BASE") {
            self.insights.api_base = base;
        }
        if let Some(model) = env_var("XAI_MODEL") {
            self.insights.model = model;
        }
        if let Some(exchange) = env_parse::<Exchange>("STOCK_DEFAULT_EXCHANGE").map_err(env_error)? {
            self.defaults.exchange = exchange;
        }
        if let Some(kind) =
            env_parse::<InstrumentType>("STOCK_DEFAULT_INSTRUMENT_TYPE").map_err(env_error)?
        {
            self.defaults.instrument_type = kind;
        }
        if let Some(minutes) = env_parse::<u64>("STOCK_DATA_DELAY_MINUTES").map_err(env_error)? {
            self.data_delay = Duration::from_secs(minutes * 60);
        }
        if let Some(path) = env_var("STOCK_INSTRUMENT_CACHE") {
            self.instrument_cache_path = PathBuf::from(path);
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let redirect = Url::parse(&self.upstox.redirect_uri).map_err(|e| {
            StockError::ConfigError(format!(
                "REDIRECT_URI '{}' is not a valid URL: {e}",
                self.upstox.redirect_uri
            ))
        })?;
        if redirect.port_or_known_default().is_none() {
            return Err(StockError::ConfigError(
                "REDIRECT_URI must include a port".to_string(),
            ));
        }

        Url::parse(&self.upstox.api_base).map_err(|e| {
            StockError::ConfigError(format!("UPSTOX_API_BASE is not a valid URL: {e}"))
        })?;

        if self.upstox.requests_per_second == 0 {
            return Err(StockError::ConfigError(
                "requests_per_second must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.insights.temperature) {
            return Err(StockError::ConfigError(
                "insight temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.top_performers_default == 0 || self.history_days == 0 {
            return Err(StockError::ConfigError(
                "top_performers_default and history_days must be greater than 0".to_string(),
            ));
        }

        if self.watch_interval.is_zero() {
            return Err(StockError::ConfigError(
                "watch_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Login needs both halves of the Upstox app credentials
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (&self.upstox.client_id, &self.upstox.client_secret) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(StockError::AuthFailed(
                "UPSTOX_CLIENT_ID and UPSTOX_CLIENT_SECRET must be set to log in".to_string(),
            )),
        }
    }

    pub fn data_delay_minutes(&self) -> u64 {
        self.data_delay.as_secs() / 60
    }
}

/// Builder for AssistantConfig
#[derive(Debug, Default)]
pub struct AssistantConfigBuilder {
    config: AssistantConfig,
}

impl AssistantConfigBuilder {
    pub fn client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.config.upstox.client_id = Some(client_id.into());
        self.config.upstox.client_secret = Some(client_secret.into());
        self
    }

    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.upstox.redirect_uri = uri.into();
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.upstox.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn instruments_url(mut self, url: impl Into<String>) -> Self {
        self.config.upstox.instruments_url = url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.upstox.request_timeout = timeout;
        self
    }

    pub fn requests_per_second(mut self, rate: u32) -> Self {
        self.config.upstox.requests_per_second = rate;
        self
    }

    pub fn insight_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.insights.api_key = Some(key.into());
        self
    }

    pub fn insight_model(mut self, model: impl Into<String>) -> Self {
        self.config.insights.model = model.into();
        self
    }

    /// Turn narrative insights off regardless of the key
    pub fn insights_enabled(mut self, enabled: bool) -> Self {
        self.config.insights.enabled = enabled;
        self
    }

    pub fn default_exchange(mut self, exchange: Exchange) -> Self {
        self.config.defaults.exchange = exchange;
        self
    }

    pub fn default_instrument_type(mut self, kind: InstrumentType) -> Self {
        self.config.defaults.instrument_type = kind;
        self
    }

    pub fn data_delay(mut self, delay: Duration) -> Self {
        self.config.data_delay = delay;
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout = timeout;
        self
    }

    pub fn instrument_cache(mut self, path: impl Into<PathBuf>, ttl: Duration) -> Self {
        self.config.instrument_cache_path = path.into();
        self.config.instrument_cache_ttl = ttl;
        self
    }

    pub fn history_days(mut self, days: u32) -> Self {
        self.config.history_days = days;
        self
    }

    pub fn top_performers_default(mut self, count: usize) -> Self {
        self.config.top_performers_default = count;
        self
    }

    pub fn max_history(mut self, turns: usize) -> Self {
        self.config.max_history = turns;
        self
    }

    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.config.watch_interval = interval;
        self
    }

    /// Apply environment overrides to the values set so far
    pub fn with_env(mut self) -> Result<Self> {
        self.config = self.config.with_env()?;
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<AssistantConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
