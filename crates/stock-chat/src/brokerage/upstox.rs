//! Upstox v2 REST client

use super::wire::{self, CandleData, Envelope, QuoteMap, RawInstrument, TokenResponse};
use super::{AccessToken, BrokerageClient, DataAccess};
use crate::config::UpstoxConfig;
use crate::error::{Result, StockError};
use crate::market::time::{ist, token_expiry};
use crate::market::{Bar, Instrument, Quote};
use async_trait::async_trait;
use chrono::{Days, NaiveDate, TimeDelta, Utc};
use flate2::read::GzDecoder;
use futures::future::join_all;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const PROVIDER: &str = "Upstox";

/// Upstox accepts at most this many keys per quote request
const MAX_KEYS_PER_QUOTE: usize = 500;

/// Daily candles fetched to find the previous close
const PREVIOUS_CLOSE_WINDOW_DAYS: u64 = 10;

/// Upstox client with rate limiting
pub struct UpstoxClient {
    client: Client,
    config: UpstoxConfig,
    rate_limiter: SharedRateLimiter,
}

impl UpstoxClient {
    /// Create a new Upstox client
    pub fn new(config: UpstoxConfig) -> Result<Self> {
        let rate = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            StockError::ConfigError("requests_per_second must be greater than 0".to_string())
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rate)));

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("stock-chat/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| StockError::ConfigError(format!("invalid Upstox API base: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| StockError::ConfigError("Upstox API base cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(request: RequestBuilder, access: &DataAccess) -> RequestBuilder {
        let request = request
            .header("Accept", "application/json")
            .header("Api-Version", "2.0");
        match access {
            DataAccess::Live(token) => request.bearer_auth(token.secret()),
            DataAccess::Delayed { .. } => request,
        }
    }

    async fn send(&self, request: RequestBuilder, subject: &str) -> Result<Response> {
        self.rate_limiter.until_ready().await;
        let response = request.send().await?;
        check_status(response, subject).await
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        url: Url,
        access: &DataAccess,
        subject: &str,
    ) -> Result<T> {
        debug!(%url, "Upstox request");
        let request = Self::authorized(self.client.get(url), access);
        let response = self.send(request, subject).await?;
        let envelope: Envelope<T> = response.json().await?;
        if envelope.status == "error" {
            return Err(StockError::ApiError {
                status: 200,
                message: envelope
                    .errors
                    .into_iter()
                    .find_map(|e| e.message)
                    .unwrap_or_else(|| "request failed".to_string()),
            });
        }
        envelope.data.ok_or_else(|| StockError::DataUnavailable {
            symbol: subject.to_string(),
            reason: "empty response".to_string(),
        })
    }

    async fn candles(&self, url: Url, access: &DataAccess, subject: &str) -> Result<Vec<wire::Candle>> {
        let data: CandleData = self.get_data(url, access, subject).await?;
        Ok(wire::candles(data))
    }

    async fn live_quotes(&self, instruments: &[Instrument], access: &DataAccess) -> Result<Vec<Quote>> {
        let by_key: HashMap<&str, &Instrument> =
            instruments.iter().map(|i| (i.key.as_str(), i)).collect();
        let mut quotes = Vec::with_capacity(instruments.len());

        for chunk in instruments.chunks(MAX_KEYS_PER_QUOTE) {
            let keys = chunk
                .iter()
                .map(|i| i.key.as_str())
                .collect::<Vec<_>>()
                .join(",");
            let mut url = self.endpoint(&["v2", "market-quote", "quotes"])?;
            url.query_pairs_mut().append_pair("instrument_key", &keys);

            let subject = chunk.first().map_or("quotes", |i| i.symbol.as_str());
            let map: QuoteMap = self.get_data(url, access, subject).await?;
            quotes.extend(map.into_values().filter_map(|full| {
                let instrument = by_key.get(full.instrument_token.as_str())?;
                Some(wire::live_quote(instrument, full))
            }));
        }
        Ok(quotes)
    }

    async fn delayed_quote(&self, instrument: &Instrument, access: &DataAccess) -> Result<Option<Quote>> {
        let DataAccess::Delayed { delay } = access else {
            return Ok(None);
        };
        let now = Utc::now();
        let delay = TimeDelta::from_std(*delay).unwrap_or(TimeDelta::zero());
        let cutoff = (now - delay).with_timezone(&ist());
        let today = now.with_timezone(&ist()).date_naive();
        let from = today
            .checked_sub_days(Days::new(PREVIOUS_CLOSE_WINDOW_DAYS))
            .unwrap_or(today);

        let key = instrument.key.as_str();
        let intraday_url = self.endpoint(&["v2", "historical-candle", "intraday", key, "1minute"])?;
        let daily_url = self.endpoint(&[
            "v2",
            "historical-candle",
            key,
            "day",
            &today.to_string(),
            &from.to_string(),
        ])?;

        let (intraday, daily) = futures::join!(
            self.candles(intraday_url, access, &instrument.symbol),
            self.candles(daily_url, access, &instrument.symbol)
        );
        // outside market hours the intraday endpoint is often empty or missing
        let intraday = intraday.unwrap_or_else(|e| {
            debug!(symbol = %instrument.symbol, error = %e, "no intraday candles");
            Vec::new()
        });
        let daily = daily?;

        Ok(wire::delayed_quote(instrument, &intraday, &daily, cutoff))
    }
}

/// Map HTTP failures to errors the user can act on
async fn check_status(response: Response, subject: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = wire::error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string()
    });

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StockError::AuthFailed(message),
        StatusCode::TOO_MANY_REQUESTS => StockError::RateLimitExceeded {
            provider: PROVIDER.to_string(),
        },
        StatusCode::NOT_FOUND => StockError::DataUnavailable {
            symbol: subject.to_string(),
            reason: "unknown instrument".to_string(),
        },
        _ => StockError::ApiError {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl BrokerageClient for UpstoxClient {
    fn authorization_url(&self, state: &str) -> Result<Url> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or_else(|| StockError::AuthFailed("UPSTOX_CLIENT_ID is not set".to_string()))?;
        let mut url = self.endpoint(&["v2", "login", "authorization", "dialog"])?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("state", state);
        Ok(url)
    }

    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<AccessToken> {
        let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        else {
            return Err(StockError::AuthFailed(
                "UPSTOX_CLIENT_ID and UPSTOX_CLIENT_SECRET must be set to log in".to_string(),
            ));
        };

        let url = self.endpoint(&["v2", "login", "authorization", "token"])?;
        let form = [
            ("code", code),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let request = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .header("Api-Version", "2.0")
            .form(&form);

        let response = match self.send(request, "login").await {
            Err(StockError::ApiError { status: 400, message }) => {
                return Err(StockError::AuthFailed(message));
            }
            other => other?,
        };
        // the token endpoint answers without the usual envelope
        let token: TokenResponse = response.json().await?;

        let issued_at = Utc::now();
        info!(user = ?token.user_name, "Upstox login completed");
        Ok(AccessToken::new(
            token.access_token,
            token.user_name,
            issued_at,
            token_expiry(issued_at),
        ))
    }

    #[instrument(skip(self, instruments, access), fields(count = instruments.len(), delayed = access.is_delayed()))]
    async fn quotes(&self, instruments: &[Instrument], access: &DataAccess) -> Result<Vec<Quote>> {
        if instruments.is_empty() {
            return Ok(Vec::new());
        }
        if !access.is_delayed() {
            return self.live_quotes(instruments, access).await;
        }

        let results = join_all(instruments.iter().map(|i| self.delayed_quote(i, access))).await;
        let mut quotes = Vec::with_capacity(instruments.len());
        let mut last_error = None;
        for (instrument, result) in instruments.iter().zip(results) {
            match result {
                Ok(Some(quote)) => quotes.push(quote),
                Ok(None) => debug!(symbol = %instrument.symbol, "no delayed data"),
                Err(e) => {
                    warn!(symbol = %instrument.symbol, error = %e, "delayed quote failed");
                    last_error = Some(e);
                }
            }
        }
        // a batch where every request failed reports the failure
        match last_error {
            Some(e) if quotes.is_empty() => Err(e),
            _ => Ok(quotes),
        }
    }

    #[instrument(skip(self, instrument, access), fields(symbol = %instrument.symbol))]
    async fn daily_bars(
        &self,
        instrument: &Instrument,
        from: NaiveDate,
        to: NaiveDate,
        access: &DataAccess,
    ) -> Result<Vec<Bar>> {
        let url = self.endpoint(&[
            "v2",
            "historical-candle",
            instrument.key.as_str(),
            "day",
            &to.to_string(),
            &from.to_string(),
        ])?;
        let candles = self.candles(url, access, &instrument.symbol).await?;
        Ok(wire::bars_from_candles(&candles))
    }

    #[instrument(skip(self))]
    async fn instrument_master(&self) -> Result<Vec<Instrument>> {
        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .get(&self.config.instruments_url)
            .send()
            .await?;
        let bytes = check_status(response, "instrument master")
            .await?
            .bytes()
            .await?;
        info!(compressed_bytes = bytes.len(), "downloaded instrument master");

        let instruments = tokio::task::spawn_blocking(move || -> Result<Vec<Instrument>> {
            let rows: Vec<RawInstrument> = serde_json::from_reader(GzDecoder::new(bytes.as_ref()))?;
            Ok(rows.into_iter().filter_map(wire::instrument_from_raw).collect())
        })
        .await
        .map_err(|e| StockError::Other(format!("instrument master decoding panicked: {e}")))??;

        info!(instruments = instruments.len(), "parsed instrument master");
        Ok(instruments)
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Exchange, InstrumentType};
    use std::time::Duration;

    fn client() -> UpstoxClient {
        UpstoxClient::new(UpstoxConfig {
            client_id: Some("my-app".to_string()),
            client_secret: Some("shh".to_string()),
            ..UpstoxConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_authorization_url() {
        let url = client().authorization_url("csrf-123").unwrap();
        assert_eq!(url.path(), "/v2/login/authorization/dialog");
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "my-app");
        assert_eq!(params["redirect_uri"], "http://localhost:5000/callback");
        assert_eq!(params["state"], "csrf-123");
    }

    #[test]
    fn test_authorization_url_requires_client_id() {
        let client = UpstoxClient::new(UpstoxConfig::default()).unwrap();
        assert!(matches!(
            client.authorization_url("s"),
            Err(StockError::AuthFailed(_))
        ));
    }

    #[test]
    fn test_endpoint_keeps_instrument_key_in_one_segment() {
        let url = client()
            .endpoint(&["v2", "historical-candle", "NSE_INDEX|Nifty 50", "day", "2024-05-02", "2024-04-01"])
            .unwrap();
        assert_eq!(url.path_segments().unwrap().count(), 6);
        assert!(url.as_str().contains("Nifty%2050"));
    }

    #[tokio::test]
    async fn test_empty_quote_batch_makes_no_request() {
        let quotes = client()
            .quotes(&[], &DataAccess::Delayed { delay: Duration::from_secs(900) })
            .await
            .unwrap();
        assert!(quotes.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires network access to api.upstox.com"]
    async fn test_delayed_quote_live_endpoint() {
        let instrument =
            Instrument::new("NSE_EQ|INE002A01018", "RELIANCE", Exchange::Nse, InstrumentType::Equity);
        let quote = super::super::quote(
            &client(),
            &instrument,
            &DataAccess::Delayed { delay: Duration::from_secs(900) },
        )
        .await
        .unwrap();
        assert!(quote.delayed);
        assert!(quote.last_price > 0.0);
    }

    #[tokio::test]
    #[ignore = "downloads the full instrument master"]
    async fn test_instrument_master_download() {
        let instruments = client().instrument_master().await.unwrap();
        assert!(instruments.iter().any(|i| i.symbol == "RELIANCE"));
    }
}
