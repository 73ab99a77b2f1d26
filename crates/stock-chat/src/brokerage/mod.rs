//! Brokerage client abstraction and the Upstox implementation

pub mod aggregate;
pub mod upstox;
mod wire;

use crate::error::{Result, StockError};
use crate::market::{Bar, Instrument, Quote};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::time::Duration;
use url::Url;

pub use aggregate::{Breadth, MarketOverview, SectorEntry, SectorListing};
pub use upstox::UpstoxClient;

/// Bearer token issued by the login flow
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    pub user_name: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(
        token: impl Into<String>,
        user_name: Option<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            user_name,
            issued_at,
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("user_name", &self.user_name)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// How market data may be fetched for the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataAccess {
    /// Authenticated, undelayed data
    Live(AccessToken),
    /// Public data, at least `delay` old
    Delayed { delay: Duration },
}

impl DataAccess {
    pub fn is_delayed(&self) -> bool {
        matches!(self, Self::Delayed { .. })
    }
}

/// Operations the assistant needs from a brokerage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerageClient: Send + Sync {
    /// Login page the user must open; `state` is echoed back on the redirect
    fn authorization_url(&self, state: &str) -> Result<Url>;

    /// Trade an authorization code for an access token
    async fn exchange_code(&self, code: &str) -> Result<AccessToken>;

    /// Quotes for several instruments; instruments without data are left out
    async fn quotes(&self, instruments: &[Instrument], access: &DataAccess) -> Result<Vec<Quote>>;

    /// Daily bars between two dates, oldest first
    async fn daily_bars(
        &self,
        instrument: &Instrument,
        from: NaiveDate,
        to: NaiveDate,
        access: &DataAccess,
    ) -> Result<Vec<Bar>>;

    /// The full instrument master
    async fn instrument_master(&self) -> Result<Vec<Instrument>>;

    /// Name used in logs and error messages
    fn name(&self) -> &'static str;
}

/// Quote for a single instrument
pub async fn quote(
    client: &dyn BrokerageClient,
    instrument: &Instrument,
    access: &DataAccess,
) -> Result<Quote> {
    client
        .quotes(std::slice::from_ref(instrument), access)
        .await?
        .into_iter()
        .find(|q| q.instrument.key == instrument.key)
        .ok_or_else(|| StockError::DataUnavailable {
            symbol: instrument.symbol.clone(),
            reason: format!("{} returned no quote", client.name()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let now = Utc::now();
        let token = AccessToken::new("super-secret", Some("trader".into()), now, now);
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
        assert!(token.is_expired(now));
    }
}
