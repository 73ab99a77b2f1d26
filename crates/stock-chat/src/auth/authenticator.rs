//! Login handshake against the brokerage

use super::AuthSession;
use crate::brokerage::{AccessToken, BrokerageClient};
use crate::error::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// What the user needs to finish a login
#[derive(Debug, Clone)]
pub struct LoginTicket {
    pub url: Url,
    pub state: String,
}

/// Drives `AuthSession` transitions through the brokerage client
#[derive(Clone)]
pub struct Authenticator {
    client: Arc<dyn BrokerageClient>,
}

impl Authenticator {
    pub fn new(client: Arc<dyn BrokerageClient>) -> Self {
        Self { client }
    }

    /// Start a login and return the page the user must open
    pub async fn begin_login(&self, session: &RwLock<AuthSession>) -> Result<LoginTicket> {
        let state = Uuid::new_v4().simple().to_string();
        let url = self.client.authorization_url(&state)?;

        session.write().await.begin(state.clone(), Utc::now())?;
        info!(broker = self.client.name(), "login started");
        Ok(LoginTicket { url, state })
    }

    /// Trade the returned authorization code for a token
    ///
    /// The write guard is held across the exchange so readers never see a
    /// half-finished login.
    pub async fn complete_login(
        &self,
        session: &RwLock<AuthSession>,
        code: &str,
        state: Option<&str>,
    ) -> Result<AccessToken> {
        let mut guard = session.write().await;
        guard.check_pending(state, Utc::now())?;

        match self.client.exchange_code(code).await {
            Ok(token) => {
                guard.complete(token.clone());
                Ok(token)
            }
            Err(e) => {
                warn!(broker = self.client.name(), error = %e, "code exchange failed");
                guard.fail();
                Err(e)
            }
        }
    }
}
