//! Brokerage login state for one conversation

pub mod authenticator;
pub mod callback;

use crate::brokerage::{AccessToken, DataAccess};
use crate::error::{Result, StockError};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

pub use authenticator::{Authenticator, LoginTicket};
pub use callback::{AuthCallback, CallbackServer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// Waiting for the redirect carrying `state`
    Pending {
        state: String,
        started_at: DateTime<Utc>,
    },
    Authenticated {
        token: AccessToken,
    },
    Expired {
        user_name: Option<String>,
    },
}

impl AuthState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "not logged in",
            Self::Pending { .. } => "login pending",
            Self::Authenticated { .. } => "logged in",
            Self::Expired { .. } => "session expired",
        }
    }
}

/// Login state machine; expiry and login timeouts are detected lazily
#[derive(Debug, Clone)]
pub struct AuthSession {
    state: AuthState,
    login_timeout: Duration,
}

impl AuthSession {
    pub fn new(login_timeout: Duration) -> Self {
        Self {
            state: AuthState::Unauthenticated,
            login_timeout,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn login_timeout(&self) -> Duration {
        self.login_timeout
    }

    fn pending_timed_out(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - started_at).to_std().is_ok_and(|age| age >= self.login_timeout)
    }

    /// Apply token expiry and login timeout as of `now`; true if the state changed
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        let next = match &self.state {
            AuthState::Authenticated { token } if token.is_expired(now) => AuthState::Expired {
                user_name: token.user_name.clone(),
            },
            AuthState::Pending { started_at, .. } if self.pending_timed_out(*started_at, now) => {
                AuthState::Unauthenticated
            }
            _ => return false,
        };
        debug!(from = self.state.label(), to = next.label(), "auth state refreshed");
        self.state = next;
        true
    }

    /// Enter `Pending` for a new login attempt
    pub fn begin(&mut self, csrf_state: String, now: DateTime<Utc>) -> Result<()> {
        self.refresh(now);
        match &self.state {
            AuthState::Pending { .. } => Err(StockError::SessionStateError(
                "a login is already in progress; finish it in the browser or wait for it to time out"
                    .to_string(),
            )),
            AuthState::Authenticated { token } => Err(StockError::SessionStateError(format!(
                "already logged in{}; use logout first",
                token
                    .user_name
                    .as_deref()
                    .map(|u| format!(" as {u}"))
                    .unwrap_or_default()
            ))),
            AuthState::Unauthenticated | AuthState::Expired { .. } => {
                self.state = AuthState::Pending {
                    state: csrf_state,
                    started_at: now,
                };
                Ok(())
            }
        }
    }

    /// Check a returned authorization against the pending login
    ///
    /// `state` is `None` when the user pasted the code by hand.
    pub fn check_pending(&mut self, state: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        let AuthState::Pending {
            state: expected,
            started_at,
        } = &self.state
        else {
            return Err(StockError::SessionStateError(
                "no login is in progress; type login to start one".to_string(),
            ));
        };
        if self.pending_timed_out(*started_at, now) {
            self.state = AuthState::Unauthenticated;
            return Err(StockError::AuthTimeout {
                seconds: self.login_timeout.as_secs(),
            });
        }
        if state.is_some_and(|s| s != expected) {
            return Err(StockError::AuthFailed(
                "the login callback did not match this session".to_string(),
            ));
        }
        Ok(())
    }

    pub fn complete(&mut self, token: AccessToken) {
        info!(user = ?token.user_name, expires_at = %token.expires_at, "login complete");
        self.state = AuthState::Authenticated { token };
    }

    pub fn fail(&mut self) {
        self.state = AuthState::Unauthenticated;
    }

    /// Drop any token; true if one was held
    pub fn logout(&mut self) -> bool {
        let had_token = matches!(self.state, AuthState::Authenticated { .. });
        self.state = AuthState::Unauthenticated;
        had_token
    }

    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        matches!(&self.state, AuthState::Authenticated { token } if !token.is_expired(now))
    }

    /// Live access with an unexpired token, delayed access otherwise
    pub fn access(&self, now: DateTime<Utc>, delay: Duration) -> DataAccess {
        match &self.state {
            AuthState::Authenticated { token } if !token.is_expired(now) => {
                DataAccess::Live(token.clone())
            }
            _ => DataAccess::Delayed { delay },
        }
    }
}
