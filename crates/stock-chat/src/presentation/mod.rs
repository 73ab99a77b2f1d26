//! Chat responses and the affordances attached to them

pub mod formatter;

use crate::error::StockError;
use crate::market::InstrumentDefaults;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use formatter::{Formatter, MarkdownFormatter, PlainTextFormatter};

/// Appended to every response that carries market data
pub const DISCLAIMER: &str =
    "Disclaimer: this information is for informational purposes only and is not investment advice.";

pub fn delay_notice(minutes: u64) -> String {
    format!("Note: prices are delayed by {minutes} minutes. Log in for live data.")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseKind {
    Text,
    Financial,
    Error,
}

/// Control offered alongside a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChatAction {
    /// Start (or continue) the Upstox login
    Authenticate { url: Option<String> },
    /// Re-pull instrument metadata
    RefreshData,
}

impl ChatAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "Authenticate",
            Self::RefreshData => "Refresh Data",
        }
    }

    /// Text command that triggers the action
    pub fn command(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "login",
            Self::RefreshData => "refresh",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub content: String,
    pub kind: ResponseKind,
    pub actions: Vec<ChatAction>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: ResponseKind::Text,
            actions: Vec::new(),
        }
    }

    /// Market data response; `delay_minutes` is set when any figure is delayed
    pub fn financial(content: impl Into<String>, delay_minutes: Option<u64>) -> Self {
        let mut content = content.into();
        if let Some(minutes) = delay_minutes {
            content.push_str("\n\n");
            content.push_str(&delay_notice(minutes));
        }
        content.push_str("\n\n");
        content.push_str(DISCLAIMER);

        let mut response = Self {
            content,
            kind: ResponseKind::Financial,
            actions: vec![ChatAction::RefreshData],
        };
        if delay_minutes.is_some() {
            response.actions.insert(0, ChatAction::Authenticate { url: None });
        }
        response
    }

    pub fn error(error: &StockError) -> Self {
        let mut actions = Vec::new();
        if error.requires_login() {
            actions.push(ChatAction::Authenticate { url: None });
        }
        if matches!(error, StockError::InstrumentNotFound { .. }) {
            actions.push(ChatAction::RefreshData);
        }
        Self {
            content: error.user_message(),
            kind: ResponseKind::Error,
            actions,
        }
    }

    pub fn with_action(mut self, action: ChatAction) -> Self {
        self.actions.retain(|a| a.label() != action.label());
        self.actions.push(action);
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResponseKind::Error
    }

    pub fn has_disclaimer(&self) -> bool {
        self.content.ends_with(DISCLAIMER)
    }
}

/// What `status` reports
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub auth: &'static str,
    pub user_name: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub instruments: usize,
    pub instruments_loaded_at: Option<DateTime<Utc>>,
    pub defaults: InstrumentDefaults,
    pub data_delay_minutes: u64,
    pub insights: bool,
    pub broker: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_financial_response_ends_with_disclaimer() {
        let live = ChatResponse::financial("RELIANCE 2900.00", None);
        assert!(live.has_disclaimer());
        assert!(!live.content.contains("delayed"));
        assert_eq!(live.actions, vec![ChatAction::RefreshData]);

        let delayed = ChatResponse::financial("RELIANCE 2900.00", Some(15));
        assert!(delayed.has_disclaimer());
        assert!(delayed.content.contains("delayed by 15 minutes"));
        assert_eq!(delayed.actions[0].label(), "Authenticate");
    }

    #[test]
    fn test_error_response_offers_login_when_needed() {
        let response = ChatResponse::error(&StockError::AuthTimeout { seconds: 120 });
        assert!(response.is_error());
        assert_eq!(response.actions, vec![ChatAction::Authenticate { url: None }]);

        let response = ChatResponse::error(&StockError::UnrecognizedCommand("??".into()));
        assert!(response.actions.is_empty());
        assert!(!response.has_disclaimer());
    }

    #[test]
    fn test_with_action_replaces_same_kind() {
        let response = ChatResponse::financial("x", Some(15)).with_action(ChatAction::Authenticate {
            url: Some("https://login".into()),
        });
        let logins: Vec<_> = response
            .actions
            .iter()
            .filter(|a| a.command() == "login")
            .collect();
        assert_eq!(logins.len(), 1);
        assert_eq!(
            logins[0],
            &ChatAction::Authenticate {
                url: Some("https://login".into())
            }
        );
    }
}
