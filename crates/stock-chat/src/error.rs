//! Error types for the stock assistant

use chrono::NaiveDate;
use thiserror::Error;

/// Stock assistant errors
#[derive(Debug, Error)]
pub enum StockError {
    /// The input line is not a command and not a valid instrument lookup
    #[error("Unrecognized command: {0}")]
    UnrecognizedCommand(String),

    /// The input names conflicting exchanges or instrument types, or matches
    /// several instruments
    #[error("Ambiguous query: {0}")]
    AmbiguousQuery(String),

    /// A command keyword was given without its required argument
    #[error("Missing {argument} for '{command}'")]
    MissingArgument { command: String, argument: String },

    /// No instrument matches the query
    #[error("Unknown instrument: {query}")]
    InstrumentNotFound {
        query: String,
        suggestions: Vec<String>,
    },

    /// Login was rejected or the token exchange failed
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The login callback did not arrive in time
    #[error("Authentication timed out after {seconds}s")]
    AuthTimeout { seconds: u64 },

    /// The requested transition is not valid in the current session state
    #[error("Invalid session state: {0}")]
    SessionStateError(String),

    /// Rate limit exceeded for API
    #[error("Rate limit exceeded for {provider}")]
    RateLimitExceeded { provider: String },

    /// Upstream API answered with an error status
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Data not available for the requested instrument
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// A bar for a closed trading day would change
    #[error("Bar for closed day {date} cannot be modified")]
    ClosedDayConflict { date: NaiveDate },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Filesystem error (instrument snapshot)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Technical indicator calculation error
    #[error("Technical indicator error: {0}")]
    IndicatorError(String),

    /// Insight generation error
    #[error("Insight error: {0}")]
    InsightError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl StockError {
    /// Whether the failure can be fixed by logging in again
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::AuthFailed(_) | Self::AuthTimeout { .. })
    }

    /// Message shown to the user in the chat
    pub fn user_message(&self) -> String {
        match self {
            Self::UnrecognizedCommand(input) => format!(
                "I didn't understand \"{input}\". Type `help` to see the available commands."
            ),
            Self::AmbiguousQuery(detail) => {
                format!("That query is ambiguous: {detail}. Please be more specific.")
            }
            Self::MissingArgument { command, argument } => {
                format!("`{command}` needs a {argument}. Type `help` for usage.")
            }
            Self::InstrumentNotFound { query, suggestions } if suggestions.is_empty() => {
                format!("I couldn't find an instrument matching \"{query}\".")
            }
            Self::InstrumentNotFound { query, suggestions } => format!(
                "I couldn't find an instrument matching \"{query}\". Did you mean: {}?",
                suggestions.join(", ")
            ),
            Self::AuthFailed(reason) => {
                format!("Login failed: {reason}. Use `login` to try again.")
            }
            Self::AuthTimeout { seconds } => format!(
                "Login timed out after {seconds} seconds. Use `login` to start again."
            ),
            Self::SessionStateError(reason) => reason.clone(),
            Self::RateLimitExceeded { provider } => format!(
                "{provider} is rate limiting requests right now. Please wait a moment and try again."
            ),
            Self::ApiError { status, message } => {
                format!("The market data service returned an error ({status}): {message}")
            }
            Self::DataUnavailable { symbol, reason } => {
                format!("No data is available for {symbol}: {reason}")
            }
            Self::NetworkError(_) => {
                "Couldn't reach the market data service. Check your connection and try again."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type for stock assistant operations
pub type Result<T> = std::result::Result<T, StockError>;
