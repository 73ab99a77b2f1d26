//! Conversational stock assistant for NSE and BSE
//!
//! Text commands and plain-English questions are interpreted into a
//! [`Command`], answered from the Upstox v2 API and rendered as chat text.
//! Without a login, quotes are served from public data with a fixed delay;
//! `login` starts the Upstox OAuth flow and switches the session to live data.
//!
//! # Example
//!
//! ```rust,ignore
//! use stock_chat::{AssistantConfig, SessionManager, StockAssistant};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AssistantConfig::from_env()?;
//!     let sessions = SessionManager::new(&config);
//!     let assistant = StockAssistant::from_config(config)?;
//!     assistant.init().await?;
//!
//!     let session = sessions.create().await;
//!     let response = assistant.handle(&session, "RELIANCE").await;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod assistant;
pub mod auth;
pub mod brokerage;
pub mod config;
pub mod error;
pub mod insights;
pub mod instruments;
pub mod interpreter;
pub mod market;
pub mod presentation;
pub mod session;
pub mod subscription;

pub use assistant::StockAssistant;
pub use auth::{AuthCallback, CallbackServer};
pub use brokerage::{BrokerageClient, DataAccess, UpstoxClient};
pub use config::AssistantConfig;
pub use error::{Result, StockError};
pub use interpreter::{Command, Interpreter};
pub use presentation::{ChatAction, ChatResponse, MarkdownFormatter, PlainTextFormatter};
pub use session::{SessionContext, SessionManager};
pub use subscription::Subscription;
