//! Stock chat CLI
//!
//! An interactive terminal chat over NSE/BSE market data.
//!
//! # Usage
//!
//! ```bash
//! # Optional: Upstox app credentials for live data, xAI key for insights
//! export UPSTOX_CLIENT_ID=...
//! export UPSTOX_CLIENT_SECRET=...
//! export XAI_API_KEY=...
//!
//! cargo run --bin stock-chat -p stock-chat
//! ```

use anyhow::Context;
use chat_utils::{LogFormat, init_tracing, load_env_file};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use stock_chat::{
    AssistantConfig, AuthCallback, CallbackServer, ChatAction, ChatResponse, Command,
    MarkdownFormatter, SessionContext, SessionManager, StockAssistant,
};
use stock_chat::market::InstrumentQuery;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::warn;
use url::Url;

type InputLines = Lines<BufReader<Stdin>>;

#[derive(Debug, Parser)]
#[command(name = "stock-chat", version, about = "Chat about NSE/BSE stocks")]
struct Args {
    /// Log output format: pretty or json
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    /// Read environment variables from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Skip AI insights even when an API key is configured
    #[arg(long)]
    no_insights: bool,

    /// Render responses as Markdown
    #[arg(long)]
    markdown: bool,
}

fn print_banner() {
    println!(
        r"
╔══════════════════════════════════════════════════════════════╗
║                      NSE / BSE Stock Chat                    ║
║                                                              ║
║  Try:  RELIANCE        analyze TCS        sector IT          ║
║        top 10          market_overview    compare A B        ║
║        login           status             help / exit        ║
╚══════════════════════════════════════════════════════════════╝
"
    );
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.content);
    if !response.actions.is_empty() {
        let actions: Vec<String> = response
            .actions
            .iter()
            .map(|a| format!("[{}] type `{}`", a.label(), a.command()))
            .collect();
        println!("\n{}", actions.join("   "));
    }
    for action in &response.actions {
        if let ChatAction::Authenticate { url: Some(url) } = action {
            println!("Login URL: {url}");
        }
    }
    println!();
}

/// Stream quotes until the user presses Enter
async fn run_watch(
    assistant: &StockAssistant,
    session: &SessionContext,
    query: &InstrumentQuery,
    lines: &mut InputLines,
) {
    let mut subscription = match assistant.watch(session, query).await {
        Ok(subscription) => subscription,
        Err(e) => {
            print_response(&ChatResponse::error(&e));
            return;
        }
    };
    println!(
        "Watching {} every {}s. Press Enter to stop.",
        subscription.instrument().label(),
        assistant.config().watch_interval.as_secs().max(1)
    );

    loop {
        tokio::select! {
            update = subscription.next() => match update {
                Some(Ok(quote)) => println!("{}", assistant.formatter().format_watch_update(&quote)),
                Some(Err(e)) => {
                    print_response(&ChatResponse::error(&e));
                    break;
                }
                None => break,
            },
            _ = lines.next_line() => break,
        }
    }
    subscription.cancel();
    println!("Stopped watching.\n");
}

/// Returns false when the chat should end
async fn handle_line(
    assistant: &StockAssistant,
    session: &SessionContext,
    line: &str,
    lines: &mut InputLines,
) -> bool {
    match assistant.prepare(session, line).await {
        Ok(Command::Exit) => {
            println!("Goodbye!");
            false
        }
        Ok(Command::Watch(query)) => {
            run_watch(assistant, session, &query, lines).await;
            true
        }
        _ => {
            print_response(&assistant.handle(session, line).await);
            true
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    load_env_file(args.env_file.as_deref())?;
    init_tracing("warn,stock_chat=info", args.log_format);

    let mut config = AssistantConfig::from_env().context("invalid configuration")?;
    if args.no_insights {
        config.insights.enabled = false;
    }
    let redirect = Url::parse(&config.upstox.redirect_uri).context("invalid REDIRECT_URI")?;
    let sessions = SessionManager::new(&config);

    let mut assistant = StockAssistant::from_config(config)?;
    if args.markdown {
        assistant = assistant.with_formatter(Box::new(MarkdownFormatter));
    }

    print_banner();
    println!("Loading instruments...");
    match assistant.init().await {
        Ok(count) => println!("{count} instruments ready."),
        Err(e) => {
            warn!(error = %e, "instrument master unavailable");
            println!("{}\nType `refresh` to retry.", e.user_message());
        }
    }
    if assistant.config().insights.is_active() {
        println!("AI insights: on");
    }
    println!(
        "Quotes are delayed by {} minutes until you `login`.\n",
        assistant.config().data_delay_minutes()
    );

    let (callback_tx, mut callback_rx) = mpsc::channel::<AuthCallback>(4);
    let server = match CallbackServer::bind(&redirect, callback_tx).await {
        Ok(server) => Some(server),
        Err(e) => {
            warn!(error = %e, "login callback listener unavailable; paste codes with `login CODE`");
            None
        }
    };

    let session = sessions.create().await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!("\nGoodbye!");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    prompt();
                    continue;
                }
                if !handle_line(&assistant, &session, line, &mut lines).await {
                    break;
                }
            }
            Some(callback) = callback_rx.recv() => {
                println!();
                let response = assistant
                    .complete_login(&session, &callback.code, callback.state.as_deref())
                    .await;
                print_response(&response);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nGoodbye!");
                break;
            }
        }
        prompt();
    }

    if let Some(server) = server {
        server.shutdown().await;
    }
    Ok(())
}
