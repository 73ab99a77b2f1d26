//! Local listener for the login redirect

use crate::error::{Result, StockError};
use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;

const SUCCESS_PAGE: &str = r#"<html>
  <body style="font-family: sans-serif; text-align: center; padding: 50px;">
    <h2>Login received</h2>
    <p>You can close this window and return to the chat.</p>
  </body>
</html>"#;

const FAILURE_PAGE: &str = r#"<html>
  <body style="font-family: sans-serif; text-align: center; padding: 50px;">
    <h2>Login failed</h2>
    <p>No authorization code was received. Try <code>login</code> again in the chat.</p>
  </body>
</html>"#;

/// Authorization returned by the brokerage redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCallback {
    pub code: String,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(
    State(sender): State<mpsc::Sender<AuthCallback>>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        warn!(error = ?params.error, "login redirect without a code");
        return Html(FAILURE_PAGE);
    };
    if sender
        .send(AuthCallback {
            code,
            state: params.state,
        })
        .await
        .is_err()
    {
        error!("login callback arrived after the chat stopped listening");
        return Html(FAILURE_PAGE);
    }
    Html(SUCCESS_PAGE)
}

pub fn router(path: &str, sender: mpsc::Sender<AuthCallback>) -> Router {
    Router::new().route(path, get(callback)).with_state(sender)
}

/// Running callback listener; stops on `shutdown` or drop of the process
pub struct CallbackServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    /// Listen on localhost at the redirect URI's port and path
    pub async fn bind(redirect_uri: &Url, sender: mpsc::Sender<AuthCallback>) -> Result<Self> {
        let port = redirect_uri.port_or_known_default().ok_or_else(|| {
            StockError::ConfigError(format!("redirect URI {redirect_uri} has no port"))
        })?;
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        let app = router(redirect_uri.path(), sender);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                error!(error = %e, "callback server stopped");
            }
        });
        info!(%addr, path = redirect_uri.path(), "listening for login callbacks");

        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "callback server task failed");
        }
    }
}
