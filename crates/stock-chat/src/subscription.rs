//! Streaming quote delivery for `watch`

use crate::brokerage::{BrokerageClient, DataAccess, quote};
use crate::error::Result;
use crate::market::{Instrument, Quote};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 16;

/// Stops delivery for one subscription; dropping it cancels too
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: watch::Sender<bool>,
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        // Receiver gone means the feed already stopped
        let _ = self.cancel.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A live stream of quotes for one instrument
#[derive(Debug)]
pub struct Subscription {
    instrument: Instrument,
    receiver: mpsc::Receiver<Result<Quote>>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn new(
        instrument: Instrument,
        receiver: mpsc::Receiver<Result<Quote>>,
        handle: SubscriptionHandle,
    ) -> Self {
        Self {
            instrument,
            receiver,
            handle,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Next update; `None` once the feed has stopped
    pub async fn next(&mut self) -> Option<Result<Quote>> {
        self.receiver.recv().await
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }
}

/// Source of quote subscriptions
pub trait QuoteFeed: Send + Sync {
    fn subscribe(&self, instrument: Instrument, access: DataAccess) -> Subscription;
}

/// Feed that polls the brokerage client on a fixed interval
pub struct PollingQuoteFeed {
    client: Arc<dyn BrokerageClient>,
    period: Duration,
}

impl PollingQuoteFeed {
    pub fn new(client: Arc<dyn BrokerageClient>, period: Duration) -> Self {
        Self { client, period }
    }

    async fn poll(
        client: Arc<dyn BrokerageClient>,
        instrument: Instrument,
        access: DataAccess,
        period: Duration,
        sender: mpsc::Sender<Result<Quote>>,
        mut cancel: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        debug!(symbol = %instrument.symbol, "subscription cancelled");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let update = quote(client.as_ref(), &instrument, &access).await;
                    let stop = match &update {
                        Ok(_) => false,
                        Err(e) => {
                            warn!(symbol = %instrument.symbol, error = %e, "quote poll failed");
                            e.requires_login()
                        }
                    };
                    if sender.send(update).await.is_err() || stop {
                        break;
                    }
                }
            }
        }
    }
}

impl QuoteFeed for PollingQuoteFeed {
    fn subscribe(&self, instrument: Instrument, access: DataAccess) -> Subscription {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        debug!(symbol = %instrument.symbol, period = ?self.period, "starting quote subscription");
        tokio::spawn(Self::poll(
            Arc::clone(&self.client),
            instrument.clone(),
            access,
            self.period,
            sender,
            cancel_rx,
        ));

        Subscription::new(instrument, receiver, SubscriptionHandle { cancel: cancel_tx })
    }
}
