//! The single task that owns the registry's event stream and feeds the
//! fan-out engine, reconnecting with bounded backoff when the backend
//! misbehaves.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::fanout::FanOutEngine;
use crate::registry::RegistryAdapter;
use crate::subscriptions::SubscriptionRegistry;

const BACKOFF_SECS: [u64; 3] = [1, 3, 10];
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

struct Backoff {
    step: usize,
}

impl Backoff {
    fn new() -> Self {
        Backoff { step: 0 }
    }

    fn reset(&mut self) {
        self.step = 0;
    }

    /// 1 s, 3 s, 10 s, then 10 s steady.
    fn next_delay(&mut self) -> Duration {
        let secs = BACKOFF_SECS[self.step];
        self.step = (self.step + 1).min(BACKOFF_SECS.len() - 1);
        Duration::from_secs(secs)
    }
}

pub struct ChangeWatcher {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ChangeWatcher {
    /// Spawn the watcher task. It runs until `shutdown` is called.
    pub fn spawn(
        adapter: Arc<dyn RegistryAdapter>,
        fanout: FanOutEngine,
        subscriptions: SubscriptionRegistry,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run(adapter, fanout, subscriptions, rx));
        ChangeWatcher { shutdown: tx, handle }
    }

    /// Stop the watcher: cancel the in-flight poll, detach every WebSocket
    /// so their loops exit, and join within a bounded deadline.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(SHUTDOWN_DEADLINE, self.handle).await.is_err() {
            warn!("change watcher did not stop within {:?}", SHUTDOWN_DEADLINE);
        }
    }
}

async fn run(
    adapter: Arc<dyn RegistryAdapter>,
    fanout: FanOutEngine,
    subscriptions: SubscriptionRegistry,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new();
    loop {
        let mut events = adapter.events();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("change watcher stopping");
                    subscriptions.detach_all();
                    return;
                }
                item = events.next() => match item {
                    Some(Ok(event)) => {
                        backoff.reset();
                        fanout.handle_event(&event);
                    }
                    Some(Err(err)) => {
                        warn!(%err, "registry event stream failed");
                        break;
                    }
                    None => {
                        warn!("registry event stream ended");
                        break;
                    }
                },
            }
        }
        let delay = backoff.next_delay();
        debug!(?delay, "change watcher backing off");
        tokio::select! {
            _ = shutdown.changed() => {
                subscriptions.detach_all();
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
