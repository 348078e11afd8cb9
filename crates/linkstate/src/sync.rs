//! The single writer.
//!
//! [`SyncLoop`] owns the [`Store`], reads the [`EventSource`], applies
//! every notification and hands loss conditions to the [`Reconciler`].
//! It is the only task that waits on the socket or on a backoff timer.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ReconnectConfig};
use crate::error::Result;
use crate::netlink::{self, CloseHandle, Connection, EventSource, SourceEvent};
use crate::reconcile::{
    DumpPlan, Dumper, ReconcileState, Reconciler, Trigger, exponential_backoff,
};
use crate::state::{SequenceCheck, Store, StoreReader};

/// What the loop should do after one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Events were lost; a resync is pending.
    Loss,
    Stop,
}

/// Event application and resync scheduling, independent of the socket.
pub struct SyncLoop<D> {
    store: Store,
    reconciler: Reconciler,
    dumper: D,
    retry_at: Option<Instant>,
}

impl<D: Dumper> SyncLoop<D> {
    pub fn new(config: &Config, store: Store, dumper: D) -> Self {
        let plan = DumpPlan {
            address_families: config.address_families(),
            route_families: config.route_families(),
        };
        Self {
            store,
            reconciler: Reconciler::new(config.reconcile.clone(), plan),
            dumper,
            retry_at: None,
        }
    }

    pub fn reader(&self) -> StoreReader {
        self.store.reader()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn dumper(&self) -> &D {
        &self.dumper
    }

    pub fn reconcile_state(&self) -> ReconcileState {
        self.reconciler.state()
    }

    /// When the next resync attempt is due, if one is scheduled.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Apply one source event.
    pub fn handle(&mut self, event: SourceEvent) -> Flow {
        match event {
            SourceEvent::Network {
                event,
                seq,
                port_id,
            } => {
                let check = self.store.observe_sequence(port_id, seq);
                if check == SequenceCheck::Redelivery {
                    debug!(port_id, seq, "redelivered message");
                }
                self.store.apply(&event);

                if let SequenceCheck::Gap { expected, actual } = check {
                    let error = netlink::Error::SequenceGap { expected, actual };
                    warn!(port_id, %error, "notifications lost");
                    self.lost(Trigger::Gap { expected, actual });
                    return Flow::Loss;
                }
                Flow::Continue
            }
            SourceEvent::Malformed(e) => {
                warn!(error = %e, "dropping malformed message");
                Flow::Continue
            }
            SourceEvent::Overrun => {
                warn!("kernel dropped notifications");
                self.lost(Trigger::Overrun);
                Flow::Loss
            }
            SourceEvent::Closed => Flow::Stop,
        }
    }

    /// Record a loss that did not come through the event stream.
    pub fn lost(&mut self, trigger: Trigger) {
        self.reconciler.trigger(trigger);
        // Degraded retries wait for the slow timer unless something new is lost.
        if self.reconciler.state() == ReconcileState::Degraded {
            self.retry_at = None;
        }
    }

    /// Run a resync if one is pending and its backoff has elapsed.
    ///
    /// Returns the delay before the next attempt when this one failed.
    pub async fn resync_if_due(&mut self) -> Option<Duration> {
        if !self.reconciler.needs_resync() {
            return None;
        }
        if self.retry_at.is_some_and(|at| Instant::now() < at) {
            return None;
        }

        let outcome = self
            .reconciler
            .resync(&mut self.store, &self.dumper)
            .await;
        let after = outcome.retry_after();
        self.retry_at = after.map(|d| Instant::now() + d);
        after
    }

    /// Drive `source` until `close` fires. Receive failures reconnect with
    /// backoff and trigger a resync.
    pub async fn run(
        mut self,
        mut source: EventSource,
        config: &Config,
        close: CloseHandle,
    ) -> Result<()> {
        loop {
            self.resync_if_due().await;

            let received = tokio::select! {
                biased;
                _ = close.closed() => break,
                _ = sleep_until(self.retry_at) => continue,
                r = source.next() => r,
            };

            match received {
                Ok(event) => {
                    if self.handle(event) == Flow::Stop {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "event source failed, reconnecting");
                    drop(source);
                    match reconnect(config, &close).await {
                        Ok(next) => source = next,
                        Err(e) => {
                            debug!(error = %e, "reconnect abandoned");
                            break;
                        }
                    }
                    self.lost(Trigger::Reconnect);
                }
            }
        }

        info!(generation = self.store.generation(), "sync loop stopped");
        Ok(())
    }
}

/// Connect to the kernel and run the writer until `close` fires.
///
/// Failure to open the first event socket or the dump socket is fatal.
pub async fn run(config: &Config, store: Store, close: CloseHandle) -> Result<()> {
    let source = connect(config, &close)?;
    let dumper = Connection::new()?;
    SyncLoop::new(config, store, dumper)
        .run(source, config, close)
        .await
}

fn connect(config: &Config, close: &CloseHandle) -> netlink::Result<EventSource> {
    EventSource::connect_with(&config.groups, config.recv_buffer_size, close.clone())
}

/// Retry [`connect`] with backoff. Fails only with [`netlink::Error::Closed`]
/// once `close` fires.
async fn reconnect(config: &Config, close: &CloseHandle) -> netlink::Result<EventSource> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let delay = reconnect_backoff(&config.reconnect, attempt);
        tokio::select! {
            biased;
            _ = close.closed() => return Err(netlink::Error::Closed),
            _ = tokio::time::sleep(delay) => {}
        }

        match connect(config, close) {
            Ok(source) => {
                info!(attempt, port_id = source.port_id(), "event source reconnected");
                return Ok(source);
            }
            Err(e) => error!(error = %e, attempt, "reconnect failed"),
        }
    }
}

/// Delay before reconnect `attempt`.
pub fn reconnect_backoff(policy: &ReconnectConfig, attempt: u32) -> Duration {
    exponential_backoff(policy.initial_backoff(), policy.max_backoff(), attempt)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
