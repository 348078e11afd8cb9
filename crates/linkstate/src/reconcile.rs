//! Full-dump resynchronisation.
//!
//! When the event stream can no longer be trusted (startup, reconnect,
//! overrun, sequence gap) the [`Reconciler`] dumps every table and replaces
//! the store contents in one publication.
//!
//! ```text
//! Synced --(loss)--> Resyncing{0} --(dump ok)--> Synced
//!                    Resyncing{n} --(fail, n+1 < max)--> Resyncing{n+1}
//!                    Resyncing{n} --(fail, n+1 = max)--> Degraded (stale)
//! Degraded --(retry or loss, dump ok)--> Synced (stale cleared)
//! ```

use std::time::Duration;

use tracing::{info, warn};

use crate::config::ReconcileConfig;
use crate::netlink::messages::{AddressMessage, LinkMessage, RouteMessage};
use crate::netlink::{Connection, Error, Result, TableKind};
use crate::state::{Generation, Store};

/// Source of full-table dumps.
pub trait Dumper {
    fn dump_links(&self) -> impl Future<Output = Result<Vec<LinkMessage>>> + Send;

    fn dump_addresses(&self, family: u8)
    -> impl Future<Output = Result<Vec<AddressMessage>>> + Send;

    fn dump_routes(&self, family: u8) -> impl Future<Output = Result<Vec<RouteMessage>>> + Send;
}

impl Dumper for Connection {
    async fn dump_links(&self) -> Result<Vec<LinkMessage>> {
        self.get_links().await
    }

    async fn dump_addresses(&self, family: u8) -> Result<Vec<AddressMessage>> {
        self.get_addresses(family).await
    }

    async fn dump_routes(&self, family: u8) -> Result<Vec<RouteMessage>> {
        self.get_routes(family).await
    }
}

/// Why a resync was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Reconnect,
    Overrun,
    Gap { expected: u32, actual: u32 },
}

/// `initial * 2^(attempt-1)`, capped at `max`. Attempt 0 counts as 1.
pub fn exponential_backoff(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    initial.saturating_mul(1u32 << exp).min(max)
}

/// Reconciler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// Store matches the kernel as far as the event stream can tell.
    Synced,
    /// A resync is pending; `attempt` dumps have failed so far.
    Resyncing { attempt: u32 },
    /// Too many dumps failed. The store is marked stale.
    Degraded,
}

/// Result of one [`Reconciler::resync`] call.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The store was replaced.
    Synced { generation: Generation },
    /// The dump failed; try again after `after`.
    Retry {
        attempt: u32,
        after: Duration,
        error: Error,
    },
    /// The dump failed and the reconciler is degraded; try again after `after`.
    Degraded { after: Duration, error: Error },
}

impl ReconcileOutcome {
    /// Delay before the next attempt, if one is needed.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Synced { .. } => None,
            Self::Retry { after, .. } | Self::Degraded { after, .. } => Some(*after),
        }
    }
}

/// Which families each table is dumped for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPlan {
    pub address_families: Vec<u8>,
    pub route_families: Vec<u8>,
}

/// Drives full resyncs of a [`Store`].
#[derive(Debug)]
pub struct Reconciler {
    state: ReconcileState,
    policy: ReconcileConfig,
    plan: DumpPlan,
}

impl Reconciler {
    /// Create a reconciler. It starts out needing a resync.
    pub fn new(policy: ReconcileConfig, plan: DumpPlan) -> Self {
        Self {
            state: ReconcileState::Resyncing { attempt: 0 },
            policy,
            plan,
        }
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// True unless the last resync succeeded and nothing was lost since.
    pub fn needs_resync(&self) -> bool {
        self.state != ReconcileState::Synced
    }

    /// Record a loss condition. A degraded reconciler stays degraded until
    /// a dump succeeds.
    pub fn trigger(&mut self, trigger: Trigger) {
        match self.state {
            ReconcileState::Synced => {
                info!(?trigger, "resync required");
                self.state = ReconcileState::Resyncing { attempt: 0 };
            }
            ReconcileState::Resyncing { .. } | ReconcileState::Degraded => {
                info!(?trigger, state = ?self.state, "loss while resync pending");
            }
        }
    }

    /// Delay after `attempt` consecutive failures: `initial * 2^(attempt-1)`
    /// capped at `max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        exponential_backoff(
            self.policy.initial_backoff(),
            self.policy.max_backoff(),
            attempt,
        )
    }

    /// Dump every table and replace the store contents.
    pub async fn resync<D: Dumper>(&mut self, store: &mut Store, dumper: &D) -> ReconcileOutcome {
        match self.dump_all(dumper).await {
            Ok((links, addresses, routes)) => {
                let was_degraded = self.state == ReconcileState::Degraded;
                let counts = (links.len(), addresses.len(), routes.len());
                let generation = store.replace_all(links, addresses, routes);
                store.reset_watermark();
                self.state = ReconcileState::Synced;
                info!(
                    generation,
                    links = counts.0,
                    addresses = counts.1,
                    routes = counts.2,
                    recovered = was_degraded,
                    "resync complete"
                );
                ReconcileOutcome::Synced { generation }
            }
            Err(error) => self.failed(store, error),
        }
    }

    fn failed(&mut self, store: &mut Store, error: Error) -> ReconcileOutcome {
        let attempt = match self.state {
            ReconcileState::Degraded => {
                let after = self.policy.degraded_retry();
                warn!(%error, ?after, "resync failed while degraded");
                return ReconcileOutcome::Degraded { after, error };
            }
            ReconcileState::Resyncing { attempt } => attempt + 1,
            ReconcileState::Synced => 1,
        };

        if attempt >= self.policy.max_attempts {
            self.state = ReconcileState::Degraded;
            store.set_stale(true);
            let after = self.policy.degraded_retry();
            warn!(%error, attempt, ?after, "resync failed, serving stale state");
            return ReconcileOutcome::Degraded { after, error };
        }

        self.state = ReconcileState::Resyncing { attempt };
        let after = self.backoff(attempt);
        warn!(%error, attempt, ?after, "resync failed, retrying");
        ReconcileOutcome::Retry {
            attempt,
            after,
            error,
        }
    }

    async fn dump_all<D: Dumper>(
        &self,
        dumper: &D,
    ) -> Result<(Vec<LinkMessage>, Vec<AddressMessage>, Vec<RouteMessage>)> {
        let links = self.timed(TableKind::Links, dumper.dump_links()).await?;

        let mut addresses = Vec::new();
        for &family in &self.plan.address_families {
            addresses.extend(
                self.timed(TableKind::Addresses, dumper.dump_addresses(family))
                    .await?,
            );
        }

        let mut routes = Vec::new();
        for &family in &self.plan.route_families {
            routes.extend(
                self.timed(TableKind::Routes, dumper.dump_routes(family))
                    .await?,
            );
        }

        Ok((links, addresses, routes))
    }

    async fn timed<T>(
        &self,
        table: TableKind,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.policy.dump_timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::DumpTimeout {
                table: table.name(),
                timeout,
            })?
    }
}
