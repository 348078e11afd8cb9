//! Daemon configuration.
//!
//! Loaded from YAML or JSON (chosen by file extension). Every field has a
//! default, so an empty file is a valid configuration.
//!
//! ```yaml
//! groups: [link, ipv4-addr, ipv6-addr, ipv4-route, ipv6-route]
//! bus: system
//! reconcile:
//!   dump_timeout_ms: 2000
//!   max_attempts: 5
//! ```

use std::path::Path;
use std::time::Duration;

use dbus::strings::BusName;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::netlink::Group;
use crate::netlink::types::family;

/// Default well-known bus name, object path and interface.
pub const DEFAULT_BUS_NAME: &str = "org.linkstate.LinkState1";

/// Which message bus to serve on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    System,
    Session,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Multicast groups to subscribe to.
    pub groups: Vec<Group>,
    pub bus: BusKind,
    pub bus_name: String,
    /// SO_RCVBUF for the event socket; `null` keeps the system default.
    pub recv_buffer_size: Option<usize>,
    pub reconcile: ReconcileConfig,
    pub reconnect: ReconnectConfig,
    pub notify: NotifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            groups: Group::ALL.to_vec(),
            bus: BusKind::System,
            bus_name: DEFAULT_BUS_NAME.to_string(),
            recv_buffer_size: Some(1 << 20),
            reconcile: ReconcileConfig::default(),
            reconnect: ReconnectConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

/// Full-dump resync policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    pub dump_timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Failed attempts before the store is marked stale.
    pub max_attempts: u32,
    /// Retry interval once degraded.
    pub degraded_retry_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            dump_timeout_ms: 2000,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
            max_attempts: 5,
            degraded_retry_ms: 30_000,
        }
    }
}

impl ReconcileConfig {
    pub fn dump_timeout(&self) -> Duration {
        Duration::from_millis(self.dump_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn degraded_retry(&self) -> Duration {
        Duration::from_millis(self.degraded_retry_ms)
    }
}

/// Backoff between event socket reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
        }
    }
}

impl ReconnectConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Change notification coalescing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub coalesce_window_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: 50,
        }
    }
}

impl NotifyConfig {
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}

impl Config {
    /// Read and validate a config file. `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::config(Some(path), e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json(&text)
        } else {
            Self::from_yaml(&text)
        };
        config.map_err(|e| match e {
            Error::Config { reason, .. } => Error::config(Some(path), reason),
            other => other,
        })
    }

    /// Parse and validate YAML.
    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty map.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text).map_err(|e| Error::config(None, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::config(None, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| Err(Error::config(None, reason));

        if self.groups.is_empty() {
            return fail("groups must not be empty");
        }
        if let Err(e) = BusName::new(self.bus_name.as_str()) {
            return Err(Error::config(None, format!("invalid bus_name: {}", e)));
        }
        if self.recv_buffer_size == Some(0) {
            return fail("recv_buffer_size must be positive");
        }

        let r = &self.reconcile;
        if r.dump_timeout_ms == 0 || r.initial_backoff_ms == 0 || r.degraded_retry_ms == 0 {
            return fail("reconcile timeouts must be positive");
        }
        if r.initial_backoff_ms > r.max_backoff_ms {
            return fail("reconcile.initial_backoff_ms exceeds max_backoff_ms");
        }
        if r.max_attempts == 0 {
            return fail("reconcile.max_attempts must be at least 1");
        }

        let c = &self.reconnect;
        if c.initial_backoff_ms == 0 {
            return fail("reconnect.initial_backoff_ms must be positive");
        }
        if c.initial_backoff_ms > c.max_backoff_ms {
            return fail("reconnect.initial_backoff_ms exceeds max_backoff_ms");
        }
        Ok(())
    }

    /// Address families whose addresses are dumped on resync.
    pub fn address_families(&self) -> Vec<u8> {
        self.families(Group::Ipv4Addr, Group::Ipv6Addr)
    }

    /// Address families whose routes are dumped on resync.
    pub fn route_families(&self) -> Vec<u8> {
        self.families(Group::Ipv4Route, Group::Ipv6Route)
    }

    fn families(&self, v4: Group, v6: Group) -> Vec<u8> {
        let mut out = Vec::new();
        if self.groups.contains(&v4) {
            out.push(family::AF_INET);
        }
        if self.groups.contains(&v6) {
            out.push(family::AF_INET6);
        }
        out
    }
}
