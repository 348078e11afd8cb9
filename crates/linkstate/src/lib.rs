//! Cached view of the kernel's links, addresses and routes.
//!
//! The daemon keeps an in-memory copy of the rtnetlink tables, follows
//! kernel notifications to keep it current, falls back to a full dump when
//! notifications are lost, and answers queries over D-Bus.
//!
//! # Layers
//!
//! - [`netlink`] - wire codec, event source and dump connection
//! - [`state`] - the [`Store`] and its immutable [`Snapshot`]s
//! - [`reconcile`] - full-dump resync with backoff
//! - [`sync`] - the single writer tying the above together
//! - [`service`] - queries, change notification and the D-Bus binding
//!
//! # Example
//!
//! ```ignore
//! use linkstate::{Config, CloseHandle, Store, service::QueryService};
//!
//! #[tokio::main]
//! async fn main() -> linkstate::Result<()> {
//!     let config = Config::default();
//!     let store = Store::new();
//!     let queries = QueryService::new(store.reader());
//!
//!     let close = CloseHandle::new();
//!     tokio::spawn(linkstate::sync::run(&config, store, close.clone()));
//!
//!     let (generation, interfaces) = queries.list_interfaces();
//!     println!("{} interfaces at generation {}", interfaces.len(), generation);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod netlink;
pub mod reconcile;
pub mod service;
pub mod state;
pub mod sync;

mod error;

pub use config::Config;
pub use error::{Error, Result};
pub use netlink::{CloseHandle, EventSource, NetworkEvent, SourceEvent};
pub use reconcile::{Dumper, ReconcileOutcome, ReconcileState, Reconciler, Trigger};
pub use service::{ChangeBatch, ChangeNotifier, QueryError, QueryService};
pub use state::{Generation, Snapshot, Store, StoreReader};
