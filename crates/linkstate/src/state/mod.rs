//! In-memory interface, address and route tables.

mod model;
mod store;

pub use model::{Address, AddressKey, Generation, Interface, Route, RouteKey, Snapshot};
pub use store::{SequenceCheck, Store, StoreReader};
