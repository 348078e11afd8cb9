//! D-Bus binding of the query service.
//!
//! Serves `org.linkstate.LinkState1` at `/org/linkstate/LinkState1`:
//!
//! | member | signature |
//! |---|---|
//! | `ListInterfaces()` | `(t, a(ussuay))` |
//! | `GetInterface(s)` | `(t, (ussuay))` |
//! | `GetInterfaceByIndex(u)` | `(t, (ussuay))` |
//! | `ListAddresses(u)` | `(t, a(ysyy))` |
//! | `ListRoutes()` | `(t, a(ysyuus))` |
//! | property `Generation` | `t` |
//! | property `Stale` | `b` |
//! | signal `StateChanged` | `t` |
//! | signal `InterfacesChanged` | `t, au, au, au` |
//!
//! Unknown interfaces fail with `org.linkstate.LinkState1.NotFound`.
//! Neither property emits `PropertiesChanged`; `StateChanged` fires for
//! every generation or stale-flag change instead.

use std::future::Future;
use std::sync::Arc;

use dbus::channel::{MatchingReceiver, Sender, Token};
use dbus::message::MatchRule;
use dbus::nonblock::SyncConnection;
use dbus::nonblock::stdintf::org_freedesktop_dbus::RequestNameReply;
use dbus::strings::BusName;
use dbus::Message;
use dbus_crossroads::{Crossroads, IfaceBuilder, MethodErr};
use dbus_tokio::connection;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AddressRecord, ChangeBatch, ChangeNotifier, InterfaceRecord, QueryError, QueryService, RouteRecord};
use crate::config::BusKind;
use crate::error::{Error, Result};

/// Object path of the service.
pub const OBJECT_PATH: &str = "/org/linkstate/LinkState1";
/// Interface name of the service.
pub const INTERFACE: &str = "org.linkstate.LinkState1";
/// Error name for unknown interfaces.
pub const NOT_FOUND_ERROR: &str = "org.linkstate.LinkState1.NotFound";

type IfaceTuple = (u32, String, String, u32, Vec<u8>);
type AddrTuple = (u8, String, u8, u8);
type RouteTuple = (u8, String, u8, u32, u32, String);

impl From<InterfaceRecord> for IfaceTuple {
    fn from(r: InterfaceRecord) -> Self {
        (r.index, r.name, r.state, r.mtu, r.hw_addr)
    }
}

impl From<AddressRecord> for AddrTuple {
    fn from(r: AddressRecord) -> Self {
        (r.family, r.address, r.prefix_len, r.scope)
    }
}

impl From<RouteRecord> for RouteTuple {
    fn from(r: RouteRecord) -> Self {
        (r.family, r.destination, r.prefix_len, r.table, r.oif, r.gateway)
    }
}

fn method_err(err: QueryError) -> MethodErr {
    MethodErr::from((NOT_FOUND_ERROR, err.to_string()))
}

/// Register the interface on `cr` and expose `service` at [`OBJECT_PATH`].
pub fn register(cr: &mut Crossroads, service: QueryService) {
    let token = cr.register(INTERFACE, |b: &mut IfaceBuilder<QueryService>| {
        b.method(
            "ListInterfaces",
            (),
            ("generation", "interfaces"),
            |_, svc, (): ()| {
                let (generation, list) = svc.list_interfaces();
                let list: Vec<IfaceTuple> = list.into_iter().map(Into::into).collect();
                Ok((generation, list))
            },
        );
        b.method(
            "GetInterface",
            ("name",),
            ("generation", "interface"),
            |_, svc, (name,): (String,)| {
                let (generation, record) = svc.get_interface(&name).map_err(method_err)?;
                Ok((generation, IfaceTuple::from(record)))
            },
        );
        b.method(
            "GetInterfaceByIndex",
            ("index",),
            ("generation", "interface"),
            |_, svc, (index,): (u32,)| {
                let (generation, record) = svc.get_interface_by_index(index).map_err(method_err)?;
                Ok((generation, IfaceTuple::from(record)))
            },
        );
        b.method(
            "ListAddresses",
            ("index",),
            ("generation", "addresses"),
            |_, svc, (index,): (u32,)| {
                let (generation, list) = svc.list_addresses(index);
                let list: Vec<AddrTuple> = list.into_iter().map(Into::into).collect();
                Ok((generation, list))
            },
        );
        b.method(
            "ListRoutes",
            (),
            ("generation", "routes"),
            |_, svc, (): ()| {
                let (generation, list) = svc.list_routes();
                let list: Vec<RouteTuple> = list.into_iter().map(Into::into).collect();
                Ok((generation, list))
            },
        );
        b.property::<u64, _>("Generation")
            .emits_changed_false()
            .get(|_, svc| Ok(svc.status().0));
        b.property::<bool, _>("Stale")
            .emits_changed_false()
            .get(|_, svc| Ok(svc.status().1));
        b.signal::<(u64,), _>("StateChanged", ("generation",));
        b.signal::<(u64, Vec<u32>, Vec<u32>, Vec<u32>), _>(
            "InterfacesChanged",
            ("generation", "added", "removed", "changed"),
        );
    });
    cr.insert(OBJECT_PATH, &[token], service);
}

/// Build the `StateChanged` signal.
pub fn state_changed_signal(generation: u64) -> Result<Message> {
    Message::new_signal(OBJECT_PATH, INTERFACE, "StateChanged")
        .map(|m| m.append1(generation))
        .map_err(Error::Bus)
}

/// Build the `InterfacesChanged` signal.
pub fn interfaces_changed_signal(batch: &ChangeBatch) -> Result<Message> {
    Message::new_signal(OBJECT_PATH, INTERFACE, "InterfacesChanged")
        .map(|m| {
            m.append3(batch.generation, batch.added.clone(), batch.removed.clone())
                .append1(batch.changed.clone())
        })
        .map_err(Error::Bus)
}

/// A running D-Bus service.
pub struct DbusService {
    conn: Arc<SyncConnection>,
    /// Resolves with the reason once the bus connection is gone.
    resource: JoinHandle<String>,
    receive: Option<Token>,
}

impl DbusService {
    /// Connect to the bus, claim `bus_name` and start serving `service`.
    pub async fn start(bus: BusKind, bus_name: &str, service: QueryService) -> Result<Self> {
        let (resource, conn) = match bus {
            BusKind::System => connection::new_system_sync()?,
            BusKind::Session => connection::new_session_sync()?,
        };

        let resource = tokio::spawn(async move {
            let err = resource.await;
            error!(error = %err, "lost D-Bus connection");
            err.to_string()
        });

        let name = match BusName::new(bus_name) {
            Ok(name) => name,
            Err(reason) => {
                resource.abort();
                return Err(Error::Bus(reason));
            }
        };
        let reply = match conn.request_name(name, false, true, true).await {
            Ok(reply) => reply,
            Err(e) => {
                resource.abort();
                return Err(e.into());
            }
        };
        if !matches!(
            reply,
            RequestNameReply::PrimaryOwner | RequestNameReply::AlreadyOwner
        ) {
            resource.abort();
            return Err(Error::Bus(format!("bus name {} is taken", bus_name)));
        }

        let mut cr = Crossroads::new();
        register(&mut cr, service);
        let receive = conn.start_receive(
            MatchRule::new_method_call(),
            Box::new(move |msg, conn| {
                if cr.handle_message(msg, conn).is_err() {
                    warn!("failed to dispatch D-Bus method call");
                }
                true
            }),
        );

        info!(?bus, bus_name, path = OBJECT_PATH, "D-Bus service ready");
        Ok(Self {
            conn,
            resource,
            receive: Some(receive),
        })
    }

    /// Emit the signals for one change batch.
    pub fn emit(&self, batch: &ChangeBatch) -> Result<()> {
        emit(&self.conn, batch)
    }

    /// Emit signals for every batch until the store goes away.
    ///
    /// Fails if the bus connection is lost first.
    pub async fn forward(&mut self, notifier: ChangeNotifier) -> Result<()> {
        let conn = &self.conn;
        let resource = &mut self.resource;
        let lost = async move {
            match resource.await {
                Ok(reason) => reason,
                Err(e) => e.to_string(),
            }
        };
        forward_until(notifier, lost, |batch| emit(conn, batch)).await
    }
}

async fn forward_until<L, F>(mut notifier: ChangeNotifier, lost: L, mut emit: F) -> Result<()>
where
    L: Future<Output = String>,
    F: FnMut(&ChangeBatch) -> Result<()>,
{
    tokio::pin!(lost);
    loop {
        tokio::select! {
            reason = &mut lost => {
                return Err(Error::Bus(format!("connection lost: {}", reason)));
            }
            batch = notifier.next_batch() => match batch {
                Some(batch) => {
                    if let Err(e) = emit(&batch) {
                        warn!(error = %e, "failed to emit change signal");
                    }
                }
                None => return Ok(()),
            },
        }
    }
}

fn emit(conn: &SyncConnection, batch: &ChangeBatch) -> Result<()> {
    send(conn, state_changed_signal(batch.generation)?)?;
    if !batch.is_empty() {
        send(conn, interfaces_changed_signal(batch)?)?;
    }
    debug!(generation = batch.generation, ?batch, "signals emitted");
    Ok(())
}

fn send(conn: &SyncConnection, msg: Message) -> Result<()> {
    conn.send(msg)
        .map(|_| ())
        .map_err(|()| Error::Bus("send failed".into()))
}

impl Drop for DbusService {
    fn drop(&mut self) {
        if let Some(token) = self.receive.take() {
            self.conn.stop_receive(token);
        }
        self.resource.abort();
    }
}
