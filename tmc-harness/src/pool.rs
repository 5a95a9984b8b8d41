//! Connection management for the harness.
//!
//! Every component that talks to a device -- the tracer, the waiter,
//! the node façades -- goes through a `Pool`, which keeps one open
//! connection per device name. The pool hands out `Proxy` handles;
//! a proxy is a device name bound to its shared connection, plus the
//! trace output and error context the raw transport doesn't provide.

use std::collections::HashMap;
use std::sync::Arc;
use tmc_api::{
    device,
    transport::{Connection, EventStream, Transport},
    Error, Result,
};
use tokio::sync::Mutex;
use tracing::debug;

/// A shared cache of device connections. Handles are cheap to clone;
/// all clones use the same underlying cache.

#[derive(Clone)]
pub struct Pool {
    transport: Arc<dyn Transport>,
    conns: Arc<Mutex<HashMap<device::Name, Arc<dyn Connection>>>>,
}

impl Pool {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Pool {
            transport,
            conns: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a proxy for the named device. The first request for a
    /// device connects through the transport; later requests reuse
    /// the open connection.

    pub async fn proxy(&self, name: &device::Name) -> Result<Proxy> {
        let mut conns = self.conns.lock().await;

        if let Some(conn) = conns.get(name) {
            return Ok(Proxy {
                name: name.clone(),
                conn: conn.clone(),
            });
        }

        let conn = self.transport.connect(name).await?;

        debug!("connected to {}", name);
        conns.insert(name.clone(), conn.clone());
        Ok(Proxy {
            name: name.clone(),
            conn,
        })
    }
}

/// A handle to one remote device. Wraps the connection so callers
/// never deal with the transport directly.

#[derive(Clone)]
pub struct Proxy {
    name: device::Name,
    conn: Arc<dyn Connection>,
}

impl Proxy {
    pub fn name(&self) -> &device::Name {
        &self.name
    }

    /// Invokes a command on the device. Rejections are re-reported
    /// with the device and command named, since the transport only
    /// knows the device's reason.

    pub async fn command(
        &self,
        cmd: &str,
        arg: Option<device::Value>,
    ) -> Result<Option<device::Value>> {
        debug!("{}: invoking {}", &self.name, cmd);

        self.conn.command(cmd, arg).await.map_err(|e| match e {
            Error::Rejected(why) => Error::Rejected(format!(
                "{} refused {}: {}",
                &self.name, cmd, why
            )),
            e => e,
        })
    }

    /// Reads the current value of one of the device's attributes.

    pub async fn read_attribute(
        &self,
        attr: &device::Attr,
    ) -> Result<device::Reading> {
        self.conn.read_attribute(attr).await
    }

    /// Opens a change-event subscription on one of the device's
    /// attributes. The stream yields the current value first.

    pub async fn subscribe(
        &self,
        attr: &device::Attr,
    ) -> Result<EventStream> {
        debug!("{}: subscribing to {}", &self.name, attr);
        self.conn.subscribe(attr).await
    }
}
