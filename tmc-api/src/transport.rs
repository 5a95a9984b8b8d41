//! Defines the seam between the harness and the remote control
//! system.
//!
//! The device servers themselves live in an external, distributed
//! deployment; the harness only ever sees them through these traits.
//! Production code binds them to the site's device-proxy protocol.
//! Tests bind them to an in-process, scripted stand-in.

use crate::{device, Result};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// A stream of change-events for a single attribute subscription.
/// Dropping the stream cancels the subscription.

pub type EventStream = Pin<Box<dyn Stream<Item = device::Event> + Send>>;

/// One open connection to a remote device.
///
/// Implementations are expected to be cheap to share; the harness
/// holds each connection in an `Arc` and hands clones to every
/// component that targets the same device.

#[async_trait]
pub trait Connection: Send + Sync {
    /// Invokes a command on the device. Commands take, and may
    /// return, at most one value. A command refused by the device
    /// must be reported as `Error::Rejected` with the device's
    /// reason.

    async fn command(
        &self,
        cmd: &str,
        arg: Option<device::Value>,
    ) -> Result<Option<device::Value>>;

    /// Reads the current value of an attribute.

    async fn read_attribute(&self, attr: &device::Attr)
        -> Result<device::Reading>;

    /// Opens a change-event subscription on an attribute.
    ///
    /// The returned stream must yield the attribute's current value
    /// as its first item before delivering changes. This mirrors the
    /// remote system's change-event contract and is what allows
    /// subscribers to avoid the race between an initial read and the
    /// start of event delivery.

    async fn subscribe(&self, attr: &device::Attr) -> Result<EventStream>;
}

/// Connects to devices by name. A `Transport` is the root object a
/// harness is built around; everything else borrows connections from
/// it.

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        device: &device::Name,
    ) -> Result<Arc<dyn Connection>>;
}
