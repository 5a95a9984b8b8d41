//! Event-driven synchronization harness for integration testing a
//! distributed telescope control system.
//!
//! The system under test is a network of device servers -- a central
//! node, subarray nodes, subsystem leaf nodes, dish masters --
//! reached over a device-proxy/event-subscription protocol. Tests
//! drive it by issuing commands and asserting on asynchronous state
//! transitions. The problem this crate solves is doing that without
//! polling races: multi-device transitions (the observation state
//! machine walking EMPTY, RESOURCING, IDLE, CONFIGURING, READY,
//! SCANNING and back) are validated by subscribing to change-events
//! *before* looking at any value, then blocking until every expected
//! value is in place or a deadline passes.
//!
//! The pieces, bottom up:
//!
//! - [`pool`] caches one connection per device and hands out proxy
//!   handles.
//! - [`tracer`] records change-events from watched attributes and
//!   answers queries about them, including transition queries
//!   ("did obsState go RESOURCING to IDLE?") and bounded waits for
//!   events that haven't happened yet.
//! - [`waiter`] blocks until a declarative set of attribute
//!   conditions, spread over any number of devices, all hold.
//! - [`sync`] knows the pre- and postcondition footprint of every
//!   telescope operation and runs commands under them.
//! - [`nodes`] are the façades tests actually call: `move_to_on`,
//!   `store_resources`, `configure`, `scan`, `abort_subarray`, ...
//!
//! The transport behind the proxies is a trait seam (`tmc-api`);
//! nothing in this crate knows which protocol implementation is
//! bound to it.

pub mod config;
pub mod logging;
pub mod nodes;
pub mod pool;
pub mod sync;
pub mod tracer;
pub mod waiter;

// Re-export the API crate's vocabulary; harness users shouldn't need
// a separate dependency for it.

pub use tmc_api::{device, state, transport, Error, Result};
