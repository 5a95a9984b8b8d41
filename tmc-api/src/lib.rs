//! This crate holds the types and interfaces shared by the pieces of
//! the TMC synchronization harness.
//!
//! The harness talks to an external, distributed telescope control
//! system. Nothing in this crate implements control-system behavior;
//! it defines the vocabulary (device names, attribute values,
//! observation states, change-events) and the transport seam through
//! which the harness reaches the remote device servers.

mod types;

// Pull types down to the `tmc-api` namespace.

pub use types::device;
pub use types::state;
pub use types::Error;

/// A specialization of `std::result::Result<>` where the error value
/// is `types::Error`.

pub type Result<T> = std::result::Result<T, Error>;

pub mod transport;
