//! High-level façades over the control nodes the harness drives.
//!
//! These are deliberately thin: each method maps one telescope
//! operation to its command on the right device and runs it through
//! the synchronization layer. Test code should never need to spell
//! out a command name or a wait condition.

mod central;
mod subarray;

pub use central::CentralNode;
pub use subarray::SubarrayNode;
