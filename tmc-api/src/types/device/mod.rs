//! This module defines types related to devices.

use chrono::{DateTime, Utc};

mod value;
pub use value::Value;

/// A timestamped value of an attribute, as reported by the remote
/// device.

#[derive(Debug, PartialEq, Clone)]
pub struct Reading {
    pub ts: DateTime<Utc>,
    pub value: Value,
}

/// A change-event delivered by a subscription: one attribute of one
/// device took on a new value.

#[derive(Debug, PartialEq, Clone)]
pub struct Event {
    pub device: Name,
    pub attr: Attr,
    pub reading: Reading,
}

impl Event {
    /// The full name of the attribute this event belongs to.

    pub fn source(&self) -> FullName {
        self.device.attr(&self.attr)
    }
}

mod name;
pub use name::Attr;
pub use name::FullName;
pub use name::Name;
