//! The composite-condition wait engine.
//!
//! Validating a telescope operation means blocking until a set of
//! attributes, spread over several devices, all reach expected
//! values. Polling each attribute invites timing races; instead, a
//! `Waiter` opens a change-event subscription per condition *before*
//! it looks at any value. Since every subscription replays the
//! current value as its first event, a condition that is already
//! satisfied discharges immediately and a condition that becomes
//! satisfied is never missed.

use futures::future;
use std::fmt;
use tmc_api::{device, Error, Result};
use tokio::time::{self, Duration, Instant};
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, warn};

use crate::pool::Pool;

/// What a condition accepts as a satisfying value.

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Equals(device::Value),
    OneOf(Vec<device::Value>),
}

impl Target {
    fn matches(&self, value: &device::Value) -> bool {
        match self {
            Target::Equals(v) => v == value,
            Target::OneOf(vs) => vs.contains(value),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Equals(v) => write!(f, "== {}", v),
            Target::OneOf(vs) => {
                write!(f, "in [")?;
                for (ii, v) in vs.iter().enumerate() {
                    if ii > 0 {
                        write!(f, ", ")?
                    }
                    write!(f, "{}", v)?
                }
                write!(f, "]")
            }
        }
    }
}

/// One attribute the waiter watches and the value it has to reach.

#[derive(Debug, Clone)]
pub struct Condition {
    pub device: device::Name,
    pub attr: device::Attr,
    pub target: Target,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", &self.device, &self.attr, &self.target)
    }
}

/// A declarative set of conditions that must all hold before an
/// operation is considered complete. Build one with the `wait_for`
/// methods, then block on `wait_all`.

#[derive(Default)]
pub struct Waiter {
    conds: Vec<Condition>,
}

impl Waiter {
    pub fn new() -> Self {
        Waiter { conds: vec![] }
    }

    /// Adds a condition requiring `attr` of `device` to equal
    /// `value`.

    pub fn wait_for<T: Into<device::Value>>(
        mut self,
        device: &device::Name,
        attr: &device::Attr,
        value: T,
    ) -> Self {
        self.conds.push(Condition {
            device: device.clone(),
            attr: attr.clone(),
            target: Target::Equals(value.into()),
        });
        self
    }

    /// Adds a condition satisfied by any of the listed values.

    pub fn wait_for_any<T: Into<device::Value>>(
        mut self,
        device: &device::Name,
        attr: &device::Attr,
        values: Vec<T>,
    ) -> Self {
        self.conds.push(Condition {
            device: device.clone(),
            attr: attr.clone(),
            target: Target::OneOf(
                values.into_iter().map(T::into).collect(),
            ),
        });
        self
    }

    pub fn add(&mut self, cond: Condition) {
        self.conds.push(cond)
    }

    pub fn is_empty(&self) -> bool {
        self.conds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conds.len()
    }

    /// Blocks until every condition is satisfied, or until `timeout`
    /// passes. On timeout, the error lists each unsatisfied condition
    /// together with the last value seen for it. Dropping the
    /// returned future cancels every subscription it opened; no task
    /// outlives the call.

    pub async fn wait_all(
        &self,
        pool: &Pool,
        timeout: Duration,
    ) -> Result<()> {
        if self.conds.is_empty() {
            return Ok(());
        }

        let deadline = Instant::now() + timeout;

        // Open every subscription before examining any value. The
        // initial read only seeds the "last seen" diagnostics; the
        // subscription's replayed first event is what discharges a
        // condition that already holds.

        let subs =
            future::try_join_all(self.conds.iter().map(|cond| async {
                let proxy = pool.proxy(&cond.device).await?;
                let stream = proxy.subscribe(&cond.attr).await?;
                let last = proxy
                    .read_attribute(&cond.attr)
                    .await
                    .ok()
                    .map(|r| r.value);

                Ok::<_, Error>((stream, last))
            }))
            .await?;

        let mut last_seen = Vec::with_capacity(self.conds.len());
        let mut streams = StreamMap::with_capacity(self.conds.len());

        for (idx, (stream, last)) in subs.into_iter().enumerate() {
            streams.insert(idx, stream);
            last_seen.push(last)
        }

        let mut remaining = self.conds.len();

        loop {
            #[rustfmt::skip]
            tokio::select! {
                // The next event from any of the watched attributes.
                // The key identifies which condition the event
                // belongs to.

                Some((idx, event)) = streams.next(), if !streams.is_empty() => {
                    let cond = &self.conds[idx];

                    last_seen[idx] = Some(event.reading.value.clone());

                    if cond.target.matches(&event.reading.value) {
                        debug!("condition satisfied: {}", cond);

                        let _ = streams.remove(&idx);
                        remaining -= 1;

                        if remaining == 0 {
                            return Ok(());
                        }
                    }
                }

                _ = time::sleep_until(deadline) => {
                    let summary = self.unmet_summary(&streams, &last_seen);

                    warn!("wait timed out: {}", &summary);
                    return Err(Error::Timeout(summary));
                }
            }
        }
    }

    // Builds the timeout diagnostic: every still-pending condition
    // with the last value its attribute was seen holding.

    fn unmet_summary(
        &self,
        streams: &StreamMap<usize, tmc_api::transport::EventStream>,
        last_seen: &[Option<device::Value>],
    ) -> String {
        let unmet: Vec<String> = streams
            .keys()
            .map(|&idx| match &last_seen[idx] {
                Some(v) => format!("{} (last {})", &self.conds[idx], v),
                None => format!("{} (no value seen)", &self.conds[idx]),
            })
            .collect();

        unmet.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmc_api::state::ObsState;

    #[test]
    fn test_targets() {
        let equals = Target::Equals(device::Value::Obs(ObsState::Idle));

        assert!(equals.matches(&device::Value::Obs(ObsState::Idle)));
        assert!(!equals.matches(&device::Value::Obs(ObsState::Empty)));
        assert!(!equals.matches(&device::Value::Int(2)));

        let one_of = Target::OneOf(vec![
            device::Value::Obs(ObsState::Empty),
            device::Value::Obs(ObsState::Idle),
        ]);

        assert!(one_of.matches(&device::Value::Obs(ObsState::Empty)));
        assert!(one_of.matches(&device::Value::Obs(ObsState::Idle)));
        assert!(!one_of.matches(&device::Value::Obs(ObsState::Ready)));
    }

    #[test]
    fn test_condition_display() {
        let cond = Condition {
            device: "mid/tm_subarray_node/1".parse().unwrap(),
            attr: "obsState".parse().unwrap(),
            target: Target::Equals(device::Value::Obs(ObsState::Idle)),
        };

        assert_eq!(
            format!("{}", cond),
            "mid/tm_subarray_node/1/obsState == IDLE"
        );

        let cond = Condition {
            target: Target::OneOf(vec![
                device::Value::Obs(ObsState::Empty),
                device::Value::Obs(ObsState::Aborted),
            ]),
            ..cond
        };

        assert_eq!(
            format!("{}", cond),
            "mid/tm_subarray_node/1/obsState in [EMPTY, ABORTED]"
        );
    }

    #[test]
    fn test_builder() {
        let dn = "mid/tm_subarray_node/1".parse().unwrap();
        let attr = "obsState".parse().unwrap();
        let w = Waiter::new()
            .wait_for(&dn, &attr, ObsState::Idle)
            .wait_for_any(&dn, &attr, vec![ObsState::Empty, ObsState::Idle]);

        assert_eq!(w.len(), 2);
        assert!(!w.is_empty());
        assert!(Waiter::new().is_empty());
    }
}
