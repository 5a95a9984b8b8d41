//! The event tracer.
//!
//! A `Tracer` records every change-event from the attributes it was
//! told to watch, so a test can assert on transitions *after* driving
//! an operation -- including transitions that happened while the test
//! was busy elsewhere. The buffer is held by a background collector
//! task; handles talk to it over a request channel.
//!
//! Two kinds of questions can be asked: `occurred` checks the buffer
//! as it stands, and `await_event` resolves as soon as a matching
//! event is buffered, up to a deadline. Both use the same `Query`
//! description of the event being looked for.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use tmc_api::{device, transport::EventStream, Error, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration, Instant};
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info_span, warn};
use tracing_futures::Instrument;

use crate::pool::Proxy;

/// Describes an event being looked for. An empty query matches any
/// event; each field narrows the match.

#[derive(Debug, Clone, Default)]
pub struct Query {
    device: Option<device::Name>,
    attr: Option<device::Attr>,
    value: Option<device::Value>,
    previous: Option<device::Value>,
    lookahead: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    /// Restricts the match to events from one device.

    pub fn device(mut self, name: &device::Name) -> Self {
        self.device = Some(name.clone());
        self
    }

    /// Restricts the match to events of one attribute name.

    pub fn attr(mut self, attr: &device::Attr) -> Self {
        self.attr = Some(attr.clone());
        self
    }

    /// Requires the event to carry this value.

    pub fn value<T: Into<device::Value>>(mut self, value: T) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Requires the attribute to have held this value immediately
    /// before the event. Use together with `value` to assert a
    /// specific transition.

    pub fn previous<T: Into<device::Value>>(mut self, value: T) -> Self {
        self.previous = Some(value.into());
        self
    }

    /// When matching against the buffer, only consider the `n` most
    /// recent events. Has no effect on events that arrive after an
    /// `await_event` call was made.

    pub fn lookahead(mut self, n: usize) -> Self {
        self.lookahead = Some(n);
        self
    }

    // Returns `true` if one recorded event satisfies the query.

    fn matches(&self, rec: &Recorded) -> bool {
        if let Some(device) = &self.device {
            if *device != rec.event.device {
                return false;
            }
        }

        if let Some(attr) = &self.attr {
            if *attr != rec.event.attr {
                return false;
            }
        }

        if let Some(value) = &self.value {
            if *value != rec.event.reading.value {
                return false;
            }
        }

        if let Some(previous) = &self.previous {
            if rec.previous.as_ref() != Some(previous) {
                return false;
            }
        }

        true
    }

    // Scans the buffer, newest entries last, honoring the lookahead
    // window.

    fn find_in(&self, buffer: &VecDeque<Recorded>) -> Option<device::Event> {
        let skip = match self.lookahead {
            Some(n) => buffer.len().saturating_sub(n),
            None => 0,
        };

        buffer
            .iter()
            .skip(skip)
            .find(|rec| self.matches(rec))
            .map(|rec| rec.event.clone())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![];

        if let Some(v) = &self.device {
            parts.push(format!("device {}", v))
        }
        if let Some(v) = &self.attr {
            parts.push(format!("attr {}", v))
        }
        if let Some(v) = &self.value {
            parts.push(format!("value {}", v))
        }
        if let Some(v) = &self.previous {
            parts.push(format!("previous {}", v))
        }

        if parts.is_empty() {
            write!(f, "any event")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

// One buffered event, along with the value the attribute held before
// it. The previous value is computed when the event is recorded, so
// evicting old entries never corrupts transition queries.

struct Recorded {
    event: device::Event,
    previous: Option<device::Value>,
}

// Requests the handles can send to the collector task.

enum Request {
    Watch {
        key: String,
        stream: EventStream,
    },

    Occurred {
        query: Query,
        rpy_chan: oneshot::Sender<Option<device::Event>>,
    },

    Await {
        query: Query,
        deadline: Instant,
        rpy_chan: oneshot::Sender<Option<device::Event>>,
    },

    Events {
        rpy_chan: oneshot::Sender<Vec<device::Event>>,
    },

    Clear {
        rpy_chan: oneshot::Sender<()>,
    },
}

// An `Await` request that couldn't be answered from the buffer. It
// sits here until a matching event arrives or its deadline passes.

struct Pending {
    query: Query,
    deadline: Instant,
    rpy_chan: oneshot::Sender<Option<device::Event>>,
}

/// Holds the state of the collector task.

struct State {
    capacity: usize,
    buffer: VecDeque<Recorded>,
    current: HashMap<device::FullName, device::Value>,
    pending: Vec<Pending>,
}

impl State {
    fn create(capacity: usize) -> Self {
        State {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
            current: HashMap::new(),
            pending: vec![],
        }
    }

    // Buffers an incoming event, evicting the oldest entries when the
    // buffer is full, and answers every pending request the event
    // satisfies.

    fn record(&mut self, event: device::Event) {
        let previous = self
            .current
            .insert(event.source(), event.reading.value.clone());

        debug!(
            "recorded {} -> {}",
            event.source(),
            &event.reading.value
        );

        let rec = Recorded { event, previous };

        let mut ii = 0;

        while ii < self.pending.len() {
            if self.pending[ii].query.matches(&rec) {
                let p = self.pending.swap_remove(ii);

                if p.rpy_chan.send(Some(rec.event.clone())).is_err() {
                    warn!("requester exited before a reply could be sent")
                }
            } else {
                ii += 1
            }
        }

        self.buffer.push_back(rec);
        while self.buffer.len() > self.capacity {
            let _ = self.buffer.pop_front();
        }
    }

    // Completes, with `None`, every pending request whose deadline
    // has passed.

    fn expire(&mut self, now: Instant) {
        let mut ii = 0;

        while ii < self.pending.len() {
            if self.pending[ii].deadline <= now {
                let p = self.pending.swap_remove(ii);
                let _ = p.rpy_chan.send(None);
            } else {
                ii += 1
            }
        }
    }

    fn handle_request(
        &mut self,
        req: Request,
        streams: &mut StreamMap<String, EventStream>,
    ) {
        match req {
            Request::Watch { key, stream } => {
                debug!("watching {}", &key);
                let _ = streams.insert(key, stream);
            }

            Request::Occurred { query, rpy_chan } => {
                if rpy_chan.send(query.find_in(&self.buffer)).is_err() {
                    warn!("requester exited before a reply could be sent")
                }
            }

            Request::Await {
                query,
                deadline,
                rpy_chan,
            } => {
                if let Some(event) = query.find_in(&self.buffer) {
                    if rpy_chan.send(Some(event)).is_err() {
                        warn!(
                            "requester exited before a reply could be sent"
                        )
                    }
                } else {
                    self.pending.push(Pending {
                        query,
                        deadline,
                        rpy_chan,
                    })
                }
            }

            Request::Events { rpy_chan } => {
                let events =
                    self.buffer.iter().map(|r| r.event.clone()).collect();

                if rpy_chan.send(events).is_err() {
                    warn!("requester exited before a reply could be sent")
                }
            }

            Request::Clear { rpy_chan } => {
                self.buffer.clear();
                if rpy_chan.send(()).is_err() {
                    warn!("requester exited before a reply could be sent")
                }
            }
        }
    }

    // Captures the State and runs as an async task using it as its
    // mutable state. The task ends when the last handle is dropped.

    async fn run(mut self, mut rx_req: mpsc::Receiver<Request>) {
        let mut streams: StreamMap<String, EventStream> = StreamMap::new();

        loop {
            let next_deadline = self.pending.iter().map(|p| p.deadline).min();
            let wake = next_deadline.unwrap_or_else(Instant::now);

            // The select is biased so every event already delivered
            // is recorded before a query is answered; otherwise a
            // query issued right after an operation could race the
            // delivery of the operation's own events.

            #[rustfmt::skip]
            tokio::select! {
                biased;

                Some((_, event)) = streams.next(), if !streams.is_empty() => {
                    self.record(event)
                }

                _ = time::sleep_until(wake), if next_deadline.is_some() => {
                    self.expire(Instant::now())
                }

                req = rx_req.recv() => {
                    match req {
                        Some(req) => self.handle_request(req, &mut streams),
                        None => break
                    }
                }
            }
        }

        debug!("all handles dropped; collector exiting")
    }
}

/// A handle to a running event collector. Handles are cheap to clone;
/// all clones query the same buffer.

#[derive(Clone)]
pub struct Tracer {
    req_chan: mpsc::Sender<Request>,
}

impl Tracer {
    /// Starts a collector task whose buffer keeps at most `capacity`
    /// events, and returns a handle to it.

    pub fn start(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(20);
        let state = State::create(capacity);

        tokio::spawn(state.run(rx).instrument(info_span!("tracer")));
        Tracer { req_chan: tx }
    }

    /// Subscribes to an attribute and routes its change-events into
    /// the collector. Watching the same attribute twice replaces the
    /// earlier subscription.

    pub async fn watch(
        &self,
        proxy: &Proxy,
        attr: &device::Attr,
    ) -> Result<()> {
        let stream = proxy.subscribe(attr).await?;
        let key = format!("{}", proxy.name().attr(attr));

        self.req_chan.send(Request::Watch { key, stream }).await?;
        Ok(())
    }

    /// Returns the first buffered event matching the query, if one
    /// has occurred.

    pub async fn occurred(&self, query: Query) -> Result<Option<device::Event>> {
        let (tx, rx) = oneshot::channel();

        self.req_chan
            .send(Request::Occurred {
                query,
                rpy_chan: tx,
            })
            .await?;
        rx.await.map_err(Error::from)
    }

    /// Resolves as soon as an event matching the query is buffered --
    /// immediately, if one already is. Reports `Error::Timeout` if
    /// nothing matches within `within`.

    pub async fn await_event(
        &self,
        query: Query,
        within: Duration,
    ) -> Result<device::Event> {
        let summary = format!("{}", &query);
        let (tx, rx) = oneshot::channel();

        self.req_chan
            .send(Request::Await {
                query,
                deadline: Instant::now() + within,
                rpy_chan: tx,
            })
            .await?;

        match rx.await? {
            Some(event) => Ok(event),
            None => Err(Error::Timeout(summary)),
        }
    }

    /// Returns a snapshot of the buffered events, oldest first.

    pub async fn events(&self) -> Result<Vec<device::Event>> {
        let (tx, rx) = oneshot::channel();

        self.req_chan.send(Request::Events { rpy_chan: tx }).await?;
        rx.await.map_err(Error::from)
    }

    /// Empties the buffer. Subscriptions stay open; the attribute
    /// values last seen are kept so transition queries spanning the
    /// clear stay correct.

    pub async fn clear(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        self.req_chan.send(Request::Clear { rpy_chan: tx }).await?;
        rx.await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tmc_api::state::ObsState;

    fn event(device: &str, attr: &str, value: device::Value) -> device::Event {
        device::Event {
            device: device.parse().unwrap(),
            attr: attr.parse().unwrap(),
            reading: device::Reading {
                ts: Utc::now(),
                value,
            },
        }
    }

    fn filled_state() -> State {
        let mut state = State::create(16);

        state.record(event(
            "mid/tm_subarray_node/1",
            "obsState",
            device::Value::Obs(ObsState::Empty),
        ));
        state.record(event(
            "mid/tm_subarray_node/1",
            "obsState",
            device::Value::Obs(ObsState::Resourcing),
        ));
        state.record(event(
            "mid/tm_subarray_node/2",
            "obsState",
            device::Value::Obs(ObsState::Empty),
        ));
        state.record(event(
            "mid/tm_subarray_node/1",
            "obsState",
            device::Value::Obs(ObsState::Idle),
        ));
        state
    }

    #[test]
    fn test_query_matching() {
        let state = filled_state();
        let sa1: device::Name = "mid/tm_subarray_node/1".parse().unwrap();
        let sa2: device::Name = "mid/tm_subarray_node/2".parse().unwrap();
        let attr: device::Attr = "obsState".parse().unwrap();

        // Unrestricted queries match the oldest event.

        assert_eq!(
            Query::new()
                .find_in(&state.buffer)
                .map(|e| e.reading.value),
            Some(device::Value::Obs(ObsState::Empty))
        );

        // Value restriction.

        assert!(Query::new()
            .value(ObsState::Idle)
            .find_in(&state.buffer)
            .is_some());
        assert!(Query::new()
            .value(ObsState::Scanning)
            .find_in(&state.buffer)
            .is_none());

        // Device restriction distinguishes the two subarrays.

        assert!(Query::new()
            .device(&sa2)
            .value(ObsState::Empty)
            .find_in(&state.buffer)
            .is_some());
        assert!(Query::new()
            .device(&sa2)
            .value(ObsState::Idle)
            .find_in(&state.buffer)
            .is_none());

        // Transition queries use the per-attribute previous value;
        // subarray 2 reporting EMPTY in between doesn't break the
        // RESOURCING -> IDLE edge of subarray 1.

        assert!(Query::new()
            .device(&sa1)
            .attr(&attr)
            .previous(ObsState::Resourcing)
            .value(ObsState::Idle)
            .find_in(&state.buffer)
            .is_some());
        assert!(Query::new()
            .device(&sa1)
            .previous(ObsState::Empty)
            .value(ObsState::Idle)
            .find_in(&state.buffer)
            .is_none());

        // The first event of an attribute has no previous value.

        assert!(Query::new()
            .device(&sa2)
            .previous(ObsState::Empty)
            .find_in(&state.buffer)
            .is_none());
    }

    #[test]
    fn test_lookahead() {
        let state = filled_state();

        // The EMPTY event of subarray 1 is the oldest of four; a
        // lookahead of 2 no longer sees it.

        let sa1: device::Name = "mid/tm_subarray_node/1".parse().unwrap();

        assert!(Query::new()
            .device(&sa1)
            .value(ObsState::Empty)
            .find_in(&state.buffer)
            .is_some());
        assert!(Query::new()
            .device(&sa1)
            .value(ObsState::Empty)
            .lookahead(2)
            .find_in(&state.buffer)
            .is_none());
        assert!(Query::new()
            .device(&sa1)
            .value(ObsState::Idle)
            .lookahead(2)
            .find_in(&state.buffer)
            .is_some());

        // A lookahead longer than the buffer sees everything.

        assert!(Query::new()
            .value(ObsState::Empty)
            .lookahead(100)
            .find_in(&state.buffer)
            .is_some());
    }

    #[test]
    fn test_eviction() {
        let mut state = State::create(2);

        state.record(event(
            "mid/tm_subarray_node/1",
            "obsState",
            device::Value::Obs(ObsState::Empty),
        ));
        state.record(event(
            "mid/tm_subarray_node/1",
            "obsState",
            device::Value::Obs(ObsState::Resourcing),
        ));
        state.record(event(
            "mid/tm_subarray_node/1",
            "obsState",
            device::Value::Obs(ObsState::Idle),
        ));

        assert_eq!(state.buffer.len(), 2);

        // The EMPTY event was evicted...

        assert!(Query::new()
            .value(ObsState::Empty)
            .find_in(&state.buffer)
            .is_none());

        // ...but the RESOURCING -> IDLE transition survives, and the
        // evicted value is still the previous value of the first
        // surviving event.

        assert!(Query::new()
            .previous(ObsState::Resourcing)
            .value(ObsState::Idle)
            .find_in(&state.buffer)
            .is_some());
        assert!(Query::new()
            .previous(ObsState::Empty)
            .value(ObsState::Resourcing)
            .find_in(&state.buffer)
            .is_some());
    }

    #[test]
    fn test_query_display() {
        assert_eq!(format!("{}", Query::new()), "any event");

        let sa1: device::Name = "mid/tm_subarray_node/1".parse().unwrap();
        let attr: device::Attr = "obsState".parse().unwrap();
        let q = Query::new()
            .device(&sa1)
            .attr(&attr)
            .value(ObsState::Idle)
            .previous(ObsState::Resourcing);

        assert_eq!(
            format!("{}", q),
            "device mid/tm_subarray_node/1, attr obsState, value IDLE, \
             previous RESOURCING"
        );
    }
}
