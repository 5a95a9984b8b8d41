//! An in-process, scripted stand-in for the remote control system.
//!
//! Each test declares the devices that exist, their initial attribute
//! values, and a script per command: the attribute changes the
//! command causes, with delays between them. Commands return
//! immediately and the script plays out in the background, which is
//! exactly the asynchronous shape the harness exists to synchronize
//! with.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tmc_api::{
    device,
    state::{DishMode, ObsState, TelescopeState},
    transport::{Connection, EventStream, Transport},
    Error, Result,
};
use tmc_harness::config::{Layout, Subarray};
use tmc_harness::pool::Pool;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;

// How long the scripts linger in transitional states.

pub const STEP_DELAY: Duration = Duration::from_millis(20);

/// One effect of a command script.

#[derive(Clone)]
pub enum Step {
    Set(device::Name, device::Attr, device::Value),
    Delay(Duration),
}

struct Inner {
    devices: HashSet<device::Name>,
    attrs: HashMap<device::FullName, device::Value>,
    subs: HashMap<device::FullName, Vec<mpsc::UnboundedSender<device::Event>>>,
    scripts: HashMap<(device::Name, String), Arc<Vec<Step>>>,
}

pub struct SimSystem {
    state: Mutex<Inner>,
}

impl SimSystem {
    pub fn new() -> Arc<Self> {
        Arc::new(SimSystem {
            state: Mutex::new(Inner {
                devices: HashSet::new(),
                attrs: HashMap::new(),
                subs: HashMap::new(),
                scripts: HashMap::new(),
            }),
        })
    }

    /// Sets an attribute and delivers the change to every open
    /// subscription. The device is registered on first use.

    pub fn set_attr(
        &self,
        name: &device::Name,
        attr: &device::Attr,
        value: device::Value,
    ) {
        let mut inner = self.state.lock().unwrap();
        let full = name.attr(attr);

        inner.devices.insert(name.clone());
        inner.attrs.insert(full.clone(), value.clone());

        let event = device::Event {
            device: name.clone(),
            attr: attr.clone(),
            reading: device::Reading {
                ts: Utc::now(),
                value,
            },
        };

        if let Some(subs) = inner.subs.get_mut(&full) {
            subs.retain(|tx| tx.send(event.clone()).is_ok())
        }
    }

    /// Registers the script a device plays when it receives a
    /// command.

    pub fn script(&self, name: &device::Name, cmd: &str, steps: Vec<Step>) {
        let mut inner = self.state.lock().unwrap();

        inner
            .scripts
            .insert((name.clone(), String::from(cmd)), Arc::new(steps));
    }
}

struct SimConnection {
    sys: Arc<SimSystem>,
    device: device::Name,
}

#[async_trait]
impl Connection for SimConnection {
    async fn command(
        &self,
        cmd: &str,
        _arg: Option<device::Value>,
    ) -> Result<Option<device::Value>> {
        let steps = {
            let inner = self.sys.state.lock().unwrap();

            inner
                .scripts
                .get(&(self.device.clone(), String::from(cmd)))
                .cloned()
        };

        match steps {
            Some(steps) => {
                let sys = self.sys.clone();

                tokio::spawn(async move {
                    for step in steps.iter() {
                        match step {
                            Step::Delay(d) => tokio::time::sleep(*d).await,
                            Step::Set(dn, attr, v) => {
                                sys.set_attr(dn, attr, v.clone())
                            }
                        }
                    }
                });
                Ok(None)
            }
            None => {
                Err(Error::Rejected(String::from("command not supported")))
            }
        }
    }

    async fn read_attribute(
        &self,
        attr: &device::Attr,
    ) -> Result<device::Reading> {
        let inner = self.sys.state.lock().unwrap();

        match inner.attrs.get(&self.device.attr(attr)) {
            Some(value) => Ok(device::Reading {
                ts: Utc::now(),
                value: value.clone(),
            }),
            None => Err(Error::NotFound),
        }
    }

    async fn subscribe(&self, attr: &device::Attr) -> Result<EventStream> {
        let mut inner = self.sys.state.lock().unwrap();
        let full = self.device.attr(attr);
        let current = match inner.attrs.get(&full) {
            Some(value) => value.clone(),
            None => return Err(Error::NotFound),
        };
        let (tx, rx) = mpsc::unbounded_channel();

        // Replay the current value as the subscription's first event.

        let _ = tx.send(device::Event {
            device: self.device.clone(),
            attr: attr.clone(),
            reading: device::Reading {
                ts: Utc::now(),
                value: current,
            },
        });
        inner.subs.entry(full).or_default().push(tx);

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

pub struct SimTransport(pub Arc<SimSystem>);

#[async_trait]
impl Transport for SimTransport {
    async fn connect(
        &self,
        device: &device::Name,
    ) -> Result<Arc<dyn Connection>> {
        if self.0.state.lock().unwrap().devices.contains(device) {
            Ok(Arc::new(SimConnection {
                sys: self.0.clone(),
                device: device.clone(),
            }))
        } else {
            Err(Error::NotFound)
        }
    }
}

/// A ready-to-drive mid deployment: scripted devices behind a pool.

pub struct Mid {
    pub sys: Arc<SimSystem>,
    pub pool: Pool,
    pub layout: Arc<Layout>,
}

// The three observation-state holders of a subarray all move
// together in the scripts.

fn trio(sa: &Subarray, target: ObsState) -> Vec<Step> {
    let attr = device::Attr::obs_state();

    vec![
        Step::Set(sa.node.clone(), attr.clone(), target.into()),
        Step::Set(sa.csp_leaf.clone(), attr.clone(), target.into()),
        Step::Set(sa.sdp_leaf.clone(), attr.clone(), target.into()),
    ]
}

fn obs_script(sa: &Subarray, transient: ObsState, settled: ObsState) -> Vec<Step> {
    let mut steps = trio(sa, transient);

    steps.push(Step::Delay(STEP_DELAY));
    steps.extend(trio(sa, settled));
    steps
}

/// Builds the standard scripted deployment from a layout: telescope
/// off, subarrays empty, dishes in low-power standby, every
/// operation's script registered.

pub fn mid_system_with(layout: Layout) -> Mid {
    let sys = SimSystem::new();
    let layout = Arc::new(layout);
    let central = layout.central_node();
    let ts_attr = device::Attr::telescope_state();
    let dm_attr = device::Attr::dish_mode();

    sys.set_attr(central, &ts_attr, TelescopeState::Off.into());

    for dn in &layout.dish {
        sys.set_attr(dn, &dm_attr, DishMode::StandbyLp.into())
    }

    // The telescope-wide scripts: dishes first, then the central
    // node's summary state.

    for (cmd, ts, dm) in [
        ("TelescopeOn", TelescopeState::On, DishMode::Operate),
        ("TelescopeOff", TelescopeState::Off, DishMode::StandbyLp),
        ("TelescopeStandby", TelescopeState::Standby, DishMode::StandbyLp),
    ] {
        let mut steps = vec![Step::Delay(STEP_DELAY)];

        for dn in &layout.dish {
            steps.push(Step::Set(dn.clone(), dm_attr.clone(), dm.into()))
        }
        steps.push(Step::Delay(STEP_DELAY));
        steps.push(Step::Set(central.clone(), ts_attr.clone(), ts.into()));
        sys.script(central, cmd, steps);
    }

    for sa in &layout.subarray {
        for dn in [&sa.node, &sa.csp_leaf, &sa.sdp_leaf] {
            sys.set_attr(dn, &device::Attr::obs_state(), ObsState::Empty.into())
        }

        // Resource management commands arrive at the central node...

        sys.script(
            central,
            "AssignResources",
            obs_script(sa, ObsState::Resourcing, ObsState::Idle),
        );
        sys.script(
            central,
            "ReleaseResources",
            obs_script(sa, ObsState::Resourcing, ObsState::Empty),
        );

        // ...observation control at the subarray node.

        sys.script(
            &sa.node,
            "Configure",
            obs_script(sa, ObsState::Configuring, ObsState::Ready),
        );
        sys.script(&sa.node, "Scan", trio(sa, ObsState::Scanning));
        sys.script(&sa.node, "EndScan", trio(sa, ObsState::Ready));
        sys.script(&sa.node, "End", trio(sa, ObsState::Idle));
        sys.script(
            &sa.node,
            "Abort",
            obs_script(sa, ObsState::Aborting, ObsState::Aborted),
        );
        sys.script(
            &sa.node,
            "Restart",
            obs_script(sa, ObsState::Restarting, ObsState::Empty),
        );
        sys.script(
            &sa.node,
            "ObsReset",
            obs_script(sa, ObsState::Resetting, ObsState::Idle),
        );
    }

    let pool = Pool::new(Arc::new(SimTransport(sys.clone())));

    Mid { sys, pool, layout }
}

pub fn mid_system() -> Mid {
    mid_system_with(Layout::default())
}
