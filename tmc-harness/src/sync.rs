//! Ties telescope operations to the wait conditions that prove they
//! completed.
//!
//! Every command the harness issues has a known footprint: the
//! observation states a subarray must be in for the command to be
//! legal, and the states the affected devices settle in once the
//! operation finishes. This module owns those tables. The node
//! façades never spell out conditions themselves; they run their
//! commands through a `SyncGuard`, which checks the preconditions,
//! issues the command, and blocks on the postconditions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tmc_api::{
    device,
    state::{DishMode, ObsState, TelescopeState},
    Error, Result,
};
use tokio::time::Duration;
use tracing::debug;

use crate::config::{Layout, Subarray};
use crate::pool::Pool;
use crate::waiter::Waiter;

/// The telescope operations the harness can synchronize on.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    TelescopeOn,
    TelescopeOff,
    TelescopeStandby,
    AssignResources,
    ReleaseResources,
    Configure,
    Scan,
    EndScan,
    End,
    Abort,
    Restart,
    ObsReset,
}

impl Operation {
    /// The command name the operation maps to on the wire.

    pub fn command(&self) -> &'static str {
        match self {
            Operation::TelescopeOn => "TelescopeOn",
            Operation::TelescopeOff => "TelescopeOff",
            Operation::TelescopeStandby => "TelescopeStandby",
            Operation::AssignResources => "AssignResources",
            Operation::ReleaseResources => "ReleaseResources",
            Operation::Configure => "Configure",
            Operation::Scan => "Scan",
            Operation::EndScan => "EndScan",
            Operation::End => "End",
            Operation::Abort => "Abort",
            Operation::Restart => "Restart",
            Operation::ObsReset => "ObsReset",
        }
    }

    // Observation states a subarray may be in when the operation is
    // issued. `None` means the operation has no obsState
    // precondition (the telescope-wide commands.)

    fn allowed_from(&self) -> Option<&'static [ObsState]> {
        use ObsState::*;

        match self {
            Operation::TelescopeOn
            | Operation::TelescopeOff
            | Operation::TelescopeStandby => None,
            Operation::AssignResources => Some(&[Empty, Idle]),
            Operation::ReleaseResources => Some(&[Idle]),
            Operation::Configure => Some(&[Idle, Ready]),
            Operation::Scan => Some(&[Ready]),
            Operation::EndScan => Some(&[Scanning]),
            Operation::End => Some(&[Ready]),
            Operation::Abort => {
                Some(&[Resourcing, Idle, Configuring, Ready, Scanning, Resetting])
            }
            Operation::Restart => Some(&[Aborted, Fault]),
            Operation::ObsReset => Some(&[Aborted, Fault]),
        }
    }

    // The observation state the subarray devices settle in once the
    // operation completes. `None` for the telescope-wide commands,
    // whose postconditions aren't obsState-shaped.

    fn settles_in(&self) -> Option<ObsState> {
        match self {
            Operation::TelescopeOn
            | Operation::TelescopeOff
            | Operation::TelescopeStandby => None,
            Operation::AssignResources => Some(ObsState::Idle),
            Operation::ReleaseResources => Some(ObsState::Empty),
            Operation::Configure => Some(ObsState::Ready),
            Operation::Scan => Some(ObsState::Scanning),
            Operation::EndScan => Some(ObsState::Ready),
            Operation::End => Some(ObsState::Idle),
            Operation::Abort => Some(ObsState::Aborted),
            Operation::Restart => Some(ObsState::Empty),
            Operation::ObsReset => Some(ObsState::Idle),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

// Adds the conditions requiring the subarray node and both its leaf
// nodes to reach `target`.

fn obs_conditions(waiter: Waiter, sa: &Subarray, target: ObsState) -> Waiter {
    let attr = device::Attr::obs_state();

    waiter
        .wait_for(&sa.node, &attr, target)
        .wait_for(&sa.csp_leaf, &attr, target)
        .wait_for(&sa.sdp_leaf, &attr, target)
}

/// Builds the postcondition set of an operation. Subarray-scoped
/// operations need the subarray; the telescope-wide ones ignore it.

pub fn postconditions(
    op: Operation,
    layout: &Layout,
    subarray: Option<&Subarray>,
) -> Result<Waiter> {
    if let Some(target) = op.settles_in() {
        let sa = subarray.ok_or_else(|| {
            Error::InvArgument(format!(
                "{} needs a subarray to synchronize on",
                op
            ))
        })?;

        return Ok(obs_conditions(Waiter::new(), sa, target));
    }

    // The telescope-wide operations settle the central node's
    // telescopeState and move every dish master.

    let (telescope, dish) = match op {
        Operation::TelescopeOn => (TelescopeState::On, DishMode::Operate),
        Operation::TelescopeOff => (TelescopeState::Off, DishMode::StandbyLp),
        Operation::TelescopeStandby => {
            (TelescopeState::Standby, DishMode::StandbyLp)
        }
        _ => unreachable!(),
    };

    let mut waiter = Waiter::new().wait_for(
        layout.central_node(),
        &device::Attr::telescope_state(),
        telescope,
    );

    for dn in &layout.dish {
        waiter = waiter.wait_for(dn, &device::Attr::dish_mode(), dish)
    }

    Ok(waiter)
}

/// Runs operations with their synchronization: precondition check,
/// command, postcondition wait.

#[derive(Clone)]
pub struct SyncGuard {
    pool: Pool,
    layout: Arc<Layout>,
    timeout: Duration,
}

impl SyncGuard {
    pub fn new(pool: Pool, layout: Arc<Layout>, timeout: Duration) -> Self {
        SyncGuard {
            pool,
            layout,
            timeout,
        }
    }

    // Verifies the subarray is in a state the operation may be
    // issued from. A failed check reports `Rejected` immediately
    // instead of letting the postcondition wait run out the clock.

    async fn check_preconditions(
        &self,
        op: Operation,
        subarray: Option<&Subarray>,
    ) -> Result<()> {
        let states = match op.allowed_from() {
            Some(states) => states,
            None => return Ok(()),
        };
        let sa = subarray.ok_or_else(|| {
            Error::InvArgument(format!(
                "{} needs a subarray to synchronize on",
                op
            ))
        })?;

        let proxy = self.pool.proxy(&sa.node).await?;
        let reading =
            proxy.read_attribute(&device::Attr::obs_state()).await?;
        let current = ObsState::try_from(reading.value)?;

        if states.contains(&current) {
            Ok(())
        } else {
            Err(Error::Rejected(format!(
                "{} is not legal while {} is {}",
                op, &sa.node, current
            )))
        }
    }

    /// Runs one synchronized operation. `cmd` is the future that
    /// issues the command -- it is only awaited once the
    /// preconditions have been verified.

    pub async fn run<T, F>(
        &self,
        op: Operation,
        subarray: Option<usize>,
        cmd: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let sa = match subarray {
            Some(id) => Some(self.layout.subarray(id)?.clone()),
            None => None,
        };

        self.check_preconditions(op, sa.as_ref()).await?;

        let waiter = postconditions(op, &self.layout, sa.as_ref())?;
        let reply = cmd.await?;

        debug!("{}: command accepted, awaiting {} conditions", op, waiter.len());

        waiter.wait_all(&self.pool, self.timeout).await?;
        debug!("{}: synchronized", op);
        Ok(reply)
    }
}
