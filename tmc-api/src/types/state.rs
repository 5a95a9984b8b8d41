//! Defines the state machines published by the remote control
//! system. The harness doesn't drive these machines -- the device
//! servers do -- but it needs their vocabulary to express wait
//! conditions and to recognize illegal transitions in traced event
//! histories.

use crate::types::Error;
use serde_derive::Deserialize;
use std::fmt;
use std::str::FromStr;

/// The observation state machine published by subarray nodes and by
/// the CSP/SDP subarray leaf nodes. The canonical spellings are the
/// upper-case forms used on the wire.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "&str")]
pub enum ObsState {
    Empty,
    Resourcing,
    Idle,
    Configuring,
    Ready,
    Scanning,
    Aborting,
    Aborted,
    Resetting,
    Restarting,
    Fault,
}

impl ObsState {
    /// Returns `true` for states the machine passes through on its
    /// own. A device should never rest in one of these; a wait
    /// condition naming one is almost always a test-harness bug.

    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ObsState::Resourcing
                | ObsState::Configuring
                | ObsState::Aborting
                | ObsState::Resetting
                | ObsState::Restarting
        )
    }

    /// Returns `true` if the machine may move directly from `from` to
    /// `to`. Any state may fall into `Fault`.

    pub fn transition_allowed(from: ObsState, to: ObsState) -> bool {
        use ObsState::*;

        if to == Fault {
            return true;
        }

        match from {
            Empty => matches!(to, Resourcing),
            Resourcing => matches!(to, Idle | Empty | Aborting),
            Idle => matches!(to, Resourcing | Configuring | Empty | Aborting),
            Configuring => matches!(to, Ready | Aborting),
            Ready => matches!(to, Scanning | Configuring | Idle | Aborting),
            Scanning => matches!(to, Ready | Aborting),
            Aborting => matches!(to, Aborted),
            Aborted => matches!(to, Resetting | Restarting),
            Resetting => matches!(to, Idle | Aborting),
            Restarting => matches!(to, Empty),
            Fault => matches!(to, Resetting | Restarting),
        }
    }
}

impl fmt::Display for ObsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObsState::Empty => "EMPTY",
            ObsState::Resourcing => "RESOURCING",
            ObsState::Idle => "IDLE",
            ObsState::Configuring => "CONFIGURING",
            ObsState::Ready => "READY",
            ObsState::Scanning => "SCANNING",
            ObsState::Aborting => "ABORTING",
            ObsState::Aborted => "ABORTED",
            ObsState::Resetting => "RESETTING",
            ObsState::Restarting => "RESTARTING",
            ObsState::Fault => "FAULT",
        };

        write!(f, "{}", s)
    }
}

impl FromStr for ObsState {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "EMPTY" => Ok(ObsState::Empty),
            "RESOURCING" => Ok(ObsState::Resourcing),
            "IDLE" => Ok(ObsState::Idle),
            "CONFIGURING" => Ok(ObsState::Configuring),
            "READY" => Ok(ObsState::Ready),
            "SCANNING" => Ok(ObsState::Scanning),
            "ABORTING" => Ok(ObsState::Aborting),
            "ABORTED" => Ok(ObsState::Aborted),
            "RESETTING" => Ok(ObsState::Resetting),
            "RESTARTING" => Ok(ObsState::Restarting),
            "FAULT" => Ok(ObsState::Fault),
            _ => Err(Error::ParseError(format!("unknown obs state '{}'", s))),
        }
    }
}

impl TryFrom<&str> for ObsState {
    type Error = Error;

    fn try_from(s: &str) -> std::result::Result<Self, Error> {
        s.parse()
    }
}

/// The telescope-wide operational state published by the central
/// node. It summarizes the whole array, so it only changes after
/// every subsystem has reported in.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "&str")]
pub enum TelescopeState {
    On,
    Off,
    Standby,
    Unknown,
}

impl fmt::Display for TelescopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TelescopeState::On => "ON",
            TelescopeState::Off => "OFF",
            TelescopeState::Standby => "STANDBY",
            TelescopeState::Unknown => "UNKNOWN",
        };

        write!(f, "{}", s)
    }
}

impl FromStr for TelescopeState {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ON" => Ok(TelescopeState::On),
            "OFF" => Ok(TelescopeState::Off),
            "STANDBY" => Ok(TelescopeState::Standby),
            "UNKNOWN" => Ok(TelescopeState::Unknown),
            _ => Err(Error::ParseError(format!(
                "unknown telescope state '{}'",
                s
            ))),
        }
    }
}

impl TryFrom<&str> for TelescopeState {
    type Error = Error;

    fn try_from(s: &str) -> std::result::Result<Self, Error> {
        s.parse()
    }
}

/// The operating mode published by a dish master.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "&str")]
pub enum DishMode {
    StandbyLp,
    StandbyFp,
    Operate,
    Stow,
    Unknown,
}

impl fmt::Display for DishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DishMode::StandbyLp => "STANDBY_LP",
            DishMode::StandbyFp => "STANDBY_FP",
            DishMode::Operate => "OPERATE",
            DishMode::Stow => "STOW",
            DishMode::Unknown => "UNKNOWN",
        };

        write!(f, "{}", s)
    }
}

impl FromStr for DishMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "STANDBY_LP" => Ok(DishMode::StandbyLp),
            "STANDBY_FP" => Ok(DishMode::StandbyFp),
            "OPERATE" => Ok(DishMode::Operate),
            "STOW" => Ok(DishMode::Stow),
            "UNKNOWN" => Ok(DishMode::Unknown),
            _ => Err(Error::ParseError(format!("unknown dish mode '{}'", s))),
        }
    }
}

impl TryFrom<&str> for DishMode {
    type Error = Error;

    fn try_from(s: &str) -> std::result::Result<Self, Error> {
        s.parse()
    }
}
