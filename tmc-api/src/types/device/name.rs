use crate::{types::Error, Result};
use serde_derive::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Deserialize, Hash, Eq)]
struct Segment(String);

impl Segment {
    // Returns `true` if the character can be used in a segment of a
    // device name. Dashes and underscores are interior characters
    // only.

    fn is_valid_char((idx, ch): (usize, char), len: usize) -> bool {
        ch.is_ascii_alphanumeric()
            || ((ch == '-' || ch == '_') && idx != 0 && idx != len - 1)
    }

    // Creates a `Segment`, if the string contains a well-formed
    // segment name.

    fn create(s: &str) -> Result<Self> {
        if !s.is_empty() {
            if s.chars()
                .enumerate()
                .all(|v| Segment::is_valid_char(v, s.len()))
            {
                Ok(Segment(String::from(s)))
            } else {
                Err(Error::InvArgument(String::from(
                    "segment contains invalid character",
                )))
            }
        } else {
            Err(Error::InvArgument(String::from(
                "contains zero-length segment",
            )))
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0)
    }
}

/// Holds a validated device name. A device name has exactly three
/// segments -- domain, family, and member -- separated by forward
/// slashes. Each segment is composed of alphanumeric, dash, and
/// underscore characters, where the dash and underscore cannot be the
/// first or last character.
///
/// More formally:
///
/// ```ignore
/// DEVICE-NAME = DOMAIN '/' FAMILY '/' MEMBER
/// DOMAIN = FAMILY = MEMBER = SEGMENT
/// SEGMENT = [0-9a-zA-Z] ( [0-9a-zA-Z_-]* [0-9a-zA-Z] )?
/// ```
///
/// The three levels are a naming convention of the remote control
/// system; the harness never interprets them. They do, however, keep
/// log and error output readable, so the harness validates names
/// eagerly instead of passing raw strings to the transport.

#[derive(Debug, PartialEq, Hash, Eq, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Name {
    domain: Segment,
    family: Segment,
    member: Segment,
}

impl Name {
    /// Creates an instance of `Name`, if the provided string
    /// describes a well-formed device name.

    pub fn create(s: &str) -> Result<Name> {
        match s
            .split('/')
            .map(Segment::create)
            .collect::<Result<Vec<Segment>>>()
        {
            Ok(segments) if segments.len() == 3 => Ok(Name {
                domain: segments[0].clone(),
                family: segments[1].clone(),
                member: segments[2].clone(),
            }),
            Ok(_) => Err(Error::InvArgument(String::from(
                "device name requires domain, family, and member segments",
            ))),
            Err(e) => Err(e),
        }
    }

    /// Returns the full name of one of the device's attributes.

    pub fn attr(&self, attr: &Attr) -> FullName {
        FullName {
            device: self.clone(),
            attr: attr.clone(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", &self.domain, &self.family, &self.member)
    }
}

// This trait is defined so the .TOML parser can read device names
// from string fields. Without it, the parser would want a table with
// the three segment fields spelled out.

impl TryFrom<&str> for Name {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Name::create(s)
    }
}

impl TryFrom<String> for Name {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Name::create(&s)
    }
}

// This trait allows one to use `.parse::<Name>()`.

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Name::create(s)
    }
}

/// Holds a validated attribute name: a single segment with the same
/// character set as the segments of a device name. Attribute names
/// are matched case-sensitively.

#[derive(Debug, PartialEq, Hash, Eq, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Attr(Segment);

impl Attr {
    pub fn create(s: &str) -> Result<Self> {
        Segment::create(s).map(Attr)
    }

    // The well-known attributes the synchronization layer builds its
    // conditions on. The spellings are fixed by the remote control
    // system.

    pub fn obs_state() -> Attr {
        Attr(Segment(String::from("obsState")))
    }

    pub fn telescope_state() -> Attr {
        Attr(Segment(String::from("telescopeState")))
    }

    pub fn dish_mode() -> Attr {
        Attr(Segment(String::from("dishMode")))
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl TryFrom<&str> for Attr {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Attr::create(s)
    }
}

impl TryFrom<String> for Attr {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Attr::create(&s)
    }
}

impl FromStr for Attr {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Attr::create(s)
    }
}

/// A device name paired with one of its attributes. Used wherever a
/// single value has to identify the source of a reading -- error
/// texts, trace output, and event buffers.

#[derive(Debug, PartialEq, Hash, Eq, Clone)]
pub struct FullName {
    pub device: Name,
    pub attr: Attr,
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", &self.device, &self.attr)
    }
}

impl FromStr for FullName {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.rsplit_once('/') {
            Some((dev, attr)) => Ok(FullName {
                device: Name::create(dev)?,
                attr: Attr::create(attr)?,
            }),
            None => Err(Error::InvArgument(String::from(
                "full name requires a device name and an attribute",
            ))),
        }
    }
}
