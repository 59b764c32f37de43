//! Unity engine versions.
//!
//! Every format revision decision in the asset formats ("this field exists from 2019.3 onward")
//! is made against an [`EngineVersion`], which is an ordered 5-tuple:
//!
//! | Component       | Example (`2019.4.3f1`) | Notes                                             |
//! |-----------------|------------------------|---------------------------------------------------|
//! | Major           | `2019`                 |                                                   |
//! | Minor           | `4`                    |                                                   |
//! | Build           | `3`                    |                                                   |
//! | Release kind    | `f`                    | `a` < `b` < `c` < `f` < `p` < `x`                 |
//! | Release number  | `1`                    |                                                   |
//!
//! Comparisons are lexicographic over the tuple, so `2019.10.0f1` is newer than `2019.9.0f1`.
//!
//! The schema dictionary stores versions packed into a single `u64`:
//! `major << 48 | minor << 32 | build << 16 | kind << 8 | number`.

pub mod error;
mod parse;

use derive_more::Display;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The release channel a version was published on
#[derive(Display, Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ReleaseKind {
    /// `a`
    #[display("a")]
    Alpha = 0,

    /// `b`
    #[display("b")]
    Beta = 1,

    /// `c`, used by the China specific releases
    #[display("c")]
    China = 2,

    /// `f`
    #[default]
    #[display("f")]
    Final = 3,

    /// `p`
    #[display("p")]
    Patch = 4,

    /// `x`
    #[display("x")]
    Experimental = 5,

    /// Any tag this library doesn't know about
    #[display("u")]
    Unknown = 255,
}

impl ReleaseKind {
    /// Map a release letter to its kind
    pub fn from_tag(tag: char) -> Self {
        match tag {
            'a' => ReleaseKind::Alpha,
            'b' => ReleaseKind::Beta,
            'c' => ReleaseKind::China,
            'f' => ReleaseKind::Final,
            'p' => ReleaseKind::Patch,
            'x' => ReleaseKind::Experimental,
            _ => ReleaseKind::Unknown,
        }
    }
}

impl From<u8> for ReleaseKind {
    fn from(value: u8) -> Self {
        match value {
            0 => ReleaseKind::Alpha,
            1 => ReleaseKind::Beta,
            2 => ReleaseKind::China,
            3 => ReleaseKind::Final,
            4 => ReleaseKind::Patch,
            5 => ReleaseKind::Experimental,
            _ => ReleaseKind::Unknown,
        }
    }
}

/// A Unity engine version such as `2019.4.3f1`
#[derive(Display, Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{major}.{minor}.{build}{kind}{number}")]
pub struct EngineVersion {
    /// Major version, the release year for modern versions
    pub major: u16,

    /// Minor version
    pub minor: u16,

    /// Build version
    pub build: u16,

    /// Release channel
    pub kind: ReleaseKind,

    /// Release number within the channel
    pub number: u8,
}

impl EngineVersion {
    /// Create a final release version
    pub const fn new(major: u16, minor: u16, build: u16) -> Self {
        Self {
            major,
            minor,
            build,
            kind: ReleaseKind::Final,
            number: 0,
        }
    }

    /// Create a version with an explicit release kind and number
    pub const fn with_release(
        major: u16,
        minor: u16,
        build: u16,
        kind: ReleaseKind,
        number: u8,
    ) -> Self {
        Self {
            major,
            minor,
            build,
            kind,
            number,
        }
    }

    /// Parse an engine version string such as `2019.4.3f1`
    ///
    /// Trailing text after the release number (`2022.3.10f1c1`, `2018.4.2f1\n2`) is ignored and
    /// `x` components (`5.x.x`) are read as `0`.
    pub fn parse(value: &str) -> Result<Self> {
        parse::engine_version(value).ok_or_else(|| Error::InvalidVersion(value.to_owned()))
    }

    /// Unpack a version stored as a single `u64`
    pub fn from_packed(value: u64) -> Self {
        Self {
            major: (value >> 48) as u16,
            minor: (value >> 32) as u16,
            build: (value >> 16) as u16,
            kind: ReleaseKind::from((value >> 8) as u8),
            number: value as u8,
        }
    }

    /// Pack this version into a single `u64`
    pub fn to_packed(&self) -> u64 {
        (self.major as u64) << 48
            | (self.minor as u64) << 32
            | (self.build as u64) << 16
            | (self.kind as u64) << 8
            | self.number as u64
    }

    /// Whether the version carries no information, as written by stripped builds
    pub fn is_stripped(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.build == 0
    }
}

impl FromStr for EngineVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<(u16, u16, u16)> for EngineVersion {
    fn from((major, minor, build): (u16, u16, u16)) -> Self {
        Self::new(major, minor, build)
    }
}
