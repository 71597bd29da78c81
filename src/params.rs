// canbus-setup/src/params.rs
//
// The CAN interface parameters that can be configured.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Interface parameters.
//!
//! Both the bitrate and the transmit queue length are picked from small,
//! fixed sets of values. The [`Bitrate`] and [`TxQueueLen`] types can only
//! hold members of those sets, so a value that made it into one of them
//! is always safe to write into a configuration file.

use crate::errors::{Error, Result};
use std::{fmt, str::FromStr};

/// The bitrates that can be configured, in bits per second.
pub const BITRATES: [u32; 8] = [
    125_000, 250_000, 375_000, 500_000, 625_000, 750_000, 875_000, 1_000_000,
];

/// The transmit queue lengths that can be configured, in frames.
pub const TXQUEUELENS: [u32; 8] = [128, 256, 384, 512, 640, 768, 896, 1024];

/// Looks up `val` in a choice set.
fn choose(set: &[u32], what: &'static str, val: u32) -> Result<u32> {
    if set.contains(&val) {
        Ok(val)
    } else {
        Err(Error::InvalidChoice {
            what,
            value: val.to_string(),
        })
    }
}

fn parse_choice(set: &[u32], what: &'static str, s: &str) -> Result<u32> {
    let val = s.trim().parse::<u32>().map_err(|_| Error::InvalidChoice {
        what,
        value: s.trim().to_string(),
    })?;
    choose(set, what, val)
}

// ===== Bitrate =====

/// A CAN bus bitrate from the [`BITRATES`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bitrate(u32);

impl Bitrate {
    /// The bitrate Klipper documentation recommends.
    pub const DEFAULT: Bitrate = Bitrate(1_000_000);

    /// All of the bitrates that can be chosen, slowest first.
    pub fn all() -> impl Iterator<Item = Bitrate> {
        BITRATES.iter().map(|&b| Bitrate(b))
    }

    /// The bitrate in bits per second.
    pub fn bps(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = Error;

    fn try_from(val: u32) -> Result<Self> {
        choose(&BITRATES, "bitrate", val).map(Bitrate)
    }
}

impl FromStr for Bitrate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(&BITRATES, "bitrate", s).map(Bitrate)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== TxQueueLen =====

/// A transmit queue length from the [`TXQUEUELENS`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxQueueLen(u32);

impl TxQueueLen {
    /// The queue length Klipper documentation recommends.
    pub const DEFAULT: TxQueueLen = TxQueueLen(1024);

    /// All of the queue lengths that can be chosen, shortest first.
    pub fn all() -> impl Iterator<Item = TxQueueLen> {
        TXQUEUELENS.iter().map(|&q| TxQueueLen(q))
    }

    /// The queue length in frames.
    pub fn frames(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for TxQueueLen {
    type Error = Error;

    fn try_from(val: u32) -> Result<Self> {
        choose(&TXQUEUELENS, "txqueuelen", val).map(TxQueueLen)
    }
}

impl FromStr for TxQueueLen {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(&TXQUEUELENS, "txqueuelen", s).map(TxQueueLen)
    }
}

impl fmt::Display for TxQueueLen {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== DesiredParameters =====

/// The parameters the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredParameters {
    /// The bus bitrate
    pub bitrate: Bitrate,
    /// The transmit queue length
    pub txqueuelen: TxQueueLen,
}

impl DesiredParameters {
    /// Creates a new set of parameters.
    pub fn new(bitrate: Bitrate, txqueuelen: TxQueueLen) -> Self {
        Self {
            bitrate,
            txqueuelen,
        }
    }
}

impl Default for DesiredParameters {
    fn default() -> Self {
        Self::new(Bitrate::DEFAULT, TxQueueLen::DEFAULT)
    }
}

// ===== PersistedParameters =====

/// The parameters found in configuration files on disk.
///
/// The values are kept as the raw numeric text from the files, since
/// they are compared against what was written character for character.
/// Either one is `None` when the file or the pattern was not found.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistedParameters {
    /// The bitrate text, if found
    pub bitrate: Option<String>,
    /// The transmit queue length text, if found
    pub txqueuelen: Option<String>,
}

impl PersistedParameters {
    /// Whether these are exactly the `desired` parameters.
    pub fn matches(&self, desired: &DesiredParameters) -> bool {
        self.bitrate.as_deref() == Some(desired.bitrate.to_string().as_str())
            && self.txqueuelen.as_deref() == Some(desired.txqueuelen.to_string().as_str())
    }

    /// The bitrate as a number, if it was found and is numeric.
    pub fn bitrate_value(&self) -> Option<u32> {
        self.bitrate.as_deref().and_then(|s| s.parse().ok())
    }

    /// The queue length as a number, if it was found and is numeric.
    pub fn txqueuelen_value(&self) -> Option<u32> {
        self.txqueuelen.as_deref().and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for PersistedParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "bitrate {}, txqueuelen {}",
            self.bitrate.as_deref().unwrap_or("<missing>"),
            self.txqueuelen.as_deref().unwrap_or("<missing>")
        )
    }
}

/////////////////////////////////////////////////////////////////////////////
