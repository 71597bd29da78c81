// canbus-setup/src/link.rs
//
// Parsing of the link details printed by 'ip'.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Link status.
//!
//! The live state of the interface is read from the output of
//! `ip -details -statistics link show <iface>`, which looks like:
//!
//! ```text
//! 3: can0: <NOARP,UP,LOWER_UP,ECHO> mtu 16 qdisc pfifo_fast state UP mode DEFAULT group default qlen 1024
//!     link/can  promiscuity 0 minmtu 0 maxmtu 0
//!     can state ERROR-ACTIVE (berr-counter tx 0 rx 0) restart-ms 0
//!           bitrate 1000000 sample-point 0.875
//! ```

use crate::params::PersistedParameters;
use itertools::Itertools;
use std::fmt;

/// The details of the interface that matter for CAN setup.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LinkStatus {
    /// The interface flags, like `UP` and `LOWER_UP`
    pub flags: Vec<String>,
    /// Whether the interface is administratively up
    pub is_up: bool,
    /// The operational state, like `UP` or `DOWN`
    pub state: Option<String>,
    /// The transmit queue length
    pub qlen: Option<u32>,
    /// The CAN controller state, like `ERROR-ACTIVE` or `BUS-OFF`
    pub can_state: Option<String>,
    /// The configured bitrate
    pub bitrate: Option<u32>,
    /// The sample point, as a fraction
    pub sample_point: Option<f32>,
}

impl LinkStatus {
    /// Parses the output of `ip -details link show`.
    pub fn parse(text: &str) -> Self {
        let mut status = Self::default();

        if let Some(flags) = text
            .split_once('<')
            .and_then(|(_, rest)| rest.split_once('>'))
            .map(|(flags, _)| flags)
        {
            status.flags = flags
                .split(',')
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
        }
        status.is_up = status.flags.iter().any(|f| f == "UP");

        for line in text.lines() {
            let is_can_line = line.trim_start().starts_with("can ");

            for (key, val) in line.split_whitespace().tuple_windows() {
                match key {
                    // "state" on the "can" line is the controller state
                    "state" if is_can_line => {
                        status.can_state.get_or_insert_with(|| val.to_string());
                    }
                    "state" => {
                        status.state.get_or_insert_with(|| val.to_string());
                    }
                    "qlen" => status.qlen = status.qlen.or(val.parse().ok()),
                    "bitrate" => status.bitrate = status.bitrate.or(val.parse().ok()),
                    "sample-point" => {
                        status.sample_point = status.sample_point.or(val.parse().ok())
                    }
                    _ => (),
                }
            }
        }
        status
    }

    /// Whether the live bitrate and queue length equal the persisted ones.
    ///
    /// Values missing on either side don't compare equal.
    pub fn agrees_with(&self, persisted: &PersistedParameters) -> bool {
        self.bitrate.is_some()
            && self.qlen.is_some()
            && self.bitrate == persisted.bitrate_value()
            && self.qlen == persisted.txqueuelen_value()
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn opt<T: fmt::Display>(val: &Option<T>) -> String {
            val.as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unknown".into())
        }

        writeln!(
            f,
            "link:       {} (state {})",
            if self.is_up { "up" } else { "down" },
            opt(&self.state)
        )?;
        writeln!(f, "flags:      {}", self.flags.iter().join(","))?;
        writeln!(f, "can state:  {}", opt(&self.can_state))?;
        writeln!(f, "bitrate:    {}", opt(&self.bitrate))?;
        writeln!(f, "sample pt:  {}", opt(&self.sample_point))?;
        write!(f, "txqueuelen: {}", opt(&self.qlen))
    }
}

/////////////////////////////////////////////////////////////////////////////
