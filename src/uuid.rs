// canbus-setup/src/uuid.rs
//
// Klipper CAN bus UUID discovery output.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Klipper UUID discovery.
//!
//! Klipper's `scripts/canbus_query.py <iface>` lists the unassigned nodes
//! on the bus, one per line:
//!
//! ```text
//! Found canbus_uuid=11aa22bb33cc, Application: Klipper
//! Found canbus_uuid=0e0d81e4210c, Application: CanBoot
//! Total 2 uuids found
//! ```
//!
//! A UUID is 12 hex digits (the 48-bit node id).

use itertools::Itertools;
use std::fmt;

/// Number of hex digits in a node UUID.
const UUID_LEN: usize = 12;

/// A node found on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanbusNode {
    /// The UUID, lower case hex
    pub uuid: String,
    /// The application running on the node, if reported
    pub application: Option<String>,
}

impl fmt::Display for CanbusNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.application {
            Some(app) => write!(f, "{} ({})", self.uuid, app),
            None => f.write_str(&self.uuid),
        }
    }
}

fn is_uuid(token: &str) -> bool {
    token.len() == UUID_LEN && hex::decode(token).is_ok()
}

/// Extracts the UUID-shaped tokens from the discovery output.
///
/// Each UUID is reported once, in order of first appearance.
pub fn parse_uuids(output: &str) -> Vec<CanbusNode> {
    output
        .lines()
        .flat_map(|line| {
            let application = line
                .split_once("Application:")
                .map(|(_, app)| app.trim().to_string())
                .filter(|app| !app.is_empty());

            line.split(|c: char| !c.is_ascii_alphanumeric())
                .filter(|tok| is_uuid(tok))
                .map(move |tok| CanbusNode {
                    uuid: tok.to_ascii_lowercase(),
                    application: application.clone(),
                })
                .collect::<Vec<_>>()
        })
        .unique_by(|node| node.uuid.clone())
        .collect()
}

/////////////////////////////////////////////////////////////////////////////
