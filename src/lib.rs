// canbus-setup/src/lib.rs
//
// The main library file for the CAN interface setup tool.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! CAN interface setup for Klipper.
//!
//! Klipper talks to toolhead boards over a CAN bus, which shows up on the
//! host as a SocketCAN network interface, usually `can0`. For that to work
//! the interface has to come up at boot with the right bitrate and a long
//! enough transmit queue. There are several ways of getting there on a
//! Debian-style host, and installing more than one of them at the same
//! time configures the interface twice, with possibly different values.
//!
//! This crate detects which of the known configuration schemes is
//! installed, writes a new one (cleaning up the others), verifies what was
//! written, and helps troubleshoot the bus.
//!
//! # Configuration schemes
//!
//! - [`Scheme::Legacy`]: an ifupdown file in `/etc/network/interfaces.d`,
//!   applied on the next reboot.
//! - [`Scheme::SchemeA`]: a systemd-networkd `.network` file for the
//!   bitrate and a udev rule for the queue length.
//! - [`Scheme::SchemeB`]: a systemd-networkd `.network` file for the
//!   bitrate and a oneshot service unit for the queue length.
//!
//! [`detect`] reports the installed scheme as a [`Detection`], including
//! partially installed and conflicting states.
//! [`apply_configuration`] writes a scheme and reads it back.
//!
//! # External programs
//!
//! All interaction with the host beyond the configuration files goes
//! through the [`System`] trait, which [`Host`] implements by running `ip`,
//! `systemctl`, `udevadm`, `apt-get`, and the can-utils programs.

pub mod errors;
pub use errors::{Error, Result, ValidationError};

pub mod params;
pub use params::{Bitrate, DesiredParameters, PersistedParameters, TxQueueLen};

pub mod scheme;
pub use scheme::{detect, Detection, FileSet, Layout, Scheme};

pub mod template;

pub mod extract;
pub use extract::extract_parameters;

pub mod apply;
pub use apply::{apply_configuration, remove_configuration, Activation, Applied};

pub mod system;
pub use system::{Host, System};

pub mod config;
pub use config::Config;

pub mod link;
pub use link::LinkStatus;

pub mod dump;

pub mod uuid;

pub mod menu;
pub use menu::{Console, Session};
