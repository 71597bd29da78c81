// canbus-setup/src/config.rs
//
// Runtime configuration of the setup tool.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Runtime configuration.

use crate::{
    errors::{Error, Result},
    scheme::{Layout, DEFAULT_IFACE},
};
use std::{
    env,
    path::{Path, PathBuf},
};

/// Max length of a network interface name, without the terminating NUL.
pub const IFNAME_MAX_LEN: usize = 15;

/// Where things are and what to configure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The directory the configuration files are written under
    pub root: PathBuf,
    /// The CAN interface
    pub iface: String,
    /// The Klipper source checkout
    pub klipper_dir: PathBuf,
    /// The Klipper Python virtualenv
    pub klippy_env: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/root"));
        Self {
            root: PathBuf::from("/"),
            iface: DEFAULT_IFACE.to_string(),
            klipper_dir: home.join("klipper"),
            klippy_env: home.join("klippy-env"),
        }
    }
}

impl Config {
    /// Sets the root directory.
    pub fn root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = root.into();
        self
    }

    /// Sets the interface, which must be a valid interface name.
    pub fn iface(mut self, iface: &str) -> Result<Self> {
        self.iface = validate_iface(iface)?.to_string();
        Ok(self)
    }

    /// Sets the Klipper source directory.
    pub fn klipper_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.klipper_dir = dir.into();
        self
    }

    /// Sets the Klipper virtualenv directory.
    pub fn klippy_env<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.klippy_env = dir.into();
        self
    }

    /// The file layout for the configured interface.
    pub fn layout(&self) -> Layout {
        Layout::new(&self.root, &self.iface)
    }

    /// Whether the configuration targets the live system, rather than a
    /// scratch directory.
    pub fn is_system_root(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Klipper's UUID query script.
    pub fn uuid_script(&self) -> PathBuf {
        self.klipper_dir.join("scripts").join("canbus_query.py")
    }

    /// The Python interpreter of the Klipper virtualenv.
    pub fn python(&self) -> PathBuf {
        self.klippy_env.join("bin").join("python")
    }
}

/// Checks that `iface` can be used as a network interface name.
pub fn validate_iface(iface: &str) -> Result<&str> {
    let iface = iface.trim();
    // The kernel refuses "." and ".."
    let valid = !iface.is_empty()
        && iface != "."
        && iface != ".."
        && iface.len() <= IFNAME_MAX_LEN
        && iface
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');

    if valid {
        Ok(iface)
    } else {
        Err(Error::InvalidChoice {
            what: "interface name",
            value: iface.to_string(),
        })
    }
}

/////////////////////////////////////////////////////////////////////////////
