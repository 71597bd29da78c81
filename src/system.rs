// canbus-setup/src/system.rs
//
// The external programs the setup tool drives.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Access to the host system.
//!
//! Everything the tool does outside of reading and writing its own
//! configuration files goes through the [`System`] trait: querying and
//! toggling the link, driving systemd and udev, the package manager, and
//! the can-utils programs. [`Host`] runs the real programs; tests supply
//! their own implementation.
//!
//! Some actions require the process to have root privileges. These are
//! indicated by their documentation starting with "PRIVILEGED:".

use crate::errors::{Error, Result};
use itertools::Itertools;
use std::{
    fmt, io,
    path::Path,
    process::{Command, Stdio},
    sync::atomic::{AtomicUsize, Ordering},
};

/// The systemd-networkd service.
pub const NETWORKD: &str = "systemd-networkd";

/// An action on a systemd unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAction {
    /// Enable the unit at boot
    Enable,
    /// Disable the unit at boot
    Disable,
    /// Prevent the unit from being started at all
    Mask,
    /// Undo a mask
    Unmask,
    /// Start the unit now
    Start,
    /// Stop the unit now
    Stop,
    /// Restart the unit now
    Restart,
}

impl UnitAction {
    /// The `systemctl` verb for the action.
    pub fn as_str(&self) -> &'static str {
        use UnitAction::*;
        match *self {
            Enable => "enable",
            Disable => "disable",
            Mask => "mask",
            Unmask => "unmask",
            Start => "start",
            Stop => "stop",
            Restart => "restart",
        }
    }
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package manager operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageOp {
    /// Refresh the package lists
    Update,
    /// Install packages
    Install,
    /// Remove packages
    Remove,
}

/// The host capabilities the setup tool relies on.
pub trait System {
    /// Gets the detailed link information for the interface, as printed
    /// by `ip -details -statistics link show`.
    fn link_details(&mut self, iface: &str) -> Result<String>;

    /// PRIVILEGED: Sets the link up or down with `ip link set`.
    fn set_link(&mut self, iface: &str, up: bool) -> Result<()>;

    /// PRIVILEGED: Brings the interface up or down through ifupdown.
    fn ifupdown(&mut self, iface: &str, up: bool) -> Result<()>;

    /// PRIVILEGED: Performs an action on a systemd unit.
    fn systemctl(&mut self, action: UnitAction, unit: &str) -> Result<()>;

    /// Whether a systemd unit is currently active.
    fn unit_active(&mut self, unit: &str) -> Result<bool>;

    /// PRIVILEGED: Makes systemd re-read its unit files.
    fn daemon_reload(&mut self) -> Result<()>;

    /// PRIVILEGED: Makes udev re-read its rules and re-trigger net devices.
    fn reload_udev(&mut self) -> Result<()>;

    /// Whether a Debian package is installed.
    fn package_installed(&mut self, pkg: &str) -> Result<bool>;

    /// PRIVILEGED: Runs a package manager operation.
    ///
    /// `pkgs` is ignored for [`PackageOp::Update`].
    fn package(&mut self, op: PackageOp, pkgs: &[&str]) -> Result<()>;

    /// Shows the bus traffic on the terminal until the operator
    /// interrupts it.
    fn candump_live(&mut self, iface: &str) -> Result<()>;

    /// Captures up to `count` frames, waiting at most `timeout_ms`, and
    /// returns them in `candump -L` log format.
    fn candump_sample(&mut self, iface: &str, count: u32, timeout_ms: u32) -> Result<String>;

    /// Sends a single frame, given in `cansend` syntax.
    fn cansend(&mut self, iface: &str, frame: &str) -> Result<()>;

    /// Runs Klipper's UUID query script and returns its output.
    fn query_uuids(&mut self, python: &Path, script: &Path, iface: &str) -> Result<String>;

    /// Whether a program can be found on the `PATH`.
    fn tool_available(&mut self, name: &str) -> bool;
}

// ===== Foreground programs =====

/// Number of programs currently attached to the terminal.
static FOREGROUND: AtomicUsize = AtomicUsize::new(0);

/// Whether a program is running attached to the terminal.
///
/// While one is, an interrupt from the terminal is meant for it.
pub fn foreground_running() -> bool {
    FOREGROUND.load(Ordering::SeqCst) > 0
}

/// Marks a foreground program for as long as it is alive.
struct ForegroundGuard;

impl ForegroundGuard {
    fn new() -> Self {
        FOREGROUND.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl Drop for ForegroundGuard {
    fn drop(&mut self) {
        FOREGROUND.fetch_sub(1, Ordering::SeqCst);
    }
}

// ===== Host =====

/// The real host, running the system utilities.
#[derive(Debug, Default, Clone, Copy)]
pub struct Host;

impl Host {
    /// Creates a handle to the host.
    pub fn new() -> Self {
        Self
    }

    fn command_line(program: &str, args: &[&str]) -> String {
        std::iter::once(program).chain(args.iter().copied()).join(" ")
    }

    /// Runs a program to completion, capturing its output.
    ///
    /// Returns stdout on success.
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let cmdline = Self::command_line(program, args);
        log::debug!("Running: {}", cmdline);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| Self::spawn_error(program, err))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            log::debug!("'{}' failed with {}: {}", cmdline, output.status, stderr.trim());
            Err(Error::Command {
                command: cmdline,
                status: output.status,
                stderr,
            })
        }
    }

    /// Runs a program attached to the terminal.
    ///
    /// When `interruptible` is set, the program being killed by a signal
    /// counts as success.
    fn run_foreground(&self, program: &str, args: &[&str], interruptible: bool) -> Result<()> {
        let cmdline = Self::command_line(program, args);
        log::debug!("Running in foreground: {}", cmdline);

        let status = {
            let _guard = ForegroundGuard::new();
            Command::new(program)
                .args(args)
                .status()
                .map_err(|err| Self::spawn_error(program, err))?
        };

        if status.success() || (interruptible && status.code().is_none()) {
            Ok(())
        } else {
            Err(Error::Command {
                command: cmdline,
                status,
                stderr: String::new(),
            })
        }
    }

    fn spawn_error(program: &str, err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::NotFound {
            Error::MissingTool(program.to_string())
        } else {
            Error::Io(err)
        }
    }
}

impl System for Host {
    fn link_details(&mut self, iface: &str) -> Result<String> {
        self.run("ip", &["-details", "-statistics", "link", "show", iface])
    }

    fn set_link(&mut self, iface: &str, up: bool) -> Result<()> {
        let state = if up { "up" } else { "down" };
        self.run("ip", &["link", "set", iface, state]).map(drop)
    }

    fn ifupdown(&mut self, iface: &str, up: bool) -> Result<()> {
        let program = if up { "ifup" } else { "ifdown" };
        self.run(program, &[iface]).map(drop)
    }

    fn systemctl(&mut self, action: UnitAction, unit: &str) -> Result<()> {
        self.run("systemctl", &[action.as_str(), unit]).map(drop)
    }

    fn unit_active(&mut self, unit: &str) -> Result<bool> {
        match self.run("systemctl", &["is-active", "--quiet", unit]) {
            Ok(_) => Ok(true),
            Err(Error::Command { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn daemon_reload(&mut self) -> Result<()> {
        self.run("systemctl", &["daemon-reload"]).map(drop)
    }

    fn reload_udev(&mut self) -> Result<()> {
        self.run("udevadm", &["control", "--reload-rules"])?;
        self.run("udevadm", &["trigger", "--subsystem-match=net"])
            .map(drop)
    }

    fn package_installed(&mut self, pkg: &str) -> Result<bool> {
        match self.run("dpkg-query", &["-W", "-f=${Status}", pkg]) {
            Ok(status) => Ok(status.trim() == "install ok installed"),
            // dpkg-query fails for packages it has never heard of
            Err(Error::Command { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn package(&mut self, op: PackageOp, pkgs: &[&str]) -> Result<()> {
        let mut args = match op {
            PackageOp::Update => return self.run_foreground("apt-get", &["update"], false),
            PackageOp::Install => vec!["install", "-y"],
            PackageOp::Remove => vec!["remove", "-y"],
        };
        args.extend_from_slice(pkgs);
        self.run_foreground("apt-get", &args, false)
    }

    fn candump_live(&mut self, iface: &str) -> Result<()> {
        // Ctrl-C is how a live capture ends
        self.run_foreground("candump", &["-c", "-t", "a", iface], true)
    }

    fn candump_sample(&mut self, iface: &str, count: u32, timeout_ms: u32) -> Result<String> {
        let count = count.to_string();
        let timeout = timeout_ms.to_string();
        match self.run("candump", &["-L", "-n", &count, "-T", &timeout, iface]) {
            Ok(out) => Ok(out),
            // candump exits non-zero when the timeout expires with nothing received
            Err(Error::Command { stderr, .. }) if stderr.trim().is_empty() => Ok(String::new()),
            Err(err) => Err(err),
        }
    }

    fn cansend(&mut self, iface: &str, frame: &str) -> Result<()> {
        self.run("cansend", &[iface, frame]).map(drop)
    }

    fn query_uuids(&mut self, python: &Path, script: &Path, iface: &str) -> Result<String> {
        for path in [python, script] {
            if !path.exists() {
                return Err(Error::MissingTool(path.display().to_string()));
            }
        }
        let python = python.to_string_lossy();
        let script = script.to_string_lossy();
        self.run(&python, &[&*script, iface])
    }

    fn tool_available(&mut self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}

/////////////////////////////////////////////////////////////////////////////
