// canbus-setup/tests/common/mod.rs
//
// Shared helpers for the integration tests.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

#![allow(dead_code)]

use canbus_setup::{
    system::{PackageOp, UnitAction},
    Error, Result, System,
};
use std::{
    fs,
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::ExitStatus,
};

/// `ip -details` output for an interface that is up at 1 Mbit/s.
pub const LINK_UP: &str = "\
3: can0: <NOARP,UP,LOWER_UP,ECHO> mtu 16 qdisc pfifo_fast state UP mode DEFAULT group default qlen 1024
    link/can  promiscuity 0 minmtu 0 maxmtu 0
    can state ERROR-ACTIVE (berr-counter tx 0 rx 0) restart-ms 0
          bitrate 1000000 sample-point 0.875
";

/// `ip -details` output for an interface in bus-off.
pub const LINK_BUS_OFF: &str = "\
3: can0: <NOARP,UP,LOWER_UP,ECHO> mtu 16 qdisc pfifo_fast state UP mode DEFAULT group default qlen 128
    link/can  promiscuity 0 minmtu 0 maxmtu 0
    can state BUS-OFF restart-ms 0
          bitrate 500000 sample-point 0.875
";

/// A host that records what it was asked to do.
///
/// Each call is recorded as the command line the real host would run.
#[derive(Debug)]
pub struct FakeSystem {
    /// Everything that was run, in order
    pub calls: Vec<String>,
    /// A command line that fails instead of succeeding
    pub fail_on: Option<String>,
    /// A file rewritten with new contents whenever a unit is restarted
    pub tamper: Option<(PathBuf, String)>,
    /// What `ip -details link show` prints
    pub link: String,
    /// What a sampled `candump` prints
    pub candump: String,
    /// What the UUID query script prints
    pub uuids: String,
    /// Programs that are not on the `PATH`
    pub missing_tools: Vec<String>,
    /// Whether can-utils is installed
    pub can_utils: bool,
}

impl Default for FakeSystem {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            fail_on: None,
            tamper: None,
            link: LINK_UP.to_string(),
            candump: String::new(),
            uuids: String::new(),
            missing_tools: Vec::new(),
            can_utils: true,
        }
    }
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the given command line fail.
    pub fn failing(mut self, cmd: &str) -> Self {
        self.fail_on = Some(cmd.to_string());
        self
    }

    /// Whether a command line was run.
    pub fn ran(&self, cmd: &str) -> bool {
        self.calls.iter().any(|c| c == cmd)
    }

    fn record(&mut self, cmd: String) -> Result<()> {
        let fail = self.fail_on.as_deref() == Some(cmd.as_str());
        self.calls.push(cmd.clone());
        if fail {
            return Err(Error::Command {
                command: cmd,
                status: ExitStatus::from_raw(1 << 8),
                stderr: "Job failed.".into(),
            });
        }
        Ok(())
    }
}

impl System for FakeSystem {
    fn link_details(&mut self, iface: &str) -> Result<String> {
        self.record(format!("ip -details -statistics link show {}", iface))?;
        Ok(self.link.clone())
    }

    fn set_link(&mut self, iface: &str, up: bool) -> Result<()> {
        let state = if up { "up" } else { "down" };
        self.record(format!("ip link set {} {}", iface, state))
    }

    fn ifupdown(&mut self, iface: &str, up: bool) -> Result<()> {
        let program = if up { "ifup" } else { "ifdown" };
        self.record(format!("{} {}", program, iface))
    }

    fn systemctl(&mut self, action: UnitAction, unit: &str) -> Result<()> {
        self.record(format!("systemctl {} {}", action, unit))?;
        if action == UnitAction::Restart {
            if let Some((path, text)) = &self.tamper {
                fs::write(path, text)?;
            }
        }
        Ok(())
    }

    fn unit_active(&mut self, unit: &str) -> Result<bool> {
        self.record(format!("systemctl is-active --quiet {}", unit))?;
        Ok(true)
    }

    fn daemon_reload(&mut self) -> Result<()> {
        self.record("systemctl daemon-reload".into())
    }

    fn reload_udev(&mut self) -> Result<()> {
        self.record("udevadm control --reload-rules".into())?;
        self.record("udevadm trigger --subsystem-match=net".into())
    }

    fn package_installed(&mut self, pkg: &str) -> Result<bool> {
        self.record(format!("dpkg-query -W {}", pkg))?;
        Ok(self.can_utils)
    }

    fn package(&mut self, op: PackageOp, pkgs: &[&str]) -> Result<()> {
        let cmd = match op {
            PackageOp::Update => "apt-get update".to_string(),
            PackageOp::Install => format!("apt-get install -y {}", pkgs.join(" ")),
            PackageOp::Remove => format!("apt-get remove -y {}", pkgs.join(" ")),
        };
        self.record(cmd)?;
        if op == PackageOp::Install {
            self.can_utils = true;
        }
        Ok(())
    }

    fn candump_live(&mut self, iface: &str) -> Result<()> {
        self.record(format!("candump -c -t a {}", iface))
    }

    fn candump_sample(&mut self, iface: &str, count: u32, timeout_ms: u32) -> Result<String> {
        self.record(format!("candump -L -n {} -T {} {}", count, timeout_ms, iface))?;
        Ok(self.candump.clone())
    }

    fn cansend(&mut self, iface: &str, frame: &str) -> Result<()> {
        self.record(format!("cansend {} {}", iface, frame))
    }

    fn query_uuids(&mut self, python: &Path, script: &Path, iface: &str) -> Result<String> {
        self.record(format!(
            "{} {} {}",
            python.display(),
            script.display(),
            iface
        ))?;
        Ok(self.uuids.clone())
    }

    fn tool_available(&mut self, name: &str) -> bool {
        !self.missing_tools.iter().any(|t| t == name)
    }
}
