// canbus-setup/src/apply.rs
//
// Writing, activating and validating a configuration.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Applying and removing configurations.
//!
//! A configuration is applied in a fixed sequence:
//!
//! 1. The files of every other scheme are removed.
//! 2. The files of the chosen scheme are rendered and written.
//! 3. For the systemd schemes, the services are restarted. A failure here
//!    ends the operation.
//! 4. The files are read back and compared with what was requested.
//!
//! The read-back check only detects problems. A mismatching file is left
//! on disk exactly as it was found, so it can be inspected.

use crate::{
    errors::{Result, ValidationError},
    extract::extract_parameters,
    params::{DesiredParameters, PersistedParameters},
    scheme::{Layout, Scheme},
    system::{System, UnitAction, NETWORKD},
    template,
};
use std::{fs, io, path::PathBuf};

/// What is needed for an applied configuration to take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The host has to be rebooted
    RebootRequired,
    /// The configuration is already in effect
    Active,
}

/// The result of a successful [`apply_configuration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The scheme that was written
    pub scheme: Scheme,
    /// The parameters read back from disk
    pub persisted: PersistedParameters,
    /// Whether a reboot is still needed
    pub activation: Activation,
}

/// Removes a file, returning whether it was there.
fn remove_file(path: &std::path::Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed '{}'", path.display());
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Removes the files of `scheme`, returning those that existed.
///
/// If the SchemeB service unit is installed, it is disabled first. A
/// failure to disable it is logged and otherwise ignored.
fn remove_scheme<S: System>(sys: &mut S, layout: &Layout, scheme: Scheme) -> Result<Vec<PathBuf>> {
    let files = layout.files(scheme);

    if scheme == Scheme::SchemeB && files.txqueuelen_file().exists() {
        let unit = layout.txqueuelen_unit();
        if let Err(err) = sys.systemctl(UnitAction::Disable, &unit) {
            log::warn!("Unable to disable '{}': {}", unit, err);
        }
    }

    let mut removed = Vec::new();
    for path in files.paths {
        if remove_file(&path)? {
            removed.push(path);
        }
    }
    Ok(removed)
}

/// Makes the systemd schemes take effect.
fn activate<S: System>(sys: &mut S, layout: &Layout, scheme: Scheme) -> Result<Activation> {
    match scheme {
        Scheme::Legacy => return Ok(Activation::RebootRequired),
        Scheme::SchemeA => {
            sys.systemctl(UnitAction::Unmask, NETWORKD)?;
            sys.systemctl(UnitAction::Enable, NETWORKD)?;
            sys.reload_udev()?;
            sys.systemctl(UnitAction::Restart, NETWORKD)?;
        }
        Scheme::SchemeB => {
            let unit = layout.txqueuelen_unit();
            sys.systemctl(UnitAction::Unmask, NETWORKD)?;
            sys.systemctl(UnitAction::Enable, NETWORKD)?;
            sys.daemon_reload()?;
            sys.systemctl(UnitAction::Enable, &unit)?;
            sys.systemctl(UnitAction::Restart, NETWORKD)?;
            sys.systemctl(UnitAction::Restart, &unit)?;
        }
    }
    Ok(Activation::Active)
}

/// Writes the configuration for `scheme` and checks that it reads back
/// as `desired`.
///
/// PRIVILEGED: This requires root privilege on a real system.
pub fn apply_configuration<S: System>(
    sys: &mut S,
    layout: &Layout,
    scheme: Scheme,
    desired: &DesiredParameters,
) -> Result<Applied> {
    log::info!(
        "Applying {} for '{}': bitrate {}, txqueuelen {}",
        scheme,
        layout.iface(),
        desired.bitrate,
        desired.txqueuelen
    );

    for other in Scheme::ALL.into_iter().filter(|s| *s != scheme) {
        for path in remove_scheme(sys, layout, other)? {
            log::info!("Removed conflicting {} file '{}'", other, path.display());
        }
    }

    for (path, text) in template::render(layout, scheme, desired) {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, text)?;
        log::debug!("Wrote '{}'", path.display());
    }

    let activation = activate(sys, layout, scheme)?;

    let persisted = extract_parameters(layout, scheme);
    if !persisted.matches(desired) {
        return Err(ValidationError {
            expected: *desired,
            found: persisted,
        }
        .into());
    }

    Ok(Applied {
        scheme,
        persisted,
        activation,
    })
}

/// Removes every known configuration for the interface.
///
/// Returns the files that were removed. If a systemd scheme was among
/// them, systemd-networkd is restarted so the change takes effect.
///
/// PRIVILEGED: This requires root privilege on a real system.
pub fn remove_configuration<S: System>(sys: &mut S, layout: &Layout) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let mut restart = false;

    for scheme in Scheme::ALL {
        let files = remove_scheme(sys, layout, scheme)?;
        restart |= scheme.is_systemd() && !files.is_empty();
        removed.extend(files);
    }

    if restart {
        sys.daemon_reload()?;
        sys.systemctl(UnitAction::Restart, NETWORKD)?;
    }
    log::info!(
        "Removed {} configuration file(s) for '{}'",
        removed.len(),
        layout.iface()
    );
    Ok(removed)
}
