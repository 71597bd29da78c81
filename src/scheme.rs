// canbus-setup/src/scheme.rs
//
// Detection of the installed CAN configuration scheme.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Configuration schemes and their detection.
//!
//! There are three mutually exclusive ways to bring up a CAN interface at
//! boot, each identified by the files it installs:
//!
//! ```text
//! Legacy  => /etc/network/interfaces.d/<iface>
//! SchemeA => /etc/systemd/network/25-<iface>.network
//!            /etc/udev/rules.d/10-<iface>.rules
//! SchemeB => /etc/systemd/network/80-<iface>.network
//!            /etc/systemd/system/<iface>-txqueuelen.service
//! ```
//!
//! The detector probes for those files and reports which scheme is in
//! place, whether a two-file scheme is only partially there, or whether
//! more than one scheme is installed at once. The result is recomputed on
//! every call and never cached.

use bitflags::bitflags;
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// The interface that is configured when none is given.
pub const DEFAULT_IFACE: &str = "can0";

// ===== Scheme =====

/// A way of configuring the CAN interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// ifupdown, through the interfaces directory
    Legacy,
    /// systemd-networkd with a udev rule for the queue length
    SchemeA,
    /// systemd-networkd with a service unit for the queue length
    SchemeB,
}

impl Scheme {
    /// Every known scheme.
    pub const ALL: [Scheme; 3] = [Scheme::Legacy, Scheme::SchemeA, Scheme::SchemeB];

    /// Whether the scheme is applied by restarting systemd services,
    /// rather than by a reboot.
    pub fn is_systemd(&self) -> bool {
        !matches!(self, Scheme::Legacy)
    }

    /// The presence bit for the scheme.
    fn presence(&self) -> Presence {
        match self {
            Scheme::Legacy => Presence::LEGACY,
            Scheme::SchemeA => Presence::SCHEME_A,
            Scheme::SchemeB => Presence::SCHEME_B,
        }
    }

    /// A short description for the operator.
    pub fn description(&self) -> &'static str {
        match self {
            Scheme::Legacy => "ifupdown interfaces file (applied on reboot)",
            Scheme::SchemeA => "systemd-networkd + udev rule",
            Scheme::SchemeB => "systemd-networkd + txqueuelen service",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Scheme::Legacy => "legacy",
            Scheme::SchemeA => "scheme-a",
            Scheme::SchemeB => "scheme-b",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Scheme {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "ifupdown" => Ok(Scheme::Legacy),
            "a" | "scheme-a" | "udev" => Ok(Scheme::SchemeA),
            "b" | "scheme-b" | "service" => Ok(Scheme::SchemeB),
            _ => Err(crate::Error::InvalidChoice {
                what: "configuration scheme",
                value: s.to_string(),
            }),
        }
    }
}

// ===== FileSet =====

/// The files that make up one scheme.
///
/// The first file holds the bitrate, the last one the queue length. For
/// the legacy scheme both are the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    /// The scheme the files belong to
    pub scheme: Scheme,
    /// The absolute paths, in fixed order
    pub paths: Vec<PathBuf>,
}

impl FileSet {
    /// The file that holds the bitrate.
    pub fn bitrate_file(&self) -> &Path {
        &self.paths[0]
    }

    /// The file that holds the transmit queue length.
    pub fn txqueuelen_file(&self) -> &Path {
        &self.paths[self.paths.len() - 1]
    }

    /// Whether at least one of the files exists.
    pub fn any_present(&self) -> bool {
        self.paths.iter().any(|p| p.exists())
    }

    /// Whether all of the files exist.
    pub fn all_present(&self) -> bool {
        self.paths.iter().all(|p| p.exists())
    }

    /// The files that currently exist.
    pub fn present(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path).filter(|p| p.exists())
    }
}

// ===== Layout =====

/// Where the configuration files for an interface live.
///
/// All paths are resolved under `root`, which is `/` on a real system and
/// a scratch directory in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    iface: String,
}

impl Layout {
    /// Creates a layout for `iface` under the `root` directory.
    pub fn new<P: Into<PathBuf>>(root: P, iface: &str) -> Self {
        Self {
            root: root.into(),
            iface: iface.to_string(),
        }
    }

    /// The layout of the host system for `iface`.
    pub fn system(iface: &str) -> Self {
        Self::new("/", iface)
    }

    /// The root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The name of the CAN interface
    pub fn iface(&self) -> &str {
        &self.iface
    }

    fn path(&self, rel: String) -> PathBuf {
        self.root.join(rel)
    }

    /// The systemd unit that sets the queue length in SchemeB.
    pub fn txqueuelen_unit(&self) -> String {
        format!("{}-txqueuelen.service", self.iface)
    }

    /// The files required by `scheme`.
    pub fn files(&self, scheme: Scheme) -> FileSet {
        let iface = &self.iface;
        let paths = match scheme {
            Scheme::Legacy => vec![self.path(format!("etc/network/interfaces.d/{}", iface))],
            Scheme::SchemeA => vec![
                self.path(format!("etc/systemd/network/25-{}.network", iface)),
                self.path(format!("etc/udev/rules.d/10-{}.rules", iface)),
            ],
            Scheme::SchemeB => vec![
                self.path(format!("etc/systemd/network/80-{}.network", iface)),
                self.path(format!("etc/systemd/system/{}", self.txqueuelen_unit())),
            ],
        };
        FileSet { scheme, paths }
    }
}

// ===== Presence =====

bitflags! {
    /// Which schemes have at least one of their files on disk.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Presence: u8 {
        /// The legacy file exists
        const LEGACY = 0b100;
        /// At least one SchemeA file exists
        const SCHEME_A = 0b010;
        /// At least one SchemeB file exists
        const SCHEME_B = 0b001;
    }
}

impl Presence {
    /// Probes the filesystem.
    pub fn probe(layout: &Layout) -> Self {
        Scheme::ALL
            .iter()
            .filter(|scheme| layout.files(**scheme).any_present())
            .fold(Presence::empty(), |acc, scheme| acc | scheme.presence())
    }
}

// ===== Detection =====

/// The configuration found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detection {
    /// Nothing is configured
    Unknown,
    /// The legacy file is in place
    Legacy,
    /// Both SchemeA files are in place
    SchemeA,
    /// Only one of the SchemeA files is there
    SchemeABroken,
    /// Both SchemeB files are in place
    SchemeB,
    /// Only one of the SchemeB files is there
    SchemeBBroken,
    /// Files from more than one scheme are present
    Multiple,
}

impl Detection {
    /// The scheme that is installed, complete or not.
    ///
    /// This is `None` when nothing, or more than one scheme is installed.
    pub fn scheme(&self) -> Option<Scheme> {
        match self {
            Detection::Legacy => Some(Scheme::Legacy),
            Detection::SchemeA | Detection::SchemeABroken => Some(Scheme::SchemeA),
            Detection::SchemeB | Detection::SchemeBBroken => Some(Scheme::SchemeB),
            Detection::Unknown | Detection::Multiple => None,
        }
    }

    /// Whether the state is something the operator should be warned about.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Detection::Unknown
                | Detection::SchemeABroken
                | Detection::SchemeBBroken
                | Detection::Multiple
        )
    }

    /// Whether exactly one, complete scheme is installed.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            Detection::Legacy | Detection::SchemeA | Detection::SchemeB
        )
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Detection::*;
        let msg = match *self {
            Unknown => "no CAN configuration found",
            Legacy => "legacy ifupdown configuration",
            SchemeA => "systemd-networkd configuration with udev rule",
            SchemeABroken => "BROKEN systemd-networkd/udev configuration (a file is missing)",
            SchemeB => "systemd-networkd configuration with txqueuelen service",
            SchemeBBroken => "BROKEN systemd-networkd/service configuration (a file is missing)",
            Multiple => "CONFLICT: more than one configuration method is installed",
        };
        f.write_str(msg)
    }
}

/// Classifies a presence pattern.
///
/// `complete` is asked whether all of a two-file scheme's files exist,
/// and only when that scheme is the only one present.
pub fn classify<F>(presence: Presence, complete: F) -> Detection
where
    F: FnOnce(Scheme) -> bool,
{
    let (scheme, ok, broken) = match presence.bits() {
        0b000 => return Detection::Unknown,
        0b100 => return Detection::Legacy,
        0b010 => (Scheme::SchemeA, Detection::SchemeA, Detection::SchemeABroken),
        0b001 => (Scheme::SchemeB, Detection::SchemeB, Detection::SchemeBBroken),
        _ => return Detection::Multiple,
    };
    if complete(scheme) {
        ok
    } else {
        broken
    }
}

/// Detects the configuration currently installed for the layout.
pub fn detect(layout: &Layout) -> Detection {
    let presence = Presence::probe(layout);
    let detection = classify(presence, |scheme| layout.files(scheme).all_present());
    log::debug!(
        "Detected {:?} for '{}' (presence {:03b})",
        detection,
        layout.iface(),
        presence.bits()
    );
    detection
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    // The five files in a fixed order: legacy, A1, A2, B1, B2
    fn all_files(layout: &Layout) -> Vec<PathBuf> {
        Scheme::ALL
            .iter()
            .flat_map(|s| layout.files(*s).paths)
            .collect()
    }

    // What the table says for a combination of the five files
    fn expected(mask: u32) -> Detection {
        let legacy = mask & 0b00001 != 0;
        let (a1, a2) = (mask & 0b00010 != 0, mask & 0b00100 != 0);
        let (b1, b2) = (mask & 0b01000 != 0, mask & 0b10000 != 0);
        let (a, b) = (a1 || a2, b1 || b2);

        match (legacy, a, b) {
            (false, false, false) => Detection::Unknown,
            (true, false, false) => Detection::Legacy,
            (false, true, false) if a1 && a2 => Detection::SchemeA,
            (false, true, false) => Detection::SchemeABroken,
            (false, false, true) if b1 && b2 => Detection::SchemeB,
            (false, false, true) => Detection::SchemeBBroken,
            _ => Detection::Multiple,
        }
    }

    #[test]
    fn test_file_sets() {
        let layout = Layout::new("/", "can0");
        assert_eq!(
            layout.files(Scheme::Legacy).paths,
            vec![PathBuf::from("/etc/network/interfaces.d/can0")]
        );
        let a = layout.files(Scheme::SchemeA);
        assert_eq!(a.bitrate_file(), Path::new("/etc/systemd/network/25-can0.network"));
        assert_eq!(a.txqueuelen_file(), Path::new("/etc/udev/rules.d/10-can0.rules"));
        let b = layout.files(Scheme::SchemeB);
        assert_eq!(b.bitrate_file(), Path::new("/etc/systemd/network/80-can0.network"));
        assert_eq!(
            b.txqueuelen_file(),
            Path::new("/etc/systemd/system/can0-txqueuelen.service")
        );
    }

    #[test]
    fn test_every_combination() {
        for mask in 0..32u32 {
            let dir = TempDir::new().unwrap();
            let layout = Layout::new(dir.path(), "can0");

            for (bit, path) in all_files(&layout).iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    touch(path);
                }
            }
            assert_eq!(detect(&layout), expected(mask), "mask {:05b}", mask);
            // Same answer the second time
            assert_eq!(detect(&layout), expected(mask), "mask {:05b}", mask);
        }
    }

    #[test]
    fn test_examples() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path(), "can0");
        assert_eq!(detect(&layout), Detection::Unknown);

        let a = layout.files(Scheme::SchemeA);
        touch(a.bitrate_file());
        assert_eq!(detect(&layout), Detection::SchemeABroken);

        touch(a.txqueuelen_file());
        assert_eq!(detect(&layout), Detection::SchemeA);

        for path in a.paths {
            fs::remove_file(path).unwrap();
        }
        touch(&layout.files(Scheme::Legacy).paths[0]);
        for path in layout.files(Scheme::SchemeB).paths {
            touch(&path);
        }
        assert_eq!(detect(&layout), Detection::Multiple);
    }

    #[test]
    fn test_other_iface_not_detected() {
        let dir = TempDir::new().unwrap();
        let can1 = Layout::new(dir.path(), "can1");
        touch(&can1.files(Scheme::Legacy).paths[0]);

        assert_eq!(detect(&can1), Detection::Legacy);
        assert_eq!(detect(&Layout::new(dir.path(), "can0")), Detection::Unknown);
    }

    #[test]
    fn test_classify_only_asks_single_scheme() {
        let det = classify(Presence::SCHEME_A | Presence::SCHEME_B, |_| {
            panic!("completeness is irrelevant for a conflict")
        });
        assert_eq!(det, Detection::Multiple);
        assert_eq!(
            classify(Presence::SCHEME_B, |s| s == Scheme::SchemeB),
            Detection::SchemeB
        );
    }

    #[test]
    fn test_parse_scheme() {
        assert_eq!("legacy".parse::<Scheme>().unwrap(), Scheme::Legacy);
        assert_eq!("A".parse::<Scheme>().unwrap(), Scheme::SchemeA);
        assert_eq!("scheme-b".parse::<Scheme>().unwrap(), Scheme::SchemeB);
        assert!("c".parse::<Scheme>().is_err());
    }
}
