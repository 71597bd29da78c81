// canbus-setup/src/errors.rs
//
// Error types for the CAN interface setup tool.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Errors.
//!
//! Every failure the tool can run into is one of a small number of kinds:
//!
//! ```text
//! Io          => a configuration file could not be read, written or removed
//! MissingTool => a required utility or script is not installed
//! Command     => an external command ran, but exited unsuccessfully
//! Validation  => a freshly written file reads back with other values
//! InvalidChoice / InvalidFrame => operator input rejected before use
//! ```
//!
//! Detection ambiguity (a broken or conflicting configuration) is not an
//! error at all; it is a [`Detection`](crate::Detection) state.

use crate::{dump::ParseError, params::DesiredParameters, params::PersistedParameters};
use std::{fmt, io, process::ExitStatus};
use thiserror::Error;

/// A result type for the tool's operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The errors the setup tool reports to the operator.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem error
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A required utility or script is not available
    #[error("'{0}' is not installed or could not be found")]
    MissingTool(String),
    /// An external command exited with a failure status
    #[error("command '{command}' failed ({status}){}", fmt_stderr(.stderr))]
    Command {
        /// The command line that was run
        command: String,
        /// How the process exited
        status: ExitStatus,
        /// Whatever the process wrote to stderr
        stderr: String,
    },
    /// The values read back after a write differ from the requested ones
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A value outside of one of the fixed choice sets
    #[error("{value} is not a valid {what}")]
    InvalidChoice {
        /// The kind of value, like "bitrate"
        what: &'static str,
        /// The rejected value
        value: String,
    },
    /// A frame in `cansend` syntax could not be parsed
    #[error("invalid CAN frame '{0}', expected <id>#<data>")]
    InvalidFrame(String),
    /// A line of `candump` output could not be parsed
    #[error(transparent)]
    Dump(#[from] ParseError),
}

fn fmt_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

// ===== ValidationError =====

/// The mismatch between the parameters that were requested and the
/// parameters found on disk after writing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The parameters that were written
    pub expected: DesiredParameters,
    /// What was read back
    pub found: PersistedParameters,
}

impl ValidationError {
    /// Whether the bitrate read back differs from the requested one.
    pub fn bitrate_mismatch(&self) -> bool {
        self.found.bitrate.as_deref() != Some(self.expected.bitrate.to_string().as_str())
    }

    /// Whether the queue length read back differs from the requested one.
    pub fn txqueuelen_mismatch(&self) -> bool {
        self.found.txqueuelen.as_deref() != Some(self.expected.txqueuelen.to_string().as_str())
    }
}

impl std::error::Error for ValidationError {}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn found(val: &Option<String>) -> &str {
            val.as_deref().unwrap_or("nothing")
        }

        write!(f, "configuration does not match what was written:")?;
        if self.bitrate_mismatch() {
            write!(
                f,
                " bitrate expected {}, found {};",
                self.expected.bitrate,
                found(&self.found.bitrate)
            )?;
        }
        if self.txqueuelen_mismatch() {
            write!(
                f,
                " txqueuelen expected {}, found {};",
                self.expected.txqueuelen,
                found(&self.found.txqueuelen)
            )?;
        }
        Ok(())
    }
}

/////////////////////////////////////////////////////////////////////////////
