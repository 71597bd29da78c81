// canbus-setup/src/extract.rs
//
// Reads the configured parameters back out of the scheme files.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Parameter extraction.
//!
//! Each scheme keeps the bitrate and queue length in its own textual
//! convention:
//!
//! ```text
//! Legacy   bitrate  =>     bitrate 1000000
//!          txqueue  =>     up ip link set $IFACE txqueuelen 1024
//! SchemeA  bitrate  => BitRate=1000000
//!          txqueue  => ... ATTR{tx_queue_len}="1024"
//! SchemeB  bitrate  => BitRate=1000000
//!          txqueue  => ExecStart=/sbin/ifconfig can0 txqueuelen 1024
//! ```
//!
//! A value that can't be found is reported as absent, never as an error,
//! since partially written configurations are expected to be surfaced.

use crate::{
    params::PersistedParameters,
    scheme::{Layout, Scheme},
};
use std::{fs, io};

/// Reads the parameters of `scheme` from the files on disk.
///
/// A file that does not exist yields absent values. Other read errors are
/// logged and treated the same way.
pub fn extract_parameters(layout: &Layout, scheme: Scheme) -> PersistedParameters {
    let files = layout.files(scheme);
    let contents = files
        .paths
        .iter()
        .map(|path| match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("Unable to read '{}': {}", path.display(), err);
                None
            }
        })
        .collect::<Vec<_>>();

    let bitrate_text = contents.first().cloned().flatten();
    let txqueuelen_text = contents.last().cloned().flatten();
    extract_from_text(
        scheme,
        bitrate_text.as_deref(),
        txqueuelen_text.as_deref(),
    )
}

/// Extracts the parameters of `scheme` from file contents.
///
/// `bitrate_file` and `txqueuelen_file` are the contents of the scheme's
/// bitrate and queue length files (the same text for the legacy scheme).
pub fn extract_from_text(
    scheme: Scheme,
    bitrate_file: Option<&str>,
    txqueuelen_file: Option<&str>,
) -> PersistedParameters {
    let (bitrate, txqueuelen) = match scheme {
        Scheme::Legacy => (
            bitrate_file.and_then(legacy_bitrate),
            txqueuelen_file.and_then(trailing_txqueuelen),
        ),
        Scheme::SchemeA => (
            bitrate_file.and_then(networkd_bitrate),
            txqueuelen_file.and_then(udev_txqueuelen),
        ),
        Scheme::SchemeB => (
            bitrate_file.and_then(networkd_bitrate),
            txqueuelen_file.and_then(service_txqueuelen),
        ),
    };
    PersistedParameters {
        bitrate,
        txqueuelen,
    }
}

/// The non-comment lines of a file, trimmed.
fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

fn numeric(s: &str) -> Option<String> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        Some(s.to_string())
    } else {
        None
    }
}

// `bitrate <N>`
fn legacy_bitrate(text: &str) -> Option<String> {
    lines(text).find_map(|line| {
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some("bitrate"), Some(val)) => numeric(val),
            _ => None,
        }
    })
}

// A line with a `txqueuelen` token, value is its last token
fn trailing_txqueuelen(text: &str) -> Option<String> {
    lines(text)
        .filter(|line| line.split_whitespace().any(|tok| tok == "txqueuelen"))
        .find_map(|line| line.split_whitespace().last().and_then(numeric))
}

// `BitRate=<N>`
fn networkd_bitrate(text: &str) -> Option<String> {
    lines(text).find_map(|line| {
        let (key, val) = line.split_once('=')?;
        if key.trim() == "BitRate" {
            numeric(val.split_whitespace().next()?)
        } else {
            None
        }
    })
}

// `ATTR{tx_queue_len}="<N>"`
fn udev_txqueuelen(text: &str) -> Option<String> {
    const KEY: &str = "ATTR{tx_queue_len}";

    lines(text).find_map(|line| {
        let (_, rest) = line.split_once(KEY)?;
        let rest = rest.trim_start().strip_prefix('=')?;
        let val = rest.trim_start().trim_start_matches('"');
        let end = val.find(|c: char| !c.is_ascii_digit()).unwrap_or(val.len());
        numeric(&val[..end])
    })
}

// `ExecStart=... txqueuelen <N>`
fn service_txqueuelen(text: &str) -> Option<String> {
    lines(text)
        .filter_map(|line| line.strip_prefix("ExecStart="))
        .find_map(trailing_txqueuelen)
}

/////////////////////////////////////////////////////////////////////////////
