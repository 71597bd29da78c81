// canbus-setup/src/dump.rs
//
// Parsing of 'candump' log output and 'cansend' frame syntax.
//
// This file is part of the Rust 'canbus-setup' tool.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! candump format parsing
//!
//! Parses the text log format emitted by `candump -L`, which is part of
//! [can-utils](https://github.com/linux-can/can-utils). A sampled capture
//! of the bus is read this way and then summarized per CAN ID.
//!
//! Example:
//!
//! ```text
//! (1735270496.916858) can0 110#00112233
//! (1735270509.245511) can0 110#44556677
//! (1735270588.936508) can0 120##500112233445566778899AABB
//! (1735279041.257318) can1 104#R
//! (1735279048.349278) can1 110#R4
//! ```
//!
//! The `<id>#<data>` part is the same syntax `cansend` accepts, so
//! [`Frame::parse`] also checks operator input before it is sent.

use crate::errors::Error;
use hex::FromHex;
use itertools::Itertools;
use std::{
    collections::BTreeMap,
    fmt,
    io::{self, BufRead},
};
use thiserror::Error;

/// Largest standard (11-bit) CAN ID
const SFF_MASK: u32 = 0x0000_07ff;
/// Largest extended (29-bit) CAN ID
const EFF_MASK: u32 = 0x1fff_ffff;
/// Max data in a classic frame
const CAN_DATA_LEN_MAX: usize = 8;
/// Max data in an FD frame
const CANFD_DATA_LEN_MAX: usize = 64;

/// candump line parse error
#[derive(Error, Debug)]
pub enum ParseError {
    /// I/O Error
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Unexpected end of line
    #[error("Unexpected end of line")]
    UnexpectedEndOfLine,
    /// Invalid time stamp
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    /// Invalid CAN frame
    #[error("Invalid CAN frame")]
    InvalidCanFrame,
}

// ===== Frame =====

/// The kind of a CAN frame in log/`cansend` syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Classic data frame, `<id>#<data>`
    Data,
    /// Remote frame, `<id>#R[<len>]`, with the length if one was given
    Remote(Option<u8>),
    /// CAN FD frame, `<id>##<flags><data>`, with the flags nibble
    Fd(u8),
}

/// A CAN frame as written by `candump -L` and read by `cansend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The raw CAN ID
    pub id: u32,
    /// Whether the ID is a 29-bit extended one
    pub extended: bool,
    /// Data, remote or FD
    pub kind: FrameKind,
    /// The payload, empty for remote frames
    pub data: Vec<u8>,
}

impl Frame {
    /// Parses a frame in `<id>#<data>` syntax.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let (id_str, rest) = s.split_once('#').ok_or(ParseError::InvalidCanFrame)?;

        let id = u32::from_str_radix(id_str, 16).map_err(|_| ParseError::InvalidCanFrame)?;
        // A 3-digit ID is standard, 8 digits is extended
        let extended = match id_str.len() {
            3 if id <= SFF_MASK => false,
            8 if id <= EFF_MASK => true,
            _ => return Err(ParseError::InvalidCanFrame),
        };

        let (kind, data) = if let Some(fd) = rest.strip_prefix('#') {
            // first char is the FD flags nibble
            let mut chars = fd.chars();
            let flags = chars
                .next()
                .and_then(|c| c.to_digit(16))
                .ok_or(ParseError::InvalidCanFrame)?;
            let data = parse_data(chars.as_str(), CANFD_DATA_LEN_MAX)?;
            (FrameKind::Fd(flags as u8), data)
        } else if let Some(len) = rest.strip_prefix('R') {
            let len = match len {
                "" => None,
                _ => match len.parse::<u8>() {
                    Ok(n) if len.len() == 1 && usize::from(n) <= CAN_DATA_LEN_MAX => Some(n),
                    _ => return Err(ParseError::InvalidCanFrame),
                },
            };
            (FrameKind::Remote(len), Vec::new())
        } else {
            (FrameKind::Data, parse_data(rest, CAN_DATA_LEN_MAX)?)
        };

        Ok(Self {
            id,
            extended,
            kind,
            data,
        })
    }
}

// Hex payload, with the optional '.' separators `cansend` allows
fn parse_data(s: &str, max: usize) -> Result<Vec<u8>, ParseError> {
    let s = s.replace('.', "");
    let data = Vec::<u8>::from_hex(&s).map_err(|_| ParseError::InvalidCanFrame)?;
    if data.len() > max {
        return Err(ParseError::InvalidCanFrame);
    }
    Ok(data)
}

impl std::str::FromStr for Frame {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frame::parse(s.trim()).map_err(|_| Error::InvalidFrame(s.trim().to_string()))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "{:08X}", self.id)?;
        } else {
            write!(f, "{:03X}", self.id)?;
        }

        let mut parts = self.data.iter().map(|v| format!("{:02X}", v));
        match self.kind {
            FrameKind::Remote(None) => f.write_str("#R"),
            FrameKind::Remote(Some(len)) => write!(f, "#R{}", len),
            FrameKind::Data => write!(f, "#{}", parts.join("")),
            FrameKind::Fd(flags) => write!(f, "##{:X}{}", flags, parts.join("")),
        }
    }
}

// ===== DumpRecord =====

/// Recorded CAN frame.
/// This corresponds to the information in a line from the candump log.
#[derive(Debug, Clone)]
pub struct DumpRecord {
    /// The timestamp
    pub t_us: u64,
    /// The name of the device
    pub device: String,
    /// The parsed frame
    pub frame: Frame,
}

impl DumpRecord {
    /// Parses one line of the log.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut field_iter = line.trim().split(' ');

        // parse timestamp field
        let ts = field_iter.next().ok_or(ParseError::UnexpectedEndOfLine)?;

        if ts.len() < 3 || !ts.starts_with('(') || !ts.ends_with(')') {
            return Err(ParseError::InvalidTimestamp);
        }

        let ts = &ts[1..ts.len() - 1];

        let t_us = match ts.split_once('.') {
            Some((num, mant)) => {
                let num = num
                    .parse::<u64>()
                    .map_err(|_| ParseError::InvalidTimestamp)?;
                let mant = mant
                    .parse::<u64>()
                    .map_err(|_| ParseError::InvalidTimestamp)?;
                num.saturating_mul(1_000_000).saturating_add(mant)
            }
            _ => return Err(ParseError::InvalidTimestamp),
        };

        // device name
        let device = field_iter
            .next()
            .ok_or(ParseError::UnexpectedEndOfLine)?
            .to_string();

        let frame = Frame::parse(field_iter.next().ok_or(ParseError::UnexpectedEndOfLine)?)?;

        Ok(Self {
            t_us,
            device,
            frame,
        })
    }
}

impl fmt::Display for DumpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.6}) {} {}",
            1.0e-6 * self.t_us as f64,
            self.device,
            self.frame
        )
    }
}

/////////////////////////////////////////////////////////////////////////////
// Reader

#[derive(Debug)]
/// A CAN log reader.
pub struct Reader<R> {
    // The underlying reader
    rdr: R,
    // The line buffer
    buf: String,
}

impl<R: BufRead> Reader<R> {
    /// Creates a log reader from a buffered reader.
    pub fn new(rdr: R) -> Self {
        Self {
            rdr,
            buf: String::with_capacity(256),
        }
    }

    /// Advance state, returning next record.
    ///
    /// Blank lines are skipped.
    pub fn next_record(&mut self) -> Result<Option<DumpRecord>, ParseError> {
        loop {
            self.buf.clear();
            let nread = self.rdr.read_line(&mut self.buf)?;

            // reached EOF
            if nread == 0 {
                return Ok(None);
            }
            if !self.buf.trim().is_empty() {
                return DumpRecord::parse(&self.buf).map(Some);
            }
        }
    }
}

impl<R: BufRead> Iterator for Reader<R> {
    type Item = Result<DumpRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

// ===== Summary =====

/// Frame counts from a sampled capture.
#[derive(Debug, Default, Clone)]
pub struct Summary {
    /// Number of frames, by CAN ID and whether the ID is extended
    pub by_id: BTreeMap<(u32, bool), usize>,
    /// Total number of frames
    pub total: usize,
    /// Time between the first and last frame, in microseconds
    pub span_us: u64,
}

impl Summary {
    /// Collects the records of a capture.
    pub fn collect<I>(records: I) -> Self
    where
        I: IntoIterator<Item = DumpRecord>,
    {
        let mut summary = Self::default();
        let mut first = None;
        let mut last = 0;

        for rec in records {
            *summary
                .by_id
                .entry((rec.frame.id, rec.frame.extended))
                .or_insert(0) += 1;
            summary.total += 1;
            first.get_or_insert(rec.t_us);
            last = rec.t_us;
        }
        summary.span_us = first.map(|t| last.saturating_sub(t)).unwrap_or(0);
        summary
    }

    /// Parses and summarizes a complete capture.
    pub fn from_log(text: &str) -> Result<Self, ParseError> {
        let records = Reader::new(text.as_bytes()).collect::<Result<Vec<_>, _>>()?;
        Ok(Self::collect(records))
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return f.write_str("no frames received");
        }
        writeln!(
            f,
            "{} frames in {:.3}s",
            self.total,
            1.0e-6 * self.span_us as f64
        )?;
        for ((id, extended), n) in &self.by_id {
            if *extended {
                writeln!(f, "  {:08X}: {}", id, n)?;
            } else {
                writeln!(f, "  {:>8}: {}", format!("{:03X}", id), n)?;
            }
        }
        Ok(())
    }
}

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_simple_example() {
        let input: &[u8] = b"(1469439874.299591) can1 080#\n\
                             (1469439874.299654) can1 701#7F";

        let mut reader = Reader::new(input);

        let rec1 = reader.next_record().unwrap().unwrap();

        assert_eq!(rec1.t_us, 1469439874299591);
        assert_eq!(rec1.device, "can1");
        assert_eq!(rec1.frame.id, 0x080);
        assert_eq!(rec1.frame.kind, FrameKind::Data);
        assert!(!rec1.frame.extended);
        assert!(rec1.frame.data.is_empty());

        let rec2 = reader.next_record().unwrap().unwrap();
        assert_eq!(rec2.t_us, 1469439874299654);
        assert_eq!(rec2.frame.id, 0x701);
        assert_eq!(rec2.frame.data, &[0x7F]);

        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_remote_and_fd() {
        let input: &[u8] = b"(1469439874.299591) can0 053701AB#R4\n\
                             \n\
                             (1469439874.299654) can0 120##500112233445566778899AABB\n";

        let recs = Reader::new(input).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(recs.len(), 2);

        assert_eq!(recs[0].frame.kind, FrameKind::Remote(Some(4)));
        assert!(recs[0].frame.extended);
        assert_eq!(recs[0].frame.id, 0x053701AB);

        assert_eq!(recs[1].frame.kind, FrameKind::Fd(5));
        assert_eq!(recs[1].frame.data.len(), 12);
    }

    #[test]
    fn test_bad_lines() {
        assert!(matches!(
            DumpRecord::parse("1469439874.299591 can0 080#"),
            Err(ParseError::InvalidTimestamp)
        ));
        assert!(matches!(
            DumpRecord::parse("(1469439874.299591) can0"),
            Err(ParseError::UnexpectedEndOfLine)
        ));
        assert!(matches!(
            DumpRecord::parse("(1469439874.299591) can0 080-11"),
            Err(ParseError::InvalidCanFrame)
        ));
    }

    #[test]
    fn test_cansend_syntax() {
        let frame: Frame = "123#DEADBEEF".parse().unwrap();
        assert_eq!(frame.id, 0x123);
        assert_eq!(frame.data, &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(frame.to_string(), "123#DEADBEEF");

        let frame: Frame = "5AA#11.22.33".parse().unwrap();
        assert_eq!(frame.data, &[0x11, 0x22, 0x33]);

        assert!("123#R".parse::<Frame>().is_ok());
        assert!("1F334455#1122".parse::<Frame>().is_ok());

        // ID too large, too much data, odd digits, bad ID length
        assert!("800#00".parse::<Frame>().is_err());
        assert!("123#001122334455667788".parse::<Frame>().is_err());
        assert!("123#123".parse::<Frame>().is_err());
        assert!("12#00".parse::<Frame>().is_err());
        assert!("hello".parse::<Frame>().is_err());
    }

    #[test]
    fn test_summary() {
        let log = "(100.000000) can0 110#00\n\
                   (100.500000) can0 120#01\n\
                   (101.000000) can0 110#02\n";
        let summary = Summary::from_log(log).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_id[&(0x110, false)], 2);
        assert_eq!(summary.by_id[&(0x120, false)], 1);
        assert_eq!(summary.span_us, 1_000_000);
        assert!(summary.to_string().starts_with("3 frames in 1.000s"));

        let empty = Summary::from_log("").unwrap();
        assert_eq!(empty.to_string(), "no frames received");
    }

    #[test]
    fn test_summary_keeps_standard_and_extended_apart() {
        let log = "(1.000000) can0 123#00\n\
                   (1.100000) can0 00000123#00\n\
                   (1.200000) can0 123#01\n";
        let summary = Summary::from_log(log).unwrap();
        assert_eq!(summary.by_id.len(), 2);
        assert_eq!(summary.by_id[&(0x123, false)], 2);
        assert_eq!(summary.by_id[&(0x123, true)], 1);

        let text = summary.to_string();
        assert!(text.contains("       123: 2"));
        assert!(text.contains("  00000123: 1"));
    }

    #[test]
    fn test_remote_length_and_fd_flags_kept() {
        let frame: Frame = "123#R4".parse().unwrap();
        assert_eq!(frame.kind, FrameKind::Remote(Some(4)));
        assert_eq!(frame.to_string(), "123#R4");

        let frame: Frame = "123#R".parse().unwrap();
        assert_eq!(frame.kind, FrameKind::Remote(None));
        assert_eq!(frame.to_string(), "123#R");

        let frame: Frame = "123##3AABB".parse().unwrap();
        assert_eq!(frame.kind, FrameKind::Fd(3));
        assert_eq!(frame.to_string(), "123##3AABB");

        assert!("123#R9".parse::<Frame>().is_err());
        assert!("123#R12".parse::<Frame>().is_err());
        assert!("123##G00".parse::<Frame>().is_err());
    }
}
