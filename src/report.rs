//! # Run Report
//!
//! The four-counter summary produced at every level of a run: one connection,
//! one process, or a whole multi-process fan-out.
//!
//! The textual form of a report is the only data that crosses a process
//! boundary. A child prints exactly one line
//!
//! ```text
//! Send Count: <n>, Recv Count: <n>, Read Count: <n>, Write Count: <n>
//! ```
//!
//! and the parent parses it back. Both directions live in this module
//! (`Display` and `FromStr`), so the wire form can change without touching
//! orchestration code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;
use thiserror::Error;

const SEND_LABEL: &str = "Send Count: ";
const RECV_LABEL: &str = "Recv Count: ";
const READ_LABEL: &str = "Read Count: ";
const WRITE_LABEL: &str = "Write Count: ";
const FIELD_SEPARATOR: &str = ", ";

/// Summed counters for a scope of the benchmark
///
/// Counters are 32 bits wide to match the report line. Additions wrap on
/// overflow, so any report is always printable and parseable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Messages successfully sent
    pub send_count: u32,
    /// Messages successfully received
    pub recv_count: u32,
    /// Raw read calls on the underlying streams
    pub read_count: u32,
    /// Raw write calls on the underlying streams
    pub write_count: u32,
}

/// Errors produced while decoding a report line
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportParseError {
    #[error("expected field '{expected}' at '{found}'")]
    MissingField {
        expected: &'static str,
        found: String,
    },

    #[error("invalid value '{value}' for '{field}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("unexpected trailing text '{0}'")]
    TrailingText(String),
}

impl RunReport {
    pub fn new(send_count: u32, recv_count: u32, read_count: u32, write_count: u32) -> Self {
        Self {
            send_count,
            recv_count,
            read_count,
            write_count,
        }
    }

    /// Find the first line of `output` that is a complete report line.
    ///
    /// Children may print nothing (crashed before reporting) or extra lines;
    /// only a line that matches the format in full is accepted.
    pub fn find_in(output: &str) -> Option<Self> {
        output.lines().find_map(|line| line.parse().ok())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SEND_LABEL}{}{FIELD_SEPARATOR}{RECV_LABEL}{}{FIELD_SEPARATOR}{READ_LABEL}{}{FIELD_SEPARATOR}{WRITE_LABEL}{}",
            self.send_count, self.recv_count, self.read_count, self.write_count
        )
    }
}

impl FromStr for RunReport {
    type Err = ReportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A single trailing newline belongs to the line itself.
        let line = s
            .strip_suffix("\r\n")
            .or_else(|| s.strip_suffix('\n'))
            .unwrap_or(s);

        let (send_count, rest) = take_field(line, SEND_LABEL, Some(FIELD_SEPARATOR))?;
        let (recv_count, rest) = take_field(rest, RECV_LABEL, Some(FIELD_SEPARATOR))?;
        let (read_count, rest) = take_field(rest, READ_LABEL, Some(FIELD_SEPARATOR))?;
        let (write_count, rest) = take_field(rest, WRITE_LABEL, None)?;

        if !rest.is_empty() {
            return Err(ReportParseError::TrailingText(rest.to_string()));
        }

        Ok(Self::new(send_count, recv_count, read_count, write_count))
    }
}

/// Consume `label`, a decimal `u32`, and an optional separator from `input`.
fn take_field<'a>(
    input: &'a str,
    label: &'static str,
    separator: Option<&'static str>,
) -> Result<(u32, &'a str), ReportParseError> {
    let rest = input
        .strip_prefix(label)
        .ok_or_else(|| ReportParseError::MissingField {
            expected: label.trim_end(),
            found: input.to_string(),
        })?;

    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (digits, rest) = rest.split_at(digits_end);

    let value = digits
        .parse::<u32>()
        .map_err(|_| ReportParseError::InvalidValue {
            field: label.trim_end(),
            value: digits.to_string(),
        })?;

    match separator {
        Some(sep) => {
            let rest = rest
                .strip_prefix(sep)
                .ok_or_else(|| ReportParseError::MissingField {
                    expected: sep,
                    found: rest.to_string(),
                })?;
            Ok((value, rest))
        }
        None => Ok((value, rest)),
    }
}

impl Add for RunReport {
    type Output = RunReport;

    fn add(self, rhs: RunReport) -> RunReport {
        RunReport {
            send_count: self.send_count.wrapping_add(rhs.send_count),
            recv_count: self.recv_count.wrapping_add(rhs.recv_count),
            read_count: self.read_count.wrapping_add(rhs.read_count),
            write_count: self.write_count.wrapping_add(rhs.write_count),
        }
    }
}

impl AddAssign for RunReport {
    fn add_assign(&mut self, rhs: RunReport) {
        *self = *self + rhs;
    }
}

impl Sum for RunReport {
    fn sum<I: Iterator<Item = RunReport>>(iter: I) -> Self {
        iter.fold(RunReport::default(), Add::add)
    }
}

impl<'a> Sum<&'a RunReport> for RunReport {
    fn sum<I: Iterator<Item = &'a RunReport>>(iter: I) -> Self {
        iter.copied().sum()
    }
}
