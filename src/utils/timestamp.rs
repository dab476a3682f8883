//! Run timestamp token shared by every artifact name and by retention scans
//!
//! The writer (a backup run) and the reader (a pruning pass) must agree on the
//! format byte for byte, so both go through [`RunStamp`].

use chrono::{Local, NaiveDateTime, Timelike};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// strftime format of a run token, e.g. `2024-01-15_03-00-00`
pub const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Human-readable format used in notification messages
pub const MESSAGE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Trailing timestamp in a backup directory name
const STAMP_SUFFIX_PATTERN: &str = r"\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}$";

fn suffix_regex() -> &'static Regex {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    SUFFIX.get_or_init(|| Regex::new(STAMP_SUFFIX_PATTERN).expect("static pattern is valid"))
}

/// Timestamp token of one backup run, second precision, local time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunStamp(NaiveDateTime);

impl RunStamp {
    /// Capture the current local time
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    /// Build a stamp from an arbitrary instant, dropping sub-second precision
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        Self(datetime.with_nanosecond(0).unwrap_or(datetime))
    }

    /// Parse a token that must be exactly `YYYY-MM-DD_HH-MM-SS`
    pub fn parse(token: &str) -> Option<Self> {
        if token.len() != 19 {
            return None;
        }
        NaiveDateTime::parse_from_str(token, STAMP_FORMAT)
            .ok()
            .map(Self)
    }

    /// Extract the timestamp a directory name ends with.
    ///
    /// Returns `None` when the name has no trailing token or the token is not
    /// a real date (e.g. month 13).
    pub fn from_name_suffix(name: &str) -> Option<Self> {
        let found = suffix_regex().find(name)?;
        Self::parse(found.as_str())
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// The token as used in file and directory names
    pub fn token(&self) -> String {
        self.0.format(STAMP_FORMAT).to_string()
    }
}

impl fmt::Display for RunStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(STAMP_FORMAT))
    }
}

impl FromStr for RunStamp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid run timestamp: {}", s))
    }
}

impl Serialize for RunStamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

/// Current local time formatted for notification messages
pub fn message_time() -> String {
    Local::now().format(MESSAGE_TIME_FORMAT).to_string()
}
