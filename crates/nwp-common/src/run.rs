//! Model run (forecast cycle) identification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};

use crate::error::ParseError;

/// One forecast cycle: a calendar date plus the cycle hour (UTC).
///
/// The canonical text form is `YYYYMMDDHH`, e.g. `2018112000`. It names the
/// staging directories and is embedded in every remote and local file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelRun {
    date: NaiveDate,
    cycle: u8,
}

impl ModelRun {
    pub fn new(date: NaiveDate, cycle: u32) -> Result<Self, ParseError> {
        if cycle > 23 {
            return Err(ParseError::InvalidCycle(cycle));
        }
        Ok(Self {
            date,
            cycle: cycle as u8,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn cycle(&self) -> u32 {
        self.cycle as u32
    }

    /// Cycle hour as used in remote paths ("00", "06", ...).
    pub fn cycle_str(&self) -> String {
        format!("{:02}", self.cycle)
    }

    /// The run containing `dt`, with the cycle truncated down to a multiple of
    /// `step_hours`.
    pub fn floor(dt: DateTime<Utc>, step_hours: u32) -> Self {
        let step = step_hours.clamp(1, 24);
        let hour = dt.hour() - dt.hour() % step;
        Self {
            date: dt.date_naive(),
            cycle: hour as u8,
        }
    }

    /// The run expected to be published at `now`, given the publication lag.
    pub fn expected_at(now: DateTime<Utc>, lag_hours: u32, step_hours: u32) -> Self {
        Self::floor(now - Duration::hours(lag_hours as i64), step_hours)
    }
}

impl fmt::Display for ModelRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.date.format("%Y%m%d"), self.cycle)
    }
}

impl FromStr for ModelRun {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidRunFormat(s.to_string()));
        }

        let date = NaiveDate::parse_from_str(&s[..8], "%Y%m%d")
            .map_err(|_| ParseError::InvalidRunDate(s[..8].to_string()))?;
        let cycle: u32 = s[8..]
            .parse()
            .map_err(|_| ParseError::InvalidRunFormat(s.to_string()))?;

        Self::new(date, cycle)
    }
}
