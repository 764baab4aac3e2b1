//! Inclusive alert date ranges.
//!
//! Periods travel on the wire as `"YYYY-MM-DD,YYYY-MM-DD"` and are split
//! into a `begin`/`end` pair before they reach a template.

use std::fmt;

use chrono::{Duration, NaiveDate};
use thiserror::Error;

use crate::Generation;

/// First day of the revised-schema alert series.
#[must_use]
pub fn series_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2011, 9, 1).unwrap_or(NaiveDate::MIN)
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Errors from parsing a wire period.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    /// The string is not two comma-separated dates.
    #[error("Period must be two comma-separated dates, got '{0}'")]
    Shape(String),

    /// One of the bounds is not a `YYYY-MM-DD` date.
    #[error("Invalid date '{value}': {message}")]
    Date {
        /// Offending bound.
        value: String,
        /// Parser message.
        message: String,
    },

    /// `begin` falls after `end`.
    #[error("Period begins on {begin} after it ends on {end}")]
    Reversed {
        /// Lower bound as given.
        begin: NaiveDate,
        /// Upper bound as given.
        end: NaiveDate,
    },
}

/// An inclusive `(begin, end)` date range with `begin <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    begin: NaiveDate,
    end: NaiveDate,
}

impl Period {
    /// Creates a period from its bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::Reversed`] if `begin > end`.
    pub fn new(begin: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if begin > end {
            return Err(PeriodError::Reversed { begin, end });
        }
        Ok(Self { begin, end })
    }

    /// Parses the wire form `"YYYY-MM-DD,YYYY-MM-DD"`.
    ///
    /// Whitespace around either bound is ignored. Single-digit months and
    /// days are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError`] if the string is malformed or reversed.
    pub fn parse(raw: &str) -> Result<Self, PeriodError> {
        let mut parts = raw.split(',');
        let (Some(begin), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(PeriodError::Shape(raw.to_string()));
        };
        Self::new(parse_date(begin)?, parse_date(end)?)
    }

    /// The range used when a request carries no period.
    ///
    /// The legacy schema covers yesterday through today; the revised schema
    /// covers the whole series through today.
    #[must_use]
    pub fn default_for(generation: Generation, today: NaiveDate) -> Self {
        let begin = match generation {
            Generation::V1 => today - Duration::days(1),
            Generation::V2 => series_start().min(today),
        };
        Self { begin, end: today }
    }

    /// Parses `raw` when present, otherwise falls back to
    /// [`Period::default_for`].
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError`] if `raw` is present but malformed.
    pub fn parse_or_default(
        raw: Option<&str>,
        generation: Generation,
        today: NaiveDate,
    ) -> Result<Self, PeriodError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Self::parse(raw),
            None => Ok(Self::default_for(generation, today)),
        }
    }

    /// Inclusive lower bound.
    #[must_use]
    pub const fn begin(&self) -> NaiveDate {
        self.begin
    }

    /// Inclusive upper bound.
    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Lower bound formatted for a template.
    #[must_use]
    pub fn begin_str(&self) -> String {
        self.begin.format(DATE_FORMAT).to_string()
    }

    /// Upper bound formatted for a template.
    #[must_use]
    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.begin_str(), self.end_str())
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, PeriodError> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| PeriodError::Date {
        value: s.to_string(),
        message: e.to_string(),
    })
}
