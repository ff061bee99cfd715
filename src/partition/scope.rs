use super::{PartitionKey, PartitionUri};
use crate::error::QueryError;
use chrono::{Months, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Caller-facing description of which time span to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeSpec {
    /// Every partition inside the configured lookback window
    All,
    /// Inclusive date range
    Range { start: NaiveDate, end: NaiveDate },
}

impl ScopeSpec {
    pub fn range(start: NaiveDate, end: NaiveDate) -> Self {
        ScopeSpec::Range { start, end }
    }

    /// A single day
    pub fn on(date: NaiveDate) -> Self {
        ScopeSpec::Range { start: date, end: date }
    }

    /// The same range one year earlier; `None` for [`ScopeSpec::All`].
    /// February 29 maps to February 28.
    pub fn year_before(&self) -> Option<ScopeSpec> {
        match *self {
            ScopeSpec::All => None,
            ScopeSpec::Range { start, end } => Some(ScopeSpec::Range {
                start: start.checked_sub_months(Months::new(12))?,
                end: end.checked_sub_months(Months::new(12))?,
            }),
        }
    }

    /// Parse one bound: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, returning the
    /// first and last day it covers.
    fn parse_bound(text: &str) -> Result<(NaiveDate, NaiveDate), QueryError> {
        let text = text.trim();
        let invalid = || QueryError::invalid(format!("invalid date '{text}', expected YYYY, YYYY-MM or YYYY-MM-DD"));
        let parts: Vec<&str> = text.split('-').collect();
        let numbers = parts
            .iter()
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        match numbers.as_slice() {
            [year] if parts[0].len() == 4 => {
                let year = i32::try_from(*year).map_err(|_| invalid())?;
                let first = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
                let last = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid)?;
                Ok((first, last))
            }
            [year, month] => {
                let year = i32::try_from(*year).map_err(|_| invalid())?;
                let first = NaiveDate::from_ymd_opt(year, *month, 1).ok_or_else(invalid)?;
                let last = first
                    .checked_add_months(Months::new(1))
                    .and_then(|d| d.pred_opt())
                    .ok_or_else(invalid)?;
                Ok((first, last))
            }
            [_, _, _] => {
                let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid())?;
                Ok((date, date))
            }
            _ => Err(invalid()),
        }
    }
}

impl FromStr for ScopeSpec {
    type Err = QueryError;

    /// Accepts `all`, a single bound (`2023`, `2023-01`, `2023-01-03`) or a
    /// range `start..end` whose bounds use any of those forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(ScopeSpec::All);
        }
        match s.split_once("..") {
            Some((start, end)) => {
                let (start, _) = Self::parse_bound(start)?;
                let (_, end) = Self::parse_bound(end)?;
                Ok(ScopeSpec::Range { start, end })
            }
            None => {
                let (start, end) = Self::parse_bound(s)?;
                Ok(ScopeSpec::Range { start, end })
            }
        }
    }
}

impl fmt::Display for ScopeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeSpec::All => f.write_str("all"),
            ScopeSpec::Range { start, end } => write!(f, "{start}..{end}"),
        }
    }
}

/// Why a scope resolved to nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyScopeReason {
    InvertedRange {
        start: NaiveDate,
        end: NaiveDate,
    },
    OutsideWindow {
        start: NaiveDate,
        end: NaiveDate,
        window_start: NaiveDate,
        window_end: NaiveDate,
    },
}

/// A scope that resolved to zero partitions.
///
/// This is a value, not a panic: callers distinguish it from a query that
/// ran and found no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyScope {
    pub reason: EmptyScopeReason,
}

impl EmptyScope {
    pub fn new(reason: EmptyScopeReason) -> Self {
        Self { reason }
    }
}

impl fmt::Display for EmptyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            EmptyScopeReason::InvertedRange { start, end } => {
                write!(f, "start date {start} is after end date {end}")
            }
            EmptyScopeReason::OutsideWindow { start, end, window_start, window_end } => write!(
                f,
                "range {start}..{end} lies outside the available window {window_start}..{window_end}"
            ),
        }
    }
}

impl std::error::Error for EmptyScope {}

/// Whether a partition could be given a location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available { uri: PartitionUri },
    Unavailable { reason: String },
    /// Inside the dataset but older than the lookback window allows
    OutsideWindow,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScopedPartition {
    pub key: PartitionKey,
    pub availability: Availability,
}

impl ScopedPartition {
    pub fn available(key: PartitionKey, uri: PartitionUri) -> Self {
        Self { key, availability: Availability::Available { uri } }
    }

    pub fn unavailable(key: PartitionKey, reason: impl Into<String>) -> Self {
        Self { key, availability: Availability::Unavailable { reason: reason.into() } }
    }

    pub fn outside_window(key: PartitionKey) -> Self {
        Self { key, availability: Availability::OutsideWindow }
    }

    pub fn uri(&self) -> Option<&PartitionUri> {
        match &self.availability {
            Availability::Available { uri } => Some(uri),
            Availability::Unavailable { .. } | Availability::OutsideWindow => None,
        }
    }
}

/// Ordered, deduplicated, non-empty set of partitions a query reads.
///
/// Besides the partitions, a scope remembers the requested day range. When
/// that range covers only part of the first or last partition, queries
/// filter rows to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryScope {
    partitions: Vec<ScopedPartition>,
    range: (NaiveDate, NaiveDate),
}

impl QueryScope {
    /// Build a scope from arbitrary partitions. Entries are sorted
    /// chronologically and duplicate keys keep their first occurrence.
    /// Returns `None` for an empty input.
    pub fn new(mut partitions: Vec<ScopedPartition>) -> Option<Self> {
        partitions.sort_by_key(|p| p.key);
        partitions.dedup_by_key(|p| p.key);
        let first = partitions.first()?.key.start();
        let last = partitions.last()?.key.last_day();
        Some(Self { partitions, range: (first, last) })
    }

    /// Narrow the requested day range. Bounds are clamped to the span of
    /// the partitions.
    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        let (first, last) = self.span();
        let start = start.clamp(first, last);
        let end = end.clamp(start, last);
        self.range = (start, end);
        self
    }

    /// Requested day range, inclusive
    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        self.range
    }

    /// Whether the requested range is narrower than the partitions' span
    pub fn is_trimmed(&self) -> bool {
        self.range != self.span()
    }

    pub fn partitions(&self) -> &[ScopedPartition] {
        &self.partitions
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = PartitionKey> + '_ {
        self.partitions.iter().map(|p| p.key)
    }

    /// Partitions with a rendered location, in order
    pub fn available(&self) -> impl Iterator<Item = (PartitionKey, &PartitionUri)> + '_ {
        self.partitions
            .iter()
            .filter_map(|p| p.uri().map(|uri| (p.key, uri)))
    }

    /// Partitions in scope that will not be read, in order
    pub fn unavailable(&self) -> impl Iterator<Item = (PartitionKey, &Availability)> + '_ {
        self.partitions
            .iter()
            .filter(|p| p.uri().is_none())
            .map(|p| (p.key, &p.availability))
    }

    pub fn available_count(&self) -> usize {
        self.available().count()
    }

    /// First and last day covered
    pub fn span(&self) -> (NaiveDate, NaiveDate) {
        // Non-empty by construction
        let first = self.partitions.first().map(|p| p.key.start()).unwrap_or(NaiveDate::MIN);
        let last = self.partitions.last().map(|p| p.key.last_day()).unwrap_or(NaiveDate::MAX);
        (first, last)
    }
}
