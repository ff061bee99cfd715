//! Date-keyed partitions of the remote changeset dataset.
//!
//! The dataset is stored as one Parquet file per calendar unit. This module
//! provides:
//! - [`PartitionKey`]: one calendar unit at a configured [`Granularity`]
//! - [`UriTemplate`]: substitution of key fields into a location template
//! - [`PartitionLocator`]: resolution of a [`ScopeSpec`] into a [`QueryScope`]

pub mod locator;
pub mod scope;
pub mod template;

pub use locator::{PartitionLocator, PartitionWindow};
pub use scope::{Availability, EmptyScope, EmptyScopeReason, QueryScope, ScopeSpec, ScopedPartition};
pub use template::{Field, RenderError, UriTemplate};

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar unit covered by one partition file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Year,
    Month,
    Day,
}

impl Granularity {
    /// Whether keys at this granularity carry a value for `field`
    pub fn defines(&self, field: Field) -> bool {
        match field {
            Field::Year => true,
            Field::Month => matches!(self, Granularity::Month | Granularity::Day),
            Field::Day => matches!(self, Granularity::Day),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Year => "year",
            Granularity::Month => "month",
            Granularity::Day => "day",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "year" | "yearly" => Ok(Granularity::Year),
            "month" | "monthly" => Ok(Granularity::Month),
            "day" | "daily" => Ok(Granularity::Day),
            other => Err(format!("unknown partition granularity '{other}'")),
        }
    }
}

/// One calendar unit, identified by its first day.
///
/// Keys order chronologically. Two keys are only meaningfully compared when
/// they share a granularity, which is always the case inside one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    start: NaiveDate,
    granularity: Granularity,
}

impl PartitionKey {
    /// The key of the unit containing `date`.
    pub fn containing(date: NaiveDate, granularity: Granularity) -> Self {
        let start = match granularity {
            Granularity::Year => date.with_ordinal(1).unwrap_or(date),
            Granularity::Month => date.with_day(1).unwrap_or(date),
            Granularity::Day => date,
        };
        Self { start, granularity }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// First day of the unit
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the unit
    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .and_then(|next| next.start.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month(&self) -> Option<u32> {
        self.granularity
            .defines(Field::Month)
            .then(|| self.start.month())
    }

    pub fn day(&self) -> Option<u32> {
        self.granularity
            .defines(Field::Day)
            .then(|| self.start.day())
    }

    /// The key immediately after this one, if representable.
    pub fn next(&self) -> Option<Self> {
        let start = match self.granularity {
            Granularity::Year => NaiveDate::from_ymd_opt(self.start.year() + 1, 1, 1)?,
            Granularity::Month => self.start.checked_add_months(Months::new(1))?,
            Granularity::Day => self.start.succ_opt()?,
        };
        Some(Self { start, granularity: self.granularity })
    }

    /// The key `units` steps before this one, if representable.
    pub fn back(&self, units: u32) -> Option<Self> {
        let start = match self.granularity {
            Granularity::Year => {
                let year = self.start.year().checked_sub(i32::try_from(units).ok()?)?;
                NaiveDate::from_ymd_opt(year, 1, 1)?
            }
            Granularity::Month => self.start.checked_sub_months(Months::new(units))?,
            Granularity::Day => self.start.checked_sub_days(Days::new(u64::from(units)))?,
        };
        Some(Self { start, granularity: self.granularity })
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            Granularity::Year => write!(f, "{}", self.start.format("%Y")),
            Granularity::Month => write!(f, "{}", self.start.format("%Y-%m")),
            Granularity::Day => write!(f, "{}", self.start.format("%Y-%m-%d")),
        }
    }
}

/// Fully rendered location of one partition file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PartitionUri(String);

impl PartitionUri {
    pub(crate) fn new(uri: String) -> Self {
        Self(uri)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
