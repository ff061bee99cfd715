use super::scope::{Availability, EmptyScope, EmptyScopeReason, QueryScope, ScopeSpec, ScopedPartition};
use super::template::{Field, UriTemplate};
use super::{Granularity, PartitionKey};
use crate::config::PartitionSettings;
use crate::error::{Error, Result};
use chrono::{NaiveDate, Utc};
use std::fmt;
use tracing::{debug, instrument, warn};

/// The bounded span of partitions the locator is allowed to enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionWindow {
    pub first: PartitionKey,
    pub last: PartitionKey,
}

impl PartitionWindow {
    fn is_empty(&self) -> bool {
        self.first > self.last
    }
}

impl fmt::Display for PartitionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.first, self.last)
    }
}

/// Resolves logical scopes into concrete partition locations
#[derive(Debug, Clone)]
pub struct PartitionLocator {
    template: UriTemplate,
    granularity: Granularity,
    earliest: NaiveDate,
    latest: Option<NaiveDate>,
    max_lookback: u32,
}

impl PartitionLocator {
    pub fn new(settings: &PartitionSettings) -> Result<Self> {
        let template = UriTemplate::parse(&settings.template)?;
        let granularity = settings.granularity;

        // Every field the granularity defines must appear, otherwise two
        // partitions would render to the same file and be scanned twice.
        for field in [Field::Year, Field::Month, Field::Day] {
            if granularity.defines(field) && !template.fields().any(|f| f == field) {
                return Err(Error::config(format!(
                    "partition template '{template}' lacks {{{}}}, required for {granularity} partitions",
                    field.name()
                )));
            }
        }
        if let Some(field) = template.fields().find(|f| !granularity.defines(*f)) {
            warn!(
                template = %template,
                granularity = %granularity,
                "Template placeholder {{{}}} cannot be rendered; every partition will be unavailable",
                field.name()
            );
        }

        if settings.max_lookback == 0 {
            return Err(Error::config("partitions.max_lookback must be at least 1"));
        }
        if let Some(latest) = settings.latest {
            if latest < settings.earliest {
                return Err(Error::config(format!(
                    "partitions.latest ({latest}) is before partitions.earliest ({})",
                    settings.earliest
                )));
            }
        }

        Ok(Self {
            template,
            granularity,
            earliest: settings.earliest,
            latest: settings.latest,
            max_lookback: settings.max_lookback,
        })
    }

    pub fn template(&self) -> &UriTemplate {
        &self.template
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Current enumeration window: `latest` (today when unset) back at most
    /// `max_lookback` units, never before `earliest`.
    pub fn window(&self) -> PartitionWindow {
        let latest = self.latest.unwrap_or_else(|| Utc::now().date_naive());
        let last = PartitionKey::containing(latest, self.granularity);
        let floor = PartitionKey::containing(self.earliest, self.granularity);
        let first = last
            .back(self.max_lookback - 1)
            .map_or(floor, |candidate| candidate.max(floor));
        PartitionWindow { first, last }
    }

    /// Resolve a scope into its ordered partitions.
    ///
    /// A range is clipped to the dataset (`earliest` up to `latest`).
    /// Partitions it names that are older than the lookback window stay in
    /// the scope marked [`Availability::OutsideWindow`], and partitions whose
    /// location cannot be rendered are marked unavailable, so a narrowed
    /// result is always flagged. An inverted range, or one with no partition
    /// inside the window, yields [`EmptyScope`].
    #[instrument(skip(self), fields(scope = %spec))]
    pub fn resolve(&self, spec: &ScopeSpec) -> std::result::Result<QueryScope, EmptyScope> {
        let window = self.window();
        let floor = PartitionKey::containing(self.earliest, self.granularity);

        let (first, last, requested) = match *spec {
            ScopeSpec::All => (window.first, window.last, (window.first.start(), window.last.last_day())),
            ScopeSpec::Range { start, end } => {
                if start > end {
                    return Err(EmptyScope::new(EmptyScopeReason::InvertedRange { start, end }));
                }
                let first = PartitionKey::containing(start, self.granularity).max(floor);
                let last = PartitionKey::containing(end, self.granularity).min(window.last);
                (first, last, (start, end))
            }
        };

        let outside = || {
            EmptyScope::new(EmptyScopeReason::OutsideWindow {
                start: requested.0,
                end: requested.1,
                window_start: window.first.start(),
                window_end: window.last.last_day(),
            })
        };
        if window.is_empty() || first.max(window.first) > last {
            return Err(outside());
        }

        let mut partitions = Vec::new();
        let mut cursor = Some(first);
        while let Some(key) = cursor.filter(|k| *k <= last) {
            let partition = if key < window.first {
                ScopedPartition::outside_window(key)
            } else {
                match self.template.render(&key) {
                    Ok(uri) => ScopedPartition::available(key, uri),
                    Err(e) => {
                        debug!(partition = %key, error = %e, "Partition location could not be rendered");
                        ScopedPartition::unavailable(key, e.to_string())
                    }
                }
            };
            partitions.push(partition);
            cursor = key.next();
        }

        let beyond_lookback = partitions
            .iter()
            .filter(|p| p.availability == Availability::OutsideWindow)
            .count();
        if beyond_lookback > 0 {
            warn!(
                partitions = beyond_lookback,
                window = %window,
                "Requested range reaches past the lookback window"
            );
        }

        let scope = QueryScope::new(partitions)
            .ok_or_else(outside)?
            .with_range(requested.0, requested.1);
        debug!(
            partitions = scope.len(),
            available = scope.available_count(),
            "Resolved query scope"
        );
        Ok(scope)
    }
}
