//! The closed set of aggregate operations.
//!
//! Every operation reads from a relation named `changesets`, which the
//! builder binds to the scoped partition files. Bodies are pure functions of
//! the normalized parameters.

use super::params::{ParamKind, ParamSpec, Params};
use crate::error::QueryError;
use crate::utils::quote_literal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const LIMIT: ParamSpec = ParamSpec {
    name: "limit",
    kind: ParamKind::Integer,
    default: Some("25"),
    range: Some((1, 1000)),
    help: "Number of rows to return",
};

const USER: ParamSpec = ParamSpec {
    name: "user",
    kind: ParamKind::Text,
    default: None,
    range: None,
    help: "OpenStreetMap user name",
};

/// `created_by` prefixes folded into one editor family. Matched in order.
const EDITOR_FAMILIES: &[(&str, &str)] = &[
    ("iD", "iD"),
    ("JOSM", "JOSM"),
    ("Level0", "Level0"),
    ("StreetComplete", "StreetComplete"),
    ("RapiD", "RapiD"),
    ("Potlach", "Potlach"),
    ("Potlatch", "Potlatch"),
    ("Go Map!!", "Go Map!!"),
    ("Merkaartor", "Merkaartor"),
    ("OsmAnd", "OsmAnd"),
    ("MAPS.ME", "MAPS.ME"),
    ("Vespucci", "Vespucci"),
    ("Organic Maps", "Organic Maps"),
    ("ArcGIS Editor", "ArcGIS Editor"),
    ("bulk_upload.py", "bulk_upload.py"),
    ("reverter", "reverter"),
    ("Every_Door", "EveryDoor"),
    ("osmtools", "osmtools"),
    ("osmapi", "osmapi"),
    ("rosemary", "rosemary"),
    ("Globe", "Globe"),
    ("PythonOsmApi", "PythonOsmApi"),
    ("bot-source-cadastre.py", "bot-source-cadastre.py"),
    ("upload.py", "upload.py"),
];

/// A predefined aggregate query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    ChangesPerDay,
    CountByUser,
    TopApplications,
    PeriodSummary,
    DatasetRange,
    UserActivity,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::ChangesPerDay,
        Operation::CountByUser,
        Operation::TopApplications,
        Operation::PeriodSummary,
        Operation::DatasetRange,
        Operation::UserActivity,
    ];

    /// Stable identifier used by callers and in cache keys
    pub fn id(&self) -> &'static str {
        match self {
            Operation::ChangesPerDay => "changes-per-day",
            Operation::CountByUser => "count-by-user",
            Operation::TopApplications => "top-applications",
            Operation::PeriodSummary => "period-summary",
            Operation::DatasetRange => "dataset-range",
            Operation::UserActivity => "user-activity",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.id() == id)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Operation::ChangesPerDay => "Changesets and object changes opened per day",
            Operation::CountByUser => "Users ranked by number of changesets",
            Operation::TopApplications => "Editing applications ranked by object changes",
            Operation::PeriodSummary => "Changeset, user, object change and comment totals",
            Operation::DatasetRange => "Earliest and latest changeset opening time",
            Operation::UserActivity => "Per-day activity of one user",
        }
    }

    pub fn params(&self) -> &'static [ParamSpec] {
        match self {
            Operation::CountByUser | Operation::TopApplications => &[LIMIT],
            Operation::UserActivity => &[USER],
            Operation::ChangesPerDay | Operation::PeriodSummary | Operation::DatasetRange => &[],
        }
    }

    /// Validate and normalize `params` against this operation's schema
    pub fn validate(&self, params: &Params) -> Result<Params, QueryError> {
        params.validate(self.id(), self.params())
    }

    /// Render the query body over the `changesets` relation.
    ///
    /// `params` must already be normalized by [`Operation::validate`]; a
    /// missing value falls back to the declared default.
    pub fn render(&self, params: &Params) -> String {
        match self {
            Operation::ChangesPerDay => "SELECT\n    CAST(created_at AS DATE) AS day,\n    count(*) AS changesets,\n    CAST(sum(num_changes) AS BIGINT) AS object_changes\nFROM changesets\nGROUP BY 1\nORDER BY 1".to_owned(),
            Operation::CountByUser => format!(
                "SELECT\n    \"user\",\n    uid,\n    count(*) AS changesets,\n    CAST(sum(num_changes) AS BIGINT) AS object_changes\nFROM changesets\nGROUP BY \"user\", uid\nORDER BY changesets DESC, object_changes DESC, \"user\"\nLIMIT {}",
                params.int(LIMIT.name).unwrap_or(25)
            ),
            Operation::TopApplications => format!(
                "SELECT\n    editor,\n    CAST(sum(num_changes) AS BIGINT) AS object_changes,\n    count(*) AS changesets\nFROM (\n    SELECT {} AS editor, num_changes\n    FROM changesets\n)\nGROUP BY editor\nORDER BY object_changes DESC, changesets DESC, editor\nLIMIT {}",
                editor_expression(),
                params.int(LIMIT.name).unwrap_or(25)
            ),
            Operation::PeriodSummary => "SELECT\n    count(*) AS changesets,\n    count(DISTINCT uid) AS unique_users,\n    CAST(sum(num_changes) AS BIGINT) AS object_changes,\n    CAST(sum(comments_count) AS BIGINT) AS comments\nFROM changesets".to_owned(),
            Operation::DatasetRange => "SELECT\n    min(created_at) AS first_opened,\n    max(created_at) AS last_opened\nFROM changesets".to_owned(),
            Operation::UserActivity => format!(
                "SELECT\n    CAST(created_at AS DATE) AS day,\n    count(*) AS changesets,\n    CAST(sum(num_changes) AS BIGINT) AS object_changes,\n    CAST(sum(comments_count) AS BIGINT) AS comments\nFROM changesets\nWHERE \"user\" = {}\nGROUP BY 1\nORDER BY 1",
                quote_literal(params.text(USER.name).unwrap_or_default())
            ),
        }
    }
}

/// CASE expression folding the `created_by` tag into an editor family
fn editor_expression() -> String {
    // Map lookups return a one-element list
    let created_by = "map_extract(tags, 'created_by')[1]";
    let mut sql = String::from("CASE");
    for (prefix, family) in EDITOR_FAMILIES {
        sql.push_str(&format!(
            "\n        WHEN {created_by} LIKE {} THEN {}",
            quote_literal(&format!("{prefix}%")),
            quote_literal(family)
        ));
    }
    sql.push_str(&format!("\n        ELSE coalesce({created_by}, '<unknown>')\n    END"));
    sql
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Operation {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s.trim()).ok_or_else(|| {
            let known: Vec<_> = Self::ALL.iter().map(|op| op.id()).collect();
            QueryError::invalid(format!(
                "unknown operation '{s}' (known: {})",
                known.join(", ")
            ))
        })
    }
}
