//! Operation parameters and their declared schemas.

use crate::error::QueryError;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Integer,
    Text,
    Date,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Integer => f.write_str("integer"),
            ParamKind::Text => f.write_str("text"),
            ParamKind::Date => f.write_str("date"),
        }
    }
}

/// A bound parameter value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Text(String),
    Date(NaiveDate),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Int(_) => ParamKind::Integer,
            ParamValue::Text(_) => ParamKind::Text,
            ParamValue::Date(_) => ParamKind::Date,
        }
    }

    /// Coerce into `kind`. Text is parsed when the target kind is not text;
    /// any other mismatch is refused.
    fn coerce(self, kind: ParamKind) -> Result<Self, ParamValue> {
        match (self, kind) {
            (value, kind) if value.kind() == kind => Ok(value),
            (ParamValue::Text(text), ParamKind::Integer) => {
                text.trim().parse().map(ParamValue::Int).map_err(|_| ParamValue::Text(text))
            }
            (ParamValue::Text(text), ParamKind::Date) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map(ParamValue::Date)
                .map_err(|_| ParamValue::Text(text)),
            (value, _) => Err(value),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
            ParamValue::Date(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(v: NaiveDate) -> Self {
        ParamValue::Date(v)
    }
}

/// Declaration of one operation parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Default applied when the parameter is omitted; `None` makes it required
    pub default: Option<&'static str>,
    /// Inclusive bounds for integer parameters
    pub range: Option<(i64, i64)>,
    pub help: &'static str,
}

impl ParamSpec {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Parameter bindings, ordered by name so equal bindings compare and hash
/// equally regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ParamValue::Text(v)) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse `name=value` assignments into untyped (text) bindings.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Params::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (name, value) = assignment.split_once('=').ok_or_else(|| {
                QueryError::invalid(format!("parameter '{assignment}' is not in name=value form"))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(QueryError::invalid(format!("parameter '{assignment}' has no name")));
            }
            params.insert(name, value);
        }
        Ok(params)
    }

    /// Check bindings against `schema` and return them normalized: typed,
    /// defaults filled in, unknown names refused.
    pub fn validate(&self, operation: &str, schema: &[ParamSpec]) -> Result<Params, QueryError> {
        if let Some(unknown) = self.0.keys().find(|name| !schema.iter().any(|s| s.name == *name)) {
            let accepted: Vec<_> = schema.iter().map(|s| s.name).collect();
            return Err(QueryError::invalid(format!(
                "operation '{operation}' has no parameter '{unknown}' (accepted: {})",
                if accepted.is_empty() { "none".to_owned() } else { accepted.join(", ") }
            )));
        }

        let mut normalized = Params::new();
        for spec in schema {
            let raw = match (self.0.get(spec.name), spec.default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => ParamValue::Text(default.to_owned()),
                (None, None) => {
                    return Err(QueryError::invalid(format!(
                        "operation '{operation}' requires parameter '{}' ({})",
                        spec.name, spec.kind
                    )))
                }
            };

            let value = raw.coerce(spec.kind).map_err(|value| {
                QueryError::invalid(format!(
                    "parameter '{}' of operation '{operation}' must be {}, got {} '{value}'",
                    spec.name,
                    spec.kind,
                    value.kind()
                ))
            })?;

            if let (ParamValue::Int(v), Some((min, max))) = (&value, spec.range) {
                if *v < min || *v > max {
                    return Err(QueryError::invalid(format!(
                        "parameter '{}' of operation '{operation}' must be between {min} and {max}, got {v}",
                        spec.name
                    )));
                }
            }
            if let ParamValue::Text(v) = &value {
                if v.trim().is_empty() {
                    return Err(QueryError::invalid(format!(
                        "parameter '{}' of operation '{operation}' must not be empty",
                        spec.name
                    )));
                }
            }

            normalized.0.insert(spec.name.to_owned(), value);
        }
        Ok(normalized)
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}
