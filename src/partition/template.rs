//! Partition location templates.
//!
//! A template is a string such as
//! `https://example.org/changesets/{year}/{month:02d}/{day:02d}.parquet`.
//! Recognised placeholders are `{year}`, `{month}` and `{day}`, each with an
//! optional zero-padding spec (`:02` or `:02d`). `{{` and `}}` produce
//! literal braces. Templates are parsed once at startup; anything malformed
//! is a configuration error.

use super::{Granularity, PartitionKey, PartitionUri};
use crate::error::{Error, Result};
use std::fmt;
use std::fmt::Write as _;

/// A date field that can appear in a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Year,
    Month,
    Day,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "year" => Some(Field::Year),
            "month" => Some(Field::Month),
            "day" => Some(Field::Day),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Year => "year",
            Field::Month => "month",
            Field::Day => "day",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder { field: Field, width: usize },
}

/// A key could not supply a value for one of the template's placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    pub field: Field,
    pub granularity: Granularity,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "placeholder {{{}}} is not defined for {} partitions",
            self.field.name(),
            self.granularity
        )
    }
}

impl std::error::Error for RenderError {}

/// Parsed partition location template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(Error::config("partition template is empty"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut body = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        body.push(inner);
                    }
                    if !closed {
                        return Err(Error::config(format!(
                            "unterminated placeholder '{{{body}' in partition template '{source}'"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Self::parse_placeholder(&body, source)?);
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(Error::config(format!(
                        "unmatched '}}' in partition template '{source}'"
                    )));
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let template = Self { source: source.to_owned(), segments };
        if template.fields().next().is_none() {
            return Err(Error::config(format!(
                "partition template '{source}' has no {{year}}, {{month}} or {{day}} placeholder"
            )));
        }
        Ok(template)
    }

    fn parse_placeholder(body: &str, source: &str) -> Result<Segment> {
        let (name, spec) = match body.split_once(':') {
            Some((name, spec)) => (name.trim(), Some(spec.trim())),
            None => (body.trim(), None),
        };
        let field = Field::from_name(name).ok_or_else(|| {
            Error::config(format!(
                "unknown placeholder '{{{name}}}' in partition template '{source}'"
            ))
        })?;

        let width = match spec {
            None => 0,
            Some(spec) => {
                let digits = spec.strip_suffix('d').unwrap_or(spec);
                if digits.is_empty() {
                    0
                } else if digits.starts_with('0') && digits.chars().all(|c| c.is_ascii_digit()) {
                    digits.parse::<usize>().map_err(|e| {
                        Error::config(format!("invalid width in '{{{body}}}': {e}"))
                    })?
                } else {
                    return Err(Error::config(format!(
                        "unsupported format spec '{spec}' in '{{{body}}}', expected e.g. ':02d'"
                    )));
                }
            }
        };

        Ok(Segment::Placeholder { field, width })
    }

    /// Placeholders used by this template, in order of appearance
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder { field, .. } => Some(*field),
            Segment::Literal(_) => None,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Substitute every placeholder with the key's fields.
    ///
    /// Rendering is total or it fails: a key that lacks one of the fields
    /// never yields a partially substituted location.
    pub fn render(&self, key: &PartitionKey) -> std::result::Result<PartitionUri, RenderError> {
        let mut out = String::with_capacity(self.source.len() + 8);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { field, width } => {
                    let value = match field {
                        Field::Year => Some(i64::from(key.year())),
                        Field::Month => key.month().map(i64::from),
                        Field::Day => key.day().map(i64::from),
                    }
                    .ok_or(RenderError { field: *field, granularity: key.granularity() })?;
                    // Writing to a String cannot fail
                    let _ = write!(out, "{value:0width$}", width = *width);
                }
            }
        }
        Ok(PartitionUri::new(out))
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day_key(y: i32, m: u32, d: u32) -> PartitionKey {
        PartitionKey::containing(NaiveDate::from_ymd_opt(y, m, d).unwrap(), Granularity::Day)
    }

    #[test]
    fn test_render_padded_fields() {
        let template =
            UriTemplate::parse("https://example/{year}/{month:02d}/{day:02d}.parquet").unwrap();
        let uri = template.render(&day_key(2023, 1, 3)).unwrap();
        assert_eq!(uri.as_str(), "https://example/2023/01/03.parquet");
    }

    #[test]
    fn test_render_unpadded_and_escaped() {
        let template = UriTemplate::parse("s3://bucket/{{raw}}/{year}-{month}.parquet").unwrap();
        let key = PartitionKey::containing(NaiveDate::from_ymd_opt(2023, 4, 9).unwrap(), Granularity::Month);
        assert_eq!(template.render(&key).unwrap().as_str(), "s3://bucket/{raw}/2023-4.parquet");
    }

    #[test]
    fn test_render_fails_for_undefined_field() {
        let template = UriTemplate::parse("s3://bucket/{year}/{day:02}.parquet").unwrap();
        let key = PartitionKey::containing(NaiveDate::from_ymd_opt(2023, 4, 9).unwrap(), Granularity::Month);
        let err = template.render(&key).unwrap_err();
        assert_eq!(err.field, Field::Day);
        assert_eq!(err.to_string(), "placeholder {day} is not defined for month partitions");
    }

    #[test]
    fn test_malformed_templates_are_config_errors() {
        for bad in [
            "",
            "s3://bucket/static.parquet",
            "s3://bucket/{year",
            "s3://bucket/year}.parquet",
            "s3://bucket/{week}.parquet",
            "s3://bucket/{month:>2}.parquet",
        ] {
            let err = UriTemplate::parse(bad).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "expected config error for {bad:?}");
        }
    }

    #[test]
    fn test_fields_in_order() {
        let template = UriTemplate::parse("{day}/{year}/{month}").unwrap();
        let fields: Vec<_> = template.fields().collect();
        assert_eq!(fields, vec![Field::Day, Field::Year, Field::Month]);
    }
}
