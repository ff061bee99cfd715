use super::operation::Operation;
use super::params::Params;
use crate::error::QueryError;
use crate::partition::{PartitionKey, PartitionUri, QueryScope};
use crate::utils::quote_literal;
use chrono::NaiveDate;
use tracing::debug;

/// One partition file the query will scan
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanTarget {
    pub key: PartitionKey,
    pub uri: PartitionUri,
}

/// A rendered, self-contained query ready for execution.
///
/// The inputs are kept alongside the SQL so the executor can re-render the
/// same query over fewer partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    operation: Operation,
    params: Params,
    targets: Vec<ScanTarget>,
    range_filter: Option<(NaiveDate, NaiveDate)>,
    sql: String,
}

impl BuiltQuery {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Normalized parameters, defaults included
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn targets(&self) -> &[ScanTarget] {
        &self.targets
    }

    /// Day filter applied when the scope covers partitions only in part
    pub fn range_filter(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.range_filter
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The same query over the targets for which `keep` holds, or `None`
    /// when no target would remain.
    pub fn restricted_to<F>(&self, keep: F) -> Option<BuiltQuery>
    where
        F: Fn(&ScanTarget) -> bool,
    {
        let targets: Vec<ScanTarget> = self.targets.iter().filter(|t| keep(t)).cloned().collect();
        if targets.is_empty() {
            return None;
        }
        let sql = QueryBuilder::render(self.operation, &self.params, &targets, self.range_filter);
        Some(BuiltQuery {
            operation: self.operation,
            params: self.params.clone(),
            targets,
            range_filter: self.range_filter,
            sql,
        })
    }
}

/// Renders operations into SQL over scoped partition files
pub struct QueryBuilder;

impl QueryBuilder {
    /// Validate `params` and render `operation` over the available
    /// partitions of `scope`. No I/O happens here.
    pub fn build(
        operation: Operation,
        params: &Params,
        scope: &QueryScope,
    ) -> Result<BuiltQuery, QueryError> {
        let params = operation.validate(params)?;

        let targets: Vec<ScanTarget> = scope
            .available()
            .map(|(key, uri)| ScanTarget { key, uri: uri.clone() })
            .collect();
        if targets.is_empty() {
            return Err(QueryError::NoAvailableData {
                operation: operation.id().to_owned(),
            });
        }

        let range_filter = scope.is_trimmed().then(|| scope.range());
        let sql = Self::render(operation, &params, &targets, range_filter);
        debug!(
            operation = %operation,
            partitions = targets.len(),
            filtered = range_filter.is_some(),
            "Built query"
        );

        Ok(BuiltQuery { operation, params, targets, range_filter, sql })
    }

    fn render(
        operation: Operation,
        params: &Params,
        targets: &[ScanTarget],
        range_filter: Option<(NaiveDate, NaiveDate)>,
    ) -> String {
        format!(
            "WITH changesets AS (\n    {}\n)\n{}",
            Self::generate_source_sql(targets, range_filter),
            operation.render(params)
        )
    }

    /// Generate the relation scanning `targets`, optionally filtered to a
    /// day range on `created_at`
    pub fn generate_source_sql(
        targets: &[ScanTarget],
        range_filter: Option<(NaiveDate, NaiveDate)>,
    ) -> String {
        let files = targets
            .iter()
            .map(|t| quote_literal(t.uri.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT * FROM read_parquet([{files}], union_by_name = true)");
        if let Some((start, end)) = range_filter {
            sql.push_str(&format!(
                "\n    WHERE CAST(created_at AS DATE) BETWEEN DATE '{start}' AND DATE '{end}'"
            ));
        }
        sql
    }
}
