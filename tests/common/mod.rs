//! Common test utilities: fixture partitions written as Parquet through
//! DuckDB, and a query core reading them from a temporary directory.

#![allow(dead_code)]

use chrono::NaiveDate;
use duckdb::arrow::array::RecordBatch;
use duckdb::Connection;
use osm_changesets::config::{CacheSettings, CoreConfig, EngineSettings, PartitionSettings};
use osm_changesets::utils::record_batch_to_json;
use osm_changesets::{Granularity, QueryCore, ResultTable};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One changeset row
#[derive(Debug, Clone)]
pub struct Changeset {
    pub id: i64,
    pub user: String,
    pub uid: i64,
    pub created_at: String,
    pub num_changes: i64,
    pub comments_count: i64,
    pub created_by: Option<&'static str>,
}

pub fn changeset(id: i64, user: &str, created_at: &str, num_changes: i64) -> Changeset {
    Changeset {
        id,
        user: user.to_owned(),
        uid: 1000 + user.len() as i64,
        created_at: created_at.to_owned(),
        num_changes,
        comments_count: 0,
        created_by: Some("JOSM/1.5 (19039 en)"),
    }
}

fn sql_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Write `rows` as a Parquet file at `path`, creating parent directories
pub fn write_partition(path: &Path, rows: &[Changeset]) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let values = rows
        .iter()
        .map(|r| {
            format!(
                "({}, {}, {}, {}, {}, {}, {})",
                r.id,
                sql_text(&r.user),
                r.uid,
                sql_text(&r.created_at),
                r.num_changes,
                r.comments_count,
                r.created_by.map_or_else(|| "NULL".to_owned(), sql_text),
            )
        })
        .collect::<Vec<_>>()
        .join(",\n    ");

    let conn = Connection::open_in_memory()?;
    conn.execute_batch(&format!(
        r#"COPY (
    SELECT
        CAST(id AS BIGINT) AS id,
        CAST("user" AS VARCHAR) AS "user",
        CAST(uid AS BIGINT) AS uid,
        CAST(created_at AS TIMESTAMP) AS created_at,
        CAST(num_changes AS BIGINT) AS num_changes,
        CAST(comments_count AS BIGINT) AS comments_count,
        map(['created_by'], [CAST(created_by AS VARCHAR)]) AS tags
    FROM (VALUES
    {values}
    ) t(id, "user", uid, created_at, num_changes, comments_count, created_by)
) TO {} (FORMAT PARQUET);"#,
        sql_text(&path.display().to_string())
    ))?;
    Ok(())
}

/// A temporary directory laid out as `{year}/{month:02}/{day:02}.parquet`
/// or `{year}.parquet` depending on granularity
pub struct Dataset {
    pub dir: TempDir,
    pub granularity: Granularity,
}

impl Dataset {
    pub fn daily() -> Result<Self, Box<dyn Error>> {
        Ok(Self { dir: tempfile::tempdir()?, granularity: Granularity::Day })
    }

    pub fn yearly() -> Result<Self, Box<dyn Error>> {
        Ok(Self { dir: tempfile::tempdir()?, granularity: Granularity::Year })
    }

    pub fn template(&self) -> String {
        let root = self.dir.path().display();
        match self.granularity {
            Granularity::Day => format!("{root}/{{year}}/{{month:02d}}/{{day:02d}}.parquet"),
            Granularity::Month => format!("{root}/{{year}}/{{month:02d}}.parquet"),
            Granularity::Year => format!("{root}/{{year}}.parquet"),
        }
    }

    pub fn day_path(&self, y: i32, m: u32, d: u32) -> PathBuf {
        self.dir.path().join(format!("{y}/{m:02}/{d:02}.parquet"))
    }

    pub fn year_path(&self, y: i32) -> PathBuf {
        self.dir.path().join(format!("{y}.parquet"))
    }

    pub fn config(&self) -> CoreConfig {
        CoreConfig {
            partitions: PartitionSettings {
                template: self.template(),
                granularity: self.granularity,
                earliest: date(2005, 1, 1),
                latest: Some(date(2023, 12, 31)),
                max_lookback: 400,
            },
            engine: EngineSettings {
                extensions: Vec::new(),
                ..EngineSettings::default()
            },
            cache: CacheSettings::default(),
        }
    }

    pub fn core(&self) -> Result<QueryCore, Box<dyn Error>> {
        Ok(QueryCore::new(&self.config())?)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Every row of a result table as JSON objects
pub fn rows(table: &ResultTable) -> Vec<JsonValue> {
    table
        .batches
        .iter()
        .flat_map(|batch: &RecordBatch| record_batch_to_json(batch).expect("convert batch"))
        .collect()
}
