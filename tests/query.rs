mod common;

use common::{changeset, date, rows, write_partition, Changeset, Dataset};
use osm_changesets::query::DropReason;
use osm_changesets::{FailureCause, Params, QueryError, QueryResult, ScopeSpec};
use std::collections::BTreeMap;
use std::error::Error;

type TestResult = Result<(), Box<dyn Error>>;

fn day_rows(day: u32, changes: &[i64]) -> Vec<Changeset> {
    let created_at = format!("2023-01-{day:02} 08:00:00");
    changes
        .iter()
        .enumerate()
        .map(|(i, n)| changeset(i64::from(day) * 100 + i as i64, "alice", &created_at, *n))
        .collect()
}

fn write_days(dataset: &Dataset, days: &[u32]) -> TestResult {
    for day in days {
        write_partition(&dataset.day_path(2023, 1, *day), &day_rows(*day, &[i64::from(*day), 1]))?;
    }
    Ok(())
}

fn first_five_days() -> ScopeSpec {
    ScopeSpec::range(date(2023, 1, 1), date(2023, 1, 5))
}

#[tokio::test]
async fn test_changes_per_day_over_three_partitions() -> TestResult {
    let dataset = Dataset::daily()?;
    write_days(&dataset, &[1, 2, 3])?;
    let core = dataset.core()?;

    let result = core
        .run("changes-per-day", &Params::new(), &ScopeSpec::range(date(2023, 1, 1), date(2023, 1, 3)))
        .await?;

    let QueryResult::Complete(table) = &result else {
        panic!("expected complete result, got {result:?}");
    };
    assert_eq!(table.row_count, 3);
    assert_eq!(table.partitions_read.len(), 3);
    let columns: Vec<_> = table.columns().into_iter().map(|(name, _)| name).collect();
    assert_eq!(columns, vec!["day", "changesets", "object_changes"]);

    let rows = rows(table);
    assert_eq!(rows[0]["day"], "2023-01-01");
    assert_eq!(rows[0]["changesets"], 2);
    assert_eq!(rows[2]["object_changes"], 4);
    Ok(())
}

#[tokio::test]
async fn test_missing_partitions_give_partial_result() -> TestResult {
    let dataset = Dataset::daily()?;
    write_days(&dataset, &[1, 3, 5])?;
    let core = dataset.core()?;

    let result = core.run("changes-per-day", &Params::new(), &first_five_days()).await?;

    let QueryResult::Partial { table, dropped } = &result else {
        panic!("expected partial result, got {result:?}");
    };
    let dropped_days: Vec<_> = dropped.iter().map(|d| d.key.to_string()).collect();
    assert_eq!(dropped_days, vec!["2023-01-02", "2023-01-04"]);
    assert!(dropped.iter().all(|d| matches!(d.reason, DropReason::Unreachable(_))));
    assert_eq!(table.row_count, 3);
    assert_eq!(table.partitions_read.len(), 3);
    assert!(!table.sql.contains("2023/01/02.parquet"));

    // Partial results are served again without rescanning
    assert_eq!(core.cache().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_all_partitions_missing_fails_and_is_not_cached() -> TestResult {
    let dataset = Dataset::daily()?;
    let core = dataset.core()?;

    let result = core.run("period-summary", &Params::new(), &first_five_days()).await?;
    let failure = result.failure().expect("failure");
    assert!(matches!(failure.cause, FailureCause::NoReachablePartitions { .. }));
    assert_eq!(result.dropped().len(), 5);
    assert!(core.cache().is_empty());

    write_days(&dataset, &[1, 2, 3, 4, 5])?;
    let result = core.run("period-summary", &Params::new(), &first_five_days()).await?;
    assert!(result.is_complete(), "{result:?}");
    let table = result.table().expect("table");
    assert_eq!(rows(table)[0]["changesets"], 10);
    Ok(())
}

#[tokio::test]
async fn test_cached_result_survives_source_removal() -> TestResult {
    let dataset = Dataset::daily()?;
    write_days(&dataset, &[1, 2])?;
    let core = dataset.core()?;
    let scope = ScopeSpec::range(date(2023, 1, 1), date(2023, 1, 2));

    let first = core.run("count-by-user", &Params::new(), &scope).await?;
    std::fs::remove_dir_all(dataset.dir.path().join("2023"))?;
    let second = core
        .run("count-by-user", &Params::new().with("limit", "25"), &scope)
        .await?;

    assert!(first.is_complete());
    assert_eq!(first, second);
    assert_eq!(core.cache().stats().hits, 1);

    core.cache().clear();
    let third = core.run("count-by-user", &Params::new(), &scope).await?;
    assert!(third.failure().is_some());
    Ok(())
}

#[tokio::test]
async fn test_top_applications_normalises_editors() -> TestResult {
    let dataset = Dataset::daily()?;
    let mut rows_in = Vec::new();
    for (i, (editor, changes)) in [
        (Some("JOSM/1.5 (18303 en)"), 10),
        (Some("JOSM/1.5 (18463 de)"), 5),
        (Some("iD 2.21.1"), 7),
        (Some("Every_Door Android 4.1"), 3),
        (None, 1),
    ]
    .into_iter()
    .enumerate()
    {
        rows_in.push(Changeset {
            created_by: editor,
            ..changeset(i as i64, "bob", "2023-01-01 12:00:00", changes)
        });
    }
    write_partition(&dataset.day_path(2023, 1, 1), &rows_in)?;
    let core = dataset.core()?;

    let result = core
        .run("top-applications", &Params::new(), &ScopeSpec::on(date(2023, 1, 1)))
        .await?;
    let table = result.table().expect("table");
    let editors: BTreeMap<String, i64> = rows(table)
        .iter()
        .map(|row| {
            (
                row["editor"].as_str().unwrap_or_default().to_owned(),
                row["object_changes"].as_i64().unwrap_or_default(),
            )
        })
        .collect();

    assert_eq!(editors.len(), 4);
    assert_eq!(editors["JOSM"], 15);
    assert_eq!(editors["iD"], 7);
    assert_eq!(editors["EveryDoor"], 3);
    assert_eq!(editors["<unknown>"], 1);
    assert_eq!(rows(table)[0]["editor"], "JOSM");
    Ok(())
}

#[tokio::test]
async fn test_count_by_user_respects_limit() -> TestResult {
    let dataset = Dataset::daily()?;
    write_partition(
        &dataset.day_path(2023, 1, 1),
        &[
            changeset(1, "alice", "2023-01-01 01:00:00", 1),
            changeset(2, "alice", "2023-01-01 02:00:00", 1),
            changeset(3, "bob", "2023-01-01 03:00:00", 9),
        ],
    )?;
    let core = dataset.core()?;

    let result = core
        .run("count-by-user", &Params::new().with("limit", "1"), &ScopeSpec::on(date(2023, 1, 1)))
        .await?;
    let rows = rows(result.table().expect("table"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["user"], "alice");
    assert_eq!(rows[0]["changesets"], 2);
    Ok(())
}

#[tokio::test]
async fn test_user_activity_with_quoted_name() -> TestResult {
    let dataset = Dataset::daily()?;
    write_partition(
        &dataset.day_path(2023, 1, 1),
        &[
            changeset(1, "o'brien", "2023-01-01 01:00:00", 4),
            changeset(2, "alice", "2023-01-01 02:00:00", 1),
        ],
    )?;
    let core = dataset.core()?;

    let result = core
        .run("user-activity", &Params::new().with("user", "o'brien"), &ScopeSpec::on(date(2023, 1, 1)))
        .await?;
    let rows = rows(result.table().expect("table"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["object_changes"], 4);
    Ok(())
}

#[tokio::test]
async fn test_partial_year_scope_filters_rows() -> TestResult {
    let dataset = Dataset::yearly()?;
    write_partition(
        &dataset.year_path(2023),
        &[
            changeset(1, "alice", "2023-01-15 10:00:00", 1),
            changeset(2, "alice", "2023-03-02 10:00:00", 2),
            changeset(3, "bob", "2023-03-30 10:00:00", 3),
            changeset(4, "bob", "2023-07-01 10:00:00", 4),
        ],
    )?;
    let core = dataset.core()?;

    let march: ScopeSpec = "2023-03".parse()?;
    let result = core.run("period-summary", &Params::new(), &march).await?;
    let row = &rows(result.table().expect("table"))[0];
    assert_eq!(row["changesets"], 2);
    assert_eq!(row["unique_users"], 2);
    assert_eq!(row["object_changes"], 5);

    let result = core.run("dataset-range", &Params::new(), &"2023".parse()?).await?;
    let row = &rows(result.table().expect("table"))[0];
    assert_eq!(row["first_opened"], "2023-01-15T10:00:00");
    assert_eq!(row["last_opened"], "2023-07-01T10:00:00");
    Ok(())
}

#[tokio::test]
async fn test_request_errors_are_returned_before_execution() -> TestResult {
    let dataset = Dataset::daily()?;
    let core = dataset.core()?;

    let err = core
        .run("changes-per-day", &Params::new(), &ScopeSpec::range(date(2023, 1, 5), date(2023, 1, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::EmptyScope(_)));

    let err = core
        .run("changes-per-day", &Params::new(), &ScopeSpec::range(date(2031, 1, 1), date(2031, 1, 2)))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::EmptyScope(_)));

    let err = core
        .run("count-by-user", &Params::new().with("limit", "many"), &first_five_days())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidRequest(_)));

    let err = core
        .run("user-activity", &Params::new(), &first_five_days())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidRequest(_)));

    assert!(core.cache().is_empty());
    assert_eq!(core.cache().stats().misses, 0);
    Ok(())
}

#[tokio::test]
async fn test_summary_against_previous_year() -> TestResult {
    let dataset = Dataset::yearly()?;
    write_partition(
        &dataset.year_path(2022),
        &[
            changeset(1, "alice", "2022-05-01 10:00:00", 10),
            changeset(2, "bob", "2022-06-01 10:00:00", 5),
        ],
    )?;
    write_partition(
        &dataset.year_path(2023),
        &[
            changeset(3, "alice", "2023-05-01 10:00:00", 1),
            changeset(4, "bob", "2023-06-01 10:00:00", 2),
            changeset(5, "carl", "2023-07-01 10:00:00", 3),
        ],
    )?;
    let core = dataset.core()?;

    let comparison = core.compare_with_previous_year(&"2023".parse()?).await?;
    assert!(comparison.current.is_complete());
    assert_eq!(comparison.delta("changesets"), Some(1));
    assert_eq!(comparison.delta("unique_users"), Some(1));
    assert_eq!(comparison.delta("object_changes"), Some(-9));

    // 2021 has no file, so there is nothing to compare against
    let comparison = core.compare_with_previous_year(&"2022".parse()?).await?;
    assert!(comparison.previous.as_ref().is_some_and(|r| r.failure().is_some()));
    assert_eq!(comparison.delta("changesets"), None);
    Ok(())
}
