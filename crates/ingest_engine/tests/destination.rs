use std::fs;

use ingest_engine::{
    Destination, JsonlDestination, LoadPackage, TableBatch, TableKeys, TableSchema,
    TableSchemaUpdate, SCHEMA_FILENAME,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

fn package(load_id: &str, tables: Vec<TableBatch>) -> LoadPackage {
    LoadPackage {
        load_id: load_id.to_string(),
        tables,
    }
}

fn batch(table: &str, rows: Vec<serde_json::Value>) -> TableBatch {
    TableBatch {
        table: table.to_string(),
        rows,
    }
}

#[test]
fn load_writes_one_jsonl_file_per_table() {
    let dir = TempDir::new().unwrap();
    let mut destination = JsonlDestination::new(dir.path(), "landing_zone");

    let report = destination
        .load(&package(
            "1723190400.000000",
            vec![
                batch("film_permits", vec![json!({"eventid": "1"}), json!({"eventid": "2"})]),
                batch("staten_island_ferry_ridership_counts", vec![]),
            ],
        ))
        .expect("load");

    assert_eq!(report.rows_loaded, 2);
    assert!(report.failed_jobs.is_empty());
    let written = fs::read_to_string(
        dir.path()
            .join("landing_zone/film_permits/1723190400.000000.jsonl"),
    )
    .unwrap();
    assert_eq!(written, "{\"eventid\":\"1\"}\n{\"eventid\":\"2\"}\n");
    assert!(!dir
        .path()
        .join("landing_zone/staten_island_ferry_ridership_counts")
        .exists());
}

#[test]
fn schema_updates_report_only_new_columns() {
    let dir = TempDir::new().unwrap();
    let mut destination = JsonlDestination::new(dir.path(), "landing_zone");

    let first = destination
        .load(&package(
            "1.000001",
            vec![batch("film_permits", vec![json!({"eventid": "1", "borough": "Queens"})])],
        ))
        .unwrap();
    assert_eq!(
        first.schema_updates,
        vec![TableSchemaUpdate {
            table: "film_permits".to_string(),
            new_columns: vec!["borough".to_string(), "eventid".to_string()],
        }]
    );

    let second = destination
        .load(&package(
            "2.000002",
            vec![batch("film_permits", vec![json!({"eventid": "2", "borough": "Bronx"})])],
        ))
        .unwrap();
    assert!(second.schema_updates.is_empty());

    let third = destination
        .load(&package(
            "3.000003",
            vec![batch(
                "film_permits",
                vec![json!({"eventid": "3", "zipcode_s": "11101"})],
            )],
        ))
        .unwrap();
    assert_eq!(third.schema_updates[0].new_columns, vec!["zipcode_s".to_string()]);
    assert_eq!(
        destination.known_columns("film_permits").unwrap(),
        vec!["borough", "eventid", "zipcode_s"]
    );
    assert!(dir.path().join("landing_zone").join(SCHEMA_FILENAME).is_file());
}

#[test]
fn unwritable_table_becomes_a_failed_job_and_others_still_load() {
    let dir = TempDir::new().unwrap();
    let dataset_dir = dir.path().join("landing_zone");
    fs::create_dir_all(&dataset_dir).unwrap();
    // A plain file where the table directory should be.
    fs::write(dataset_dir.join("film_permits"), b"not a directory").unwrap();
    let mut destination = JsonlDestination::new(dir.path(), "landing_zone");

    let report = destination
        .load(&package(
            "1.000000",
            vec![
                batch("film_permits", vec![json!({"eventid": "1"})]),
                batch("service_requests_311", vec![json!({"unique_key": "9"})]),
            ],
        ))
        .unwrap();

    assert_eq!(report.failed_jobs.len(), 1);
    assert_eq!(report.failed_jobs[0].table, "film_permits");
    assert_eq!(report.rows_loaded, 1);
    assert_eq!(report.schema_updates.len(), 1);
    assert_eq!(report.schema_updates[0].table, "service_requests_311");
}

#[test]
fn corrupt_schema_file_fails_the_load() {
    let dir = TempDir::new().unwrap();
    let dataset_dir = dir.path().join("landing_zone");
    fs::create_dir_all(&dataset_dir).unwrap();
    fs::write(dataset_dir.join(SCHEMA_FILENAME), b"{not json").unwrap();
    let mut destination = JsonlDestination::new(dir.path(), "landing_zone");

    let result = destination.load(&package(
        "1.000000",
        vec![batch("film_permits", vec![json!({"eventid": "1"})])],
    ));

    assert!(result.is_err());
}

#[test]
fn pages_accumulate_in_one_file_that_appears_on_finish() {
    let dir = TempDir::new().unwrap();
    let mut destination = JsonlDestination::new(dir.path(), "landing_zone");
    let target = dir
        .path()
        .join("landing_zone/film_permits/1723190400.000000.jsonl");

    destination.begin("1723190400.000000").unwrap();
    destination
        .write_page("film_permits", &[json!({"eventid": "1"})])
        .unwrap();
    destination
        .write_page("film_permits", &[json!({"eventid": "2", "borough": "Queens"})])
        .unwrap();
    assert!(!target.exists());

    let report = destination.finish().unwrap();

    assert_eq!(report.rows_loaded, 2);
    assert_eq!(
        report.schema_updates,
        vec![TableSchemaUpdate {
            table: "film_permits".to_string(),
            new_columns: vec!["eventid".to_string(), "borough".to_string()],
        }]
    );
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "{\"eventid\":\"1\"}\n{\"borough\":\"Queens\",\"eventid\":\"2\"}\n"
    );
}

#[test]
fn aborted_load_leaves_no_table_file_and_no_schema() {
    let dir = TempDir::new().unwrap();
    let mut destination = JsonlDestination::new(dir.path(), "landing_zone");

    destination.begin("1.000001").unwrap();
    destination
        .write_page("film_permits", &[json!({"eventid": "1"})])
        .unwrap();
    destination.abort();

    let table_dir = dir.path().join("landing_zone/film_permits");
    assert_eq!(fs::read_dir(&table_dir).unwrap().count(), 0);
    assert!(!dir.path().join("landing_zone").join(SCHEMA_FILENAME).exists());
    assert!(destination.finish().is_err());
}

#[test]
fn declared_keys_are_recorded_with_the_columns() {
    let dir = TempDir::new().unwrap();
    let mut destination = JsonlDestination::new(dir.path(), "landing_zone");

    destination.begin("1.000001").unwrap();
    destination
        .declare_table(
            "film_permits",
            &TableKeys {
                primary_key: vec!["eventid".to_string()],
                merge_key: None,
            },
        )
        .unwrap();
    destination
        .declare_table(
            "staten_island_ferry_ridership_counts",
            &TableKeys {
                primary_key: Vec::new(),
                merge_key: Some("date".to_string()),
            },
        )
        .unwrap();
    destination
        .write_page("film_permits", &[json!({"eventid": "1"})])
        .unwrap();
    destination.finish().unwrap();

    assert_eq!(
        destination.table_schema("film_permits").unwrap(),
        Some(TableSchema {
            columns: vec!["eventid".to_string()],
            primary_key: vec!["eventid".to_string()],
            merge_key: None,
        })
    );
    // Keys are known before the table has any rows.
    assert_eq!(
        destination
            .table_schema("staten_island_ferry_ridership_counts")
            .unwrap(),
        Some(TableSchema {
            columns: Vec::new(),
            primary_key: Vec::new(),
            merge_key: Some("date".to_string()),
        })
    );
    let raw = fs::read_to_string(dir.path().join("landing_zone").join(SCHEMA_FILENAME)).unwrap();
    assert!(raw.contains("\"merge_key\": \"date\""), "{raw}");
}

#[test]
fn schema_file_failure_is_a_failed_job_after_tables_are_committed() {
    let dir = TempDir::new().unwrap();
    let mut destination = JsonlDestination::new(dir.path(), "landing_zone");

    destination.begin("1.000001").unwrap();
    destination
        .write_page("film_permits", &[json!({"eventid": "1"})])
        .unwrap();
    // A directory in place of the schema file cannot be replaced.
    fs::create_dir(dir.path().join("landing_zone").join(SCHEMA_FILENAME)).unwrap();

    let report = destination.finish().expect("table data is committed");

    assert_eq!(report.rows_loaded, 1);
    assert_eq!(report.failed_jobs.len(), 1);
    assert_eq!(report.failed_jobs[0].table, SCHEMA_FILENAME);
    assert!(dir
        .path()
        .join("landing_zone/film_permits/1.000001.jsonl")
        .exists());
}
