mod common;

use common::FakeConnection;
use db_encoder::coordinator::{EncodeCoordinator, EncodeRequest};
use db_encoder::dialect::MySqlDialect;
use db_encoder::error::EncodeError;
use db_encoder::inspector::{ColumnRef, SchemaInspector};
use db_encoder::log_sink::NOOP_SINK;
use db_encoder::runner::StatementRunner;

fn catalog() -> FakeConnection {
    FakeConnection::new("shop")
        .with_column("orders", "note", "utf8", &[])
        .with_column("customers", "name", "utf8", &[])
        .with_column("orders", "status", "utf8", &[])
        .with_column("customers", "city", "utf8", &[])
        .with_column("audit", "payload", "latin1", &[])
        .with_foreign_column("archive", "orders", "legacy_note", "utf8")
}

#[test]
fn discovery_is_ordered_by_table_and_scoped_to_current_schema() {
    let mut conn = catalog();
    let inspector = SchemaInspector::new(&MySqlDialect, StatementRunner::new(&NOOP_SINK));
    let columns = inspector
        .find_encoded_columns(&mut conn, "utf8")
        .expect("discovery starts")
        .collect::<Result<Vec<_>, _>>()
        .expect("discovery completes");
    assert_eq!(
        columns,
        vec![
            ColumnRef::new("customers", "name"),
            ColumnRef::new("customers", "city"),
            ColumnRef::new("orders", "note"),
            ColumnRef::new("orders", "status"),
        ]
    );
}

#[test]
fn discovery_is_deterministic_across_runs() {
    let mut conn = catalog();
    let coordinator = EncodeCoordinator::new(MySqlDialect);
    let first = coordinator.discover(&mut conn, "utf8").expect("first");
    let second = coordinator.discover(&mut conn, "utf8").expect("second");
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first.total_columns(), 4);
}

#[test]
fn discovery_binds_schema_and_charset() {
    let mut conn = catalog();
    let inspector = SchemaInspector::new(&MySqlDialect, StatementRunner::new(&NOOP_SINK));
    assert_eq!(inspector.current_schema(&mut conn).expect("schema"), "shop");
    let columns = inspector
        .find_encoded_columns(&mut conn, "latin1")
        .expect("discovery starts")
        .collect::<Result<Vec<_>, _>>()
        .expect("discovery completes");
    assert_eq!(columns, vec![ColumnRef::new("audit", "payload")]);
}

#[test]
fn rows_are_pulled_lazily() {
    let mut conn = catalog();
    conn.fail_catalog_after = Some(2);
    let inspector = SchemaInspector::new(&MySqlDialect, StatementRunner::new(&NOOP_SINK));
    let mut columns = inspector
        .find_encoded_columns(&mut conn, "utf8")
        .expect("discovery starts");

    assert_eq!(
        columns.next().map(|c| c.expect("row 1")),
        Some(ColumnRef::new("customers", "name"))
    );
    assert_eq!(
        columns.next().map(|c| c.expect("row 2")),
        Some(ColumnRef::new("customers", "city"))
    );
    let err = columns
        .next()
        .expect("third row present")
        .expect_err("stream breaks");
    assert_eq!(err.driver_code(), Some(2013));
    assert!(err.sql().expect("sql").contains("`information_schema`.`COLUMNS`"));
}

#[test]
fn broken_catalog_stream_aborts_before_encoding() {
    let mut conn = FakeConnection::new("shop")
        .with_column("a", "x", "utf8", &["Ã©"])
        .with_column("b", "y", "utf8", &["Ã©"]);
    conn.fail_catalog_after = Some(1);
    let err = EncodeCoordinator::new(MySqlDialect)
        .run(&mut conn, &EncodeRequest::default())
        .expect_err("discovery fails");
    assert!(matches!(err, EncodeError::Execute { code: Some(2013), .. }));
    assert_eq!(conn.begins, 0);
    assert!(conn.executed.is_empty());
    assert_eq!(conn.cells("a", "x"), vec![Some("Ã©".to_string())]);
}

#[test]
fn invalid_source_charset_is_rejected_before_any_statement() {
    let mut conn = catalog();
    let inspector = SchemaInspector::new(&MySqlDialect, StatementRunner::new(&NOOP_SINK));
    let err = inspector
        .find_encoded_columns(&mut conn, "utf8' OR '1'='1")
        .err()
        .expect("rejected");
    assert!(matches!(err, EncodeError::InvalidCharset { .. }));
    assert!(conn.prepared.is_empty());
}

#[test]
fn catalog_prepare_failure_propagates() {
    let mut conn = catalog();
    conn.reject_prepare = Some("information_schema".to_string());
    let err = EncodeCoordinator::new(MySqlDialect)
        .discover(&mut conn, "utf8")
        .expect_err("prepare fails");
    assert!(matches!(err, EncodeError::Prepare { .. }));
    assert_eq!(err.driver_code(), Some(1064));
    assert_eq!(err.driver_message(), Some("You have an error in your SQL syntax"));
}
