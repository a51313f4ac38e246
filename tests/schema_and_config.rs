//! Schema files and config files feeding the engine

mod common;

use nlsql_engine::optimizer::RecommendationKind;
use nlsql_engine::schema::ColumnType;
use nlsql_engine::{load_schema_file, Dialect, EngineConfig, EngineError, NlSqlEngine, SchemaFormat};
use std::io::Write;
use tempfile::NamedTempFile;

const DDL: &str = "
CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER REFERENCES customers(id),
    status TEXT,
    order_date DATE
);
CREATE INDEX idx_orders_status ON orders (status);
";

fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_ddl_file_drives_translation() {
    let file = temp_file(".sql", DDL);
    let schema = load_schema_file(file.path(), SchemaFormat::Auto, None).unwrap();
    assert_eq!(schema.tables().len(), 2);
    assert!(schema.column("orders", "status").unwrap().indexed);
    assert_eq!(schema.relationships().len(), 1);

    let engine = NlSqlEngine::new(schema, EngineConfig::default()).unwrap();
    let translation = engine.translate("how many orders per customer", Dialect::Sqlite).unwrap();
    assert!(translation.sql.contains("JOIN \"orders\""), "{}", translation.sql);
    assert!(translation.sql.contains("GROUP BY \"customers\".\"name\""));

    // the same DDL builds a database the generated SQL runs against
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch(DDL).unwrap();
    conn.execute_batch(
        "INSERT INTO customers VALUES (1, 'Alice'), (2, 'Bob');
         INSERT INTO orders VALUES (1, 1, 'shipped', '2024-01-01'), (2, 1, 'pending', '2024-01-02'),
                                   (3, 2, 'shipped', '2024-01-03');",
    )
    .unwrap();
    let mut stmt = conn.prepare(&translation.sql).unwrap();
    let mut counts: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    counts.sort();
    assert_eq!(counts, vec![("Alice".to_string(), 2), ("Bob".to_string(), 1)]);
}

#[test]
fn test_json_file_with_statistics() {
    let file = temp_file(
        ".json",
        r#"{"tables": [
            {"name": "events", "row_count": 5000000, "columns": [
                {"name": "id", "type": "bigint", "primary_key": true},
                {"name": "kind", "type": "varchar"},
                {"name": "created_at", "type": "timestamp"}
            ]}
        ]}"#,
    );
    let schema = load_schema_file(file.path(), SchemaFormat::Auto, None).unwrap();
    assert_eq!(schema.row_count("events"), Some(5_000_000));
    assert_eq!(schema.column("events", "created_at").unwrap().data_type, ColumnType::Timestamp);

    let engine = NlSqlEngine::new(schema, EngineConfig::default()).unwrap();
    let translation = engine.translate("events in the last 7 days", Dialect::Postgres).unwrap();
    assert!(translation.sql.contains("INTERVAL '7 days'"), "{}", translation.sql);
    assert!(translation
        .optimization
        .recommendations
        .iter()
        .any(|r| r.kind == RecommendationKind::PartitionByDate));
}

#[test]
fn test_csv_file_needs_no_explicit_table_name() {
    let file = temp_file(".csv", "id,region,amount\n1,north,10.5\n2,south,3\n");
    let schema = load_schema_file(file.path(), SchemaFormat::Auto, None).unwrap();
    assert_eq!(schema.tables().len(), 1);
    let table = &schema.tables()[0];
    assert_eq!(table.column("amount").unwrap().data_type, ColumnType::Float);

    let named = load_schema_file(file.path(), SchemaFormat::Csv, Some("sales")).unwrap();
    assert!(named.table("sales").is_some());
}

#[test]
fn test_missing_schema_file() {
    let err = load_schema_file("/nonexistent/schema.sql", SchemaFormat::Auto, None).unwrap_err();
    assert!(matches!(err, EngineError::MalformedSchema { .. }));
}

#[test]
fn test_config_file_overrides_defaults() {
    let file = temp_file(
        ".json",
        r#"{
            "default_dialect": "postgres",
            "generator": {"pretty": true},
            "optimizer": {"max_exhaustive_joins": 3, "cache_capacity": 8}
        }"#,
    );
    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.default_dialect, Dialect::Postgres);
    assert!(config.generator.pretty);
    assert!(!config.generator.parameterized);
    assert_eq!(config.optimizer.max_exhaustive_joins, 3);
    assert_eq!(config.optimizer.cache_capacity, 8);
    assert_eq!(config.optimizer.max_permutations, 5040);
    assert!((config.recognizer.fuzzy_threshold - 0.7).abs() < 1e-12);

    let engine = NlSqlEngine::new(common::orders_only_schema(), config).unwrap();
    let translation = engine.translate_default("count orders").unwrap();
    assert_eq!(translation.dialect, Dialect::Postgres);
    assert!(translation.sql.contains('\n'));
}

#[test]
fn test_invalid_config_is_rejected() {
    let file = temp_file(".json", r#"{"recognizer": {"fuzzy_threshold": 1.5}}"#);
    let err = EngineConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, EngineError::Config { .. }));

    let mut config = EngineConfig::default();
    config.optimizer.max_permutations = 0;
    assert!(NlSqlEngine::new(common::orders_only_schema(), config).is_err());
}
