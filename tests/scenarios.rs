//! End-to-end scenarios through the public engine API
//!
//! Run with: `cargo test --test scenarios`

mod common;

use common::{orders_only_schema, shop_schema, SqliteExecutor};
use nlsql_engine::ir::{AggregateFunction, ColumnRef, ConditionValue};
use nlsql_engine::nlp::{EntityKind, EntityRecognizer, Tokenizer};
use nlsql_engine::schema::{Column, ColumnType, Table};
use nlsql_engine::{Dialect, EngineConfig, NlSqlEngine, RecognizerConfig, SchemaModel};
use serde_json::json;

#[test]
fn test_total_revenue_per_customer_executes() {
    let engine = NlSqlEngine::new(shop_schema(), EngineConfig::default()).unwrap();
    let executor = SqliteExecutor::shop();

    let (translation, result) = engine
        .translate_and_execute("Show total revenue per customer", Dialect::Sqlite, &executor)
        .unwrap();
    assert!(translation.sql.contains("SUM("), "{}", translation.sql);
    assert!(translation.sql.contains("GROUP BY"));
    assert!(translation.sql.contains("JOIN"));

    let result = result.unwrap();
    assert_eq!(result.row_count(), 2);
    let names = result.column_values("customers.name").unwrap();
    let totals = result.column_values("total_revenue").unwrap();
    let mut by_name: Vec<(String, f64)> = names
        .iter()
        .zip(totals.iter())
        .map(|(n, t)| (n.as_str().unwrap().to_string(), t.as_f64().unwrap()))
        .collect();
    by_name.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(by_name, vec![("Alice".to_string(), 37.0), ("Bob".to_string(), 30.0)]);
}

#[test]
fn test_count_orders() {
    let engine = NlSqlEngine::new(orders_only_schema(), EngineConfig::default()).unwrap();
    let translation = engine.translate("count orders", Dialect::Sqlite).unwrap();
    let ir = &translation.ir;

    assert_eq!(ir.columns.len(), 1);
    let agg = ir.columns[0].as_aggregate().unwrap();
    assert_eq!(agg.func, AggregateFunction::Count);
    assert_eq!(agg.column_refs(), vec![&ColumnRef::star("orders")]);
    assert!(ir.group_by.is_empty());
    assert!(ir.joins.is_empty());
    assert!(translation.sql.contains("COUNT(*)"));
}

#[test]
fn test_relative_interval_per_dialect() {
    let engine = NlSqlEngine::new(shop_schema(), EngineConfig::default()).unwrap();

    let sqlite = engine.translate("orders in the last 30 days", Dialect::Sqlite).unwrap();
    assert_eq!(sqlite.ir.where_.len(), 1);
    assert_eq!(sqlite.ir.where_[0].rhs, ConditionValue::RelativeInterval { interval_days: 30 });
    assert!(sqlite.sql.contains("DATE('now', '-30 days')"), "{}", sqlite.sql);

    let postgres = engine.translate("orders in the last 30 days", Dialect::Postgres).unwrap();
    assert!(postgres.sql.contains("INTERVAL '30 days'"), "{}", postgres.sql);

    let ansi = engine.translate("orders in the last 30 days", Dialect::Ansi);
    assert!(ansi.is_err());
}

#[test]
fn test_relative_interval_filters_rows() {
    let engine = NlSqlEngine::new(shop_schema(), EngineConfig::default()).unwrap();
    let executor = SqliteExecutor::shop();
    let (_, result) = engine
        .translate_and_execute("orders in the last 30 days", Dialect::Sqlite, &executor)
        .unwrap();
    let result = result.unwrap();
    // order 2 is 40 days old
    assert_eq!(result.row_count(), 2);
    let ids = result.column_values("id").unwrap();
    assert!(!ids.contains(&&json!(2)));
}

#[test]
fn test_ambiguous_column_confidence_penalty() {
    let schema = SchemaModel::new()
        .with_table(
            Table::new("employees")
                .with_column(Column::new("id", ColumnType::Integer).primary_key())
                .with_column(Column::new("title", ColumnType::Text)),
        )
        .with_table(
            Table::new("books")
                .with_column(Column::new("id", ColumnType::Integer).primary_key())
                .with_column(Column::new("title", ColumnType::Text)),
        );
    let config = RecognizerConfig::default();
    let tokens = Tokenizer::for_schema(&schema).unwrap().tokenize("list every title");
    let entities = EntityRecognizer::new(&schema, &config).recognize(&tokens);

    let title = entities.iter().find(|e| e.text == "title").unwrap();
    assert_eq!(title.kind, EntityKind::Column);
    assert!(title.ambiguous);
    assert!(title.table.is_none());
    let before: f64 = title.meta("pre_ambiguity_confidence").unwrap().parse().unwrap();
    assert!((title.confidence - before * 0.7).abs() < 1e-4);
}

#[test]
fn test_execution_failure_is_reported_with_translation() {
    // the engine's schema names a table the database lacks
    let schema = SchemaModel::new().with_table(
        Table::new("invoices")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("total", ColumnType::Decimal)),
    );
    let engine = NlSqlEngine::new(schema, EngineConfig::default()).unwrap();
    let executor = SqliteExecutor::shop();
    let (translation, result) = engine
        .translate_and_execute("count invoices", Dialect::Sqlite, &executor)
        .unwrap();
    assert!(translation.sql.contains("\"invoices\""));
    let err = result.unwrap_err();
    assert!(err.to_string().contains("no such table"));
}
