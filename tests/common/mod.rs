//! Shared fixtures: the shop schema and an in-memory SQLite executor

#![allow(dead_code)]

use nlsql_engine::ir::Literal;
use nlsql_engine::schema::{Column, ColumnType, Table};
use nlsql_engine::{ExecutionError, ExecutionResult, SchemaModel, SqlExecutor};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::time::Instant;

pub fn shop_schema() -> SchemaModel {
    let mut schema = SchemaModel::new()
        .with_table(
            Table::new("customers")
                .with_column(Column::new("id", ColumnType::Integer).primary_key())
                .with_column(Column::new("name", ColumnType::Text)),
        )
        .with_table(
            Table::new("orders")
                .with_column(Column::new("id", ColumnType::Integer).primary_key())
                .with_column(Column::new("customer_id", ColumnType::Integer))
                .with_column(Column::new("order_date", ColumnType::Date)),
        )
        .with_table(
            Table::new("order_items")
                .with_column(Column::new("id", ColumnType::Integer).primary_key())
                .with_column(Column::new("order_id", ColumnType::Integer))
                .with_column(Column::new("product", ColumnType::Text))
                .with_column(Column::new("quantity", ColumnType::Integer))
                .with_column(Column::new("unit_price", ColumnType::Decimal)),
        );
    schema.infer_relationships();
    schema
}

pub fn orders_only_schema() -> SchemaModel {
    SchemaModel::new().with_table(
        Table::new("orders")
            .with_column(Column::new("id", ColumnType::Integer).primary_key())
            .with_column(Column::new("status", ColumnType::Text))
            .with_column(Column::new("amount", ColumnType::Float))
            .with_column(Column::new("order_date", ColumnType::Date)),
    )
}

const SHOP_DATA: &str = "
    CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT);
    CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, order_date TEXT);
    CREATE TABLE order_items (
        id INTEGER PRIMARY KEY, order_id INTEGER, product TEXT, quantity INTEGER, unit_price REAL
    );
    INSERT INTO customers VALUES (1, 'Alice'), (2, 'Bob');
    INSERT INTO orders VALUES (1, 1, DATE('now', '-3 days')), (2, 1, DATE('now', '-40 days')), (3, 2, DATE('now'));
    INSERT INTO order_items VALUES
        (1, 1, 'widget', 2, 5.0),
        (2, 1, 'gadget', 1, 12.0),
        (3, 2, 'widget', 3, 5.0),
        (4, 3, 'gizmo', 1, 30.0);
";

/// Black-box executor over an in-memory SQLite database
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    pub fn shop() -> Self {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SHOP_DATA).unwrap();
        Self { conn }
    }
}

fn bind(literal: &Literal) -> SqlValue {
    match literal {
        Literal::Integer(i) => SqlValue::Integer(*i),
        Literal::Float(f) => SqlValue::Real(*f),
        Literal::Text(s) | Literal::Date(s) => SqlValue::Text(s.clone()),
        Literal::Boolean(b) => SqlValue::Integer(*b as i64),
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => json!(b.len()),
    }
}

impl SqlExecutor for SqliteExecutor {
    fn execute(&self, sql: &str, params: &[Literal]) -> Result<ExecutionResult, ExecutionError> {
        let start = Instant::now();
        let mut stmt = self.conn.prepare(sql).map_err(|e| ExecutionError::statement(e.to_string()))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let bound: Vec<SqlValue> = params.iter().map(bind).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound.iter()))
            .map_err(|e| ExecutionError::Binding { message: e.to_string() })?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| ExecutionError::statement(e.to_string()))? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value = row.get_ref(i).map_err(|e| ExecutionError::statement(e.to_string()))?;
                values.push(to_json(value));
            }
            out.push(values);
        }
        Ok(ExecutionResult {
            columns,
            rows: out,
            elapsed: start.elapsed(),
        })
    }
}
