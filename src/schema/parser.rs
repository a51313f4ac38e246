//! Universal schema parser - SQL DDL, JSON (rows, schema objects, per-table maps) and CSV headers

use super::model::{
    Cardinality, Column, ColumnPointer, ColumnType, Function, Relationship, SchemaModel, Table,
};
use crate::error::{EngineError, EngineResult};
use anyhow::{anyhow, bail, Context};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlparser::ast::{ColumnOption, Expr, ObjectName, Statement, TableConstraint};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::path::Path;
use std::sync::OnceLock;

/// Rows sampled per column when inferring types from data
const MAX_TYPE_SAMPLES: usize = 100;

/// Input format for schema parsing
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchemaFormat {
    #[default]
    Auto,
    Ddl,
    Json,
    Csv,
    NaturalLanguage,
}

impl std::str::FromStr for SchemaFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "ddl" | "sql" => Ok(Self::Ddl),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "nl" | "text" | "natural_language" => Ok(Self::NaturalLanguage),
            other => Err(EngineError::config(format!("unknown schema format '{}'", other))),
        }
    }
}

/// Parse a schema document.
///
/// `table_name` names the table for formats that carry no table name of their own
/// (CSV, JSON array-of-rows). Schemas without declared relationships get
/// `<entity>_id` convention relationships inferred.
pub fn parse_schema(input: &str, format: SchemaFormat, table_name: Option<&str>) -> EngineResult<SchemaModel> {
    let format = match format {
        SchemaFormat::Auto => sniff_format(input, table_name)?,
        other => other,
    };

    let mut schema = match format {
        SchemaFormat::Ddl => parse_ddl(input)?,
        SchemaFormat::Json => parse_json(input, table_name)?,
        SchemaFormat::Csv => {
            let name = table_name.ok_or_else(|| {
                EngineError::malformed_schema_in("CSV schema needs a table name", "csv")
            })?;
            parse_csv(input, name)?
        }
        SchemaFormat::NaturalLanguage => {
            return Err(EngineError::Unsupported {
                message: "natural-language schema descriptions require an external generation service".to_string(),
                dialect: None,
                construct: Some("natural_language_schema".to_string()),
            })
        }
        SchemaFormat::Auto => return Err(EngineError::internal("format sniffing returned Auto")),
    };

    if schema.is_empty() {
        return Err(EngineError::malformed_schema("schema document defines no tables"));
    }
    if schema.relationships().is_empty() {
        let inferred = schema.infer_relationships();
        tracing::debug!(inferred, "inferred relationships from column naming");
    }
    tracing::info!(
        tables = schema.tables().len(),
        relationships = schema.relationships().len(),
        ?format,
        "schema parsed"
    );
    Ok(schema)
}

/// Load a schema file; `Auto` picks the format from the extension before sniffing content
pub fn load_schema_file(
    path: impl AsRef<Path>,
    format: SchemaFormat,
    table_name: Option<&str>,
) -> EngineResult<SchemaModel> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        EngineError::malformed_schema(e.to_string()).with_context(path.display().to_string())
    })?;

    let format = match (format, path.extension().and_then(|e| e.to_str())) {
        (SchemaFormat::Auto, Some("sql")) => SchemaFormat::Ddl,
        (SchemaFormat::Auto, Some("json")) => SchemaFormat::Json,
        (SchemaFormat::Auto, Some("csv")) => SchemaFormat::Csv,
        (f, _) => f,
    };

    // CSV files default to their stem as table name
    let stem = path.file_stem().and_then(|s| s.to_str());
    let table_name = table_name.or(if format == SchemaFormat::Csv { stem } else { None });
    parse_schema(&content, format, table_name)
}

fn sniff_format(input: &str, table_name: Option<&str>) -> EngineResult<SchemaFormat> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(SchemaFormat::Json);
    }
    if trimmed.to_ascii_uppercase().contains("CREATE TABLE") {
        return Ok(SchemaFormat::Ddl);
    }
    if table_name.is_some() && trimmed.lines().next().map_or(false, |l| l.contains(',')) {
        return Ok(SchemaFormat::Csv);
    }
    Err(EngineError::malformed_schema(
        "could not detect schema format (expected DDL, JSON, or CSV with a table name)",
    ))
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

fn parse_ddl(sql: &str) -> EngineResult<SchemaModel> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql)?;
    let mut schema = SchemaModel::new();
    let mut indexes = Vec::new();

    for statement in &statements {
        match statement {
            Statement::CreateTable { .. } => {
                let table = table_from_create(statement)
                    .map_err(|e| EngineError::malformed_schema_in(format!("{:#}", e), "ddl"))?;
                schema.add_table(table);
            }
            Statement::CreateIndex { table_name, columns, .. } => {
                for col in columns {
                    if let Expr::Identifier(ident) = &col.expr {
                        indexes.push((object_name(table_name), ident.value.clone()));
                    }
                }
            }
            other => tracing::debug!(statement = %other, "ignoring non-DDL statement in schema"),
        }
    }

    for (table, column) in indexes {
        if !schema.mark_indexed(&table, &column) {
            tracing::warn!(%table, %column, "CREATE INDEX names an unknown column");
        }
    }
    Ok(schema)
}

fn table_from_create(statement: &Statement) -> anyhow::Result<Table> {
    let Statement::CreateTable { name, columns, constraints, .. } = statement else {
        bail!("not a CREATE TABLE statement");
    };
    let table_name = object_name(name);
    if columns.is_empty() {
        bail!("table {} declares no columns", table_name);
    }

    let mut table = Table::new(&table_name);
    for def in columns {
        let mut column = Column::new(&def.name.value, ColumnType::from_type_name(&def.data_type.to_string()));
        for opt in &def.options {
            match &opt.option {
                ColumnOption::NotNull => column.nullable = false,
                ColumnOption::Unique { is_primary: true, .. } => {
                    column = column.primary_key();
                }
                ColumnOption::Unique { is_primary: false, .. } => column.indexed = true,
                ColumnOption::ForeignKey { foreign_table, referred_columns, .. } => {
                    let target_column = referred_columns
                        .first()
                        .map(|i| i.value.clone())
                        .unwrap_or_else(|| "id".to_string());
                    column.references = Some(ColumnPointer::new(object_name(foreign_table), target_column));
                }
                _ => {}
            }
        }
        table.columns.push(column);
    }

    for constraint in constraints {
        match constraint {
            TableConstraint::Unique { columns, is_primary, .. } => {
                for ident in columns {
                    let col = find_column_mut(&mut table, &ident.value)
                        .with_context(|| format!("constraint on table {}", table_name))?;
                    if *is_primary {
                        col.primary_key = true;
                        col.nullable = false;
                    }
                    col.indexed = true;
                }
            }
            TableConstraint::ForeignKey { columns, foreign_table, referred_columns, .. } => {
                for (i, ident) in columns.iter().enumerate() {
                    let target_column = referred_columns
                        .get(i)
                        .map(|c| c.value.clone())
                        .unwrap_or_else(|| "id".to_string());
                    let col = find_column_mut(&mut table, &ident.value)
                        .with_context(|| format!("foreign key on table {}", table_name))?;
                    col.references = Some(ColumnPointer::new(object_name(foreign_table), target_column));
                }
            }
            _ => {}
        }
    }
    Ok(table)
}

fn find_column_mut<'a>(table: &'a mut Table, name: &str) -> anyhow::Result<&'a mut Column> {
    table
        .columns
        .iter_mut()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow!("unknown column {}", name))
}

fn object_name(name: &ObjectName) -> String {
    // Schema qualifiers are dropped: `public.orders` binds as `orders`
    name.0.last().map(|ident| ident.value.clone()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn parse_json(input: &str, table_name: Option<&str>) -> EngineResult<SchemaModel> {
    let value: Value = serde_json::from_str(input)?;
    let mut schema = SchemaModel::new();

    match &value {
        Value::Array(rows) => {
            let name = table_name.unwrap_or("data");
            schema.add_table(table_from_rows(name, rows)?);
        }
        Value::Object(map) if map.contains_key("tables") => {
            parse_schema_object(map, &mut schema)?;
        }
        Value::Object(map) => {
            for (name, body) in map {
                let table = match body {
                    Value::Array(rows) => table_from_rows(name, rows)?,
                    Value::Object(columns) => table_from_column_map(name, columns)?,
                    _ => {
                        return Err(EngineError::malformed_schema_in(
                            format!("table '{}' must map to a column object or an array of rows", name),
                            "json",
                        ))
                    }
                };
                schema.add_table(table);
            }
        }
        _ => {
            return Err(EngineError::malformed_schema_in(
                "expected a JSON object or array at the top level",
                "json",
            ))
        }
    }
    Ok(schema)
}

fn parse_schema_object(map: &Map<String, Value>, schema: &mut SchemaModel) -> EngineResult<()> {
    let tables = map
        .get("tables")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::malformed_schema_in("'tables' must be an array", "json"))?;

    for entry in tables {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::malformed_schema_in("table entry without a name", "json"))?;
        let mut table = match entry.get("columns") {
            Some(Value::Array(columns)) => {
                let mut table = Table::new(name);
                for col in columns {
                    table.columns.push(column_from_json(name, col)?);
                }
                table
            }
            Some(Value::Object(columns)) => table_from_column_map(name, columns)?,
            _ => {
                return Err(EngineError::malformed_schema_in(
                    format!("table '{}' has no columns", name),
                    "json",
                ))
            }
        };
        table.row_count = entry.get("row_count").and_then(Value::as_u64);
        table.synonyms = string_list(entry.get("synonyms"));
        schema.add_table(table);
    }

    if let Some(rels) = map.get("relationships").and_then(Value::as_array) {
        for rel in rels {
            schema.add_relationship(relationship_from_json(rel)?);
        }
    }

    if let Some(funcs) = map.get("functions") {
        let functions: Vec<Function> = serde_json::from_value(funcs.clone())?;
        for f in functions {
            schema.add_function(f);
        }
    }
    Ok(())
}

fn column_from_json(table: &str, value: &Value) -> EngineResult<Column> {
    match value {
        Value::String(name) => Ok(Column::new(name, ColumnType::Unknown)),
        Value::Object(obj) => {
            let name = obj.get("name").and_then(Value::as_str).ok_or_else(|| {
                EngineError::malformed_schema_in(format!("column without a name in table '{}'", table), "json")
            })?;
            let data_type = obj
                .get("type")
                .and_then(Value::as_str)
                .map(ColumnType::from_type_name)
                .unwrap_or(ColumnType::Unknown);
            let mut column = Column::new(name, data_type);
            if obj.get("primary_key").and_then(Value::as_bool).unwrap_or(false) {
                column = column.primary_key();
            }
            if let Some(nullable) = obj.get("nullable").and_then(Value::as_bool) {
                column.nullable = nullable;
            }
            if obj.get("indexed").and_then(Value::as_bool).unwrap_or(false) {
                column.indexed = true;
            }
            column.references = match obj.get("references") {
                Some(Value::String(target)) => Some(pointer_from_str(target)?),
                Some(Value::Object(target)) => Some(pointer_from_object(target)?),
                _ => None,
            };
            column.synonyms = string_list(obj.get("synonyms"));
            Ok(column)
        }
        _ => Err(EngineError::malformed_schema_in(
            format!("column entries in table '{}' must be strings or objects", table),
            "json",
        )),
    }
}

fn table_from_column_map(name: &str, columns: &Map<String, Value>) -> EngineResult<Table> {
    let mut table = Table::new(name);
    for (col_name, spec) in columns {
        let column = match spec {
            Value::String(type_name) => Column::new(col_name, ColumnType::from_type_name(type_name)),
            Value::Object(obj) => {
                let mut obj = obj.clone();
                obj.insert("name".to_string(), Value::String(col_name.clone()));
                column_from_json(name, &Value::Object(obj))?
            }
            _ => Column::new(col_name, ColumnType::Unknown),
        };
        table.columns.push(column);
    }
    if table.columns.is_empty() {
        return Err(EngineError::malformed_schema_in(format!("table '{}' has no columns", name), "json"));
    }
    Ok(table)
}

fn relationship_from_json(value: &Value) -> EngineResult<Relationship> {
    let pointer = |key: &str| -> EngineResult<ColumnPointer> {
        match value.get(key) {
            Some(Value::String(s)) => pointer_from_str(s),
            Some(Value::Object(o)) => pointer_from_object(o),
            _ => Err(EngineError::malformed_schema_in(format!("relationship missing '{}'", key), "json")),
        }
    };
    let cardinality = match value.get("cardinality") {
        Some(c) => serde_json::from_value(c.clone())?,
        None => Cardinality::ManyToOne,
    };
    Ok(Relationship {
        from: pointer("from")?,
        to: pointer("to")?,
        cardinality,
    })
}

fn pointer_from_str(s: &str) -> EngineResult<ColumnPointer> {
    match s.split_once('.') {
        Some((table, column)) if !table.is_empty() && !column.is_empty() => Ok(ColumnPointer::new(table, column)),
        _ => Err(EngineError::malformed_schema_in(
            format!("'{}' is not a table.column reference", s),
            "json",
        )),
    }
}

fn pointer_from_object(obj: &Map<String, Value>) -> EngineResult<ColumnPointer> {
    let table = obj.get("table").and_then(Value::as_str);
    let column = obj.get("column").and_then(Value::as_str).unwrap_or("id");
    match table {
        Some(table) => Ok(ColumnPointer::new(table, column)),
        None => Err(EngineError::malformed_schema_in("reference object needs a 'table'", "json")),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Infer columns from JSON rows: union of keys in first-seen order, types from values
fn table_from_rows(name: &str, rows: &[Value]) -> EngineResult<Table> {
    let mut table = Table::new(name);
    let mut seen_null: Vec<bool> = Vec::new();

    for row in rows.iter().take(MAX_TYPE_SAMPLES) {
        let Value::Object(obj) = row else {
            return Err(EngineError::malformed_schema_in(
                format!("rows for '{}' must be JSON objects", name),
                "json",
            ));
        };
        for (key, value) in obj {
            let idx = match table.columns.iter().position(|c| &c.name == key) {
                Some(idx) => idx,
                None => {
                    table.columns.push(Column::new(key, ColumnType::Unknown).not_null());
                    seen_null.push(false);
                    table.columns.len() - 1
                }
            };
            let observed = json_value_type(value);
            if observed.is_none() {
                seen_null[idx] = true;
            }
            let column = &mut table.columns[idx];
            column.data_type = merge_types(column.data_type, observed);
        }
    }

    if table.columns.is_empty() {
        return Err(EngineError::malformed_schema_in(format!("no rows to infer '{}' from", name), "json"));
    }
    for (column, nullable) in table.columns.iter_mut().zip(seen_null) {
        column.nullable = nullable;
        if column.name.eq_ignore_ascii_case("id") {
            column.primary_key = true;
            column.indexed = true;
        }
    }
    table.row_count = Some(rows.len() as u64);
    Ok(table)
}

fn json_value_type(value: &Value) -> Option<ColumnType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(ColumnType::Boolean),
        Value::Number(n) if n.is_f64() => Some(ColumnType::Float),
        Value::Number(_) => Some(ColumnType::Integer),
        Value::String(s) => Some(text_value_type(s)),
        Value::Array(_) | Value::Object(_) => Some(ColumnType::Text),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn parse_csv(input: &str, table_name: &str) -> EngineResult<SchemaModel> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes());
    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(EngineError::malformed_schema_in("CSV has no header row", "csv"));
    }

    let mut types: Vec<Option<ColumnType>> = vec![None; headers.len()];
    let mut nullable = vec![false; headers.len()];
    let mut rows = 0u64;

    for record in reader.records() {
        let record = record?;
        rows += 1;
        if rows as usize > MAX_TYPE_SAMPLES {
            continue;
        }
        for (i, field) in record.iter().enumerate().take(headers.len()) {
            if field.trim().is_empty() {
                nullable[i] = true;
                continue;
            }
            let observed = text_value_type(field.trim());
            types[i] = Some(match types[i] {
                Some(current) => merge_types(current, Some(observed)),
                None => observed,
            });
        }
    }

    let mut table = Table::new(table_name);
    for (i, header) in headers.iter().enumerate() {
        let header = header.trim();
        if header.is_empty() {
            continue;
        }
        let mut column = Column::new(header, types[i].unwrap_or(ColumnType::Text));
        column.nullable = nullable[i] || rows == 0;
        if header.eq_ignore_ascii_case("id") {
            column = column.primary_key();
        }
        table.columns.push(column);
    }
    table.row_count = Some(rows);
    Ok(SchemaModel::new().with_table(table))
}

/// Classify a text sample: integer, float, boolean, ISO date/timestamp or text
fn text_value_type(s: &str) -> ColumnType {
    if s.parse::<i64>().is_ok() {
        ColumnType::Integer
    } else if s.parse::<f64>().is_ok() {
        ColumnType::Float
    } else if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
        ColumnType::Boolean
    } else if iso_date_re().map_or(false, |re| re.is_match(s)) {
        if s.len() > 10 {
            ColumnType::Timestamp
        } else {
            ColumnType::Date
        }
    } else {
        ColumnType::Text
    }
}

fn iso_date_re() -> Option<&'static Regex> {
    static ISO_DATE: OnceLock<Option<Regex>> = OnceLock::new();
    ISO_DATE
        .get_or_init(|| {
            Regex::new(r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$").ok()
        })
        .as_ref()
}

/// Widen a column type with a newly observed value type
fn merge_types(current: ColumnType, observed: Option<ColumnType>) -> ColumnType {
    let Some(observed) = observed else { return current };
    match (current, observed) {
        (ColumnType::Unknown, t) => t,
        (a, b) if a == b => a,
        (ColumnType::Integer, ColumnType::Float) | (ColumnType::Float, ColumnType::Integer) => ColumnType::Float,
        (ColumnType::Date, ColumnType::Timestamp) | (ColumnType::Timestamp, ColumnType::Date) => ColumnType::Timestamp,
        _ => ColumnType::Text,
    }
}
