//! Schema Model - tables, columns, relationships and functions every stage binds against.
//!
//! Names match case-insensitively. Relationships declared through column references
//! are registered automatically when a table is added.

use super::naming::{normalize_identifier, pluralize, singularize, surface_forms, words_to_snake};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Logical column type
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Decimal,
    Text,
    Boolean,
    Date,
    Timestamp,
    Unknown,
}

impl ColumnType {
    /// Map a SQL/JSON type name (`VARCHAR(20)`, `int8`, `number`, `datetime`) to a column type
    pub fn from_type_name(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        let base = lower.split(['(', ' ']).next().unwrap_or("");
        match base {
            "int" | "integer" | "int2" | "int4" | "int8" | "bigint" | "smallint" | "tinyint"
            | "mediumint" | "serial" | "bigserial" => Self::Integer,
            "float" | "float4" | "float8" | "double" | "real" | "number" => Self::Float,
            "decimal" | "numeric" | "money" => Self::Decimal,
            "bool" | "boolean" | "bit" => Self::Boolean,
            "date" => Self::Date,
            "timestamp" | "timestamptz" | "datetime" | "time" => Self::Timestamp,
            "text" | "varchar" | "char" | "character" | "nvarchar" | "string" | "uuid" | "json"
            | "jsonb" | "clob" => Self::Text,
            _ => Self::Unknown,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }

    /// Estimated on-page width in bytes, used by the cost model
    pub fn width_bytes(&self) -> u32 {
        match self {
            Self::Integer | Self::Float | Self::Timestamp => 8,
            Self::Decimal => 16,
            Self::Boolean => 1,
            Self::Date => 4,
            Self::Text => 32,
            Self::Unknown => 16,
        }
    }
}

/// `table.column` pointer used by foreign keys and relationships
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ColumnPointer {
    pub table: String,
    pub column: String,
}

impl ColumnPointer {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Column information
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,

    #[serde(rename = "type")]
    pub data_type: ColumnType,

    #[serde(default = "default_nullable")]
    pub nullable: bool,

    #[serde(default)]
    pub primary_key: bool,

    /// An index exists on this column
    #[serde(default)]
    pub indexed: bool,

    /// Foreign key target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ColumnPointer>,

    /// Schema-declared synonyms ("cost" for `unit_price`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
            indexed: false,
            references: None,
            synonyms: Vec::new(),
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self.indexed = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ColumnPointer::new(table, column));
        self
    }

    pub fn with_synonyms(mut self, synonyms: &[&str]) -> Self {
        self.synonyms = synonyms.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Usable for index lookups: primary key or explicit index
    pub fn has_index(&self) -> bool {
        self.primary_key || self.indexed
    }

    /// Key-like columns (`id`, `customer_id`) are poor aggregation targets
    pub fn is_key_like(&self) -> bool {
        let name = normalize_identifier(&self.name);
        self.primary_key || self.references.is_some() || name == "id" || name.ends_with("_id")
    }
}

/// Table schema
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub name: String,

    pub columns: Vec<Column>,

    /// Estimated row count (None = no statistics collected)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            row_count: None,
            synonyms: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_row_count(mut self, rows: u64) -> Self {
        self.row_count = Some(rows);
        self
    }

    pub fn with_synonyms(mut self, synonyms: &[&str]) -> Self {
        self.synonyms = synonyms.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Get column by name (case-insensitive)
    pub fn column(&self, name: &str) -> Option<&Column> {
        let wanted = normalize_identifier(name);
        self.columns.iter().find(|c| normalize_identifier(&c.name) == wanted)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn primary_key(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.primary_key)
            .or_else(|| self.column("id"))
    }

    /// Human-facing label column: prefer `name` over other labels, `id` last
    pub fn label_column(&self) -> Option<&Column> {
        for candidate in ["name", "title", "label", "full_name", "display_name", "description"] {
            if let Some(col) = self.column(candidate) {
                return Some(col);
            }
        }
        self.columns
            .iter()
            .find(|c| c.data_type == ColumnType::Text && !c.is_key_like())
            .or_else(|| self.primary_key())
    }

    /// Best date/time column for relative-date filters
    pub fn date_column(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.data_type.is_temporal())
            .or_else(|| {
                self.columns.iter().find(|c| {
                    let n = normalize_identifier(&c.name);
                    n.contains("date") || n.ends_with("_at") || n == "created" || n.contains("time")
                })
            })
    }

    /// Numeric, non-key columns in declaration order
    pub fn measure_columns(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|c| (c.data_type.is_numeric() || c.data_type == ColumnType::Unknown) && !c.is_key_like())
            .collect()
    }

    /// Estimated row width in bytes
    pub fn row_width(&self) -> u32 {
        let width: u32 = self.columns.iter().map(|c| c.data_type.width_bytes()).sum();
        width.max(8)
    }
}

/// Function kind
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Scalar,
    Aggregate,
    Window,
}

/// User-defined or built-in function exposed by the schema
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    #[serde(default)]
    pub params: Vec<String>,
    pub return_type: ColumnType,
}

/// Relationship cardinality, read from the `from` side
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

/// `from` column refers to `to` column
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    pub from: ColumnPointer,
    pub to: ColumnPointer,
    pub cardinality: Cardinality,
}

/// One hop of a join path: `from_table.from_column = to_table.to_column`,
/// where `from_table` is already reachable and `to_table` is introduced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinHop {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// Schema model - read-only input to every pipeline stage
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaModel {
    tables: Vec<Table>,

    #[serde(default)]
    relationships: Vec<Relationship>,

    #[serde(default)]
    functions: Vec<Function>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table; column references become many-to-one relationships
    pub fn add_table(&mut self, table: Table) {
        for column in &table.columns {
            if let Some(target) = &column.references {
                self.add_relationship(Relationship {
                    from: ColumnPointer::new(&table.name, &column.name),
                    to: target.clone(),
                    cardinality: Cardinality::ManyToOne,
                });
            }
        }
        let wanted = normalize_identifier(&table.name);
        self.tables.retain(|t| normalize_identifier(&t.name) != wanted);
        self.tables.push(table);
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    pub fn add_relationship(&mut self, relationship: Relationship) {
        let exists = self.relationships.iter().any(|r| {
            same_pointer(&r.from, &relationship.from) && same_pointer(&r.to, &relationship.to)
        });
        if !exists {
            self.relationships.push(relationship);
        }
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.add_relationship(relationship);
        self
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Get table by exact name (case-insensitive)
    pub fn table(&self, name: &str) -> Option<&Table> {
        let wanted = normalize_identifier(name);
        self.tables.iter().find(|t| normalize_identifier(&t.name) == wanted)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        let wanted = normalize_identifier(name);
        self.tables.iter_mut().find(|t| normalize_identifier(&t.name) == wanted)
    }

    /// Look a word up as a table, tolerating plural/singular and spaced forms
    /// (`customer` -> `customers`, `order item` -> `order_items`) and table synonyms.
    pub fn find_table_tolerant(&self, word: &str) -> Option<&Table> {
        let wanted = words_to_snake(&normalize_identifier(word));
        if wanted.is_empty() {
            return None;
        }
        if let Some(table) = self.table(&wanted) {
            return Some(table);
        }
        let variants = [singularize(&wanted), pluralize(&wanted)];
        self.tables.iter().find(|t| {
            let forms = surface_forms(&t.name);
            variants.iter().any(|v| forms.contains(v))
                || forms.contains(&wanted)
                || t.synonyms.iter().any(|s| normalize_identifier(s) == wanted)
        })
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&Column> {
        self.table(table).and_then(|t| t.column(column))
    }

    /// Every table that owns a column with this name, in schema order
    pub fn tables_with_column(&self, column: &str) -> Vec<&Table> {
        self.tables.iter().filter(|t| t.has_column(column)).collect()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        let wanted = normalize_identifier(name);
        self.functions.iter().find(|f| normalize_identifier(&f.name) == wanted)
    }

    /// Row count estimate, if statistics are known
    pub fn row_count(&self, table: &str) -> Option<u64> {
        self.table(table).and_then(|t| t.row_count)
    }

    pub fn set_row_count(&mut self, table: &str, rows: u64) -> bool {
        match self.table_mut(table) {
            Some(t) => {
                t.row_count = Some(rows);
                true
            }
            None => false,
        }
    }

    /// Relationships connecting `a` and `b` in either direction
    pub fn relationships_between(&self, a: &str, b: &str) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|r| {
                (same_table(&r.from.table, a) && same_table(&r.to.table, b))
                    || (same_table(&r.from.table, b) && same_table(&r.to.table, a))
            })
            .collect()
    }

    /// Join columns linking `a` and `b` directly, oriented as `(a_column, b_column)`
    pub fn join_columns(&self, a: &str, b: &str) -> Option<(String, String)> {
        for rel in &self.relationships {
            if same_table(&rel.from.table, a) && same_table(&rel.to.table, b) {
                return Some((rel.from.column.clone(), rel.to.column.clone()));
            }
            if same_table(&rel.to.table, a) && same_table(&rel.from.table, b) {
                return Some((rel.to.column.clone(), rel.from.column.clone()));
            }
        }
        None
    }

    /// Shortest join path (BFS over relationships) from any table in `reachable` to `target`
    pub fn join_path(&self, reachable: &[String], target: &str) -> Option<Vec<JoinHop>> {
        let target_key = normalize_identifier(target);
        if reachable.iter().any(|t| normalize_identifier(t) == target_key) {
            return Some(Vec::new());
        }

        let mut visited: HashSet<String> = reachable.iter().map(|t| normalize_identifier(t)).collect();
        let mut parent: HashMap<String, JoinHop> = HashMap::new();
        let mut queue: VecDeque<String> = reachable.iter().map(|t| self.canonical_table_name(t)).collect();

        while let Some(current) = queue.pop_front() {
            for (neighbor, hop) in self.neighbors(&current) {
                let key = normalize_identifier(&neighbor);
                if !visited.insert(key.clone()) {
                    continue;
                }
                parent.insert(key.clone(), hop);
                if key == target_key {
                    let mut path = Vec::new();
                    let mut cursor = key;
                    while let Some(hop) = parent.get(&cursor) {
                        path.push(hop.clone());
                        cursor = normalize_identifier(&hop.from_table);
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(neighbor);
            }
        }
        None
    }

    /// Add `<singular>_id -> <table>.id` relationships for columns following the naming
    /// convention when the schema declares none of its own.
    pub fn infer_relationships(&mut self) -> usize {
        let mut inferred = Vec::new();
        for table in &self.tables {
            for column in &table.columns {
                let name = normalize_identifier(&column.name);
                let Some(stem) = name.strip_suffix("_id") else { continue };
                if stem.is_empty() {
                    continue;
                }
                let Some(target) = self.find_table_tolerant(stem) else { continue };
                if same_table(&target.name, &table.name) {
                    continue;
                }
                let Some(pk) = target.primary_key() else { continue };
                inferred.push(Relationship {
                    from: ColumnPointer::new(&table.name, &column.name),
                    to: ColumnPointer::new(&target.name, &pk.name),
                    cardinality: Cardinality::ManyToOne,
                });
            }
        }
        let before = self.relationships.len();
        for rel in inferred {
            self.add_relationship(rel);
        }
        self.relationships.len() - before
    }

    /// Mark `table.column` as indexed; false when the column does not exist
    pub fn mark_indexed(&mut self, table: &str, column: &str) -> bool {
        let wanted = normalize_identifier(column);
        match self.table_mut(table) {
            Some(t) => match t.columns.iter_mut().find(|c| normalize_identifier(&c.name) == wanted) {
                Some(c) => {
                    c.indexed = true;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    fn canonical_table_name(&self, name: &str) -> String {
        self.table(name).map(|t| t.name.clone()).unwrap_or_else(|| name.to_string())
    }

    fn neighbors(&self, table: &str) -> Vec<(String, JoinHop)> {
        let mut out = Vec::new();
        for rel in &self.relationships {
            if same_table(&rel.from.table, table) {
                out.push((
                    self.canonical_table_name(&rel.to.table),
                    JoinHop {
                        from_table: self.canonical_table_name(&rel.from.table),
                        from_column: rel.from.column.clone(),
                        to_table: self.canonical_table_name(&rel.to.table),
                        to_column: rel.to.column.clone(),
                    },
                ));
            } else if same_table(&rel.to.table, table) {
                out.push((
                    self.canonical_table_name(&rel.from.table),
                    JoinHop {
                        from_table: self.canonical_table_name(&rel.to.table),
                        from_column: rel.to.column.clone(),
                        to_table: self.canonical_table_name(&rel.from.table),
                        to_column: rel.from.column.clone(),
                    },
                ));
            }
        }
        out
    }
}

fn same_table(a: &str, b: &str) -> bool {
    normalize_identifier(a) == normalize_identifier(b)
}

fn same_pointer(a: &ColumnPointer, b: &ColumnPointer) -> bool {
    same_table(&a.table, &b.table) && normalize_identifier(&a.column) == normalize_identifier(&b.column)
}
