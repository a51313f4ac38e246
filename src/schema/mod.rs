//! Schema Model - the read-only description of tables, columns and relationships
//! that every pipeline stage binds against, plus parsers producing it.

pub mod model;
pub mod naming;
pub mod parser;

pub use model::{
    Cardinality, Column, ColumnPointer, ColumnType, Function, FunctionKind, JoinHop, Relationship, SchemaModel,
    Table,
};
pub use parser::{load_schema_file, parse_schema, SchemaFormat};
