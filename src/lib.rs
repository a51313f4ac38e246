//! # NL-SQL Engine
//!
//! Compiles analytic questions written in plain English into dialect-specific SQL.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nlsql_engine::{parse_schema, Dialect, EngineConfig, NlSqlEngine, SchemaFormat};
//!
//! let schema = parse_schema(
//!     "CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT, order_date DATE)",
//!     SchemaFormat::Ddl,
//!     None,
//! ).unwrap();
//!
//! let engine = NlSqlEngine::new(schema, EngineConfig::default()).unwrap();
//! let translation = engine.translate("orders in the last 30 days", Dialect::Postgres).unwrap();
//!
//! println!("{}", translation.sql);
//! println!("{}", translation.explanation);
//! ```
//!
//! ## Pipeline
//!
//! - **Tokenizer / Entity Recognizer / Intent Classifier**: typed tokens, schema-bound
//!   entities and scored intents with structured query components
//! - **IR builders**: the heuristic direct builder (default) and the classifier lowering,
//!   both behind `IrStrategy`
//! - **Optimizer**: grouping fixes, cost-based rewrites, plan estimation, alternatives
//!   and recommendations, with a bounded result cache
//! - **SQL Generator / Explainer**: SQLite, PostgreSQL, MySQL and ANSI output plus a
//!   plain-text rationale

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ir;
pub mod nlp;
pub mod optimizer;
pub mod schema;
pub mod sql;

// Public API - Main types users need
pub use config::{EngineConfig, GeneratorConfig, OptimizerConfig, RecognizerConfig};
pub use engine::{NlSqlEngine, Translation};
pub use executor::{ExecutionError, ExecutionResult, SqlExecutor};
pub use ir::{BuildOptions, ClassifierIrBuilder, DelegatingStrategy, GenerationClient, HeuristicIrBuilder, IrStrategy, SelectQueryIR};
pub use optimizer::{OptimizationResult, Optimizer};
pub use schema::{load_schema_file, parse_schema, SchemaFormat, SchemaModel};
pub use sql::{Dialect, SqlGenerator};

// Re-export commonly used error types
pub use error::{EngineError, EngineResult};
