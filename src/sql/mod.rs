//! SQL output: dialects, the IR renderer and the plain-text explainer

pub mod dialect;
pub mod explain;
pub mod generator;

pub use dialect::Dialect;
pub use explain::{describe_condition, explain, explain_optimization};
pub use generator::{GeneratedSql, SqlGenerator};
