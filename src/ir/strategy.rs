//! IR construction strategies behind one interface

use super::model::SelectQueryIR;
use crate::error::{EngineError, EngineResult};
use crate::schema::SchemaModel;
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Caller hints shared by every strategy
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildOptions {
    /// Base table used when the text names none
    pub default_table: Option<String>,
}

/// Turns question text into a validated `SelectQueryIR`
pub trait IrStrategy: Send + Sync {
    fn build(&self, text: &str, schema: &SchemaModel, options: &BuildOptions) -> EngineResult<SelectQueryIR>;

    /// Short name reported alongside each translation
    fn name(&self) -> &'static str;
}

/// Hosted generation service: prompt in, IR JSON out.
///
/// The crate ships no implementation; callers inject their own client.
pub trait GenerationClient: Send + Sync {
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Strategy that delegates the whole mapping to a `GenerationClient`
pub struct DelegatingStrategy<C: GenerationClient> {
    client: C,
}

impl<C: GenerationClient> DelegatingStrategy<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn prompt(text: &str, schema: &SchemaModel, options: &BuildOptions) -> anyhow::Result<String> {
        let schema_json = serde_json::to_string(schema).context("serializing schema for prompt")?;
        let mut prompt = format!(
            "Translate the question into a SelectQueryIR JSON document.\nSchema: {}\nQuestion: {}\n",
            schema_json, text
        );
        if let Some(default) = &options.default_table {
            prompt.push_str(&format!("Default table: {}\n", default));
        }
        Ok(prompt)
    }

    fn request(&self, text: &str, schema: &SchemaModel, options: &BuildOptions) -> anyhow::Result<SelectQueryIR> {
        let prompt = Self::prompt(text, schema, options)?;
        let reply = self.client.complete(&prompt).context("generation service call failed")?;
        let body = strip_code_fence(&reply);
        serde_json::from_str(body).context("generation service returned malformed IR JSON")
    }
}

impl<C: GenerationClient> IrStrategy for DelegatingStrategy<C> {
    fn build(&self, text: &str, schema: &SchemaModel, options: &BuildOptions) -> EngineResult<SelectQueryIR> {
        let ir = self.request(text, schema, options).map_err(|e| {
            EngineError::internal(format!("{:#}", e)).with_context("delegating strategy")
        })?;
        ir.validate()?;
        for table in ir.tables() {
            if schema.table(&table).is_none() {
                return Err(EngineError::invalid_reference(
                    format!("generated IR names unknown table {}", table),
                    &table,
                    "*",
                ));
            }
        }
        tracing::debug!(from = %ir.from, "delegated IR accepted");
        Ok(ir)
    }

    fn name(&self) -> &'static str {
        "delegating"
    }
}

/// Services often wrap JSON in a ```json fence
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AggregateSpec, Projection};
    use crate::schema::{Column, ColumnType, Table};

    struct CannedClient(String);

    impl GenerationClient for CannedClient {
        fn complete(&self, prompt: &str) -> anyhow::Result<String> {
            anyhow::ensure!(prompt.contains("Question:"), "prompt lacks question");
            Ok(self.0.clone())
        }
    }

    fn schema() -> SchemaModel {
        SchemaModel::new().with_table(Table::new("orders").with_column(Column::new("id", ColumnType::Integer)))
    }

    #[test]
    fn test_delegated_ir_is_validated() {
        let mut ir = SelectQueryIR::new("orders");
        ir.columns.push(Projection::Aggregate(AggregateSpec::count_star("orders")));
        let json = serde_json::to_string(&ir).unwrap();

        let strategy = DelegatingStrategy::new(CannedClient(format!("```json\n{}\n```", json)));
        let built = strategy.build("count orders", &schema(), &BuildOptions::default()).unwrap();
        assert_eq!(built, ir);
        assert_eq!(strategy.name(), "delegating");
    }

    #[test]
    fn test_unknown_table_rejected() {
        let ir = SelectQueryIR::new("invoices");
        let strategy = DelegatingStrategy::new(CannedClient(serde_json::to_string(&ir).unwrap()));
        let err = strategy.build("x", &schema(), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidReference { .. }));
    }

    #[test]
    fn test_malformed_reply_is_internal_error() {
        let strategy = DelegatingStrategy::new(CannedClient("not json".into()));
        let err = strategy.build("x", &schema(), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::Internal { .. }));
    }
}
