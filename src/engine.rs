use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::executor::{ExecutionError, ExecutionResult, SqlExecutor};
use crate::ir::{Analysis, BuildOptions, ClassifierIrBuilder, HeuristicIrBuilder, IrStrategy, Literal, SelectQueryIR};
use crate::optimizer::{CacheStats, OptimizationResult, Optimizer};
use crate::schema::SchemaModel;
use crate::sql::{explain, Dialect, SqlGenerator};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// Main natural-language to SQL interface
pub struct NlSqlEngine {
    schema: SchemaModel,
    config: EngineConfig,
    strategy: Box<dyn IrStrategy>,
    /// Classifier pipeline, used for `analyze`
    analyzer: ClassifierIrBuilder,
    optimizer: Optimizer,
    generator: SqlGenerator,
}

/// One translated question
#[derive(Clone, Debug, Serialize)]
pub struct Translation {
    pub text: String,
    /// IR as built by the strategy, before optimization
    pub ir: SelectQueryIR,
    pub optimization: OptimizationResult,
    pub sql: String,
    /// Bound parameters when the generator is configured to parameterize
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Literal>,
    pub explanation: String,
    pub dialect: Dialect,
    pub strategy: &'static str,
}

impl Translation {
    /// The IR the SQL was generated from
    pub fn optimized_ir(&self) -> &SelectQueryIR {
        &self.optimization.optimized_ir
    }
}

impl NlSqlEngine {
    /// Create an engine over `schema` using the heuristic builder
    pub fn new(schema: SchemaModel, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let strategy = Box::new(HeuristicIrBuilder::new()?);
        Ok(Self {
            analyzer: ClassifierIrBuilder::new(config.recognizer.clone()),
            optimizer: Optimizer::new(config.optimizer.clone()),
            generator: SqlGenerator::new(config.generator.clone()),
            schema,
            config,
            strategy,
        })
    }

    /// Swap the IR construction strategy
    pub fn with_strategy(mut self, strategy: impl IrStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn schema(&self) -> &SchemaModel {
        &self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn default_dialect(&self) -> Dialect {
        self.config.default_dialect
    }

    /// Build, optimize and render `text` for `dialect`
    pub fn translate(&self, text: &str, dialect: Dialect) -> EngineResult<Translation> {
        let start = Instant::now();
        info!(strategy = self.strategy.name(), %dialect, "translating question");

        let options = BuildOptions {
            default_table: self.config.default_table.clone(),
        };
        let ir = self
            .strategy
            .build(text, &self.schema, &options)
            .map_err(|e| e.with_context(text.to_string()))?;
        debug!(tables = ?ir.tables(), "IR built");

        let optimization = self.optimizer.optimize(&ir, &self.schema)?;
        let generated = self
            .generator
            .generate_configured(&optimization.optimized_ir, dialect)?;
        let explanation = explain(&optimization.optimized_ir, dialect);

        info!(
            elapsed_us = start.elapsed().as_micros() as u64,
            cost = optimization.estimated_cost,
            "translation finished"
        );
        Ok(Translation {
            text: text.to_string(),
            ir,
            optimization,
            sql: generated.sql,
            params: generated.params,
            explanation,
            dialect,
            strategy: self.strategy.name(),
        })
    }

    /// Translate with the configured default dialect
    pub fn translate_default(&self, text: &str) -> EngineResult<Translation> {
        self.translate(text, self.config.default_dialect)
    }

    /// Tokens, entities and classified intent for `text`
    pub fn analyze(&self, text: &str) -> EngineResult<Analysis> {
        self.analyzer.analyze(text, &self.schema)
    }

    /// Translate, then hand the SQL to `executor`. Translation failures are engine
    /// errors; execution failures come back alongside the translation.
    pub fn translate_and_execute(
        &self,
        text: &str,
        dialect: Dialect,
        executor: &dyn SqlExecutor,
    ) -> EngineResult<(Translation, Result<ExecutionResult, ExecutionError>)> {
        let translation = self.translate(text, dialect)?;
        let result = executor.execute(&translation.sql, &translation.params);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "execution failed");
        }
        Ok((translation, result))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.optimizer.cache_stats()
    }

    pub fn clear_cache(&self) {
        self.optimizer.clear_cache();
    }
}
