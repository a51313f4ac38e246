//! IR optimizer: basic grouping fixes, cost-based rewrite passes, plan estimation,
//! alternatives and recommendations, with a bounded result cache.

pub mod advisor;
pub mod cache;
pub mod cost_model;
pub mod join_order;
pub mod passes;
pub mod plan;

pub use advisor::{Alternative, AlternativeKind, Recommendation, RecommendationKind};
pub use cache::{CacheStats, OptimizerCache, QuerySignature};
pub use cost_model::{combined_selectivity, selectivity, CostModel, MIN_SELECTIVITY};
pub use join_order::JoinSearch;
pub use passes::{IndexHint, IndexUse, Optimization, OptimizationKind};
pub use plan::{build_plan, JoinAlgorithm, PlanNode, PlanOperator};

use crate::config::OptimizerConfig;
use crate::error::EngineResult;
use crate::ir::SelectQueryIR;
use crate::schema::SchemaModel;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Everything the optimizer produced for one IR
#[derive(Clone, Debug, Serialize)]
pub struct OptimizationResult {
    /// Rewritten copy; never aliases the input
    pub optimized_ir: SelectQueryIR,
    pub plan: PlanNode,
    pub estimated_cost: f64,
    /// Cost of the input IR's plan
    pub original_cost: f64,
    pub optimizations: Vec<Optimization>,
    pub alternatives: Vec<Alternative>,
    pub recommendations: Vec<Recommendation>,
    /// Columns each table must supply (metadata only)
    pub required_columns: BTreeMap<String, BTreeSet<String>>,
    pub index_hints: Vec<IndexHint>,
    /// Served from the optimizer cache
    pub cached: bool,
}

impl OptimizationResult {
    pub fn applied(&self, kind: OptimizationKind) -> bool {
        self.optimizations.iter().any(|o| o.kind == kind)
    }
}

/// Query optimizer
pub struct Optimizer {
    config: OptimizerConfig,
    cache: OptimizerCache<OptimizationResult>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        let cache = OptimizerCache::new(config.cache_capacity);
        Self { config, cache }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize `ir` against `schema`'s statistics.
    ///
    /// Both the input and the rewritten IR are checked against the reference invariant.
    pub fn optimize(&self, ir: &SelectQueryIR, schema: &SchemaModel) -> EngineResult<OptimizationResult> {
        ir.validate()?;
        let signature = QuerySignature::new(ir, schema);
        let requests = self.cache.record_request(&signature);

        let mut result = match self.cache.get(&signature) {
            Some(mut hit) => {
                tracing::debug!(hash = signature.hash(), requests, "optimizer cache hit");
                hit.cached = true;
                hit
            }
            None => {
                let fresh = self.run(ir, schema)?;
                self.cache.insert(signature, fresh.clone());
                fresh
            }
        };

        if let Some(rec) = advisor::materialization(&result.optimized_ir, requests, self.config.frequent_query_threshold)
        {
            result.recommendations.push(rec);
        }
        Ok(result)
    }

    fn run(&self, ir: &SelectQueryIR, schema: &SchemaModel) -> EngineResult<OptimizationResult> {
        let model = CostModel::new(schema, &self.config);
        let original_cost = build_plan(ir, &model, JoinAlgorithm::NestedLoop).total_cost();

        let mut current = ir.clone();
        let mut log: Vec<Optimization> = Vec::new();

        apply(&mut current, &mut log, OptimizationKind::GroupByCompletion, passes::complete_group_by);
        apply(&mut current, &mut log, OptimizationKind::GroupByDedup, passes::dedup_group_by);

        let mut required_columns = BTreeMap::new();
        let mut index_hints = Vec::new();
        let mut alternatives = Vec::new();

        if self.config.enable_advanced {
            apply(&mut current, &mut log, OptimizationKind::ConstantFolding, passes::fold_constants);
            apply(&mut current, &mut log, OptimizationKind::PredicatePushdown, passes::push_down_predicates);

            required_columns = passes::required_columns(&current);
            if let Some(summary) = passes::pruning_summary(&required_columns, schema) {
                log.push(Optimization::new(OptimizationKind::ColumnPruning, summary));
            }

            match join_order::reorder_joins(&current, &model) {
                JoinSearch::Reordered { ir, cost, evaluated } => {
                    log.push(Optimization::new(
                        OptimizationKind::JoinReorder,
                        format!(
                            "join order {} (cost {:.2}, {} orders evaluated)",
                            ir.tables().join(" -> "),
                            cost,
                            evaluated
                        ),
                    ));
                    current = ir;
                }
                JoinSearch::Degraded { evaluated } => log.push(Optimization::new(
                    OptimizationKind::Degraded,
                    format!("join order search stopped after {} orders; input order kept", evaluated),
                )),
                JoinSearch::Unchanged { .. } | JoinSearch::Skipped => {}
            }

            index_hints = passes::index_hints(&current, schema);
            if !index_hints.is_empty() {
                let indexed = index_hints.iter().filter(|h| h.indexed).count();
                log.push(Optimization::new(
                    OptimizationKind::IndexHint,
                    format!("{} of {} filter/join/order columns are indexed", indexed, index_hints.len()),
                ));
            }

            apply(&mut current, &mut log, OptimizationKind::SubqueryUnnest, |ir| {
                passes::unnest_subqueries(ir, schema)
            });
            alternatives = advisor::alternatives(&current, &model);
        }

        current.validate()?;
        let plan = build_plan(&current, &model, JoinAlgorithm::NestedLoop);
        let estimated_cost = plan.total_cost();
        let recommendations = advisor::recommendations(&current, &model, &index_hints);

        tracing::debug!(
            original_cost,
            estimated_cost,
            passes = log.len(),
            "optimized query over {}",
            current.from
        );

        Ok(OptimizationResult {
            optimized_ir: current,
            plan,
            estimated_cost,
            original_cost,
            optimizations: log,
            alternatives,
            recommendations,
            required_columns,
            index_hints,
            cached: false,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

/// Run `pass` on a copy and keep the copy only if it actually changed
fn apply(
    ir: &mut SelectQueryIR,
    log: &mut Vec<Optimization>,
    kind: OptimizationKind,
    pass: impl FnOnce(&mut SelectQueryIR) -> Option<String>,
) {
    let mut candidate = ir.clone();
    if let Some(description) = pass(&mut candidate) {
        if candidate != *ir {
            tracing::debug!(?kind, "{}", description);
            *ir = candidate;
            log.push(Optimization::new(kind, description));
        }
    }
}
