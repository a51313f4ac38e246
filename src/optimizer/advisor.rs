//! Alternative plans and advisory recommendations. Neither ever changes the IR.

use super::cost_model::CostModel;
use super::join_order::alternative_orders;
use super::passes::IndexHint;
use super::plan::{build_plan, JoinAlgorithm};
use crate::ir::{ConditionValue, Operand, SelectQueryIR};
use serde::Serialize;

/// Other join orders offered next to the chosen plan
const MAX_ORDER_ALTERNATIVES: usize = 3;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlternativeKind {
    JoinOrder,
    HashJoin,
    CteRewrite,
}

/// Re-planned variant of the optimized query, costed but not selected
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Alternative {
    pub kind: AlternativeKind,
    pub description: String,
    pub estimated_cost: f64,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    CreateIndex,
    RefreshStatistics,
    PartitionByDate,
    MaterializeAggregation,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub table: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    pub reason: String,
}

pub fn alternatives(ir: &SelectQueryIR, model: &CostModel<'_>) -> Vec<Alternative> {
    let mut out: Vec<Alternative> = alternative_orders(ir, model, MAX_ORDER_ALTERNATIVES)
        .into_iter()
        .map(|(candidate, cost)| Alternative {
            kind: AlternativeKind::JoinOrder,
            description: format!("join order {}", candidate.tables().join(" -> ")),
            estimated_cost: cost,
        })
        .collect();

    if !ir.joins.is_empty() {
        out.push(Alternative {
            kind: AlternativeKind::HashJoin,
            description: format!("hash joins over {}", ir.tables().join(", ")),
            estimated_cost: build_plan(ir, model, JoinAlgorithm::Hash).total_cost(),
        });
    }

    if let Some(cte) = cte_rewrite(ir, model) {
        out.push(cte);
    }
    out
}

/// Evaluate each subquery once as a CTE instead of per outer row
fn cte_rewrite(ir: &SelectQueryIR, model: &CostModel<'_>) -> Option<Alternative> {
    let subqueries: Vec<&SelectQueryIR> = ir
        .all_conditions()
        .filter_map(|c| match &c.rhs {
            ConditionValue::Subquery { query } => Some(query.as_ref()),
            _ => None,
        })
        .collect();
    if subqueries.is_empty() {
        return None;
    }

    let mut outer = ir.clone();
    outer.where_.retain(|c| !matches!(c.rhs, ConditionValue::Subquery { .. }));
    outer.having.retain(|c| !matches!(c.rhs, ConditionValue::Subquery { .. }));
    let mut cost = build_plan(&outer, model, JoinAlgorithm::NestedLoop).total_cost();
    let mut names = Vec::new();
    for sub in &subqueries {
        cost += build_plan(sub, model, JoinAlgorithm::NestedLoop).total_cost();
        names.push(sub.from.clone());
    }
    Some(Alternative {
        kind: AlternativeKind::CteRewrite,
        description: format!("materialize subqueries over {} as CTEs", names.join(", ")),
        estimated_cost: cost,
    })
}

/// Index, statistics and partitioning advice for the tables `ir` reads
pub fn recommendations(ir: &SelectQueryIR, model: &CostModel<'_>, hints: &[IndexHint]) -> Vec<Recommendation> {
    let config = model.config();
    let schema = model.schema();
    let mut out: Vec<Recommendation> = Vec::new();

    for table in ir.tables() {
        if schema.table(&table).is_some() && schema.row_count(&table).is_none() {
            out.push(Recommendation {
                kind: RecommendationKind::RefreshStatistics,
                table: table.clone(),
                columns: Vec::new(),
                reason: format!(
                    "no row count for {}; costs assume {} rows",
                    table, config.default_row_count
                ),
            });
        }
    }

    for hint in hints.iter().filter(|h| !h.indexed) {
        let rows = model.table_rows(&hint.table);
        if rows < config.large_table_rows as f64 {
            continue;
        }
        let duplicate = out.iter().any(|r| {
            r.kind == RecommendationKind::CreateIndex
                && r.table.eq_ignore_ascii_case(&hint.table)
                && r.columns.iter().any(|c| c.eq_ignore_ascii_case(&hint.column))
        });
        if !duplicate {
            out.push(Recommendation {
                kind: RecommendationKind::CreateIndex,
                table: hint.table.clone(),
                columns: vec![hint.column.clone()],
                reason: format!("{:?} on unindexed column of a {:.0}-row table", hint.usage, rows),
            });
        }
    }

    for condition in ir.all_conditions().filter(|c| c.is_relative_date()) {
        let Operand::Column(column) = &condition.lhs else { continue };
        let rows = model.table_rows(&column.table);
        let already = out
            .iter()
            .any(|r| r.kind == RecommendationKind::PartitionByDate && r.table.eq_ignore_ascii_case(&column.table));
        if rows >= config.partition_rows as f64 && !already {
            out.push(Recommendation {
                kind: RecommendationKind::PartitionByDate,
                table: column.table.clone(),
                columns: vec![column.column.clone()],
                reason: format!("relative date filter over {:.0} rows", rows),
            });
        }
    }
    out
}

/// Frequently repeated aggregation worth precomputing
pub fn materialization(ir: &SelectQueryIR, requests: u64, threshold: u64) -> Option<Recommendation> {
    if requests < threshold || !ir.has_aggregates() {
        return None;
    }
    Some(Recommendation {
        kind: RecommendationKind::MaterializeAggregation,
        table: ir.from.clone(),
        columns: ir.group_by.iter().map(|c| c.to_string()).collect(),
        reason: format!("aggregation requested {} times", requests),
    })
}
