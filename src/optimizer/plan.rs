//! Estimated physical plan tree built from an IR

use super::cost_model::{combined_selectivity, selectivity, CostModel};
use crate::ir::{ComparisonOp, Condition, ConditionValue, JoinKind, Operand, SelectQueryIR};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Share of input rows a GROUP BY is assumed to keep
const GROUP_REDUCTION: f64 = 0.1;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinAlgorithm {
    #[default]
    NestedLoop,
    Hash,
}

/// Plan operator
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanOperator {
    Scan { table: String },
    IndexScan { table: String, column: String },
    Filter { predicates: usize, selectivity: f64 },
    Join { table: String, kind: JoinKind, algorithm: JoinAlgorithm },
    Aggregate { group_columns: usize, aggregates: usize },
    Sort { keys: usize },
    Limit { count: u64 },
}

/// Plan node annotated with its own cost and output estimates
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlanNode {
    pub operator: PlanOperator,
    /// Cost of this node alone
    pub cost: f64,
    /// Estimated output rows
    pub rows: f64,
    /// Estimated output row width in bytes
    pub width: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    fn leaf(operator: PlanOperator, cost: f64, rows: f64, width: u32) -> Self {
        Self {
            operator,
            cost,
            rows,
            width,
            children: Vec::new(),
        }
    }

    fn over(operator: PlanOperator, cost: f64, rows: f64, input: PlanNode) -> Self {
        Self {
            operator,
            cost,
            rows,
            width: input.width,
            children: vec![input],
        }
    }

    /// Cost of the whole subtree
    pub fn total_cost(&self) -> f64 {
        self.cost + self.children.iter().map(PlanNode::total_cost).sum::<f64>()
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PlanNode::node_count).sum::<usize>()
    }

    /// Does any node in the subtree satisfy `pred`
    pub fn any(&self, pred: &impl Fn(&PlanOperator) -> bool) -> bool {
        pred(&self.operator) || self.children.iter().any(|c| c.any(pred))
    }

    /// Indented EXPLAIN-style rendering
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let label = match &self.operator {
            PlanOperator::Scan { table } => format!("Scan {}", table),
            PlanOperator::IndexScan { table, column } => format!("IndexScan {} using {}", table, column),
            PlanOperator::Filter { predicates, selectivity } => {
                format!("Filter ({} predicates, selectivity {:.3})", predicates, selectivity)
            }
            PlanOperator::Join { table, kind, algorithm } => format!("{:?}{:?}Join {}", algorithm, kind, table),
            PlanOperator::Aggregate { group_columns, aggregates } => {
                format!("Aggregate ({} keys, {} aggregates)", group_columns, aggregates)
            }
            PlanOperator::Sort { keys } => format!("Sort ({} keys)", keys),
            PlanOperator::Limit { count } => format!("Limit {}", count),
        };
        let _ = writeln!(
            out,
            "{}{} (cost={:.2} rows={:.0} width={})",
            "  ".repeat(depth),
            label,
            self.cost,
            self.rows,
            self.width
        );
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

/// Build the left-deep plan for `ir`: per-table scans with their filters, joins in
/// IR order, then residual filters, aggregate, having, sort and limit.
pub fn build_plan(ir: &SelectQueryIR, model: &CostModel<'_>, algorithm: JoinAlgorithm) -> PlanNode {
    let (local, residual): (Vec<&Condition>, Vec<&Condition>) =
        ir.where_.iter().partition(|c| c.single_table().is_some());

    let table_input = |table: &str, attached: &[Condition]| {
        let key = table.to_ascii_lowercase();
        let conditions: Vec<&Condition> = local
            .iter()
            .copied()
            .filter(|c| c.single_table().as_deref() == Some(key.as_str()))
            .chain(attached.iter())
            .collect();
        access_path(table, &conditions, model)
    };

    let mut root = table_input(&ir.from, &[]);
    for join in &ir.joins {
        let right = table_input(join.table(), &join.conditions);
        let cost = match algorithm {
            JoinAlgorithm::NestedLoop => model.nested_loop_cost(root.rows, right.rows),
            JoinAlgorithm::Hash => model.hash_join_cost(root.rows, right.rows),
        };
        let rows = match join.kind {
            JoinKind::Inner => model.join_rows(root.rows, right.rows),
            JoinKind::Left => model.join_rows(root.rows, right.rows).max(root.rows),
        };
        let width = root.width + right.width;
        root = PlanNode {
            operator: PlanOperator::Join {
                table: join.table().to_string(),
                kind: join.kind,
                algorithm,
            },
            cost,
            rows,
            width,
            children: vec![root, right],
        };
    }

    if !residual.is_empty() {
        root = filter_node(residual, model, root);
    }

    if ir.has_aggregates() || !ir.group_by.is_empty() {
        let aggregates = ir.columns.iter().filter(|p| p.as_aggregate().is_some()).count();
        let rows = if ir.group_by.is_empty() {
            1.0
        } else {
            (root.rows * GROUP_REDUCTION).max(1.0)
        };
        let cost = model.aggregate_cost(root.rows, ir.group_by.len());
        root = PlanNode::over(
            PlanOperator::Aggregate {
                group_columns: ir.group_by.len(),
                aggregates,
            },
            cost,
            rows,
            root,
        );
        if !ir.having.is_empty() {
            root = filter_node(ir.having.iter().collect(), model, root);
        }
    }

    if !ir.order_by.is_empty() {
        let cost = model.sort_cost(root.rows);
        let rows = root.rows;
        root = PlanNode::over(PlanOperator::Sort { keys: ir.order_by.len() }, cost, rows, root);
    }

    if let Some(limit) = ir.limit {
        let rows = root.rows.min(limit as f64);
        root = PlanNode::over(PlanOperator::Limit { count: limit }, 0.0, rows, root);
    }
    root
}

fn filter_node(conditions: Vec<&Condition>, model: &CostModel<'_>, input: PlanNode) -> PlanNode {
    let sel = combined_selectivity(conditions.iter().copied());
    let rows = (input.rows * sel).max(1.0);
    PlanNode::over(
        PlanOperator::Filter {
            predicates: conditions.len(),
            selectivity: sel,
        },
        model.filter_cost(conditions.len()),
        rows,
        input,
    )
}

/// Scan or index scan of `table`, with a filter for the predicates the access path leaves
fn access_path(table: &str, conditions: &[&Condition], model: &CostModel<'_>) -> PlanNode {
    let rows = model.table_rows(table);
    let width = model.table_width(table);

    let indexed = conditions.iter().position(|c| index_usable(c, table, model));
    let (scan, remaining): (PlanNode, Vec<&Condition>) = match indexed {
        Some(i) => {
            let column = match &conditions[i].lhs {
                Operand::Column(c) => c.column.clone(),
                _ => String::new(),
            };
            let matched = (rows * selectivity(ComparisonOp::Eq)).max(1.0);
            let node = PlanNode::leaf(
                PlanOperator::IndexScan {
                    table: table.to_string(),
                    column,
                },
                model.index_scan_cost(rows, matched, width),
                matched,
                width,
            );
            let rest = conditions
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, c)| *c)
                .collect();
            (node, rest)
        }
        None => {
            let node = PlanNode::leaf(
                PlanOperator::Scan {
                    table: table.to_string(),
                },
                model.scan_cost(rows, width),
                rows,
                width,
            );
            (node, conditions.to_vec())
        }
    };

    if remaining.is_empty() {
        scan
    } else {
        filter_node(remaining, model, scan)
    }
}

/// Equality against a literal on an indexed or primary-key column
fn index_usable(condition: &Condition, table: &str, model: &CostModel<'_>) -> bool {
    let Operand::Column(column) = &condition.lhs else {
        return false;
    };
    condition.op == ComparisonOp::Eq
        && matches!(condition.rhs, ConditionValue::Literal { .. })
        && column.table.eq_ignore_ascii_case(table)
        && model
            .schema()
            .column(table, &column.column)
            .map_or(false, |c| c.has_index())
}
