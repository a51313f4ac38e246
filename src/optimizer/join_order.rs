//! Join ordering over the inner-join graph of an IR.
//!
//! The graph is the set of tables in scope plus one edge per join. Orders are
//! left-deep: every table after the first must connect to one already placed.

use super::cost_model::{combined_selectivity, CostModel};
use super::plan::{build_plan, JoinAlgorithm};
use crate::ir::{Condition, JoinSpec, SelectQueryIR};

/// Result of a join-order search
#[derive(Debug)]
pub enum JoinSearch {
    /// A strictly cheaper order was found
    Reordered {
        ir: SelectQueryIR,
        cost: f64,
        evaluated: usize,
    },
    /// The input order is already the cheapest considered
    Unchanged { evaluated: usize },
    /// Exhaustive search ran past its permutation budget; input order kept
    Degraded { evaluated: usize },
    /// Nothing to reorder (no joins, or an outer join pins the order)
    Skipped,
}

/// Inner-join graph extracted from an IR
pub struct JoinGraph<'a> {
    ir: &'a SelectQueryIR,
    tables: Vec<String>,
    edges: Vec<JoinSpec>,
    conditions: Vec<Condition>,
}

impl<'a> JoinGraph<'a> {
    /// None when the IR has no joins or contains a left join
    pub fn from_ir(ir: &'a SelectQueryIR) -> Option<Self> {
        if ir.joins.is_empty() || ir.has_left_join() {
            return None;
        }
        let edges = ir
            .joins
            .iter()
            .map(|j| JoinSpec::inner(j.left.clone(), j.right.clone()))
            .collect();
        let conditions = ir.joins.iter().flat_map(|j| j.conditions.iter().cloned()).collect();
        Some(Self {
            ir,
            tables: ir.tables(),
            edges,
            conditions,
        })
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Index order of the input IR
    pub fn input_order(&self) -> Vec<usize> {
        (0..self.tables.len()).collect()
    }

    /// Edge joining table `t` to the placed set, oriented so `t` is introduced
    fn connecting_edge(&self, placed: &[usize], t: usize) -> Option<JoinSpec> {
        let name = &self.tables[t];
        self.edges.iter().find_map(|edge| {
            let in_placed = |table: &str| placed.iter().any(|&p| self.tables[p].eq_ignore_ascii_case(table));
            if edge.right.table.eq_ignore_ascii_case(name) && in_placed(&edge.left.table) {
                Some(edge.clone())
            } else if edge.left.table.eq_ignore_ascii_case(name) && in_placed(&edge.right.table) {
                Some(edge.flipped())
            } else {
                None
            }
        })
    }

    fn connected(&self, placed: &[usize], t: usize) -> bool {
        self.connecting_edge(placed, t).is_some()
    }

    /// Rebuild the IR for `order`. Join-attached predicates move to the first join
    /// at which all their tables are in scope, or to WHERE if that is the FROM table.
    pub fn apply(&self, order: &[usize]) -> Option<SelectQueryIR> {
        let mut ir = self.ir.clone();
        ir.from = self.tables[*order.first()?].clone();
        ir.joins.clear();
        for i in 1..order.len() {
            ir.joins.push(self.connecting_edge(&order[..i], order[i])?);
        }

        for condition in &self.conditions {
            let tables = condition.tables();
            let position = (0..order.len()).find(|&i| {
                tables.iter().all(|t| {
                    order[..=i]
                        .iter()
                        .any(|&p| self.tables[p].eq_ignore_ascii_case(t))
                })
            });
            match position {
                Some(0) | None => ir.where_.push(condition.clone()),
                Some(i) => ir.joins[i - 1].conditions.push(condition.clone()),
            }
        }
        Some(ir)
    }

    /// Visit every connected left-deep order; stops early when `visit` returns false
    pub fn for_each_order(&self, mut visit: impl FnMut(&[usize]) -> bool) {
        let n = self.tables.len();
        let mut prefix = Vec::with_capacity(n);
        let mut used = vec![false; n];
        for start in 0..n {
            prefix.push(start);
            used[start] = true;
            let go_on = self.extend(&mut prefix, &mut used, &mut visit);
            used[start] = false;
            prefix.pop();
            if !go_on {
                return;
            }
        }
    }

    fn extend(&self, prefix: &mut Vec<usize>, used: &mut [bool], visit: &mut impl FnMut(&[usize]) -> bool) -> bool {
        if prefix.len() == self.tables.len() {
            return visit(prefix.as_slice());
        }
        for t in 0..self.tables.len() {
            if used[t] || !self.connected(prefix, t) {
                continue;
            }
            prefix.push(t);
            used[t] = true;
            let go_on = self.extend(prefix, used, visit);
            used[t] = false;
            prefix.pop();
            if !go_on {
                return false;
            }
        }
        true
    }

    /// Rows of table `t` after its own single-table predicates
    fn filtered_rows(&self, t: usize, model: &CostModel<'_>) -> f64 {
        let key = self.tables[t].to_ascii_lowercase();
        let own = self
            .ir
            .where_
            .iter()
            .chain(self.conditions.iter())
            .filter(|c| c.single_table().as_deref() == Some(key.as_str()));
        model.table_rows(&self.tables[t]) * combined_selectivity(own)
    }

    /// Greedy order: start from the smallest filtered input, then repeatedly add the
    /// smallest connected table. Ties break on table name so the result does not
    /// depend on the input order.
    pub fn greedy_order(&self, model: &CostModel<'_>) -> Vec<usize> {
        let n = self.tables.len();
        let rows: Vec<f64> = (0..n).map(|t| self.filtered_rows(t, model)).collect();
        let smaller = |a: usize, b: usize| {
            rows[a] < rows[b]
                || (rows[a] == rows[b] && self.tables[a].to_ascii_lowercase() < self.tables[b].to_ascii_lowercase())
        };

        let mut order: Vec<usize> = Vec::with_capacity(n);
        let mut start = 0;
        for t in 1..n {
            if smaller(t, start) {
                start = t;
            }
        }
        order.push(start);

        while order.len() < n {
            let mut best: Option<usize> = None;
            for t in 0..n {
                if order.contains(&t) || !self.connected(&order, t) {
                    continue;
                }
                best = match best {
                    Some(b) if !smaller(t, b) => Some(b),
                    _ => Some(t),
                };
            }
            match best {
                Some(t) => order.push(t),
                None => return self.input_order(),
            }
        }
        order
    }
}

fn plan_cost(ir: &SelectQueryIR, model: &CostModel<'_>) -> f64 {
    build_plan(ir, model, JoinAlgorithm::NestedLoop).total_cost()
}

/// Choose a join order for `ir`.
///
/// # Algorithm
/// 1. Fewer joins than `max_exhaustive_joins`: enumerate every connected order,
///    evaluating at most `max_permutations`; past the budget, keep the input order.
/// 2. Otherwise: greedy smallest-filtered-input-first order.
///
/// A new order is accepted only when its plan is strictly cheaper.
pub fn reorder_joins(ir: &SelectQueryIR, model: &CostModel<'_>) -> JoinSearch {
    let Some(graph) = JoinGraph::from_ir(ir) else {
        return JoinSearch::Skipped;
    };
    let config = model.config();
    let current = plan_cost(ir, model);

    if ir.joins.len() < config.max_exhaustive_joins {
        let mut evaluated = 0;
        let mut over_budget = false;
        let mut best: Option<(SelectQueryIR, f64)> = None;
        graph.for_each_order(|order| {
            if evaluated >= config.max_permutations {
                over_budget = true;
                return false;
            }
            evaluated += 1;
            if let Some(candidate) = graph.apply(order) {
                let cost = plan_cost(&candidate, model);
                if best.as_ref().map_or(true, |(_, b)| cost < *b) {
                    best = Some((candidate, cost));
                }
            }
            true
        });
        if over_budget {
            tracing::warn!(
                joins = ir.joins.len(),
                budget = config.max_permutations,
                "join order search exceeded its budget, keeping input order"
            );
            return JoinSearch::Degraded { evaluated };
        }
        return match best {
            Some((candidate, cost)) if cost < current => JoinSearch::Reordered {
                ir: candidate,
                cost,
                evaluated,
            },
            _ => JoinSearch::Unchanged { evaluated },
        };
    }

    tracing::debug!(joins = ir.joins.len(), "join count at cap, using greedy order");
    let order = graph.greedy_order(model);
    match graph.apply(&order) {
        Some(candidate) => {
            let cost = plan_cost(&candidate, model);
            if cost < current {
                JoinSearch::Reordered {
                    ir: candidate,
                    cost,
                    evaluated: 1,
                }
            } else {
                JoinSearch::Unchanged { evaluated: 1 }
            }
        }
        None => JoinSearch::Unchanged { evaluated: 0 },
    }
}

/// Up to `limit` connected orders other than the one `ir` already has, with costs
pub fn alternative_orders(ir: &SelectQueryIR, model: &CostModel<'_>, limit: usize) -> Vec<(SelectQueryIR, f64)> {
    let Some(graph) = JoinGraph::from_ir(ir) else {
        return Vec::new();
    };
    let input = graph.input_order();
    let mut out = Vec::new();
    let mut seen = 0;
    graph.for_each_order(|order| {
        seen += 1;
        if order != input.as_slice() {
            if let Some(candidate) = graph.apply(order) {
                let cost = plan_cost(&candidate, model);
                out.push((candidate, cost));
            }
        }
        out.len() < limit && seen < model.config().max_permutations
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::ir::{AggregateSpec, ColumnRef, ComparisonOp, JoinKind, Literal, Projection};
    use crate::schema::{Column, ColumnType, SchemaModel, Table};

    fn chain_schema(n: usize) -> SchemaModel {
        let mut schema = SchemaModel::new();
        for i in 0..n {
            let mut table = Table::new(format!("t{}", i))
                .with_column(Column::new("id", ColumnType::Integer).primary_key())
                .with_column(Column::new("flag", ColumnType::Text))
                .with_row_count(((n - i) * 1_000) as u64);
            if i > 0 {
                table = table.with_column(Column::new("parent_id", ColumnType::Integer));
            }
            schema.add_table(table);
        }
        schema
    }

    /// t0 <- t1 <- ... <- t(n-1), each joined on `parent_id`
    fn chain_ir(n: usize) -> SelectQueryIR {
        let mut ir = SelectQueryIR::new("t0");
        ir.columns.push(Projection::Aggregate(AggregateSpec::count_star("t0")));
        for i in 1..n {
            ir.joins.push(JoinSpec::inner(
                ColumnRef::new(format!("t{}", i - 1), "id"),
                ColumnRef::new(format!("t{}", i), "parent_id"),
            ));
        }
        ir
    }

    #[test]
    fn test_chain_enumerates_only_connected_orders() {
        let ir = chain_ir(3);
        let graph = JoinGraph::from_ir(&ir).unwrap();
        let mut orders = Vec::new();
        graph.for_each_order(|o| {
            orders.push(o.to_vec());
            true
        });
        // a path of 3 has 4 connected left-deep orders
        assert_eq!(orders.len(), 4);
        assert!(!orders.contains(&vec![0, 2, 1]));
    }

    #[test]
    fn test_apply_keeps_ir_valid_and_moves_predicates() {
        let mut ir = chain_ir(3);
        ir.joins[1].conditions.push(Condition::compare(
            ColumnRef::new("t2", "flag"),
            ComparisonOp::Eq,
            Literal::Text("x".into()),
        ));
        let graph = JoinGraph::from_ir(&ir).unwrap();
        let reordered = graph.apply(&[2, 1, 0]).unwrap();
        assert_eq!(reordered.from, "t2");
        assert_eq!(reordered.where_.len(), 1);
        assert!(reordered.joins.iter().all(|j| j.conditions.is_empty()));
        assert_eq!(reordered.joins[0].table(), "t1");
        assert!(reordered.validate().is_ok());
    }

    #[test]
    fn test_exhaustive_search_picks_filtered_table_first() {
        let schema = chain_schema(3);
        let config = OptimizerConfig::default();
        let model = CostModel::new(&schema, &config);
        let mut ir = chain_ir(3);
        ir.joins[1].conditions.push(Condition::compare(
            ColumnRef::new("t2", "id"),
            ComparisonOp::Eq,
            Literal::Integer(1),
        ));

        match reorder_joins(&ir, &model) {
            JoinSearch::Reordered { ir: best, cost, evaluated } => {
                assert_eq!(evaluated, 4);
                assert!(cost < plan_cost(&ir, &model));
                // the filtered table is joined before the largest one
                assert_ne!(best.from, "t0");
                assert!(best.from == "t2" || best.joins[0].table() == "t2");
                assert!(best.validate().is_ok());
                // reordering the winner finds nothing cheaper
                assert!(matches!(reorder_joins(&best, &model), JoinSearch::Unchanged { .. }));
            }
            other => panic!("expected reorder, got {:?}", other),
        }
    }

    #[test]
    fn test_budget_exhaustion_degrades() {
        let schema = chain_schema(4);
        let config = OptimizerConfig {
            max_permutations: 2,
            ..Default::default()
        };
        let model = CostModel::new(&schema, &config);
        assert!(matches!(
            reorder_joins(&chain_ir(4), &model),
            JoinSearch::Degraded { evaluated: 2 }
        ));
    }

    #[test]
    fn test_greedy_above_cap() {
        let schema = chain_schema(8);
        let config = OptimizerConfig {
            max_exhaustive_joins: 3,
            ..Default::default()
        };
        let model = CostModel::new(&schema, &config);
        let ir = chain_ir(8);
        let graph = JoinGraph::from_ir(&ir).unwrap();
        let order = graph.greedy_order(&model);
        // t7 is the smallest table; the chain is then walked back towards t0
        assert_eq!(order, vec![7, 6, 5, 4, 3, 2, 1, 0]);
        match reorder_joins(&ir, &model) {
            JoinSearch::Reordered { evaluated, .. } | JoinSearch::Unchanged { evaluated } => assert_eq!(evaluated, 1),
            other => panic!("greedy search should not degrade: {:?}", other),
        }
    }

    #[test]
    fn test_left_join_is_not_reordered() {
        let schema = chain_schema(2);
        let config = OptimizerConfig::default();
        let model = CostModel::new(&schema, &config);
        let mut ir = chain_ir(2);
        ir.joins[0].kind = JoinKind::Left;
        assert!(matches!(reorder_joins(&ir, &model), JoinSearch::Skipped));
        assert!(JoinGraph::from_ir(&ir).is_none());
    }

    #[test]
    fn test_alternative_orders_exclude_input() {
        let schema = chain_schema(3);
        let config = OptimizerConfig::default();
        let model = CostModel::new(&schema, &config);
        let ir = chain_ir(3);
        let alternatives = alternative_orders(&ir, &model, 3);
        assert_eq!(alternatives.len(), 3);
        assert!(alternatives.iter().all(|(alt, _)| alt.from != "t0" || alt.joins[0].table() != "t1"));
    }
}
