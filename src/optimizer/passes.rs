//! IR rewrite passes.
//!
//! Each pass mutates a candidate IR in place and returns a description when it
//! changed something; the optimizer keeps the candidate only in that case.

use crate::ir::{
    Clause, ColumnRef, ComparisonOp, Condition, ConditionValue, JoinKind, JoinSpec, Literal, Operand, Projection,
    SelectQueryIR,
};
use crate::schema::SchemaModel;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationKind {
    GroupByCompletion,
    GroupByDedup,
    ConstantFolding,
    PredicatePushdown,
    ColumnPruning,
    JoinReorder,
    IndexHint,
    SubqueryUnnest,
    /// Join-order search hit its budget and kept the input order
    Degraded,
}

/// One applied (or attempted) rewrite
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Optimization {
    pub kind: OptimizationKind,
    pub description: String,
}

impl Optimization {
    pub fn new(kind: OptimizationKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

/// Where an indexed column would be used
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IndexUse {
    Filter,
    Join,
    Order,
}

/// Column that would benefit from an index
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct IndexHint {
    pub table: String,
    pub column: String,
    pub usage: IndexUse,
    /// Already indexed (or primary key) in the schema
    pub indexed: bool,
}

/// Add grouping keys missing from the projection list, and group plain columns
/// projected next to aggregates.
pub fn complete_group_by(ir: &mut SelectQueryIR) -> Option<String> {
    let mut added = Vec::new();

    if ir.has_aggregates() {
        let ungrouped: Vec<ColumnRef> = ir
            .columns
            .iter()
            .filter_map(Projection::as_column)
            .filter(|c| !c.is_star() && !ir.group_by.iter().any(|g| g.same_column(c)))
            .map(ColumnRef::unaliased)
            .collect();
        for column in ungrouped {
            added.push(format!("grouped {}", column));
            ir.group_by.push(column);
        }
    }

    let missing: Vec<ColumnRef> = ir
        .group_by
        .iter()
        .filter(|g| {
            !ir.columns
                .iter()
                .filter_map(Projection::as_column)
                .any(|c| c.same_column(g))
        })
        .map(ColumnRef::unaliased)
        .collect();
    for column in missing {
        let at = ir
            .columns
            .iter()
            .position(|p| p.as_aggregate().is_some())
            .unwrap_or(ir.columns.len());
        added.push(format!("projected {}", column));
        ir.columns.insert(at, Projection::Column(column));
    }

    if added.is_empty() {
        None
    } else {
        Some(added.join(", "))
    }
}

pub fn dedup_group_by(ir: &mut SelectQueryIR) -> Option<String> {
    let before = ir.group_by.len();
    let mut kept: Vec<ColumnRef> = Vec::with_capacity(before);
    for column in ir.group_by.drain(..) {
        if !kept.iter().any(|k| k.same_column(&column)) {
            kept.push(column);
        }
    }
    ir.group_by = kept;
    let removed = before - ir.group_by.len();
    (removed > 0).then(|| format!("removed {} duplicate grouping keys", removed))
}

/// Fold literal comparisons and single-value sets, drop tautologies and duplicate predicates
pub fn fold_constants(ir: &mut SelectQueryIR) -> Option<String> {
    let mut notes = Vec::new();
    fold_list(&mut ir.where_, &mut notes);
    fold_list(&mut ir.having, &mut notes);
    for join in &mut ir.joins {
        fold_list(&mut join.conditions, &mut notes);
    }
    if notes.is_empty() {
        None
    } else {
        Some(notes.join("; "))
    }
}

fn fold_list(conditions: &mut Vec<Condition>, notes: &mut Vec<String>) {
    let mut out: Vec<Condition> = Vec::with_capacity(conditions.len());
    for mut condition in conditions.drain(..) {
        match (&condition.lhs, condition.op, &condition.rhs) {
            (Operand::Literal { value: lhs }, op, ConditionValue::Literal { value: rhs }) => {
                if evaluate(lhs, op, rhs) == Some(true) {
                    notes.push(format!("dropped always-true {} {} {}", lhs, op.sql(), rhs));
                    continue;
                }
            }
            (_, ComparisonOp::Between, ConditionValue::Range { low, high }) if low == high => {
                notes.push(format!("BETWEEN {} AND {} folded to equality", low, high));
                let value = low.clone();
                condition.op = ComparisonOp::Eq;
                condition.rhs = ConditionValue::Literal { value };
            }
            (_, op @ (ComparisonOp::In | ComparisonOp::NotIn), ConditionValue::LiteralSet { values })
                if values.len() == 1 =>
            {
                notes.push(format!("single-value {} folded to comparison", op.sql()));
                let value = values[0].clone();
                condition.op = if op == ComparisonOp::In {
                    ComparisonOp::Eq
                } else {
                    ComparisonOp::NotEq
                };
                condition.rhs = ConditionValue::Literal { value };
            }
            _ => {}
        }
        if out.contains(&condition) {
            notes.push("removed duplicate predicate".to_string());
            continue;
        }
        out.push(condition);
    }
    *conditions = out;
}

fn evaluate(lhs: &Literal, op: ComparisonOp, rhs: &Literal) -> Option<bool> {
    let ordering = compare_literals(lhs, rhs)?;
    Some(match op {
        ComparisonOp::Eq => ordering == Ordering::Equal,
        ComparisonOp::NotEq => ordering != Ordering::Equal,
        ComparisonOp::Lt => ordering == Ordering::Less,
        ComparisonOp::LtEq => ordering != Ordering::Greater,
        ComparisonOp::Gt => ordering == Ordering::Greater,
        ComparisonOp::GtEq => ordering != Ordering::Less,
        _ => return None,
    })
}

fn compare_literals(a: &Literal, b: &Literal) -> Option<Ordering> {
    match (a, b) {
        (Literal::Integer(x), Literal::Integer(y)) => Some(x.cmp(y)),
        (Literal::Integer(x), Literal::Float(y)) => (*x as f64).partial_cmp(y),
        (Literal::Float(x), Literal::Integer(y)) => x.partial_cmp(&(*y as f64)),
        (Literal::Float(x), Literal::Float(y)) => x.partial_cmp(y),
        (Literal::Text(x), Literal::Text(y)) | (Literal::Date(x), Literal::Date(y)) => Some(x.cmp(y)),
        (Literal::Boolean(x), Literal::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Attach single-table WHERE predicates to the inner join that introduces their table.
///
/// Predicates over two tables, over aggregates, or with a subquery stay in WHERE,
/// as do predicates on the FROM table and on left-joined tables.
pub fn push_down_predicates(ir: &mut SelectQueryIR) -> Option<String> {
    let mut pushed = Vec::new();
    let mut remaining = Vec::with_capacity(ir.where_.len());
    for condition in ir.where_.drain(..) {
        let target = match (&condition.rhs, condition.single_table()) {
            (ConditionValue::Subquery { .. }, _) | (_, None) => None,
            (_, Some(table)) => ir
                .joins
                .iter()
                .position(|j| j.kind == JoinKind::Inner && j.table().eq_ignore_ascii_case(&table)),
        };
        match target {
            Some(i) => {
                pushed.push(ir.joins[i].table().to_string());
                ir.joins[i].conditions.push(condition);
            }
            None => remaining.push(condition),
        }
    }
    ir.where_ = remaining;
    if pushed.is_empty() {
        None
    } else {
        Some(format!("pushed {} predicates into joins on {}", pushed.len(), pushed.join(", ")))
    }
}

/// Minimal column set each table must supply, `*` when a star projection needs all of them
pub fn required_columns(ir: &SelectQueryIR) -> BTreeMap<String, BTreeSet<String>> {
    let mut required: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    ir.visit_column_refs(|c, _| {
        required
            .entry(c.table.to_ascii_lowercase())
            .or_default()
            .insert(c.column.to_ascii_lowercase());
    });
    required
}

/// Describe how many schema columns the query can skip reading
pub fn pruning_summary(required: &BTreeMap<String, BTreeSet<String>>, schema: &SchemaModel) -> Option<String> {
    let mut skipped = 0;
    for (table, columns) in required {
        if columns.contains("*") {
            continue;
        }
        if let Some(t) = schema.table(table) {
            skipped += t.columns.len().saturating_sub(columns.len());
        }
    }
    (skipped > 0).then(|| format!("{} columns not read across {} tables", skipped, required.len()))
}

/// Columns used for filtering, joining or ordering, with their index status
pub fn index_hints(ir: &SelectQueryIR, schema: &SchemaModel) -> Vec<IndexHint> {
    let mut hints: Vec<IndexHint> = Vec::new();
    ir.visit_column_refs(|c, clause| {
        let usage = match clause {
            Clause::Where => IndexUse::Filter,
            Clause::Join => IndexUse::Join,
            Clause::OrderBy => IndexUse::Order,
            _ => return,
        };
        if c.is_star() {
            return;
        }
        let Some(column) = schema.column(&c.table, &c.column) else {
            return;
        };
        let exists = hints
            .iter()
            .any(|h| h.usage == usage && h.table.eq_ignore_ascii_case(&c.table) && h.column.eq_ignore_ascii_case(&c.column));
        if !exists {
            hints.push(IndexHint {
                table: c.table.clone(),
                column: c.column.clone(),
                usage,
                indexed: column.has_index(),
            });
        }
    });
    hints
}

/// Rewrite `col IN (SELECT pk FROM t WHERE ...)` into an inner join on `t`.
///
/// Only plain key subqueries qualify: one primary-key column, no joins,
/// grouping, aggregates or limit, over a table not already in scope.
pub fn unnest_subqueries(ir: &mut SelectQueryIR, schema: &SchemaModel) -> Option<String> {
    let mut unnested = Vec::new();
    let mut remaining = Vec::with_capacity(ir.where_.len());
    let conditions: Vec<Condition> = ir.where_.drain(..).collect();
    for condition in conditions {
        match unnestable(&condition, ir, schema) {
            Some((outer, key, sub)) => {
                let mut join = JoinSpec::inner(outer, key);
                join.conditions = sub.where_;
                unnested.push(sub.from);
                ir.joins.push(join);
            }
            None => remaining.push(condition),
        }
    }
    ir.where_ = remaining;
    if unnested.is_empty() {
        None
    } else {
        Some(format!("unnested IN-subqueries on {}", unnested.join(", ")))
    }
}

fn unnestable(
    condition: &Condition,
    ir: &SelectQueryIR,
    schema: &SchemaModel,
) -> Option<(ColumnRef, ColumnRef, SelectQueryIR)> {
    let (Operand::Column(outer), ComparisonOp::In, ConditionValue::Subquery { query }) =
        (&condition.lhs, condition.op, &condition.rhs)
    else {
        return None;
    };
    if !query.joins.is_empty()
        || !query.group_by.is_empty()
        || !query.having.is_empty()
        || query.has_aggregates()
        || query.limit.is_some()
        || query.columns.len() != 1
        || ir.has_table(&query.from)
    {
        return None;
    }
    let key = query.columns[0].as_column()?;
    let pk = schema.table(&query.from)?.primary_key()?;
    if key.is_star() || !key.column.eq_ignore_ascii_case(&pk.name) || !key.table.eq_ignore_ascii_case(&query.from) {
        return None;
    }
    Some((outer.unaliased(), key.unaliased(), (**query).clone()))
}
