//! Plain-text rationale for a query and its optimization

use super::dialect::Dialect;
use crate::ir::{
    AggregateExpr, AggregateFunction, AggregateSpec, ComparisonOp, Condition, ConditionValue, JoinKind, Literal, Operand,
    OrderDirection, Projection, SelectQueryIR,
};
use crate::optimizer::OptimizationResult;

/// Describe what `ir` reads, combines, filters and returns
pub fn explain(ir: &SelectQueryIR, dialect: Dialect) -> String {
    let mut lines = vec![format!("Base table: {}.", ir.from)];

    if !ir.joins.is_empty() {
        let joins: Vec<String> = ir
            .joins
            .iter()
            .map(|j| {
                let kind = match j.kind {
                    JoinKind::Inner => "inner",
                    JoinKind::Left => "left",
                };
                let mut text = format!("{} join {} on {} = {}", kind, j.table(), j.left, j.right);
                if !j.conditions.is_empty() {
                    let extra: Vec<String> = j.conditions.iter().map(describe_condition).collect();
                    text.push_str(&format!(" (with {})", extra.join(" and ")));
                }
                text
            })
            .collect();
        lines.push(format!("Joins: {}.", joins.join("; ")));
    }

    let aggregates: Vec<String> = ir
        .columns
        .iter()
        .filter_map(Projection::as_aggregate)
        .map(describe_aggregate)
        .collect();
    if !aggregates.is_empty() {
        lines.push(format!("Aggregates: {}.", aggregates.join("; ")));
    }

    if !ir.group_by.is_empty() {
        let keys: Vec<String> = ir.group_by.iter().map(|c| c.to_string()).collect();
        lines.push(format!("Grouped by: {}.", keys.join(", ")));
    }

    let filters: Vec<String> = ir.where_.iter().map(describe_condition).collect();
    if !filters.is_empty() {
        lines.push(format!("Filters: {}.", filters.join("; ")));
    }
    if !ir.having.is_empty() {
        let having: Vec<String> = ir.having.iter().map(describe_condition).collect();
        lines.push(format!("Group filters: {}.", having.join("; ")));
    }

    if !ir.order_by.is_empty() {
        let keys: Vec<String> = ir
            .order_by
            .iter()
            .map(|o| {
                let target = match &o.expr {
                    Projection::Column(c) => c.to_string(),
                    Projection::Aggregate(a) => a.alias.clone().unwrap_or_else(|| aggregate_text(a)),
                };
                match o.direction {
                    Some(OrderDirection::Desc) => format!("{} descending", target),
                    Some(OrderDirection::Asc) => format!("{} ascending", target),
                    None => target,
                }
            })
            .collect();
        lines.push(format!("Ordered by: {}.", keys.join(", ")));
    }
    if let Some(limit) = ir.limit {
        lines.push(format!("Limited to {} rows.", limit));
    }

    let date_note = if ir.has_relative_date_filter() {
        format!(" Relative dates use {}'s own date arithmetic.", dialect)
    } else {
        String::new()
    };
    lines.push(format!(
        "Only the columns the answer needs are projected; SQL is rendered for the {} dialect with quoted identifiers.{}",
        dialect, date_note
    ));
    lines.join("\n")
}

/// Cost summary, applied rewrites, alternatives and recommendations
pub fn explain_optimization(result: &OptimizationResult) -> String {
    let mut lines = vec![format!(
        "Estimated cost {:.2} (input plan {:.2}){}.",
        result.estimated_cost,
        result.original_cost,
        if result.cached { ", served from cache" } else { "" }
    )];
    for o in &result.optimizations {
        lines.push(format!("- {:?}: {}", o.kind, o.description));
    }
    for a in &result.alternatives {
        lines.push(format!("Alternative ({:?}): {} at cost {:.2}", a.kind, a.description, a.estimated_cost));
    }
    for r in &result.recommendations {
        lines.push(format!("Recommendation ({:?}) on {}: {}", r.kind, r.table, r.reason));
    }
    lines.push("Plan:".to_string());
    lines.push(result.plan.render().trim_end().to_string());
    lines.join("\n")
}

fn aggregate_text(a: &AggregateSpec) -> String {
    let arg = match &a.expr {
        AggregateExpr::Column { column } if column.is_star() => "*".to_string(),
        AggregateExpr::Column { column } => column.to_string(),
        AggregateExpr::Arithmetic { left, op, right } => format!("{} {} {}", left, op.symbol(), right),
        AggregateExpr::Raw { sql } => sql.clone(),
    };
    let distinct = if a.distinct { "DISTINCT " } else { "" };
    format!("{}({}{})", a.func.sql_name(), distinct, arg)
}

fn describe_aggregate(a: &AggregateSpec) -> String {
    let what = match (&a.func, &a.expr) {
        (AggregateFunction::Count, AggregateExpr::Column { column }) if column.is_star() => {
            format!("counting {} rows", column.table)
        }
        (AggregateFunction::Sum, AggregateExpr::Arithmetic { left, right, .. }) => {
            format!("summing {} times {} per line", left.column, right.column)
        }
        (AggregateFunction::Sum, _) => "summing the measure".to_string(),
        (AggregateFunction::Avg, _) => "averaging the measure".to_string(),
        (AggregateFunction::Min, _) => "taking the smallest value".to_string(),
        (AggregateFunction::Max, _) => "taking the largest value".to_string(),
        (AggregateFunction::Count, _) => "counting non-null values".to_string(),
    };
    match &a.alias {
        Some(alias) => format!("{} as {}, {}", aggregate_text(a), alias, what),
        None => format!("{}, {}", aggregate_text(a), what),
    }
}

fn literal_text(value: &Literal) -> String {
    value.to_string()
}

/// Dialect-neutral description of one predicate
pub fn describe_condition(c: &Condition) -> String {
    let lhs = match &c.lhs {
        Operand::Column(col) => col.to_string(),
        Operand::Aggregate(a) => aggregate_text(a),
        Operand::MonthOf { column } => format!("month of {}", column),
        Operand::Literal { value } => literal_text(value),
    };
    match (&c.rhs, c.op) {
        (_, ComparisonOp::IsNull) | (ConditionValue::Null, ComparisonOp::Eq) => format!("{} is missing", lhs),
        (_, ComparisonOp::IsNotNull) | (ConditionValue::Null, _) => format!("{} is present", lhs),
        (ConditionValue::RelativeInterval { interval_days }, _) => {
            format!("{} within the last {} days", lhs, interval_days)
        }
        (ConditionValue::Range { low, high }, _) => format!("{} between {} and {}", lhs, low, high),
        (ConditionValue::LiteralSet { values }, op) => {
            let items: Vec<String> = values.iter().map(literal_text).collect();
            format!("{} {} ({})", lhs, op.sql(), items.join(", "))
        }
        (ConditionValue::Literal { value }, op) => format!("{} {} {}", lhs, op.sql(), literal_text(value)),
        (ConditionValue::Column { column }, op) => format!("{} {} {}", lhs, op.sql(), column),
        (ConditionValue::Subquery { query }, op) => format!("{} {} a subquery over {}", lhs, op.sql(), query.from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticOp, ColumnRef, JoinSpec};

    #[test]
    fn test_explanation_covers_every_part() {
        let mut ir = SelectQueryIR::new("customers");
        ir.columns.push(Projection::Column(ColumnRef::new("customers", "name")));
        ir.columns.push(Projection::Aggregate(
            AggregateSpec {
                func: AggregateFunction::Sum,
                expr: AggregateExpr::Arithmetic {
                    left: ColumnRef::new("order_items", "quantity"),
                    op: ArithmeticOp::Multiply,
                    right: ColumnRef::new("order_items", "unit_price"),
                },
                alias: None,
                distinct: false,
            }
            .with_alias("total_revenue"),
        ));
        ir.joins.push(JoinSpec::inner(
            ColumnRef::new("customers", "id"),
            ColumnRef::new("orders", "customer_id"),
        ));
        ir.joins.push(JoinSpec::inner(
            ColumnRef::new("orders", "id"),
            ColumnRef::new("order_items", "order_id"),
        ));
        ir.where_.push(Condition::new(
            Operand::Column(ColumnRef::new("orders", "order_date")),
            ComparisonOp::GtEq,
            ConditionValue::RelativeInterval { interval_days: 30 },
        ));
        ir.group_by.push(ColumnRef::new("customers", "name"));

        let text = explain(&ir, Dialect::Postgres);
        assert!(text.starts_with("Base table: customers."));
        assert!(text.contains("inner join orders on customers.id = orders.customer_id"));
        assert!(text.contains("as total_revenue, summing quantity times unit_price per line"));
        assert!(text.contains("Grouped by: customers.name."));
        assert!(text.contains("orders.order_date within the last 30 days"));
        assert!(text.contains("postgres dialect"));
        assert!(text.contains("date arithmetic"));
    }

    #[test]
    fn test_describe_condition() {
        let c = Condition::new(
            Operand::MonthOf {
                column: ColumnRef::new("orders", "order_date"),
            },
            ComparisonOp::Eq,
            ConditionValue::Literal { value: Literal::Integer(3) },
        );
        assert_eq!(describe_condition(&c), "month of orders.order_date = 3");
        let n = Condition::new(
            Operand::Column(ColumnRef::new("orders", "shipped_at")),
            ComparisonOp::IsNull,
            ConditionValue::Null,
        );
        assert_eq!(describe_condition(&n), "orders.shipped_at is missing");
    }
}
