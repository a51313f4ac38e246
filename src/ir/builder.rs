//! Heuristic IR Builder - schema-driven translation from question text straight
//! to a `SelectQueryIR`, tuned to common analytic phrasing.
//!
//! # Algorithm
//! 1. Base table: entity-hint words ("revenue" -> orders), then any literal table
//!    name in the text, then the caller default, then the schema's first table.
//! 2. Aggregate: average family > count > sum > max > min. SUM prefers a
//!    synthesized `quantity * unit_price` over a joinable line-items table, then a
//!    `total`/`amount`/`price` column on the base table.
//! 3. Grouping: "per/by/for each X" resolves X to a column in scope, or to a
//!    dimension table reached through the join graph (grouped by its label column).
//!    A dimension table becomes the new FROM and the join list is re-rooted on it.
//! 4. Filters are inferred only after the table set is final: relative intervals,
//!    month mentions and status words.
//! 5. "top N" limits the result and orders by the aggregate.

use super::model::*;
use super::strategy::{BuildOptions, IrStrategy};
use crate::error::{EngineError, EngineResult};
use crate::nlp::recognizer::month_number;
use crate::schema::naming::{normalize_identifier, surface_forms};
use crate::schema::{SchemaModel, Table};
use regex::Regex;
use tracing::{debug, info};

/// Words that name a fact rather than a table, mapped to likely table names
const TABLE_HINTS: &[(&str, &[&str])] = &[
    ("revenue", &["orders", "sales", "invoices", "transactions"]),
    ("sales", &["sales", "orders", "invoices"]),
    ("income", &["invoices", "orders", "payments"]),
    ("spend", &["orders", "transactions", "purchases"]),
    ("spending", &["orders", "transactions", "purchases"]),
    ("purchases", &["purchases", "orders"]),
    ("order", &["orders"]),
    ("orders", &["orders"]),
    ("customer", &["customers", "clients"]),
    ("customers", &["customers", "clients"]),
    ("product", &["products", "items"]),
    ("products", &["products", "items"]),
    ("restaurant", &["restaurants"]),
    ("restaurants", &["restaurants"]),
];

/// Words whose following word is a grouping target, not a base-table hint
const GROUPING_WORDS: &[&str] = &["per", "by", "each", "every"];

const STATUS_WORDS: &[&str] = &[
    "pending", "shipped", "delivered", "cancelled", "canceled", "completed", "paid", "unpaid", "refunded",
    "active", "inactive", "open", "closed", "returned", "processing",
];

const QUANTITY_COLUMNS: &[&str] = &["quantity", "qty", "units"];
const PRICE_COLUMNS: &[&str] = &["unit_price", "price", "unit_cost"];
const SUM_COLUMN_PREFERENCE: &[&str] = &["total", "amount", "price"];

/// Schema-driven direct text-to-IR builder
pub struct HeuristicIrBuilder {
    words: Regex,
    interval: Regex,
    period: Regex,
    grouping: Regex,
    top: Regex,
    last_rows: Regex,
}

impl HeuristicIrBuilder {
    pub fn new() -> EngineResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| EngineError::internal(format!("invalid builder pattern: {}", e)))
        };
        Ok(Self {
            words: compile(r"[a-z0-9_]+")?,
            interval: compile(r"\b(?:last|past|previous|trailing)\s+(\d+)\s+(day|week|month|year)s?\b")?,
            period: compile(r"\b(?:last|past|this|previous)\s+(week|month|quarter|year)\b|\b(today|yesterday)\b")?,
            grouping: compile(
                r"\b(sort(?:ed)?\s+|order(?:ed)?\s+)?(?:per|by|for\s+each|for\s+every|each)\s+(?:the\s+)?([a-z][a-z_]*)(?:\s+([a-z][a-z_]*))?",
            )?,
            top: compile(r"\b(top|first|bottom)\s+(\d+)\b")?,
            last_rows: compile(r"\blast\s+(\d+)\s+([a-z_]+)")?,
        })
    }

    /// Build the IR for `text`. Fails with `NoTable` only when the schema has no
    /// tables and no default table was supplied.
    pub fn build(&self, text: &str, schema: &SchemaModel, options: &BuildOptions) -> EngineResult<SelectQueryIR> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = self.words.find_iter(&lower).map(|m| m.as_str()).collect();

        let base = self.base_table(&words, schema, options)?;
        info!(base = %base, "heuristic builder chose base table");
        let mut scope = JoinScope::new(schema, base);

        let aggregate = self.aggregate(&lower, &words, &mut scope);
        let group_by = self.grouping(&lower, &mut scope);

        let root = scope.root.clone();
        let joins = scope.rooted_joins(&root)?;
        let mut ir = SelectQueryIR::new(root);
        ir.joins = joins;

        // Filters need the final table set
        ir.where_ = self.filters(&lower, &words, &scope);

        match (&aggregate, group_by.is_empty()) {
            (Some(agg), _) => {
                ir.columns.extend(group_by.iter().cloned().map(Projection::Column));
                ir.columns.push(Projection::Aggregate(agg.clone()));
            }
            (None, false) => {
                ir.columns.extend(group_by.iter().cloned().map(Projection::Column));
                ir.columns.push(Projection::Aggregate(
                    AggregateSpec::count_star(&scope.base).with_alias("count"),
                ));
            }
            (None, true) => {
                let mentioned = mentioned_columns(&words, scope.table(&scope.base));
                if mentioned.is_empty() {
                    ir.columns.push(Projection::Column(ColumnRef::star(&ir.from)));
                } else {
                    ir.columns.extend(
                        mentioned
                            .into_iter()
                            .map(|c| Projection::Column(ColumnRef::new(&scope.base, c))),
                    );
                }
            }
        }
        ir.group_by = group_by;

        self.limit_and_order(&lower, &mut ir, &scope);
        ir.validate()?;
        debug!(
            from = %ir.from,
            joins = ir.joins.len(),
            filters = ir.where_.len(),
            "heuristic IR built"
        );
        Ok(ir)
    }

    fn base_table(&self, words: &[&str], schema: &SchemaModel, options: &BuildOptions) -> EngineResult<String> {
        let candidates: Vec<&str> = words
            .iter()
            .enumerate()
            .filter(|(i, _)| *i == 0 || !GROUPING_WORDS.contains(&words[i - 1]))
            .map(|(_, w)| *w)
            .collect();

        for word in &candidates {
            if let Some((_, tables)) = TABLE_HINTS.iter().find(|(hint, _)| hint == word) {
                if let Some(table) = tables.iter().find_map(|t| schema.find_table_tolerant(t)) {
                    return Ok(table.name.clone());
                }
            }
        }

        for pair in candidates.windows(2) {
            if let Some(table) = schema.find_table_tolerant(&format!("{} {}", pair[0], pair[1])) {
                return Ok(table.name.clone());
            }
        }
        for word in &candidates {
            if let Some(table) = schema.find_table_tolerant(word) {
                return Ok(table.name.clone());
            }
        }

        if let Some(default) = &options.default_table {
            let name = schema.table(default).map_or_else(|| default.clone(), |t| t.name.clone());
            return Ok(name);
        }
        schema
            .tables()
            .first()
            .map(|t| t.name.clone())
            .ok_or_else(|| EngineError::no_table("schema has no tables and no default table was given"))
    }

    fn aggregate(&self, lower: &str, words: &[&str], scope: &mut JoinScope<'_>) -> Option<AggregateSpec> {
        let has = |w: &str| words.contains(&w);
        let phrase = |p: &str| lower.contains(p);

        if has("average") || has("avg") || has("mean") {
            return self.measure_aggregate(AggregateFunction::Avg, "avg", words, scope);
        }
        if has("count") || phrase("how many") || phrase("number of") {
            return Some(AggregateSpec::count_star(&scope.base).with_alias("count"));
        }
        if has("total") || has("sum") || has("revenue") || has("sales") {
            return Some(self.sum_aggregate(words, scope));
        }
        if has("maximum") || has("max") || has("highest") || has("largest") {
            return self.measure_aggregate(AggregateFunction::Max, "max", words, scope);
        }
        if has("minimum") || has("min") || has("lowest") || has("smallest") {
            return self.measure_aggregate(AggregateFunction::Min, "min", words, scope);
        }
        None
    }

    fn sum_aggregate(&self, words: &[&str], scope: &mut JoinScope<'_>) -> AggregateSpec {
        let alias = if words.contains(&"revenue") {
            Some("total_revenue".to_string())
        } else if words.contains(&"sales") {
            Some("total_sales".to_string())
        } else {
            None
        };

        if let Some(items) = scope.line_items_table() {
            let (quantity, price) = line_item_columns(items).unwrap_or_default();
            let items_name = items.name.clone();
            if scope.ensure_table(&items_name) {
                debug!(table = %items_name, "summing quantity * unit price over line items");
                let spec = AggregateSpec {
                    func: AggregateFunction::Sum,
                    expr: AggregateExpr::Arithmetic {
                        left: ColumnRef::new(&items_name, quantity),
                        op: ArithmeticOp::Multiply,
                        right: ColumnRef::new(&items_name, price),
                    },
                    alias: None,
                    distinct: false,
                };
                return spec.with_alias(alias.unwrap_or_else(|| "total_value".to_string()));
            }
        }

        let base = scope.table(&scope.base);
        let column = base.and_then(|t| {
            SUM_COLUMN_PREFERENCE.iter().find_map(|pref| {
                t.columns
                    .iter()
                    .find(|c| normalize_identifier(&c.name).contains(pref) && !c.is_key_like())
            })
        });
        let column = column.or_else(|| base.and_then(|t| t.measure_columns().into_iter().next()));

        match column {
            Some(c) => {
                debug!(column = %c.name, "summing base table column");
                let alias = alias.unwrap_or_else(|| format!("total_{}", normalize_identifier(&c.name)));
                AggregateSpec::new(AggregateFunction::Sum, ColumnRef::new(&scope.base, &c.name)).with_alias(alias)
            }
            None => {
                debug!(table = %scope.base, "no summable column, counting rows instead");
                AggregateSpec::count_star(&scope.base).with_alias("count")
            }
        }
    }

    /// AVG/MIN/MAX over the numeric column the text names, else the base table's first measure
    fn measure_aggregate(
        &self,
        func: AggregateFunction,
        prefix: &str,
        words: &[&str],
        scope: &mut JoinScope<'_>,
    ) -> Option<AggregateSpec> {
        let tables = scope.scope();
        let named = tables.iter().find_map(|t| {
            let table = scope.table(t)?;
            table
                .measure_columns()
                .into_iter()
                .find(|c| mentioned(words, &c.name))
                .map(|c| (table.name.clone(), c.name.clone()))
        });
        let target = named.or_else(|| {
            let base = scope.table(&scope.base)?;
            base.measure_columns()
                .into_iter()
                .next()
                .map(|c| (base.name.clone(), c.name.clone()))
        });

        let spec = match target {
            Some((table, column)) => {
                debug!(table = %table, column = %column, func = func.sql_name(), "aggregate target");
                let alias = format!("{}_{}", prefix, normalize_identifier(&column));
                AggregateSpec::new(func, ColumnRef::new(table, column)).with_alias(alias)
            }
            None => AggregateSpec::count_star(&scope.base).with_alias("count"),
        };
        Some(spec)
    }

    fn grouping(&self, lower: &str, scope: &mut JoinScope<'_>) -> Vec<ColumnRef> {
        let mut group_by: Vec<ColumnRef> = Vec::new();
        for caps in self.grouping.captures_iter(lower) {
            if caps.get(1).is_some() {
                continue;
            }
            let Some(first) = caps.get(2).map(|m| m.as_str()) else { continue };
            let second = caps.get(3).map(|m| m.as_str());

            let resolved = second
                .and_then(|s| self.resolve_group_target(&format!("{}_{}", first, s), scope))
                .or_else(|| self.resolve_group_target(first, scope));
            match resolved {
                Some(col) if !group_by.iter().any(|g| g.same_column(&col)) => group_by.push(col),
                Some(_) => {}
                None => debug!(word = first, "grouping target not found in schema"),
            }
        }
        group_by
    }

    fn resolve_group_target(&self, word: &str, scope: &mut JoinScope<'_>) -> Option<ColumnRef> {
        let schema = scope.schema;

        if matches!(word, "day" | "date" | "daily") {
            return scope.scope().iter().find_map(|t| {
                let table = scope.table(t)?;
                table.date_column().map(|c| ColumnRef::new(&table.name, &c.name))
            });
        }

        for t in scope.scope() {
            if let Some(col) = scope.table(&t).and_then(|table| table.column(word)) {
                return Some(ColumnRef::new(t, &col.name));
            }
        }

        if let Some(table) = schema.find_table_tolerant(word) {
            let name = table.name.clone();
            let label = table.label_column()?.name.clone();
            if !scope.in_scope(&name) {
                if !scope.ensure_table(&name) {
                    return None;
                }
                scope.root = name.clone();
                info!(dimension = %name, "grouping by dimension table, re-rooting joins");
            }
            return Some(ColumnRef::new(name, label));
        }

        for table in schema.tables_with_column(word) {
            let name = table.name.clone();
            if scope.ensure_table(&name) {
                let col = table.column(word)?;
                return Some(ColumnRef::new(name, &col.name));
            }
        }
        None
    }

    fn filters(&self, lower: &str, words: &[&str], scope: &JoinScope<'_>) -> Vec<Condition> {
        let mut conditions = Vec::new();
        let date_column = scope.scope().iter().find_map(|t| {
            let table = scope.table(t)?;
            table.date_column().map(|c| ColumnRef::new(&table.name, &c.name))
        });

        let interval_days = self
            .interval
            .captures(lower)
            .and_then(|caps| {
                let n: u32 = caps.get(1)?.as_str().parse().ok()?;
                let unit = caps.get(2)?.as_str();
                Some(n.saturating_mul(unit_days(unit)))
            })
            .or_else(|| {
                let caps = self.period.captures(lower)?;
                let unit = caps.get(1).or_else(|| caps.get(2))?.as_str();
                Some(match unit {
                    "today" => 0,
                    "yesterday" => 1,
                    other => unit_days(other),
                })
            });

        if let (Some(days), Some(column)) = (interval_days, &date_column) {
            debug!(days, column = %column, "relative interval filter");
            conditions.push(Condition::new(
                Operand::Column(column.clone()),
                ComparisonOp::GtEq,
                ConditionValue::RelativeInterval { interval_days: days },
            ));
        }

        if let (Some(month), Some(column)) = (words.iter().find_map(|w| month_number(w)), &date_column) {
            conditions.push(Condition::new(
                Operand::MonthOf { column: column.clone() },
                ComparisonOp::Eq,
                ConditionValue::Literal {
                    value: Literal::Integer(month as i64),
                },
            ));
        }

        if let Some(status) = words.iter().find(|w| STATUS_WORDS.contains(w)) {
            let status_column = scope.scope().iter().find_map(|t| {
                let table = scope.table(t)?;
                table.column("status").map(|c| ColumnRef::new(&table.name, &c.name))
            });
            if let Some(column) = status_column {
                conditions.push(Condition::compare(column, ComparisonOp::Eq, Literal::Text(status.to_string())));
            }
        }
        conditions
    }

    fn limit_and_order(&self, lower: &str, ir: &mut SelectQueryIR, scope: &JoinScope<'_>) {
        if let Some(caps) = self.top.captures(lower) {
            let direction = if &caps[1] == "bottom" {
                OrderDirection::Asc
            } else {
                OrderDirection::Desc
            };
            ir.limit = caps[2].parse().ok();
            let aggregate = ir.columns.iter().find_map(Projection::as_aggregate).cloned();
            if let Some(agg) = aggregate {
                ir.order_by.push(OrderBySpec::new(Projection::Aggregate(agg), Some(direction)));
            }
            return;
        }

        // "last 5 orders" (not "last 5 days"): newest rows first
        if let Some(caps) = self.last_rows.captures(lower) {
            let unit = caps[2].trim_end_matches('s');
            if matches!(unit, "day" | "week" | "month" | "year") {
                return;
            }
            ir.limit = caps[1].parse().ok();
            let date = scope
                .table(&scope.base)
                .and_then(Table::date_column)
                .map(|c| ColumnRef::new(&scope.base, &c.name));
            if let Some(column) = date {
                ir.order_by.push(OrderBySpec::new(Projection::Column(column), Some(OrderDirection::Desc)));
            }
        }
    }
}

impl IrStrategy for HeuristicIrBuilder {
    fn build(&self, text: &str, schema: &SchemaModel, options: &BuildOptions) -> EngineResult<SelectQueryIR> {
        HeuristicIrBuilder::build(self, text, schema, options)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

fn unit_days(unit: &str) -> u32 {
    match unit {
        "week" => 7,
        "month" => 30,
        "quarter" => 90,
        "year" => 365,
        _ => 1,
    }
}

/// True when any surface form of `name` appears as a word or adjacent word pair
fn mentioned(words: &[&str], name: &str) -> bool {
    let forms = surface_forms(name);
    words.iter().any(|w| forms.iter().any(|f| f == w))
        || words
            .windows(2)
            .any(|pair| forms.iter().any(|f| *f == format!("{} {}", pair[0], pair[1])))
}

/// Columns of `table` named in the text, excluding words that also name the table
fn mentioned_columns(words: &[&str], table: Option<&Table>) -> Vec<String> {
    let Some(table) = table else { return Vec::new() };
    let table_forms = surface_forms(&table.name);
    let words: Vec<&str> = words.iter().copied().filter(|w| !table_forms.iter().any(|f| f == w)).collect();
    table
        .columns
        .iter()
        .filter(|c| mentioned(&words, &c.name))
        .map(|c| c.name.clone())
        .collect()
}

fn line_item_columns(table: &Table) -> Option<(String, String)> {
    let quantity = QUANTITY_COLUMNS.iter().find_map(|q| table.column(q))?;
    let price = PRICE_COLUMNS.iter().find_map(|p| table.column(p))?;
    Some((quantity.name.clone(), price.name.clone()))
}

/// Working state: base table plus join hops inserted so far
pub(super) struct JoinScope<'s> {
    pub(super) schema: &'s SchemaModel,
    pub(super) base: String,
    /// Table the final join list is rooted at (base, or a grouping dimension)
    pub(super) root: String,
    /// Each hop's left side is in scope when it is added
    pub(super) hops: Vec<JoinSpec>,
}

impl<'s> JoinScope<'s> {
    pub(super) fn new(schema: &'s SchemaModel, base: String) -> Self {
        Self {
            schema,
            root: base.clone(),
            base,
            hops: Vec::new(),
        }
    }

    pub(super) fn table(&self, name: &str) -> Option<&'s Table> {
        self.schema.table(name)
    }

    pub(super) fn scope(&self) -> Vec<String> {
        let mut tables = vec![self.base.clone()];
        tables.extend(self.hops.iter().map(|j| j.right.table.clone()));
        tables
    }

    pub(super) fn in_scope(&self, table: &str) -> bool {
        self.scope().iter().any(|t| t.eq_ignore_ascii_case(table))
    }

    /// Join `table` in through the shortest relationship path; false when unreachable
    pub(super) fn ensure_table(&mut self, table: &str) -> bool {
        let Some(path) = self.schema.join_path(&self.scope(), table) else {
            debug!(table, "no join path from current tables");
            return false;
        };
        for hop in path {
            debug!(from = %hop.from_table, to = %hop.to_table, "inserting join");
            self.hops.push(JoinSpec::inner(
                ColumnRef::new(hop.from_table, hop.from_column),
                ColumnRef::new(hop.to_table, hop.to_column),
            ));
        }
        true
    }

    /// A table carrying quantity and price columns: the base itself, or one reachable from it
    fn line_items_table(&self) -> Option<&'s Table> {
        if let Some(base) = self.table(&self.base) {
            if line_item_columns(base).is_some() {
                return Some(base);
            }
        }
        self.schema.tables().iter().find(|t| {
            !t.name.eq_ignore_ascii_case(&self.base)
                && line_item_columns(t).is_some()
                && self.schema.join_path(&[self.base.clone()], &t.name).is_some()
        })
    }

    /// Orient the hops as a join list valid from `root`
    pub(super) fn rooted_joins(&self, root: &str) -> EngineResult<Vec<JoinSpec>> {
        let mut scope = vec![root.to_ascii_lowercase()];
        let mut pending: Vec<&JoinSpec> = self.hops.iter().collect();
        let mut joins = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let next = pending.iter().position(|j| {
                scope.contains(&j.left.table.to_ascii_lowercase()) || scope.contains(&j.right.table.to_ascii_lowercase())
            });
            let Some(index) = next else {
                return Err(EngineError::internal(format!(
                    "join hops are not connected to {}",
                    root
                )));
            };
            let hop = pending.remove(index);
            let oriented = if scope.contains(&hop.left.table.to_ascii_lowercase()) {
                hop.clone()
            } else {
                hop.flipped()
            };
            scope.push(oriented.right.table.to_ascii_lowercase());
            joins.push(oriented);
        }
        Ok(joins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType};

    fn shop() -> SchemaModel {
        let mut schema = SchemaModel::new()
            .with_table(
                Table::new("customers")
                    .with_column(Column::new("id", ColumnType::Integer).primary_key())
                    .with_column(Column::new("name", ColumnType::Text)),
            )
            .with_table(
                Table::new("orders")
                    .with_column(Column::new("id", ColumnType::Integer).primary_key())
                    .with_column(Column::new("customer_id", ColumnType::Integer))
                    .with_column(Column::new("status", ColumnType::Text))
                    .with_column(Column::new("order_date", ColumnType::Date)),
            )
            .with_table(
                Table::new("order_items")
                    .with_column(Column::new("id", ColumnType::Integer).primary_key())
                    .with_column(Column::new("order_id", ColumnType::Integer))
                    .with_column(Column::new("product", ColumnType::Text))
                    .with_column(Column::new("quantity", ColumnType::Integer))
                    .with_column(Column::new("unit_price", ColumnType::Decimal)),
            );
        schema.infer_relationships();
        schema
    }

    fn build(text: &str) -> SelectQueryIR {
        HeuristicIrBuilder::new()
            .unwrap()
            .build(text, &shop(), &BuildOptions::default())
            .unwrap()
    }

    #[test]
    fn test_revenue_per_customer() {
        let ir = build("Show total revenue per customer");
        assert_eq!(ir.from, "customers");
        assert_eq!(ir.tables(), vec!["customers", "orders", "order_items"]);
        assert_eq!(ir.group_by, vec![ColumnRef::new("customers", "name")]);

        let agg = ir.columns[1].as_aggregate().unwrap();
        assert_eq!(agg.func, AggregateFunction::Sum);
        assert_eq!(agg.alias.as_deref(), Some("total_revenue"));
        assert!(matches!(agg.expr, AggregateExpr::Arithmetic { op: ArithmeticOp::Multiply, .. }));
        assert_eq!(ir.joins[0].left, ColumnRef::new("customers", "id"));
        assert_eq!(ir.joins[0].right, ColumnRef::new("orders", "customer_id"));
        assert!(ir.validate().is_ok());
    }

    #[test]
    fn test_count_orders() {
        let ir = build("count orders");
        assert_eq!(ir.from, "orders");
        assert!(ir.joins.is_empty());
        assert!(ir.group_by.is_empty());
        let agg = ir.columns[0].as_aggregate().unwrap();
        assert_eq!(agg.func, AggregateFunction::Count);
        assert_eq!(agg.column_refs(), vec![&ColumnRef::star("orders")]);
    }

    #[test]
    fn test_relative_interval_filter() {
        let ir = build("orders in the last 30 days");
        assert_eq!(ir.where_.len(), 1);
        assert_eq!(ir.where_[0].rhs, ConditionValue::RelativeInterval { interval_days: 30 });
        assert_eq!(ir.where_[0].column_refs()[0], &ColumnRef::new("orders", "order_date"));
        assert_eq!(ir.columns, vec![Projection::Column(ColumnRef::star("orders"))]);
    }

    #[test]
    fn test_month_and_status_filters() {
        let ir = build("shipped orders in march");
        assert_eq!(ir.where_.len(), 2);
        assert!(matches!(ir.where_[0].lhs, Operand::MonthOf { .. }));
        assert_eq!(
            ir.where_[1],
            Condition::compare(ColumnRef::new("orders", "status"), ComparisonOp::Eq, Literal::Text("shipped".into()))
        );
    }

    #[test]
    fn test_group_by_column_in_scope() {
        let ir = build("count orders by status");
        assert_eq!(ir.from, "orders");
        assert_eq!(ir.group_by, vec![ColumnRef::new("orders", "status")]);
        assert_eq!(ir.columns.len(), 2);
    }

    #[test]
    fn test_top_n_orders_by_aggregate() {
        let ir = build("top 3 customers by revenue");
        assert_eq!(ir.limit, Some(3));
        assert_eq!(ir.order_by.len(), 1);
        assert_eq!(ir.order_by[0].direction, Some(OrderDirection::Desc));
    }

    #[test]
    fn test_default_table_and_empty_schema() {
        let builder = HeuristicIrBuilder::new().unwrap();
        let err = builder
            .build("what happened", &SchemaModel::new(), &BuildOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NoTable { .. }));

        let options = BuildOptions {
            default_table: Some("order_items".into()),
        };
        let ir = builder.build("what happened", &shop(), &options).unwrap();
        assert_eq!(ir.from, "order_items");

        let ir = builder.build("what happened", &shop(), &BuildOptions::default()).unwrap();
        assert_eq!(ir.from, "customers");
    }

    #[test]
    fn test_sum_falls_back_to_amount_column() {
        let schema = SchemaModel::new().with_table(
            Table::new("payments")
                .with_column(Column::new("id", ColumnType::Integer).primary_key())
                .with_column(Column::new("amount", ColumnType::Decimal)),
        );
        let ir = HeuristicIrBuilder::new()
            .unwrap()
            .build("total payments", &schema, &BuildOptions::default())
            .unwrap();
        let agg = ir.columns[0].as_aggregate().unwrap();
        assert_eq!(agg.column_refs(), vec![&ColumnRef::new("payments", "amount")]);
        assert_eq!(agg.alias.as_deref(), Some("total_amount"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = build("Show total revenue per customer");
        let b = build("Show total revenue per customer");
        assert_eq!(a, b);
    }
}
