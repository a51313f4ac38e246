//! Intermediate representation of a select query.
//!
//! Every sum type carries an explicit `kind` tag in its serialized form so IR
//! documents produced outside the crate deserialize without shape probing.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// `table.column [AS alias]`; `column == "*"` selects every column of `table`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            alias: None,
        }
    }

    pub fn star(table: impl Into<String>) -> Self {
        Self::new(table, "*")
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn is_star(&self) -> bool {
        self.column == "*"
    }

    /// Same table and column, ignoring alias and case
    pub fn same_column(&self, other: &ColumnRef) -> bool {
        self.table.eq_ignore_ascii_case(&other.table) && self.column.eq_ignore_ascii_case(&other.column)
    }

    /// Copy without alias
    pub fn unaliased(&self) -> ColumnRef {
        ColumnRef::new(&self.table, &self.column)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }

    /// Parse a canonical aggregate name (`count`, `sum`, `avg`/`average`, `min`, `max`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(Self::Count),
            "sum" | "total" => Some(Self::Sum),
            "avg" | "average" | "mean" => Some(Self::Avg),
            "min" | "minimum" => Some(Self::Min),
            "max" | "maximum" => Some(Self::Max),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }
}

/// Aggregate argument
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateExpr {
    Column { column: ColumnRef },
    /// `left op right`, e.g. `quantity * unit_price`
    Arithmetic {
        left: ColumnRef,
        op: ArithmeticOp,
        right: ColumnRef,
    },
    /// Pre-rendered, dialect-neutral SQL fragment
    Raw { sql: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AggregateSpec {
    pub func: AggregateFunction,
    pub expr: AggregateExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub distinct: bool,
}

impl AggregateSpec {
    pub fn new(func: AggregateFunction, column: ColumnRef) -> Self {
        Self {
            func,
            expr: AggregateExpr::Column { column },
            alias: None,
            distinct: false,
        }
    }

    /// `COUNT(table.*)`
    pub fn count_star(table: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Count, ColumnRef::star(table))
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        match &self.expr {
            AggregateExpr::Column { column } => vec![column],
            AggregateExpr::Arithmetic { left, right, .. } => vec![left, right],
            AggregateExpr::Raw { .. } => Vec::new(),
        }
    }

    fn column_refs_mut(&mut self) -> Vec<&mut ColumnRef> {
        match &mut self.expr {
            AggregateExpr::Column { column } => vec![column],
            AggregateExpr::Arithmetic { left, right, .. } => vec![left, right],
            AggregateExpr::Raw { .. } => Vec::new(),
        }
    }

    /// Same function and argument, alias ignored
    pub fn same_expression(&self, other: &AggregateSpec) -> bool {
        self.func == other.func && self.distinct == other.distinct && self.expr == other.expr
    }
}

/// One SELECT-list item
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    Column(ColumnRef),
    Aggregate(AggregateSpec),
}

impl Projection {
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        match self {
            Self::Column(c) => vec![c],
            Self::Aggregate(a) => a.column_refs(),
        }
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Self::Column(c) => Some(c),
            Self::Aggregate(_) => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&AggregateSpec> {
        match self {
            Self::Aggregate(a) => Some(a),
            Self::Column(_) => None,
        }
    }
}

/// Literal value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    /// ISO-8601 date, rendered as a quoted string
    Date(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) | Self::Date(s) => write!(f, "'{}'", s),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Left-hand side of a condition
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    Column(ColumnRef),
    Aggregate(AggregateSpec),
    /// Month number (1-12) of a date column
    MonthOf { column: ColumnRef },
    Literal { value: Literal },
}

impl Operand {
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        match self {
            Self::Column(c) | Self::MonthOf { column: c } => vec![c],
            Self::Aggregate(a) => a.column_refs(),
            Self::Literal { .. } => Vec::new(),
        }
    }

    fn column_refs_mut(&mut self) -> Vec<&mut ColumnRef> {
        match self {
            Self::Column(c) | Self::MonthOf { column: c } => vec![c],
            Self::Aggregate(a) => a.column_refs_mut(),
            Self::Literal { .. } => Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    ILike,
    NotLike,
    In,
    NotIn,
    Between,
    IsNull,
    IsNotNull,
}

impl ComparisonOp {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Between => "BETWEEN",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    pub fn is_inequality(&self) -> bool {
        matches!(self, Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq)
    }

    /// Logical complement, used when a negation modifies a comparison
    pub fn negate(&self) -> Self {
        match self {
            Self::Eq => Self::NotEq,
            Self::NotEq => Self::Eq,
            Self::Lt => Self::GtEq,
            Self::LtEq => Self::Gt,
            Self::Gt => Self::LtEq,
            Self::GtEq => Self::Lt,
            Self::Like | Self::ILike => Self::NotLike,
            Self::NotLike => Self::Like,
            Self::In => Self::NotIn,
            Self::NotIn => Self::In,
            Self::Between => Self::Between,
            Self::IsNull => Self::IsNotNull,
            Self::IsNotNull => Self::IsNull,
        }
    }
}

/// Right-hand side of a condition
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionValue {
    Literal { value: Literal },
    LiteralSet { values: Vec<Literal> },
    Range { low: Literal, high: Literal },
    Null,
    /// `lhs >= today - interval_days`, rendered per dialect
    RelativeInterval { interval_days: u32 },
    Column { column: ColumnRef },
    Subquery { query: Box<SelectQueryIR> },
}

/// `lhs op rhs`; conditions in a list are ANDed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub lhs: Operand,
    pub op: ComparisonOp,
    pub rhs: ConditionValue,
}

impl Condition {
    pub fn new(lhs: Operand, op: ComparisonOp, rhs: ConditionValue) -> Self {
        Self { lhs, op, rhs }
    }

    /// `table.column op literal`
    pub fn compare(column: ColumnRef, op: ComparisonOp, value: Literal) -> Self {
        Self::new(Operand::Column(column), op, ConditionValue::Literal { value })
    }

    /// `a.x = b.y`
    pub fn columns_equal(left: ColumnRef, right: ColumnRef) -> Self {
        Self::new(Operand::Column(left), ComparisonOp::Eq, ConditionValue::Column { column: right })
    }

    /// Column references of this condition (subquery internals excluded)
    pub fn column_refs(&self) -> Vec<&ColumnRef> {
        let mut refs = self.lhs.column_refs();
        if let ConditionValue::Column { column } = &self.rhs {
            refs.push(column);
        }
        refs
    }

    fn column_refs_mut(&mut self) -> Vec<&mut ColumnRef> {
        let mut refs = self.lhs.column_refs_mut();
        if let ConditionValue::Column { column } = &mut self.rhs {
            refs.push(column);
        }
        refs
    }

    /// Distinct tables this condition reads, lower-cased
    pub fn tables(&self) -> BTreeSet<String> {
        self.column_refs().iter().map(|c| c.table.to_ascii_lowercase()).collect()
    }

    pub fn references_aggregate(&self) -> bool {
        matches!(self.lhs, Operand::Aggregate(_))
    }

    pub fn is_relative_date(&self) -> bool {
        matches!(self.rhs, ConditionValue::RelativeInterval { .. })
    }

    /// The single table a non-aggregate condition is confined to
    pub fn single_table(&self) -> Option<String> {
        if self.references_aggregate() {
            return None;
        }
        let tables = self.tables();
        if tables.len() == 1 {
            tables.into_iter().next()
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

impl JoinKind {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// `JOIN right.table ON left = right [AND conditions...]`
///
/// `left` belongs to a table already in scope (FROM or an earlier join);
/// `right.table` is the table this join introduces.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JoinSpec {
    #[serde(default)]
    pub kind: JoinKind,
    pub left: ColumnRef,
    pub right: ColumnRef,
    /// Extra single-table predicates attached to the ON clause
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl JoinSpec {
    pub fn inner(left: ColumnRef, right: ColumnRef) -> Self {
        Self {
            kind: JoinKind::Inner,
            left,
            right,
            conditions: Vec::new(),
        }
    }

    /// Table introduced by this join
    pub fn table(&self) -> &str {
        &self.right.table
    }

    /// Swap sides so `table` becomes the introduced side
    pub fn flipped(&self) -> JoinSpec {
        JoinSpec {
            kind: self.kind,
            left: self.right.clone(),
            right: self.left.clone(),
            conditions: self.conditions.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderBySpec {
    pub expr: Projection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<OrderDirection>,
}

impl OrderBySpec {
    pub fn new(expr: Projection, direction: Option<OrderDirection>) -> Self {
        Self { expr, direction }
    }
}

/// Clause a column reference appears in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Clause {
    Select,
    Join,
    Where,
    GroupBy,
    Having,
    OrderBy,
}

/// Canonical structured select query
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SelectQueryIR {
    pub from: String,

    pub columns: Vec<Projection>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<JoinSpec>,

    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    pub where_: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<ColumnRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub having: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub distinct: bool,
}

impl SelectQueryIR {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            where_: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            distinct: false,
        }
    }

    /// `from` followed by every joined table, in join order
    pub fn tables(&self) -> Vec<String> {
        let mut tables = vec![self.from.clone()];
        tables.extend(self.joins.iter().map(|j| j.right.table.clone()));
        tables
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.from.eq_ignore_ascii_case(table) || self.joins.iter().any(|j| j.right.table.eq_ignore_ascii_case(table))
    }

    pub fn has_aggregates(&self) -> bool {
        self.columns.iter().any(|p| matches!(p, Projection::Aggregate(_)))
    }

    pub fn has_relative_date_filter(&self) -> bool {
        self.all_conditions().any(Condition::is_relative_date)
    }

    pub fn has_subquery(&self) -> bool {
        self.all_conditions()
            .any(|c| matches!(c.rhs, ConditionValue::Subquery { .. }))
    }

    pub fn has_left_join(&self) -> bool {
        self.joins.iter().any(|j| j.kind == JoinKind::Left)
    }

    /// WHERE, HAVING and join-attached conditions
    pub fn all_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.where_
            .iter()
            .chain(self.having.iter())
            .chain(self.joins.iter().flat_map(|j| j.conditions.iter()))
    }

    /// Visit every column reference with the clause it appears in
    pub fn visit_column_refs<'a>(&'a self, mut f: impl FnMut(&'a ColumnRef, Clause)) {
        for p in &self.columns {
            for c in p.column_refs() {
                f(c, Clause::Select);
            }
        }
        for j in &self.joins {
            f(&j.left, Clause::Join);
            f(&j.right, Clause::Join);
            for cond in &j.conditions {
                for c in cond.column_refs() {
                    f(c, Clause::Join);
                }
            }
        }
        for cond in &self.where_ {
            for c in cond.column_refs() {
                f(c, Clause::Where);
            }
        }
        for c in &self.group_by {
            f(c, Clause::GroupBy);
        }
        for cond in &self.having {
            for c in cond.column_refs() {
                f(c, Clause::Having);
            }
        }
        for o in &self.order_by {
            for c in o.expr.column_refs() {
                f(c, Clause::OrderBy);
            }
        }
    }

    /// Rename a table everywhere it is referenced (FROM, joins and column refs)
    pub fn rename_table(&mut self, from: &str, to: &str) {
        let rename = |c: &mut ColumnRef| {
            if c.table.eq_ignore_ascii_case(from) {
                c.table = to.to_string();
            }
        };
        if self.from.eq_ignore_ascii_case(from) {
            self.from = to.to_string();
        }
        for p in &mut self.columns {
            match p {
                Projection::Column(c) => rename(c),
                Projection::Aggregate(a) => a.column_refs_mut().into_iter().for_each(rename),
            }
        }
        for j in &mut self.joins {
            rename(&mut j.left);
            rename(&mut j.right);
            for cond in &mut j.conditions {
                cond.column_refs_mut().into_iter().for_each(rename);
            }
        }
        for cond in self.where_.iter_mut().chain(self.having.iter_mut()) {
            cond.column_refs_mut().into_iter().for_each(rename);
        }
        self.group_by.iter_mut().for_each(rename);
        for o in &mut self.order_by {
            match &mut o.expr {
                Projection::Column(c) => rename(c),
                Projection::Aggregate(a) => a.column_refs_mut().into_iter().for_each(rename),
            }
        }
    }

    /// Check the reference invariant: every column reference resolves to `from`
    /// or a joined table, and each join's left side is already in scope.
    pub fn validate(&self) -> EngineResult<()> {
        if self.from.trim().is_empty() {
            return Err(EngineError::no_table("query has an empty FROM table"));
        }

        let mut in_scope: Vec<String> = vec![self.from.to_ascii_lowercase()];
        for join in &self.joins {
            let left = join.left.table.to_ascii_lowercase();
            if !in_scope.contains(&left) {
                return Err(EngineError::invalid_reference(
                    format!("join on {} references a table not yet in scope", join.left),
                    &join.left.table,
                    &join.left.column,
                ));
            }
            let right = join.right.table.to_ascii_lowercase();
            if in_scope.contains(&right) {
                return Err(EngineError::invalid_reference(
                    format!("table {} is joined twice", join.right.table),
                    &join.right.table,
                    &join.right.column,
                ));
            }
            in_scope.push(right);
        }

        let mut failure = None;
        self.visit_column_refs(|c, clause| {
            if failure.is_none() && !in_scope.contains(&c.table.to_ascii_lowercase()) {
                failure = Some(EngineError::invalid_reference(
                    format!("{} in {:?} references a table that is neither FROM nor joined", c, clause),
                    &c.table,
                    &c.column,
                ));
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }

        for cond in self.all_conditions() {
            if let ConditionValue::Subquery { query } = &cond.rhs {
                query.validate()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revenue_per_customer() -> SelectQueryIR {
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
        ir.group_by.push(ColumnRef::new("customers", "name"));
        ir
    }

    #[test]
    fn test_valid_ir_passes() {
        let ir = revenue_per_customer();
        assert!(ir.validate().is_ok());
        assert_eq!(ir.tables(), vec!["customers", "orders", "order_items"]);
        assert!(ir.has_aggregates());
    }

    #[test]
    fn test_unjoined_reference_rejected() {
        let mut ir = revenue_per_customer();
        ir.where_.push(Condition::compare(
            ColumnRef::new("suppliers", "country"),
            ComparisonOp::Eq,
            Literal::Text("DE".into()),
        ));
        let err = ir.validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidReference { table: Some(ref t), .. } if t == "suppliers"));
    }

    #[test]
    fn test_join_out_of_scope_rejected() {
        let mut ir = revenue_per_customer();
        ir.joins.swap(0, 1);
        assert!(ir.validate().is_err());
    }

    #[test]
    fn test_serde_uses_explicit_tags() {
        let mut ir = SelectQueryIR::new("orders");
        ir.columns.push(Projection::Aggregate(AggregateSpec::count_star("orders")));
        ir.where_.push(Condition::new(
            Operand::Column(ColumnRef::new("orders", "order_date")),
            ComparisonOp::GtEq,
            ConditionValue::RelativeInterval { interval_days: 30 },
        ));
        let json = serde_json::to_value(&ir).unwrap();
        assert_eq!(json["columns"][0]["kind"], "aggregate");
        assert_eq!(json["columns"][0]["expr"]["kind"], "column");
        assert_eq!(json["where"][0]["rhs"]["kind"], "relative_interval");
        assert_eq!(json["where"][0]["rhs"]["interval_days"], 30);

        let back: SelectQueryIR = serde_json::from_value(json).unwrap();
        assert_eq!(back, ir);
        assert!(back.has_relative_date_filter());
    }

    #[test]
    fn test_rename_table_rewrites_every_reference() {
        let mut ir = revenue_per_customer();
        ir.rename_table("customers", "clients");
        assert_eq!(ir.from, "clients");
        assert_eq!(ir.group_by[0].table, "clients");
        assert_eq!(ir.joins[0].left.table, "clients");
    }

    #[test]
    fn test_single_table_condition() {
        let cond = Condition::compare(ColumnRef::new("orders", "status"), ComparisonOp::Eq, Literal::Text("paid".into()));
        assert_eq!(cond.single_table().as_deref(), Some("orders"));
        let join_cond = Condition::columns_equal(ColumnRef::new("a", "x"), ColumnRef::new("b", "y"));
        assert!(join_cond.single_table().is_none());
    }
}
