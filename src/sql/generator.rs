//! IR to dialect-specific SQL text.
//!
//! Clause order is fixed: SELECT, FROM, JOIN, WHERE, GROUP BY, HAVING, ORDER BY,
//! LIMIT. Empty clauses are omitted. Constructs a dialect cannot express fail
//! with `EngineError::Unsupported`; nothing is dropped silently.

use super::dialect::Dialect;
use crate::config::GeneratorConfig;
use crate::error::{EngineError, EngineResult};
use crate::ir::{
    AggregateExpr, AggregateFunction, AggregateSpec, ColumnRef, ComparisonOp, Condition, ConditionValue, Literal,
    Operand, OrderDirection, Projection, SelectQueryIR,
};
use serde::Serialize;

/// Rendered statement plus bound parameters (empty unless parameterized)
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct GeneratedSql {
    pub sql: String,
    pub params: Vec<Literal>,
}

/// Pure IR renderer; holds only output options
#[derive(Clone, Debug, Default)]
pub struct SqlGenerator {
    config: GeneratorConfig,
}

impl SqlGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Render with literals inlined
    pub fn generate(&self, ir: &SelectQueryIR, dialect: Dialect) -> EngineResult<String> {
        Ok(self.render(ir, dialect, false)?.sql)
    }

    /// Render with `?` / `$n` placeholders and the matching parameter list
    pub fn generate_parameterized(&self, ir: &SelectQueryIR, dialect: Dialect) -> EngineResult<(String, Vec<Literal>)> {
        let out = self.render(ir, dialect, true)?;
        Ok((out.sql, out.params))
    }

    /// Render according to `GeneratorConfig::parameterized`
    pub fn generate_configured(&self, ir: &SelectQueryIR, dialect: Dialect) -> EngineResult<GeneratedSql> {
        self.render(ir, dialect, self.config.parameterized)
    }

    fn render(&self, ir: &SelectQueryIR, dialect: Dialect, parameterized: bool) -> EngineResult<GeneratedSql> {
        ir.validate()?;
        let mut renderer = Renderer {
            dialect,
            parameterized,
            pretty: self.config.pretty,
            params: Vec::new(),
        };
        let sql = renderer.select(ir)?;
        tracing::debug!(dialect = %dialect, params = renderer.params.len(), "rendered SQL");
        Ok(GeneratedSql {
            sql,
            params: renderer.params,
        })
    }
}

struct Renderer {
    dialect: Dialect,
    parameterized: bool,
    pretty: bool,
    params: Vec<Literal>,
}

impl Renderer {
    fn select(&mut self, ir: &SelectQueryIR) -> EngineResult<String> {
        let mut clauses: Vec<String> = Vec::new();

        let projections = if ir.columns.is_empty() {
            vec![format!("{}.*", self.ident(&ir.from))]
        } else {
            ir.columns
                .iter()
                .map(|p| self.projection(p))
                .collect::<EngineResult<Vec<_>>>()?
        };
        let keyword = if ir.distinct { "SELECT DISTINCT" } else { "SELECT" };
        clauses.push(format!("{} {}", keyword, projections.join(", ")));
        clauses.push(format!("FROM {}", self.ident(&ir.from)));

        for join in &ir.joins {
            let mut on = vec![format!("{} = {}", self.column(&join.left), self.column(&join.right))];
            for condition in &join.conditions {
                on.push(self.condition(condition)?);
            }
            clauses.push(format!(
                "{} {} ON {}",
                join.kind.sql(),
                self.ident(join.table()),
                on.join(" AND ")
            ));
        }

        if !ir.where_.is_empty() {
            clauses.push(format!("WHERE {}", self.conjunction(&ir.where_)?));
        }
        if !ir.group_by.is_empty() {
            let keys: Vec<String> = ir.group_by.iter().map(|c| self.column(c)).collect();
            clauses.push(format!("GROUP BY {}", keys.join(", ")));
        }
        if !ir.having.is_empty() {
            clauses.push(format!("HAVING {}", self.conjunction(&ir.having)?));
        }
        if !ir.order_by.is_empty() {
            let keys = ir
                .order_by
                .iter()
                .map(|o| -> EngineResult<String> {
                    let expr = self.order_key(&o.expr, ir)?;
                    Ok(match o.direction {
                        Some(OrderDirection::Asc) => format!("{} ASC", expr),
                        Some(OrderDirection::Desc) => format!("{} DESC", expr),
                        None => expr,
                    })
                })
                .collect::<EngineResult<Vec<_>>>()?;
            clauses.push(format!("ORDER BY {}", keys.join(", ")));
        }
        if let Some(limit) = ir.limit {
            clauses.push(match self.dialect {
                Dialect::Ansi => format!("FETCH FIRST {} ROWS ONLY", limit),
                _ => format!("LIMIT {}", limit),
            });
        }

        Ok(clauses.join(if self.pretty { "\n" } else { " " }))
    }

    fn ident(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// `"table"."column"`, or `"table".*`
    fn column(&self, column: &ColumnRef) -> String {
        format!("{}.{}", self.ident(&column.table), self.ident(&column.column))
    }

    /// SELECT-list item; plain columns always carry an alias (`table.column` when none is given)
    fn projection(&mut self, projection: &Projection) -> EngineResult<String> {
        match projection {
            Projection::Column(c) if c.is_star() => Ok(self.column(c)),
            Projection::Column(c) => {
                let alias = c.alias.clone().unwrap_or_else(|| format!("{}.{}", c.table, c.column));
                Ok(format!("{} AS {}", self.column(c), self.ident(&alias)))
            }
            Projection::Aggregate(a) => {
                let expr = self.aggregate(a)?;
                Ok(match &a.alias {
                    Some(alias) => format!("{} AS {}", expr, self.ident(alias)),
                    None => expr,
                })
            }
        }
    }

    fn aggregate(&mut self, spec: &AggregateSpec) -> EngineResult<String> {
        let arg = match &spec.expr {
            AggregateExpr::Column { column } if column.is_star() => {
                if spec.func != AggregateFunction::Count {
                    return Err(EngineError::unsupported(format!(
                        "{}(*) is not a valid aggregate",
                        spec.func.sql_name()
                    )));
                }
                "*".to_string()
            }
            AggregateExpr::Column { column } => self.column(column),
            AggregateExpr::Arithmetic { left, op, right } => {
                format!("{} {} {}", self.column(left), op.symbol(), self.column(right))
            }
            AggregateExpr::Raw { sql } => sql.clone(),
        };
        let distinct = if spec.distinct && arg != "*" { "DISTINCT " } else { "" };
        Ok(format!("{}({}{})", spec.func.sql_name(), distinct, arg))
    }

    /// ORDER BY key; aggregates projected under an alias are ordered by that alias
    fn order_key(&mut self, expr: &Projection, ir: &SelectQueryIR) -> EngineResult<String> {
        match expr {
            Projection::Column(c) => Ok(self.column(c)),
            Projection::Aggregate(a) => {
                let projected_alias = a.alias.as_ref().or_else(|| {
                    ir.columns
                        .iter()
                        .filter_map(Projection::as_aggregate)
                        .find(|p| p.same_expression(a))
                        .and_then(|p| p.alias.as_ref())
                });
                match projected_alias {
                    Some(alias) => Ok(self.ident(alias)),
                    None => self.aggregate(a),
                }
            }
        }
    }

    fn conjunction(&mut self, conditions: &[Condition]) -> EngineResult<String> {
        let parts = conditions
            .iter()
            .map(|c| self.condition(c))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(parts.join(" AND "))
    }

    fn operand(&mut self, operand: &Operand) -> EngineResult<String> {
        match operand {
            Operand::Column(c) => Ok(self.column(c)),
            Operand::Aggregate(a) => self.aggregate(a),
            Operand::MonthOf { column } => self.month_of(column),
            Operand::Literal { value } => Ok(self.literal(value)),
        }
    }

    fn month_of(&self, column: &ColumnRef) -> EngineResult<String> {
        let col = self.column(column);
        match self.dialect {
            Dialect::Sqlite => Ok(format!("CAST(strftime('%m', {}) AS INTEGER)", col)),
            Dialect::Postgres | Dialect::MySql => Ok(format!("EXTRACT(MONTH FROM {})", col)),
            Dialect::Ansi => Err(EngineError::unsupported_in_dialect("month extraction", self.dialect.name())),
        }
    }

    fn relative_date(&self, days: u32) -> EngineResult<String> {
        match self.dialect {
            Dialect::Sqlite => Ok(format!("DATE('now', '-{} days')", days)),
            Dialect::Postgres => Ok(format!("CURRENT_DATE - INTERVAL '{} days'", days)),
            Dialect::MySql => Ok(format!("DATE_SUB(CURDATE(), INTERVAL {} DAY)", days)),
            Dialect::Ansi => Err(EngineError::unsupported_in_dialect(
                "relative date interval",
                self.dialect.name(),
            )),
        }
    }

    /// Inline literal, or a placeholder with the value pushed to the parameter list
    fn literal(&mut self, value: &Literal) -> String {
        if self.parameterized {
            self.params.push(value.clone());
            return self.dialect.placeholder(self.params.len());
        }
        match value {
            Literal::Integer(i) => i.to_string(),
            Literal::Float(x) => x.to_string(),
            Literal::Text(s) | Literal::Date(s) => self.dialect.quote_string(s),
            Literal::Boolean(b) => self.dialect.boolean(*b).to_string(),
        }
    }

    /// Nested SELECT sharing this statement's parameter numbering
    fn subquery(&mut self, query: &SelectQueryIR) -> EngineResult<String> {
        query.validate()?;
        let mut inner = Renderer {
            dialect: self.dialect,
            parameterized: self.parameterized,
            pretty: false,
            params: std::mem::take(&mut self.params),
        };
        let rendered = inner.select(query);
        self.params = inner.params;
        rendered
    }

    fn condition(&mut self, condition: &Condition) -> EngineResult<String> {
        let op = condition.op;
        if op == ComparisonOp::ILike && !self.dialect.supports_ilike() {
            return Err(EngineError::unsupported_in_dialect("ILIKE", self.dialect.name()));
        }
        let lhs = self.operand(&condition.lhs)?;

        match (op, &condition.rhs) {
            (ComparisonOp::IsNull, _) | (ComparisonOp::Eq, ConditionValue::Null) => Ok(format!("{} IS NULL", lhs)),
            (ComparisonOp::IsNotNull, _) | (ComparisonOp::NotEq, ConditionValue::Null) => {
                Ok(format!("{} IS NOT NULL", lhs))
            }
            (ComparisonOp::Between, ConditionValue::Range { low, high }) => {
                let low = self.literal(low);
                let high = self.literal(high);
                Ok(format!("{} BETWEEN {} AND {}", lhs, low, high))
            }
            (ComparisonOp::In | ComparisonOp::NotIn, ConditionValue::LiteralSet { values }) => {
                if values.is_empty() {
                    return Err(EngineError::unsupported(format!("{} with an empty value list", op.sql())));
                }
                let items: Vec<String> = values.iter().map(|v| self.literal(v)).collect();
                Ok(format!("{} {} ({})", lhs, op.sql(), items.join(", ")))
            }
            (ComparisonOp::In | ComparisonOp::NotIn, ConditionValue::Literal { value }) => {
                let item = self.literal(value);
                Ok(format!("{} {} ({})", lhs, op.sql(), item))
            }
            (ComparisonOp::Between, _)
            | (
                ComparisonOp::In | ComparisonOp::NotIn,
                ConditionValue::RelativeInterval { .. } | ConditionValue::Column { .. },
            )
            | (_, ConditionValue::Range { .. } | ConditionValue::LiteralSet { .. } | ConditionValue::Null) => {
                Err(EngineError::unsupported(format!(
                    "{} cannot take a {} operand",
                    op.sql(),
                    rhs_kind(&condition.rhs)
                )))
            }
            (_, ConditionValue::Subquery { query }) => {
                let inner = self.subquery(query)?;
                Ok(format!("{} {} ({})", lhs, op.sql(), inner))
            }
            (_, ConditionValue::Literal { value }) => {
                let value = self.literal(value);
                Ok(format!("{} {} {}", lhs, op.sql(), value))
            }
            (_, ConditionValue::Column { column }) => Ok(format!("{} {} {}", lhs, op.sql(), self.column(column))),
            (_, ConditionValue::RelativeInterval { interval_days }) => {
                let bound = self.relative_date(*interval_days)?;
                Ok(format!("{} {} {}", lhs, op.sql(), bound))
            }
        }
    }
}

fn rhs_kind(value: &ConditionValue) -> &'static str {
    match value {
        ConditionValue::Literal { .. } => "literal",
        ConditionValue::LiteralSet { .. } => "value list",
        ConditionValue::Range { .. } => "range",
        ConditionValue::Null => "NULL",
        ConditionValue::RelativeInterval { .. } => "relative interval",
        ConditionValue::Column { .. } => "column",
        ConditionValue::Subquery { .. } => "subquery",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticOp, JoinKind, JoinSpec, OrderBySpec};

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

    fn last_days(days: u32) -> SelectQueryIR {
        let mut ir = SelectQueryIR::new("orders");
        ir.columns.push(Projection::Column(ColumnRef::star("orders")));
        ir.where_.push(Condition::new(
            Operand::Column(ColumnRef::new("orders", "order_date")),
            ComparisonOp::GtEq,
            ConditionValue::RelativeInterval { interval_days: days },
        ));
        ir
    }

    #[test]
    fn test_clause_order_and_implicit_alias() {
        let sql = SqlGenerator::default()
            .generate(&revenue_per_customer(), Dialect::Sqlite)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"customers\".\"name\" AS \"customers.name\", \
             SUM(\"order_items\".\"quantity\" * \"order_items\".\"unit_price\") AS \"total_revenue\" \
             FROM \"customers\" \
             INNER JOIN \"orders\" ON \"customers\".\"id\" = \"orders\".\"customer_id\" \
             INNER JOIN \"order_items\" ON \"orders\".\"id\" = \"order_items\".\"order_id\" \
             GROUP BY \"customers\".\"name\""
        );
    }

    #[test]
    fn test_mysql_backticks_and_limit() {
        let mut ir = SelectQueryIR::new("orders");
        ir.columns.push(Projection::Aggregate(AggregateSpec::count_star("orders").with_alias("count")));
        ir.limit = Some(5);
        let sql = SqlGenerator::default().generate(&ir, Dialect::MySql).unwrap();
        assert_eq!(sql, "SELECT COUNT(*) AS `count` FROM `orders` LIMIT 5");

        let ansi = SqlGenerator::default().generate(&ir, Dialect::Ansi).unwrap();
        assert!(ansi.ends_with("FETCH FIRST 5 ROWS ONLY"));
    }

    #[test]
    fn test_relative_interval_per_dialect() {
        let generator = SqlGenerator::default();
        let ir = last_days(30);
        assert!(generator
            .generate(&ir, Dialect::Sqlite)
            .unwrap()
            .contains("DATE('now', '-30 days')"));
        assert!(generator
            .generate(&ir, Dialect::Postgres)
            .unwrap()
            .contains("CURRENT_DATE - INTERVAL '30 days'"));
        assert!(generator
            .generate(&ir, Dialect::MySql)
            .unwrap()
            .contains("DATE_SUB(CURDATE(), INTERVAL 30 DAY)"));
        let err = generator.generate(&ir, Dialect::Ansi).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported { .. }));
    }

    #[test]
    fn test_month_extraction() {
        let mut ir = SelectQueryIR::new("orders");
        ir.columns.push(Projection::Column(ColumnRef::star("orders")));
        ir.where_.push(Condition::new(
            Operand::MonthOf {
                column: ColumnRef::new("orders", "order_date"),
            },
            ComparisonOp::Eq,
            ConditionValue::Literal { value: Literal::Integer(3) },
        ));
        let generator = SqlGenerator::default();
        assert!(generator
            .generate(&ir, Dialect::Sqlite)
            .unwrap()
            .contains("CAST(strftime('%m', \"orders\".\"order_date\") AS INTEGER) = 3"));
        assert!(generator
            .generate(&ir, Dialect::Postgres)
            .unwrap()
            .contains("EXTRACT(MONTH FROM \"orders\".\"order_date\") = 3"));
        assert!(generator.generate(&ir, Dialect::Ansi).is_err());
    }

    #[test]
    fn test_ilike_only_on_postgres() {
        let mut ir = SelectQueryIR::new("customers");
        ir.columns.push(Projection::Column(ColumnRef::star("customers")));
        ir.where_.push(Condition::compare(
            ColumnRef::new("customers", "name"),
            ComparisonOp::ILike,
            Literal::Text("%al%".into()),
        ));
        let generator = SqlGenerator::default();
        assert!(generator.generate(&ir, Dialect::Postgres).unwrap().contains("ILIKE '%al%'"));
        assert!(matches!(
            generator.generate(&ir, Dialect::Sqlite).unwrap_err(),
            EngineError::Unsupported { .. }
        ));
    }

    #[test]
    fn test_parameterized_placeholders() {
        let mut ir = SelectQueryIR::new("orders");
        ir.columns.push(Projection::Column(ColumnRef::star("orders")));
        ir.where_.push(Condition::compare(
            ColumnRef::new("orders", "status"),
            ComparisonOp::Eq,
            Literal::Text("paid".into()),
        ));
        ir.where_.push(Condition::new(
            Operand::Column(ColumnRef::new("orders", "amount")),
            ComparisonOp::Between,
            ConditionValue::Range {
                low: Literal::Integer(10),
                high: Literal::Integer(20),
            },
        ));
        let generator = SqlGenerator::default();
        let (sql, params) = generator.generate_parameterized(&ir, Dialect::Postgres).unwrap();
        assert!(sql.contains("\"status\" = $1"));
        assert!(sql.contains("BETWEEN $2 AND $3"));
        assert_eq!(params.len(), 3);

        let (sql, _) = generator.generate_parameterized(&ir, Dialect::Sqlite).unwrap();
        assert!(sql.contains("BETWEEN ? AND ?"));
    }

    #[test]
    fn test_nulls_sets_and_subqueries() {
        let mut sub = SelectQueryIR::new("customers");
        sub.columns.push(Projection::Column(ColumnRef::new("customers", "id")));
        sub.where_.push(Condition::compare(
            ColumnRef::new("customers", "region"),
            ComparisonOp::Eq,
            Literal::Text("EU".into()),
        ));

        let mut ir = SelectQueryIR::new("orders");
        ir.columns.push(Projection::Column(ColumnRef::star("orders")));
        ir.where_.push(Condition::new(
            Operand::Column(ColumnRef::new("orders", "shipped_at")),
            ComparisonOp::Eq,
            ConditionValue::Null,
        ));
        ir.where_.push(Condition::new(
            Operand::Column(ColumnRef::new("orders", "status")),
            ComparisonOp::In,
            ConditionValue::LiteralSet {
                values: vec![Literal::Text("paid".into()), Literal::Text("shipped".into())],
            },
        ));
        ir.where_.push(Condition::new(
            Operand::Column(ColumnRef::new("orders", "customer_id")),
            ComparisonOp::In,
            ConditionValue::Subquery { query: Box::new(sub) },
        ));

        let sql = SqlGenerator::default().generate(&ir, Dialect::Postgres).unwrap();
        assert!(sql.contains("\"orders\".\"shipped_at\" IS NULL"));
        assert!(sql.contains("IN ('paid', 'shipped')"));
        assert!(sql.contains(
            "\"orders\".\"customer_id\" IN (SELECT \"customers\".\"id\" AS \"customers.id\" FROM \"customers\" WHERE \"customers\".\"region\" = 'EU')"
        ));
    }

    #[test]
    fn test_order_by_alias_and_left_join_conditions() {
        let mut ir = revenue_per_customer();
        ir.joins[0].kind = JoinKind::Left;
        ir.joins[1].conditions.push(Condition::compare(
            ColumnRef::new("order_items", "quantity"),
            ComparisonOp::Gt,
            Literal::Integer(0),
        ));
        let total = ir.columns[1].as_aggregate().cloned().unwrap();
        ir.order_by.push(OrderBySpec::new(Projection::Aggregate(total), Some(OrderDirection::Desc)));
        ir.limit = Some(3);

        let sql = SqlGenerator::new(GeneratorConfig {
            pretty: true,
            parameterized: false,
        })
        .generate(&ir, Dialect::Sqlite)
        .unwrap();
        let lines: Vec<&str> = sql.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[2].starts_with("LEFT JOIN \"orders\""));
        assert!(lines[3].ends_with("AND \"order_items\".\"quantity\" > 0"));
        assert_eq!(lines[5], "ORDER BY \"total_revenue\" DESC");
        assert_eq!(lines[6], "LIMIT 3");
    }

    #[test]
    fn test_invalid_ir_is_rejected_before_rendering() {
        let mut ir = revenue_per_customer();
        ir.joins.pop();
        assert!(matches!(
            SqlGenerator::default().generate(&ir, Dialect::Sqlite).unwrap_err(),
            EngineError::InvalidReference { .. }
        ));
    }

    #[test]
    fn test_empty_in_list_fails_loudly() {
        let mut ir = SelectQueryIR::new("orders");
        ir.columns.push(Projection::Column(ColumnRef::star("orders")));
        ir.where_.push(Condition::new(
            Operand::Column(ColumnRef::new("orders", "status")),
            ComparisonOp::In,
            ConditionValue::LiteralSet { values: Vec::new() },
        ));
        assert!(SqlGenerator::default().generate(&ir, Dialect::Sqlite).is_err());
    }
}
