//! Classifier strategy - runs tokenizer, recognizer and classifier, then lowers the
//! extracted `QueryComponents` into a `SelectQueryIR`, resolving joins through the
//! schema's relationships.

use super::builder::JoinScope;
use super::model::*;
use super::strategy::{BuildOptions, IrStrategy};
use crate::config::RecognizerConfig;
use crate::error::{EngineError, EngineResult};
use crate::nlp::{
    AggregationComponent, ClassifiedIntent, ColumnMention, ConditionComponent, Entity, EntityKind, EntityRecognizer,
    IntentClassifier, QueryComponents, Token, Tokenizer,
};
use crate::schema::SchemaModel;
use serde::Serialize;
use tracing::{debug, warn};

/// Intermediate products of the classifier pipeline, kept for inspection
#[derive(Clone, Debug, Serialize)]
pub struct Analysis {
    pub tokens: Vec<Token>,
    pub entities: Vec<Entity>,
    pub intent: ClassifiedIntent,
}

/// Tokenizer -> EntityRecognizer -> IntentClassifier -> IR
pub struct ClassifierIrBuilder {
    config: RecognizerConfig,
    classifier: IntentClassifier,
}

impl ClassifierIrBuilder {
    pub fn new(config: RecognizerConfig) -> Self {
        Self {
            config,
            classifier: IntentClassifier::new(),
        }
    }

    pub fn analyze(&self, text: &str, schema: &SchemaModel) -> EngineResult<Analysis> {
        let tokens = Tokenizer::for_schema(schema)?.tokenize(text);
        let entities = EntityRecognizer::new(schema, &self.config).recognize(&tokens);
        let intent = self.classifier.classify(&tokens, &entities);
        Ok(Analysis {
            tokens,
            entities,
            intent,
        })
    }

    pub fn lower(
        &self,
        components: &QueryComponents,
        schema: &SchemaModel,
        options: &BuildOptions,
    ) -> EngineResult<SelectQueryIR> {
        let base = base_table(components, schema, options)?;
        let mut scope = JoinScope::new(schema, base);

        for join in &components.joins {
            for table in [&join.left_table, &join.right_table] {
                scope.ensure_table(table);
            }
            if join.join_type == "left" {
                if let Some(hop) = scope.hops.iter_mut().find(|h| h.right.table.eq_ignore_ascii_case(&join.right_table)) {
                    hop.kind = JoinKind::Left;
                }
            }
        }

        let aggregates: Vec<AggregateSpec> = components
            .aggregations
            .iter()
            .filter_map(|a| lower_aggregation(a, &mut scope))
            .collect();
        let group_by: Vec<ColumnRef> = components
            .group_by
            .iter()
            .filter_map(|m| resolve_mention(m, &mut scope))
            .fold(Vec::new(), |mut acc, c| {
                if !acc.iter().any(|g: &ColumnRef| g.same_column(&c)) {
                    acc.push(c);
                }
                acc
            });

        let mut where_ = lower_conditions(&components.conditions, &mut scope)?;
        where_.extend(time_window(components, &scope));

        let mut ir = SelectQueryIR::new(scope.base.clone());
        ir.joins = scope.rooted_joins(&scope.base)?;
        ir.where_ = where_;

        if aggregates.is_empty() && group_by.is_empty() {
            let filtered: Vec<&str> = components.conditions.iter().filter_map(|c| c.column.as_deref()).collect();
            let selected: Vec<ColumnRef> = components
                .columns
                .iter()
                .filter(|m| m.column.as_deref().map_or(false, |c| !filtered.contains(&c)))
                .filter_map(|m| resolve_mention(m, &mut scope))
                .filter(|c| ir.has_table(&c.table))
                .collect();
            if selected.is_empty() {
                ir.columns.push(Projection::Column(ColumnRef::star(&ir.from)));
            } else {
                ir.columns.extend(selected.into_iter().map(Projection::Column));
            }
        } else {
            ir.columns.extend(group_by.iter().cloned().map(Projection::Column));
            if aggregates.is_empty() {
                ir.columns.push(Projection::Aggregate(AggregateSpec::count_star(&ir.from).with_alias("count")));
            }
            ir.columns.extend(aggregates.into_iter().map(Projection::Aggregate));
        }
        ir.group_by = group_by;

        for order in &components.order_by {
            let aggregate = order
                .target
                .column
                .as_deref()
                .and_then(AggregateFunction::from_name)
                .filter(|_| order.target.table.is_none())
                .and_then(|func| ir.columns.iter().filter_map(Projection::as_aggregate).find(|a| a.func == func).cloned());
            let expr = match aggregate {
                Some(agg) => Projection::Aggregate(agg),
                None => match resolve_mention(&order.target, &mut scope).filter(|c| ir.has_table(&c.table)) {
                    Some(col) => Projection::Column(col),
                    None => continue,
                },
            };
            ir.order_by.push(OrderBySpec::new(expr, order.direction));
        }

        ir.limit = components.limit;
        ir.distinct = components.distinct;
        ir.validate()?;
        debug!(from = %ir.from, joins = ir.joins.len(), "lowered classifier components");
        Ok(ir)
    }
}

impl Default for ClassifierIrBuilder {
    fn default() -> Self {
        Self::new(RecognizerConfig::default())
    }
}

impl IrStrategy for ClassifierIrBuilder {
    fn build(&self, text: &str, schema: &SchemaModel, options: &BuildOptions) -> EngineResult<SelectQueryIR> {
        let analysis = self.analyze(text, schema)?;
        debug!(
            primary = ?analysis.intent.primary,
            confidence = analysis.intent.confidence,
            "classified question"
        );
        self.lower(&analysis.intent.components, schema, options)
    }

    fn name(&self) -> &'static str {
        "classifier"
    }
}

fn base_table(components: &QueryComponents, schema: &SchemaModel, options: &BuildOptions) -> EngineResult<String> {
    let named = components
        .tables
        .iter()
        .find_map(|t| schema.table(t))
        .or_else(|| {
            components
                .columns
                .iter()
                .filter_map(|m| m.table.as_deref())
                .find_map(|t| schema.table(t))
        })
        .map(|t| t.name.clone());

    named
        .or_else(|| options.default_table.clone())
        .or_else(|| schema.tables().first().map(|t| t.name.clone()))
        .ok_or_else(|| EngineError::no_table("no table mentioned, no default table and an empty schema"))
}

/// Column (or a table's label column) for a mention, joining its table in when needed
fn resolve_mention(mention: &ColumnMention, scope: &mut JoinScope<'_>) -> Option<ColumnRef> {
    let schema = scope.schema;
    match (&mention.column, &mention.table) {
        (None, Some(table)) => {
            let table = schema.table(table)?;
            let label = table.label_column()?;
            scope.ensure_table(&table.name).then(|| ColumnRef::new(&table.name, &label.name))
        }
        (Some(column), Some(table)) => {
            let col = schema.column(table, column)?;
            scope.ensure_table(table).then(|| ColumnRef::new(table, &col.name))
        }
        (Some(column), None) => {
            // Ambiguous: prefer a table already in scope
            let in_scope = scope
                .scope()
                .into_iter()
                .find_map(|t| schema.column(&t, column).map(|c| ColumnRef::new(&t, &c.name)));
            in_scope.or_else(|| {
                schema
                    .tables_with_column(column)
                    .into_iter()
                    .find(|t| scope.ensure_table(&t.name))
                    .and_then(|t| t.column(column).map(|c| ColumnRef::new(&t.name, &c.name)))
            })
        }
        (None, None) => None,
    }
}

fn lower_aggregation(component: &AggregationComponent, scope: &mut JoinScope<'_>) -> Option<AggregateSpec> {
    let func = AggregateFunction::from_name(&component.function)?;
    let table = component.table.clone().unwrap_or_else(|| scope.base.clone());

    if component.column == "*" {
        if func == AggregateFunction::Count {
            scope.ensure_table(&table);
            return Some(AggregateSpec::count_star(table).with_alias("count"));
        }
        // SUM(*) has no meaning: fall back to the table's first measure
        let measure = scope
            .table(&table)
            .and_then(|t| t.measure_columns().into_iter().next())
            .map(|c| c.name.clone())?;
        scope.ensure_table(&table);
        let alias = format!("{}_{}", component.function, measure);
        return Some(AggregateSpec::new(func, ColumnRef::new(table, measure)).with_alias(alias));
    }

    let mention = ColumnMention {
        column: Some(component.column.clone()),
        table: component.table.clone(),
        ambiguous: component.table.is_none(),
    };
    let column = resolve_mention(&mention, scope)?;
    let alias = format!("{}_{}", component.function, column.column);
    Some(AggregateSpec::new(func, column).with_alias(alias))
}

fn comparison_op(symbol: &str) -> Option<ComparisonOp> {
    let op = match symbol {
        "=" => ComparisonOp::Eq,
        "!=" => ComparisonOp::NotEq,
        ">" => ComparisonOp::Gt,
        ">=" => ComparisonOp::GtEq,
        "<" => ComparisonOp::Lt,
        "<=" => ComparisonOp::LtEq,
        "like" => ComparisonOp::Like,
        "not like" => ComparisonOp::NotLike,
        "between" => ComparisonOp::Between,
        "in" => ComparisonOp::In,
        "not in" => ComparisonOp::NotIn,
        _ => return None,
    };
    Some(op)
}

fn literal(value: &str, kind: EntityKind) -> Literal {
    match kind {
        EntityKind::Number => value
            .parse::<i64>()
            .map(Literal::Integer)
            .or_else(|_| value.parse::<f64>().map(Literal::Float))
            .unwrap_or_else(|_| Literal::Text(value.to_string())),
        EntityKind::Date => Literal::Date(value.to_string()),
        EntityKind::Boolean => Literal::Boolean(value == "true"),
        _ => Literal::Text(value.to_string()),
    }
}

/// Conjunctive WHERE list. `or` between equalities on one column becomes IN;
/// any other disjunction is rejected since the IR has no OR node.
fn lower_conditions(components: &[ConditionComponent], scope: &mut JoinScope<'_>) -> EngineResult<Vec<Condition>> {
    let mut conditions: Vec<Condition> = Vec::new();

    for component in components {
        let Some(mut op) = comparison_op(&component.operator) else { continue };
        let mention = ColumnMention {
            column: component.column.clone(),
            table: component.table.clone(),
            ambiguous: component.table.is_none(),
        };
        let Some(column) = resolve_mention(&mention, scope) else {
            debug!(operator = %component.operator, "condition without a resolvable column");
            continue;
        };
        let (Some(value), Some(kind)) = (component.value.as_deref(), component.value_kind) else {
            continue;
        };

        let rhs = match kind {
            EntityKind::Null => {
                op = if op == ComparisonOp::NotEq { ComparisonOp::IsNotNull } else { ComparisonOp::IsNull };
                ConditionValue::Null
            }
            EntityKind::TimeRange => {
                let Some(days) = component.days else {
                    debug!(value, "time range without a day count");
                    continue;
                };
                ConditionValue::RelativeInterval { interval_days: days }
            }
            EntityKind::Column => {
                let other = ColumnMention {
                    column: Some(value.to_string()),
                    table: None,
                    ambiguous: true,
                };
                match resolve_mention(&other, scope) {
                    Some(rhs) => ConditionValue::Column { column: rhs },
                    None => continue,
                }
            }
            _ if op == ComparisonOp::Between => {
                let Some(high) = component.high.as_deref() else { continue };
                ConditionValue::Range {
                    low: literal(value, kind),
                    high: literal(high, kind),
                }
            }
            _ if matches!(op, ComparisonOp::Like | ComparisonOp::NotLike) && !value.contains('%') => {
                ConditionValue::Literal {
                    value: Literal::Text(format!("%{}%", value)),
                }
            }
            _ => ConditionValue::Literal {
                value: literal(value, kind),
            },
        };

        if component.modifier.as_deref() == Some("not") {
            op = op.negate();
        }

        let condition = Condition::new(Operand::Column(column), op, rhs);
        if component.modifier.as_deref() == Some("or") {
            if let Some(merged) = conditions.last_mut().filter(|prev| mergeable_disjunct(prev, &condition)) {
                merge_into_set(merged, condition);
                continue;
            }
            warn!(column = ?component.column, operator = %component.operator, "disjunction cannot be expressed");
            return Err(EngineError::unsupported(format!(
                "'or' with '{} {}' must compare the same column by equality",
                component.column.as_deref().unwrap_or("?"),
                component.operator
            )));
        }
        conditions.push(condition);
    }
    Ok(conditions)
}

fn mergeable_disjunct(prev: &Condition, next: &Condition) -> bool {
    let same_column = match (&prev.lhs, &next.lhs) {
        (Operand::Column(a), Operand::Column(b)) => a.same_column(b),
        _ => false,
    };
    same_column
        && matches!(prev.op, ComparisonOp::Eq | ComparisonOp::In)
        && next.op == ComparisonOp::Eq
        && matches!(next.rhs, ConditionValue::Literal { .. })
}

fn merge_into_set(prev: &mut Condition, next: Condition) {
    let ConditionValue::Literal { value } = next.rhs else { return };
    match &mut prev.rhs {
        ConditionValue::LiteralSet { values } => values.push(value),
        ConditionValue::Literal { value: first } => {
            prev.rhs = ConditionValue::LiteralSet {
                values: vec![first.clone(), value],
            };
            prev.op = ComparisonOp::In;
        }
        _ => {}
    }
}

/// Window and month mentions not bound to an explicit comparison
fn time_window(components: &QueryComponents, scope: &JoinScope<'_>) -> Vec<Condition> {
    let date_column = scope.scope().into_iter().find_map(|t| {
        let table = scope.table(&t)?;
        table.date_column().map(|c| ColumnRef::new(&table.name, &c.name))
    });
    let Some(column) = date_column else {
        return Vec::new();
    };

    let mut conditions = Vec::new();
    if let Some(days) = components.time_window_days {
        conditions.push(Condition::new(
            Operand::Column(column.clone()),
            ComparisonOp::GtEq,
            ConditionValue::RelativeInterval { interval_days: days },
        ));
    }
    if let Some(month) = components.month {
        conditions.push(Condition::new(
            Operand::MonthOf { column },
            ComparisonOp::Eq,
            ConditionValue::Literal {
                value: Literal::Integer(month as i64),
            },
        ));
    }
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType, Table};

    fn shop() -> SchemaModel {
        SchemaModel::new()
            .with_table(
                Table::new("customers")
                    .with_column(Column::new("id", ColumnType::Integer).primary_key())
                    .with_column(Column::new("name", ColumnType::Text))
                    .with_column(Column::new("city", ColumnType::Text)),
            )
            .with_table(
                Table::new("orders")
                    .with_column(Column::new("id", ColumnType::Integer).primary_key())
                    .with_column(Column::new("customer_id", ColumnType::Integer).references("customers", "id"))
                    .with_column(Column::new("amount", ColumnType::Decimal))
                    .with_column(Column::new("status", ColumnType::Text))
                    .with_column(Column::new("order_date", ColumnType::Date)),
            )
    }

    fn build(text: &str) -> SelectQueryIR {
        ClassifierIrBuilder::default()
            .build(text, &shop(), &BuildOptions::default())
            .unwrap()
    }

    #[test]
    fn test_count_per_customer_joins_dimension() {
        let ir = build("count orders per customer");
        assert_eq!(ir.from, "orders");
        assert_eq!(ir.joins.len(), 1);
        assert_eq!(ir.joins[0].right, ColumnRef::new("customers", "id"));
        assert_eq!(ir.group_by, vec![ColumnRef::new("customers", "name")]);
        let agg = ir.columns[1].as_aggregate().unwrap();
        assert_eq!(agg.func, AggregateFunction::Count);
    }

    #[test]
    fn test_filters_lowered() {
        let ir = build("orders where amount > 100 and status = 'shipped'");
        assert_eq!(ir.where_.len(), 2);
        assert_eq!(
            ir.where_[0],
            Condition::compare(ColumnRef::new("orders", "amount"), ComparisonOp::Gt, Literal::Integer(100))
        );
        assert_eq!(
            ir.where_[1],
            Condition::compare(ColumnRef::new("orders", "status"), ComparisonOp::Eq, Literal::Text("shipped".into()))
        );
        assert_eq!(ir.columns, vec![Projection::Column(ColumnRef::star("orders"))]);
    }

    #[test]
    fn test_or_on_one_column_becomes_in() {
        let ir = build("orders where status = 'paid' or status = 'shipped'");
        assert_eq!(ir.where_.len(), 1);
        assert_eq!(ir.where_[0].op, ComparisonOp::In);
        assert!(matches!(&ir.where_[0].rhs, ConditionValue::LiteralSet { values } if values.len() == 2));
    }

    #[test]
    fn test_time_window_and_limit() {
        let ir = build("top 5 orders in the last 30 days sorted by amount descending");
        assert_eq!(ir.limit, Some(5));
        assert!(ir.has_relative_date_filter());
        assert_eq!(ir.order_by[0].direction, Some(OrderDirection::Desc));
    }

    fn interval_days(ir: &SelectQueryIR) -> Option<u32> {
        ir.where_.iter().find_map(|c| match c.rhs {
            ConditionValue::RelativeInterval { interval_days } => Some(interval_days),
            _ => None,
        })
    }

    #[test]
    fn test_relative_interval_uses_unit() {
        assert_eq!(interval_days(&build("orders where order_date after last 2 weeks")), Some(14));
        assert_eq!(interval_days(&build("orders where order_date after last 3 months")), Some(90));
        assert_eq!(interval_days(&build("orders where order_date after last 2 years")), Some(730));
        assert_eq!(interval_days(&build("orders where order_date since last 10 days")), Some(10));
    }

    #[test]
    fn test_relative_interval_from_word_phrases() {
        assert_eq!(interval_days(&build("orders where order_date after yesterday")), Some(1));
        assert_eq!(interval_days(&build("orders where order_date since last month")), Some(30));
        assert_eq!(interval_days(&build("orders where order_date after last quarter")), Some(90));
    }

    #[test]
    fn test_huge_time_range_does_not_overflow() {
        let analysis = ClassifierIrBuilder::default()
            .analyze("orders in the last 20000000 years", &shop())
            .unwrap();
        assert_eq!(analysis.intent.components.time_window_days, Some(u32::MAX));
    }

    #[test]
    fn test_or_across_columns_is_unsupported() {
        let err = ClassifierIrBuilder::default()
            .build("orders where status = 'paid' or amount > 100", &shop(), &BuildOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Unsupported { .. }));
    }

    #[test]
    fn test_or_with_range_on_one_column_is_unsupported() {
        let err = ClassifierIrBuilder::default()
            .build("orders where amount = 5 or amount > 100", &shop(), &BuildOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Unsupported { .. }));
    }

    #[test]
    fn test_no_tables_is_error() {
        let err = ClassifierIrBuilder::default()
            .build("count things", &SchemaModel::new(), &BuildOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NoTable { .. }));
    }
}
