//! Intent Classifier - tokens and entities to an operation type plus the
//! structured query components a query builder needs.

use super::recognizer::{Entity, EntityKind};
use super::token::{Token, TokenKind};
use crate::ir::OrderDirection;
use serde::{Deserialize, Serialize};

/// Entity confidence assumed when the input produced no entities
const DEFAULT_ENTITY_CONFIDENCE: f64 = 0.5;

/// Aggregations scoring above this keep primary status over a competing join
const AGGREGATION_OVER_JOIN: f64 = 0.8;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Retrieve,
    Filter,
    Sort,
    Limit,
    Count,
    Sum,
    Average,
    MinMax,
    Group,
    Join,
    Subquery,
    Cte,
    Window,
    Distinct,
}

impl IntentType {
    pub fn is_aggregation(&self) -> bool {
        matches!(self, Self::Count | Self::Sum | Self::Average | Self::MinMax)
    }

    pub fn is_advanced(&self) -> bool {
        matches!(self, Self::Subquery | Self::Cte | Self::Window)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Create,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Advanced,
}

impl Complexity {
    fn from_score(score: u32) -> Self {
        match score {
            0..=3 => Self::Simple,
            4..=7 => Self::Moderate,
            8..=12 => Self::Complex,
            _ => Self::Advanced,
        }
    }
}

/// What a rule looks for
#[derive(Clone, Copy, Debug)]
enum Criterion {
    Kind(TokenKind),
    /// Whole normalized token, or substring of a multi-word token
    Keyword(&'static str),
    Entity(EntityKind),
    /// At least three distinct clause-keyword kinds present
    MultiClause,
    /// At least two distinct tables mentioned
    MultipleTables,
    /// "by" following an aggregation word ("sum of amount by region")
    AggregateBy,
}

struct IntentRule {
    intent: IntentType,
    weight: f64,
    criteria: &'static [Criterion],
}

const fn rule(intent: IntentType, weight: f64, criteria: &'static [Criterion]) -> IntentRule {
    IntentRule { intent, weight, criteria }
}

use Criterion::{AggregateBy, Entity as HasEntity, Keyword, Kind, MultiClause, MultipleTables};

const RULES: &[IntentRule] = &[
    rule(IntentType::Retrieve, 0.7, &[Kind(TokenKind::Command)]),
    rule(IntentType::Retrieve, 0.5, &[HasEntity(EntityKind::Table)]),
    rule(IntentType::Filter, 0.8, &[Kind(TokenKind::FilterKeyword)]),
    rule(IntentType::Filter, 0.85, &[Kind(TokenKind::Comparison)]),
    rule(IntentType::Filter, 0.95, &[Kind(TokenKind::FilterKeyword), Kind(TokenKind::Comparison)]),
    rule(IntentType::Filter, 0.7, &[Kind(TokenKind::Temporal)]),
    rule(IntentType::Filter, 0.6, &[HasEntity(EntityKind::String)]),
    rule(IntentType::Sort, 0.9, &[Kind(TokenKind::OrderKeyword)]),
    rule(IntentType::Sort, 0.95, &[Kind(TokenKind::OrderKeyword), Kind(TokenKind::SortDirection)]),
    rule(IntentType::Sort, 0.6, &[Kind(TokenKind::SortDirection)]),
    rule(IntentType::Limit, 0.9, &[Kind(TokenKind::LimitKeyword), Kind(TokenKind::Number)]),
    rule(IntentType::Count, 0.9, &[Keyword("count")]),
    rule(IntentType::Count, 0.95, &[Keyword("how many")]),
    rule(IntentType::Count, 0.85, &[Keyword("number of")]),
    rule(IntentType::Sum, 0.9, &[Keyword("sum")]),
    rule(IntentType::Sum, 0.8, &[Keyword("total")]),
    rule(IntentType::Sum, 0.6, &[Keyword("revenue")]),
    rule(IntentType::Average, 0.9, &[Keyword("average")]),
    rule(IntentType::Average, 0.85, &[Keyword("mean")]),
    rule(IntentType::MinMax, 0.9, &[Keyword("minimum")]),
    rule(IntentType::MinMax, 0.9, &[Keyword("maximum")]),
    rule(IntentType::Group, 0.9, &[Kind(TokenKind::GroupKeyword)]),
    rule(IntentType::Group, 0.75, &[AggregateBy]),
    rule(IntentType::Join, 0.9, &[Kind(TokenKind::JoinKeyword)]),
    rule(IntentType::Join, 0.95, &[Kind(TokenKind::JoinType), Kind(TokenKind::JoinKeyword)]),
    rule(IntentType::Join, 0.6, &[MultipleTables]),
    rule(IntentType::Subquery, 0.85, &[Kind(TokenKind::SubqueryKeyword)]),
    rule(IntentType::Subquery, 0.9, &[Kind(TokenKind::SubqueryKeyword), MultiClause]),
    rule(IntentType::Cte, 0.95, &[Kind(TokenKind::CteKeyword)]),
    rule(IntentType::Window, 0.9, &[Kind(TokenKind::WindowKeyword)]),
    rule(IntentType::Distinct, 0.9, &[Kind(TokenKind::DistinctKeyword)]),
];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IntentScore {
    pub intent: IntentType,
    pub score: f64,
}

/// A column (or, with `column == None`, a whole table) named in the text
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnMention {
    pub column: Option<String>,
    pub table: Option<String>,
    #[serde(default)]
    pub ambiguous: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConditionComponent {
    pub column: Option<String>,
    pub table: Option<String>,
    /// Canonical operator symbol (`=`, `>=`, `like`, `between`, ...)
    pub operator: String,
    pub value: Option<String>,
    pub value_kind: Option<EntityKind>,
    /// Upper bound for `between`
    pub high: Option<String>,
    /// Preceding logical word: `and`, `or`, `not`
    pub modifier: Option<String>,
    /// Window length in days when the value is a time range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AggregationComponent {
    /// `count`, `sum`, `avg`, `min`, `max`
    pub function: String,
    /// Column name, `*` when none follows
    pub column: String,
    pub table: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderComponent {
    pub target: ColumnMention,
    pub direction: Option<OrderDirection>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JoinComponent {
    /// `inner`, `left`, `right`, `full`, `outer`, `cross`
    pub join_type: String,
    pub left_table: String,
    pub right_table: String,
}

/// Structured pieces of the question, before any schema-driven assembly
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryComponents {
    pub columns: Vec<ColumnMention>,
    pub tables: Vec<String>,
    pub conditions: Vec<ConditionComponent>,
    pub aggregations: Vec<AggregationComponent>,
    pub group_by: Vec<ColumnMention>,
    pub order_by: Vec<OrderComponent>,
    pub joins: Vec<JoinComponent>,
    pub limit: Option<u64>,
    pub distinct: bool,
    /// "last N days" style window not bound to an explicit comparison
    pub time_window_days: Option<u32>,
    /// Month number for a bare month mention
    pub month: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedIntent {
    pub primary: IntentType,
    /// Every intent with a positive score, best first
    pub intents: Vec<IntentScore>,
    pub query_type: QueryType,
    pub components: QueryComponents,
    pub complexity: Complexity,
    pub confidence: f64,
}

impl ClassifiedIntent {
    pub fn has_intent(&self, intent: IntentType) -> bool {
        self.intents.iter().any(|s| s.intent == intent)
    }

    pub fn score(&self, intent: IntentType) -> f64 {
        self.intents
            .iter()
            .find(|s| s.intent == intent)
            .map_or(0.0, |s| s.score)
    }
}

/// Weighted-rule intent classifier
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, tokens: &[Token], entities: &[Entity]) -> ClassifiedIntent {
        let intents = score_intents(tokens, entities);
        let primary = pick_primary(&intents);
        let components = extract_components(tokens, entities);

        let top = intents.first().map_or(0.0, |s| s.score);
        let mean_entity = if entities.is_empty() {
            DEFAULT_ENTITY_CONFIDENCE
        } else {
            entities.iter().map(|e| e.confidence).sum::<f64>() / entities.len() as f64
        };

        let complexity = complexity(&components, &intents);
        tracing::debug!(?primary, ?complexity, intents = intents.len(), "classified question");

        ClassifiedIntent {
            primary,
            query_type: query_type(tokens),
            complexity,
            confidence: 0.6 * top + 0.4 * mean_entity,
            intents,
            components,
        }
    }
}

fn score_intents(tokens: &[Token], entities: &[Entity]) -> Vec<IntentScore> {
    let clause_kinds = {
        let mut kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).filter(TokenKind::is_clause_keyword).collect();
        kinds.sort_by_key(|k| *k as u8);
        kinds.dedup();
        kinds.len()
    };
    let table_count = mentioned_tables(entities).len();

    let matches = |criterion: &Criterion| -> bool {
        match criterion {
            Kind(kind) => tokens.iter().any(|t| t.kind == *kind),
            Keyword(word) => tokens
                .iter()
                .any(|t| t.normalized == *word || (word.contains(' ') && t.normalized.contains(word))),
            HasEntity(kind) => entities.iter().any(|e| e.kind == *kind),
            MultiClause => clause_kinds >= 3,
            MultipleTables => table_count >= 2,
            AggregateBy => (0..tokens.len()).any(|i| tokens[i].is("by") && is_group_trigger(tokens, i)),
        }
    };

    let mut scores: Vec<IntentScore> = Vec::new();
    for r in RULES {
        let matched = r.criteria.iter().filter(|c| matches(c)).count();
        if matched == 0 {
            continue;
        }
        let score = matched as f64 / r.criteria.len() as f64 * r.weight;
        match scores.iter_mut().find(|s| s.intent == r.intent) {
            Some(existing) => existing.score = existing.score.max(score),
            None => scores.push(IntentScore { intent: r.intent, score }),
        }
    }

    scores.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.intent.cmp(&b.intent)));
    scores
}

fn pick_primary(intents: &[IntentScore]) -> IntentType {
    let Some(top) = intents.first() else {
        return IntentType::Retrieve;
    };
    let score = |intent| intents.iter().find(|s| s.intent == intent).map(|s| s.score);

    let mut primary = top.intent;
    if primary == IntentType::Count && score(IntentType::Group).is_some() {
        primary = IntentType::Group;
    }
    if primary.is_aggregation() && score(IntentType::Join).is_some() && top.score <= AGGREGATION_OVER_JOIN {
        primary = IntentType::Join;
    }
    primary
}

fn query_type(tokens: &[Token]) -> QueryType {
    tokens
        .iter()
        .filter(|t| t.kind == TokenKind::WriteKeyword)
        .find_map(|t| {
            let word = t.normalized.split_whitespace().next().unwrap_or("");
            match word {
                "insert" | "add" => Some(QueryType::Insert),
                "update" | "modify" => Some(QueryType::Update),
                "delete" | "remove" | "drop" => Some(QueryType::Delete),
                "create" => Some(QueryType::Create),
                _ => None,
            }
        })
        .unwrap_or_default()
}

fn complexity(components: &QueryComponents, intents: &[IntentScore]) -> Complexity {
    let mut score = components.tables.len() as u32;
    score += 2 * components.joins.len() as u32;
    if !components.aggregations.is_empty() {
        score += 2;
    }
    if !components.group_by.is_empty() {
        score += 2;
    }
    score += 3 * intents.iter().filter(|s| s.intent.is_advanced()).count() as u32;
    score += components.conditions.len() as u32;
    Complexity::from_score(score)
}

fn mentioned_tables(entities: &[Entity]) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for e in entities {
        let table = match e.kind {
            EntityKind::Table => Some(e.name()),
            EntityKind::Column => e.table.clone(),
            _ => None,
        };
        if let Some(t) = table {
            if !tables.iter().any(|x| x.eq_ignore_ascii_case(&t)) {
                tables.push(t);
            }
        }
    }
    tables
}

fn mention(entity: &Entity) -> ColumnMention {
    match entity.kind {
        EntityKind::Table => ColumnMention {
            column: None,
            table: Some(entity.name()),
            ambiguous: false,
        },
        _ => ColumnMention {
            column: Some(entity.name()),
            table: entity.table.clone(),
            ambiguous: entity.ambiguous,
        },
    }
}

fn is_logical(e: &Entity) -> bool {
    e.kind == EntityKind::Operator && matches!(e.resolved_name.as_deref(), Some("and" | "or" | "not"))
}

fn is_comparison(e: &Entity) -> bool {
    e.kind == EntityKind::Operator && !is_logical(e)
}

fn value_of(e: &Entity) -> String {
    e.meta("value").map(str::to_string).unwrap_or_else(|| e.name())
}

fn extract_components(tokens: &[Token], entities: &[Entity]) -> QueryComponents {
    let mut c = QueryComponents {
        tables: mentioned_tables(entities),
        distinct: tokens.iter().any(|t| t.kind == TokenKind::DistinctKeyword),
        ..Default::default()
    };

    for e in entities.iter().filter(|e| e.kind == EntityKind::Column) {
        let m = mention(e);
        if !c.columns.contains(&m) {
            c.columns.push(m);
        }
    }

    let mut consumed_values: Vec<usize> = Vec::new();
    extract_conditions(entities, &mut c, &mut consumed_values);
    extract_aggregations(tokens, entities, &mut c);
    c.group_by = clause_scan(tokens, entities, is_group_trigger);
    c.order_by = order_scan(tokens, entities);
    c.joins = extract_joins(tokens, &c.tables);
    c.limit = extract_limit(tokens);

    for (i, e) in entities.iter().enumerate() {
        if e.kind != EntityKind::TimeRange || consumed_values.contains(&i) {
            continue;
        }
        if let Some(days) = e.meta("days").and_then(|d| d.parse().ok()) {
            c.time_window_days.get_or_insert(days);
        }
        if let Some(month) = e.meta("month").and_then(|m| m.parse().ok()) {
            c.month.get_or_insert(month);
        }
    }
    c
}

/// Bind each comparison to the nearest preceding column and nearest following value
fn extract_conditions(entities: &[Entity], c: &mut QueryComponents, consumed: &mut Vec<usize>) {
    for (i, op) in entities.iter().enumerate() {
        if !is_comparison(op) {
            continue;
        }
        let lhs = entities[..i].iter().rev().find(|e| e.kind == EntityKind::Column);

        let modifier = entities[..i]
            .iter()
            .rev()
            .take_while(|e| !is_comparison(e))
            .find(|e| is_logical(e))
            .map(Entity::name);

        let mut following = entities
            .iter()
            .enumerate()
            .skip(i + 1)
            .filter(|(_, e)| e.kind.is_value() || e.kind == EntityKind::Column);
        let rhs = following.next();

        let operator = op.name();
        let high = if operator == "between" {
            following.find(|(_, e)| e.kind.is_value())
        } else {
            None
        };

        if let Some((idx, _)) = rhs {
            consumed.push(idx);
        }
        if let Some((idx, _)) = high {
            consumed.push(idx);
        }

        c.conditions.push(ConditionComponent {
            column: lhs.map(Entity::name),
            table: lhs.and_then(|e| e.table.clone()),
            operator,
            value: rhs.map(|(_, e)| value_of(e)),
            value_kind: rhs.map(|(_, e)| e.kind),
            high: high.map(|(_, e)| value_of(e)),
            modifier,
            days: rhs
                .filter(|(_, e)| e.kind == EntityKind::TimeRange)
                .and_then(|(_, e)| e.meta("days"))
                .and_then(|d| d.parse().ok()),
        });
    }
}

/// Pair each aggregation with the nearest following column (default `*`)
fn extract_aggregations(tokens: &[Token], entities: &[Entity], c: &mut QueryComponents) {
    for (i, agg) in entities.iter().enumerate() {
        if agg.kind != EntityKind::Aggregation {
            continue;
        }
        let limit = next_clause_position(tokens, agg.position + agg.length);
        let window = entities[i + 1..]
            .iter()
            .take_while(|e| e.kind != EntityKind::Aggregation && e.position < limit);

        let mut column = None;
        let mut table = None;
        for e in window {
            match e.kind {
                EntityKind::Column => {
                    column = Some(e);
                    break;
                }
                EntityKind::Table if table.is_none() => table = Some(e.name()),
                _ => {}
            }
        }

        c.aggregations.push(AggregationComponent {
            function: agg.name(),
            column: column.map_or_else(|| "*".to_string(), Entity::name),
            table: column.and_then(|e| e.table.clone()).or(table),
        });
    }
}

/// Start of the next clause keyword at or after `from`, or the end of input
fn next_clause_position(tokens: &[Token], from: usize) -> usize {
    tokens
        .iter()
        .filter(|t| t.position >= from && t.kind.is_clause_keyword())
        .map(|t| t.position)
        .next()
        .unwrap_or(usize::MAX)
}

fn is_group_trigger(tokens: &[Token], index: usize) -> bool {
    let token = &tokens[index];
    token.kind == TokenKind::GroupKeyword
        || (token.is("by") && tokens[..index].iter().any(|t| t.kind == TokenKind::Aggregation))
}

/// Columns and tables named between a trigger token and the next clause keyword
fn clause_scan(tokens: &[Token], entities: &[Entity], trigger: fn(&[Token], usize) -> bool) -> Vec<ColumnMention> {
    let mut mentions: Vec<ColumnMention> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if !trigger(tokens, i) {
            continue;
        }
        let end = next_clause_position(tokens, token.end());
        for e in entities
            .iter()
            .filter(|e| e.position >= token.end() && e.position < end)
            .filter(|e| matches!(e.kind, EntityKind::Column | EntityKind::Table))
        {
            let m = mention(e);
            if !mentions.contains(&m) {
                mentions.push(m);
            }
        }
    }
    mentions
}

fn order_scan(tokens: &[Token], entities: &[Entity]) -> Vec<OrderComponent> {
    let mut order = Vec::new();
    for token in tokens.iter().filter(|t| t.kind == TokenKind::OrderKeyword) {
        let end = next_clause_position(tokens, token.end());
        let direction = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::SortDirection && t.position >= token.end() && t.position < end)
            .map(|t| sort_direction(&t.normalized))
            .next();
        for e in entities
            .iter()
            .filter(|e| e.position >= token.end() && e.position < end)
            .filter(|e| matches!(e.kind, EntityKind::Column | EntityKind::Aggregation))
        {
            let target = if e.kind == EntityKind::Aggregation {
                ColumnMention {
                    column: Some(e.name()),
                    table: None,
                    ambiguous: false,
                }
            } else {
                mention(e)
            };
            order.push(OrderComponent { target, direction });
        }
    }
    order
}

/// `descending`, `highest`, `most`, ... => DESC; everything else ASC
pub fn sort_direction(word: &str) -> OrderDirection {
    match word {
        "descending" | "highest" | "largest" | "biggest" | "most" => OrderDirection::Desc,
        _ => OrderDirection::Asc,
    }
}

fn extract_joins(tokens: &[Token], tables: &[String]) -> Vec<JoinComponent> {
    if tables.len() < 2 {
        return Vec::new();
    }
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.kind == TokenKind::JoinKeyword)
        .map(|(i, _)| {
            let join_type = i
                .checked_sub(1)
                .and_then(|p| tokens.get(p))
                .filter(|t| t.kind == TokenKind::JoinType)
                .map_or_else(|| "inner".to_string(), |t| t.normalized.clone());
            JoinComponent {
                join_type,
                left_table: tables[0].clone(),
                right_table: tables[1].clone(),
            }
        })
        .collect()
}

/// "top/first/limit N" or "last N"
fn extract_limit(tokens: &[Token]) -> Option<u64> {
    tokens.windows(2).find_map(|pair| {
        if pair[0].kind == TokenKind::LimitKeyword && pair[1].kind == TokenKind::Number {
            pair[1].normalized.parse::<f64>().ok().map(|n| n as u64)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecognizerConfig;
    use crate::nlp::{EntityRecognizer, Tokenizer};
    use crate::schema::{Column, ColumnType, SchemaModel, Table};

    fn schema() -> SchemaModel {
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

    fn classify(text: &str) -> ClassifiedIntent {
        let schema = schema();
        let tokens = Tokenizer::for_schema(&schema).unwrap().tokenize(text);
        let entities = EntityRecognizer::new(&schema, &RecognizerConfig::default()).recognize(&tokens);
        IntentClassifier::new().classify(&tokens, &entities)
    }

    #[test]
    fn test_group_preempts_count() {
        let intent = classify("count orders per customer");
        assert!(intent.has_intent(IntentType::Count));
        assert_eq!(intent.primary, IntentType::Group);
        assert_eq!(intent.components.aggregations[0].function, "count");
        assert_eq!(intent.components.aggregations[0].column, "*");
        assert_eq!(intent.components.group_by[0].table.as_deref(), Some("customers"));
    }

    #[test]
    fn test_join_preempts_weak_aggregation() {
        // Sum scores 0.8 from "total", not enough to hold off two tables
        let intent = classify("total amount of orders and customers");
        assert_eq!(intent.primary, IntentType::Join);
        assert!(intent.components.joins.is_empty());

        let intent = classify("total orders joined with customers");
        assert_eq!(intent.primary, IntentType::Join);
        assert_eq!(intent.components.joins.len(), 1);
        assert_eq!(intent.components.joins[0].join_type, "inner");
        assert_eq!(intent.components.joins[0].left_table, "orders");
        assert_eq!(intent.components.joins[0].right_table, "customers");
    }

    #[test]
    fn test_strong_aggregation_survives_join() {
        let intent = classify("how many orders left join customers");
        assert_eq!(intent.primary, IntentType::Count);
        assert_eq!(intent.components.joins[0].join_type, "left");
    }

    #[test]
    fn test_conditions_with_modifiers() {
        let intent = classify("orders where amount > 100 and status = 'shipped'");
        let conds = &intent.components.conditions;
        assert_eq!(conds.len(), 2);
        assert_eq!(conds[0].column.as_deref(), Some("amount"));
        assert_eq!(conds[0].operator, ">");
        assert_eq!(conds[0].value.as_deref(), Some("100"));
        assert_eq!(conds[0].modifier, None);
        assert_eq!(conds[1].column.as_deref(), Some("status"));
        assert_eq!(conds[1].value.as_deref(), Some("shipped"));
        assert_eq!(conds[1].modifier.as_deref(), Some("and"));
        assert_eq!(intent.primary, IntentType::Filter);
    }

    #[test]
    fn test_between_takes_two_values() {
        let intent = classify("orders where amount between 10 and 20");
        let cond = &intent.components.conditions[0];
        assert_eq!(cond.operator, "between");
        assert_eq!(cond.value.as_deref(), Some("10"));
        assert_eq!(cond.high.as_deref(), Some("20"));
    }

    #[test]
    fn test_order_limit_and_time_window() {
        let intent = classify("top 5 orders in the last 30 days sorted by amount descending");
        assert_eq!(intent.components.limit, Some(5));
        assert_eq!(intent.components.time_window_days, Some(30));
        let order = &intent.components.order_by[0];
        assert_eq!(order.target.column.as_deref(), Some("amount"));
        assert_eq!(order.direction, Some(OrderDirection::Desc));
    }

    #[test]
    fn test_query_type_and_complexity() {
        assert_eq!(classify("delete old orders").query_type, QueryType::Delete);
        assert_eq!(classify("show orders").query_type, QueryType::Select);
        assert_eq!(classify("show orders").complexity, Complexity::Simple);
        let complex = classify("average amount per customer for orders above average joined with customers where status = 'paid'");
        assert!(complex.complexity >= Complexity::Complex);
    }

    #[test]
    fn test_confidence_formula() {
        let intent = classify("show orders");
        let top = intent.intents[0].score;
        // "show" yields no entity; "orders" is an exact table match
        assert!((intent.confidence - (0.6 * top + 0.4 * 1.0)).abs() < 1e-9);

        let nothing = IntentClassifier::new().classify(&[], &[]);
        assert_eq!(nothing.primary, IntentType::Retrieve);
        assert!((nothing.confidence - 0.4 * DEFAULT_ENTITY_CONFIDENCE).abs() < 1e-9);
    }
}
