//! Entity Recognizer - binds tokens to schema objects or literal classes.
//!
//! Each token runs through a cascade: exact/synonym lookup, fuzzy match,
//! positional rules, then a fallback by token kind. Low-confidence entities are
//! dropped, and columns owned by several tables go through an ambiguity pass.

use super::token::{Token, TokenKind};
use crate::config::RecognizerConfig;
use crate::schema::naming::{normalize_identifier, surface_forms, words_to_snake};
use crate::schema::SchemaModel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Confidence for a table inferred from a preceding "from"
const POSITIONAL_TABLE_CONFIDENCE: f64 = 0.5;

/// Confidence for a column inferred from a neighbouring command or comparison
const POSITIONAL_COLUMN_CONFIDENCE: f64 = 0.45;

/// Prefix matches get their similarity boosted by this factor
const PREFIX_BOOST: f64 = 1.2;

const EXACT_CONFIDENCE: f64 = 1.0;
const FORM_CONFIDENCE: f64 = 0.95;
const SYNONYM_CONFIDENCE: f64 = 0.9;

/// Built-in synonyms: word -> schema name they stand for, if the schema has it
const CURATED_SYNONYMS: &[(&str, &str)] = &[
    ("client", "customers"),
    ("clients", "customers"),
    ("buyer", "customers"),
    ("buyers", "customers"),
    ("purchase", "orders"),
    ("purchases", "orders"),
    ("sale", "orders"),
    ("sales", "orders"),
    ("item", "products"),
    ("items", "products"),
    ("goods", "products"),
    ("staff", "employees"),
    ("workers", "employees"),
    ("cost", "price"),
    ("spend", "amount"),
    ("mail", "email"),
];

/// What an entity was bound to
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Table,
    Column,
    Function,
    Number,
    String,
    Date,
    TimeRange,
    Boolean,
    Null,
    Operator,
    Aggregation,
}

impl EntityKind {
    pub fn is_value(&self) -> bool {
        matches!(
            self,
            Self::Number | Self::String | Self::Date | Self::TimeRange | Self::Boolean | Self::Null
        )
    }
}

/// A token bound to a schema object or literal class
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub text: String,
    pub kind: EntityKind,
    pub confidence: f64,
    pub position: usize,
    pub length: usize,
    /// Canonical schema name, aggregate or operator
    pub resolved_name: Option<String>,
    /// Owning table for columns
    pub table: Option<String>,
    /// Column binding could not be narrowed to one table
    #[serde(default)]
    pub ambiguous: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Entity {
    fn from_token(token: &Token, kind: EntityKind, confidence: f64, source: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), source.to_string());
        Self {
            text: token.text.clone(),
            kind,
            confidence,
            position: token.position,
            length: token.length,
            resolved_name: None,
            table: None,
            ambiguous: false,
            metadata,
        }
    }

    fn resolved(mut self, name: impl Into<String>) -> Self {
        self.resolved_name = Some(name.into());
        self
    }

    fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Resolved name, or the lower-cased text when unresolved
    pub fn name(&self) -> String {
        self.resolved_name.clone().unwrap_or_else(|| self.text.to_lowercase())
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Owning-table candidates recorded for a column
    pub fn candidates(&self) -> Vec<String> {
        self.meta("candidates")
            .map(|c| c.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    kind: EntityKind,
    name: String,
    table: Option<String>,
    confidence: f64,
    source: &'static str,
}

/// Schema-bound entity recognizer
pub struct EntityRecognizer {
    /// Surface form -> schema objects it may denote
    lexicon: HashMap<String, Vec<Candidate>>,

    /// Lexicon keys in sorted order, for deterministic fuzzy matching
    surfaces: Vec<String>,

    config: RecognizerConfig,
}

impl EntityRecognizer {
    pub fn new(schema: &SchemaModel, config: &RecognizerConfig) -> Self {
        let mut lexicon: HashMap<String, Vec<Candidate>> = HashMap::new();
        let mut add = |surface: String, candidate: Candidate| {
            let entry = lexicon.entry(surface).or_default();
            let duplicate = entry.iter().any(|c| {
                c.kind == candidate.kind
                    && c.name.eq_ignore_ascii_case(&candidate.name)
                    && c.table == candidate.table
            });
            if !duplicate {
                entry.push(candidate);
            }
        };

        for table in schema.tables() {
            for (i, form) in surface_forms(&table.name).into_iter().enumerate() {
                add(form, candidate(EntityKind::Table, &table.name, None, form_confidence(i), "exact"));
            }
            for synonym in &table.synonyms {
                add(
                    normalize_identifier(synonym),
                    candidate(EntityKind::Table, &table.name, None, SYNONYM_CONFIDENCE, "synonym"),
                );
            }
            for column in &table.columns {
                for (i, form) in surface_forms(&column.name).into_iter().enumerate() {
                    add(
                        form,
                        candidate(EntityKind::Column, &column.name, Some(&table.name), form_confidence(i), "exact"),
                    );
                }
                for synonym in &column.synonyms {
                    add(
                        normalize_identifier(synonym),
                        candidate(EntityKind::Column, &column.name, Some(&table.name), SYNONYM_CONFIDENCE, "synonym"),
                    );
                }
            }
        }
        for function in schema.functions() {
            add(
                normalize_identifier(&function.name),
                candidate(EntityKind::Function, &function.name, None, EXACT_CONFIDENCE, "exact"),
            );
        }

        // configured synonyms take precedence over curated ones
        let mut synonyms: Vec<(&str, &str)> = config.synonyms.iter().map(|(w, t)| (w.as_str(), t.as_str())).collect();
        synonyms.sort();
        synonyms.extend(CURATED_SYNONYMS.iter().copied());
        for (word, target) in synonyms {
            let key = normalize_identifier(word);
            if lexicon.contains_key(&key) {
                continue;
            }
            for resolved in resolve_synonym_target(schema, target) {
                lexicon.entry(key.clone()).or_default().push(resolved);
            }
        }

        let mut surfaces: Vec<String> = lexicon.keys().cloned().collect();
        surfaces.sort();

        Self {
            lexicon,
            surfaces,
            config: config.clone(),
        }
    }

    /// Bind every token; entities at or below the minimum confidence are dropped
    pub fn recognize(&self, tokens: &[Token]) -> Vec<Entity> {
        let mut entities: Vec<Entity> = tokens
            .iter()
            .enumerate()
            .filter_map(|(i, token)| self.recognize_token(tokens, i, token))
            .filter(|e| e.confidence > self.config.min_confidence)
            .collect();

        self.resolve_ambiguity(&mut entities);
        entities
    }

    fn recognize_token(&self, tokens: &[Token], index: usize, token: &Token) -> Option<Entity> {
        if token.kind.is_wordlike() {
            if let Some(entity) = self.exact_match(token) {
                return Some(entity);
            }
            if let Some(entity) = self.fuzzy_match(token) {
                return Some(entity);
            }
            if let Some(entity) = positional_match(tokens, index, token) {
                return Some(entity);
            }
        }
        kind_fallback(token)
    }

    fn exact_match(&self, token: &Token) -> Option<Entity> {
        let lower = token.text.to_lowercase();
        let keys = [token.normalized.clone(), lower.clone(), words_to_snake(&lower)];
        let candidates = keys.iter().find_map(|k| self.lexicon.get(k))?;
        Some(self.entity_from_candidates(token, candidates, None))
    }

    fn fuzzy_match(&self, token: &Token) -> Option<Entity> {
        let word = token.normalized.as_str();
        if word.chars().count() < 3 {
            return None;
        }

        let mut best: Option<(&str, f64)> = None;
        for surface in &self.surfaces {
            let score = similarity(word, surface);
            if score >= self.config.fuzzy_threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((surface.as_str(), score));
            }
        }

        let (surface, score) = best?;
        let candidates = self.lexicon.get(surface)?;
        tracing::debug!(word, surface, score, "fuzzy schema match");
        Some(
            self.entity_from_candidates(token, candidates, Some(score))
                .with_meta("source", "fuzzy")
                .with_meta("matched", surface),
        )
    }

    /// Tables win over columns; several owning tables leave the column unbound
    fn entity_from_candidates(&self, token: &Token, candidates: &[Candidate], score: Option<f64>) -> Entity {
        let scale = score.unwrap_or(1.0);
        let of_kind = |kind: EntityKind| candidates.iter().filter(move |c| c.kind == kind).collect::<Vec<_>>();

        let tables = of_kind(EntityKind::Table);
        let columns = of_kind(EntityKind::Column);
        let functions = of_kind(EntityKind::Function);

        let (kind, group) = if !tables.is_empty() {
            (EntityKind::Table, tables)
        } else if !columns.is_empty() {
            (EntityKind::Column, columns)
        } else {
            (EntityKind::Function, functions)
        };

        let best = group
            .iter()
            .copied()
            .fold(None::<&Candidate>, |acc, c| match acc {
                Some(a) if a.confidence >= c.confidence => Some(a),
                _ => Some(c),
            });
        let Some(best) = best else {
            return Entity::from_token(token, kind, 0.0, "exact");
        };

        let confidence = (best.confidence * scale).min(1.0);
        let mut entity = Entity::from_token(token, kind, confidence, best.source).resolved(&best.name);

        if kind == EntityKind::Column {
            let mut owners: Vec<String> = Vec::new();
            for c in &group {
                if let Some(t) = &c.table {
                    if !owners.iter().any(|o| o.eq_ignore_ascii_case(t)) {
                        owners.push(t.clone());
                    }
                }
            }
            if owners.len() == 1 {
                entity.table = owners.pop();
            } else {
                entity = entity.with_meta("candidates", owners.join(","));
            }
        }
        entity
    }

    /// Narrow multi-table columns using tables already named in the input;
    /// otherwise flag them ambiguous and cut their confidence.
    fn resolve_ambiguity(&self, entities: &mut [Entity]) {
        let mut context: Vec<String> = Vec::new();
        for e in entities.iter() {
            let table = match e.kind {
                EntityKind::Table => e.resolved_name.clone(),
                EntityKind::Column => e.table.clone(),
                _ => None,
            };
            if let Some(t) = table {
                let t = t.to_ascii_lowercase();
                if !context.contains(&t) {
                    context.push(t);
                }
            }
        }

        for entity in entities.iter_mut() {
            if entity.kind != EntityKind::Column || entity.table.is_some() {
                continue;
            }
            let candidates = entity.candidates();
            if candidates.is_empty() {
                continue;
            }

            let in_context = context
                .iter()
                .find_map(|t| candidates.iter().find(|c| c.eq_ignore_ascii_case(t)));
            match in_context {
                Some(table) => {
                    entity.table = Some(table.clone());
                    entity.metadata.insert("resolved_by".to_string(), "context".to_string());
                }
                None => {
                    let before = entity.confidence;
                    entity.ambiguous = true;
                    entity.confidence = before * (1.0 - self.config.ambiguity_penalty);
                    entity
                        .metadata
                        .insert("pre_ambiguity_confidence".to_string(), format!("{:.4}", before));
                    tracing::debug!(column = %entity.text, candidates = %candidates.join(","), "ambiguous column");
                }
            }
        }
    }
}

fn candidate(kind: EntityKind, name: &str, table: Option<&str>, confidence: f64, source: &'static str) -> Candidate {
    Candidate {
        kind,
        name: name.to_string(),
        table: table.map(str::to_string),
        confidence,
        source,
    }
}

/// First surface form is the name itself; the rest are spelling variants
fn form_confidence(index: usize) -> f64 {
    if index == 0 {
        EXACT_CONFIDENCE
    } else {
        FORM_CONFIDENCE
    }
}

fn resolve_synonym_target(schema: &SchemaModel, target: &str) -> Vec<Candidate> {
    if let Some(table) = schema.find_table_tolerant(target) {
        return vec![candidate(EntityKind::Table, &table.name, None, SYNONYM_CONFIDENCE, "synonym")];
    }
    schema
        .tables_with_column(target)
        .into_iter()
        .filter_map(|t| t.column(target).map(|c| (t, c)))
        .map(|(t, c)| candidate(EntityKind::Column, &c.name, Some(&t.name), SYNONYM_CONFIDENCE, "synonym"))
        .collect()
}

/// "from X" => table, "show X" => column, "X >" => column
fn positional_match(tokens: &[Token], index: usize, token: &Token) -> Option<Entity> {
    let prev = tokens[..index].iter().rev().find(|t| t.kind != TokenKind::Determiner);
    let next = tokens.get(index + 1);

    if prev.map_or(false, |p| p.is("from")) {
        return Some(Entity::from_token(token, EntityKind::Table, POSITIONAL_TABLE_CONFIDENCE, "positional"));
    }
    let after_command = prev.map_or(false, |p| p.kind == TokenKind::Command);
    let before_comparison = next.map_or(false, |n| n.kind == TokenKind::Comparison);
    if after_command || before_comparison {
        return Some(Entity::from_token(token, EntityKind::Column, POSITIONAL_COLUMN_CONFIDENCE, "positional"));
    }
    None
}

fn kind_fallback(token: &Token) -> Option<Entity> {
    let entity = |kind| Entity::from_token(token, kind, token.confidence, "kind");
    let n = token.normalized.as_str();
    let e = match token.kind {
        TokenKind::Number => entity(EntityKind::Number).resolved(n).with_meta("value", n),
        TokenKind::StringLiteral => {
            let raw = token.text.as_str();
            let value = if raw.len() >= 2 { &raw[1..raw.len() - 1] } else { raw };
            entity(EntityKind::String).resolved(n).with_meta("value", value.replace("''", "'"))
        }
        TokenKind::Date => entity(EntityKind::Date).resolved(n).with_meta("value", n),
        TokenKind::Temporal => time_range(entity(EntityKind::TimeRange).resolved(n), n),
        TokenKind::Boolean => entity(EntityKind::Boolean).resolved(if n == "false" { "false" } else { "true" }),
        TokenKind::Null => entity(EntityKind::Null).resolved("null"),
        TokenKind::Aggregation => entity(EntityKind::Aggregation).resolved(canonical_aggregate(n)?),
        TokenKind::Comparison => entity(EntityKind::Operator).resolved(canonical_comparison(n)?),
        TokenKind::Logical => entity(EntityKind::Operator).resolved(canonical_logical(n)),
        _ => return None,
    };
    Some(e)
}

/// Attach `days`, `months` or `month` metadata parsed from a temporal phrase
fn time_range(entity: Entity, phrase: &str) -> Entity {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if let [_, count, unit] = words.as_slice() {
        if let Ok(n) = count.parse::<u32>() {
            let days = match unit.trim_end_matches('s') {
                "day" => n,
                "week" => n.saturating_mul(7),
                "month" => n.saturating_mul(30),
                "year" => n.saturating_mul(365),
                _ => n,
            };
            let e = entity.with_meta("days", days.to_string());
            return if unit.starts_with("month") {
                e.with_meta("months", n.to_string())
            } else {
                e
            };
        }
    }
    if let Some(month) = month_number(phrase) {
        return entity.with_meta("month", month.to_string());
    }
    match phrase {
        "today" => entity.with_meta("days", "0"),
        "yesterday" => entity.with_meta("days", "1"),
        p if p.ends_with("week") => entity.with_meta("days", "7"),
        p if p.ends_with("month") => entity.with_meta("days", "30").with_meta("months", "1"),
        p if p.ends_with("quarter") => entity.with_meta("days", "90").with_meta("months", "3"),
        p if p.ends_with("year") || p == "ytd" || p == "year to date" => entity.with_meta("days", "365"),
        p if p.ends_with("day") => entity.with_meta("days", "1"),
        _ => entity,
    }
}

/// Month number (1-12) for a full month name
pub fn month_number(word: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september", "october",
        "november", "december",
    ];
    MONTHS.iter().position(|m| *m == word).map(|i| i as u32 + 1)
}

fn canonical_aggregate(normalized: &str) -> Option<&'static str> {
    match normalized {
        "count" | "how many" | "number of" => Some("count"),
        "sum" | "total" => Some("sum"),
        "average" | "mean" => Some("avg"),
        "minimum" => Some("min"),
        "maximum" => Some("max"),
        _ => None,
    }
}

/// Canonical operator symbol for a comparison phrase
pub fn canonical_comparison(normalized: &str) -> Option<&'static str> {
    let op = match normalized {
        "=" | "equal" | "equals" | "equal to" | "equals to" => "=",
        "!=" | "<>" | "is not" | "not equal" | "not equal to" => "!=",
        ">=" | "at least" | "since" => ">=",
        "<=" | "at most" => "<=",
        ">" | "above" | "over" | "exceeds" | "exceed" | "after" => ">",
        "<" | "below" | "under" | "before" => "<",
        "between" => "between",
        "like" | "contains" | "starts with" | "ends with" => "like",
        "not like" => "not like",
        "not in" => "not in",
        other if other.contains("than or equal") => {
            if other.contains("less") || other.contains("fewer") || other.contains("lower") || other.contains("smaller") {
                "<="
            } else {
                ">="
            }
        }
        other if other.ends_with("than") => {
            if other.contains("less") || other.contains("fewer") || other.contains("lower") || other.contains("smaller") {
                "<"
            } else {
                ">"
            }
        }
        _ => return None,
    };
    Some(op)
}

fn canonical_logical(normalized: &str) -> &'static str {
    match normalized {
        "or" => "or",
        "not" | "without" | "except" => "not",
        _ => "and",
    }
}

/// `1 - distance / max_len`, boosted for prefix matches, capped at 1.0
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let base = 1.0 - levenshtein(a, b) as f64 / max_len as f64;
    if a.starts_with(b) || b.starts_with(a) {
        (base * PREFIX_BOOST).min(1.0)
    } else {
        base
    }
}

/// Classic two-row dynamic-programming edit distance
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
