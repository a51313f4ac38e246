//! Tokenizer - raw question text to a typed token stream.
//!
//! An ordered rule table of (pattern, kind, priority) entries is evaluated at every
//! offset; the longest match wins and ties go to the higher priority. Text no rule
//! matches is looked up word by word in a schema-derived dictionary, then classified
//! by surface shape. A post-pass merges two-word keywords ("group by", "order by")
//! and two-word schema names ("unit price") into single tokens.

use super::token::{Token, TokenKind};
use crate::error::{EngineError, EngineResult};
use crate::schema::naming::surface_forms;
use crate::schema::SchemaModel;
use regex::Regex;
use std::collections::HashMap;

/// Confidence for words classified by shape alone
const SHAPE_CONFIDENCE: f64 = 0.5;

/// Confidence for words found in the schema dictionary
const DICTIONARY_CONFIDENCE: f64 = 0.9;

/// Confidence bonus for merged multi-word tokens
const MERGE_BONUS: f64 = 0.1;

/// (kind, priority, confidence, word boundary, pattern)
const RULES: &[(TokenKind, u8, f64, bool, &str)] = &[
    (TokenKind::StringLiteral, 100, 1.0, false, r#"'(?:[^']|'')*'|"[^"]*""#),
    (TokenKind::Date, 96, 0.95, true, r"\d{4}-\d{2}-\d{2}"),
    (
        TokenKind::Temporal,
        95,
        0.95,
        true,
        r"(?:last|past|previous|trailing)\s+\d+\s+(?:days?|weeks?|months?|years?)",
    ),
    (
        TokenKind::Temporal,
        94,
        0.9,
        true,
        r"(?:last|this|previous|past|current)\s+(?:day|week|month|quarter|year)|today|yesterday|year\s+to\s+date|ytd",
    ),
    (TokenKind::Comparison, 92, 1.0, false, r">=|<=|!=|<>|=|>|<"),
    (TokenKind::Number, 90, 1.0, true, r"\d+(?:\.\d+)?"),
    (
        TokenKind::Comparison,
        88,
        0.9,
        true,
        r"(?:is\s+)?(?:greater|more|higher|bigger|larger)\s+than(?:\s+or\s+equal\s+to)?|(?:is\s+)?(?:less|fewer|lower|smaller)\s+than(?:\s+or\s+equal\s+to)?|at\s+least|at\s+most|not\s+equal(?:\s+to)?|equals?(?:\s+to)?|is\s+not|exceeds?|above|below|between|not\s+like|like|contains|starts\s+with|ends\s+with|not\s+in|after|since|before|over|under",
    ),
    (
        TokenKind::Aggregation,
        86,
        0.9,
        true,
        r"how\s+many|number\s+of|count|sum|total|average|avg|mean|minimum|min|maximum|max",
    ),
    (
        TokenKind::WriteKeyword,
        84,
        0.85,
        true,
        r"insert|add\s+(?:a\s+)?new|update|modify|delete|remove|create|drop",
    ),
    (
        TokenKind::Command,
        82,
        0.85,
        true,
        r"show|list|display|get|find|fetch|give\s+me|return|select|retrieve|what\s+(?:is|are)|which|who",
    ),
    (
        TokenKind::JoinKeyword,
        80,
        0.85,
        true,
        r"joined|join|combined\s+with|together\s+with|along\s+with|with\s+their|with\s+its|related\s+to|matching",
    ),
    (TokenKind::JoinType, 80, 0.85, true, r"inner|left|right|full|outer|cross"),
    (TokenKind::CteKeyword, 79, 0.9, true, r"with\s+\w+\s+as"),
    (
        TokenKind::GroupKeyword,
        78,
        0.9,
        true,
        r"per|for\s+each|for\s+every|each|broken\s+down\s+by|breakdown\s+by",
    ),
    (
        TokenKind::SortDirection,
        74,
        0.85,
        true,
        r"ascending|descending|asc|desc|highest|lowest|largest|smallest|biggest|most|least|alphabetically",
    ),
    (TokenKind::LimitKeyword, 72, 0.85, true, r"top|first|limit|bottom|last"),
    (
        TokenKind::FilterKeyword,
        70,
        0.85,
        true,
        r"where|whose|having|(?:that|which|who)\s+(?:have|has|are|is|were|was)|filtered\s+by|filter\s+by|with|only",
    ),
    (
        TokenKind::SubqueryKeyword,
        69,
        0.8,
        true,
        r"not\s+exists|exists|above\s+average|below\s+average|than\s+(?:the\s+)?average|any\s+of|all\s+of|never",
    ),
    (
        TokenKind::WindowKeyword,
        69,
        0.8,
        true,
        r"dense\s+rank|rank(?:ed|ing)?|row\s+number|running\s+total|cumulative|moving\s+average|partition(?:ed)?\s+by|percentile|ntile",
    ),
    (TokenKind::DistinctKeyword, 68, 0.85, true, r"distinct|unique|different"),
    (TokenKind::Logical, 66, 0.85, true, r"and|or|not|but|except|without"),
    (TokenKind::Null, 64, 0.8, true, r"null|empty|missing|blank"),
    (TokenKind::Boolean, 64, 0.7, true, r"true|false|yes"),
    (
        TokenKind::Temporal,
        62,
        0.85,
        true,
        r"january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec",
    ),
    (
        TokenKind::Determiner,
        60,
        0.7,
        true,
        r"the|a|an|all|every|some|any|this|that|these|those|my|our|their|its",
    ),
    (
        TokenKind::Preposition,
        58,
        0.7,
        true,
        r"from|in|of|by|on|at|to|for|into|within|during|until|about|across|among|through|than|as",
    ),
    (TokenKind::Punctuation, 56, 0.9, false, r"[,;:.!?()*%]"),
];

/// Abbreviation expansions applied word by word during normalization
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("avg", "average"),
    ("qty", "quantity"),
    ("amt", "amount"),
    ("num", "number"),
    ("cnt", "count"),
    ("yr", "year"),
    ("yrs", "years"),
    ("mo", "month"),
    ("mos", "months"),
    ("asc", "ascending"),
    ("desc", "descending"),
    ("min", "minimum"),
    ("max", "maximum"),
    ("dept", "department"),
    ("cust", "customer"),
    ("jan", "january"),
    ("feb", "february"),
    ("mar", "march"),
    ("apr", "april"),
    ("jun", "june"),
    ("jul", "july"),
    ("aug", "august"),
    ("sep", "september"),
    ("sept", "september"),
    ("oct", "october"),
    ("nov", "november"),
    ("dec", "december"),
];

struct TokenRule {
    kind: TokenKind,
    priority: u8,
    confidence: f64,
    regex: Regex,
}

/// Rule-table tokenizer with an optional schema dictionary
pub struct Tokenizer {
    rules: Vec<TokenRule>,

    /// Surface form (lower-case, may contain one space) -> canonical schema name
    dictionary: HashMap<String, String>,
}

impl Tokenizer {
    /// Tokenizer without schema knowledge
    pub fn new() -> EngineResult<Self> {
        let mut rules = Vec::with_capacity(RULES.len());
        for (kind, priority, confidence, boundary, pattern) in RULES {
            let anchored = format!("(?i)^(?:{}){}", pattern, if *boundary { r"\b" } else { "" });
            let regex = Regex::new(&anchored).map_err(|e| {
                EngineError::internal(format!("invalid token rule for {:?}: {}", kind, e))
            })?;
            rules.push(TokenRule {
                kind: *kind,
                priority: *priority,
                confidence: *confidence,
                regex,
            });
        }
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self {
            rules,
            dictionary: HashMap::new(),
        })
    }

    /// Tokenizer whose dictionary covers every table, column and synonym in `schema`
    pub fn for_schema(schema: &SchemaModel) -> EngineResult<Self> {
        let mut tokenizer = Self::new()?;
        let mut add = |surface: &str, canonical: &str| {
            let key = surface.trim().to_ascii_lowercase();
            if !key.is_empty() && key.split_whitespace().count() <= 2 {
                tokenizer.dictionary.entry(key).or_insert_with(|| canonical.to_string());
            }
        };
        for table in schema.tables() {
            for form in surface_forms(&table.name) {
                add(&form, &table.name);
            }
            for synonym in &table.synonyms {
                add(synonym, &table.name);
            }
        }
        for table in schema.tables() {
            for column in &table.columns {
                for form in surface_forms(&column.name) {
                    add(&form, &column.name);
                }
                for synonym in &column.synonyms {
                    add(synonym, &column.name);
                }
            }
        }
        for function in schema.functions() {
            add(&function.name, &function.name);
        }
        Ok(tokenizer)
    }

    /// Split `text` into tokens. Deterministic; holds no state between calls.
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let rest = &text[pos..];
            let Some(ch) = rest.chars().next() else { break };
            if ch.is_whitespace() {
                pos += ch.len_utf8();
                continue;
            }

            let token = self
                .match_rule(rest, pos)
                .unwrap_or_else(|| self.fallback_token(rest, pos));
            pos = token.end();
            tokens.push(token);
        }

        self.merge_pairs(text, tokens)
    }

    /// Longest rule match at the start of `rest`; ties go to the higher priority
    fn match_rule(&self, rest: &str, pos: usize) -> Option<Token> {
        let mut best: Option<(&TokenRule, usize)> = None;
        for rule in &self.rules {
            if let Some(m) = rule.regex.find(rest) {
                let len = m.end();
                if len > 0 && best.map_or(true, |(_, best_len)| len > best_len) {
                    best = Some((rule, len));
                }
            }
        }

        let (rule, len) = best?;
        let raw = &rest[..len];
        let normalized = match rule.kind {
            TokenKind::StringLiteral => strip_quotes(raw).to_lowercase(),
            _ => normalize_words(raw),
        };
        Some(Token {
            text: raw.to_string(),
            kind: rule.kind,
            position: pos,
            length: len,
            normalized,
            confidence: rule.confidence,
        })
    }

    /// Dictionary lookup for the next word, then shape classification
    fn fallback_token(&self, rest: &str, pos: usize) -> Token {
        let word_len: usize = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .map(char::len_utf8)
            .sum();

        if word_len == 0 {
            let ch_len = rest.chars().next().map_or(1, char::len_utf8);
            let raw = &rest[..ch_len];
            let kind = if raw.chars().all(|c| c.is_ascii_punctuation()) {
                TokenKind::Punctuation
            } else {
                TokenKind::Unknown
            };
            return Token {
                text: raw.to_string(),
                kind,
                position: pos,
                length: ch_len,
                normalized: raw.to_string(),
                confidence: SHAPE_CONFIDENCE,
            };
        }

        let raw = &rest[..word_len];
        let lower = raw.to_lowercase();
        let expanded = expand_abbreviation(&lower);

        if let Some(canonical) = self.dictionary.get(&lower).or_else(|| self.dictionary.get(expanded)) {
            return Token {
                text: raw.to_string(),
                kind: TokenKind::Identifier,
                position: pos,
                length: word_len,
                normalized: canonical.to_ascii_lowercase(),
                confidence: DICTIONARY_CONFIDENCE,
            };
        }

        Token {
            text: raw.to_string(),
            kind: shape_kind(raw),
            position: pos,
            length: word_len,
            normalized: expanded.to_string(),
            confidence: SHAPE_CONFIDENCE,
        }
    }

    fn merge_pairs(&self, text: &str, tokens: Vec<Token>) -> Vec<Token> {
        let mut merged: Vec<Token> = Vec::with_capacity(tokens.len());
        let mut iter = tokens.into_iter().peekable();

        while let Some(first) = iter.next() {
            let Some(second) = iter.peek() else {
                merged.push(first);
                break;
            };
            let adjacent = text[first.end()..second.position].chars().all(char::is_whitespace);
            match adjacent.then(|| self.merge_kind(&first, second)).flatten() {
                Some((kind, normalized)) => {
                    let end = second.end();
                    let confidence = (first.confidence.max(second.confidence) + MERGE_BONUS).min(1.0);
                    merged.push(Token {
                        text: text[first.position..end].to_string(),
                        kind,
                        position: first.position,
                        length: end - first.position,
                        normalized,
                        confidence,
                    });
                    iter.next();
                }
                None => merged.push(first),
            }
        }
        merged
    }

    fn merge_kind(&self, first: &Token, second: &Token) -> Option<(TokenKind, String)> {
        let a = first.text.to_lowercase();
        let b = second.text.to_lowercase();

        if b == "by" {
            match a.as_str() {
                "group" | "grouped" => return Some((TokenKind::GroupKeyword, "group by".to_string())),
                "order" | "ordered" | "sort" | "sorted" => {
                    return Some((TokenKind::OrderKeyword, "order by".to_string()))
                }
                _ => {}
            }
        }

        let mergeable = |t: &Token| {
            !(t.kind.is_literal() || matches!(t.kind, TokenKind::Comparison | TokenKind::Punctuation))
        };
        if mergeable(first) && mergeable(second) {
            let phrase = format!("{} {}", a, b);
            if let Some(canonical) = self.dictionary.get(&phrase) {
                return Some((TokenKind::Identifier, canonical.to_ascii_lowercase()));
            }
        }
        None
    }
}

/// Lower-case, collapse whitespace and expand abbreviations word by word
fn normalize_words(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| expand_abbreviation(&w.to_lowercase()).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn expand_abbreviation(word: &str) -> &str {
    ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == word)
        .map(|(_, full)| *full)
        .unwrap_or(word)
}

fn strip_quotes(raw: &str) -> String {
    let inner = if raw.len() >= 2 { &raw[1..raw.len() - 1] } else { raw };
    inner.replace("''", "'")
}

/// capitalized => noun, -ly => adverb, -ing/-ed => verb, else noun
fn shape_kind(word: &str) -> TokenKind {
    let lower = word.to_lowercase();
    if word.chars().next().map_or(false, char::is_uppercase) {
        TokenKind::Noun
    } else if lower.len() > 3 && lower.ends_with("ly") {
        TokenKind::Adverb
    } else if lower.len() > 4 && (lower.ends_with("ing") || lower.ends_with("ed")) {
        TokenKind::Verb
    } else {
        TokenKind::Noun
    }
}
