//! Token types produced by the tokenizer

use serde::{Deserialize, Serialize};

/// Lexical class of a token
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    // Keywords
    Command,
    Aggregation,
    GroupKeyword,
    OrderKeyword,
    SortDirection,
    LimitKeyword,
    FilterKeyword,
    JoinKeyword,
    JoinType,
    SubqueryKeyword,
    CteKeyword,
    WindowKeyword,
    DistinctKeyword,
    WriteKeyword,

    // Operators
    Comparison,
    Logical,

    // Literals
    Number,
    StringLiteral,
    Date,
    Temporal,
    Null,
    Boolean,

    // Parts of speech and schema words
    Identifier,
    Noun,
    Verb,
    Adverb,
    Determiner,
    Preposition,

    Punctuation,
    Unknown,
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Self::Command
                | Self::Aggregation
                | Self::GroupKeyword
                | Self::OrderKeyword
                | Self::SortDirection
                | Self::LimitKeyword
                | Self::FilterKeyword
                | Self::JoinKeyword
                | Self::JoinType
                | Self::SubqueryKeyword
                | Self::CteKeyword
                | Self::WindowKeyword
                | Self::DistinctKeyword
                | Self::WriteKeyword
        )
    }

    /// Keywords that open a clause; clause-scoped scans stop at the next one
    pub fn is_clause_keyword(&self) -> bool {
        matches!(
            self,
            Self::Command
                | Self::GroupKeyword
                | Self::OrderKeyword
                | Self::LimitKeyword
                | Self::FilterKeyword
                | Self::JoinKeyword
                | Self::CteKeyword
                | Self::WindowKeyword
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Number | Self::StringLiteral | Self::Date | Self::Temporal | Self::Null | Self::Boolean
        )
    }

    /// Word-like tokens that may name a schema object
    pub fn is_wordlike(&self) -> bool {
        matches!(
            self,
            Self::Identifier | Self::Noun | Self::Verb | Self::Adverb | Self::Unknown
        )
    }
}

/// One lexical unit of the input text
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Token {
    /// Original text as written
    pub text: String,
    pub kind: TokenKind,
    /// Byte offset into the input
    pub position: usize,
    /// Byte length in the input
    pub length: usize,
    /// Lower-cased, abbreviation-expanded, quote-stripped form
    pub normalized: String,
    pub confidence: f64,
}

impl Token {
    pub fn end(&self) -> usize {
        self.position + self.length
    }

    pub fn is(&self, normalized: &str) -> bool {
        self.normalized == normalized
    }
}
