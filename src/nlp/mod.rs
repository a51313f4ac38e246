//! Natural-language front end: tokenizer, entity recognizer, intent classifier

pub mod classifier;
pub mod recognizer;
pub mod token;
pub mod tokenizer;

pub use classifier::{
    AggregationComponent, ClassifiedIntent, ColumnMention, Complexity, ConditionComponent, IntentClassifier,
    IntentScore, IntentType, JoinComponent, OrderComponent, QueryComponents, QueryType,
};
pub use recognizer::{Entity, EntityKind, EntityRecognizer};
pub use token::{Token, TokenKind};
pub use tokenizer::Tokenizer;
