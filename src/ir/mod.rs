//! Intermediate representation and the strategies that build it

pub mod builder;
pub mod lowering;
pub mod model;
pub mod strategy;

pub use builder::HeuristicIrBuilder;
pub use lowering::{Analysis, ClassifierIrBuilder};
pub use model::*;
pub use strategy::{BuildOptions, DelegatingStrategy, GenerationClient, IrStrategy};
