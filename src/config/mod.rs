/// Configuration management
pub mod pipeline;

pub use pipeline::*;
