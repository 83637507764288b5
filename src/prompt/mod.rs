//! Prompt construction
//!
//! The model has a fixed context window, so every prompt is cut down to a
//! token budget by dropping its oldest lines.

pub mod tokenizer;
pub mod trim;

pub use tokenizer::{BpeCounter, TokenCounter, TokenizerError};
pub use trim::trim_to_budget;
