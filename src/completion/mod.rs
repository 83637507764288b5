//! Completion service integration
//!
//! This module provides the client for the text completion API that
//! suggests the next console command, and the `Completer` trait the session
//! loop is written against.

pub mod client;

// Re-export public types from the client module
pub use client::{
    Choice, Completer, CompletionClient, CompletionError, CompletionRequest, CompletionResponse,
    Sampling, DEFAULT_API_BASE, MAX_COMPLETION_TOKENS,
};
