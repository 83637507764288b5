//! Token counting

use thiserror::Error;
use tiktoken_rs::CoreBPE;

use crate::config::Engine;

/// Anything that can measure text in model tokens
pub trait TokenCounter {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Closures work as counters, which keeps tests independent of a vocabulary
impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize,
{
    fn count_tokens(&self, text: &str) -> usize {
        self(text)
    }
}

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("failed to load BPE vocabulary: {0}")]
    Load(String),
}

/// Byte-pair-encoding counter using the Codex vocabulary
pub struct BpeCounter {
    bpe: CoreBPE,
}

impl BpeCounter {
    /// Both Codex engines share the `p50k_base` vocabulary
    pub fn for_engine(engine: Engine) -> Result<Self, TokenizerError> {
        let bpe = match engine {
            Engine::CodeDavinci001 | Engine::CodeCushman001 => tiktoken_rs::p50k_base(),
        }
        .map_err(|e| TokenizerError::Load(e.to_string()))?;

        Ok(Self { bpe })
    }
}

impl TokenCounter for BpeCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bpe_counts_tokens() {
        let counter = BpeCounter::for_engine(Engine::CodeDavinci001).unwrap();

        assert_eq!(counter.count_tokens(""), 0);
        let short = counter.count_tokens("ls -la");
        let long = counter.count_tokens("ls -la\nls -la\nls -la");
        assert!(short > 0);
        assert!(long > short);
    }

    #[test]
    fn test_closure_counter() {
        let words = |s: &str| s.split_whitespace().count();
        assert_eq!(words.count_tokens("one two three"), 3);
    }
}
