//! Token counting for context budgeting
//!
//! Counting and truncation share one offset computation, so the builder
//! never disagrees with itself about how much space is left.

use super::{ContextError, Result};
use std::path::Path;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer};

/// Splits text into tokens addressed by byte offsets
pub trait TokenCounter: Send + Sync {
    /// Byte spans of every token in `text`, in order
    fn token_offsets(&self, text: &str) -> Result<Vec<(usize, usize)>>;

    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.token_offsets(text)?.len())
    }

    /// Longest prefix of `text` made of at most `max_tokens` whole tokens,
    /// together with the number of tokens it holds
    fn truncate<'a>(&self, text: &'a str, max_tokens: usize) -> Result<(&'a str, usize)> {
        let offsets = self.token_offsets(text)?;
        if offsets.len() <= max_tokens {
            return Ok((text, offsets.len()));
        }
        if max_tokens == 0 {
            return Ok(("", 0));
        }

        let mut end = offsets[..max_tokens]
            .iter()
            .map(|&(_, end)| end)
            .max()
            .unwrap_or(0)
            .min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        Ok((&text[..end], max_tokens))
    }
}

/// Word and punctuation counter built on the `Whitespace` pre-tokenizer.
///
/// Needs no vocabulary file. Runs of word characters and runs of
/// punctuation each count as one token, which tracks BPE counts closely
/// enough for budgeting prose.
#[derive(Default)]
pub struct WordTokenCounter {
    pre_tokenizer: Whitespace,
}

impl WordTokenCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCounter for WordTokenCounter {
    fn token_offsets(&self, text: &str) -> Result<Vec<(usize, usize)>> {
        let mut pretokenized = PreTokenizedString::from(text);
        self.pre_tokenizer
            .pre_tokenize(&mut pretokenized)
            .map_err(|e| ContextError::Tokenizer(e.to_string()))?;

        Ok(pretokenized
            .get_splits(OffsetReferential::Original, OffsetType::Byte)
            .into_iter()
            .map(|(_, offsets, _)| offsets)
            .collect())
    }
}

/// Counter backed by a `tokenizer.json` file, for counts that match the
/// chat model's own tokenizer
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            ContextError::Tokenizer(format!("failed to load {}: {}", path.display(), e))
        })?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn token_offsets(&self, text: &str) -> Result<Vec<(usize, usize)>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ContextError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_offsets().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_counter_counts_words_and_punctuation() {
        let counter = WordTokenCounter::new();

        assert_eq!(counter.count("Iron removal: 0.3 mg/L").unwrap(), 9);
        assert_eq!(counter.count("").unwrap(), 0);
        assert_eq!(counter.count("   \n\t ").unwrap(), 0);
    }

    #[test]
    fn test_truncate_keeps_whole_leading_tokens() {
        let counter = WordTokenCounter::new();
        let text = "Backwash the multimedia filter weekly";

        let (prefix, taken) = counter.truncate(text, 3).unwrap();

        assert_eq!(prefix, "Backwash the multimedia");
        assert_eq!(taken, 3);
        assert_eq!(counter.count(prefix).unwrap(), 3);
    }

    #[test]
    fn test_truncate_no_op_when_text_fits() {
        let counter = WordTokenCounter::new();

        let (prefix, taken) = counter.truncate("two words", 10).unwrap();

        assert_eq!(prefix, "two words");
        assert_eq!(taken, 2);
    }

    #[test]
    fn test_truncate_to_zero() {
        let counter = WordTokenCounter::new();

        assert_eq!(counter.truncate("anything", 0).unwrap(), ("", 0));
    }

    #[test]
    fn test_truncate_multibyte() {
        let counter = WordTokenCounter::new();

        let (prefix, taken) = counter.truncate("pH ≥ 6.5 before the membrane", 2).unwrap();

        assert_eq!(prefix, "pH ≥");
        assert_eq!(taken, 2);
    }

    #[test]
    fn test_hf_counter_missing_file() {
        let result = HfTokenCounter::from_file(Path::new("/nonexistent/tokenizer.json"));

        assert!(matches!(result, Err(ContextError::Tokenizer(_))));
    }
}
