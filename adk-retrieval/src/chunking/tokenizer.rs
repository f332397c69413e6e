//! Token counting used to enforce chunk budgets.

/// Counts tokens in a piece of text.
///
/// Splitters only ever need a count, never the token ids, so any function
/// `Fn(&str) -> usize` can be injected (for example a BPE encoder's
/// `encode(text).len()`).
pub trait Tokenizer: Send + Sync {
    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize;
}

impl<F> Tokenizer for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        self(text)
    }
}

/// A dependency-free approximation of a subword tokenizer.
///
/// Every run of alphanumeric characters is one token and every other
/// non-whitespace character is one token. Whitespace is free, so any
/// non-whitespace text costs at least one token.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleTokenizer;

impl Tokenizer for SimpleTokenizer {
    fn count(&self, text: &str) -> usize {
        let mut count = 0;
        let mut in_word = false;
        for c in text.chars() {
            if c.is_alphanumeric() {
                if !in_word {
                    count += 1;
                    in_word = true;
                }
            } else {
                in_word = false;
                if !c.is_whitespace() {
                    count += 1;
                }
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_and_punctuation() {
        let tokenizer = SimpleTokenizer;
        assert_eq!(tokenizer.count("Hello, world!"), 4);
        assert_eq!(tokenizer.count("   \n"), 0);
        assert_eq!(tokenizer.count(""), 0);
    }

    #[test]
    fn closures_are_tokenizers() {
        let chars = |text: &str| text.chars().count();
        assert_eq!(Tokenizer::count(&chars, "abc"), 3);
    }
}
