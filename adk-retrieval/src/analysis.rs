//! Lexical analysis shared by BM25 scoring and keyword extraction.
//!
//! [`TextAnalyzer`] bundles the stopword list and the stemmer. It is built
//! once by the caller and shared behind an `Arc`, so every component that
//! tokenizes text agrees on the same vocabulary.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

/// English stopwords (the NLTK list).
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

/// Stopword filtering, word tokenization, and stemming.
pub struct TextAnalyzer {
    stopwords: HashSet<String>,
    stemmer: Stemmer,
}

impl fmt::Debug for TextAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextAnalyzer").field("stopwords", &self.stopwords.len()).finish()
    }
}

impl Default for TextAnalyzer {
    fn default() -> Self {
        Self::english()
    }
}

impl TextAnalyzer {
    /// English stopwords with the Porter-family English stemmer.
    pub fn english() -> Self {
        Self::new(ENGLISH_STOPWORDS.iter().copied())
    }

    /// Custom stopwords with the English stemmer.
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stopwords: stopwords.into_iter().map(|s| s.into().to_lowercase()).collect(),
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Whether `word` (already lowercased) is a stopword.
    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    /// Lowercased word tokens (`\w+` runs).
    pub fn words(&self, text: &str) -> Vec<String> {
        word_tokens(text).map(str::to_lowercase).collect()
    }

    /// Lowercased word tokens with stopwords removed.
    pub fn content_words(&self, text: &str) -> Vec<String> {
        word_tokens(text)
            .map(str::to_lowercase)
            .filter(|w| !self.is_stopword(w))
            .collect()
    }

    /// Stem a single lowercased word.
    pub fn stem(&self, word: &str) -> String {
        self.stemmer.stem(word).into_owned()
    }

    /// Stopword-filtered, stemmed terms in document order. Used for BM25.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.content_words(text).iter().map(|w| self.stem(w)).collect()
    }

    /// Frequency-ranked content words, most frequent first.
    ///
    /// Ties keep first-occurrence order. `max_keywords` of `None` keeps all.
    pub fn simple_keywords(&self, text: &str, max_keywords: Option<usize>) -> Vec<String> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, word) in self.content_words(text).into_iter().enumerate() {
            counts.entry(word).or_insert((0, position)).0 += 1;
        }
        let mut ranked: Vec<(String, usize, usize)> =
            counts.into_iter().map(|(w, (count, first))| (w, count, first)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked
            .into_iter()
            .take(max_keywords.unwrap_or(usize::MAX))
            .map(|(word, _, _)| word)
            .collect()
    }

    /// RAKE keyphrases, best first.
    ///
    /// Candidate phrases are maximal runs of non-stopwords inside a sentence
    /// fragment. A word scores `degree / frequency`; a phrase scores the sum of
    /// its words.
    pub fn rake_keywords(&self, text: &str, max_keywords: Option<usize>) -> Vec<String> {
        let mut phrases: Vec<Vec<String>> = Vec::new();
        for fragment in text.split(is_phrase_delimiter) {
            let mut current: Vec<String> = Vec::new();
            for word in word_tokens(fragment).map(str::to_lowercase) {
                if self.is_stopword(&word) {
                    if !current.is_empty() {
                        phrases.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(word);
                }
            }
            if !current.is_empty() {
                phrases.push(current);
            }
        }

        let mut frequency: HashMap<&str, f32> = HashMap::new();
        let mut degree: HashMap<&str, f32> = HashMap::new();
        for phrase in &phrases {
            for word in phrase {
                *frequency.entry(word.as_str()).or_default() += 1.0;
                *degree.entry(word.as_str()).or_default() += phrase.len() as f32;
            }
        }

        let mut seen = HashSet::new();
        let mut scored: Vec<(String, f32, usize)> = Vec::new();
        for (position, phrase) in phrases.iter().enumerate() {
            let joined = phrase.join(" ");
            if !seen.insert(joined.clone()) {
                continue;
            }
            let score = phrase.iter().map(|w| degree[w.as_str()] / frequency[w.as_str()]).sum();
            scored.push((joined, score, position));
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
        scored
            .into_iter()
            .take(max_keywords.unwrap_or(usize::MAX))
            .map(|(phrase, _, _)| phrase)
            .collect()
    }

    /// Add the non-stopword sub-tokens of every multi-word keyword.
    pub fn expand_with_subtokens<I>(&self, keywords: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut expanded = BTreeSet::new();
        for keyword in keywords {
            let subtokens = self.words(&keyword);
            if subtokens.len() > 1 {
                expanded.extend(subtokens.into_iter().filter(|w| !self.is_stopword(w)));
            }
            expanded.insert(keyword);
        }
        expanded
    }
}

/// Parse a model response of the form `<start_token> a, b, c` into keywords.
///
/// Keywords are trimmed and lowercased; empty entries are dropped.
pub fn parse_keywords_response(response: &str, start_token: &str) -> Vec<String> {
    let response = response.trim();
    let body = response.strip_prefix(start_token).unwrap_or(response);
    body.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Unicode word runs. `None` only if the pattern fails to compile.
static WORD_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\w+").ok());

fn word_tokens(text: &str) -> impl Iterator<Item = &str> {
    WORD_RE.iter().flat_map(move |re| re.find_iter(text)).map(|m| m.as_str())
}

fn is_phrase_delimiter(c: char) -> bool {
    matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '\n' | '(' | ')' | '[' | ']' | '"' | '。')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_words_drop_stopwords_and_lowercase() {
        let analyzer = TextAnalyzer::english();
        assert_eq!(analyzer.content_words("The Cat and THE hat"), vec!["cat", "hat"]);
    }

    #[test]
    fn words_are_unicode_word_runs() {
        let analyzer = TextAnalyzer::english();
        assert_eq!(
            analyzer.words("Don't re-index snake_case, café 5!"),
            vec!["don", "t", "re", "index", "snake_case", "café", "5"]
        );
        assert_eq!(analyzer.content_words("It's the user's query"), vec!["user", "query"]);
        assert!(WORD_RE.is_some());
    }

    #[test]
    fn terms_are_stemmed() {
        let analyzer = TextAnalyzer::english();
        assert_eq!(analyzer.terms("running runs"), vec!["run", "run"]);
    }

    #[test]
    fn simple_keywords_rank_by_frequency() {
        let analyzer = TextAnalyzer::english();
        let keywords = analyzer.simple_keywords("rust tokio rust async tokio rust", Some(2));
        assert_eq!(keywords, vec!["rust", "tokio"]);
    }

    #[test]
    fn rake_prefers_longer_phrases() {
        let analyzer = TextAnalyzer::english();
        let keywords =
            analyzer.rake_keywords("Vector databases store embeddings. Search is fast.", None);
        assert_eq!(keywords[0], "vector databases store embeddings");
        assert!(keywords.contains(&"search".to_string()));
    }

    #[test]
    fn expansion_adds_subtokens() {
        let analyzer = TextAnalyzer::english();
        let expanded = analyzer.expand_with_subtokens(vec!["state of the art".to_string()]);
        assert!(expanded.contains("state of the art"));
        assert!(expanded.contains("state"));
        assert!(expanded.contains("art"));
        assert!(!expanded.contains("the"));
    }

    #[test]
    fn parses_keyword_response() {
        let parsed = parse_keywords_response("KEYWORDS: Rust, Async IO ,, tokio", "KEYWORDS:");
        assert_eq!(parsed, vec!["rust", "async io", "tokio"]);
    }
}
