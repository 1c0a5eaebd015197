//! Token filtering for raw OCR output.
//!
//! OCR over arbitrary images produces plenty of line noise. The filter
//! keeps a token only when it looks like a real word: long digit runs,
//! the two single-letter English words, or a dictionary hit.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;

/// An English wordlist, one word per line (the usual
/// `/usr/share/dict/words` layout). Lookups are case-insensitive.
#[derive(Debug, Default)]
pub struct Dictionary {
    words: HashSet<String>,
}

impl Dictionary {
    pub fn load(path: &Path) -> std::io::Result<Dictionary> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Dictionary::from_words(raw.lines()))
    }

    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Dictionary {
        Dictionary {
            words: words
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn check(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

pub struct WordFilter {
    dictionary: Arc<Dictionary>,
    word: Regex,
    number: Regex,
}

impl WordFilter {
    pub fn new(dictionary: Arc<Dictionary>) -> WordFilter {
        WordFilter {
            dictionary,
            word: Regex::new(r"\b\w+\b").expect("static regex"),
            number: Regex::new(r"^\d{3,}$").expect("static regex"),
        }
    }

    /// Drop every token that does not look like a word. Kept tokens are
    /// digit runs of length >= 3, a lone `a` or `i`, and dictionary words.
    pub fn remove_non_words(&self, blob: &str) -> String {
        let mut kept = String::new();

        for token in self.word.find_iter(blob) {
            let token = token.as_str();

            let keep = if self.number.is_match(token) {
                true
            } else if token.len() == 1 {
                matches!(token, "a" | "i")
            } else {
                self.dictionary.check(token)
            };

            if keep {
                if !kept.is_empty() {
                    kept.push(' ');
                }
                kept.push_str(token);
            }
        }

        kept
    }

    /// Word count for winner selection. Single-character tokens are not
    /// counted; sparse OCR output is dominated by them.
    pub fn word_count(&self, blob: &str) -> usize {
        self.word
            .find_iter(blob)
            .filter(|token| token.as_str().len() > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> WordFilter {
        WordFilter::new(Arc::new(Dictionary::from_words([
            "hello", "world", "cat", "image",
        ])))
    }

    #[test]
    fn keeps_dictionary_words_and_drops_noise() {
        let f = filter();
        assert_eq!(
            f.remove_non_words("hello xqzt world ~~ cat"),
            "hello world cat"
        );
    }

    #[test]
    fn keeps_long_digit_runs() {
        let f = filter();
        assert_eq!(f.remove_non_words("call 5551234 x 12"), "5551234");
    }

    #[test]
    fn keeps_only_real_single_letter_words() {
        let f = filter();
        assert_eq!(f.remove_non_words("a b c i j"), "a i");
    }

    #[test]
    fn dictionary_lookup_is_case_insensitive() {
        let f = filter();
        assert_eq!(f.remove_non_words("HELLO World"), "HELLO World");
    }

    #[test]
    fn word_count_ignores_single_characters() {
        let f = filter();
        assert_eq!(f.word_count("a i hello world"), 2);
        assert_eq!(f.word_count(""), 0);
    }

    #[test]
    fn empty_dictionary_still_keeps_numbers() {
        let f = WordFilter::new(Arc::new(Dictionary::default()));
        assert_eq!(f.remove_non_words("hello 123456"), "123456");
    }
}
