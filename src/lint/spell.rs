use once_cell::sync::Lazy;
use regex::Regex;
use std::{collections::BTreeSet, collections::HashSet, path::Path};
use unicode_normalization::UnicodeNormalization;

use crate::error::BuildError;

static WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{M}\p{N}]+(?:['’][\p{L}\p{M}\p{N}]+)*").expect("word pattern is valid")
});

/// Spell-check backend. Given a page's phrases, returns the words it considers misspelled.
pub trait SpellChecker: Send + Sync {
    fn misspelled(&self, phrases: &[String]) -> Vec<String>;
}

/// A plain word list: one word per line, `#` starts a comment.
///
/// Words are compared after NFC normalization and lowercasing. Tokens containing digits are never
/// reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordList {
    words: HashSet<String>,
}

impl WordList {
    pub fn parse(content: &str) -> WordList {
        let words = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default().trim())
            .filter(|word| !word.is_empty())
            .map(normalize)
            .collect();
        WordList { words }
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<WordList, BuildError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let list = WordList::parse(&content);
        tracing::debug!(
            "[WordList] Loaded {} word(s) from {:?}",
            list.len(),
            path.as_ref()
        );
        Ok(list)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&normalize(word))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl SpellChecker for WordList {
    fn misspelled(&self, phrases: &[String]) -> Vec<String> {
        let mut unknown = BTreeSet::new();
        for phrase in phrases {
            for token in WORD.find_iter(phrase) {
                let word = token.as_str();
                if word.chars().any(|c| c.is_numeric()) {
                    continue;
                }
                if !self.contains(word) {
                    unknown.insert(word.to_string());
                }
            }
        }
        unknown.into_iter().collect()
    }
}

fn normalize(word: &str) -> String {
    word.nfc().collect::<String>().replace('’', "'").to_lowercase()
}
