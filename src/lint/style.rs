use crate::{codec::document::CODE_PLACEHOLDER, issue::Issue};

/// Abbreviations whose trailing period does not end a sentence.
const ABBREVIATIONS: [&str; 6] = ["e.g.", "i.e.", "etc.", "vs.", "cf.", "approx."];

/// Run every style check over each phrase, in phrase order.
pub fn check_phrases(phrases: &[String]) -> Vec<Issue> {
    phrases.iter().flat_map(|p| check_phrase(p)).collect()
}

pub fn check_phrase(phrase: &str) -> Vec<Issue> {
    let mut issues: Vec<Issue> = sentences(phrase)
        .into_iter()
        .filter(|sentence| begins_with_lower_case(sentence))
        .map(|sentence| Issue::PhraseBeginsWithLowerCase {
            phrase: sentence.to_string(),
        })
        .collect();
    if let Some(issue) = check_quotation_marks(phrase) {
        issues.push(issue);
    }
    issues
}

fn begins_with_lower_case(sentence: &str) -> bool {
    match sentence.chars().next() {
        Some(CODE_PLACEHOLDER) | None => false,
        Some(c) => c.is_lowercase(),
    }
}

/// Split a phrase after `.`, `!` or `?` followed by whitespace, skipping known abbreviations.
fn sentences(phrase: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = phrase.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some((next_idx, next)) = chars.peek().copied() else {
            continue;
        };
        if !next.is_whitespace() {
            continue;
        }
        let candidate = &phrase[start..idx + c.len_utf8()];
        if c == '.' && ABBREVIATIONS.iter().any(|abbr| ends_with_word(candidate, abbr)) {
            continue;
        }
        sentences.push(candidate.trim());
        start = next_idx;
    }
    sentences.push(phrase[start..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn ends_with_word(text: &str, word: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.ends_with(word)
        && lowered[..lowered.len() - word.len()]
            .chars()
            .last()
            .is_none_or(|c| !c.is_alphanumeric())
}

/// Closing mark expected for an opening mark.
fn closer_for(open: char) -> char {
    match open {
        '“' => '”',
        '‘' => '’',
        '«' => '»',
        '„' => '“',
        _ => '"',
    }
}

/// Check the nesting of quotation marks in one phrase. Reports the first problem found.
///
/// `’` doubles as the apostrophe, so it only counts as a mark when it closes an open `‘`. `“`
/// closes an open `„` and opens a span otherwise. Opening a span of the same kind directly inside
/// another one is illegal.
pub fn check_quotation_marks(phrase: &str) -> Option<Issue> {
    let mut stack: Vec<char> = Vec::new();
    for c in phrase.chars() {
        match c {
            '“' if stack.last() == Some(&'„') => {
                stack.pop();
            }
            '"' if stack.last() == Some(&'"') => {
                stack.pop();
            }
            '’' if stack.last() == Some(&'‘') => {
                stack.pop();
            }
            '’' => {}
            '“' | '‘' | '«' | '„' | '"' => {
                if stack.last() == Some(&c) {
                    stack.push(c);
                    return Some(Issue::IllegalQuotationMarks {
                        stack,
                        text: phrase.to_string(),
                    });
                }
                stack.push(c);
            }
            '”' | '»' => match stack.last() {
                Some(open) if closer_for(*open) == c => {
                    stack.pop();
                }
                _ => {
                    return Some(Issue::MismatchingQuotationMarks {
                        text: phrase.to_string(),
                    })
                }
            },
            _ => {}
        }
    }
    if stack.is_empty() {
        None
    } else {
        Some(Issue::UnclosedQuotationSpan {
            text: phrase.to_string(),
        })
    }
}
