//! Authoring diagnostics attached to pages.
//!
//! Issues are immutable values: two issues of the same kind with the same payload are equal, and
//! the derived ordering gives reports a deterministic order. Display messages may shorten long text
//! payloads, but the stored payload is never truncated.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Upper bound for the lower-case phrase message.
pub const PHRASE_MESSAGE_WIDTH: usize = 79;
/// Upper bound for the quotation-mark messages.
pub const QUOTATION_MESSAGE_WIDTH: usize = 72;

const ELLIPSIS: char = '…';

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Issue {
    BadImage { target: String },
    BadLink { target: String },
    AmbiguousLink { target: String, anchor: String },
    MisspelledWords { page: String, words: Vec<String> },
    PhraseBeginsWithLowerCase { phrase: String },
    MismatchingQuotationMarks { text: String },
    UnclosedQuotationSpan { text: String },
    IllegalQuotationMarks { stack: Vec<char>, text: String },
}

impl Issue {
    pub fn kind(&self) -> &'static str {
        match self {
            Issue::BadImage { .. } => "BadImage",
            Issue::BadLink { .. } => "BadLink",
            Issue::AmbiguousLink { .. } => "AmbiguousLink",
            Issue::MisspelledWords { .. } => "MisspelledWords",
            Issue::PhraseBeginsWithLowerCase { .. } => "PhraseBeginsWithLowerCase",
            Issue::MismatchingQuotationMarks { .. } => "MismatchingQuotationMarks",
            Issue::UnclosedQuotationSpan { .. } => "UnclosedQuotationSpan",
            Issue::IllegalQuotationMarks { .. } => "IllegalQuotationMarks",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Issue::BadImage { target } => format!("Image not found: {target}"),
            Issue::BadLink { target } => format!("Bad link: {target}"),
            Issue::AmbiguousLink { target, anchor } => {
                format!("Ambiguous link: {target}#{anchor}")
            }
            Issue::MisspelledWords { words, .. } => {
                format!("Misspelled words: {}", words.join(", "))
            }
            Issue::PhraseBeginsWithLowerCase { phrase } => shorten(
                "Phrase begins with lower case: ",
                phrase,
                PHRASE_MESSAGE_WIDTH,
            ),
            Issue::MismatchingQuotationMarks { text } => {
                shorten("Mismatching quotation marks: ", text, QUOTATION_MESSAGE_WIDTH)
            }
            Issue::UnclosedQuotationSpan { text } => {
                shorten("Unclosed quotation span: ", text, QUOTATION_MESSAGE_WIDTH)
            }
            Issue::IllegalQuotationMarks { stack, text } => {
                let nesting = stack.iter().collect::<String>();
                let prefix = format!("Illegal quotation marks {nesting}: ");
                shorten(&prefix, text, QUOTATION_MESSAGE_WIDTH.max(prefix.chars().count() + 1))
            }
        }
    }
}

impl Display for Issue {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Render `prefix` followed by `text`, cutting `text` with an ellipsis so the whole message stays
/// within `width` characters. Whitespace runs are collapsed first.
pub fn shorten(prefix: &str, text: &str, width: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let budget = width.saturating_sub(prefix.chars().count());
    if collapsed.chars().count() <= budget {
        return format!("{prefix}{collapsed}");
    }
    let kept: String = collapsed
        .chars()
        .take(budget.saturating_sub(1))
        .collect::<String>()
        .trim_end()
        .to_string();
    format!("{prefix}{kept}{ELLIPSIS}")
}
