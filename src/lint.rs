//! Text checks run over a page's prose: spelling against a word list and typographic style.
//!
//! Both work on the plain-text phrases extracted by [crate::codec::Document::phrases], so inline
//! code never reaches them.

pub mod spell;
pub mod style;

pub use spell::{SpellChecker, WordList};
pub use style::{check_phrase, check_phrases};
