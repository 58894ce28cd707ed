//! The structural document tree produced by source loaders.

use serde::{Deserialize, Serialize};
use toml::value::Table;

/// Placeholder substituted for inline code when extracting prose, so that text checks never see
/// code as the start of a sentence.
pub const CODE_PLACEHOLDER: char = '\u{FFFC}';

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub front_matter: Table,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Block {
    Heading {
        level: u8,
        /// Explicit `{#id}` attribute, if the source carried one.
        id: Option<String>,
        content: Vec<Inline>,
    },
    Paragraph(Vec<Inline>),
    CodeBlock {
        lang: Option<String>,
        text: String,
    },
    List {
        ordered: bool,
        items: Vec<Vec<Block>>,
    },
    Quote(Vec<Block>),
    Rule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inline {
    Text(String),
    Code(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    Link { href: String, content: Vec<Inline> },
    Image { src: String, alt: String },
    Break,
}

/// A heading as seen by anchor collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingRef<'a> {
    pub level: u8,
    pub id: Option<&'a str>,
    pub text: String,
}

impl Document {
    /// The `title` front-matter key, or the text of the first heading.
    pub fn title(&self) -> Option<String> {
        if let Some(title) = self.front_matter.get("title").and_then(|t| t.as_str()) {
            return Some(title.to_string());
        }
        self.headings().into_iter().next().map(|h| h.text)
    }

    /// Every heading in document order, including headings nested in quotes and lists.
    pub fn headings(&self) -> Vec<HeadingRef<'_>> {
        let mut headings = Vec::new();
        visit_blocks(&self.blocks, &mut |block| {
            if let Block::Heading { level, id, content } = block {
                headings.push(HeadingRef {
                    level: *level,
                    id: id.as_deref(),
                    text: plain_text(content),
                });
            }
        });
        headings
    }

    /// Every link destination in document order.
    pub fn links(&self) -> Vec<&str> {
        let mut links = Vec::new();
        self.visit_inlines(&mut |inline| {
            if let Inline::Link { href, .. } = inline {
                links.push(href.as_str());
            }
        });
        links
    }

    /// Every image source in document order.
    pub fn images(&self) -> Vec<&str> {
        let mut images = Vec::new();
        self.visit_inlines(&mut |inline| {
            if let Inline::Image { src, .. } = inline {
                images.push(src.as_str());
            }
        });
        images
    }

    /// The prose of every heading, paragraph and list item, one entry per block. Code blocks are
    /// skipped and inline code is replaced with [CODE_PLACEHOLDER].
    pub fn phrases(&self) -> Vec<String> {
        let mut phrases = Vec::new();
        visit_blocks(&self.blocks, &mut |block| match block {
            Block::Heading { content, .. } | Block::Paragraph(content) => {
                let text = prose_text(content);
                if !text.trim().is_empty() {
                    phrases.push(text);
                }
            }
            _ => {}
        });
        phrases
    }

    fn visit_inlines<'a>(&'a self, f: &mut impl FnMut(&'a Inline)) {
        visit_blocks(&self.blocks, &mut |block| match block {
            Block::Heading { content, .. } | Block::Paragraph(content) => {
                visit_inline_list(content, f)
            }
            _ => {}
        });
    }
}

fn visit_blocks<'a>(blocks: &'a [Block], f: &mut impl FnMut(&'a Block)) {
    for block in blocks {
        f(block);
        match block {
            Block::List { items, .. } => {
                for item in items {
                    visit_blocks(item, f);
                }
            }
            Block::Quote(children) => visit_blocks(children, f),
            _ => {}
        }
    }
}

fn visit_inline_list<'a>(inlines: &'a [Inline], f: &mut impl FnMut(&'a Inline)) {
    for inline in inlines {
        f(inline);
        match inline {
            Inline::Emphasis(children) | Inline::Strong(children) => visit_inline_list(children, f),
            Inline::Link { content, .. } => visit_inline_list(content, f),
            _ => {}
        }
    }
}

/// Concatenated text of an inline sequence, code included verbatim.
pub fn plain_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    collect_text(inlines, &mut out, false);
    out.trim().to_string()
}

fn prose_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    collect_text(inlines, &mut out, true);
    out.trim().to_string()
}

fn collect_text(inlines: &[Inline], out: &mut String, mask_code: bool) {
    for inline in inlines {
        match inline {
            Inline::Text(text) => out.push_str(text),
            Inline::Code(code) => {
                if mask_code {
                    out.push(CODE_PLACEHOLDER);
                } else {
                    out.push_str(code);
                }
            }
            Inline::Emphasis(children) | Inline::Strong(children) => {
                collect_text(children, out, mask_code)
            }
            Inline::Link { content, .. } => collect_text(content, out, mask_code),
            Inline::Image { alt, .. } => out.push_str(alt),
            Inline::Break => out.push(' '),
        }
    }
}
