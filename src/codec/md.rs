use pulldown_cmark::{
    CodeBlockKind, Event as MdEvent, HeadingLevel, MetadataBlockKind, Options,
    Parser as MdParser, Tag as MdTag, TagEnd as MdTagEnd,
};
use std::mem::take;
use toml::value::Table;

use crate::{
    codec::{
        document::{plain_text, Block, Document, Inline},
        SourceLoader,
    },
    error::BuildError,
};

pub use pulldown_cmark;

pub fn docweave_md_options() -> Options {
    let mut md_options = Options::empty();
    // Enabled explicitly instead of Options::all() so that output is reproducible across
    // pulldown-cmark upgrades.
    md_options.insert(Options::ENABLE_FOOTNOTES);
    md_options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    md_options.insert(Options::ENABLE_STRIKETHROUGH);
    md_options.insert(Options::ENABLE_TASKLISTS);
    md_options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    md_options.insert(Options::ENABLE_PLUSES_DELIMITED_METADATA_BLOCKS);
    md_options
}

/// Markdown source loader. Front matter (between `---` or `+++` fences) is read as TOML.
#[derive(Debug, Default, Clone)]
pub struct MdLoader;

impl SourceLoader for MdLoader {
    fn load(&self, source: &str, _syntax: &str) -> Result<Document, BuildError> {
        let mut builder = TreeBuilder::default();
        for event in MdParser::new_ext(source, docweave_md_options()) {
            builder.push(event);
        }
        builder.finish()
    }
}

#[derive(Debug)]
enum Open {
    Quote,
    List(bool),
    Item,
    Heading(u8, Option<String>),
    Paragraph,
    Emphasis,
    Strong,
    Strikethrough,
    Link(String),
    Image(String),
    CodeBlock(Option<String>),
    Metadata,
    Ignored,
}

/// Folds the flat pulldown-cmark event stream into a [Document].
///
/// `blocks` and `inlines` are stacks of the containers currently open. Text that shows up outside
/// of any inline container (tight list items) is gathered into a "loose" paragraph which is flushed
/// as soon as the next block-level event arrives.
#[derive(Debug)]
struct TreeBuilder {
    open: Vec<Open>,
    blocks: Vec<Vec<Block>>,
    items: Vec<Vec<Vec<Block>>>,
    inlines: Vec<Vec<Inline>>,
    loose: bool,
    code: String,
    front_matter: String,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        TreeBuilder {
            open: Vec::new(),
            blocks: vec![Vec::new()],
            items: Vec::new(),
            inlines: Vec::new(),
            loose: false,
            code: String::new(),
            front_matter: String::new(),
        }
    }
}

impl TreeBuilder {
    fn push(&mut self, event: MdEvent<'_>) {
        match event {
            MdEvent::Start(tag) => self.start(tag),
            MdEvent::End(tag) => self.end(tag),
            MdEvent::Text(text) => match self.open.last() {
                Some(Open::Metadata) => self.front_matter.push_str(&text),
                Some(Open::CodeBlock(_)) => self.code.push_str(&text),
                Some(Open::Ignored) => {}
                _ => self.push_inline(Inline::Text(text.to_string())),
            },
            MdEvent::Code(code) | MdEvent::InlineMath(code) => {
                self.push_inline(Inline::Code(code.to_string()))
            }
            MdEvent::DisplayMath(math) => {
                self.flush_loose();
                self.push_block(Block::CodeBlock {
                    lang: Some("math".to_string()),
                    text: math.to_string(),
                });
            }
            MdEvent::SoftBreak => self.push_inline(Inline::Text(" ".to_string())),
            MdEvent::HardBreak => self.push_inline(Inline::Break),
            MdEvent::Rule => {
                self.flush_loose();
                self.push_block(Block::Rule);
            }
            // Raw html, footnote references and task markers carry no structure we keep.
            _ => {}
        }
    }

    fn start(&mut self, tag: MdTag<'_>) {
        match tag {
            MdTag::BlockQuote(_) => {
                self.flush_loose();
                self.open.push(Open::Quote);
                self.blocks.push(Vec::new());
            }
            MdTag::List(start) => {
                self.flush_loose();
                self.open.push(Open::List(start.is_some()));
                self.items.push(Vec::new());
            }
            MdTag::Item => {
                self.flush_loose();
                self.open.push(Open::Item);
                self.blocks.push(Vec::new());
            }
            MdTag::Heading { level, id, .. } => {
                self.flush_loose();
                self.open
                    .push(Open::Heading(heading_level(level), id.map(|i| i.to_string())));
                self.inlines.push(Vec::new());
            }
            MdTag::Paragraph => {
                self.flush_loose();
                self.open.push(Open::Paragraph);
                self.inlines.push(Vec::new());
            }
            MdTag::CodeBlock(kind) => {
                self.flush_loose();
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                    _ => None,
                };
                self.code.clear();
                self.open.push(Open::CodeBlock(lang));
            }
            MdTag::Emphasis => self.open_inline(Open::Emphasis),
            MdTag::Strong => self.open_inline(Open::Strong),
            MdTag::Strikethrough => self.open_inline(Open::Strikethrough),
            MdTag::Link { dest_url, .. } => self.open_inline(Open::Link(dest_url.to_string())),
            MdTag::Image { dest_url, .. } => self.open_inline(Open::Image(dest_url.to_string())),
            MdTag::MetadataBlock(MetadataBlockKind::YamlStyle)
            | MdTag::MetadataBlock(MetadataBlockKind::PlusesStyle) => {
                self.open.push(Open::Metadata)
            }
            _ => self.open.push(Open::Ignored),
        }
    }

    fn end(&mut self, tag: MdTagEnd) {
        let Some(open) = self.open.pop() else {
            tracing::warn!("[MdLoader] Unbalanced end tag {:?}", tag);
            return;
        };
        match open {
            Open::Quote => {
                self.flush_loose();
                let children = self.blocks.pop().unwrap_or_default();
                self.push_block(Block::Quote(children));
            }
            Open::List(ordered) => {
                let items = self.items.pop().unwrap_or_default();
                self.push_block(Block::List { ordered, items });
            }
            Open::Item => {
                self.flush_loose();
                let item = self.blocks.pop().unwrap_or_default();
                if let Some(items) = self.items.last_mut() {
                    items.push(item);
                }
            }
            Open::Heading(level, id) => {
                let content = self.inlines.pop().unwrap_or_default();
                self.push_block(Block::Heading { level, id, content });
            }
            Open::Paragraph => {
                let content = self.inlines.pop().unwrap_or_default();
                self.push_block(Block::Paragraph(content));
            }
            Open::CodeBlock(lang) => {
                let text = take(&mut self.code);
                self.push_block(Block::CodeBlock { lang, text });
            }
            Open::Emphasis => {
                let children = self.inlines.pop().unwrap_or_default();
                self.push_inline(Inline::Emphasis(children));
            }
            Open::Strong => {
                let children = self.inlines.pop().unwrap_or_default();
                self.push_inline(Inline::Strong(children));
            }
            Open::Strikethrough => {
                // Struck text is kept as plain content.
                let children = self.inlines.pop().unwrap_or_default();
                for child in children {
                    self.push_inline(child);
                }
            }
            Open::Link(href) => {
                let content = self.inlines.pop().unwrap_or_default();
                self.push_inline(Inline::Link { href, content });
            }
            Open::Image(src) => {
                let alt = plain_text(&self.inlines.pop().unwrap_or_default());
                self.push_inline(Inline::Image { src, alt });
            }
            Open::Metadata | Open::Ignored => {}
        }
    }

    fn open_inline(&mut self, open: Open) {
        self.ensure_inline();
        self.open.push(open);
        self.inlines.push(Vec::new());
    }

    fn ensure_inline(&mut self) {
        if self.inlines.is_empty() {
            self.inlines.push(Vec::new());
            self.loose = true;
        }
    }

    fn push_inline(&mut self, inline: Inline) {
        self.ensure_inline();
        if let Some(top) = self.inlines.last_mut() {
            top.push(inline);
        }
    }

    fn push_block(&mut self, block: Block) {
        if let Some(top) = self.blocks.last_mut() {
            top.push(block);
        }
    }

    fn flush_loose(&mut self) {
        if self.loose {
            self.loose = false;
            let content = self.inlines.pop().unwrap_or_default();
            if !content.is_empty() {
                self.push_block(Block::Paragraph(content));
            }
        }
    }

    fn finish(mut self) -> Result<Document, BuildError> {
        self.flush_loose();
        let front_matter = if self.front_matter.trim().is_empty() {
            Table::new()
        } else {
            toml::from_str::<Table>(&self.front_matter)
                .map_err(|e| BuildError::Parse(format!("invalid front matter: {e}")))?
        };
        let blocks = self.blocks.into_iter().next().unwrap_or_default();
        Ok(Document {
            front_matter,
            blocks,
        })
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
