//! HTML serialization of a [Document] body.
//!
//! The writer knows nothing about pages or volumes. Callers hand it a link rewriting function and
//! the decoration (element id and optional section number) of every heading in document order.

use std::fmt::Write;

use crate::{
    codec::document::{Block, Inline},
    error::BuildError,
};

/// Element id and section number assigned to one heading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadingDecor {
    pub id: String,
    pub number: Option<String>,
}

pub struct HtmlWriter<'a> {
    headings: &'a [HeadingDecor],
    link: &'a dyn Fn(&str) -> String,
    heading_idx: usize,
    out: String,
}

impl<'a> HtmlWriter<'a> {
    pub fn new(headings: &'a [HeadingDecor], link: &'a dyn Fn(&str) -> String) -> HtmlWriter<'a> {
        HtmlWriter {
            headings,
            link,
            heading_idx: 0,
            out: String::new(),
        }
    }

    pub fn render(mut self, blocks: &[Block]) -> Result<String, BuildError> {
        self.blocks(blocks)?;
        Ok(self.out)
    }

    fn blocks(&mut self, blocks: &[Block]) -> Result<(), BuildError> {
        for block in blocks {
            self.block(block)?;
        }
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<(), BuildError> {
        match block {
            Block::Heading { level, content, .. } => {
                let decor = self.headings.get(self.heading_idx).cloned().unwrap_or_default();
                self.heading_idx += 1;
                let level = (*level).clamp(1, 6);
                if decor.id.is_empty() {
                    write!(self.out, "<h{level}>")?;
                } else {
                    write!(self.out, "<h{level} id=\"{}\">", escape(&decor.id))?;
                }
                if let Some(number) = decor.number {
                    write!(self.out, "<span class=\"number\">{}</span> ", escape(&number))?;
                }
                self.inlines(content)?;
                writeln!(self.out, "</h{level}>")?;
            }
            Block::Paragraph(content) => {
                self.out.push_str("<p>");
                self.inlines(content)?;
                self.out.push_str("</p>\n");
            }
            Block::CodeBlock { lang, text } => {
                match lang {
                    Some(lang) => write!(
                        self.out,
                        "<pre><code class=\"language-{}\">",
                        escape(lang)
                    )?,
                    None => self.out.push_str("<pre><code>"),
                }
                self.out.push_str(&escape(text));
                self.out.push_str("</code></pre>\n");
            }
            Block::List { ordered, items } => {
                let tag = if *ordered { "ol" } else { "ul" };
                writeln!(self.out, "<{tag}>")?;
                for item in items {
                    self.out.push_str("<li>");
                    self.blocks(item)?;
                    self.out.push_str("</li>\n");
                }
                writeln!(self.out, "</{tag}>")?;
            }
            Block::Quote(children) => {
                self.out.push_str("<blockquote>\n");
                self.blocks(children)?;
                self.out.push_str("</blockquote>\n");
            }
            Block::Rule => self.out.push_str("<hr />\n"),
        }
        Ok(())
    }

    fn inlines(&mut self, inlines: &[Inline]) -> Result<(), BuildError> {
        for inline in inlines {
            match inline {
                Inline::Text(text) => self.out.push_str(&escape(text)),
                Inline::Code(code) => write!(self.out, "<code>{}</code>", escape(code))?,
                Inline::Emphasis(children) => {
                    self.out.push_str("<em>");
                    self.inlines(children)?;
                    self.out.push_str("</em>");
                }
                Inline::Strong(children) => {
                    self.out.push_str("<strong>");
                    self.inlines(children)?;
                    self.out.push_str("</strong>");
                }
                Inline::Link { href, content } => {
                    let target = (self.link)(href);
                    write!(self.out, "<a href=\"{}\">", escape(&target))?;
                    self.inlines(content)?;
                    self.out.push_str("</a>");
                }
                Inline::Image { src, alt } => write!(
                    self.out,
                    "<img src=\"{}\" alt=\"{}\" />",
                    escape(src),
                    escape(alt)
                )?,
                Inline::Break => self.out.push_str("<br />\n"),
            }
        }
        Ok(())
    }
}

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
