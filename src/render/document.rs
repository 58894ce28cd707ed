use std::{fmt::Write, path::PathBuf};

use crate::{
    codec::html::escape,
    error::BuildError,
    project::Volume,
    render::{html_page, Artifact, Backend, RenderPage},
};

/// One combined HTML document per volume, the input a PDF or office converter consumes.
///
/// Pages are concatenated in document order as `<section id="<page-id>">` elements. Their bodies
/// are the fragment-linked content rendered during processing, so every cross reference is an
/// in-document `#<id>` link.
#[derive(Debug, Clone, Default)]
pub struct DocumentBackend;

impl Backend for DocumentBackend {
    fn name(&self) -> &str {
        "document"
    }

    fn render(&self, volume: &Volume, pages: &[RenderPage]) -> Result<Vec<Artifact>, BuildError> {
        let mut body = String::new();
        for page in pages {
            let content = page.record.content.as_deref().ok_or_else(|| {
                BuildError::Render(format!("{} has no rendered content", page.page.path))
            })?;
            writeln!(
                body,
                "<section id=\"{}\" class=\"level-{}\">",
                escape(page.page.id().as_str()),
                page.page.level
            )?;
            body.push_str(content);
            body.push_str("</section>\n");
        }
        let title = pages
            .first()
            .map(|p| p.title())
            .unwrap_or_else(|| volume.name.clone());
        Ok(vec![Artifact {
            path: PathBuf::from(format!("{}.html", volume.name)),
            bytes: html_page(&title, &body).into_bytes(),
        }])
    }
}
