use std::path::PathBuf;

use crate::{
    codec::{
        href::{parent_dir, relative_path},
        html::HtmlWriter,
    },
    error::BuildError,
    project::Volume,
    render::{html_page, Artifact, Backend, RenderPage},
};

/// One HTML file per page, mirroring the source tree.
///
/// The primary volume is written at the output root, every other volume under `<name>/`. Links to
/// other pages become relative `<page>.html#<anchor-id>` references.
#[derive(Debug, Clone, Default)]
pub struct WebBackend;

impl WebBackend {
    fn output_path(page: &RenderPage) -> String {
        format!("{}.html", page.page.stem_path())
    }
}

impl Backend for WebBackend {
    fn name(&self) -> &str {
        "web"
    }

    fn render(&self, volume: &Volume, pages: &[RenderPage]) -> Result<Vec<Artifact>, BuildError> {
        let prefix = if volume.primary {
            PathBuf::new()
        } else {
            PathBuf::from(&volume.name)
        };
        let mut artifacts = Vec::with_capacity(pages.len());
        for page in pages {
            let document = page.record.document.as_ref().ok_or_else(|| {
                BuildError::Render(format!("{} has no document", page.page.path))
            })?;
            let own_path = WebBackend::output_path(page);
            let own_dir = parent_dir(&own_path);
            let link = |href: &str| match page.record.links.get(href) {
                Some(target) => {
                    let file = pages
                        .iter()
                        .find(|p| p.page.key == target.page)
                        .map(WebBackend::output_path)
                        .unwrap_or_else(|| format!("{}.html", target.page.id));
                    let mut url = relative_path(own_dir, &file);
                    if let Some(anchor) = &target.anchor {
                        url.push('#');
                        url.push_str(&target.page.id.anchor_id(anchor));
                    }
                    url
                }
                None => href.to_string(),
            };
            let body = HtmlWriter::new(&page.record.headings, &link).render(&document.blocks)?;
            artifacts.push(Artifact {
                path: prefix.join(&own_path),
                bytes: html_page(&page.title(), &body).into_bytes(),
            });
        }
        Ok(artifacts)
    }
}
