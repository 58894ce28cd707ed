//! Renderer backends.
//!
//! A backend turns the finished records of one volume into output artifacts. Rendering is pure:
//! backends return [Artifact]s and the builder writes them. The builder only calls
//! [Backend::render] once every page of the volume has reached [Backend::required_stage].

use std::{path::PathBuf, sync::Arc};

use crate::{
    error::BuildError,
    project::{Page, Volume},
    runtime::PageRecord,
    stage::Stage,
};

pub mod document;
pub mod web;

pub use document::DocumentBackend;
pub use web::WebBackend;

/// One page handed to a backend: the immutable page plus this run's final record for it.
#[derive(Debug, Clone)]
pub struct RenderPage {
    pub page: Arc<Page>,
    pub record: PageRecord,
}

impl RenderPage {
    pub fn title(&self) -> String {
        self.record
            .title
            .clone()
            .unwrap_or_else(|| self.page.id().to_string())
    }
}

/// An output file, its path relative to the backend's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Stage every page must reach before its record is handed to [Backend::render].
    fn required_stage(&self) -> Stage {
        Stage::FINISHED
    }

    fn render(&self, volume: &Volume, pages: &[RenderPage]) -> Result<Vec<Artifact>, BuildError>;
}

/// Minimal standalone HTML page around `body`.
pub(crate) fn html_page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n<title>{}</title>\n</head>\n<body>\n{body}</body>\n</html>\n",
        crate::codec::html::escape(title)
    )
}
