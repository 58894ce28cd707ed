//! Source loading: turning a page's raw text into a structural [Document] tree.
//!
//! ## Key Components
//!
//! - [`SourceLoader`] trait - implement to support a new source syntax
//! - [`LoaderMap`] - registry of loaders keyed by file extension
//! - [`Document`] - the tree handed to the stage driver
//! - [`Href`] - classification of link destinations found in a document
//!
//! ## Built-in Loaders
//!
//! - **Markdown** (`.md`) - via [`md::MdLoader`]
//!
//! Register custom loaders via [`LoaderMap::insert`]:
//!
//! ```rust
//! use docweave::{codec::{Document, LoaderMap, SourceLoader}, BuildError};
//!
//! #[derive(Default)]
//! struct PlainText;
//!
//! impl SourceLoader for PlainText {
//!     fn load(&self, source: &str, _syntax: &str) -> Result<Document, BuildError> {
//!         let blocks = source
//!             .split("\n\n")
//!             .map(|p| docweave::codec::Block::Paragraph(vec![
//!                 docweave::codec::Inline::Text(p.to_string()),
//!             ]))
//!             .collect();
//!         Ok(Document { blocks, ..Default::default() })
//!     }
//! }
//!
//! let loaders = LoaderMap::create();
//! loaders.insert("txt", PlainText);
//! assert!(loaders.extensions().contains(&"txt".to_string()));
//! ```

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::BuildError;

pub mod document;
pub mod href;
pub mod html;
pub mod md;

pub use document::{Block, Document, Inline};
pub use href::Href;

/// Converts the raw text of one page into a [Document]. Called once per page per build run.
pub trait SourceLoader: Send + Sync {
    fn load(&self, source: &str, syntax: &str) -> Result<Document, BuildError>;
}

#[derive(Clone)]
pub struct LoaderMap(Arc<RwLock<Vec<(String, Arc<dyn SourceLoader>)>>>);

impl Default for LoaderMap {
    fn default() -> Self {
        LoaderMap::create()
    }
}

impl LoaderMap {
    /// A registry holding the built-in loaders.
    pub fn create() -> Self {
        LoaderMap(Arc::new(RwLock::new(vec![(
            "md".to_string(),
            Arc::new(md::MdLoader) as Arc<dyn SourceLoader>,
        )])))
    }

    /// Register `loader` for `extension`, replacing any loader already registered for it.
    pub fn insert<L: SourceLoader + 'static>(&self, extension: &str, loader: L) {
        let mut writer = self.0.write();
        let loader: Arc<dyn SourceLoader> = Arc::new(loader);
        if let Some(entry) = writer.iter_mut().find(|(ext, _)| ext == extension) {
            entry.1 = loader;
        } else {
            writer.push((extension.to_string(), loader));
        }
    }

    pub fn get(&self, ext: &str) -> Option<Arc<dyn SourceLoader>> {
        self.0
            .read()
            .iter()
            .find(|(loader_ext, _)| loader_ext == ext)
            .map(|(_, loader)| loader.clone())
    }

    pub fn extensions(&self) -> Vec<String> {
        self.0.read().iter().map(|(ext, _)| ext.clone()).collect()
    }
}
