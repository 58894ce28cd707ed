//! The immutable project tree: volumes and their pages.
//!
//! A [Project] is loaded once and can be shared by any number of build runs. Nothing in here
//! changes during a build; per-run state lives in [crate::runtime::RuntimeContext].

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
    sync::Arc,
};
use walkdir::{DirEntry, WalkDir};

use crate::{
    codec::href::{join_normalized, os_path_to_string, parent_dir},
    config::{ProjectConfig, VolumeConfig},
    error::BuildError,
};

/// Separator used to flatten page paths and anchor names into identifiers.
pub const ID_SEPARATOR: &str = "--";

const INDEX_STEM: &str = "index";

/// Stable page identifier: the volume-relative path without extension, segments joined by `--`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(String);

impl PageId {
    pub fn from_path(stem_path: &str) -> PageId {
        PageId(
            stem_path
                .split('/')
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(ID_SEPARATOR),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of the anchor `name` inside this page.
    pub fn anchor_id(&self, name: &str) -> String {
        format!("{}{ID_SEPARATOR}{name}", self.0)
    }
}

impl Display for PageId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a page across the whole project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageKey {
    pub volume: String,
    pub id: PageId,
}

impl Display for PageKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.volume, self.id)
    }
}

/// Identity of an anchor: the owning page plus the anchor name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnchorKey {
    pub page: PageKey,
    pub name: String,
}

impl AnchorKey {
    pub fn id(&self) -> String {
        self.page.id.anchor_id(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub key: PageKey,
    /// Volume-relative, `/`-separated source path, extension included.
    pub path: String,
    pub source_path: PathBuf,
    /// Source syntax, the file extension.
    pub syntax: String,
    /// Position in document order.
    pub index: usize,
    pub level: usize,
    pub parent: Option<PageId>,
    pub children: Vec<PageId>,
}

impl Page {
    pub fn id(&self) -> &PageId {
        &self.key.id
    }

    /// The source path without extension.
    pub fn stem_path(&self) -> &str {
        strip_extension(&self.path)
    }

    pub fn is_index(&self) -> bool {
        file_stem(&self.path) == INDEX_STEM
    }
}

#[derive(Debug, Clone)]
pub struct Volume {
    pub name: String,
    pub primary: bool,
    pub root: PathBuf,
    pub config: VolumeConfig,
    pages: Vec<Arc<Page>>,
    by_id: BTreeMap<PageId, usize>,
    by_path: BTreeMap<String, usize>,
    by_stem: BTreeMap<String, usize>,
}

impl Volume {
    /// Discover every page under `root` whose extension is in `extensions`.
    ///
    /// Within a directory `index.*` sorts first, then entries by file name. The pre-order walk
    /// defines document order. Hidden entries and `_`-prefixed directories are skipped, as is any
    /// directory in `exclude` (roots of other volumes nested below this one).
    pub fn discover(
        config: &VolumeConfig,
        root: PathBuf,
        extensions: &[String],
        exclude: &[PathBuf],
    ) -> Result<Volume, BuildError> {
        if !root.is_dir() {
            return Err(BuildError::Config(format!(
                "volume '{}': {:?} is not a directory",
                config.name, root
            )));
        }

        let walker = WalkDir::new(&root)
            .min_depth(1)
            .sort_by(compare_entries)
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry, exclude));

        let mut discovered = Vec::new();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !extensions.iter().any(|known| known == ext) {
                continue;
            }
            let relative = os_path_to_string(entry.path().strip_prefix(&root)?);
            discovered.push((relative, entry.path().to_path_buf(), ext.to_string()));
        }

        let mut volume = Volume {
            name: config.name.clone(),
            primary: config.primary,
            root,
            config: config.clone(),
            pages: Vec::with_capacity(discovered.len()),
            by_id: BTreeMap::new(),
            by_path: BTreeMap::new(),
            by_stem: BTreeMap::new(),
        };

        let mut pages: Vec<Page> = Vec::with_capacity(discovered.len());
        for (index, (path, source_path, syntax)) in discovered.into_iter().enumerate() {
            let stem = strip_extension(&path).to_string();
            let id = PageId::from_path(&stem);
            if let Some(existing) = volume.by_id.get(&id) {
                return Err(BuildError::Config(format!(
                    "volume '{}': {} and {} share the page id {}",
                    config.name, pages[*existing].path, path, id
                )));
            }
            volume.by_id.insert(id.clone(), index);
            volume.by_path.insert(path.clone(), index);
            volume.by_stem.entry(stem).or_insert(index);
            pages.push(Page {
                key: PageKey {
                    volume: config.name.clone(),
                    id,
                },
                path,
                source_path,
                syntax,
                index,
                level: 1,
                parent: None,
                children: Vec::new(),
            });
        }

        // Parents precede their children in document order, so one forward pass settles levels.
        for idx in 0..pages.len() {
            let parent_idx = volume.parent_index(&pages[idx]);
            if let Some(parent_idx) = parent_idx {
                let child_id = pages[idx].key.id.clone();
                pages[idx].parent = Some(pages[parent_idx].key.id.clone());
                pages[idx].level = pages[parent_idx].level + 1;
                pages[parent_idx].children.push(child_id);
            }
        }
        volume.pages = pages.into_iter().map(Arc::new).collect();
        tracing::debug!(
            "[Project] Volume '{}' has {} page(s)",
            volume.name,
            volume.pages.len()
        );
        Ok(volume)
    }

    fn parent_index(&self, page: &Page) -> Option<usize> {
        let dir = parent_dir(&page.path);
        let parent_stem = if page.is_index() {
            if dir.is_empty() {
                return None;
            }
            let up = parent_dir(dir);
            join_stem(up, INDEX_STEM)
        } else {
            join_stem(dir, INDEX_STEM)
        };
        self.by_stem
            .get(&parent_stem)
            .copied()
            .filter(|idx| *idx != page.index)
    }

    /// Pages in document order.
    pub fn pages(&self) -> &[Arc<Page>] {
        &self.pages
    }

    pub fn page(&self, id: &PageId) -> Option<&Arc<Page>> {
        self.by_id.get(id).map(|idx| &self.pages[*idx])
    }

    pub fn page_by_path(&self, path: &str) -> Option<&Arc<Page>> {
        self.by_path.get(path).map(|idx| &self.pages[*idx])
    }

    /// The page before `page` in document order.
    pub fn previous(&self, page: &Page) -> Option<&Arc<Page>> {
        page.index
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
    }

    /// Resolve a page reference found in `from`.
    ///
    /// The reference is relative to `from`'s directory unless it starts with `/`. It may name the
    /// file exactly, omit the extension, or name a directory (its index page). An empty reference
    /// is `from` itself.
    pub fn lookup(&self, from: &Page, reference: &str) -> Option<&Arc<Page>> {
        if reference.is_empty() {
            return self.page(from.id());
        }
        let normalized = join_normalized(parent_dir(&from.path), reference)?;
        if let Some(idx) = self.by_path.get(&normalized) {
            return Some(&self.pages[*idx]);
        }
        self.by_stem
            .get(&normalized)
            .or_else(|| self.by_stem.get(&join_stem(&normalized, INDEX_STEM)))
            .or_else(|| {
                // `guide.html` style references to a page by its output name
                self.by_stem.get(strip_extension(&normalized))
            })
            .map(|idx| &self.pages[*idx])
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
    volumes: Vec<Arc<Volume>>,
}

impl Project {
    /// Read the project configuration under `root` and discover the pages of every volume.
    /// Only files whose extension is in `extensions` become pages.
    pub fn load<P: AsRef<Path>>(root: P, extensions: &[String]) -> Result<Project, BuildError> {
        let root = root.as_ref().to_path_buf();
        let config = ProjectConfig::load(&root)?;
        let volume_roots: Vec<PathBuf> = config
            .volumes
            .iter()
            .map(|v| root.join(&v.path))
            .collect();

        let mut volumes = Vec::with_capacity(config.volumes.len());
        for (idx, volume_config) in config.volumes.iter().enumerate() {
            let own_root = &volume_roots[idx];
            let exclude: Vec<PathBuf> = volume_roots
                .iter()
                .filter(|other| *other != own_root && other.starts_with(own_root))
                .cloned()
                .collect();
            let volume = Volume::discover(volume_config, own_root.clone(), extensions, &exclude)?;
            volumes.push(Arc::new(volume));
        }
        tracing::info!(
            "[Project] Loaded {:?} with {} volume(s)",
            root,
            volumes.len()
        );
        Ok(Project {
            root,
            config,
            volumes,
        })
    }

    pub fn volumes(&self) -> &[Arc<Volume>] {
        &self.volumes
    }

    pub fn volume(&self, name: &str) -> Option<&Arc<Volume>> {
        self.volumes.iter().find(|v| v.name == name)
    }

    pub fn page(&self, key: &PageKey) -> Option<&Arc<Page>> {
        self.volume(&key.volume).and_then(|v| v.page(&key.id))
    }
}

fn compare_entries(a: &DirEntry, b: &DirEntry) -> Ordering {
    let is_index = |e: &DirEntry| {
        e.file_type().is_file()
            && e.path().file_stem().and_then(|s| s.to_str()) == Some(INDEX_STEM)
    };
    is_index(b)
        .cmp(&is_index(a))
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn is_skipped(entry: &DirEntry, exclude: &[PathBuf]) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.')
        || (entry.file_type().is_dir()
            && (name.starts_with('_') || exclude.iter().any(|e| e == entry.path())))
}

fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

fn file_stem(path: &str) -> &str {
    let stem = strip_extension(path);
    match stem.rfind('/') {
        Some(idx) => &stem[idx + 1..],
        None => stem,
    }
}

fn join_stem(dir: &str, stem: &str) -> String {
    if dir.is_empty() {
        stem.to_string()
    } else {
        format!("{dir}/{stem}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use test_log::test;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn md() -> Vec<String> {
        vec!["md".to_string()]
    }

    #[test]
    fn test_ids_and_document_order() {
        let dir = tempfile::tempdir().unwrap();
        for path in [
            "b.md",
            "index.md",
            "sub/index.md",
            "sub/a.md",
            "sub/subsub/document2.md",
            "notes.txt",
            ".hidden/x.md",
            "_build/out.md",
        ] {
            write(dir.path(), path, "# Page\n");
        }
        let project = Project::load(dir.path(), &md()).unwrap();
        let volume = &project.volumes()[0];
        let ids: Vec<&str> = volume.pages().iter().map(|p| p.id().as_str()).collect();
        assert_eq!(
            ids,
            vec!["index", "b", "sub--index", "sub--a", "sub--subsub--document2"]
        );
        assert_eq!(
            PageId::from_path("sub/subsub/document2").anchor_id("intro"),
            "sub--subsub--document2--intro"
        );
    }

    #[test]
    fn test_tree_levels() {
        let dir = tempfile::tempdir().unwrap();
        for path in ["index.md", "a.md", "sub/index.md", "sub/b.md", "sub/deep/c.md"] {
            write(dir.path(), path, "# Page\n");
        }
        let project = Project::load(dir.path(), &md()).unwrap();
        let volume = &project.volumes()[0];
        let get = |id: &str| volume.page(&PageId(id.to_string())).unwrap();

        assert_eq!(get("index").level, 1);
        assert_eq!(
            get("index").children,
            vec![PageId("a".to_string()), PageId("sub--index".to_string())]
        );
        assert_eq!(get("sub--index").level, 2);
        assert_eq!(get("sub--b").level, 3);
        assert_eq!(get("sub--b").parent, Some(PageId("sub--index".to_string())));
        // No index in sub/deep, so c has nothing above it.
        assert_eq!(get("sub--deep--c").parent, None);
        assert_eq!(get("sub--deep--c").level, 1);
        assert_eq!(volume.previous(get("sub--b")).unwrap().id().as_str(), "sub--index");
        assert!(volume.previous(get("index")).is_none());
    }

    #[test]
    fn test_lookup() {
        let dir = tempfile::tempdir().unwrap();
        for path in ["index.md", "guide.md", "sub/index.md", "sub/b.md"] {
            write(dir.path(), path, "# Page\n");
        }
        let project = Project::load(dir.path(), &md()).unwrap();
        let volume = &project.volumes()[0];
        let b = volume.page_by_path("sub/b.md").unwrap();
        let id = |p: Option<&Arc<Page>>| p.map(|p| p.id().as_str().to_string());

        assert_eq!(id(volume.lookup(b, "../guide.md")), Some("guide".to_string()));
        assert_eq!(id(volume.lookup(b, "../guide")), Some("guide".to_string()));
        assert_eq!(id(volume.lookup(b, "/guide.html")), Some("guide".to_string()));
        assert_eq!(id(volume.lookup(b, "./")), Some("sub--index".to_string()));
        assert_eq!(id(volume.lookup(b, "..")), Some("index".to_string()));
        assert_eq!(id(volume.lookup(b, "")), Some("sub--b".to_string()));
        assert_eq!(id(volume.lookup(b, "missing.md")), None);
        assert_eq!(id(volume.lookup(b, "../../escape.md")), None);
    }

    #[test]
    fn test_nested_volumes_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "docweave.toml",
            "[[volume]]\nname = \"en\"\npath = \".\"\n[[volume]]\nname = \"de\"\npath = \"de\"\n",
        );
        write(dir.path(), "index.md", "# Home\n");
        write(dir.path(), "de/index.md", "# Start\n");
        let project = Project::load(dir.path(), &md()).unwrap();
        assert_eq!(project.volume("en").unwrap().pages().len(), 1);
        assert_eq!(project.volume("de").unwrap().pages().len(), 1);
        assert!(project.volume("en").unwrap().primary);
    }

    #[test]
    fn test_missing_volume_directory_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "docweave.toml",
            "[[volume]]\nname = \"en\"\npath = \"nope\"\n",
        );
        assert!(matches!(
            Project::load(dir.path(), &md()),
            Err(BuildError::Config(_))
        ));
    }
}
