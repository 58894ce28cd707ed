//! Link destinations and the slash-separated path arithmetic used to resolve them.
//!
//! Page paths inside a volume are always `/`-separated strings relative to the volume root, no
//! matter what the host OS uses, so that page ids and rendered links are identical everywhere.

use std::path::Path;
use url::Url;

/// A classified link destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Href {
    /// Anything that parses as an absolute URL (`https://`, `mailto:` ...). Never resolved.
    External(String),
    /// A reference into the project. An empty `path` points at the referencing page itself.
    Local {
        path: String,
        anchor: Option<String>,
    },
}

impl Href {
    pub fn parse(href: &str) -> Href {
        if Url::parse(href).is_ok() {
            return Href::External(href.to_string());
        }
        let (path, anchor) = match href.split_once('#') {
            Some((path, anchor)) => (path, Some(anchor.to_string())),
            None => (href, None),
        };
        Href::Local {
            path: path.to_string(),
            anchor: anchor.filter(|a| !a.is_empty()),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Href::External(_))
    }
}

/// Slugify a heading title into an anchor name: lowercase, whitespace becomes `-`, and only
/// alphanumerics and `-` are kept.
pub fn to_anchor(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .replace(char::is_whitespace, "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// Render a relative OS path with `/` separators.
pub fn os_path_to_string<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// The directory part of a slash-separated path (`""` for top-level entries).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Resolve `reference` against directory `base`, both slash-separated and volume-relative.
///
/// A leading `/` makes `reference` volume-root relative. `.` and empty segments are dropped and
/// `..` pops one segment; popping past the volume root yields `None`.
pub fn join_normalized(base: &str, reference: &str) -> Option<String> {
    let mut components: Vec<&str> = Vec::new();
    let (start, reference) = match reference.strip_prefix('/') {
        Some(rooted) => ("", rooted),
        None => (base, reference),
    };
    for part in start.split('/').chain(reference.split('/')) {
        match part {
            "" | "." => {}
            ".." => {
                components.pop()?;
            }
            _ => components.push(part),
        }
    }
    Some(components.join("/"))
}

/// The slash-separated path from directory `from_dir` to the file `to`, both volume-relative.
pub fn relative_path(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|p| !p.is_empty()).collect();
    let to_parts: Vec<&str> = to.split('/').filter(|p| !p.is_empty()).collect();
    let shared = from
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts = vec![".."; from.len() - shared];
    parts.extend(to_parts[shared..].iter());
    parts.join("/")
}
