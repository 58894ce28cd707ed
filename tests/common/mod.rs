//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::{fs, path::Path};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Write `files` (project-relative path, content) into a fresh temporary directory.
#[allow(dead_code)]
pub fn create_project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }
    dir
}

/// The five-page tree used by the link tests: `document0` at the root and one descendant per
/// level, each linking to the others.
#[allow(dead_code)]
pub fn create_nested_project() -> TempDir {
    create_project(&[
        (
            "document0.md",
            "# Document Zero\n\nGo [down](sub/document1.md) or [deeper](sub/subsub/document2.md#details).\n",
        ),
        (
            "sub/document1.md",
            "# Document One\n\nBack to [the top](../document0.md#document-zero).\n",
        ),
        (
            "sub/subsub/document2.md",
            "# Document Two\n\n## Details\n\nSee [three](subsubsub/document3.md) and [one](/sub/document1).\n",
        ),
        (
            "sub/subsub/subsubsub/document3.md",
            "# Document Three\n\nOn to [four](deepest/document4.md#notes).\n",
        ),
        (
            "sub/subsub/subsubsub/deepest/document4.md",
            "# Document Four\n\n## Notes\n\nHome is [here](../../../../document0.md).\n",
        ),
    ])
}

/// Read an output file as a string.
#[allow(dead_code)]
pub fn read(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join(path)).unwrap()
}
