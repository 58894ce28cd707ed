//! Shared test utilities for pipeline tests

use std::{fs, path::Path, sync::Arc};
use tempfile::TempDir;

use crate::{
    codec::LoaderMap,
    driver::StageDriver,
    flight::SingleFlight,
    project::{Page, Project},
    report::NoopReporter,
    runtime::RuntimeContext,
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Write `files` (volume-relative path, content) into a fresh temporary project directory.
pub fn write_project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, content) in files {
        write_file(dir.path(), path, content);
    }
    dir
}

pub fn write_file(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
}

/// Load the project under `root` with the given loaders.
pub fn load_project(root: &Path, loaders: &LoaderMap) -> Arc<Project> {
    Arc::new(Project::load(root, &loaders.extensions()).unwrap())
}

/// A driver over `project` bound to `ctx`, with its own single-flight table.
pub fn driver_for(ctx: Arc<RuntimeContext>, project: Arc<Project>, loaders: LoaderMap) -> StageDriver {
    StageDriver::new(
        ctx,
        project,
        loaders,
        Arc::new(NoopReporter),
        SingleFlight::new(),
    )
}

/// The page at `path` in the first volume.
pub fn page(project: &Project, path: &str) -> Arc<Page> {
    project.volumes()[0].page_by_path(path).unwrap().clone()
}
