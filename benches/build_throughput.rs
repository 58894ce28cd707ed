//! Build throughput benchmarks
//!
//! Measures full builds over a generated project:
//! - Check-only builds (every stage, no output)
//! - Builds writing the single-document output
//! - Builds with section numbering, which serializes the numbering stage per volume
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use docweave::{build::Builder, render::DocumentBackend};
use std::{fs, path::Path};
use tempfile::TempDir;

const SECTIONS: usize = 8;
const PAGES_PER_SECTION: usize = 12;

// Generated corpus: one index per section, pages linking to their neighbours and to the root.
fn setup_project(numbering: bool) -> Result<TempDir, Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let root = dir.path();
    fs::write(
        root.join("docweave.toml"),
        format!("[[volume]]\nname = \"bench\"\nnumbering = {numbering}\n"),
    )?;
    write_page(root, "index.md", "# Overview\n\n## Conventions\n\nStart below.\n")?;
    for section in 0..SECTIONS {
        let dir = format!("section{section}");
        write_page(
            root,
            &format!("{dir}/index.md"),
            &format!("# Section {section}\n\nSee the [overview](../index.md#conventions).\n"),
        )?;
        for page in 0..PAGES_PER_SECTION {
            let next = (page + 1) % PAGES_PER_SECTION;
            write_page(
                root,
                &format!("{dir}/page{page}.md"),
                &format!(
                    "# Page {page}\n\nContinue with [the next page](page{next}.md#usage).\n\n\
                     ## Usage\n\nRun `build` and read the “report”.\n\n\
                     ## Notes\n\nBack to the [section](index.md).\n"
                ),
            )?;
        }
    }
    Ok(dir)
}

fn write_page(root: &Path, path: &str, content: &str) -> std::io::Result<()> {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(full, content)
}

fn bench_check_only(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let project_dir = setup_project(false).unwrap();
    let builder = Builder::new();
    let project = builder.load_project(project_dir.path()).unwrap();

    c.bench_function("check_only", |b| {
        b.to_async(&rt).iter(|| async {
            let report = builder.build(project.clone()).await.unwrap();
            report.issue_count()
        });
    });
}

fn bench_document_output(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let project_dir = setup_project(false).unwrap();
    let out = TempDir::new().unwrap();
    let builder = Builder::new().with_target(DocumentBackend, out.path());
    let project = builder.load_project(project_dir.path()).unwrap();

    c.bench_function("document_output", |b| {
        b.to_async(&rt).iter(|| async {
            let report = builder.build(project.clone()).await.unwrap();
            report.volumes[0].artifacts.len()
        });
    });
}

fn bench_numbered(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let project_dir = setup_project(true).unwrap();
    let builder = Builder::new();
    let project = builder.load_project(project_dir.path()).unwrap();

    c.bench_function("numbered", |b| {
        b.to_async(&rt).iter(|| async {
            let report = builder.build(project.clone()).await.unwrap();
            report.is_success()
        });
    });
}

criterion_group!(
    benches,
    bench_check_only,
    bench_document_output,
    bench_numbered
);
criterion_main!(benches);
