//! Stage driver behavior within a single run.

use super::helpers::*;
use crate::{
    codec::{md::MdLoader, Document, LoaderMap, SourceLoader},
    error::BuildError,
    gather::TaskGroup,
    issue::Issue,
    project::{AnchorKey, PageKey},
    runtime::{run_isolated, LinkTarget},
    stage::Stage,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use test_log::test;

/// Markdown loader that counts how often each run loads a source.
#[derive(Clone, Default)]
struct CountingLoader {
    loads: Arc<AtomicUsize>,
}

impl SourceLoader for CountingLoader {
    fn load(&self, source: &str, syntax: &str) -> Result<Document, BuildError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        MdLoader.load(source, syntax)
    }
}

#[test(tokio::test)]
async fn test_stage_bodies_run_once_per_page() {
    init_logging();
    let dir = write_project(&[
        ("target.md", "# Target\n\n## Setup\n"),
        ("a.md", "# A\n\nSee [setup](target.md#setup).\n"),
        ("b.md", "# B\n\nSee [target](target.md).\n"),
        ("c.md", "# C\n\nSee [setup](target#setup) and [b](b.md).\n"),
    ]);
    let loader = CountingLoader::default();
    let loaders = LoaderMap::create();
    loaders.insert("md", loader.clone());
    let project = load_project(dir.path(), &loaders);

    let (stages, links) = run_isolated(|ctx| async move {
        let driver = driver_for(ctx.clone(), project.clone(), loaders);
        let group = TaskGroup::new();
        for page in project.volumes()[0].pages() {
            // Two concurrent requests per page on top of the link-driven ones.
            group.spawn(driver.advance(page.clone(), Stage::Process4));
            group.spawn(driver.advance(page.clone(), Stage::Process3));
        }
        group.gather_all("all pages").await.unwrap();
        let stages: Vec<Stage> = project.volumes()[0]
            .pages()
            .iter()
            .map(|p| ctx.page(&p.key).stage())
            .collect();
        let c = page(&project, "c.md");
        let links = ctx.page(&c.key).snapshot().links;
        (stages, links)
    })
    .await;

    assert!(stages.iter().all(|s| *s == Stage::Process4));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 4);
    assert_eq!(
        links.get("target#setup").map(LinkTarget::fragment),
        Some("target--setup".to_string())
    );
    assert_eq!(
        links.get("b.md").map(LinkTarget::fragment),
        Some("b".to_string())
    );
}

#[test(tokio::test)]
async fn test_numbering_follows_document_order() {
    let dir = write_project(&[
        ("docweave.toml", "[[volume]]\nname = \"en\"\nnumbering = true\n"),
        ("index.md", "# Intro\n\n## Part\n"),
        ("a.md", "# Alpha\n"),
        ("b.md", "# Beta\n\n## Beta One\n"),
    ]);
    let loaders = LoaderMap::create();
    let project = load_project(dir.path(), &loaders);

    let numbers = run_isolated(|ctx| async move {
        let driver = driver_for(ctx.clone(), project.clone(), loaders);
        let group = TaskGroup::new();
        // Spawn in reverse so numbering order cannot come from spawn order.
        for page in project.volumes()[0].pages().iter().rev() {
            group.spawn(driver.advance(page.clone(), Stage::Process2));
        }
        group.gather_all("numbering").await.unwrap();
        let mut numbers = Vec::new();
        for page in project.volumes()[0].pages() {
            let record = ctx.page(&page.key).snapshot();
            numbers.extend(record.headings.into_iter().map(|h| h.number.unwrap()));
        }
        let part = ctx
            .find_anchor(&AnchorKey {
                page: page(&project, "index.md").key.clone(),
                name: "part".to_string(),
            })
            .unwrap()
            .record();
        assert_eq!(part.number.as_deref(), Some("1.1"));
        assert_eq!(part.title, "Part");
        numbers
    })
    .await;

    // index is level 1; a and b are its children at level 2.
    assert_eq!(numbers, vec!["1", "1.1", "1.2", "1.3", "1.3.1"]);
}

#[test(tokio::test)]
async fn test_skipped_heading_level_is_a_numbering_fault() {
    let dir = write_project(&[
        ("docweave.toml", "[[volume]]\nname = \"en\"\nnumbering = true\n"),
        ("index.md", "# Intro\n\n### Too deep\n"),
        ("next.md", "# Next\n"),
    ]);
    let loaders = LoaderMap::create();
    let project = load_project(dir.path(), &loaders);

    let (outcome, index_fault, next_stage) = run_isolated(|ctx| async move {
        let driver = driver_for(ctx.clone(), project.clone(), loaders);
        let group = TaskGroup::new();
        for page in project.volumes()[0].pages() {
            group.spawn(driver.advance(page.clone(), Stage::Process2));
        }
        let outcome = group.gather_all("numbering").await;
        let index = ctx.page(&page(&project, "index.md").key);
        assert_eq!(index.stage(), Stage::Failure);
        (
            outcome,
            index.fault(),
            ctx.page(&page(&project, "next.md").key).stage(),
        )
    })
    .await;

    // The fault stays with its page; nothing escapes the volume.
    assert_eq!(outcome, Ok(()));
    let BuildError::PageFailed { page, cause } = index_fault else {
        panic!("expected a page failure, got {index_fault:?}");
    };
    assert_eq!(page, "index.md");
    assert!(matches!(*cause, BuildError::Numbering(_)));
    // The counter never saw the predecessor's headings.
    assert_eq!(next_stage, Stage::DependencyFailure);
}

#[test(tokio::test)]
async fn test_unparsable_predecessor_fails_numbering_as_dependency() {
    let dir = write_project(&[
        ("docweave.toml", "[[volume]]\nname = \"en\"\nnumbering = true\n"),
        ("index.md", "---\ntitle = \n---\n# Intro\n"),
        ("a.md", "# Alpha\n"),
        ("b.md", "# Beta\n"),
    ]);
    let loaders = LoaderMap::create();
    let project = load_project(dir.path(), &loaders);

    let (outcome, faults) = run_isolated(|ctx| async move {
        let driver = driver_for(ctx.clone(), project.clone(), loaders);
        let group = TaskGroup::new();
        for page in project.volumes()[0].pages() {
            group.spawn(driver.advance(page.clone(), Stage::Process4));
        }
        let outcome = group.gather_all("numbering").await;
        let faults: Vec<(Stage, BuildError)> = project.volumes()[0]
            .pages()
            .iter()
            .map(|p| {
                let state = ctx.page(&p.key);
                (state.stage(), state.fault())
            })
            .collect();
        (outcome, faults)
    })
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(faults[0].0, Stage::Failure);
    assert!(matches!(&faults[0].1, BuildError::PageFailed { cause, .. }
        if matches!(**cause, BuildError::Parse(_))));
    // Neither healthy page is blamed with a numbering fault of its own.
    for (stage, fault) in &faults[1..] {
        assert_eq!(*stage, Stage::DependencyFailure);
        assert!(matches!(fault, BuildError::DependencyFailed { .. }), "{fault:?}");
    }
}

#[test(tokio::test)]
async fn test_target_failing_early_fails_the_dependent() {
    let dir = write_project(&[
        ("a.md", "# A\n\nSee [b](b.md#setup).\n"),
        ("b.md", "---\ntitle = \n---\n# B\n"),
        ("c.md", "# C\n"),
    ]);
    let loaders = LoaderMap::create();
    let project = load_project(dir.path(), &loaders);

    let (outcome, stages) = run_isolated(|ctx| async move {
        let driver = driver_for(ctx.clone(), project.clone(), loaders);
        let group = TaskGroup::new();
        for page in project.volumes()[0].pages() {
            group.spawn(driver.advance(page.clone(), Stage::Process4));
        }
        let outcome = group.gather_all("volume").await;
        let stages: Vec<(String, Stage, Vec<Issue>)> = project.volumes()[0]
            .pages()
            .iter()
            .map(|p| {
                let state = ctx.page(&p.key);
                (p.path.clone(), state.stage(), state.issues())
            })
            .collect();
        (outcome, stages)
    })
    .await;

    // The parse error is recorded on b; neither failure escapes the volume.
    assert_eq!(outcome, Ok(()));
    assert_eq!(
        stages,
        vec![
            ("a.md".to_string(), Stage::DependencyFailure, vec![]),
            ("b.md".to_string(), Stage::Failure, vec![]),
            ("c.md".to_string(), Stage::Process4, vec![]),
        ]
    );
}

#[test(tokio::test)]
async fn test_unreadable_image_path_is_a_page_fault() {
    let dir = write_project(&[
        ("logo.png", "not a directory"),
        ("index.md", "# Index\n\n![logo](logo.png/inner.png)\n"),
    ]);
    let loaders = LoaderMap::create();
    let project = load_project(dir.path(), &loaders);

    run_isolated(|ctx| async move {
        let driver = driver_for(ctx.clone(), project.clone(), loaders);
        let index = page(&project, "index.md");
        let err = driver
            .advance(index.clone(), Stage::Process3)
            .await
            .unwrap_err();
        let BuildError::PageFailed { cause, .. } = err else {
            panic!("expected a page failure, got {err:?}");
        };
        // Checking a path below a regular file is an I/O error, not a missing image.
        assert!(matches!(*cause, BuildError::Io(_)), "{cause:?}");
        let state = ctx.page(&index.key);
        assert_eq!(state.stage(), Stage::Failure);
        assert!(state.issues().is_empty());
    })
    .await;
}

#[test(tokio::test)]
async fn test_target_failing_late_does_not_fail_the_dependent() {
    let dir = write_project(&[
        ("a.md", "# A\n\nSee [b](b.md#b).\n"),
        ("b.md", "# B\n\nBroken [link](nowhere.md).\n"),
    ]);
    let loaders = LoaderMap::create();
    let project = load_project(dir.path(), &loaders);

    let (outcome, a_stage, b_issues) = run_isolated(|ctx| async move {
        let driver = driver_for(ctx.clone(), project.clone(), loaders);
        let group = TaskGroup::new();
        for page in project.volumes()[0].pages() {
            group.spawn(driver.advance(page.clone(), Stage::Process4));
        }
        let outcome = group.gather_all("volume").await;
        let b = ctx.page(&page(&project, "b.md").key);
        (outcome, ctx.page(&page(&project, "a.md").key).stage(), b.issues())
    })
    .await;

    assert_eq!(outcome, Ok(()));
    assert_eq!(a_stage, Stage::Process4);
    assert_eq!(
        b_issues,
        vec![Issue::BadLink {
            target: "nowhere.md".to_string()
        }]
    );
}

#[test(tokio::test)]
async fn test_require_detects_wait_cycle() {
    let dir = write_project(&[("a.md", "# A\n"), ("b.md", "# B\n")]);
    let loaders = LoaderMap::create();
    let project = load_project(dir.path(), &loaders);

    run_isolated(|ctx| async move {
        let driver = driver_for(ctx.clone(), project.clone(), loaders);
        let a = page(&project, "a.md");
        let b = page(&project, "b.md");
        // b is suspended on a; a now asking for b can never complete.
        let _b_waits = ctx.register_wait(&b.key, &a.key, Stage::Process1).unwrap();
        let err = driver.require(&a, &b, Stage::Process1).await.unwrap_err();
        assert_eq!(
            err,
            BuildError::DependencyCycle(vec![
                a.key.to_string(),
                b.key.to_string(),
                a.key.to_string()
            ])
        );
        assert!(!err.is_ignorable());
        assert_eq!(ctx.page(&b.key).stage(), Stage::Initialize);
    })
    .await;
}

#[test(tokio::test)]
async fn test_advancing_failed_page_returns_its_fault() {
    let dir = write_project(&[("a.md", "# A\n")]);
    let loaders = LoaderMap::create();
    let project = load_project(dir.path(), &loaders);

    run_isolated(|ctx| async move {
        let driver = driver_for(ctx.clone(), project.clone(), loaders);
        let a = page(&project, "a.md");
        let fault = BuildError::VolumeFailed("default".to_string());
        ctx.page(&a.key).fail(Stage::VolumeFailure, fault.clone());
        assert_eq!(driver.advance(a.clone(), Stage::Process4).await, Err(fault));
        assert_eq!(
            driver.advance(a.clone(), Stage::Failure).await,
            Err(BuildError::VolumeFailed("default".to_string()))
        );
        let key = PageKey {
            volume: "default".to_string(),
            id: a.id().clone(),
        };
        assert_eq!(ctx.page(&key).reached(), Stage::Initialize);
    })
    .await;
}
