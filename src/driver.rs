//! The dependency-aware stage driver.
//!
//! [StageDriver::advance] moves a page through [Stage::range] one stage at a time. Each stage body
//! executes at most once per run: executions are single-flighted on `(run, page, stage)`, and a
//! body whose stage the page already passed is skipped. A body may spawn sub-tasks into the
//! stage's [TaskGroup]; the stage completes once all of them have.
//!
//! | Stage | Work |
//! |---|---|
//! | Prepare | read the source, run its loader, record the title |
//! | Process1 | collect anchors from headings |
//! | Process2 | section numbering, in document order per volume |
//! | Process3 | resolve page references (waiting on each target's Process1) and check images |
//! | Process4 | spelling and style checks, render the fragment-linked body |
//!
//! After a stage, a page with issues moves to [Stage::Failure] and the stage fails with the
//! ignorable [BuildError::IssuesOccurred]. A stage body failing on its own page (unreadable source,
//! bad front matter, numbering) also moves it to [Stage::Failure], with the cause wrapped in the
//! ignorable [BuildError::PageFailed]. A page whose dependency failed before reaching the awaited
//! stage moves to [Stage::DependencyFailure] instead.

use futures::future::{BoxFuture, FutureExt};
use std::{collections::BTreeSet, fmt::Debug, sync::Arc};

use crate::{
    codec::{
        href::{join_normalized, parent_dir, to_anchor},
        html::{HeadingDecor, HtmlWriter},
        Document, Href, LoaderMap,
    },
    error::BuildError,
    flight::{SharedResult, SingleFlight},
    gather::TaskGroup,
    issue::Issue,
    lint::check_phrases,
    project::{AnchorKey, Page, PageKey, Project, Volume},
    report::Reporter,
    runtime::{LinkTarget, PageState, RunId, RuntimeContext},
    stage::Stage,
};

/// Single-flight key of one stage execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageKey {
    pub run: RunId,
    pub page: PageKey,
    pub stage: Stage,
}

/// Drives the pages of one run. Cheap to clone; clones share the run's context.
#[derive(Clone)]
pub struct StageDriver {
    ctx: Arc<RuntimeContext>,
    project: Arc<Project>,
    loaders: LoaderMap,
    reporter: Arc<dyn Reporter>,
    stages: SingleFlight<StageKey, ()>,
}

impl Debug for StageDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDriver")
            .field("run", &self.ctx.run())
            .field("root", &self.project.root)
            .finish()
    }
}

impl StageDriver {
    pub fn new(
        ctx: Arc<RuntimeContext>,
        project: Arc<Project>,
        loaders: LoaderMap,
        reporter: Arc<dyn Reporter>,
        stages: SingleFlight<StageKey, ()>,
    ) -> StageDriver {
        StageDriver {
            ctx,
            project,
            loaders,
            reporter,
            stages,
        }
    }

    pub fn ctx(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    pub fn project(&self) -> &Arc<Project> {
        &self.project
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    /// Run every stage the page still needs to reach `target`.
    ///
    /// A page that already failed returns the error it failed with.
    pub fn advance(&self, page: Arc<Page>, target: Stage) -> BoxFuture<'static, Result<(), BuildError>> {
        let driver = self.clone();
        async move {
            let state = driver.ctx.page(&page.key);
            let current = state.stage();
            if current.is_failed() {
                return Err(state.fault());
            }
            if current >= target {
                return Ok(());
            }
            for stage in Stage::range(current, target)? {
                driver.run_stage(page.clone(), stage).await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn run_stage(&self, page: Arc<Page>, stage: Stage) -> SharedResult<()> {
        let key = StageKey {
            run: self.ctx.run(),
            page: page.key.clone(),
            stage,
        };
        let driver = self.clone();
        self.stages
            .once(key, move || async move { driver.execute_stage(page, stage).await })
    }

    async fn execute_stage(&self, page: Arc<Page>, stage: Stage) -> Result<(), BuildError> {
        let state = self.ctx.page(&page.key);
        if state.reached() >= stage {
            return Ok(());
        }
        if state.stage().is_failed() {
            return Err(state.fault());
        }
        tracing::trace!("[Driver] {} entering {stage}", page.key);

        let group = TaskGroup::new();
        let context = format!("{} {stage}", page.path);
        let body = self.stage_body(&page, &state, stage, &group).await;
        let gathered = group.gather_all(context.clone()).await;
        let outcome = match (body, gathered) {
            (Ok(()), gathered) => gathered,
            (Err(body), Ok(())) => Err(body),
            (Err(body), Err(gathered)) => Err(BuildError::Aggregate {
                context,
                causes: vec![body, gathered],
            }),
        };

        if state.stage().is_failed() {
            // Failed while the stage ran, e.g. by a sub-task whose dependency failed.
            return Err(state.fault());
        }
        if let Err(err) = outcome {
            let err = if err.is_page_fault() {
                BuildError::PageFailed {
                    page: page.path.clone(),
                    cause: Box::new(err),
                }
            } else {
                err
            };
            return Err(self.fail(&page, &state, Stage::Failure, err));
        }
        let issues = state.issues();
        if !issues.is_empty() {
            let err = BuildError::IssuesOccurred {
                page: page.path.clone(),
                issues,
            };
            return Err(self.fail(&page, &state, Stage::Failure, err));
        }
        state.advance_to(stage)?;
        self.reporter.stage_reached(&page, stage);
        Ok(())
    }

    fn fail(&self, page: &Page, state: &PageState, stage: Stage, err: BuildError) -> BuildError {
        match &err {
            BuildError::IssuesOccurred { .. } | BuildError::DependencyFailed { .. } => {
                tracing::debug!("[Driver] {} -> {stage}: {err}", page.key)
            }
            _ => tracing::warn!("[Driver] {} -> {stage}: {err}", page.key),
        }
        state.fail(stage, err.clone());
        self.reporter.stage_reached(page, stage);
        err
    }

    async fn stage_body(
        &self,
        page: &Arc<Page>,
        state: &PageState,
        stage: Stage,
        group: &TaskGroup,
    ) -> Result<(), BuildError> {
        match stage {
            Stage::Prepare => self.prepare(page, state).await,
            Stage::Process1 => self.collect_anchors(page, state),
            Stage::Process2 => self.number(page, state).await,
            Stage::Process3 => self.resolve_references(page, state, group).await,
            Stage::Process4 => self.check_and_render(page, state),
            Stage::Initialize | Stage::Failure | Stage::DependencyFailure | Stage::VolumeFailure => {
                Err(BuildError::InvalidTransition {
                    from: state.stage(),
                    to: stage,
                })
            }
        }
    }

    fn volume_of(&self, page: &Page) -> Result<&Arc<Volume>, BuildError> {
        self.project.volume(&page.key.volume).ok_or_else(|| {
            BuildError::NotFound(format!("volume '{}' is not part of the project", page.key.volume))
        })
    }

    async fn prepare(&self, page: &Page, state: &PageState) -> Result<(), BuildError> {
        let source = tokio::fs::read_to_string(&page.source_path).await?;
        let loader = self.loaders.get(&page.syntax).ok_or_else(|| {
            BuildError::NotFound(format!("no loader for '{}' ({})", page.syntax, page.path))
        })?;
        let document = loader.load(&source, &page.syntax)?;
        let title = document.title().unwrap_or_else(|| page.id().to_string());
        state.with_record(|record| {
            record.title = Some(title);
            record.document = Some(Arc::new(document));
        });
        Ok(())
    }

    fn collect_anchors(&self, page: &Page, state: &PageState) -> Result<(), BuildError> {
        let document = document(page, state)?;
        let mut names = Vec::new();
        let mut decor = Vec::new();
        for heading in document.headings() {
            let name = heading
                .id
                .map(|id| id.to_string())
                .unwrap_or_else(|| to_anchor(&heading.text));
            if name.is_empty() {
                decor.push(HeadingDecor::default());
                continue;
            }
            let key = AnchorKey {
                page: page.key.clone(),
                name: name.clone(),
            };
            self.ctx.anchor(&key).with_record(|anchor| {
                if anchor.occurrences == 0 {
                    anchor.title = heading.text.clone();
                }
                anchor.occurrences += 1;
            });
            decor.push(HeadingDecor {
                id: key.id(),
                number: None,
            });
            names.push(name);
        }
        tracing::trace!("[Driver] {} has {} anchor(s)", page.key, names.len());
        state.with_record(|record| {
            record.anchors = names;
            record.headings = decor;
        });
        Ok(())
    }

    /// Number headings. Waits for the previous page in document order so the volume counter sees
    /// headings strictly in document order. A predecessor that failed before being numbered leaves
    /// the counter short, so the page fails as a dependency failure.
    async fn number(&self, page: &Arc<Page>, state: &PageState) -> Result<(), BuildError> {
        let volume = self.volume_of(page)?.clone();
        if !volume.config.numbering {
            return Ok(());
        }
        if let Some(previous) = volume.previous(page) {
            self.await_stage(page, previous, Stage::NUMBERED).await?;
        }

        let document = document(page, state)?;
        let volume_state = self.ctx.volume(&volume.name);
        let numbers = {
            let mut counter = volume_state.counter.lock();
            let mut numbers = Vec::new();
            for heading in document.headings() {
                let level = page.level + usize::from(heading.level) - 1;
                counter.increase(level)?;
                numbers.push(counter.to_string());
            }
            numbers
        };

        let anchors = state.with_record(|record| {
            for (decor, number) in record.headings.iter_mut().zip(numbers.iter()) {
                decor.number = Some(number.clone());
            }
            record
                .headings
                .iter()
                .filter(|decor| !decor.id.is_empty())
                .map(|decor| decor.number.clone())
                .zip(record.anchors.clone())
                .collect::<Vec<_>>()
        });
        for (number, name) in anchors {
            let key = AnchorKey {
                page: page.key.clone(),
                name,
            };
            self.ctx.anchor(&key).with_record(|anchor| {
                if anchor.number.is_none() {
                    anchor.number = number;
                }
            });
        }
        Ok(())
    }

    async fn resolve_references(
        &self,
        page: &Arc<Page>,
        state: &PageState,
        group: &TaskGroup,
    ) -> Result<(), BuildError> {
        let volume = self.volume_of(page)?.clone();
        let document = document(page, state)?;

        let hrefs: BTreeSet<String> = document.links().into_iter().map(String::from).collect();
        for href in hrefs {
            let Href::Local { path, anchor } = Href::parse(&href) else {
                continue;
            };
            let Some(target) = volume.lookup(page, &path).cloned() else {
                state.add_issue(Issue::BadLink { target: href });
                continue;
            };
            let driver = self.clone();
            let page = page.clone();
            group.spawn(async move {
                driver
                    .resolve_link(page, target, href, path, anchor)
                    .await
            });
        }

        let images: BTreeSet<String> = document.images().into_iter().map(String::from).collect();
        for src in images {
            let Href::Local { path, .. } = Href::parse(&src) else {
                continue;
            };
            let exists = match join_normalized(parent_dir(&page.path), &path) {
                Some(relative) if !relative.is_empty() => {
                    tokio::fs::try_exists(volume.root.join(relative)).await?
                }
                _ => false,
            };
            if !exists {
                state.add_issue(Issue::BadImage { target: src });
            }
        }
        Ok(())
    }

    async fn resolve_link(
        &self,
        page: Arc<Page>,
        target: Arc<Page>,
        href: String,
        path: String,
        anchor: Option<String>,
    ) -> Result<(), BuildError> {
        self.require(&page, &target, Stage::ANCHORS_COLLECTED).await?;
        let state = self.ctx.page(&page.key);

        let anchor = match anchor {
            None => None,
            Some(name) => {
                let found = [name.clone(), to_anchor(&name)]
                    .into_iter()
                    .find_map(|candidate| {
                        let key = AnchorKey {
                            page: target.key.clone(),
                            name: candidate.clone(),
                        };
                        self.ctx.find_anchor(&key).map(|a| (candidate, a.record()))
                    });
                match found {
                    None => {
                        state.add_issue(Issue::BadLink { target: href });
                        return Ok(());
                    }
                    Some((_, record)) if record.occurrences > 1 => {
                        state.add_issue(Issue::AmbiguousLink { target: path, anchor: name });
                        return Ok(());
                    }
                    Some((candidate, _)) => Some(candidate),
                }
            }
        };
        state.with_record(|record| {
            record.links.insert(
                href,
                LinkTarget {
                    page: target.key.clone(),
                    anchor,
                },
            );
        });
        Ok(())
    }

    fn check_and_render(&self, page: &Page, state: &PageState) -> Result<(), BuildError> {
        let volume = self.volume_of(page)?;
        let document = document(page, state)?;
        let phrases = document.phrases();

        if let Some(checker) = self.ctx.volume(&volume.name).spell_checker() {
            let words = checker.misspelled(&phrases);
            if !words.is_empty() {
                state.add_issue(Issue::MisspelledWords {
                    page: page.path.clone(),
                    words,
                });
            }
        }
        if volume.config.style_checks {
            for issue in check_phrases(&phrases) {
                state.add_issue(issue);
            }
        }

        let (headings, links) =
            state.with_record(|record| (record.headings.clone(), record.links.clone()));
        let link = |href: &str| match links.get(href) {
            Some(target) => format!("#{}", target.fragment()),
            None => href.to_string(),
        };
        let content = HtmlWriter::new(&headings, &link).render(&document.blocks)?;
        state.with_record(|record| record.content = Some(content));
        Ok(())
    }

    /// Suspend `waiter` until `target` reaches `stage`, driving `target` there if needed.
    ///
    /// If `target` fails before reaching `stage`, `waiter` moves to [Stage::DependencyFailure] and
    /// [BuildError::DependencyFailed] is returned. The target's own failure is left for the
    /// target to report.
    pub async fn require(
        &self,
        waiter: &Arc<Page>,
        target: &Arc<Page>,
        stage: Stage,
    ) -> Result<(), BuildError> {
        let target_state = self.ctx.page(&target.key);
        if target_state.reached() >= stage {
            return Ok(());
        }
        if !target_state.stage().is_failed() {
            let _wait = self.ctx.register_wait(&waiter.key, &target.key, stage)?;
            if let Err(err) = self.advance(target.clone(), stage).await {
                tracing::trace!("[Driver] {} required by {}: {err}", target.key, waiter.key);
            }
            target_state.wait_for(stage).await?;
        }
        if target_state.reached() >= stage {
            return Ok(());
        }
        Err(self.dependency_failed(waiter, target))
    }

    /// Suspend `waiter` until `target` is at `stage` or has failed, without driving `target`.
    ///
    /// Fails `waiter` like [StageDriver::require] when `target` failed before reaching `stage`.
    async fn await_stage(
        &self,
        waiter: &Page,
        target: &Page,
        stage: Stage,
    ) -> Result<(), BuildError> {
        let target_state = self.ctx.page(&target.key);
        if target_state.reached() < stage && !target_state.stage().is_failed() {
            let _wait = self.ctx.register_wait(&waiter.key, &target.key, stage)?;
            target_state.wait_for(stage).await?;
        }
        if target_state.reached() >= stage {
            return Ok(());
        }
        Err(self.dependency_failed(waiter, target))
    }

    fn dependency_failed(&self, waiter: &Page, target: &Page) -> BuildError {
        let err = BuildError::DependencyFailed {
            page: waiter.key.to_string(),
            dependency: target.key.to_string(),
        };
        let waiter_state = self.ctx.page(&waiter.key);
        self.fail(waiter, &waiter_state, Stage::DependencyFailure, err)
    }
}

fn document(page: &Page, state: &PageState) -> Result<Arc<Document>, BuildError> {
    state
        .with_record(|record| record.document.clone())
        .ok_or_else(|| BuildError::Internal(format!("{} has no document", page.path)))
}
