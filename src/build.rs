//! Top-level build orchestration.
//!
//! A [Builder] is process-level: it owns the loader registry, the output targets, the reporter and
//! the single-flight tables shared by every run. Each call to [Builder::build] is one isolated run
//! with its own [RuntimeContext]; concurrent calls over the same [Project] never see each other's
//! state.
//!
//! Per run, every volume is built concurrently. Within a volume every page is driven to the
//! targets' required stage concurrently; a failing page never stops its siblings and a failing
//! volume never stops other volumes. Only non-ignorable failures escape [Builder::build].

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    codec::LoaderMap,
    driver::{StageDriver, StageKey},
    error::BuildError,
    flight::SingleFlight,
    gather::TaskGroup,
    lint::WordList,
    project::{Project, Volume},
    render::{Backend, RenderPage},
    report::{BuildReport, NoopReporter, PageReport, Reporter, VolumeReport},
    runtime::{run_isolated, RuntimeContext},
    stage::Stage,
};

/// A backend and the directory its artifacts are written to.
#[derive(Clone)]
pub struct Target {
    pub backend: Arc<dyn Backend>,
    pub output: PathBuf,
}

#[derive(Clone)]
pub struct Builder {
    loaders: LoaderMap,
    targets: Vec<Target>,
    reporter: Arc<dyn Reporter>,
    stages: SingleFlight<StageKey, ()>,
    dictionaries: SingleFlight<PathBuf, Arc<WordList>>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            loaders: LoaderMap::create(),
            targets: Vec::new(),
            reporter: Arc::new(NoopReporter),
            stages: SingleFlight::new(),
            dictionaries: SingleFlight::new(),
        }
    }

    pub fn with_loaders(mut self, loaders: LoaderMap) -> Builder {
        self.loaders = loaders;
        self
    }

    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Builder {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn with_target<B: Backend + 'static, P: Into<PathBuf>>(mut self, backend: B, output: P) -> Builder {
        self.targets.push(Target {
            backend: Arc::new(backend),
            output: output.into(),
        });
        self
    }

    pub fn loaders(&self) -> &LoaderMap {
        &self.loaders
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Load the project under `root`, discovering every file a registered loader understands.
    pub fn load_project<P: AsRef<Path>>(&self, root: P) -> Result<Arc<Project>, BuildError> {
        Ok(Arc::new(Project::load(root, &self.loaders.extensions())?))
    }

    /// The stage every page has to reach: the latest stage any target requires.
    pub fn required_stage(&self) -> Stage {
        self.targets
            .iter()
            .map(|target| target.backend.required_stage())
            .max()
            .unwrap_or(Stage::FINISHED)
    }

    /// Build every volume of `project` in a fresh, isolated run.
    ///
    /// Diagnostics, page faults and failed volumes are part of the returned report. An `Err` means
    /// a genuine fault (unreadable dictionary, dependency cycle, render or write failure, panicked
    /// task) and carries all of them.
    pub async fn build(&self, project: Arc<Project>) -> Result<BuildReport, BuildError> {
        run_isolated(|ctx| async move {
            tracing::info!(
                "[Builder] Run {} over {:?} ({} target(s))",
                ctx.run(),
                project.root,
                self.targets.len()
            );
            let driver = StageDriver::new(
                ctx.clone(),
                project.clone(),
                self.loaders.clone(),
                self.reporter.clone(),
                self.stages.clone(),
            );
            let group = TaskGroup::new();
            for volume in project.volumes() {
                let builder = self.clone();
                let driver = driver.clone();
                let volume = volume.clone();
                group.spawn(async move { builder.build_volume(&driver, volume).await });
            }
            let outcome = group
                .gather_all(format!("build of {}", project.root.display()))
                .await;
            let report = collect_report(&project, &ctx);
            tracing::info!(
                "[Builder] Run {} finished: {} issue(s), success: {}",
                ctx.run(),
                report.issue_count(),
                report.is_success() && outcome.is_ok()
            );
            outcome.map(|()| report)
        })
        .await
    }

    async fn build_volume(&self, driver: &StageDriver, volume: Arc<Volume>) -> Result<(), BuildError> {
        let ctx = driver.ctx();
        let volume_state = ctx.volume(&volume.name);
        self.reporter.volume_registered(&volume);
        for page in volume.pages() {
            self.reporter.page_registered(page);
        }

        if let Err(err) = self.prepare_volume(ctx, &driver.project().root, &volume).await {
            tracing::warn!("[Builder] Volume '{}' aborted: {err}", volume.name);
            let fault = BuildError::VolumeFailed(volume.name.clone());
            for page in volume.pages() {
                ctx.page(&page.key).fail(Stage::VolumeFailure, fault.clone());
                self.reporter.stage_reached(page, Stage::VolumeFailure);
            }
            volume_state.mark_failed();
            self.reporter.volume_finished(&volume, true);
            return Err(err);
        }

        let required = self.required_stage();
        let group = TaskGroup::new();
        for page in volume.pages() {
            group.spawn(driver.advance(page.clone(), required));
        }
        let gathered = group
            .gather_all(format!("volume '{}'", volume.name))
            .await;
        let page_failed = volume
            .pages()
            .iter()
            .any(|page| ctx.page(&page.key).stage().is_failed());
        if gathered.is_err() || page_failed {
            volume_state.mark_failed();
            self.reporter.volume_finished(&volume, true);
            gathered?;
            return Err(BuildError::VolumeFailed(volume.name.clone()));
        }

        if let Err(err) = self.write_artifacts(ctx, &volume).await {
            volume_state.mark_failed();
            self.reporter.volume_finished(&volume, true);
            return Err(err);
        }
        self.reporter.volume_finished(&volume, false);
        Ok(())
    }

    /// Volume-wide setup that must succeed before any page is processed.
    async fn prepare_volume(
        &self,
        ctx: &RuntimeContext,
        root: &Path,
        volume: &Volume,
    ) -> Result<(), BuildError> {
        let Some(dictionary) = volume.config.dictionary.as_ref() else {
            return Ok(());
        };
        let path = root.join(dictionary);
        let words = self
            .dictionaries
            .once(path.clone(), move || async move {
                WordList::load(&path).await.map(Arc::new)
            })
            .await?;
        ctx.volume(&volume.name).set_spell_checker(words);
        Ok(())
    }

    async fn write_artifacts(&self, ctx: &RuntimeContext, volume: &Volume) -> Result<(), BuildError> {
        if self.targets.is_empty() {
            return Ok(());
        }
        let pages: Vec<RenderPage> = volume
            .pages()
            .iter()
            .map(|page| RenderPage {
                page: page.clone(),
                record: ctx.page(&page.key).snapshot(),
            })
            .collect();
        let volume_state = ctx.volume(&volume.name);
        for target in self.targets.iter() {
            let artifacts = target.backend.render(volume, &pages)?;
            tracing::debug!(
                "[Builder] {} rendered {} artifact(s) for '{}'",
                target.backend.name(),
                artifacts.len(),
                volume.name
            );
            for artifact in artifacts {
                let path = target.output.join(&artifact.path);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, &artifact.bytes).await?;
                volume_state.add_artifact(path);
            }
        }
        Ok(())
    }
}

fn collect_report(project: &Project, ctx: &RuntimeContext) -> BuildReport {
    let volumes = project
        .volumes()
        .iter()
        .map(|volume| {
            let pages = volume
                .pages()
                .iter()
                .map(|page| {
                    let state = ctx.page(&page.key);
                    let stage = state.stage();
                    let record = state.snapshot();
                    PageReport {
                        path: page.path.clone(),
                        id: page.id().clone(),
                        stage,
                        issues: record.issues.into_iter().collect(),
                        fault: stage.is_failed().then(|| state.fault().to_string()),
                    }
                })
                .collect();
            let volume_state = ctx.volume(&volume.name);
            VolumeReport {
                name: volume.name.clone(),
                primary: volume.primary,
                failed: volume_state.is_failed(),
                artifacts: volume_state.artifacts(),
                pages,
            }
        })
        .collect();
    BuildReport { volumes }
}
