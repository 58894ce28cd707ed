//! Per-run mutable state.
//!
//! Pages, volumes and anchors are immutable entities shared by every build run. Everything a run
//! computes for them (stage, document tree, anchors, numbers, issues, rendered bytes) lives in the
//! [RuntimeContext] of that run, created by [run_isolated] and dropped when the run ends. Two runs
//! over the same [crate::project::Project] never observe each other's state.

use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    future::Future,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::watch;

use crate::{
    codec::{html::HeadingDecor, Document},
    counter::Counter,
    error::BuildError,
    issue::Issue,
    lint::spell::SpellChecker,
    project::{AnchorKey, PageKey},
    stage::Stage,
};

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

/// Identifies one build run. Keys process-wide bookkeeping that must not leak between runs.
pub type RunId = u64;

/// Where a resolved page reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub page: PageKey,
    pub anchor: Option<String>,
}

impl LinkTarget {
    /// `<page-id>` or `<page-id>--<anchor>`, usable as an element id.
    pub fn fragment(&self) -> String {
        match &self.anchor {
            Some(anchor) => self.page.id.anchor_id(anchor),
            None => self.page.id.to_string(),
        }
    }
}

/// What a run has computed for one page so far.
#[derive(Debug, Clone, Default)]
pub struct PageRecord {
    /// Last processing stage completed. Kept when the page fails.
    pub reached: Stage,
    pub document: Option<Arc<Document>>,
    pub title: Option<String>,
    /// Anchor names in heading order.
    pub anchors: Vec<String>,
    /// One entry per heading, in heading order.
    pub headings: Vec<HeadingDecor>,
    /// Resolved page references, keyed by the href as written.
    pub links: BTreeMap<String, LinkTarget>,
    pub issues: BTreeSet<Issue>,
    /// Page body rendered with `#<id>` fragment links.
    pub content: Option<String>,
    /// The error that moved the page into a failure stage.
    pub fault: Option<BuildError>,
}

#[derive(Debug)]
pub struct PageState {
    stage: watch::Sender<Stage>,
    record: Mutex<PageRecord>,
}

impl Default for PageState {
    fn default() -> Self {
        let (stage, _) = watch::channel(Stage::default());
        PageState {
            stage,
            record: Mutex::new(PageRecord::default()),
        }
    }
}

impl PageState {
    pub fn stage(&self) -> Stage {
        *self.stage.borrow()
    }

    pub fn reached(&self) -> Stage {
        self.record.lock().reached
    }

    /// Move forward to processing stage `stage`. Failure stages are absorbing.
    ///
    /// Check and update happen under the stage channel's lock, so racing writers are serialized.
    pub fn advance_to(&self, stage: Stage) -> Result<(), BuildError> {
        let mut outcome = Ok(());
        self.stage.send_if_modified(|current| {
            if current.is_failed() || stage.is_failed() || stage <= *current {
                outcome = Err(BuildError::InvalidTransition {
                    from: *current,
                    to: stage,
                });
                return false;
            }
            self.record.lock().reached = stage;
            *current = stage;
            true
        });
        outcome
    }

    /// Move into failure stage `stage`, recording `fault`. The first failure wins; failing an
    /// already failed page changes nothing.
    pub fn fail(&self, stage: Stage, fault: BuildError) {
        debug_assert!(stage.is_failed());
        self.stage.send_if_modified(|current| {
            if current.is_failed() {
                return false;
            }
            self.record.lock().fault = Some(fault);
            *current = stage;
            true
        });
    }

    /// The error this page failed with.
    pub fn fault(&self) -> BuildError {
        let stage = self.stage();
        self.record
            .lock()
            .fault
            .clone()
            .unwrap_or(BuildError::InvalidTransition {
                from: stage,
                to: stage,
            })
    }

    /// Suspend until the page is at `stage` or beyond (a failure stage counts as beyond). Returns
    /// immediately if that already happened.
    pub async fn wait_for(&self, stage: Stage) -> Result<Stage, BuildError> {
        let mut receiver = self.stage.subscribe();
        let reached = receiver
            .wait_for(|current| *current >= stage)
            .await
            .map_err(|e| BuildError::Internal(format!("stage signal closed: {e}")))?;
        Ok(*reached)
    }

    pub fn add_issue(&self, issue: Issue) {
        self.record.lock().issues.insert(issue);
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.record.lock().issues.iter().cloned().collect()
    }

    /// Run `f` with the record locked. Never hold the lock across an await.
    pub fn with_record<R>(&self, f: impl FnOnce(&mut PageRecord) -> R) -> R {
        f(&mut self.record.lock())
    }

    /// A copy of the record, for renderers and reports.
    pub fn snapshot(&self) -> PageRecord {
        self.record.lock().clone()
    }
}

#[derive(Default)]
pub struct VolumeState {
    pub counter: Mutex<Counter>,
    failed: AtomicBool,
    spell_checker: Mutex<Option<Arc<dyn SpellChecker>>>,
    artifacts: Mutex<Vec<PathBuf>>,
}

impl VolumeState {
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn spell_checker(&self) -> Option<Arc<dyn SpellChecker>> {
        self.spell_checker.lock().clone()
    }

    pub fn set_spell_checker(&self, checker: Arc<dyn SpellChecker>) {
        *self.spell_checker.lock() = Some(checker);
    }

    pub fn add_artifact(&self, path: PathBuf) {
        self.artifacts.lock().push(path);
    }

    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.artifacts.lock().clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorRecord {
    pub title: String,
    pub number: Option<String>,
    /// How many headings of the page produced this anchor name.
    pub occurrences: usize,
}

#[derive(Debug, Default)]
pub struct AnchorState {
    record: Mutex<AnchorRecord>,
}

impl AnchorState {
    pub fn record(&self) -> AnchorRecord {
        self.record.lock().clone()
    }

    pub fn with_record<R>(&self, f: impl FnOnce(&mut AnchorRecord) -> R) -> R {
        f(&mut self.record.lock())
    }
}

/// Releases a registered wait when dropped.
pub struct WaitGuard<'a> {
    ctx: &'a RuntimeContext,
    waiter: PageKey,
    target: PageKey,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut waits = self.ctx.waits.lock();
        if let Some(targets) = waits.get_mut(&self.waiter) {
            if let Some(pos) = targets.iter().position(|(t, _)| *t == self.target) {
                targets.remove(pos);
            }
            if targets.is_empty() {
                waits.remove(&self.waiter);
            }
        }
    }
}

pub struct RuntimeContext {
    run: RunId,
    pages: Mutex<HashMap<PageKey, Arc<PageState>>>,
    volumes: Mutex<HashMap<String, Arc<VolumeState>>>,
    anchors: Mutex<HashMap<AnchorKey, Arc<AnchorState>>>,
    /// Wait-for graph: waiting page to the pages (and stages) it is suspended on.
    waits: Mutex<HashMap<PageKey, Vec<(PageKey, Stage)>>>,
}

impl RuntimeContext {
    /// A fresh context with empty page, volume and anchor maps.
    pub fn init() -> RuntimeContext {
        let run = NEXT_RUN.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("[Runtime] Initialized context for run {run}");
        RuntimeContext {
            run,
            pages: Mutex::new(HashMap::new()),
            volumes: Mutex::new(HashMap::new()),
            anchors: Mutex::new(HashMap::new()),
            waits: Mutex::new(HashMap::new()),
        }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// This run's state for `key`, created with default values on first access.
    pub fn page(&self, key: &PageKey) -> Arc<PageState> {
        self.pages.lock().entry(key.clone()).or_default().clone()
    }

    pub fn volume(&self, name: &str) -> Arc<VolumeState> {
        self.volumes
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn anchor(&self, key: &AnchorKey) -> Arc<AnchorState> {
        self.anchors.lock().entry(key.clone()).or_default().clone()
    }

    /// Like [RuntimeContext::anchor] but without creating a missing entry.
    pub fn find_anchor(&self, key: &AnchorKey) -> Option<Arc<AnchorState>> {
        self.anchors.lock().get(key).cloned()
    }

    /// Record that `waiter` is about to suspend until `target` reaches `stage`.
    ///
    /// Fails with [BuildError::DependencyCycle] if `target` is itself (transitively) waiting on
    /// `waiter`, since neither could ever make progress.
    pub fn register_wait(
        &self,
        waiter: &PageKey,
        target: &PageKey,
        stage: Stage,
    ) -> Result<WaitGuard<'_>, BuildError> {
        let mut waits = self.waits.lock();
        // An edge whose target already reached its stage is about to be released.
        let pending = |key: &PageKey, stage: Stage| {
            self.pages
                .lock()
                .get(key)
                .is_none_or(|state| state.stage() < stage)
        };
        if let Some(path) = find_path(&waits, target, waiter, pending) {
            let mut chain = vec![waiter.to_string()];
            chain.extend(path.iter().map(|key| key.to_string()));
            tracing::warn!("[Runtime] Wait cycle: {}", chain.join(" -> "));
            return Err(BuildError::DependencyCycle(chain));
        }
        waits
            .entry(waiter.clone())
            .or_default()
            .push((target.clone(), stage));
        Ok(WaitGuard {
            ctx: self,
            waiter: waiter.clone(),
            target: target.clone(),
        })
    }

    /// Number of waits currently registered.
    pub fn pending_waits(&self) -> usize {
        self.waits.lock().values().map(|targets| targets.len()).sum()
    }
}

/// Path from `from` to `to` through the pending edges of the wait-for graph, both ends included.
fn find_path(
    waits: &HashMap<PageKey, Vec<(PageKey, Stage)>>,
    from: &PageKey,
    to: &PageKey,
    pending: impl Fn(&PageKey, Stage) -> bool,
) -> Option<Vec<PageKey>> {
    let mut stack = vec![vec![from.clone()]];
    let mut seen = BTreeSet::new();
    while let Some(path) = stack.pop() {
        let Some(last) = path.last() else {
            continue;
        };
        if last == to {
            return Some(path);
        }
        if !seen.insert(last.clone()) {
            continue;
        }
        for (next, stage) in waits.get(last).into_iter().flatten() {
            if !pending(next, *stage) {
                continue;
            }
            let mut extended = path.clone();
            extended.push(next.clone());
            stack.push(extended);
        }
    }
    None
}

/// Run `body` inside a freshly initialized [RuntimeContext]. Every call, nested or concurrent,
/// gets its own context, discarded once `body` completes.
pub async fn run_isolated<F, Fut, T>(body: F) -> T
where
    F: FnOnce(Arc<RuntimeContext>) -> Fut,
    Fut: Future<Output = T>,
{
    let ctx = Arc::new(RuntimeContext::init());
    let run = ctx.run();
    let result = body(ctx).await;
    tracing::debug!("[Runtime] Discarded context for run {run}");
    result
}
