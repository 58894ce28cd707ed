//! Progress notifications and the final build report.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
};

use crate::{
    issue::Issue,
    project::{Page, PageId, Volume},
    stage::Stage,
};

/// Receives structural notifications for live progress display. Every method defaults to doing
/// nothing, so an implementation only overrides what it shows.
pub trait Reporter: Send + Sync {
    fn volume_registered(&self, _volume: &Volume) {}

    fn page_registered(&self, _page: &Page) {}

    fn stage_reached(&self, _page: &Page, _stage: Stage) {}

    fn volume_finished(&self, _volume: &Volume, _failed: bool) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// Logs progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn volume_registered(&self, volume: &Volume) {
        tracing::info!(
            "[Reporter] Volume '{}' ({} page(s))",
            volume.name,
            volume.pages().len()
        );
    }

    fn page_registered(&self, page: &Page) {
        tracing::debug!("[Reporter] Page {} ({})", page.key, page.path);
    }

    fn stage_reached(&self, page: &Page, stage: Stage) {
        if stage.is_failed() {
            tracing::info!("[Reporter] {} -> {stage}", page.path);
        } else {
            tracing::trace!("[Reporter] {} -> {stage}", page.path);
        }
    }

    fn volume_finished(&self, volume: &Volume, failed: bool) {
        if failed {
            tracing::warn!("[Reporter] Volume '{}' failed", volume.name);
        } else {
            tracing::info!("[Reporter] Volume '{}' built", volume.name);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub path: String,
    pub id: PageId,
    pub stage: Stage,
    pub issues: Vec<Issue>,
    /// Why the page failed, for failures that carry no issues of their own.
    pub fault: Option<String>,
}

impl PageReport {
    pub fn is_failed(&self) -> bool {
        self.stage.is_failed()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeReport {
    pub name: String,
    pub primary: bool,
    pub failed: bool,
    pub artifacts: Vec<PathBuf>,
    /// In document order.
    pub pages: Vec<PageReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub volumes: Vec<VolumeReport>,
}

impl BuildReport {
    /// True when no volume failed.
    pub fn is_success(&self) -> bool {
        self.volumes.iter().all(|v| !v.failed)
    }

    pub fn issue_count(&self) -> usize {
        self.volumes
            .iter()
            .flat_map(|v| v.pages.iter())
            .map(|p| p.issues.len())
            .sum()
    }

    pub fn volume(&self, name: &str) -> Option<&VolumeReport> {
        self.volumes.iter().find(|v| v.name == name)
    }

    pub fn to_json(&self) -> Result<String, crate::error::BuildError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Display for BuildReport {
    /// Diagnostics per page in file order, followed by a per-volume summary line.
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        for volume in self.volumes.iter() {
            for page in volume.pages.iter().filter(|p| p.is_failed()) {
                writeln!(f, "{}: {}", volume.name, page.path)?;
                for issue in page.issues.iter() {
                    writeln!(f, "  {issue}")?;
                }
                if page.issues.is_empty() {
                    match &page.fault {
                        Some(fault) => writeln!(f, "  {fault}")?,
                        None => writeln!(f, "  {}", page.stage)?,
                    }
                }
            }
        }
        for volume in self.volumes.iter() {
            let failed = volume.pages.iter().filter(|p| p.is_failed()).count();
            if volume.failed {
                writeln!(
                    f,
                    "volume '{}' failed: {failed} of {} page(s) failed",
                    volume.name,
                    volume.pages.len()
                )?;
            } else {
                writeln!(
                    f,
                    "volume '{}' built: {} page(s), {} artifact(s)",
                    volume.name,
                    volume.pages.len(),
                    volume.artifacts.len()
                )?;
            }
        }
        Ok(())
    }
}
