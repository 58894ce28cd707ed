//! # docweave
//!
//! A dependency-aware documentation builder. docweave turns a tree of source pages into web and
//! single-document output, resolving cross-page references (links, anchors, section numbers) and
//! reporting authoring problems (broken links, misspellings, style issues) as structured
//! diagnostics.
//!
//! ## Overview
//!
//! Every page moves through an ordered set of [stage::Stage]s. A page that needs something only
//! another page can provide (its anchors, its section numbers) suspends until that page reaches
//! the stage where the information becomes final. Pages of a volume are processed concurrently on
//! one thread, and failures are isolated per page and per volume then aggregated into one report.
//!
//! ### Key Features
//!
//! - **Stage-driven processing**: pages advance through `Prepare → Process1 … Process4`
//! - **Cross-page waits**: level-triggered stage signals, with a wait-for graph that fails fast on
//!   genuine cycles
//! - **Single-flight execution**: concurrent requests for the same stage share one execution
//! - **Failure aggregation**: page diagnostics are reported once; only unexpected faults escape
//! - **Isolated runs**: concurrent builds over the same project never share mutable state
//!
//! ## Architecture
//!
//! - **[`project`]**: the immutable project tree (volumes, pages, identifiers)
//! - **[`codec`]**: source loaders (`SourceLoader`, `LoaderMap`) and the document tree
//! - **[`runtime`]**: per-run state (`RuntimeContext`, `run_isolated`)
//! - **[`driver`]**: the stage driver (`StageDriver`)
//! - **[`build`]**: run orchestration (`Builder`)
//! - **[`render`]**: output backends (`WebBackend`, `DocumentBackend`)
//! - **[`lint`]**: spelling and style checks
//! - **[`report`]**: progress reporting and the final `BuildReport`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docweave::{build::Builder, render::WebBackend};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = Builder::new().with_target(WebBackend, "./site");
//!     let project = builder.load_project("./docs")?;
//!     let report = builder.build(project).await?;
//!     if !report.is_success() {
//!         eprint!("{report}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! An optional `docweave.toml` at the project root declares volumes; see [`config`].

pub mod build;
pub mod codec;
pub mod config;
pub mod counter;
pub mod driver;
pub mod error;
pub mod flight;
pub mod gather;
pub mod issue;
pub mod lint;
pub mod project;
pub mod render;
pub mod report;
pub mod runtime;
pub mod stage;

#[cfg(test)]
mod tests;

pub use error::*;
