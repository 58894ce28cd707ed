use std::{fmt, io, path::StripPrefixError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use walkdir::Error as WalkdirError;

use crate::{counter::CounterRangeError, issue::Issue, stage::Stage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Source parse error: {0}")]
    Parse(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Numbering error: {0}")]
    Numbering(String),
    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("{page}: {} issue(s) occurred", .issues.len())]
    IssuesOccurred { page: String, issues: Vec<Issue> },
    #[error("{page}: {cause}")]
    PageFailed { page: String, cause: Box<BuildError> },
    #[error("{page}: dependency {dependency} failed")]
    DependencyFailed { page: String, dependency: String },
    #[error("Volume '{0}' failed")]
    VolumeFailed(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("{context}: {} failure(s){}", .causes.len(), format_causes(.causes))]
    Aggregate {
        context: String,
        causes: Vec<BuildError>,
    },
}

fn format_causes(causes: &[BuildError]) -> String {
    causes
        .iter()
        .map(|cause| {
            cause
                .to_string()
                .lines()
                .map(|line| format!("\n  {line}"))
                .collect::<String>()
        })
        .collect()
}

impl BuildError {
    /// Failures that were already surfaced through the diagnostic channel or a page's recorded
    /// fault. The failure aggregator drops these so that a single problem is never reported twice.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            BuildError::IssuesOccurred { .. }
                | BuildError::PageFailed { .. }
                | BuildError::DependencyFailed { .. }
                | BuildError::VolumeFailed(_)
        )
    }

    /// Faults a stage body raises about its own page: unreadable or malformed sources, numbering
    /// and fragment rendering. Cycles, invalid transitions and panicked tasks are not.
    pub fn is_page_fault(&self) -> bool {
        match self {
            BuildError::Io(_)
            | BuildError::NotFound(_)
            | BuildError::Parse(_)
            | BuildError::Serialization(_)
            | BuildError::Render(_)
            | BuildError::Numbering(_) => true,
            BuildError::Aggregate { causes, .. } => {
                !causes.is_empty() && causes.iter().all(BuildError::is_page_fault)
            }
            _ => false,
        }
    }

    /// The leaf failures of this error, descending through nested aggregates.
    pub fn leaves(&self) -> Vec<&BuildError> {
        match self {
            BuildError::Aggregate { causes, .. } => {
                causes.iter().flat_map(|cause| cause.leaves()).collect()
            }
            other => vec![other],
        }
    }
}

impl From<StripPrefixError> for BuildError {
    fn from(src: StripPrefixError) -> BuildError {
        BuildError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for BuildError {
    fn from(src: toml::de::Error) -> BuildError {
        BuildError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for BuildError {
    fn from(src: JsonError) -> BuildError {
        BuildError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for BuildError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => BuildError::NotFound(format!("{x}")),
            _ => BuildError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<WalkdirError> for BuildError {
    fn from(x: WalkdirError) -> Self {
        match x.io_error().map(|e| e.kind()) {
            Some(io::ErrorKind::NotFound) => BuildError::NotFound(format!("{x}")),
            _ => BuildError::Io(format!("Directory walk failed: {x}")),
        }
    }
}

impl From<fmt::Error> for BuildError {
    fn from(x: fmt::Error) -> Self {
        BuildError::Render(format!("{x}"))
    }
}

impl From<RegexError> for BuildError {
    fn from(x: RegexError) -> Self {
        BuildError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<CounterRangeError> for BuildError {
    fn from(x: CounterRangeError) -> Self {
        BuildError::Numbering(format!("{x}"))
    }
}

impl From<tokio::task::JoinError> for BuildError {
    fn from(x: tokio::task::JoinError) -> Self {
        BuildError::Internal(format!("build task did not complete: {x}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_ignorable_classification() {
        assert!(BuildError::VolumeFailed("en".to_string()).is_ignorable());
        assert!(BuildError::IssuesOccurred {
            page: "index".to_string(),
            issues: vec![]
        }
        .is_ignorable());
        assert!(BuildError::DependencyFailed {
            page: "a".to_string(),
            dependency: "b".to_string()
        }
        .is_ignorable());
        assert!(BuildError::PageFailed {
            page: "index.md".to_string(),
            cause: Box::new(BuildError::Parse("bad front matter".to_string()))
        }
        .is_ignorable());
        assert!(!BuildError::Config("bad".to_string()).is_ignorable());
        assert!(!BuildError::Parse("bad front matter".to_string()).is_ignorable());
        assert!(!BuildError::Aggregate {
            context: "build".to_string(),
            causes: vec![]
        }
        .is_ignorable());
    }

    #[test]
    fn test_page_faults_exclude_run_level_failures() {
        assert!(BuildError::Parse("bad front matter".to_string()).is_page_fault());
        assert!(BuildError::Numbering("depth 0".to_string()).is_page_fault());
        assert!(!BuildError::Config("bad".to_string()).is_page_fault());
        assert!(!BuildError::Internal("panicked".to_string()).is_page_fault());
        assert!(!BuildError::DependencyCycle(vec!["a".to_string(), "a".to_string()]).is_page_fault());
        let mixed = BuildError::Aggregate {
            context: "index.md Process3".to_string(),
            causes: vec![
                BuildError::Io("denied".to_string()),
                BuildError::Internal("panicked".to_string()),
            ],
        };
        assert!(!mixed.is_page_fault());

        let wrapped = BuildError::PageFailed {
            page: "index.md".to_string(),
            cause: Box::new(BuildError::Parse("bad front matter".to_string())),
        };
        assert_eq!(
            wrapped.to_string(),
            "index.md: Source parse error: bad front matter"
        );
    }

    #[test]
    fn test_aggregate_message_lists_every_cause() {
        let err = BuildError::Aggregate {
            context: "volume en".to_string(),
            causes: vec![
                BuildError::Config("duplicate volume".to_string()),
                BuildError::Aggregate {
                    context: "page intro".to_string(),
                    causes: vec![BuildError::Parse("bad front matter".to_string())],
                },
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("volume en: 2 failure(s)"));
        assert!(message.contains("\n  Configuration error: duplicate volume"));
        assert!(message.contains("\n    Source parse error: bad front matter"));
        assert_eq!(err.leaves().len(), 2);
    }
}
