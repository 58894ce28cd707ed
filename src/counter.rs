//! Hierarchical section numbering.

use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Produces dotted section numbers (`1`, `1.2`, `1.3`) from a stream of "increase at level N"
/// events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    components: Vec<u32>,
}

/// Raised when a level is requested that skips one or more intermediate levels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot number level {level} while the counter is at depth {depth}")]
pub struct CounterRangeError {
    pub level: usize,
    pub depth: usize,
}

impl Counter {
    pub fn new() -> Counter {
        Counter::default()
    }

    /// Advance the component at `level` (1-based), discarding every deeper component.
    ///
    /// Opening a level exactly one deeper than the current depth appends a `1`. Opening a level
    /// further down than that is an error rather than a silently padded number.
    pub fn increase(&mut self, level: usize) -> Result<(), CounterRangeError> {
        let depth = self.components.len();
        let Some(n) = level.checked_sub(1) else {
            return Err(CounterRangeError { level, depth });
        };
        if n < depth {
            self.components[n] += 1;
            self.components.truncate(n + 1);
        } else if n == depth {
            self.components.push(1);
        } else {
            return Err(CounterRangeError { level, depth });
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }
}

impl Display for Counter {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let joined = self
            .components
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{joined}")
    }
}
