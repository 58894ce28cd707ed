//! The page stage model.
//!
//! Every page moves through the processing stages in order:
//!
//! ```text
//! Initialize → Prepare → Process1 → Process2 → Process3 → Process4
//! ```
//!
//! and may at any point drop into one of three absorbing failure stages. Failure stages sort after
//! every processing stage, so "has this page progressed at least as far as S" is a plain `>=`
//! comparison that is also satisfied by a page that has given up.

use enumset::{enum_set, EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::error::BuildError;

#[derive(Debug, Default, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(repr = "u16")]
pub enum Stage {
    /// Default state of a page record; nothing has run yet.
    #[default]
    Initialize,
    /// Source loaded and converted into a document tree.
    Prepare,
    /// Anchors collected. Cross-page link resolution waits on this stage.
    Process1,
    /// Section numbers assigned.
    Process2,
    /// Outbound links and images resolved.
    Process3,
    /// Text checks run and page body rendered.
    Process4,
    /// The page itself produced diagnostics or hit an internal fault.
    Failure,
    /// A page this page depends on failed.
    DependencyFailure,
    /// The whole volume was aborted.
    VolumeFailure,
}

/// The absorbing failure stages.
pub const FAILED_STAGES: EnumSet<Stage> =
    enum_set!(Stage::Failure | Stage::DependencyFailure | Stage::VolumeFailure);

/// The processing stages, in order.
pub const PROCESSING_STAGES: [Stage; 6] = [
    Stage::Initialize,
    Stage::Prepare,
    Stage::Process1,
    Stage::Process2,
    Stage::Process3,
    Stage::Process4,
];

impl Stage {
    /// Stage at which a page's anchor set is final.
    pub const ANCHORS_COLLECTED: Stage = Stage::Process1;
    /// Stage at which a page's section numbers are final.
    pub const NUMBERED: Stage = Stage::Process2;
    /// Last processing stage; renderers read records from here on.
    pub const FINISHED: Stage = Stage::Process4;

    pub fn is_failed(self) -> bool {
        FAILED_STAGES.contains(self)
    }

    /// The processing stages strictly after `old` up to and including `new`, in order.
    ///
    /// Fails when either end is a failure stage or when `new` does not lie ahead of `old`.
    pub fn range(old: Stage, new: Stage) -> Result<Vec<Stage>, BuildError> {
        if old.is_failed() || new.is_failed() || new <= old {
            return Err(BuildError::InvalidTransition { from: old, to: new });
        }
        Ok(PROCESSING_STAGES
            .iter()
            .copied()
            .filter(|stage| *stage > old && *stage <= new)
            .collect())
    }

    /// The next processing stage, if any.
    pub fn next(self) -> Option<Stage> {
        PROCESSING_STAGES
            .iter()
            .copied()
            .find(|stage| !self.is_failed() && *stage > self)
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_range_is_exclusive_of_start() {
        assert_eq!(
            Stage::range(Stage::Process1, Stage::Process3).unwrap(),
            vec![Stage::Process2, Stage::Process3]
        );
        assert_eq!(
            Stage::range(Stage::Initialize, Stage::Process4).unwrap(),
            vec![
                Stage::Prepare,
                Stage::Process1,
                Stage::Process2,
                Stage::Process3,
                Stage::Process4
            ]
        );
    }

    #[test]
    fn test_range_rejects_backwards_and_failed() {
        assert!(Stage::range(Stage::Process3, Stage::Process3).is_err());
        assert!(Stage::range(Stage::Process3, Stage::Process1).is_err());
        for failed in FAILED_STAGES {
            assert_eq!(
                Stage::range(failed, Stage::Process4),
                Err(BuildError::InvalidTransition {
                    from: failed,
                    to: Stage::Process4
                })
            );
            assert!(Stage::range(Stage::Prepare, failed).is_err());
        }
    }

    #[test]
    fn test_failure_classification_and_order() {
        let failed: Vec<Stage> = PROCESSING_STAGES
            .iter()
            .copied()
            .filter(|s| s.is_failed())
            .collect();
        assert!(failed.is_empty());
        assert!(Stage::Failure.is_failed());
        assert!(Stage::DependencyFailure.is_failed());
        assert!(Stage::VolumeFailure.is_failed());
        for failed in FAILED_STAGES {
            assert!(failed > Stage::Process4);
        }
        assert_eq!(Stage::Process2.next(), Some(Stage::Process3));
        assert_eq!(Stage::Process4.next(), None);
        assert_eq!(Stage::Failure.next(), None);
    }
}
