//! # Compliance Score
//!
//! A 0–100 heuristic of how much provable evidence backs a license sale.
//!
//! ```text
//! score = min(100, 25·payment + 25·license_token + 25·anchor_ok
//!                  + 25·archive + min(25, training_units))
//! ```
//!
//! Only an anchoring outcome of `ok` earns the anchor points; `failed` and
//! `skipped` both earn zero.

use serde::{Deserialize, Serialize};

/// Upper bound of the score.
pub const MAX_SCORE: u8 = 100;

const FLAG_POINTS: u64 = 25;
const TRAINING_CAP: u64 = 25;

/// The artifacts a finalization produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceInputs {
    pub has_payment: bool,
    pub has_license_token: bool,
    pub anchor_ok: bool,
    pub has_archive: bool,
    /// Sum of recorded training units for the IP asset.
    pub training_units: u64,
}

impl ComplianceInputs {
    pub fn score(&self) -> u8 {
        let flags = [
            self.has_payment,
            self.has_license_token,
            self.anchor_ok,
            self.has_archive,
        ];
        let flag_points: u64 = flags.iter().filter(|f| **f).count() as u64 * FLAG_POINTS;
        let training = self.training_units.min(TRAINING_CAP);
        let total = (flag_points + training).min(u64::from(MAX_SCORE));
        // total <= 100 so the narrowing is lossless.
        total as u8
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn inputs() -> impl Strategy<Value = ComplianceInputs> {
        (
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<u64>(),
        )
            .prop_map(|(p, t, a, ar, u)| ComplianceInputs {
                has_payment: p,
                has_license_token: t,
                anchor_ok: a,
                has_archive: ar,
                training_units: u,
            })
    }

    proptest! {
        #[test]
        fn score_within_bounds(i in inputs()) {
            prop_assert!(i.score() <= MAX_SCORE);
        }

        #[test]
        fn score_non_decreasing_in_training_units(i in inputs(), extra in 0u64..1_000) {
            let more = ComplianceInputs {
                training_units: i.training_units.saturating_add(extra),
                ..i
            };
            prop_assert!(more.score() >= i.score());
        }

        #[test]
        fn score_saturates(i in inputs()) {
            let capped = ComplianceInputs { training_units: 25, ..i };
            let beyond = ComplianceInputs { training_units: 25 + 1_000, ..i };
            prop_assert_eq!(capped.score(), beyond.score());
        }
    }
}
