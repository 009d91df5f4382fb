//! Days-past-due to stage classification.

use crate::domain::{MatrixSize, Stage};
use crate::error::EngineError;

/// Classify `days_past_due` for a matrix with `states` states (3 or 4).
pub fn classify(days_past_due: u32, states: usize) -> Result<Stage, EngineError> {
    Ok(MatrixSize::from_states(states)?.classify(days_past_due))
}

impl MatrixSize {
    /// Stage of a loan `days_past_due` days in arrears.
    pub fn classify(self, days_past_due: u32) -> Stage {
        match (self, days_past_due) {
            (_, 0..=30) => Stage::Stage1,
            (MatrixSize::Three, 31..=90) => Stage::Stage2,
            (MatrixSize::Four, 31..=60) => Stage::Stage2a,
            (MatrixSize::Four, 61..=90) => Stage::Stage2b,
            _ => Stage::Stage3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_state_thresholds() {
        assert_eq!(classify(0, 3).unwrap(), Stage::Stage1);
        assert_eq!(classify(30, 3).unwrap(), Stage::Stage1);
        assert_eq!(classify(45, 3).unwrap(), Stage::Stage2);
        assert_eq!(classify(90, 3).unwrap(), Stage::Stage2);
        assert_eq!(classify(95, 3).unwrap(), Stage::Stage3);
    }

    #[test]
    fn four_state_thresholds() {
        assert_eq!(classify(0, 4).unwrap(), Stage::Stage1);
        assert_eq!(classify(45, 4).unwrap(), Stage::Stage2a);
        assert_eq!(classify(60, 4).unwrap(), Stage::Stage2a);
        assert_eq!(classify(75, 4).unwrap(), Stage::Stage2b);
        assert_eq!(classify(91, 4).unwrap(), Stage::Stage3);
    }

    #[test]
    fn unsupported_size_is_a_config_error() {
        assert!(matches!(classify(10, 5), Err(EngineError::InvalidConfig(_))));
        assert!(matches!(classify(10, 2), Err(EngineError::InvalidConfig(_))));
    }
}
