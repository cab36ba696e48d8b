use std::collections::HashMap;

use chrono::Utc;

use crate::error::RefineError;

use super::types::{Dataset, PipelineStage};

/// Enforces the dataset pipeline state machine.
///
/// Forward moves advance exactly one stage. Entering `Refining` is allowed
/// from every other stage (re-refinement appends a new record, it never
/// rewrites history), and a dataset leaves `Refining` either by committing
/// to `Refined` or by being restored to the stage it had before the run.
pub struct StageMachine {
    valid_transitions: HashMap<PipelineStage, Vec<PipelineStage>>,
}

impl StageMachine {
    pub fn new() -> Self {
        let mut valid_transitions = HashMap::new();

        for stage in PipelineStage::all() {
            let mut targets = Vec::new();
            if stage != PipelineStage::Refining {
                targets.push(PipelineStage::Refining);
            }
            if let Some(next) = stage.next() {
                // Stored -> Refining is already covered above.
                if !targets.contains(&next) {
                    targets.push(next);
                }
            }
            valid_transitions.insert(stage, targets);
        }

        Self { valid_transitions }
    }

    /// Check if a forward transition between two stages is allowed.
    pub fn can_transition(&self, from: PipelineStage, to: PipelineStage) -> bool {
        self.valid_transitions
            .get(&from)
            .map(|targets| targets.contains(&to))
            .unwrap_or(false)
    }

    /// Whether a refinement run may start from `stage`.
    pub fn can_refine(&self, stage: PipelineStage) -> bool {
        self.can_transition(stage, PipelineStage::Refining)
    }

    /// Moves `dataset` to `to`, stamping `updated_at`.
    ///
    /// # Errors
    /// Returns [`RefineError::InvalidTransition`] if the move is not allowed.
    pub fn transition(&self, dataset: &mut Dataset, to: PipelineStage) -> Result<(), RefineError> {
        let from = dataset.stage;
        if !self.can_transition(from, to) {
            return Err(RefineError::InvalidTransition { from, to });
        }
        dataset.stage = to;
        dataset.updated_at = Utc::now();
        Ok(())
    }

    /// Restores a dataset that is `Refining` to the stage it had before the run.
    pub fn restore(&self, dataset: &mut Dataset, prior: PipelineStage) -> Result<(), RefineError> {
        let from = dataset.stage;
        if from != PipelineStage::Refining || prior == PipelineStage::Refining {
            return Err(RefineError::InvalidTransition { from, to: prior });
        }
        dataset.stage = prior;
        dataset.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}
