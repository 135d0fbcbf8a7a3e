// src/mask.rs
//
// Phase-aware action masking. The mask is a fixed 10-slot boolean vector so
// learners can apply it directly to a logits vector.

use serde::{Deserialize, Serialize};

use crate::types::{Action, Mode, Phase, ACTION_SPACE_SIZE};

/// Boolean legality vector indexed by action id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionMask {
    slots: [bool; ACTION_SPACE_SIZE],
}

impl ActionMask {
    /// Mask with every action illegal.
    pub fn none() -> Self {
        Self {
            slots: [false; ACTION_SPACE_SIZE],
        }
    }

    pub fn is_legal(&self, action: Action) -> bool {
        self.slots[action.id()]
    }

    /// Out-of-range ids are illegal.
    pub fn is_legal_id(&self, id: usize) -> bool {
        self.slots.get(id).copied().unwrap_or(false)
    }

    /// Legal actions in id order.
    pub fn legal(&self) -> Vec<Action> {
        Action::all().filter(|a| self.is_legal(*a)).collect()
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| **s).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.slots
    }

    /// 1.0 / 0.0 encoding for learners that multiply logits by the mask.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.slots
            .iter()
            .map(|s| if *s { 1.0 } else { 0.0 })
            .collect()
    }

    fn allow(&mut self, action: Action) {
        self.slots[action.id()] = true;
    }
}

/// Legal actions for a phase: the three modes of the phase's stage, plus skip
/// during port analysis. Nothing is legal once the episode is done.
pub fn legal_actions(phase: Phase) -> ActionMask {
    let mut mask = ActionMask::none();
    if let Some(stage) = phase.stage() {
        for mode in Mode::ALL {
            mask.allow(Action::run(stage, mode));
        }
        if phase == Phase::PortAnalysis {
            mask.allow(Action::Skip);
        }
    }
    mask
}
