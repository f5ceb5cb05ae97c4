//! Per-record remediation lifecycle.
//!
//! ```text
//!             detect: clean              repair ok, fully clean
//!  Unchecked ───────────────▶ Ready ─────────────────────────▶ (Fixed, row removed)
//!      │                       │  │
//!      │ detect: collision     │  │ repair ok, still dirty
//!      ▼                       │  └──────────────────────────▶ PartiallyFixed
//!   Conflict                   │ repair failed
//!                              └─────────────────────────────▶ Error
//! ```
//!
//! Detection may run from any state. Repair events are only accepted in
//! `Ready`; every other state rejects them.

use crate::error::{MetafixError, Result};
use serde::Serialize;

/// Remediation stage of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum RowState {
    #[default]
    Unchecked,
    Ready,
    Conflict,
    Error,
    PartiallyFixed,
}

impl RowState {
    /// Only a row that passed detection under the current selection may be repaired.
    pub fn can_repair(&self) -> bool {
        matches!(self, RowState::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RowState::Unchecked => "Unchecked",
            RowState::Ready => "Ready",
            RowState::Conflict => "Conflict",
            RowState::Error => "Error",
            RowState::PartiallyFixed => "Partially Fixed",
        }
    }

    /// Apply an event, returning the next step or rejecting the transition.
    pub fn apply(self, event: RowEvent) -> Result<Transition> {
        match event {
            RowEvent::Detected { collisions: 0 } => Ok(Transition::Row(RowState::Ready)),
            RowEvent::Detected { .. } => Ok(Transition::Row(RowState::Conflict)),
            RowEvent::DetectionFailed => Ok(Transition::Row(RowState::Error)),
            RowEvent::SelectionChanged => Ok(Transition::Row(match self {
                RowState::Ready => RowState::Unchecked,
                other => other,
            })),
            RowEvent::RepairFailed | RowEvent::Repaired { .. } if !self.can_repair() => {
                Err(MetafixError::InvalidTransition {
                    from: self,
                    event: event.to_string(),
                })
            }
            RowEvent::RepairFailed => Ok(Transition::Row(RowState::Error)),
            RowEvent::Repaired { still_dirty: true } => {
                Ok(Transition::Row(RowState::PartiallyFixed))
            }
            RowEvent::Repaired { still_dirty: false } => Ok(Transition::Fixed),
        }
    }
}

impl std::fmt::Display for RowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcomes that move a row between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEvent {
    /// Detection finished with this many collisions.
    Detected { collisions: usize },
    /// Detection could not run at all (e.g. record vanished).
    DetectionFailed,
    /// Patch rejected by the store or not attempted due to a data error.
    RepairFailed,
    /// Patch applied; `still_dirty` when any field still needs cleaning.
    Repaired { still_dirty: bool },
    /// The session's field selection changed.
    SelectionChanged,
}

impl std::fmt::Display for RowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowEvent::Detected { collisions } => write!(f, "detected {} collisions", collisions),
            RowEvent::DetectionFailed => write!(f, "detection failed"),
            RowEvent::RepairFailed => write!(f, "repair failed"),
            RowEvent::Repaired { still_dirty } => {
                write!(f, "repaired (still dirty: {})", still_dirty)
            }
            RowEvent::SelectionChanged => write!(f, "selection changed"),
        }
    }
}

/// Result of applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The row stays visible in this state.
    Row(RowState),
    /// The row is fully clean and leaves the working set.
    Fixed,
}
