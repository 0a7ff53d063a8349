//! Session Lifecycle Guard
//!
//! A practice session moves strictly forward through its phases:
//!
//! ```text
//! Preparing -> Presenting -> Conversing -> Completed
//!     \            \             \
//!      `------------`-------------`-----> Terminated
//! ```
//!
//! Completed and Terminated are absorbing. Every forward step stamps its phase
//! timestamp once; those timestamps later drive the pace analysis.

use crate::transcript::PhaseTimestamps;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Preparing,
    Presenting,
    Conversing,
    Completed,
    Terminated,
}

impl SessionPhase {
    /// Phases reachable in one step from `self`.
    pub fn allowed_targets(&self) -> &'static [SessionPhase] {
        match self {
            SessionPhase::Preparing => &[SessionPhase::Presenting, SessionPhase::Terminated],
            SessionPhase::Presenting => &[SessionPhase::Conversing, SessionPhase::Terminated],
            SessionPhase::Conversing => &[SessionPhase::Completed, SessionPhase::Terminated],
            SessionPhase::Completed | SessionPhase::Terminated => &[],
        }
    }

    pub fn can_advance_to(&self, target: SessionPhase) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Preparing => "preparing",
            SessionPhase::Presenting => "presenting",
            SessionPhase::Conversing => "conversing",
            SessionPhase::Completed => "completed",
            SessionPhase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown session phase: '{0}'")]
pub struct UnknownPhase(pub String);

impl FromStr for SessionPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preparing" => Ok(SessionPhase::Preparing),
            "presenting" => Ok(SessionPhase::Presenting),
            "conversing" => Ok(SessionPhase::Conversing),
            "completed" => Ok(SessionPhase::Completed),
            "terminated" => Ok(SessionPhase::Terminated),
            _ => Err(UnknownPhase(s.to_string())),
        }
    }
}

/// A requested phase change that the state machine does not allow.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid transition from '{from}' to '{to}'")]
pub struct TransitionError {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

/// Current phase of a session plus the instants each phase began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLifecycle {
    pub phase: SessionPhase,
    pub timestamps: PhaseTimestamps,
}

impl SessionLifecycle {
    /// A new session, preparing since `now`.
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            phase: SessionPhase::Preparing,
            timestamps: PhaseTimestamps {
                prep_started_at: Some(now),
                ..Default::default()
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        self.phase == SessionPhase::Completed
    }

    /// Moves to `target`, stamping the matching timestamp if it is still unset.
    /// On error nothing changes.
    pub fn advance(&mut self, target: SessionPhase, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.phase.can_advance_to(target) {
            return Err(TransitionError {
                from: self.phase,
                to: target,
            });
        }

        let slot = match target {
            SessionPhase::Presenting => Some(&mut self.timestamps.present_started_at),
            SessionPhase::Conversing => Some(&mut self.timestamps.converse_started_at),
            SessionPhase::Completed => Some(&mut self.timestamps.completed_at),
            SessionPhase::Preparing | SessionPhase::Terminated => None,
        };
        if let Some(slot) = slot {
            slot.get_or_insert(now);
        }
        self.phase = target;
        Ok(())
    }
}
