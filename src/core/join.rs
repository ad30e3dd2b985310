//! Parallel-mode fan-in state.
//!
//! Holds reviewer/editor results per story until both roles have reported
//! for the same round. The map lives in the single orchestrator process and
//! is lost on restart; a story whose pending entry is lost stays in
//! `IN_REVIEW` until an operator intervenes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tracing::warn;

use crate::domain::{Payload, Stage};

/// The two roles that take part in a review round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewRole {
    Reviewer,
    Editor,
}

impl ReviewRole {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Reviewer => Stage::Reviewer,
            Self::Editor => Stage::Editor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.stage().as_str()
    }
}

impl fmt::Display for ReviewRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role's verdict on a round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFeedback {
    pub approved: bool,
    pub feedback: String,
}

impl RoleFeedback {
    pub fn new(approved: bool, feedback: impl Into<String>) -> Self {
        Self {
            approved,
            feedback: feedback.into(),
        }
    }

    /// Read `approved`/`feedback` from a completion payload; missing keys
    /// count as a disapproval with no text
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            approved: payload.bool("approved").unwrap_or(false),
            feedback: payload.str("feedback").unwrap_or_default().to_string(),
        }
    }
}

/// Both verdicts for one round, handed out exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteRound {
    pub round_number: u32,
    pub reviewer: RoleFeedback,
    pub editor: RoleFeedback,
}

#[derive(Debug, Default)]
struct PendingRound {
    round_number: u32,
    reviewer: Option<RoleFeedback>,
    editor: Option<RoleFeedback>,
}

impl PendingRound {
    fn new(round_number: u32) -> Self {
        Self {
            round_number,
            ..Default::default()
        }
    }

    fn slot(&mut self, role: ReviewRole) -> &mut Option<RoleFeedback> {
        match role {
            ReviewRole::Reviewer => &mut self.reviewer,
            ReviewRole::Editor => &mut self.editor,
        }
    }
}

/// Per-story pending feedback, keyed by story id
#[derive(Debug, Default)]
pub struct PendingFeedback {
    rounds: Mutex<HashMap<String, PendingRound>>,
}

impl PendingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingRound>> {
        // Entries are plain data; a panic elsewhere cannot leave one half-written
        self.rounds.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start waiting for `round_number`, discarding anything pending for the story
    pub fn open(&self, story_id: &str, round_number: u32) {
        self.lock()
            .insert(story_id.to_string(), PendingRound::new(round_number));
    }

    /// Record one role's verdict.
    ///
    /// Returns the complete round when this arrival supplies the second
    /// role; the entry is removed in the same critical section so a round
    /// completes at most once.
    pub fn record(
        &self,
        story_id: &str,
        role: ReviewRole,
        round_number: u32,
        feedback: RoleFeedback,
    ) -> Option<CompleteRound> {
        let mut rounds = self.lock();

        let entry = rounds
            .entry(story_id.to_string())
            .or_insert_with(|| PendingRound::new(round_number));

        if round_number < entry.round_number {
            warn!(
                story_id,
                pending_round = entry.round_number,
                round_number,
                "Late feedback for an earlier round, ignoring"
            );
            return None;
        }
        if round_number > entry.round_number {
            warn!(
                story_id,
                pending_round = entry.round_number,
                round_number,
                "Feedback for a newer round, discarding stale pending entry"
            );
            *entry = PendingRound::new(round_number);
        }

        let slot = entry.slot(role);
        if slot.is_some() {
            warn!(story_id, role = %role, round_number, "Duplicate feedback, keeping the latest");
        }
        *slot = Some(feedback);

        if entry.reviewer.is_none() || entry.editor.is_none() {
            return None;
        }

        let complete = rounds.remove(story_id)?;
        Some(CompleteRound {
            round_number: complete.round_number,
            reviewer: complete.reviewer?,
            editor: complete.editor?,
        })
    }

    /// Round and roles still missing for a story, if it has a pending entry
    pub fn waiting_on(&self, story_id: &str) -> Option<(u32, Vec<ReviewRole>)> {
        let rounds = self.lock();
        let entry = rounds.get(story_id)?;
        let missing = [ReviewRole::Reviewer, ReviewRole::Editor]
            .into_iter()
            .filter(|role| match role {
                ReviewRole::Reviewer => entry.reviewer.is_none(),
                ReviewRole::Editor => entry.editor.is_none(),
            })
            .collect();
        Some((entry.round_number, missing))
    }

    /// Number of stories with a round in flight
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
