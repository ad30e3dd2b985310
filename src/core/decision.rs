//! Review-round decision.
//!
//! Pure function of the two approval flags, the round and the story's cap.
//! Side effects (summaries, persistence, routing) live in the orchestrator.

/// Outcome of a completed review round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Send for cover design. `forced` means the revision budget ran out
    /// while at least one role still disapproved.
    Approve { forced: bool },

    /// Ask the writer for another revision; the next review is `next_round`
    Revise { next_round: u32 },
}

impl Decision {
    pub fn is_approve(&self) -> bool {
        matches!(self, Self::Approve { .. })
    }
}

/// Decide what follows review round `round_number`.
///
/// Both approvals win outright. Otherwise a round at or past
/// `max_revisions` is accepted anyway; anything earlier goes back to the
/// writer for exactly one more round.
pub fn evaluate(
    reviewer_approved: bool,
    editor_approved: bool,
    round_number: u32,
    max_revisions: u32,
) -> Decision {
    if reviewer_approved && editor_approved {
        return Decision::Approve { forced: false };
    }

    if round_number >= max_revisions {
        return Decision::Approve { forced: true };
    }

    Decision::Revise {
        next_round: round_number + 1,
    }
}
