//! The Story aggregate: one per pipeline run.
//!
//! A Story carries its prompt, the latest draft, and the append-only
//! revision and feedback histories. Status changes go through
//! [`Story::transition`], which rejects any move the pipeline does not allow.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Workflow status of a story; always reflects the last completed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryStatus {
    Queued,
    PromptCreated,
    DraftWritten,
    InReview,
    RevisionNeeded,
    Revised,
    Approved,
    DesigningCover,
    Published,
}

impl StoryStatus {
    /// All statuses in pipeline order
    pub const ALL: [StoryStatus; 9] = [
        StoryStatus::Queued,
        StoryStatus::PromptCreated,
        StoryStatus::DraftWritten,
        StoryStatus::InReview,
        StoryStatus::RevisionNeeded,
        StoryStatus::Revised,
        StoryStatus::Approved,
        StoryStatus::DesigningCover,
        StoryStatus::Published,
    ];

    /// Wire name (e.g. `IN_REVIEW`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::PromptCreated => "PROMPT_CREATED",
            Self::DraftWritten => "DRAFT_WRITTEN",
            Self::InReview => "IN_REVIEW",
            Self::RevisionNeeded => "REVISION_NEEDED",
            Self::Revised => "REVISED",
            Self::Approved => "APPROVED",
            Self::DesigningCover => "DESIGNING_COVER",
            Self::Published => "PUBLISHED",
        }
    }

    /// Parse a wire name, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Whether the pipeline may move from `self` to `next`.
    ///
    /// Re-asserting the current status is always allowed.
    pub fn can_transition_to(&self, next: StoryStatus) -> bool {
        use StoryStatus::*;

        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (Queued, PromptCreated)
                | (PromptCreated, DraftWritten)
                | (DraftWritten, InReview)
                | (InReview, RevisionNeeded)
                | (InReview, Approved)
                | (RevisionNeeded, Revised)
                | (Revised, InReview)
                | (Approved, DesigningCover)
                | (DesigningCover, Published)
        )
    }

    /// `PUBLISHED` is the only terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published)
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid status transition for story {story_id}: {from} → {to}")]
pub struct TransitionError {
    pub story_id: String,
    pub from: StoryStatus,
    pub to: StoryStatus,
}

/// Writing brief produced by the prompt stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingPrompt {
    pub genre: String,
    pub theme: String,
    /// The generated brief itself
    pub setting: String,
    #[serde(default)]
    pub characters: String,
    pub target_word_count: u32,
    #[serde(default)]
    pub additional_instructions: String,
}

/// One revision produced by the writer in answer to a review round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub round_number: u32,
    pub content: String,
    #[serde(default)]
    pub feedback_addressed: String,
    pub timestamp: DateTime<Utc>,
}

/// One reviewer or editor pass over a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// Role that produced it (`reviewer` or `editor`)
    pub agent: String,
    pub round_number: u32,
    pub feedback: String,
    #[serde(default)]
    pub approved: bool,
    pub timestamp: DateTime<Utc>,
}

/// Token usage reported by the generation service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Observational record of one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub agent: String,
    pub action: String,
    #[serde(default)]
    pub round_number: u32,
    pub duration_seconds: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub timestamp: DateTime<Utc>,
}

/// A single pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub story_id: String,

    #[serde(default)]
    pub title: String,

    /// Generation model override for this story (empty = configured default)
    #[serde(default)]
    pub model: String,

    pub status: StoryStatus,

    #[serde(default)]
    pub prompt: Option<WritingPrompt>,

    #[serde(default)]
    pub current_draft: String,

    #[serde(default)]
    pub revisions: Vec<Revision>,

    #[serde(default)]
    pub feedback: Vec<FeedbackItem>,

    /// Highest completed revision round
    #[serde(default)]
    pub revision_count: u32,

    pub max_revisions: u32,

    #[serde(default)]
    pub cover_svg: String,

    #[serde(default)]
    pub metrics: Vec<AgentMetrics>,
    #[serde(default)]
    pub total_duration_seconds: f64,
    #[serde(default)]
    pub total_prompt_tokens: u64,
    #[serde(default)]
    pub total_completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,

    /// Payload of the message that started this run
    #[serde(default)]
    pub trigger_payload: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Story {
    /// Create a new story in `QUEUED`
    pub fn new(story_id: impl Into<String>, max_revisions: u32) -> Self {
        let now = Utc::now();
        Self {
            story_id: story_id.into(),
            title: String::new(),
            model: String::new(),
            status: StoryStatus::Queued,
            prompt: None,
            current_draft: String::new(),
            revisions: Vec::new(),
            feedback: Vec::new(),
            revision_count: 0,
            max_revisions,
            cover_svg: String::new(),
            metrics: Vec::new(),
            total_duration_seconds: 0.0,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_tokens: 0,
            trigger_payload: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting transitions the pipeline does not allow
    pub fn transition(&mut self, next: StoryStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                story_id: self.story_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Model to request for this story, if overridden
    pub fn model_override(&self) -> Option<&str> {
        if self.model.is_empty() {
            None
        } else {
            Some(&self.model)
        }
    }

    /// Genre of the prompt, if one has been generated
    pub fn genre(&self) -> &str {
        self.prompt.as_ref().map(|p| p.genre.as_str()).unwrap_or("")
    }

    /// Append a feedback item for a round.
    ///
    /// A second pass by the same role over the same round replaces the first,
    /// keeping at most one entry per role per round.
    pub fn push_feedback(&mut self, agent: &str, round_number: u32, feedback: String, approved: bool) {
        self.feedback
            .retain(|f| !(f.agent == agent && f.round_number == round_number));
        self.feedback.push(FeedbackItem {
            agent: agent.to_string(),
            round_number,
            feedback,
            approved,
            timestamp: Utc::now(),
        });
    }

    /// Latest feedback item from `agent` for `round_number`
    pub fn feedback_for(&self, agent: &str, round_number: u32) -> Option<&FeedbackItem> {
        self.feedback
            .iter()
            .rev()
            .find(|f| f.agent == agent && f.round_number == round_number)
    }

    /// Record a writer revision and advance the revision counter
    pub fn push_revision(&mut self, round_number: u32, content: String, feedback_addressed: String) {
        self.revisions.push(Revision {
            round_number,
            content: content.clone(),
            feedback_addressed,
            timestamp: Utc::now(),
        });
        self.current_draft = content;
        self.revision_count = self.revision_count.max(round_number);
    }

    /// Append a metrics entry and recompute the rolling totals
    pub fn record_metrics(&mut self, metrics: AgentMetrics) {
        self.metrics.push(metrics);
        let duration: f64 = self.metrics.iter().map(|m| m.duration_seconds).sum();
        self.total_duration_seconds = (duration * 100.0).round() / 100.0;
        self.total_prompt_tokens = self.metrics.iter().map(|m| m.prompt_tokens).sum();
        self.total_completion_tokens = self.metrics.iter().map(|m| m.completion_tokens).sum();
        self.total_tokens = self.metrics.iter().map(|m| m.total_tokens).sum();
    }

    /// Refresh the update timestamp (called on every save)
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
