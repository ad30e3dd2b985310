//! Pipeline orchestrator.
//!
//! Owns the story state machine. Consumes the control queue, routes work to
//! the stages, joins parallel review results and decides between revising
//! and approving. Only one orchestrator may run against a queue: the
//! parallel-mode join state lives in this process.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::agents::{Agent, AgentContext, Disposition, DropReason};
use crate::config::{PipelineConfig, ReviewMode};
use crate::domain::{short_id, Action, Message, Payload, Stage, Story, StoryStatus};

use super::decision::{evaluate, Decision};
use super::join::{CompleteRound, PendingFeedback, ReviewRole, RoleFeedback};

pub const SYSTEM_PROMPT: &str = "You are the editor-in-chief of a small fiction imprint. \
You read reviewer and editor notes and turn them into a short, prioritized list of fixes \
the writer can act on immediately. Be concrete and concise.";

/// The control-plane agent
pub struct Orchestrator {
    ctx: AgentContext,
    review_mode: ReviewMode,
    max_revisions: u32,
    pending: PendingFeedback,
}

impl Orchestrator {
    pub fn new(ctx: AgentContext, pipeline: &PipelineConfig) -> Self {
        Self {
            ctx,
            review_mode: pipeline.review_mode,
            max_revisions: pipeline.max_revisions,
            pending: PendingFeedback::new(),
        }
    }

    /// Parallel-mode rounds still waiting on a role
    pub fn pending(&self) -> &PendingFeedback {
        &self.pending
    }

    async fn start_new_story(&self, message: &Message) -> Result<Disposition> {
        let story_id = if message.story_id.trim().is_empty() {
            short_id()
        } else {
            message.story_id.clone()
        };

        if self.ctx.load_story(&story_id).await?.is_some() {
            warn!(%story_id, "Story already exists, ignoring start");
            return Ok(Disposition::Dropped(DropReason::DuplicateStory));
        }

        let mut story = Story::new(story_id.as_str(), self.max_revisions);
        story.model = message.payload.str("model").unwrap_or_default().to_string();
        story.trigger_payload = message.payload.clone().into_map();
        self.ctx.save_story(&mut story).await?;

        let mut detail = format!("Initiating new story {}", story_id);
        if let Some(model) = story.model_override() {
            detail.push_str(&format!(" (model={})", model));
        }
        self.ctx.log_activity(&story_id, "starting_story", detail).await;

        let mut payload = Payload::new();
        for key in ["user_prompt", "genre", "model"] {
            if let Some(value) = message.payload.str(key) {
                payload.insert(key, value);
            }
        }

        self.ctx
            .send(Stage::PromptGenerator, &story_id, Action::GeneratePrompt, payload)
            .await?;
        Ok(Disposition::Completed)
    }

    async fn prompt_ready(&self, message: &Message) -> Result<Disposition> {
        self.ctx
            .log_activity(&message.story_id, "prompt_received", "Sending to writer")
            .await;
        self.ctx
            .send(Stage::Writer, &message.story_id, Action::WriteDraft, Payload::new())
            .await?;
        Ok(Disposition::Completed)
    }

    /// `draft_ready` and `revision_ready`: move to review and start a round
    async fn ready_for_review(&self, message: &Message) -> Result<Disposition> {
        let Some(mut story) = self.ctx.load_story(&message.story_id).await? else {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        };

        let previous = match message.action {
            Action::RevisionReady => message
                .payload
                .round_number()
                .unwrap_or(story.revision_count),
            _ => story.revision_count,
        };
        let round_number = previous.checked_add(1).ok_or_else(|| {
            anyhow!(
                "Round number {} out of range for story {}",
                previous,
                story.story_id
            )
        })?;

        story.transition(StoryStatus::InReview)?;
        self.ctx.save_story(&mut story).await?;

        self.begin_review(&story.story_id, round_number).await?;
        Ok(Disposition::Completed)
    }

    async fn begin_review(&self, story_id: &str, round_number: u32) -> Result<()> {
        self.ctx
            .log_activity(
                story_id,
                "sending_for_review",
                format!("Round {} ({})", round_number, self.review_mode),
            )
            .await;

        let payload = Payload::new().with("round_number", round_number);

        match self.review_mode {
            ReviewMode::Parallel => {
                self.pending.open(story_id, round_number);
                self.ctx
                    .send(Stage::Reviewer, story_id, Action::Review, payload.clone())
                    .await?;
                self.ctx
                    .send(Stage::Editor, story_id, Action::Edit, payload)
                    .await?;
            }
            ReviewMode::Sequential => {
                self.ctx
                    .send(Stage::Reviewer, story_id, Action::Review, payload)
                    .await?;
            }
        }

        info!(story_id, round_number, mode = %self.review_mode, "Review round started");
        Ok(())
    }

    async fn review_complete(&self, message: &Message) -> Result<Disposition> {
        if self.review_mode == ReviewMode::Parallel {
            return self.fan_in(message, ReviewRole::Reviewer).await;
        }

        let round_number = message.payload.round_number().unwrap_or(1);
        self.ctx
            .log_activity(&message.story_id, "review_received", "Sending to editor")
            .await;
        self.ctx
            .send(
                Stage::Editor,
                &message.story_id,
                Action::Edit,
                Payload::new().with("round_number", round_number),
            )
            .await?;
        Ok(Disposition::Completed)
    }

    async fn edit_complete(&self, message: &Message) -> Result<Disposition> {
        if self.review_mode == ReviewMode::Parallel {
            return self.fan_in(message, ReviewRole::Editor).await;
        }

        let Some(story) = self.ctx.load_story(&message.story_id).await? else {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        };

        // Sequential mode reads both verdicts back from the persisted story
        let round_number = message.payload.round_number().unwrap_or(1);
        let verdict = |role: ReviewRole| {
            story
                .feedback_for(role.as_str(), round_number)
                .map(|f| RoleFeedback::new(f.approved, f.feedback.as_str()))
                .unwrap_or_default()
        };
        let round = CompleteRound {
            round_number,
            reviewer: verdict(ReviewRole::Reviewer),
            editor: verdict(ReviewRole::Editor),
        };

        self.evaluate_and_decide(story, round).await
    }

    async fn fan_in(&self, message: &Message, role: ReviewRole) -> Result<Disposition> {
        let story_id = message.story_id.as_str();
        let round_number = message.payload.round_number().unwrap_or(1);
        let feedback = RoleFeedback::from_payload(&message.payload);

        let Some(round) = self.pending.record(story_id, role, round_number, feedback) else {
            self.ctx
                .log_activity(
                    story_id,
                    "waiting_for_feedback",
                    format!("Got {}, waiting for the other role", role),
                )
                .await;
            return Ok(Disposition::Completed);
        };

        let Some(story) = self.ctx.load_story(story_id).await? else {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        };

        self.evaluate_and_decide(story, round).await
    }

    #[instrument(skip(self, story, round), fields(story_id = %story.story_id, round = round.round_number))]
    async fn evaluate_and_decide(&self, mut story: Story, round: CompleteRound) -> Result<Disposition> {
        let story_id = story.story_id.clone();
        let decision = evaluate(
            round.reviewer.approved,
            round.editor.approved,
            round.round_number,
            story.max_revisions,
        );
        info!(?decision, "Round evaluated");

        match decision {
            Decision::Approve { forced } => {
                let detail = if forced {
                    format!(
                        "Approved after {} rounds, sending for cover design",
                        round.round_number
                    )
                } else {
                    "Both reviewer and editor approved".to_string()
                };
                let action = if forced { "max_revisions_reached" } else { "story_approved" };
                self.ctx.log_activity(&story_id, action, detail).await;

                story.transition(StoryStatus::Approved)?;
                self.ctx.save_story(&mut story).await?;
                self.send_for_cover(story).await?;
            }
            Decision::Revise { next_round } => {
                let prompt = format!(
                    "Reviewer feedback:\n{}\n\nEditor feedback:\n{}\n\n\
                     Reviewer approved: {}\nEditor approved: {}\n\n\
                     Summarize the top priority fixes for the writer. Be concise.",
                    round.reviewer.feedback,
                    round.editor.feedback,
                    round.reviewer.approved,
                    round.editor.approved,
                );
                let summary = self
                    .ctx
                    .generate(&mut story, "evaluate_feedback", round.round_number, prompt)
                    .await?;

                story.transition(StoryStatus::RevisionNeeded)?;
                self.ctx.save_story(&mut story).await?;
                self.ctx
                    .log_activity(
                        &story_id,
                        "revision_needed",
                        format!("Round {} - requesting revision", round.round_number),
                    )
                    .await;

                let payload = Payload::new()
                    .with("round_number", round.round_number)
                    .with("next_round", next_round)
                    .with("feedback_summary", summary);
                self.ctx
                    .send(Stage::Writer, &story_id, Action::Revise, payload)
                    .await?;
            }
        }

        Ok(Disposition::Completed)
    }

    async fn send_for_cover(&self, mut story: Story) -> Result<()> {
        story.transition(StoryStatus::DesigningCover)?;
        self.ctx.save_story(&mut story).await?;

        self.ctx
            .log_activity(&story.story_id, "sending_for_cover", "Sending to cover designer")
            .await;
        self.ctx
            .send(
                Stage::CoverDesigner,
                &story.story_id,
                Action::DesignCover,
                Payload::new(),
            )
            .await
    }

    async fn cover_ready(&self, message: &Message) -> Result<Disposition> {
        let Some(mut story) = self.ctx.load_story(&message.story_id).await? else {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        };

        story.transition(StoryStatus::Published)?;
        self.ctx.save_story(&mut story).await?;

        info!(story_id = %story.story_id, title = %story.title, "Story published");
        self.ctx
            .log_activity(
                &story.story_id,
                "story_published",
                format!(
                    "'{}' published after {} revision(s)",
                    story.title, story.revision_count
                ),
            )
            .await;
        Ok(Disposition::Completed)
    }
}

#[async_trait]
impl Agent for Orchestrator {
    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    async fn handle(&self, message: &Message) -> Result<Disposition> {
        match &message.action {
            Action::StartNewStory => self.start_new_story(message).await,
            Action::PromptReady => self.prompt_ready(message).await,
            Action::DraftReady | Action::RevisionReady => self.ready_for_review(message).await,
            Action::ReviewComplete => self.review_complete(message).await,
            Action::EditComplete => self.edit_complete(message).await,
            Action::CoverReady => self.cover_ready(message).await,
            other => {
                warn!(action = %other, "Unhandled action");
                Ok(Disposition::Dropped(DropReason::UnknownAction))
            }
        }
    }
}
