//! Reviewer and editor stages.
//!
//! Both read the current draft, record one feedback item for the round and
//! report their verdict. A verdict is an approval only when the generated
//! text contains `APPROVED: YES`.

use anyhow::Result;
use async_trait::async_trait;

use super::{Agent, AgentContext, Disposition, DropReason};
use crate::domain::{Action, Message, Payload, Stage, Story};

pub const REVIEWER_SYSTEM_PROMPT: &str = "You are a demanding fiction reviewer. \
Judge plot, character, pacing and how well the story answers its prompt. \
List concrete problems. End with a line reading exactly \
'APPROVED: YES' or 'APPROVED: NO'.";

pub const EDITOR_SYSTEM_PROMPT: &str = "You are a line editor. \
Judge prose quality sentence by sentence: clarity, rhythm, word choice, grammar. \
List concrete problems. End with a line reading exactly \
'APPROVED: YES' or 'APPROVED: NO'.";

const APPROVAL_MARKER: &str = "APPROVED: YES";

/// Review-round worker; the context's stage decides which role it plays
pub struct Critic {
    ctx: AgentContext,
}

impl Critic {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    /// Action handled and action replied with
    fn actions(&self) -> (Action, Action) {
        match self.ctx.stage {
            Stage::Editor => (Action::Edit, Action::EditComplete),
            _ => (Action::Review, Action::ReviewComplete),
        }
    }

    fn request(&self, story: &Story) -> String {
        let genre = story.genre();
        match self.ctx.stage {
            Stage::Editor => format!(
                "Edit this {} short story for line-level quality:\n\n{}\n",
                genre, story.current_draft
            ),
            _ => format!(
                "Review this {} short story:\n\n{}\n\nOriginal prompt:\n{}\n",
                genre,
                story.current_draft,
                story
                    .prompt
                    .as_ref()
                    .map(|p| p.setting.as_str())
                    .unwrap_or("N/A")
            ),
        }
    }
}

/// Whether generated feedback carries the approval marker
pub fn is_approved(feedback: &str) -> bool {
    feedback.to_uppercase().contains(APPROVAL_MARKER)
}

#[async_trait]
impl Agent for Critic {
    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    async fn handle(&self, message: &Message) -> Result<Disposition> {
        let (expected, reply) = self.actions();
        if message.action != expected {
            return Ok(Disposition::Dropped(DropReason::UnknownAction));
        }

        let story_id = message.story_id.as_str();
        let role = self.ctx.name();
        let round_number = message.payload.round_number().unwrap_or(1);
        self.ctx
            .log_activity(story_id, expected.as_str(), format!("Round {}", round_number))
            .await;

        let Some(mut story) = self.ctx.load_story(story_id).await? else {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        };

        let request = self.request(&story);
        let feedback = self
            .ctx
            .generate(&mut story, expected.as_str(), round_number, request)
            .await?;
        let approved = is_approved(&feedback);

        // The other critic may write this story concurrently; apply only
        // this role's additions to a fresh read
        let metrics = story.metrics.last().cloned();
        let item = feedback.clone();
        let updated = self
            .ctx
            .update_story(story_id, move |story| {
                story.push_feedback(role, round_number, item, approved);
                if let Some(metrics) = metrics {
                    story.record_metrics(metrics);
                }
            })
            .await?;
        if updated.is_none() {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        }

        self.ctx
            .log_activity(
                story_id,
                reply.as_str(),
                format!(
                    "Round {} - {}",
                    round_number,
                    if approved { "Approved" } else { "Changes requested" }
                ),
            )
            .await;

        let payload = Payload::new()
            .with("round_number", round_number)
            .with("approved", approved)
            .with("feedback", feedback);
        self.ctx.reply(story_id, reply, payload).await?;
        Ok(Disposition::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_marker_case_insensitive() {
        assert!(is_approved("Strong ending.\nApproved: yes"));
        assert!(is_approved("APPROVED: YES"));
        assert!(!is_approved("APPROVED: NO"));
        assert!(!is_approved("approved:yes"));
        assert!(!is_approved(""));
    }
}
