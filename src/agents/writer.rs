//! Writer stage: first drafts and revisions.

use anyhow::Result;
use async_trait::async_trait;

use super::context::word_count;
use super::{Agent, AgentContext, Disposition, DropReason};
use crate::domain::{Action, Message, Payload, Story, StoryStatus};

pub const SYSTEM_PROMPT: &str = "You are a professional short fiction writer. \
Open with the story's title on its own line, then write the complete story. \
When revising, keep what works and address every priority fix you are given.";

pub struct Writer {
    ctx: AgentContext,
}

impl Writer {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    async fn write_draft(&self, message: &Message) -> Result<Disposition> {
        let story_id = message.story_id.as_str();
        self.ctx
            .log_activity(story_id, "writing_draft", format!("Writing initial draft for {}", story_id))
            .await;

        let Some(mut story) = self.ctx.load_story(story_id).await? else {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        };
        let Some(prompt) = story.prompt.clone() else {
            return Ok(Disposition::Dropped(DropReason::MissingPrompt));
        };

        let request = format!(
            "Write a {} short story based on this prompt:\n\n{}\n\nTarget word count: {}\n",
            prompt.genre, prompt.setting, prompt.target_word_count
        );
        let draft = self.ctx.generate(&mut story, "write_draft", 0, request).await?;

        story.title = extract_title(&draft, &prompt.genre);
        story.current_draft = draft;
        story.transition(StoryStatus::DraftWritten)?;
        self.ctx.save_story(&mut story).await?;

        self.ctx
            .log_activity(
                story_id,
                "draft_written",
                format!("Draft complete ({} words)", word_count(&story.current_draft)),
            )
            .await;

        self.ctx.reply(story_id, Action::DraftReady, Payload::new()).await?;
        Ok(Disposition::Completed)
    }

    async fn revise(&self, message: &Message) -> Result<Disposition> {
        let story_id = message.story_id.as_str();
        let round_number = message.payload.round_number().unwrap_or(1);
        let feedback_summary = message
            .payload
            .str("feedback_summary")
            .unwrap_or_default()
            .to_string();

        self.ctx
            .log_activity(story_id, "revising", format!("Revision round {}", round_number))
            .await;

        let Some(mut story) = self.ctx.load_story(story_id).await? else {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        };

        let request = revision_request(&story, &feedback_summary, round_number);
        let content = self.ctx.generate(&mut story, "revise", round_number, request).await?;

        story.push_revision(round_number, content, feedback_summary);
        story.transition(StoryStatus::Revised)?;
        self.ctx.save_story(&mut story).await?;

        self.ctx
            .log_activity(
                story_id,
                "revision_complete",
                format!(
                    "Round {} done ({} words)",
                    round_number,
                    word_count(&story.current_draft)
                ),
            )
            .await;

        self.ctx
            .reply(
                story_id,
                Action::RevisionReady,
                Payload::new().with("round_number", round_number),
            )
            .await?;
        Ok(Disposition::Completed)
    }
}

#[async_trait]
impl Agent for Writer {
    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    async fn handle(&self, message: &Message) -> Result<Disposition> {
        match message.action {
            Action::WriteDraft => self.write_draft(message).await,
            Action::Revise => self.revise(message).await,
            _ => Ok(Disposition::Dropped(DropReason::UnknownAction)),
        }
    }
}

fn revision_request(story: &Story, feedback_summary: &str, round_number: u32) -> String {
    format!(
        "Here is your current draft:\n\n{}\n\n\
         Please revise it based on this feedback:\n\n{}\n\n\
         This is revision round {}. Focus on the priority fixes.",
        story.current_draft, feedback_summary, round_number
    )
}

/// Title from the draft's first line, if it looks like one
pub fn extract_title(draft: &str, genre: &str) -> String {
    let first_line = draft.trim().lines().next().unwrap_or("").trim();
    let cleaned = first_line
        .trim_start_matches('#')
        .trim()
        .trim_matches('"')
        .trim_matches('*')
        .trim();

    let len = cleaned.chars().count();
    if len > 2 && len < 80 {
        return cleaned.to_string();
    }

    format!("Untitled {} Story", title_case(&genre.replace('_', " ")))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
