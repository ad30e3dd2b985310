//! Prompt stage: turns a genre (or a user's idea) into a writing brief.

use anyhow::Result;
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::warn;

use super::{Agent, AgentContext, Disposition, DropReason};
use crate::config::Genre;
use crate::domain::{Action, Message, Payload, StoryStatus, WritingPrompt};

pub const SYSTEM_PROMPT: &str = "You design writing prompts for short fiction. \
Given a genre, theme and length, describe the setting, the central characters, \
the core conflict and the tone in a few vivid paragraphs. Do not write the story itself.";

/// Genre, theme and length picked for one story
#[derive(Debug, Clone, PartialEq, Eq)]
struct Brief {
    genre: String,
    description: String,
    theme: String,
    target_word_count: u32,
}

pub struct PromptGenerator {
    ctx: AgentContext,
    genres: Vec<Genre>,
}

impl PromptGenerator {
    pub fn new(ctx: AgentContext, genres: Vec<Genre>) -> Self {
        Self { ctx, genres }
    }

    /// Pick a brief: the requested genre when configured, else a random one
    fn pick(&self, requested: Option<&str>) -> Brief {
        let mut rng = rand::rng();

        let genre = requested
            .and_then(|name| {
                self.genres
                    .iter()
                    .find(|g| g.name.eq_ignore_ascii_case(name))
            })
            .or_else(|| self.genres.choose(&mut rng));

        let Some(genre) = genre else {
            return Brief {
                genre: requested.unwrap_or("fiction").to_string(),
                description: String::new(),
                theme: String::new(),
                target_word_count: 2000,
            };
        };

        let theme = genre.themes.choose(&mut rng).cloned().unwrap_or_default();
        let (low, high) = if genre.word_count_min <= genre.word_count_max {
            (genre.word_count_min, genre.word_count_max)
        } else {
            (genre.word_count_max, genre.word_count_min)
        };

        Brief {
            genre: genre.name.clone(),
            description: genre.description.clone(),
            theme,
            target_word_count: rng.random_range(low..=high),
        }
    }

    fn build_prompt(brief: &Brief, user_idea: Option<&str>) -> String {
        match user_idea {
            Some(idea) => format!(
                "A user has requested a story with this idea:\n\n\"{}\"\n\n\
                 Target word count: {}\n\n\
                 Build a detailed writing prompt around the user's idea. \
                 Pick the most fitting genre and tone from the idea.",
                idea, brief.target_word_count
            ),
            None => format!(
                "Genre: {}\nGenre description: {}\nTheme: {}\nTarget word count: {}\n\n\
                 Generate a detailed writing prompt for a short story.",
                brief.genre, brief.description, brief.theme, brief.target_word_count
            ),
        }
    }
}

#[async_trait]
impl Agent for PromptGenerator {
    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    async fn handle(&self, message: &Message) -> Result<Disposition> {
        if message.action != Action::GeneratePrompt {
            return Ok(Disposition::Dropped(DropReason::UnknownAction));
        }

        let story_id = message.story_id.as_str();
        self.ctx
            .log_activity(
                story_id,
                "generating_prompt",
                format!("Creating prompt for story {}", story_id),
            )
            .await;

        let Some(mut story) = self.ctx.load_story(story_id).await? else {
            return Ok(Disposition::Dropped(DropReason::StoryNotFound));
        };
        if story.prompt.is_some() {
            warn!(story_id, "Story already has a prompt, ignoring");
            return Ok(Disposition::Dropped(DropReason::PromptExists));
        }

        let brief = self.pick(message.payload.str("genre"));
        let prompt = Self::build_prompt(&brief, message.payload.str("user_prompt"));
        let setting = self
            .ctx
            .generate(&mut story, "generate_prompt", 0, prompt)
            .await?;

        story.prompt = Some(WritingPrompt {
            genre: brief.genre.clone(),
            theme: brief.theme.clone(),
            setting,
            characters: String::new(),
            target_word_count: brief.target_word_count,
            additional_instructions: String::new(),
        });
        story.transition(StoryStatus::PromptCreated)?;
        self.ctx.save_story(&mut story).await?;

        self.ctx
            .log_activity(
                story_id,
                "prompt_generated",
                format!("Prompt created for genre={}", brief.genre),
            )
            .await;

        let payload = Payload::new()
            .with("genre", brief.genre)
            .with("theme", brief.theme);
        self.ctx.reply(story_id, Action::PromptReady, payload).await?;
        Ok(Disposition::Completed)
    }
}
