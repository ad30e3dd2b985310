//! Worker agents and the loop that drives them.
//!
//! Every stage, the orchestrator included, is an [`Agent`]: it consumes
//! one queue and handles one message at a time. [`AgentRunner`] owns the
//! receive loop, so per-message failures end the message, never the loop.

pub mod context;
pub mod cover_designer;
pub mod critic;
pub mod prompt_generator;
pub mod writer;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use crate::config::{PipelineConfig, ResolvedConfig};
use crate::core::Orchestrator;
use crate::domain::{Message, Stage};

pub use context::{AgentContext, Services};
pub use cover_designer::CoverDesigner;
pub use critic::Critic;
pub use prompt_generator::PromptGenerator;
pub use writer::Writer;

/// Why a message was set aside without doing its work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The referenced story is not in the store
    StoryNotFound,
    /// The action is not handled by this stage
    UnknownAction,
    /// `start_new_story` for an id that already exists
    DuplicateStory,
    /// Drafting requested before a prompt was generated
    MissingPrompt,
    /// Prompt generation requested for a story that already has one
    PromptExists,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StoryNotFound => "story_not_found",
            Self::UnknownAction => "unknown_action",
            Self::DuplicateStory => "duplicate_story",
            Self::MissingPrompt => "missing_prompt",
            Self::PromptExists => "prompt_exists",
        };
        f.write_str(s)
    }
}

/// Result of handling one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    Dropped(DropReason),
}

/// A single-queue consumer
#[async_trait]
pub trait Agent: Send + Sync {
    fn context(&self) -> &AgentContext;

    /// Handle one message. `Err` abandons the message.
    async fn handle(&self, message: &Message) -> Result<Disposition>;

    fn stage(&self) -> Stage {
        self.context().stage
    }
}

/// What one turn of the receive loop did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Pop timed out
    Idle,
    Handled(Disposition),
    /// The handler failed; the message is gone
    Failed(String),
}

/// Drives an [`Agent`] over its queue
pub struct AgentRunner {
    agent: Arc<dyn Agent>,
    queue_timeout: Duration,
    error_backoff: Duration,
}

impl AgentRunner {
    pub fn new(agent: Arc<dyn Agent>, pipeline: &PipelineConfig) -> Self {
        Self {
            agent,
            queue_timeout: pipeline.queue_timeout(),
            error_backoff: pipeline.error_backoff(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.agent.stage()
    }

    /// Pop and handle at most one message.
    ///
    /// Handler errors are logged, recorded as activity and followed by the
    /// error backoff; they come back as [`Tick::Failed`]. Only a failing
    /// queue yields `Err`.
    pub async fn process_next(&self) -> Result<Tick> {
        let ctx = self.agent.context();
        let Some(message) = ctx
            .services
            .queue
            .pop(ctx.stage.queue(), self.queue_timeout)
            .await?
        else {
            return Ok(Tick::Idle);
        };

        Ok(self.dispatch(&message).await)
    }

    #[instrument(
        skip(self, message),
        fields(agent = %self.stage(), action = %message.action, story_id = %message.story_id)
    )]
    async fn dispatch(&self, message: &Message) -> Tick {
        let ctx = self.agent.context();
        info!(message_id = %message.message_id, "Message received");

        match self.agent.handle(message).await {
            Ok(Disposition::Completed) => Tick::Handled(Disposition::Completed),
            Ok(Disposition::Dropped(reason)) => {
                warn!(%reason, "Message dropped");
                Tick::Handled(Disposition::Dropped(reason))
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                error!(error = %detail, "Message failed");
                ctx.log_activity(&message.story_id, "error", detail.as_str())
                    .await;
                tokio::time::sleep(self.error_backoff).await;
                Tick::Failed(detail)
            }
        }
    }

    /// Run the receive loop until `shutdown` resolves.
    ///
    /// Shutdown is checked between messages. A message being handled when
    /// shutdown arrives is abandoned, as if the process had exited.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let ctx = self.agent.context();
        info!(
            agent = %ctx.stage,
            queue = ctx.stage.queue(),
            delivery = ?ctx.services.queue.delivery(),
            "Agent starting"
        );
        ctx.log_activity("", "agent_started", format!("{} is online", ctx.stage))
            .await;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                tick = self.process_next() => {
                    if let Err(e) = tick {
                        error!(agent = %ctx.stage, error = %e, "Queue receive failed");
                        tokio::time::sleep(self.error_backoff).await;
                    }
                }
            }
        }

        info!(agent = %ctx.stage, "Agent stopped");
    }
}

/// Build the agent for `stage`, applying any system prompt override
pub fn build_agent(stage: Stage, services: &Services, config: &ResolvedConfig) -> Arc<dyn Agent> {
    let system_prompt = config
        .prompt_override(stage)
        .unwrap_or_else(|| default_system_prompt(stage).to_string());
    let ctx = AgentContext::new(stage, services.clone(), system_prompt);

    match stage {
        Stage::Orchestrator => Arc::new(Orchestrator::new(ctx, &config.pipeline)),
        Stage::PromptGenerator => Arc::new(PromptGenerator::new(ctx, config.genres.clone())),
        Stage::Writer => Arc::new(Writer::new(ctx)),
        Stage::Reviewer | Stage::Editor => Arc::new(Critic::new(ctx)),
        Stage::CoverDesigner => Arc::new(CoverDesigner::new(ctx)),
    }
}

/// Built-in system prompt for each stage
pub fn default_system_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::Orchestrator => crate::core::orchestrator::SYSTEM_PROMPT,
        Stage::PromptGenerator => prompt_generator::SYSTEM_PROMPT,
        Stage::Writer => writer::SYSTEM_PROMPT,
        Stage::Reviewer => critic::REVIEWER_SYSTEM_PROMPT,
        Stage::Editor => critic::EDITOR_SYSTEM_PROMPT,
        Stage::CoverDesigner => cover_designer::SYSTEM_PROMPT,
    }
}
