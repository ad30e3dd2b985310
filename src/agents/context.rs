//! Shared plumbing for every pipeline stage.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

use crate::adapters::{Generation, GenerationRequest, Generator};
use crate::domain::{Action, ActivityLog, AgentMetrics, Message, Payload, Stage, Story};
use crate::queue::MessageQueue;
use crate::store::DocumentStore;

/// Queue, store and generator handles shared by all stages in a process
#[derive(Clone)]
pub struct Services {
    pub queue: Arc<dyn MessageQueue>,
    pub store: Arc<dyn DocumentStore>,
    pub generator: Arc<dyn Generator>,
}

impl Services {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            queue,
            store,
            generator,
        }
    }
}

/// One stage's view of the services, plus its system prompt
#[derive(Clone)]
pub struct AgentContext {
    pub stage: Stage,
    pub services: Services,
    pub system_prompt: String,
}

impl AgentContext {
    pub fn new(stage: Stage, services: Services, system_prompt: impl Into<String>) -> Self {
        Self {
            stage,
            services,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.stage.as_str()
    }

    /// Best-effort activity record; failures are logged, never returned
    pub async fn log_activity(&self, story_id: &str, action: &str, detail: impl Into<String>) {
        let entry = ActivityLog::new(self.name(), story_id, action, detail);
        debug!(agent = self.name(), story_id, action, detail = %entry.detail, "Activity");

        if let Err(e) = self.services.store.log_activity(&entry).await {
            warn!(agent = self.name(), error = %e, "Failed to record activity");
        }
    }

    pub async fn load_story(&self, story_id: &str) -> Result<Option<Story>> {
        self.services
            .store
            .get_story(story_id)
            .await
            .with_context(|| format!("Failed to load story {}", story_id))
    }

    pub async fn save_story(&self, story: &mut Story) -> Result<()> {
        self.services
            .store
            .save_story(story)
            .await
            .with_context(|| format!("Failed to save story {}", story.story_id))
    }

    /// Atomic read-modify-write of the persisted story; `None` if it is gone
    pub async fn update_story(
        &self,
        story_id: &str,
        update: impl FnOnce(&mut Story) + Send + 'static,
    ) -> Result<Option<Story>> {
        self.services
            .store
            .update_story(story_id, Box::new(update))
            .await
            .with_context(|| format!("Failed to update story {}", story_id))
    }

    /// Call the generator once on behalf of `story` and record its usage.
    ///
    /// The story's model override applies. Metrics are appended to the
    /// story in memory; the caller persists them with its own save or
    /// replays the last entry through `update_story`.
    pub async fn generate(
        &self,
        story: &mut Story,
        action: &str,
        round_number: u32,
        prompt: String,
    ) -> Result<String> {
        let request = GenerationRequest::new(prompt, self.system_prompt.as_str())
            .with_model(story.model_override());

        let started = Instant::now();
        let Generation { text, usage } = self
            .services
            .generator
            .generate(request)
            .await
            .with_context(|| format!("{} generation failed for story {}", action, story.story_id))?;
        let elapsed = started.elapsed().as_secs_f64();

        story.record_metrics(AgentMetrics {
            agent: self.name().to_string(),
            action: action.to_string(),
            round_number,
            duration_seconds: (elapsed * 100.0).round() / 100.0,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            timestamp: Utc::now(),
        });

        Ok(text)
    }

    /// Push a new message to `target`'s queue
    pub async fn send(
        &self,
        target: Stage,
        story_id: &str,
        action: Action,
        payload: Payload,
    ) -> Result<()> {
        let message = Message::new(story_id, action)
            .with_payload(payload)
            .route(self.name(), target.as_str());

        self.services
            .queue
            .push(target.queue(), &message)
            .await
            .with_context(|| format!("Failed to enqueue {} for {}", message.action, target))
    }

    /// Report back to the orchestrator's control queue
    pub async fn reply(&self, story_id: &str, action: Action, payload: Payload) -> Result<()> {
        self.send(Stage::Orchestrator, story_id, action, payload).await
    }
}

/// Word count used in activity details
pub(crate) fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
