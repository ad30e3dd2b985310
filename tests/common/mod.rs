//! Shared test fixtures: a scripted generator and an in-memory pipeline.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use folio::adapters::{Generation, GenerationRequest, Generator};
use folio::agents::{build_agent, AgentContext, AgentRunner, Services, Tick};
use folio::config::{PipelineConfig, ResolvedConfig, ReviewMode};
use folio::core::orchestrator::SYSTEM_PROMPT;
use folio::domain::{Action, Message, Payload, Stage, Story, Usage};
use folio::queue::{MemoryQueue, MessageQueue};
use folio::store::{DocumentStore, MemoryStore};
use folio::Orchestrator;

pub const APPROVE: &str = "Strong, coherent story.\nAPPROVED: YES";
pub const REJECT: &str = "The ending is rushed.\nAPPROVED: NO";
pub const DRAFT: &str = "# The Salt Archive\n\nThe sea kept records of everyone it drowned.";
pub const COVER: &str =
    r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 600 900"><rect width="600" height="900"/></svg>"#;

/// Prompt prefixes each stage's requests start with
pub const PROMPT: &str = "Genre:";
pub const WRITE: &str = "Write a";
pub const REVISE: &str = "Here is your current draft";
pub const REVIEW: &str = "Review this";
pub const EDIT: &str = "Edit this";
pub const SUMMARIZE: &str = "Reviewer feedback:";
pub const DESIGN: &str = "Design an SVG";

enum Reply {
    Text(String),
    Fail(String),
}

/// Generator that answers by prompt prefix.
///
/// Scripted replies for a prefix are used in order; once exhausted the
/// stage's default (approvals for critics) applies.
#[derive(Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    latency: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, prefix: &'static str, text: &str) -> Self {
        self.push(prefix, Reply::Text(text.to_string()));
        self
    }

    /// Sleep this long inside every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fail(self, prefix: &'static str, error: &str) -> Self {
        self.push(prefix, Reply::Fail(error.to_string()));
        self
    }

    fn push(&self, prefix: &'static str, reply: Reply) {
        self.scripts
            .lock()
            .unwrap()
            .entry(prefix)
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// How many requests started with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.prompt.starts_with(prefix))
            .count()
    }

    fn default_reply(prompt: &str) -> String {
        if prompt.starts_with(REVIEW) || prompt.starts_with(EDIT) {
            APPROVE.to_string()
        } else if prompt.starts_with(DESIGN) {
            COVER.to_string()
        } else if prompt.starts_with(SUMMARIZE) {
            "1. Rewrite the ending.".to_string()
        } else {
            DRAFT.to_string()
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts
                .iter_mut()
                .find(|(prefix, replies)| request.prompt.starts_with(**prefix) && !replies.is_empty())
                .and_then(|(_, replies)| replies.pop_front())
        };

        match scripted {
            Some(Reply::Fail(error)) => anyhow::bail!("{}", error),
            Some(Reply::Text(text)) => Ok(Generation::new(text, Usage::new(10, 20))),
            None => Ok(Generation::new(
                Self::default_reply(&request.prompt),
                Usage::new(10, 20),
            )),
        }
    }
}

pub fn pipeline_config(mode: ReviewMode, max_revisions: u32) -> PipelineConfig {
    PipelineConfig {
        max_revisions,
        review_mode: mode,
        queue_timeout_seconds: 0,
        error_backoff_seconds: 0,
    }
}

/// Every stage wired over in-memory backends, driven one message at a time
pub struct Harness {
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<MemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub orchestrator: Arc<Orchestrator>,
    runners: HashMap<Stage, AgentRunner>,
}

impl Harness {
    pub fn new(mode: ReviewMode, max_revisions: u32, generator: ScriptedGenerator) -> Self {
        let queue = Arc::new(MemoryQueue::new());
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(generator);
        let services = Services::new(queue.clone(), store.clone(), generator.clone());

        let mut config = ResolvedConfig::with_home(PathBuf::from("/nonexistent/folio"));
        config.pipeline = pipeline_config(mode, max_revisions);

        let orchestrator = Arc::new(Orchestrator::new(
            AgentContext::new(Stage::Orchestrator, services.clone(), SYSTEM_PROMPT),
            &config.pipeline,
        ));

        let mut runners = HashMap::new();
        runners.insert(
            Stage::Orchestrator,
            AgentRunner::new(orchestrator.clone(), &config.pipeline),
        );
        for stage in Stage::ALL.into_iter().skip(1) {
            runners.insert(
                stage,
                AgentRunner::new(build_agent(stage, &services, &config), &config.pipeline),
            );
        }

        Self {
            queue,
            store,
            generator,
            orchestrator,
            runners,
        }
    }

    /// Enqueue a start message
    pub async fn seed(&self, story_id: &str, payload: Payload) {
        self.push(
            Stage::Orchestrator,
            Message::new(story_id, Action::StartNewStory).with_payload(payload),
        )
        .await;
    }

    pub async fn push(&self, stage: Stage, message: Message) {
        self.queue.push(stage.queue(), &message).await.unwrap();
    }

    /// Handle the next message on `stage`'s queue
    pub async fn step(&self, stage: Stage) -> Tick {
        self.runners[&stage].process_next().await.unwrap()
    }

    /// Handle messages in stage order until every queue is empty
    pub async fn drain(&self) -> Vec<(Stage, Tick)> {
        let mut ticks = Vec::new();

        for _ in 0..100 {
            let mut progressed = false;
            for stage in Stage::ALL {
                while self.pending(stage).await > 0 {
                    ticks.push((stage, self.step(stage).await));
                    progressed = true;
                }
            }
            if !progressed {
                return ticks;
            }
        }

        panic!("pipeline did not settle");
    }

    /// Seed a story and carry it up to its first review fan-out
    pub async fn advance_to_review(&self, story_id: &str) {
        self.seed(story_id, Payload::new()).await;
        for stage in [
            Stage::Orchestrator,
            Stage::PromptGenerator,
            Stage::Orchestrator,
            Stage::Writer,
            Stage::Orchestrator,
        ] {
            assert!(matches!(self.step(stage).await, Tick::Handled(_)));
        }
    }

    pub async fn pending(&self, stage: Stage) -> usize {
        self.queue.len(stage.queue()).await.unwrap()
    }

    pub fn waiting(&self, stage: Stage) -> Vec<Message> {
        self.queue.snapshot(stage.queue()).unwrap()
    }

    pub async fn story(&self, story_id: &str) -> Story {
        self.store.get_story(story_id).await.unwrap().unwrap()
    }
}
