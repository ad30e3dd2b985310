//! Command-line interface for folio.
//!
//! Provides commands for seeding stories, running pipeline agents,
//! inspecting stories and activity, and managing anthologies.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::adapters::OllamaGenerator;
use crate::agents::{build_agent, AgentRunner, Services};
use crate::config::{self, ResolvedConfig};
use crate::domain::{Action, Anthology, Message, Payload, Stage, Story, StoryStatus};
use crate::queue::{MessageQueue, SqliteQueue};
use crate::store::{DocumentStore, SqliteStore};

/// folio - Message-driven editorial pipeline
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new story
    Seed {
        /// Story idea to build the prompt around
        idea: Option<String>,

        /// Preferred genre (must match a configured genre)
        #[arg(short, long)]
        genre: Option<String>,

        /// Generation model override for this story
        #[arg(short, long)]
        model: Option<String>,

        /// Explicit story id (generated if omitted)
        #[arg(long)]
        story_id: Option<String>,
    },

    /// Run a single pipeline agent
    Agent {
        /// Stage name (orchestrator, prompt_generator, writer, reviewer, editor, cover_designer)
        stage: Stage,
    },

    /// Run every pipeline agent in this process
    All,

    /// Show a story
    Status {
        story_id: String,

        /// Print the current draft
        #[arg(short, long)]
        full: bool,
    },

    /// List stories, most recently updated first
    Stories {
        /// Only stories in this status (e.g. IN_REVIEW)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of stories to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Stories not yet published, oldest first
    InProgress {
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Story count per status
    Counts,

    /// Recent agent activity
    Activity {
        #[arg(short = 'n', long, default_value = "30")]
        limit: usize,
    },

    /// Manage anthologies
    Anthology {
        #[command(subcommand)]
        command: AnthologyCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum AnthologyCommands {
    /// Create an anthology
    Create {
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Add a story to an anthology
    Add {
        anthology_id: String,
        story_id: String,
    },

    /// List anthologies
    List {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Seed {
                idea,
                genre,
                model,
                story_id,
            } => seed(cfg, idea, genre, model, story_id).await,
            Commands::Agent { stage } => run_agents(cfg, &[stage]).await,
            Commands::All => run_agents(cfg, &Stage::ALL).await,
            Commands::Status { story_id, full } => show_status(cfg, &story_id, full).await,
            Commands::Stories { status, limit } => list_stories(cfg, status, limit).await,
            Commands::InProgress { limit } => list_in_progress(cfg, limit).await,
            Commands::Counts => show_counts(cfg).await,
            Commands::Activity { limit } => show_activity(cfg, limit).await,
            Commands::Anthology { command } => execute_anthology(cfg, command).await,
            Commands::Config => show_config(cfg),
        }
    }
}

fn open_store(cfg: &ResolvedConfig) -> Result<SqliteStore> {
    SqliteStore::open(&cfg.database)
        .with_context(|| format!("Failed to open store at {}", cfg.database.display()))
}

fn open_queue(cfg: &ResolvedConfig) -> Result<SqliteQueue> {
    SqliteQueue::open(&cfg.database)
        .with_context(|| format!("Failed to open queue at {}", cfg.database.display()))
}

fn open_services(cfg: &ResolvedConfig) -> Result<Services> {
    let store = open_store(cfg)?;
    let queue = open_queue(cfg)?;
    let generator = OllamaGenerator::new(&cfg.generation)?;
    Ok(Services::new(
        Arc::new(queue),
        Arc::new(store),
        Arc::new(generator),
    ))
}

/// Enqueue a start message for the orchestrator
async fn seed(
    cfg: &ResolvedConfig,
    idea: Option<String>,
    genre: Option<String>,
    model: Option<String>,
    story_id: Option<String>,
) -> Result<()> {
    // The store creates the database directory
    open_store(cfg)?;
    let queue = open_queue(cfg)?;

    let mut payload = Payload::new();
    if let Some(idea) = idea {
        payload.insert("user_prompt", idea);
    }
    if let Some(genre) = genre {
        payload.insert("genre", genre);
    }
    if let Some(model) = model {
        payload.insert("model", model);
    }

    let story_id = story_id.unwrap_or_else(crate::domain::short_id);
    let message = Message::new(story_id.as_str(), Action::StartNewStory)
        .with_payload(payload)
        .route("cli", Stage::Orchestrator.as_str());

    queue.push(Stage::Orchestrator.queue(), &message).await?;

    println!("Seeded story {}", story_id);
    Ok(())
}

/// Run the given stages until ctrl-c
async fn run_agents(cfg: &ResolvedConfig, stages: &[Stage]) -> Result<()> {
    let services = open_services(cfg)?;
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let mut tasks = JoinSet::new();

    for &stage in stages {
        let runner = AgentRunner::new(build_agent(stage, &services, cfg), &cfg.pipeline);
        let mut shutdown = shutdown_tx.subscribe();
        tasks.spawn(async move {
            runner
                .run_until(async move {
                    let _ = shutdown.recv().await;
                })
                .await;
        });
    }

    info!(
        agents = stages.len(),
        mode = %cfg.pipeline.review_mode,
        database = %cfg.database.display(),
        "Pipeline running, press ctrl-c to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Shutting down");
    let _ = shutdown_tx.send(());

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Agent task failed");
        }
    }

    Ok(())
}

async fn show_status(cfg: &ResolvedConfig, story_id: &str, full: bool) -> Result<()> {
    let store = open_store(cfg)?;
    let story = store
        .get_story(story_id)
        .await?
        .with_context(|| format!("Story not found: {}", story_id))?;

    println!("Story ID:  {}", story.story_id);
    println!("Title:     {}", display_or(&story.title, "(untitled)"));
    println!("Status:    {}", story.status);
    println!("Genre:     {}", display_or(story.genre(), "(none)"));
    if let Some(model) = story.model_override() {
        println!("Model:     {}", model);
    }
    println!("Revisions: {}/{}", story.revision_count, story.max_revisions);
    println!("Created:   {}", story.created_at);
    println!("Updated:   {}", story.updated_at);
    println!(
        "Usage:     {} tokens in {:.2}s",
        story.total_tokens, story.total_duration_seconds
    );

    if !story.feedback.is_empty() {
        println!("\nFeedback:");
        for item in &story.feedback {
            println!(
                "  round {} {:<9} {}",
                item.round_number,
                item.agent,
                if item.approved { "approved" } else { "changes requested" }
            );
        }
    }

    if full && !story.current_draft.is_empty() {
        println!("\n{}", story.current_draft);
    }

    Ok(())
}

async fn list_stories(cfg: &ResolvedConfig, status: Option<String>, limit: usize) -> Result<()> {
    let status = status
        .map(|s| StoryStatus::parse(&s).with_context(|| format!("Unknown status: {}", s)))
        .transpose()?;

    let store = open_store(cfg)?;
    let stories = store.list_stories(status, limit).await?;
    print_stories(&stories);
    Ok(())
}

async fn list_in_progress(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let store = open_store(cfg)?;
    let stories = store.list_in_progress(limit).await?;
    print_stories(&stories);
    Ok(())
}

fn print_stories(stories: &[Story]) {
    if stories.is_empty() {
        println!("No stories found");
        return;
    }

    println!("{:<14} {:<16} {:<8} {:<26} TITLE", "STORY ID", "STATUS", "ROUNDS", "UPDATED");
    println!("{}", "-".repeat(90));

    for story in stories {
        println!(
            "{:<14} {:<16} {:<8} {:<26} {}",
            story.story_id,
            story.status.as_str(),
            format!("{}/{}", story.revision_count, story.max_revisions),
            story.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            display_or(&story.title, "-")
        );
    }
}

async fn show_counts(cfg: &ResolvedConfig) -> Result<()> {
    let store = open_store(cfg)?;
    let counts = store.count_by_status().await?;
    let total: usize = counts.iter().map(|(_, n)| n).sum();

    for (status, count) in counts {
        println!("{:<16} {}", status.as_str(), count);
    }
    println!("{:<16} {}", "TOTAL", total);
    Ok(())
}

async fn show_activity(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let store = open_store(cfg)?;
    let entries = store.recent_activity(limit).await?;

    if entries.is_empty() {
        println!("No activity recorded");
        return Ok(());
    }

    for entry in entries.iter().rev() {
        println!(
            "{} {:<16} {:<14} {:<22} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.agent_name,
            display_or(&entry.story_id, "-"),
            entry.action,
            entry.detail.lines().next().unwrap_or("")
        );
    }
    Ok(())
}

async fn execute_anthology(cfg: &ResolvedConfig, command: AnthologyCommands) -> Result<()> {
    let store = open_store(cfg)?;

    match command {
        AnthologyCommands::Create { title, description } => {
            let mut anthology = Anthology::new(title, description);
            store.save_anthology(&mut anthology).await?;
            println!("Created anthology {} ({})", anthology.anthology_id, anthology.title);
        }
        AnthologyCommands::Add {
            anthology_id,
            story_id,
        } => {
            let mut anthology = store
                .get_anthology(&anthology_id)
                .await?
                .with_context(|| format!("Anthology not found: {}", anthology_id))?;
            let story = store
                .get_story(&story_id)
                .await?
                .with_context(|| format!("Story not found: {}", story_id))?;

            if story.status != StoryStatus::Published {
                anyhow::bail!("Story {} is not published yet ({})", story_id, story.status);
            }

            if anthology.add_story(&story_id) {
                store.save_anthology(&mut anthology).await?;
                println!("Added '{}' to {}", display_or(&story.title, &story_id), anthology.title);
            } else {
                println!("Story {} is already in {}", story_id, anthology.title);
            }
        }
        AnthologyCommands::List { limit } => {
            let anthologies = store.list_anthologies(limit).await?;
            if anthologies.is_empty() {
                println!("No anthologies found");
            }
            for anthology in anthologies {
                println!(
                    "{:<14} {:<30} {} stories",
                    anthology.anthology_id,
                    anthology.title,
                    anthology.story_ids.len()
                );
            }
        }
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Database:  {}", cfg.database.display());
    println!(
        "  Prompts:   {}",
        cfg.prompts_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in)".to_string())
    );
    println!();
    println!("Pipeline:");
    println!("  Review mode:    {}", cfg.pipeline.review_mode);
    println!("  Max revisions:  {}", cfg.pipeline.max_revisions);
    println!("  Queue timeout:  {}s", cfg.pipeline.queue_timeout_seconds);
    println!("  Error backoff:  {}s", cfg.pipeline.error_backoff_seconds);
    println!();
    println!("Generation:");
    println!("  URL:      {}", cfg.generation.base_url);
    println!("  Model:    {}", cfg.generation.model);
    println!("  Timeout:  {}s", cfg.generation.timeout_seconds);
    println!("  Attempts: {}", cfg.generation.retry.max_attempts);
    println!();
    println!("Genres:");
    for genre in &cfg.genres {
        println!(
            "  {:<18} {}-{} words, {} themes",
            genre.name,
            genre.word_count_min,
            genre.word_count_max,
            genre.themes.len()
        );
    }

    Ok(())
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
