//! SQLite Pipeline Integration Tests
//!
//! Every stage running concurrently over the durable backends, the way
//! `folio all` runs them.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use folio::agents::{build_agent, AgentRunner, Services};
use folio::config::{ResolvedConfig, ReviewMode};
use folio::domain::{Action, Message, Payload, Stage, StoryStatus};
use folio::queue::{MessageQueue, SqliteQueue};
use folio::store::{DocumentStore, SqliteStore};
use tempfile::TempDir;

async fn run_to_publication(mode: ReviewMode, generator: ScriptedGenerator) {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("folio.db");

    let store = Arc::new(SqliteStore::open(&db).unwrap());
    let queue = Arc::new(SqliteQueue::open(&db).unwrap().with_poll_interval(Duration::from_millis(20)));
    let services = Services::new(queue.clone(), store.clone(), Arc::new(generator));

    let mut config = ResolvedConfig::with_home(PathBuf::from(temp.path()));
    config.pipeline = pipeline_config(mode, 3);
    config.pipeline.queue_timeout_seconds = 1;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let mut handles = Vec::new();
    for stage in Stage::ALL {
        let runner = AgentRunner::new(build_agent(stage, &services, &config), &config.pipeline);
        let mut shutdown = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            runner
                .run_until(async move {
                    let _ = shutdown.recv().await;
                })
                .await;
        }));
    }

    let start = Message::new("story-1", Action::StartNewStory)
        .with_payload(Payload::new().with("user_prompt", "a map that redraws itself"));
    queue.push(Stage::Orchestrator.queue(), &start).await.unwrap();

    let published = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            if let Some(story) = store.get_story("story-1").await.unwrap() {
                if story.status == StoryStatus::Published {
                    return story;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("story was not published in time");

    shutdown_tx.send(()).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(published.revision_count, 1);
    assert_eq!(published.revisions.len(), 1);
    assert!(published.cover_svg.contains("<rect"));

    // Every round kept exactly one item per role, whatever the timing
    let rounds = published.revision_count + 1;
    for round in 1..=rounds {
        assert!(published.feedback_for("reviewer", round).is_some(), "reviewer round {}", round);
        assert!(published.feedback_for("editor", round).is_some(), "editor round {}", round);
    }
    assert_eq!(published.feedback.len(), 2 * rounds as usize);
    // prompt, draft, revision, summary, cover plus two critic calls per round
    assert_eq!(published.metrics.len(), 5 + 2 * rounds as usize);

    for stage in Stage::ALL {
        assert_eq!(queue.len(stage.queue()).await.unwrap(), 0);
    }

    let counts = store.count_by_status().await.unwrap();
    assert!(counts.contains(&(StoryStatus::Published, 1)));

    // Reopening the database sees the same story
    drop(store);
    let reopened = SqliteStore::open(&db).unwrap();
    let story = reopened.get_story("story-1").await.unwrap().unwrap();
    assert_eq!(story.status, StoryStatus::Published);
}

#[tokio::test]
async fn test_sequential_pipeline_over_sqlite() {
    run_to_publication(
        ReviewMode::Sequential,
        ScriptedGenerator::new().reply(REVIEW, REJECT),
    )
    .await;
}

#[tokio::test]
async fn test_parallel_pipeline_over_sqlite() {
    run_to_publication(
        ReviewMode::Parallel,
        ScriptedGenerator::new().reply(EDIT, REJECT),
    )
    .await;
}
