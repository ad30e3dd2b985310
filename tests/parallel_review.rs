//! Parallel Review Integration Tests
//!
//! Fan-out to reviewer and editor at once, fan-in before evaluation.

mod common;

use std::time::Duration;

use common::*;
use folio::config::ReviewMode;
use folio::core::ReviewRole;
use folio::domain::{Action, Message, Payload, Stage, StoryStatus};
use folio::{Disposition, Tick};

/// Run one round with the roles finishing in `order`; return the story and
/// the orchestrator's tick after each arrival
async fn run_round(order: [Stage; 2]) -> (Harness, Vec<Tick>) {
    let generator = ScriptedGenerator::new().reply(REVIEW, REJECT);
    let harness = Harness::new(ReviewMode::Parallel, 3, generator);
    harness.advance_to_review("story-1").await;

    let mut arrivals = Vec::new();
    for stage in order {
        harness.step(stage).await;
        arrivals.push(harness.step(Stage::Orchestrator).await);
    }
    (harness, arrivals)
}

#[tokio::test]
async fn test_round_fans_out_to_both_roles() {
    let harness = Harness::new(ReviewMode::Parallel, 3, ScriptedGenerator::new());
    harness.advance_to_review("story-1").await;

    let reviews = harness.waiting(Stage::Reviewer);
    let edits = harness.waiting(Stage::Editor);
    assert_eq!(reviews.len(), 1);
    assert_eq!(edits.len(), 1);
    assert_eq!(reviews[0].action, Action::Review);
    assert_eq!(edits[0].action, Action::Edit);
    assert_eq!(reviews[0].payload.round_number(), Some(1));
    assert_eq!(edits[0].payload.round_number(), Some(1));

    assert_eq!(
        harness.orchestrator.pending().waiting_on("story-1"),
        Some((1, vec![ReviewRole::Reviewer, ReviewRole::Editor]))
    );
}

#[tokio::test]
async fn test_arrival_order_does_not_change_decision() {
    let (reviewer_first, _) = run_round([Stage::Reviewer, Stage::Editor]).await;
    let (editor_first, _) = run_round([Stage::Editor, Stage::Reviewer]).await;

    for harness in [&reviewer_first, &editor_first] {
        let story = harness.story("story-1").await;
        assert_eq!(story.status, StoryStatus::RevisionNeeded);
        assert!(!story.feedback_for("reviewer", 1).unwrap().approved);
        assert!(story.feedback_for("editor", 1).unwrap().approved);

        let revise = harness.waiting(Stage::Writer);
        assert_eq!(revise.len(), 1);
        assert_eq!(revise[0].payload.round_number(), Some(1));
        assert_eq!(revise[0].payload.u32("next_round"), Some(2));
        assert_eq!(harness.generator.count(SUMMARIZE), 1);
        assert!(harness.orchestrator.pending().is_empty());
    }
}

#[tokio::test]
async fn test_evaluation_waits_for_both_roles() {
    let harness = Harness::new(ReviewMode::Parallel, 3, ScriptedGenerator::new());
    harness.advance_to_review("story-1").await;

    harness.step(Stage::Editor).await;
    harness.step(Stage::Orchestrator).await;

    // Editor is in, reviewer is not: nothing decided yet
    assert_eq!(harness.story("story-1").await.status, StoryStatus::InReview);
    assert_eq!(harness.pending(Stage::CoverDesigner).await, 0);
    assert_eq!(
        harness.orchestrator.pending().waiting_on("story-1"),
        Some((1, vec![ReviewRole::Reviewer]))
    );

    harness.step(Stage::Reviewer).await;
    harness.step(Stage::Orchestrator).await;

    assert_eq!(
        harness.story("story-1").await.status,
        StoryStatus::DesigningCover
    );
    assert_eq!(harness.pending(Stage::CoverDesigner).await, 1);
    assert!(harness.orchestrator.pending().is_empty());
}

#[tokio::test]
async fn test_late_duplicate_does_not_evaluate_again() {
    let (harness, arrivals) = run_round([Stage::Reviewer, Stage::Editor]).await;
    assert_eq!(arrivals, vec![Tick::Handled(Disposition::Completed); 2]);
    assert_eq!(harness.generator.count(SUMMARIZE), 1);

    let duplicate = Message::new("story-1", Action::EditComplete).with_payload(
        Payload::new()
            .with("round_number", 1)
            .with("approved", true)
            .with("feedback", "again"),
    );
    harness.push(Stage::Orchestrator, duplicate).await;
    harness.step(Stage::Orchestrator).await;

    assert_eq!(harness.generator.count(SUMMARIZE), 1);
    assert_eq!(harness.waiting(Stage::Writer).len(), 1);
    assert_eq!(
        harness.story("story-1").await.status,
        StoryStatus::RevisionNeeded
    );
}

#[tokio::test]
async fn test_parallel_revision_cycle_publishes() {
    let generator = ScriptedGenerator::new()
        .reply(EDIT, REJECT)
        .reply(EDIT, REJECT);
    let harness = Harness::new(ReviewMode::Parallel, 5, generator);
    harness.seed("story-1", Payload::new()).await;
    harness.drain().await;

    let story = harness.story("story-1").await;
    assert_eq!(story.status, StoryStatus::Published);
    assert_eq!(story.revision_count, 2);
    assert!(story.feedback_for("editor", 3).unwrap().approved);
    assert!(harness.orchestrator.pending().is_empty());
}

#[tokio::test]
async fn test_concurrent_critics_keep_both_feedback_items() {
    let generator = ScriptedGenerator::new()
        .reply(REVIEW, REJECT)
        .with_latency(Duration::from_millis(50));
    let harness = Harness::new(ReviewMode::Parallel, 3, generator);
    harness.advance_to_review("story-1").await;
    let before = harness.story("story-1").await.metrics.len();

    // Both critics read the story before either writes it back
    let (review, edit) = tokio::join!(
        harness.step(Stage::Reviewer),
        harness.step(Stage::Editor)
    );
    assert_eq!(review, Tick::Handled(Disposition::Completed));
    assert_eq!(edit, Tick::Handled(Disposition::Completed));

    let story = harness.story("story-1").await;
    assert!(!story.feedback_for("reviewer", 1).unwrap().approved);
    assert!(story.feedback_for("editor", 1).unwrap().approved);
    assert_eq!(story.feedback.len(), 2);
    assert_eq!(story.metrics.len(), before + 2);
    assert_eq!(
        story.total_tokens,
        story.metrics.iter().map(|m| m.total_tokens).sum::<u64>()
    );
    assert_eq!(story.status, StoryStatus::InReview);
}
