//! Core orchestration logic.
//!
//! This module contains:
//! - Decision: the approve/revise rule for a finished review round
//! - Join: parallel-mode fan-in of reviewer and editor results
//! - Orchestrator: the story state machine driven by the control queue

pub mod decision;
pub mod join;
pub mod orchestrator;

// Re-export commonly used types
pub use decision::{evaluate, Decision};
pub use join::{CompleteRound, PendingFeedback, ReviewRole, RoleFeedback};
pub use orchestrator::Orchestrator;
