//! Domain types for the editorial pipeline.
//!
//! - Story: the per-run aggregate and its status machine
//! - Message: the queue envelope, actions and payloads
//! - Stage: pipeline components and their queues
//! - Activity: activity records and anthologies

pub mod activity;
pub mod message;
pub mod stage;
pub mod story;

// Re-export commonly used types
pub use activity::{ActivityLog, Anthology};
pub use message::{short_id, Action, Message, Payload};
pub use stage::Stage;
pub use story::{
    AgentMetrics, FeedbackItem, Revision, Story, StoryStatus, TransitionError, Usage,
    WritingPrompt,
};
