//! folio - Message-driven editorial pipeline
//!
//! Independent agents draft, review, edit, revise and illustrate short
//! stories, coordinated only through queued messages. The orchestrator
//! owns each story's state machine; every other stage is a generic
//! "pop, generate once, persist, reply" worker.
//!
//! # Architecture
//!
//! - Every hop is a message on a named queue (at-most-once delivery)
//! - Stories are documents; the store is the only shared state
//! - Parallel review results are joined in the orchestrator's memory,
//!   so exactly one orchestrator may run per queue
//!
//! # Modules
//!
//! - `adapters`: Generation Service (Ollama) and retry policy
//! - `agents`: Agent runner and the worker stages
//! - `core`: Orchestrator, review decision, fan-in join
//! - `domain`: Data structures (Story, Message, Anthology)
//! - `queue`: Queue Service backends (memory, SQLite)
//! - `store`: Document Store backends (memory, SQLite)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Start a story
//! folio seed "a lighthouse keeper who hears whales"
//!
//! # Run the whole pipeline in one process
//! folio all
//!
//! # Check on it
//! folio status <story-id>
//! ```

pub mod adapters;
pub mod agents;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod queue;
pub mod store;

// Re-export main types at crate root for convenience
pub use agents::{Agent, AgentRunner, Disposition, DropReason, Services, Tick};
pub use core::{Decision, Orchestrator};
pub use domain::{Action, Message, Payload, Stage, Story, StoryStatus};
