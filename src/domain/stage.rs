//! Pipeline stages and the queues they listen on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One component of the pipeline; each owns exactly one named queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Orchestrator,
    PromptGenerator,
    Writer,
    Reviewer,
    Editor,
    CoverDesigner,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Orchestrator,
        Stage::PromptGenerator,
        Stage::Writer,
        Stage::Reviewer,
        Stage::Editor,
        Stage::CoverDesigner,
    ];

    /// Agent name used in message routing, feedback and activity records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::PromptGenerator => "prompt_generator",
            Self::Writer => "writer",
            Self::Reviewer => "reviewer",
            Self::Editor => "editor",
            Self::CoverDesigner => "cover_designer",
        }
    }

    /// Name of the queue this stage consumes
    pub fn queue(&self) -> &'static str {
        match self {
            Self::Orchestrator => "queue:orchestrator",
            Self::PromptGenerator => "queue:prompt_generator",
            Self::Writer => "queue:writer",
            Self::Reviewer => "queue:reviewer",
            Self::Editor => "queue:editor",
            Self::CoverDesigner => "queue:cover_designer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("Unknown stage '{}'", s))
    }
}
