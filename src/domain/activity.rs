//! Activity records and the anthology aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::short_id;

/// Best-effort record of something an agent did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub agent_name: String,
    #[serde(default)]
    pub story_id: String,
    pub action: String,
    #[serde(default)]
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(
        agent_name: impl Into<String>,
        story_id: impl Into<String>,
        action: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            story_id: story_id.into(),
            action: action.into(),
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A named collection of published stories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anthology {
    pub anthology_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub story_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Anthology {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            anthology_id: short_id(),
            title: title.into(),
            description: description.into(),
            story_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a story, ignoring duplicates. Returns whether it was added.
    pub fn add_story(&mut self, story_id: &str) -> bool {
        if self.story_ids.iter().any(|id| id == story_id) {
            return false;
        }
        self.story_ids.push(story_id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anthology_add_story_dedupes() {
        let mut anthology = Anthology::new("Night Shift", "");
        assert!(anthology.add_story("a"));
        assert!(anthology.add_story("b"));
        assert!(!anthology.add_story("a"));
        assert_eq!(anthology.story_ids, vec!["a", "b"]);
    }
}
