//! In-process store backend, used by single-process runs and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{DocumentStore, StoreError, StoryUpdate};
use crate::domain::{ActivityLog, Anthology, Story, StoryStatus};

#[derive(Default)]
struct Inner {
    stories: HashMap<String, Story>,
    anthologies: HashMap<String, Anthology>,
    activity: Vec<ActivityLog>,
}

/// Documents held in memory
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_story(&self, story_id: &str) -> Result<Option<Story>, StoreError> {
        Ok(self.lock()?.stories.get(story_id).cloned())
    }

    async fn save_story(&self, story: &mut Story) -> Result<(), StoreError> {
        story.touch();
        self.lock()?
            .stories
            .insert(story.story_id.clone(), story.clone());
        Ok(())
    }

    async fn update_story(
        &self,
        story_id: &str,
        update: StoryUpdate,
    ) -> Result<Option<Story>, StoreError> {
        let mut inner = self.lock()?;
        let Some(story) = inner.stories.get_mut(story_id) else {
            return Ok(None);
        };
        update(story);
        story.touch();
        Ok(Some(story.clone()))
    }

    async fn list_stories(
        &self,
        status: Option<StoryStatus>,
        limit: usize,
    ) -> Result<Vec<Story>, StoreError> {
        let mut stories: Vec<Story> = self
            .lock()?
            .stories
            .values()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect();
        stories.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        stories.truncate(limit);
        Ok(stories)
    }

    async fn list_in_progress(&self, limit: usize) -> Result<Vec<Story>, StoreError> {
        let mut stories: Vec<Story> = self
            .lock()?
            .stories
            .values()
            .filter(|s| !s.status.is_terminal())
            .cloned()
            .collect();
        stories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        stories.truncate(limit);
        Ok(stories)
    }

    async fn count_by_status(&self) -> Result<Vec<(StoryStatus, usize)>, StoreError> {
        let inner = self.lock()?;
        Ok(StoryStatus::ALL
            .into_iter()
            .map(|status| {
                let count = inner.stories.values().filter(|s| s.status == status).count();
                (status, count)
            })
            .collect())
    }

    async fn get_anthology(&self, anthology_id: &str) -> Result<Option<Anthology>, StoreError> {
        Ok(self.lock()?.anthologies.get(anthology_id).cloned())
    }

    async fn save_anthology(&self, anthology: &mut Anthology) -> Result<(), StoreError> {
        anthology.updated_at = Utc::now();
        self.lock()?
            .anthologies
            .insert(anthology.anthology_id.clone(), anthology.clone());
        Ok(())
    }

    async fn list_anthologies(&self, limit: usize) -> Result<Vec<Anthology>, StoreError> {
        let mut anthologies: Vec<Anthology> = self.lock()?.anthologies.values().cloned().collect();
        anthologies.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        anthologies.truncate(limit);
        Ok(anthologies)
    }

    async fn log_activity(&self, entry: &ActivityLog) -> Result<(), StoreError> {
        self.lock()?.activity.push(entry.clone());
        Ok(())
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityLog>, StoreError> {
        Ok(self
            .lock()?
            .activity
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_story_edits_in_place() {
        let store = MemoryStore::new();
        let mut story = Story::new("s1", 3);
        store.save_story(&mut story).await.unwrap();

        let updated = store
            .update_story(
                "s1",
                Box::new(|s: &mut Story| s.push_feedback("editor", 1, "tight".to_string(), true)),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(updated.updated_at >= story.updated_at);

        let loaded = store.get_story("s1").await.unwrap().unwrap();
        assert!(loaded.feedback_for("editor", 1).unwrap().approved);

        let missing = store
            .update_story("ghost", Box::new(|s: &mut Story| s.title = "x".to_string()))
            .await
            .unwrap();
        assert!(missing.is_none());
        assert!(store.get_story("ghost").await.unwrap().is_none());
    }
}
