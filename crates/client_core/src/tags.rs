use std::sync::Arc;

use shared::{domain::TagId, protocol::Tag};
use tracing::debug;

use crate::{error::Result, gateway::BackendGateway};

pub struct TagSearch {
    gateway: Arc<dyn BackendGateway>,
}

impl TagSearch {
    pub fn new(gateway: Arc<dyn BackendGateway>) -> Self {
        Self { gateway }
    }

    pub async fn search(&self, prefix: &str) -> Result<Vec<Tag>> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Ok(Vec::new());
        }
        let tags = self.gateway.search_tags(prefix).await?;
        debug!(prefix, found = tags.len(), "tags: search");
        Ok(tags)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSelection {
    tags: Vec<Tag>,
}

impl TagSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when a tag with the same id is already selected.
    pub fn add(&mut self, tag: Tag) -> bool {
        if self.tags.iter().any(|picked| picked.id == tag.id) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    pub fn remove(&mut self, id: TagId) -> Option<Tag> {
        let index = self.tags.iter().position(|tag| tag.id == id)?;
        Some(self.tags.remove(index))
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl FromIterator<Tag> for TagSelection {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        let mut selection = Self::new();
        for tag in iter {
            selection.add(tag);
        }
        selection
    }
}

#[cfg(test)]
#[path = "tests/tags_tests.rs"]
mod tests;
