//! ABOUTME: Group repository for organizing applications on the dashboard
//! ABOUTME: Groups are keyed by id, carry tags, and notify on every upsert

use sb_core::{Error, Result};
use sb_store::{Collection, Query};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use validator::Validate;

use crate::events::{ChangeEvent, EventBus};

/// Group entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Group {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Group repository
pub struct GroupRepository<'a> {
    collection: &'a Collection<Group>,
    events: &'a EventBus,
}

impl<'a> GroupRepository<'a> {
    pub fn new(collection: &'a Collection<Group>, events: &'a EventBus) -> Self {
        Self { collection, events }
    }

    /// Find a group by id
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Group>> {
        debug!("Finding group by id: {}", id);
        Ok(self.collection.find(id).await?)
    }

    /// Find a group by name; first match if several share the name
    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Group>> {
        let matches = self
            .collection
            .search(&Query::new().eq("name", name))
            .await?;
        Ok(matches.into_iter().next())
    }

    /// All groups carrying the given tag
    #[instrument(skip(self))]
    pub async fn find_by_tag(&self, tag: &str) -> Result<Vec<Group>> {
        Ok(self
            .collection
            .search(&Query::new().eq("tags", tag))
            .await?)
    }

    /// List every group
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Group>> {
        let groups = self.collection.search(&Query::new()).await?;
        debug!("Found {} groups", groups.len());
        Ok(groups)
    }

    /// Validate and upsert a group by id, then notify subscribers
    #[instrument(skip(self, group))]
    pub async fn upsert(&self, group: Group) -> Result<Group> {
        group
            .validate()
            .map_err(|e| Error::Validation(format!("Invalid group: {}", e)))?;

        self.collection
            .update(&Query::new().eq("id", group.id.as_str()), &group)
            .await?;

        self.events.publish(ChangeEvent::GroupUpdated(group.clone()));

        debug!("Upserted group: {}", group.id);
        Ok(group)
    }

    /// Delete a group; deleting an unknown id is not an error
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = self.collection.delete(&Query::new().eq("id", id)).await?;
        debug!("Deleted {} group record(s) for id: {}", removed, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (Collection<Group>, EventBus) {
        let collection = Collection::in_memory().await.unwrap();
        let events = EventBus::new(16);
        (collection, events)
    }

    fn group(id: &str, name: &str, tags: &[&str]) -> Group {
        Group {
            id: id.to_string(),
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_overwrites() {
        let (collection, events) = fixture().await;
        let repo = GroupRepository::new(&collection, &events);

        repo.upsert(group("g-1", "frontend", &[])).await.unwrap();
        repo.upsert(group("g-1", "frontend-eu", &["eu"])).await.unwrap();

        let found = repo.find_by_id("g-1").await.unwrap().unwrap();
        assert_eq!(found.name, "frontend-eu");
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_publishes_group_updated() {
        let (collection, events) = fixture().await;
        let repo = GroupRepository::new(&collection, &events);
        let mut receiver = events.subscribe();

        let stored = repo.upsert(group("g-1", "frontend", &[])).await.unwrap();

        match receiver.try_recv().unwrap() {
            ChangeEvent::GroupUpdated(payload) => assert_eq!(payload, stored),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn find_by_name_returns_first_match() {
        let (collection, events) = fixture().await;
        let repo = GroupRepository::new(&collection, &events);

        repo.upsert(group("g-1", "ops", &[])).await.unwrap();
        repo.upsert(group("g-2", "ops", &[])).await.unwrap();

        let found = repo.find_by_name("ops").await.unwrap().unwrap();
        assert_eq!(found.id, "g-1");
        assert!(repo.find_by_name("none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_tag_uses_membership() {
        let (collection, events) = fixture().await;
        let repo = GroupRepository::new(&collection, &events);

        repo.upsert(group("g-1", "frontend", &["eu", "web"])).await.unwrap();
        repo.upsert(group("g-2", "backend", &["us"])).await.unwrap();

        let tagged = repo.find_by_tag("eu").await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, "g-1");
        assert!(repo.find_by_tag("apac").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_group_is_rejected() {
        let (collection, events) = fixture().await;
        let repo = GroupRepository::new(&collection, &events);

        let err = repo.upsert(group("g-1", "", &[])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(repo.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (collection, events) = fixture().await;
        let repo = GroupRepository::new(&collection, &events);

        repo.upsert(group("g-1", "frontend", &[])).await.unwrap();
        repo.delete("g-1").await.unwrap();
        assert!(repo.find_by_id("g-1").await.unwrap().is_none());
        repo.delete("g-1").await.unwrap();
    }
}
