//! ABOUTME: Application repository with validation and change notifications
//! ABOUTME: Applications are keyed by caller-supplied id and belong to a group

use sb_core::{Error, Result};
use sb_store::{Collection, Query};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use validator::Validate;

use crate::events::{ChangeEvent, EventBus};

/// Application entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Application {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    /// Id of the group this application belongs to; the relation is not
    /// enforced against the groups collection
    #[validate(length(min = 1))]
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Application repository
pub struct ApplicationRepository<'a> {
    collection: &'a Collection<Application>,
    events: &'a EventBus,
}

impl<'a> ApplicationRepository<'a> {
    pub fn new(collection: &'a Collection<Application>, events: &'a EventBus) -> Self {
        Self { collection, events }
    }

    /// Find an application by id
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Application>> {
        debug!("Finding application by id: {}", id);
        Ok(self.collection.find(id).await?)
    }

    /// Find an application by name; first match if several share the name
    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Application>> {
        debug!("Finding application by name: {}", name);
        let matches = self
            .collection
            .search(&Query::new().eq("name", name))
            .await?;
        Ok(matches.into_iter().next())
    }

    /// List every application
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<Application>> {
        let applications = self.collection.search(&Query::new()).await?;
        debug!("Found {} applications", applications.len());
        Ok(applications)
    }

    /// Validate and upsert an application by id.
    ///
    /// The `updateApplication` notification fires before the write is
    /// confirmed durable; subscribers must not assume the record is visible
    /// when they receive it.
    #[instrument(skip(self, application))]
    pub async fn upsert(&self, application: Application) -> Result<Application> {
        application
            .validate()
            .map_err(|e| Error::Validation(format!("Invalid application: {}", e)))?;

        self.events
            .publish(ChangeEvent::UpdateApplication(application.clone()));

        self.collection
            .update(
                &Query::new().eq("id", application.id.as_str()),
                &application,
            )
            .await?;

        debug!("Upserted application: {}", application.id);
        Ok(application)
    }

    /// Delete an application; deleting an unknown id is not an error
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = self.collection.delete(&Query::new().eq("id", id)).await?;
        debug!("Deleted {} application record(s) for id: {}", removed, id);
        Ok(())
    }
}
