//! ABOUTME: Application version repository addressed by a compound key
//! ABOUTME: Tracks deployed versions per application and environment

use sb_core::{Error, Result};
use sb_store::{Collection, Query};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use validator::Validate;

use crate::events::{ChangeEvent, EventBus};

/// Deployed version of an application in one environment.
///
/// The logical key is the (applicationId, environment, version) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationVersion {
    #[validate(length(min = 1))]
    pub application_id: String,
    #[validate(length(min = 1))]
    pub environment: String,
    #[validate(length(min = 1))]
    pub version: String,
    /// Whether this is the version currently promoted for the pair. The
    /// store does not force the flag unique; see `promote_latest`.
    #[serde(default)]
    pub latest: bool,
}

/// Application version repository
pub struct ApplicationVersionRepository<'a> {
    collection: &'a Collection<ApplicationVersion>,
    events: &'a EventBus,
}

fn pair_query(application_id: &str, environment: &str) -> Query {
    Query::new()
        .eq("applicationId", application_id)
        .eq("environment", environment)
}

fn triple_query(application_id: &str, environment: &str, version: &str) -> Query {
    pair_query(application_id, environment).eq("version", version)
}

impl<'a> ApplicationVersionRepository<'a> {
    pub fn new(collection: &'a Collection<ApplicationVersion>, events: &'a EventBus) -> Self {
        Self { collection, events }
    }

    /// Find the record for an exact (application, environment, version) triple
    #[instrument(skip(self))]
    pub async fn find(
        &self,
        application_id: &str,
        environment: &str,
        version: &str,
    ) -> Result<Option<ApplicationVersion>> {
        let matches = self
            .collection
            .search(&triple_query(application_id, environment, version))
            .await?;
        Ok(matches.into_iter().next())
    }

    /// All versions for an application/environment pair; a supplied version
    /// narrows the result to exact matches
    #[instrument(skip(self))]
    pub async fn find_all(
        &self,
        application_id: &str,
        environment: &str,
        version: Option<&str>,
    ) -> Result<Vec<ApplicationVersion>> {
        let query = match version {
            Some(version) => triple_query(application_id, environment, version),
            None => pair_query(application_id, environment),
        };
        let versions = self.collection.search(&query).await?;
        debug!("Found {} version record(s)", versions.len());
        Ok(versions)
    }

    /// First version carrying the `latest` flag for the pair, if any
    #[instrument(skip(self))]
    pub async fn find_latest(
        &self,
        application_id: &str,
        environment: &str,
    ) -> Result<Option<ApplicationVersion>> {
        let matches = self
            .collection
            .search(&pair_query(application_id, environment).eq("latest", true))
            .await?;
        Ok(matches.into_iter().next())
    }

    /// Validate and upsert a version by its triple, then notify subscribers.
    ///
    /// Only the addressed record is written: sibling versions of the same
    /// pair keep whatever `latest` flag they carry, so several records can
    /// hold the flag at once unless callers go through `promote_latest`.
    #[instrument(skip(self, record))]
    pub async fn upsert(&self, record: ApplicationVersion) -> Result<ApplicationVersion> {
        record
            .validate()
            .map_err(|e| Error::Validation(format!("Invalid application version: {}", e)))?;

        self.collection
            .update(
                &triple_query(&record.application_id, &record.environment, &record.version),
                &record,
            )
            .await?;

        self.events
            .publish(ChangeEvent::UpdateApplicationVersion(record.clone()));

        debug!(
            "Upserted version {} for application {} in {}",
            record.version, record.application_id, record.environment
        );
        Ok(record)
    }

    /// Promote one version of the pair and demote every other in a single
    /// atomic pass; afterwards exactly the matching version holds the flag.
    ///
    /// Returns how many records of the pair were rewritten.
    #[instrument(skip(self))]
    pub async fn promote_latest(
        &self,
        application_id: &str,
        environment: &str,
        version: &str,
    ) -> Result<u64> {
        let rewritten = self
            .collection
            .modify(&pair_query(application_id, environment), |fields| {
                let promoted = fields.get("version").and_then(Value::as_str) == Some(version);
                fields.insert("latest".to_string(), Value::Bool(promoted));
            })
            .await?;
        debug!(
            "Promoted {} for application {} in {} ({} record(s) rewritten)",
            version, application_id, environment, rewritten
        );
        Ok(rewritten)
    }

    /// Delete the record for a triple; absence is not an error
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        application_id: &str,
        environment: &str,
        version: &str,
    ) -> Result<()> {
        self.collection
            .delete(&triple_query(application_id, environment, version))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (Collection<ApplicationVersion>, EventBus) {
        let collection = Collection::in_memory().await.unwrap();
        let events = EventBus::new(16);
        (collection, events)
    }

    fn record(version: &str, latest: bool) -> ApplicationVersion {
        ApplicationVersion {
            application_id: "app-1".to_string(),
            environment: "prod".to_string(),
            version: version.to_string(),
            latest,
        }
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_the_full_triple() {
        let (collection, events) = fixture().await;
        let repo = ApplicationVersionRepository::new(&collection, &events);

        repo.upsert(record("1.0.0", false)).await.unwrap();
        repo.upsert(record("1.1.0", false)).await.unwrap();
        // Same triple again: overwrite, not append
        repo.upsert(record("1.1.0", true)).await.unwrap();

        let all = repo.find_all("app-1", "prod", None).await.unwrap();
        assert_eq!(all.len(), 2);
        let found = repo.find("app-1", "prod", "1.1.0").await.unwrap().unwrap();
        assert!(found.latest);
    }

    #[tokio::test]
    async fn find_all_narrows_when_version_is_supplied() {
        let (collection, events) = fixture().await;
        let repo = ApplicationVersionRepository::new(&collection, &events);

        repo.upsert(record("1.0.0", false)).await.unwrap();
        repo.upsert(record("1.1.0", false)).await.unwrap();
        let mut staging = record("2.0.0", false);
        staging.environment = "staging".to_string();
        repo.upsert(staging).await.unwrap();

        let pair = repo.find_all("app-1", "prod", None).await.unwrap();
        assert_eq!(pair.len(), 2);

        let narrowed = repo.find_all("app-1", "prod", Some("1.1.0")).await.unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].version, "1.1.0");
    }

    #[tokio::test]
    async fn plain_upsert_leaves_sibling_flags_alone() {
        let (collection, events) = fixture().await;
        let repo = ApplicationVersionRepository::new(&collection, &events);

        repo.upsert(record("1.0.0", true)).await.unwrap();
        repo.upsert(record("1.1.0", true)).await.unwrap();

        // Both records carry the flag; nothing demoted the first one
        let flagged: Vec<_> = repo
            .find_all("app-1", "prod", None)
            .await
            .unwrap()
            .into_iter()
            .filter(|v| v.latest)
            .collect();
        assert_eq!(flagged.len(), 2);
    }

    #[tokio::test]
    async fn promote_latest_leaves_exactly_one_flag() {
        let (collection, events) = fixture().await;
        let repo = ApplicationVersionRepository::new(&collection, &events);

        repo.upsert(record("1.0.0", true)).await.unwrap();
        repo.upsert(record("1.1.0", true)).await.unwrap();
        repo.upsert(record("2.0.0", false)).await.unwrap();

        let rewritten = repo.promote_latest("app-1", "prod", "2.0.0").await.unwrap();
        assert_eq!(rewritten, 3);

        let flagged: Vec<_> = repo
            .find_all("app-1", "prod", None)
            .await
            .unwrap()
            .into_iter()
            .filter(|v| v.latest)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].version, "2.0.0");

        let latest = repo.find_latest("app-1", "prod").await.unwrap().unwrap();
        assert_eq!(latest.version, "2.0.0");
    }

    #[tokio::test]
    async fn find_latest_is_none_without_a_flag() {
        let (collection, events) = fixture().await;
        let repo = ApplicationVersionRepository::new(&collection, &events);

        repo.upsert(record("1.0.0", false)).await.unwrap();
        assert!(repo.find_latest("app-1", "prod").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_publishes_update_application_version() {
        let (collection, events) = fixture().await;
        let repo = ApplicationVersionRepository::new(&collection, &events);
        let mut receiver = events.subscribe();

        let stored = repo.upsert(record("1.0.0", false)).await.unwrap();

        match receiver.try_recv().unwrap() {
            ChangeEvent::UpdateApplicationVersion(payload) => assert_eq!(payload, stored),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn delete_removes_one_triple() {
        let (collection, events) = fixture().await;
        let repo = ApplicationVersionRepository::new(&collection, &events);

        repo.upsert(record("1.0.0", false)).await.unwrap();
        repo.upsert(record("1.1.0", false)).await.unwrap();

        repo.delete("app-1", "prod", "1.0.0").await.unwrap();
        assert!(repo.find("app-1", "prod", "1.0.0").await.unwrap().is_none());
        assert_eq!(repo.find_all("app-1", "prod", None).await.unwrap().len(), 1);
        // Absent triple deletes cleanly
        repo.delete("app-1", "prod", "9.9.9").await.unwrap();
    }

    #[tokio::test]
    async fn invalid_version_is_rejected() {
        let (collection, events) = fixture().await;
        let repo = ApplicationVersionRepository::new(&collection, &events);

        let err = repo.upsert(record("", false)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(repo.find_all("app-1", "prod", None).await.unwrap().is_empty());
    }
}
