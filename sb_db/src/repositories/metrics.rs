//! ABOUTME: Metric repository with a polymorphic (type, id) discriminator
//! ABOUTME: Application metrics append forever; group metrics upsert by id

use sb_core::{time::now_iso8601, Error, Result};
use sb_store::{Collection, Query};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::events::{ChangeEvent, EventBus};

/// Metric sample attached to an application or a group.
///
/// Stored with a `type` discriminator of `application` or `group`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricValue {
    #[serde(rename_all = "camelCase")]
    Application {
        id: String,
        values: Map<String, Value>,
        recorded_at: String,
    },
    #[serde(rename_all = "camelCase")]
    Group {
        id: String,
        values: Map<String, Value>,
        recorded_at: String,
    },
}

impl MetricValue {
    /// Id of the application or group this sample belongs to
    pub fn id(&self) -> &str {
        match self {
            MetricValue::Application { id, .. } | MetricValue::Group { id, .. } => id,
        }
    }

    /// Sampled values keyed by metric name
    pub fn values(&self) -> &Map<String, Value> {
        match self {
            MetricValue::Application { values, .. } | MetricValue::Group { values, .. } => values,
        }
    }

    /// RFC3339 timestamp stamped when the sample was recorded
    pub fn recorded_at(&self) -> &str {
        match self {
            MetricValue::Application { recorded_at, .. }
            | MetricValue::Group { recorded_at, .. } => recorded_at,
        }
    }
}

/// Metric repository
pub struct MetricRepository<'a> {
    collection: &'a Collection<MetricValue>,
    events: &'a EventBus,
}

impl<'a> MetricRepository<'a> {
    pub fn new(collection: &'a Collection<MetricValue>, events: &'a EventBus) -> Self {
        Self { collection, events }
    }

    /// Append one metric sample for an application.
    ///
    /// Every call stores a new row; samples for the same application
    /// accumulate as an unbounded log and are never collapsed.
    #[instrument(skip(self, values))]
    pub async fn add_application_metrics(
        &self,
        application_id: &str,
        values: Map<String, Value>,
    ) -> Result<MetricValue> {
        if application_id.is_empty() {
            return Err(Error::Validation(
                "Metric application id must not be empty".to_string(),
            ));
        }

        let metric = MetricValue::Application {
            id: application_id.to_string(),
            values,
            recorded_at: now_iso8601(),
        };
        self.collection.insert(&metric).await?;
        debug!("Recorded metrics for application: {}", application_id);
        Ok(metric)
    }

    /// Upsert the single metric row for a group and notify subscribers.
    ///
    /// At most one row accumulates per group id; the newest call wins.
    #[instrument(skip(self, values))]
    pub async fn update_group_metric(
        &self,
        group_id: &str,
        values: Map<String, Value>,
    ) -> Result<MetricValue> {
        if group_id.is_empty() {
            return Err(Error::Validation(
                "Metric group id must not be empty".to_string(),
            ));
        }

        let metric = MetricValue::Group {
            id: group_id.to_string(),
            values,
            recorded_at: now_iso8601(),
        };
        self.collection
            .update(
                &Query::new().eq("type", "group").eq("id", group_id),
                &metric,
            )
            .await?;

        self.events
            .publish(ChangeEvent::GroupMetricUpdated(metric.clone()));

        debug!("Updated metric for group: {}", group_id);
        Ok(metric)
    }

    /// All samples recorded for an application, oldest first
    #[instrument(skip(self))]
    pub async fn find_for_application(&self, application_id: &str) -> Result<Vec<MetricValue>> {
        let metrics = self
            .collection
            .search(
                &Query::new()
                    .eq("type", "application")
                    .eq("id", application_id),
            )
            .await?;
        Ok(metrics)
    }

    /// The metric row for a group, if one has been recorded
    #[instrument(skip(self))]
    pub async fn find_for_group(&self, group_id: &str) -> Result<Option<MetricValue>> {
        let matches = self
            .collection
            .search(&Query::new().eq("type", "group").eq("id", group_id))
            .await?;
        Ok(matches.into_iter().next())
    }

    /// Every stored metric row of either kind
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<MetricValue>> {
        Ok(self.collection.search(&Query::new()).await?)
    }

    /// Remove every sample for an application; returns how many
    #[instrument(skip(self))]
    pub async fn delete_for_application(&self, application_id: &str) -> Result<u64> {
        let removed = self
            .collection
            .delete(
                &Query::new()
                    .eq("type", "application")
                    .eq("id", application_id),
            )
            .await?;
        debug!(
            "Deleted {} metric row(s) for application: {}",
            removed, application_id
        );
        Ok(removed)
    }

    /// Remove the metric row for a group; returns how many
    #[instrument(skip(self))]
    pub async fn delete_for_group(&self, group_id: &str) -> Result<u64> {
        let removed = self
            .collection
            .delete(&Query::new().eq("type", "group").eq("id", group_id))
            .await?;
        debug!("Deleted {} metric row(s) for group: {}", removed, group_id);
        Ok(removed)
    }
}
