//! ABOUTME: Data access layer with per-entity collections and repositories
//! ABOUTME: Handles validation, persistence, change notifications, and setup

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sb_core::{Error, Id, Result};
use sb_store::Collection;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

/// Id (and name) of the group seeded by one-time setup
pub const DEFAULT_GROUP_ID: &str = "default";

const DEFAULT_SETTINGS_FILE: &str = "site-settings.json";
const DEFAULT_EVENT_CAPACITY: usize = 64;

fn collection_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}.redb", name))
}

/// Entry point to the data layer.
///
/// Owns one document collection per entity kind, the singleton settings
/// store, the change-notification bus, and the one-time setup guard.
/// Repository handles are constructed on demand and borrow this struct.
pub struct Db {
    applications: Collection<Application>,
    application_versions: Collection<ApplicationVersion>,
    metrics: Collection<MetricValue>,
    groups: Collection<Group>,
    users: Collection<User>,
    settings: SiteSettingsStore,
    events: EventBus,
    setup_cell: OnceCell<()>,
}

impl Db {
    /// Open the data layer under a base directory, creating it if needed
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(
            data_dir.as_ref(),
            DEFAULT_SETTINGS_FILE,
            DEFAULT_EVENT_CAPACITY,
        )
        .await
    }

    /// Open the data layer at the configured locations
    pub async fn from_config(config: &sb_config::Config) -> Result<Self> {
        Self::open_with(
            Path::new(&config.storage.data_dir),
            &config.storage.settings_file,
            config.events.capacity,
        )
        .await
    }

    #[instrument(skip(data_dir))]
    async fn open_with(
        data_dir: &Path,
        settings_file: &str,
        event_capacity: usize,
    ) -> Result<Self> {
        info!("Opening data layer at: {}", data_dir.display());
        tokio::fs::create_dir_all(data_dir).await?;

        let db = Self {
            applications: Collection::open(collection_path(data_dir, "applications")).await?,
            application_versions: Collection::open(collection_path(
                data_dir,
                "application_versions",
            ))
            .await?,
            metrics: Collection::open(collection_path(data_dir, "metrics")).await?,
            groups: Collection::open(collection_path(data_dir, "groups")).await?,
            users: Collection::open(collection_path(data_dir, "users")).await?,
            settings: SiteSettingsStore::new(data_dir.join(settings_file)),
            events: EventBus::new(event_capacity),
            setup_cell: OnceCell::new(),
        };

        info!("Data layer opened successfully");
        Ok(db)
    }

    /// Open a fully in-memory data layer (for testing).
    ///
    /// The settings store still needs a file and gets a uniquely named
    /// scratch path under the system temp directory.
    pub async fn open_in_memory() -> Result<Self> {
        let settings_path =
            std::env::temp_dir().join(format!("shipboard-settings-{}.json", Id::new()));
        Ok(Self {
            applications: Collection::in_memory().await?,
            application_versions: Collection::in_memory().await?,
            metrics: Collection::in_memory().await?,
            groups: Collection::in_memory().await?,
            users: Collection::in_memory().await?,
            settings: SiteSettingsStore::new(settings_path),
            events: EventBus::new(DEFAULT_EVENT_CAPACITY),
            setup_cell: OnceCell::new(),
        })
    }

    /// Application repository
    pub fn applications(&self) -> ApplicationRepository<'_> {
        ApplicationRepository::new(&self.applications, &self.events)
    }

    /// Application version repository
    pub fn application_versions(&self) -> ApplicationVersionRepository<'_> {
        ApplicationVersionRepository::new(&self.application_versions, &self.events)
    }

    /// Metric repository
    pub fn metrics(&self) -> MetricRepository<'_> {
        MetricRepository::new(&self.metrics, &self.events)
    }

    /// Group repository
    pub fn groups(&self) -> GroupRepository<'_> {
        GroupRepository::new(&self.groups, &self.events)
    }

    /// User repository
    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.users)
    }

    /// Singleton site settings store
    pub fn site_settings(&self) -> &SiteSettingsStore {
        &self.settings
    }

    /// Bus carrying change notifications; subscribe to observe updates
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Seed the `default` group, exactly once per process lifetime.
    ///
    /// Concurrent and repeated calls coalesce on a single initializer, so
    /// the existence check and the create cannot interleave with another
    /// setup call. A failed attempt leaves the guard unset and the next
    /// call retries. The group is created through the validated repository
    /// path, so the first run publishes `groupUpdated`.
    #[instrument(skip(self))]
    pub async fn setup(&self) -> Result<()> {
        self.setup_cell
            .get_or_try_init(|| async {
                debug!("Running one-time setup");
                let groups = self.groups();
                if groups.find_by_id(DEFAULT_GROUP_ID).await?.is_none() {
                    groups
                        .upsert(Group {
                            id: DEFAULT_GROUP_ID.to_string(),
                            name: DEFAULT_GROUP_ID.to_string(),
                            tags: Vec::new(),
                        })
                        .await?;
                    info!("Created the default group");
                }
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    /// Check data layer health with one read per collection
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing data layer health check");

        self.applications.count().await?;
        self.application_versions.count().await?;
        self.metrics.count().await?;
        self.groups.count().await?;
        self.users.count().await?;

        debug!("Data layer health check passed");
        Ok(())
    }

    /// Get data layer statistics
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<DatabaseStats> {
        debug!("Gathering data layer statistics");

        let mut collection_counts = HashMap::new();
        collection_counts.insert("applications".to_string(), self.applications.count().await?);
        collection_counts.insert(
            "application_versions".to_string(),
            self.application_versions.count().await?,
        );
        collection_counts.insert("metrics".to_string(), self.metrics.count().await?);
        collection_counts.insert("groups".to_string(), self.groups.count().await?);
        collection_counts.insert("users".to_string(), self.users.count().await?);

        debug!("Data layer statistics gathered successfully");
        Ok(DatabaseStats { collection_counts })
    }
}

/// Data layer statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseStats {
    pub collection_counts: HashMap<String, u64>,
}

// Event bus module
pub mod events;

// Repository modules
pub mod repositories;

// Site settings module
pub mod site_settings;

// Re-export common types and repositories
pub use events::{ChangeEvent, EventBus};
pub use repositories::{
    application_versions::{ApplicationVersion, ApplicationVersionRepository},
    applications::{Application, ApplicationRepository},
    groups::{Group, GroupRepository},
    metrics::{MetricRepository, MetricValue},
    users::{User, UserRepository},
};
pub use site_settings::{SettingsPatch, SiteSettings, SiteSettingsStore};
