//! ABOUTME: Singleton site settings persisted as one JSON file
//! ABOUTME: Default-on-first-access reads and shallow-merge updates

use std::path::PathBuf;

use sb_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, error, instrument};
use validator::Validate;

/// Site-wide settings record.
///
/// `tokens` and `webhooks` always exist; any other top-level key passes
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct SiteSettings {
    pub tokens: Vec<Value>,
    pub webhooks: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Partial settings update; a present key replaces the stored value
/// wholesale, an absent key leaves it untouched. Lists are never merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhooks: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Settings store persisting the singleton record to one JSON file
pub struct SiteSettingsStore {
    path: PathBuf,
}

impl SiteSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current settings.
    ///
    /// A missing file is created with the defaults. An unparseable file is
    /// logged and answered with the in-memory defaults, leaving the bytes on
    /// disk untouched until the next successful update.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Result<SiteSettings> {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(settings) => Ok(settings),
                Err(e) => {
                    error!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to parse settings file, falling back to defaults"
                    );
                    Ok(SiteSettings::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file, writing defaults");
                let defaults = SiteSettings::default();
                self.persist(&defaults).await?;
                Ok(defaults)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Shallow-merge `patch` over the current settings and persist the result
    #[instrument(skip(self, patch))]
    pub async fn update(&self, patch: SettingsPatch) -> Result<SiteSettings> {
        let mut merged = self.get().await?;
        if let Some(tokens) = patch.tokens {
            merged.tokens = tokens;
        }
        if let Some(webhooks) = patch.webhooks {
            merged.webhooks = webhooks;
        }
        for (key, value) in patch.extra {
            merged.extra.insert(key, value);
        }

        merged
            .validate()
            .map_err(|e| Error::Validation(format!("Invalid settings: {}", e)))?;

        self.persist(&merged).await?;
        debug!("Settings updated");
        Ok(merged)
    }

    async fn persist(&self, settings: &SiteSettings) -> Result<()> {
        let data = serde_json::to_vec_pretty(settings)
            .map_err(|e| Error::Store(format!("Failed to serialize settings: {}", e)))?;
        fs::write(&self.path, data).await?;
        Ok(())
    }
}
