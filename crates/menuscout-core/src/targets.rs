use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entities::Category;
use crate::normalize::{slug_from_url, slugify};
use crate::raw::{RawCategory, RecordError};
use crate::ConfigError;

/// One category listing page to scrape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl TargetConfig {
    /// Explicit slug if configured, else the last URL segment, else the
    /// slugified name.
    #[must_use]
    pub fn slug(&self) -> String {
        self.slug
            .as_deref()
            .map(slugify)
            .filter(|s| !s.is_empty())
            .or_else(|| slug_from_url(&self.url))
            .unwrap_or_else(|| slugify(&self.name))
    }

    /// The category row this target represents in `city`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if the name is empty or too long.
    pub fn to_category(&self, city: &str) -> Result<Category, RecordError> {
        RawCategory {
            name: Some(self.name.clone()),
            url: Some(self.url.clone()),
            slug: Some(self.slug()),
            icon_url: self.icon_url.clone(),
        }
        .validate(city)
    }
}

#[derive(Debug, Deserialize)]
pub struct TargetsFile {
    pub targets: Vec<TargetConfig>,
}

impl TargetsFile {
    /// Targets whose slug is in `slugs`, or all targets when `slugs` is empty.
    #[must_use]
    pub fn select(&self, slugs: &[String]) -> Vec<&TargetConfig> {
        if slugs.is_empty() {
            return self.targets.iter().collect();
        }
        self.targets
            .iter()
            .filter(|t| slugs.iter().any(|s| *s == t.slug()))
            .collect()
    }
}

/// Load and validate the category targets from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_targets(path: &Path) -> Result<TargetsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::TargetsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let targets_file: TargetsFile =
        serde_yaml::from_str(&content).map_err(ConfigError::TargetsFileParse)?;

    validate_targets(&targets_file)?;

    Ok(targets_file)
}

fn validate_targets(targets_file: &TargetsFile) -> Result<(), ConfigError> {
    let mut seen_slugs = HashSet::new();

    for target in &targets_file.targets {
        if target.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "target name must be non-empty".to_string(),
            ));
        }

        if !(target.url.starts_with("http://") || target.url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "target '{}' has non-http url '{}'",
                target.name, target.url
            )));
        }

        let slug = target.slug();
        if slug.is_empty() {
            return Err(ConfigError::Validation(format!(
                "target '{}' produces an empty slug",
                target.name
            )));
        }
        if !seen_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate target slug: '{}' (from target '{}')",
                slug, target.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "targets_test.rs"]
mod tests;
