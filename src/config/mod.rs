use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::{BuiltinCatalogSource, FileCatalogSource, HttpCatalogSource, ModelCatalog};
use crate::scene::SceneTiming;
use crate::session::{CityTable, SessionOptions, DEFAULT_CITY};

pub const DEFAULT_CONFIG_PATH: &str = "propagation_sim.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Evaluate with the built-in formulas instead of the HTTP service.
    pub offline: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_ms: 5000,
            offline: false,
        }
    }
}

impl ScoringConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub url: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub seed: Option<u64>,
    pub direct_path_secs: f32,
    pub reflection_path_secs: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        let timing = SceneTiming::default();
        Self {
            seed: None,
            direct_path_secs: timing.direct_path_secs,
            reflection_path_secs: timing.reflection_path_secs,
        }
    }
}

impl SceneConfig {
    pub fn timing(&self) -> SceneTiming {
        SceneTiming {
            direct_path_secs: self.direct_path_secs,
            reflection_path_secs: self.reflection_path_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub default_city: String,
    pub cities_csv: Option<PathBuf>,
    pub coverage_cache_capacity: usize,
    /// Position reported when "current location" is picked; none means unavailable.
    pub location: Option<(f64, f64)>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_city: DEFAULT_CITY.to_string(),
            cities_csv: None,
            coverage_cache_capacity: 64,
            location: None,
        }
    }
}

/// Contents of `propagation_sim.toml`. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Resource)]
#[serde(default)]
pub struct SimConfig {
    pub scoring: ScoringConfig,
    pub catalog: CatalogConfig,
    pub scene: SceneConfig,
    pub session: SessionConfig,
}

/// Where the model catalog comes from, first configured source wins.
#[derive(Debug, Clone)]
pub enum CatalogChoice {
    Http(HttpCatalogSource),
    File(FileCatalogSource),
    Builtin(BuiltinCatalogSource),
}

impl CatalogChoice {
    pub async fn load(&self) -> ModelCatalog {
        match self {
            CatalogChoice::Http(source) => crate::catalog::load_catalog(source).await,
            CatalogChoice::File(source) => crate::catalog::load_catalog(source).await,
            CatalogChoice::Builtin(source) => crate::catalog::load_catalog(source).await,
        }
    }
}

impl SimConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Never fails: a missing file is silent, a broken one is logged, and
    /// defaults are used either way.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring configuration: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn catalog_source(&self) -> CatalogChoice {
        if let Some(url) = &self.catalog.url {
            CatalogChoice::Http(HttpCatalogSource::new(url.clone()))
        } else if let Some(path) = &self.catalog.path {
            CatalogChoice::File(FileCatalogSource { path: path.clone() })
        } else {
            CatalogChoice::Builtin(BuiltinCatalogSource)
        }
    }

    /// City presets, from the CSV override when one is configured and readable.
    pub fn cities(&self) -> CityTable {
        let Some(path) = &self.session.cities_csv else {
            return CityTable::builtin();
        };
        match CityTable::from_csv(path) {
            Ok(table) if !table.is_empty() => table,
            Ok(_) => {
                warn!("{} has no cities, using built-in presets", path.display());
                CityTable::builtin()
            }
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                CityTable::builtin()
            }
        }
    }

    /// Options for a new session; `fallback_seed` is used when no seed is configured.
    pub fn session_options(&self, fallback_seed: u64) -> SessionOptions {
        SessionOptions {
            default_city: self.session.default_city.clone(),
            seed: self.scene.seed.unwrap_or(fallback_seed),
            coverage_cache_capacity: self.session.coverage_cache_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimConfig::default());
        assert_eq!(config.scoring.timeout(), Duration::from_millis(5000));
        assert_eq!(config.session.default_city, "elJadida");
        assert!(matches!(config.catalog_source(), CatalogChoice::Builtin(_)));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            [scoring]
            offline = true

            [scene]
            seed = 7
            direct_path_secs = 3.0

            [session]
            default_city = "rabat"
            location = [34.0, -6.8]
            "#,
        )
        .unwrap();
        assert!(config.scoring.offline);
        assert_eq!(config.scoring.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.scene.timing().direct_path_secs, 3.0);
        assert_eq!(config.scene.timing().reflection_path_secs, 5.0);
        assert_eq!(config.session.location, Some((34.0, -6.8)));

        let options = config.session_options(99);
        assert_eq!(options.seed, 7);
        assert_eq!(options.default_city, "rabat");
        assert_eq!(options.coverage_cache_capacity, 64);
    }

    #[test]
    fn catalog_url_wins_over_path() {
        let config = SimConfig::from_toml_str(
            r#"
            [catalog]
            url = "http://models.local/catalog"
            path = "models.json"
            "#,
        )
        .unwrap();
        assert!(matches!(config.catalog_source(), CatalogChoice::Http(_)));
    }

    #[test]
    fn broken_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scoring\ntimeout_ms = \"soon\"").unwrap();
        assert!(SimConfig::from_file(file.path()).is_err());
        assert_eq!(SimConfig::load_or_default(file.path()), SimConfig::default());

        let missing = file.path().with_extension("missing");
        assert_eq!(SimConfig::load_or_default(&missing), SimConfig::default());
    }

    #[test]
    fn unreadable_cities_csv_uses_builtin() {
        let mut config = SimConfig::default();
        config.session.cities_csv = Some(PathBuf::from("/nonexistent/cities.csv"));
        assert!(config.cities().contains("casablanca"));
    }
}
