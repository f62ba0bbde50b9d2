use std::future::Future;
use std::path::PathBuf;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::{Parameter, ParameterSet};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cannot read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model `{endpoint}` has malformed parameters: {source}")]
    Params {
        endpoint: String,
        source: serde_json::Error,
    },
}

/// Wire form of one catalog row: the parameter set travels as a JSON string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(rename = "endPoint")]
    pub end_point: String,
    pub params: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    pub endpoint_id: String,
    pub display_name: String,
    pub default_parameters: ParameterSet,
}

impl TryFrom<CatalogRecord> for ModelEntry {
    type Error = CatalogError;

    fn try_from(record: CatalogRecord) -> Result<Self, Self::Error> {
        let default_parameters = serde_json::from_str(&record.params).map_err(|source| CatalogError::Params {
            endpoint: record.end_point.clone(),
            source,
        })?;
        Ok(Self {
            endpoint_id: record.end_point,
            display_name: record.name,
            default_parameters,
        })
    }
}

/// Immutable list of propagation models, keyed by endpoint id.
#[derive(Debug, Clone, Default, PartialEq, Resource)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
}

impl ModelCatalog {
    /// Later duplicates of an endpoint id are dropped.
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        let mut unique: Vec<ModelEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if unique.iter().any(|e| e.endpoint_id == entry.endpoint_id) {
                warn!("Duplicate catalog endpoint {}, keeping the first", entry.endpoint_id);
                continue;
            }
            unique.push(entry);
        }
        Self { entries: unique }
    }

    pub fn from_records(records: Vec<CatalogRecord>) -> Self {
        let entries = records
            .into_iter()
            .filter_map(|record| match ModelEntry::try_from(record) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping catalog row: {}", e);
                    None
                }
            })
            .collect();
        Self::new(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn get(&self, endpoint_id: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| e.endpoint_id == endpoint_id)
    }

    /// Model picked for an antenna that has none once the catalog resolves:
    /// the second entry, or the only one.
    pub fn initial_model(&self) -> Option<&ModelEntry> {
        self.entries.get(1).or_else(|| self.entries.first())
    }
}

/// Where the catalog comes from.
pub trait CatalogSource {
    fn fetch(&self) -> impl Future<Output = Result<ModelCatalog, CatalogError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    pub url: String,
    client: reqwest::Client,
}

impl HttpCatalogSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch(&self) -> impl Future<Output = Result<ModelCatalog, CatalogError>> + Send {
        let request = self.client.get(&self.url);
        async move {
            let records: Vec<CatalogRecord> = request.send().await?.error_for_status()?.json().await?;
            Ok(ModelCatalog::from_records(records))
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    pub path: PathBuf,
}

impl CatalogSource for FileCatalogSource {
    fn fetch(&self) -> impl Future<Output = Result<ModelCatalog, CatalogError>> + Send {
        let path = self.path.clone();
        async move {
            let bytes = tokio::fs::read(&path).await?;
            let records: Vec<CatalogRecord> = serde_json::from_slice(&bytes)?;
            Ok(ModelCatalog::from_records(records))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalogSource;

impl CatalogSource for BuiltinCatalogSource {
    fn fetch(&self) -> impl Future<Output = Result<ModelCatalog, CatalogError>> + Send {
        std::future::ready(Ok(builtin_catalog()))
    }
}

/// Fetch once at session start. Failures are logged and yield an empty
/// catalog; model selection simply stays unavailable.
pub async fn load_catalog<S: CatalogSource>(source: &S) -> ModelCatalog {
    match source.fetch().await {
        Ok(catalog) => {
            info!("Loaded {} propagation models", catalog.len());
            catalog
        }
        Err(e) => {
            warn!("Model catalog unavailable: {}", e);
            ModelCatalog::default()
        }
    }
}

fn distance_param() -> Parameter {
    Parameter::numeric("Distance Tx-Rx", 1.0, "km", 0.1, 100.0, 0.2)
}

fn base_height_param() -> Parameter {
    Parameter::numeric("Base station height", 30.0, "m", 30.0, 200.0, 5.0)
}

fn mobile_height_param() -> Parameter {
    Parameter::numeric("Mobile height", 1.5, "m", 1.0, 10.0, 0.5)
}

fn entry(endpoint_id: &str, display_name: &str, default_parameters: ParameterSet) -> ModelEntry {
    ModelEntry {
        endpoint_id: endpoint_id.to_string(),
        display_name: display_name.to_string(),
        default_parameters,
    }
}

/// The seed catalog shipped with the simulator.
pub fn builtin_catalog() -> ModelCatalog {
    ModelCatalog::new(vec![
        entry(
            "/rayleign-path-loss",
            "Rayleigh fading",
            ParameterSet::new()
                .with("fading_model", Parameter {
                    options: Some(["0", "1", "11", "2", "22"].map(String::from).to_vec()),
                    ..Parameter::numeric("Fading model", 2.0, "", 0.0, 22.0, 1.0)
                })
                .with("num_paths", Parameter::numeric("Number of paths", 500.0, "", 10.0, 1000.0, 10.0)),
        ),
        entry(
            "/Cost231/pathLoss",
            "COST 231 Hata",
            ParameterSet::new()
                .with("environment", Parameter::enumerated("Environment", "rural", &["urban", "suburban", "rural"]))
                .with("f", Parameter::numeric("Frequency", 900.0, "MHz", 800.0, 2000.0, 100.0))
                .with("h_b", base_height_param())
                .with("h_m", mobile_height_param())
                .with("distance", distance_param()),
        ),
        entry(
            "/fspl-dbLoss",
            "Free-space path loss (FSPL)",
            ParameterSet::new()
                .with("carrier_frequency_MHz", Parameter::numeric("Carrier frequency", 2.4, "", 1.0, 6.0, 0.5))
                .with("distance", distance_param()),
        ),
        entry(
            "/itu-r-p1411-pathLoss",
            "Urban channel (ITU-R P.1411)",
            ParameterSet::new()
                .with("environment", Parameter::enumerated("Environment", "urban", &["urban", "suburban", "open"]))
                .with("frequency_MHz", Parameter::numeric("Frequency", 2400.0, "MHz", 300.0, 100000.0, 100.0))
                .with("distance", distance_param()),
        ),
        entry(
            "/hata-path-loss",
            "Okumura-Hata",
            ParameterSet::new()
                .with("environment", Parameter::enumerated("Environment", "urban", &["urban", "suburban", "rural"]))
                .with("city_size", Parameter::enumerated("City size", "Moyenne et Petite", &["Grande", "Moyenne et Petite"]))
                .with("f", Parameter::numeric("Channel frequency", 900.0, "MHz", 150.0, 1500.0, 50.0))
                .with("h_b", base_height_param())
                .with("h_m", mobile_height_param())
                .with("distance", distance_param()),
        ),
        entry(
            "/two-ray-ground-path-loss",
            "Two-ray ground",
            ParameterSet::new()
                .with("frequency_MHz", Parameter::numeric("Frequency", 900.0, "MHz", 100.0, 3000.0, 100.0))
                .with("h_b", base_height_param())
                .with("h_m", mobile_height_param())
                .with("distance", distance_param()),
        ),
        entry(
            "/weissberger-path-loss",
            "Weissberger",
            ParameterSet::new()
                .with("frequency_MHz", Parameter::numeric("Frequency", 900.0, "MHz", 230.0, 950.0, 10.0))
                .with("foliage_depth_km", Parameter::numeric("Foliage depth", 0.1, "km", 0.0, 0.4, 0.1))
                .with("distance", distance_param()),
        ),
        entry(
            "/longley-rice-path-loss",
            "Longley-Rice",
            ParameterSet::new()
                .with("climate", Parameter::enumerated("Climate", "Tempéré continental", &["Tempéré maritime", "Tempéré continental"]))
                .with("frequency_MHz", Parameter::numeric("Frequency", 900.0, "MHz", 230.0, 950.0, 10.0))
                .with("h_b", base_height_param())
                .with("h_m", mobile_height_param())
                .with("terrain_irregularity", Parameter::numeric("Terrain irregularity", 50.0, "m", 0.0, 500.0, 5.0))
                .with("distance", distance_param()),
        ),
        entry(
            "/rician-path-loss",
            "Rician channel",
            ParameterSet::new()
                .with("k_db", Parameter::numeric("K factor", 10.0, "dB", -10.0, 20.0, 1.0))
                .with("frequency_hz", Parameter::numeric("Signal frequency", 1000.0, "Hz", 20.0, 10000.0, 10.0))
                .with("distance", distance_param()),
        ),
        entry(
            "/nakagami-fading-path-loss",
            "Nakagami fading",
            ParameterSet::new()
                .with("frequency_hz", Parameter::numeric("Signal frequency", 900.0, "Hz", 20.0, 10000.0, 10.0))
                .with("m", Parameter::numeric("Shape m", 1.0, "", 0.5, 10.0, 0.1))
                .with("omega", Parameter::numeric("Spread omega", 1.0, "", 0.1, 10.0, 0.1))
                .with("distance", distance_param()),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn records_decode_their_embedded_params() {
        let records = vec![CatalogRecord {
            id: Some(3),
            name: "FSPL".into(),
            end_point: "/fspl-dbLoss".into(),
            params: r#"{"distance": {"name": "d", "value": 1, "unit": "km", "min": 0.1, "max": 100, "step": 0.2}}"#.into(),
        }];
        let catalog = ModelCatalog::from_records(records);
        let fspl = catalog.get("/fspl-dbLoss").unwrap();
        assert_eq!(fspl.default_parameters.number("distance"), Some(1.0));
    }

    #[test]
    fn bad_rows_are_skipped() {
        let records = vec![
            CatalogRecord { id: None, name: "broken".into(), end_point: "/x".into(), params: "{not json".into() },
            CatalogRecord { id: None, name: "ok".into(), end_point: "/y".into(), params: "{}".into() },
        ];
        let catalog = ModelCatalog::from_records(records);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("/y").is_some());
    }

    #[test]
    fn builtin_catalog_has_unique_endpoints_with_distance() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog.initial_model().unwrap().endpoint_id, "/Cost231/pathLoss");
        let with_distance = catalog
            .entries()
            .iter()
            .filter(|e| e.default_parameters.contains_key("distance"))
            .count();
        assert_eq!(with_distance, 9);
    }

    #[tokio::test]
    async fn file_source_reads_records() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(br#"[{"id": 1, "name": "COST", "endPoint": "/Cost231/pathLoss", "params": "{}"}]"#)
            .unwrap();
        let catalog = load_catalog(&FileCatalogSource { path: temp.path().to_path_buf() }).await;
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn malformed_file_is_a_json_error() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"[{\"id\": 1,").unwrap();
        let err = FileCatalogSource { path: temp.path().to_path_buf() }.fetch().await.unwrap_err();
        assert!(matches!(err, CatalogError::Json(_)));
    }

    #[tokio::test]
    async fn missing_file_fails_soft() {
        let catalog = load_catalog(&FileCatalogSource { path: PathBuf::from("/nonexistent/catalog.json") }).await;
        assert!(catalog.is_empty());
    }
}
