use std::path::Path;

use serde::Deserialize;

use crate::geo::LatLon;
use crate::physics::path_loss::Environment;

pub const CURRENT_LOCATION: &str = "currentLocation";
pub const DEFAULT_CITY: &str = "elJadida";

#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub key: String,
    pub name: String,
    pub center: LatLon,
    pub zoom: u8,
    pub environment: Environment,
}

impl City {
    fn new(key: &str, name: &str, center: (f64, f64), zoom: u8, environment: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            center: center.into(),
            zoom,
            environment: Environment::parse(environment),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CityRow {
    key: String,
    name: String,
    latitude: f64,
    longitude: f64,
    zoom: u8,
    environment: String,
}

/// Named map presets plus the geolocated `currentLocation` slot, which stays
/// empty until a position fix arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct CityTable {
    cities: Vec<City>,
    current_location: Option<City>,
}

impl Default for CityTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CityTable {
    pub fn builtin() -> Self {
        let cities = vec![
            City::new("elJadida", "El Jadida, Morocco", (33.2347178, -8.5027492), 13, "urban"),
            City::new("casablanca", "Casablanca, Morocco", (33.5731, -7.5898), 12, "urban-large"),
            City::new("marrakech", "Marrakech, Morocco", (31.6295, -7.9811), 13, "urban"),
            City::new("rabat", "Rabat, Morocco", (34.0209, -6.8416), 13, "urban"),
            City::new("tangier", "Tangier, Morocco", (35.7595, -5.834), 13, "urban"),
            City::new("agadir", "Agadir, Morocco", (30.4278, -9.5981), 13, "coastal"),
            City::new("fez", "Fez, Morocco", (34.0181, -5.0078), 13, "urban"),
            City::new("essaouira", "Essaouira, Morocco", (31.5085, -9.7595), 14, "coastal"),
        ];
        Self { cities, current_location: None }
    }

    /// Reads `key,name,latitude,longitude,zoom,environment` rows.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut cities = Vec::new();
        for row in reader.deserialize() {
            let row: CityRow = row?;
            cities.push(City {
                key: row.key,
                name: row.name,
                center: LatLon::new(row.latitude, row.longitude),
                zoom: row.zoom,
                environment: Environment::parse(&row.environment),
            });
        }
        Ok(Self { cities, current_location: None })
    }

    pub fn get(&self, key: &str) -> Option<&City> {
        if key == CURRENT_LOCATION {
            return self.current_location.as_ref();
        }
        self.cities.iter().find(|c| c.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of presets, not counting the current-location slot.
    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &City> {
        self.current_location.iter().chain(self.cities.iter())
    }

    pub fn set_current_location(&mut self, position: LatLon) -> &City {
        self.current_location.insert(City {
            key: CURRENT_LOCATION.to_string(),
            name: "Current Location".to_string(),
            center: position,
            zoom: 13,
            environment: Environment::Urban,
        })
    }

    /// Preset used when nothing else resolves: `preferred`, then El Jadida,
    /// then whatever is listed first.
    pub fn fallback(&self, preferred: &str) -> Option<&City> {
        self.get(preferred)
            .filter(|c| c.key != CURRENT_LOCATION)
            .or_else(|| self.get(DEFAULT_CITY))
            .or_else(|| self.cities.first())
    }
}
