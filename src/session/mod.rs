pub mod cities;
pub mod settings;

use std::collections::{HashMap, VecDeque};

use bevy::prelude::*;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::cache::{CoverageCache, CoverageKey, CoverageMetrics};
use crate::catalog::ModelCatalog;
use crate::geo::{self, LatLon};
use crate::params::{ParamValue, ParameterSet};
use crate::physics::path_loss::Environment;
use crate::scoring::{ScoreRequest, ScoreResponseEnvelope, ScoreResult, ScoreTarget, ScoringClient};
use crate::station::{Antenna, AntennaId, AntennaUpdate, DisplayColor, MobileStation};

pub use cities::{City, CityTable, CURRENT_LOCATION, DEFAULT_CITY};
pub use settings::{BuildingStyle, SceneSettings, TerrainType, TimeOfDay, Weather};

/// Largest random offset, in degrees, between a new antenna and the mobile.
const NEW_ANTENNA_SPREAD_DEG: f64 = 0.005;
/// Offset of the mobile from a freshly selected city centre.
const CITY_MOBILE_OFFSET_DEG: f64 = 0.005;
/// Offset of the mobile from the starting city centre.
const INITIAL_MOBILE_OFFSET_DEG: f64 = 0.01;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("at least one base station is required")]
    LastAntenna,
    #[error("no antenna with id {0}")]
    UnknownAntenna(AntennaId),
    #[error("model `{0}` is not in the catalog")]
    UnknownModel(String),
    #[error("no city preset `{0}`")]
    UnknownCity(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// Short user-facing message, shown once by the UI and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    fn info(title: &str, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, title: title.to_string(), message: message.into() }
    }

    fn warning(title: &str, message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, title: title.to_string(), message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    pub center: LatLon,
    pub zoom: u8,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub default_city: String,
    pub seed: u64,
    pub coverage_cache_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_city: DEFAULT_CITY.to_string(),
            seed: 0,
            coverage_cache_capacity: 64,
        }
    }
}

/// The simulation controller.
///
/// Owns every antenna, the mobile station and the active parameter set bound
/// to the selected antenna's model. Mutations go through the methods below;
/// each one that changes a scoring input queues a [`ScoreRequest`] which the
/// caller runs against a [`ScoringClient`] and feeds back via
/// [`SimulationSession::apply_score`].
#[derive(Resource)]
pub struct SimulationSession {
    antennas: Vec<Antenna>,
    selected: AntennaId,
    next_antenna_id: AntennaId,
    mobile: MobileStation,
    catalog: ModelCatalog,
    active_params: ParameterSet,
    score: ScoreResult,
    coverages: HashMap<AntennaId, ScoreResult>,
    cities: CityTable,
    selected_city: Option<String>,
    default_city: String,
    map_view: MapView,
    pub settings: SceneSettings,
    notices: VecDeque<Notice>,
    next_seq: u64,
    last_applied: HashMap<ScoreTarget, u64>,
    pending: Vec<ScoreRequest>,
    cache: CoverageCache,
    metrics: CoverageMetrics,
    rng: StdRng,
}

impl Default for SimulationSession {
    fn default() -> Self {
        Self::new(CityTable::builtin(), SessionOptions::default())
    }
}

impl SimulationSession {
    pub fn new(cities: CityTable, options: SessionOptions) -> Self {
        let (center, zoom, city_key) = match cities.fallback(&options.default_city) {
            Some(city) => (city.center, city.zoom, Some(city.key.clone())),
            None => (LatLon::new(33.2347178, -8.5027492), 13, None),
        };
        let first = Antenna::new(1, center);
        let mobile = MobileStation {
            position: center.offset_deg(INITIAL_MOBILE_OFFSET_DEG, INITIAL_MOBILE_OFFSET_DEG),
        };
        info!("Simulation session starting at {:?} (seed {})", city_key, options.seed);

        Self {
            selected: first.id,
            next_antenna_id: first.id + 1,
            antennas: vec![first],
            mobile,
            catalog: ModelCatalog::default(),
            active_params: ParameterSet::new(),
            score: ScoreResult::ZERO,
            coverages: HashMap::new(),
            cities,
            selected_city: city_key,
            default_city: options.default_city,
            map_view: MapView { center, zoom },
            settings: SceneSettings::default(),
            notices: VecDeque::new(),
            next_seq: 0,
            last_applied: HashMap::new(),
            pending: Vec::new(),
            cache: CoverageCache::with_capacity(options.coverage_cache_capacity),
            metrics: CoverageMetrics::default(),
            rng: StdRng::seed_from_u64(options.seed),
        }
    }

    // ---- accessors ----

    pub fn antennas(&self) -> &[Antenna] {
        &self.antennas
    }

    pub fn antenna(&self, id: AntennaId) -> Option<&Antenna> {
        self.antennas.iter().find(|a| a.id == id)
    }

    pub fn selected_id(&self) -> AntennaId {
        self.selected
    }

    pub fn selected_antenna(&self) -> &Antenna {
        self.antenna(self.selected).unwrap_or(&self.antennas[0])
    }

    pub fn mobile(&self) -> &MobileStation {
        &self.mobile
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn active_params(&self) -> &ParameterSet {
        &self.active_params
    }

    pub fn score(&self) -> ScoreResult {
        self.score
    }

    pub fn coverage(&self, id: AntennaId) -> Option<ScoreResult> {
        self.coverages.get(&id).copied()
    }

    pub fn coverage_metrics(&self) -> CoverageMetrics {
        self.metrics
    }

    pub fn cities(&self) -> &CityTable {
        &self.cities
    }

    pub fn selected_city(&self) -> Option<&str> {
        self.selected_city.as_deref()
    }

    pub fn map_view(&self) -> MapView {
        self.map_view
    }

    pub fn pending_requests(&self) -> &[ScoreRequest] {
        &self.pending
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Clutter class from the active `environment` parameter, or from the
    /// selected city when the model has none.
    pub fn environment(&self) -> Environment {
        match self.active_params.text("environment") {
            Some(env) => Environment::parse(env),
            None => self
                .selected_city
                .as_deref()
                .and_then(|key| self.cities.get(key))
                .map(|c| c.environment)
                .unwrap_or_default(),
        }
    }

    /// Distance between the selected antenna and the mobile, km.
    pub fn selected_distance_km(&self) -> f64 {
        geo::distance_km(self.selected_antenna().position, self.mobile.position)
    }

    /// Distance from every antenna to the mobile, in antenna order.
    pub fn distances(&self) -> Vec<(AntennaId, f64)> {
        self.antennas
            .iter()
            .map(|a| (a.id, geo::distance_km(a.position, self.mobile.position)))
            .collect()
    }

    /// Antenna pairs closer than `threshold_km`, nearest first.
    pub fn interference_pairs(&self, threshold_km: f64) -> Vec<(AntennaId, AntennaId, f64)> {
        self.antennas
            .iter()
            .tuple_combinations()
            .map(|(a, b)| (a.id, b.id, geo::distance_km(a.position, b.position)))
            .filter(|&(_, _, d)| d < threshold_km)
            .sorted_by(|x, y| x.2.total_cmp(&y.2))
            .collect()
    }

    // ---- catalog & models ----

    /// Install the model catalog. The selected antenna gets the catalog's
    /// initial model if it has none yet.
    pub fn set_catalog(&mut self, catalog: ModelCatalog) {
        info!("Model catalog ready with {} models", catalog.len());
        self.catalog = catalog;
        self.cache.clear();
        if self.selected_antenna().model_id.is_some() {
            self.active_params = self.restore_params(self.selected);
            self.refresh();
            return;
        }
        let initial = self.catalog.initial_model().map(|m| m.endpoint_id.clone());
        if let Some(endpoint) = initial {
            let selected = self.selected;
            if let Err(e) = self.select_model(selected, &endpoint) {
                warn!("Cannot apply initial model {}: {}", endpoint, e);
            }
        }
    }

    /// Assign `endpoint_id` to an antenna. For the selected antenna the
    /// outgoing model's values are kept on the antenna and the active set is
    /// restored from the values last left on `endpoint_id`, or its defaults.
    pub fn select_model(&mut self, antenna_id: AntennaId, endpoint_id: &str) -> Result<(), SessionError> {
        if self.catalog.get(endpoint_id).is_none() {
            return Err(SessionError::UnknownModel(endpoint_id.to_string()));
        }
        let is_selected = antenna_id == self.selected;
        if is_selected {
            self.save_active();
        }
        let antenna = self.antenna_mut(antenna_id)?;
        antenna.model_id = Some(endpoint_id.to_string());
        info!("Antenna {} now uses model {}", antenna_id, endpoint_id);

        if is_selected {
            self.active_params = self.restore_params(antenna_id);
            self.refresh();
        } else if self.settings.show_all_coverages {
            self.request_coverages();
        }
        Ok(())
    }

    /// Change one value of the active set. Returns `false` without touching
    /// anything when `key` is not part of the active model.
    pub fn set_parameter_value(&mut self, key: &str, value: impl Into<ParamValue>) -> bool {
        if !self.active_params.set_value(key, value) {
            debug!("Ignoring update of unknown parameter {}", key);
            return false;
        }
        if key == "h_b" {
            if let Some(h) = self.active_params.number("h_b") {
                let selected = self.selected;
                if let Ok(antenna) = self.antenna_mut(selected) {
                    antenna.height = h;
                }
            }
        }
        self.request_active_score();
        if self.settings.show_all_coverages {
            self.request_coverages();
        }
        true
    }

    // ---- antennas ----

    /// Create an antenna near the mobile that inherits the selected antenna's
    /// model and saved values, and select it.
    pub fn add_antenna(&mut self) -> AntennaId {
        self.save_active();
        let id = self.next_antenna_id.max(self.antennas.iter().map(|a| a.id).max().unwrap_or(0) + 1);
        self.next_antenna_id = id + 1;
        let position = self.mobile.position.offset_deg(
            self.rng.random_range(-NEW_ANTENNA_SPREAD_DEG..NEW_ANTENNA_SPREAD_DEG),
            self.rng.random_range(-NEW_ANTENNA_SPREAD_DEG..NEW_ANTENNA_SPREAD_DEG),
        );
        let mut antenna = Antenna::new(id, position);
        antenna.height = f64::from(self.rng.random_range(40..60u32));
        antenna.frequency = f64::from(1800 + self.rng.random_range(0..8u32) * 100);
        antenna.power = f64::from(self.rng.random_range(40..46u32));
        antenna.color = DisplayColor::from_hsl(self.rng.random_range(0.0f32..360.0), 0.7, 0.5);
        let template = self.selected_antenna();
        antenna.model_id = template.model_id.clone();
        antenna.saved_parameters = template.saved_parameters.clone();

        info!("Added {} at {:?}", antenna.name, antenna.position);
        self.notices
            .push_back(Notice::info("Antenna Added", format!("{} has been added to the map.", antenna.name)));
        self.antennas.push(antenna);
        if let Err(e) = self.select_antenna(id) {
            error!("New antenna {} could not be selected: {}", id, e);
        }
        id
    }

    /// Remove an antenna. The last one cannot be removed.
    pub fn remove_antenna(&mut self, id: AntennaId) -> Result<(), SessionError> {
        if self.antennas.len() <= 1 {
            warn!("Refusing to remove the last antenna {}", id);
            self.notices
                .push_back(Notice::warning("Cannot Remove", "At least one base station is required."));
            return Err(SessionError::LastAntenna);
        }
        let index = self
            .antennas
            .iter()
            .position(|a| a.id == id)
            .ok_or(SessionError::UnknownAntenna(id))?;
        let removed = self.antennas.remove(index);
        self.cache.evict_antenna(id);
        self.coverages.remove(&id);
        self.last_applied.remove(&ScoreTarget::Coverage(id));
        info!("Removed {}", removed.name);
        self.notices
            .push_back(Notice::info("Antenna Removed", "Base station has been removed from the map."));

        if id == self.selected {
            self.selected = self.antennas[0].id;
            self.active_params = self.restore_params(self.selected);
        }
        self.refresh();
        Ok(())
    }

    /// Shallow-merge `update` into antenna `id`.
    pub fn update_antenna(&mut self, id: AntennaId, update: AntennaUpdate) -> Result<(), SessionError> {
        let rebinds_model = update.model_id.is_some() || update.saved_parameters.is_some();
        if id == self.selected && rebinds_model {
            self.save_active();
        }
        let antenna = self.antenna_mut(id)?;
        antenna.apply(update);
        if id == self.selected {
            if rebinds_model {
                self.active_params = self.restore_params(id);
            }
            self.refresh();
        } else {
            self.refresh_distance();
            if self.settings.show_all_coverages {
                self.request_coverages();
            }
        }
        Ok(())
    }

    /// Move focus to antenna `id`. The outgoing antenna keeps the active
    /// values before the incoming antenna's values are restored.
    pub fn select_antenna(&mut self, id: AntennaId) -> Result<(), SessionError> {
        if self.antenna(id).is_none() {
            return Err(SessionError::UnknownAntenna(id));
        }
        if id == self.selected {
            return Ok(());
        }
        self.save_active();
        debug!("Selecting antenna {} (was {})", id, self.selected);
        self.selected = id;
        self.active_params = self.restore_params(id);
        self.refresh();
        Ok(())
    }

    pub fn set_mobile_position(&mut self, position: LatLon) {
        self.mobile.position = position;
        self.refresh();
    }

    // ---- cities ----

    /// Recentre on a preset. Moving to a different city also brings the
    /// first antenna to the centre and the mobile next to it.
    pub fn select_city(&mut self, key: &str) -> Result<(), SessionError> {
        let city = self
            .cities
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::UnknownCity(key.to_string()))?;
        let changed = self.selected_city.as_deref() != Some(key);
        self.map_view = MapView { center: city.center, zoom: city.zoom };
        self.selected_city = Some(city.key.clone());
        self.active_params.set_value("environment", city.environment.label());

        if changed {
            info!("Switched to {}", city.name);
            self.antennas[0].position = city.center;
            self.mobile.position = city.center.offset_deg(CITY_MOBILE_OFFSET_DEG, CITY_MOBILE_OFFSET_DEG);
        }
        self.refresh();
        Ok(())
    }

    /// A geolocation fix arrived: fill the `currentLocation` preset, move the
    /// selected antenna there and centre the map on it.
    pub fn set_current_location(&mut self, position: LatLon) {
        let city = self.cities.set_current_location(position).clone();
        info!("Current location resolved to {:?}", position);
        self.selected_city = Some(city.key);
        self.map_view = MapView { center: position, zoom: city.zoom };
        let selected = self.selected;
        if let Ok(antenna) = self.antenna_mut(selected) {
            antenna.position = position;
        }
        self.refresh();
    }

    /// The user picked "current location". The view stays where it is until
    /// [`Self::set_current_location`] or [`Self::geolocation_failed`] runs.
    pub fn begin_locating(&mut self) {
        self.selected_city = Some(CURRENT_LOCATION.to_string());
    }

    pub fn is_locating(&self) -> bool {
        self.selected_city.as_deref() == Some(CURRENT_LOCATION)
    }

    /// Geolocation failed. While the current-location preset is selected
    /// the session falls back to the configured default city.
    pub fn geolocation_failed(&mut self, reason: &str) {
        warn!("Geolocation unavailable: {}", reason);
        if !self.is_locating() {
            return;
        }
        let Some(key) = self.cities.fallback(&self.default_city).map(|c| c.key.clone()) else {
            return;
        };
        if let Err(e) = self.select_city(&key) {
            warn!("Fallback city {} failed: {}", key, e);
            return;
        }
        self.notices
            .push_back(Notice::warning("Location Unavailable", format!("Showing {} instead.", key)));
    }

    // ---- scoring ----

    pub fn take_requests(&mut self) -> Vec<ScoreRequest> {
        std::mem::take(&mut self.pending)
    }

    /// Fold a finished evaluation back in. Answers older than one already
    /// applied for the same target, or for an antenna that is no longer
    /// selected, are dropped. Returns whether the answer was used.
    pub fn apply_score(&mut self, response: ScoreResponseEnvelope) -> bool {
        let ScoreResponseEnvelope { request, result } = response;
        let target = request.target;
        if self.last_applied.get(&target).is_some_and(|&seq| seq > request.seq) {
            debug!("Discarding stale score #{} for {:?}", request.seq, target);
            return false;
        }
        let antenna_id = match target {
            ScoreTarget::Active if request.antenna.id != self.selected => {
                debug!("Discarding score #{} for deselected antenna {}", request.seq, request.antenna.id);
                return false;
            }
            ScoreTarget::Active => request.antenna.id,
            ScoreTarget::Coverage(id) if self.antenna(id).is_none() => return false,
            ScoreTarget::Coverage(id) => id,
        };
        self.last_applied.insert(target, request.seq);
        if target == ScoreTarget::Active {
            self.score = result;
        }
        self.coverages.insert(antenna_id, result);
        self.cache
            .insert(CoverageKey::new(antenna_id, &request.endpoint_id, &request.params), result);
        true
    }

    /// Queue coverage evaluations for every other antenna with a model, each
    /// with its own saved values. Cached answers are applied immediately. The
    /// selected antenna's coverage comes from its active score.
    pub fn request_coverages(&mut self) {
        let jobs: Vec<(Antenna, String, ParameterSet)> = self
            .antennas
            .iter()
            .filter(|a| a.id != self.selected)
            .filter_map(|a| {
                let endpoint = a.model_id.clone()?;
                let params = self.params_for(a)?;
                Some((a.clone(), endpoint, params))
            })
            .collect();

        for (antenna, endpoint_id, params) in jobs {
            let key = CoverageKey::new(antenna.id, &endpoint_id, &params);
            if let Some(hit) = self.cache.get(&key) {
                self.metrics.cache_hits += 1;
                self.coverages.insert(antenna.id, hit);
                continue;
            }
            self.metrics.computed += 1;
            let target = ScoreTarget::Coverage(antenna.id);
            self.queue(target, antenna, endpoint_id, params);
        }
    }

    /// Run every queued request against `client` and apply the answers.
    pub async fn run_pending<C: ScoringClient>(&mut self, client: &C) {
        for request in self.take_requests() {
            let response = request.run(client).await;
            self.apply_score(response);
        }
    }

    // ---- internals ----

    fn antenna_mut(&mut self, id: AntennaId) -> Result<&mut Antenna, SessionError> {
        self.antennas
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(SessionError::UnknownAntenna(id))
    }

    /// Store the active set on the selected antenna under its current model.
    fn save_active(&mut self) {
        let params = self.active_params.clone();
        let selected = self.selected;
        if let Ok(antenna) = self.antenna_mut(selected) {
            if let Some(model) = antenna.model_id.clone() {
                antenna.saved_parameters.insert(model, params);
            }
        }
    }

    /// Saved values for the antenna's model, or the catalog defaults. Saved
    /// values whose keys no longer match the catalog entry are discarded.
    fn params_for(&self, antenna: &Antenna) -> Option<ParameterSet> {
        let defaults = antenna
            .model_id
            .as_deref()
            .and_then(|model| self.catalog.get(model))
            .map(|m| &m.default_parameters);
        match (antenna.saved_for_current_model(), defaults) {
            (Some(saved), Some(defaults)) if !saved.same_schema(defaults) => {
                warn!("Saved parameters of {} no longer match the catalog; using defaults", antenna.name);
                Some(defaults.clone())
            }
            (Some(saved), _) => Some(saved.clone()),
            (None, defaults) => defaults.cloned(),
        }
    }

    fn restore_params(&self, id: AntennaId) -> ParameterSet {
        self.antenna(id)
            .and_then(|a| self.params_for(a))
            .unwrap_or_default()
    }

    fn refresh_distance(&mut self) {
        let d = self.selected_distance_km();
        self.active_params.set_value("distance", d);
    }

    /// Distance, then the active score, then coverages if they are shown.
    fn refresh(&mut self) {
        self.refresh_distance();
        self.request_active_score();
        if self.settings.show_all_coverages {
            self.request_coverages();
        }
    }

    fn request_active_score(&mut self) {
        let antenna = self.selected_antenna().clone();
        let Some(endpoint_id) = antenna.model_id.clone() else {
            return;
        };
        let params = self.active_params.clone();
        self.queue(ScoreTarget::Active, antenna, endpoint_id, params);
    }

    fn queue(&mut self, target: ScoreTarget, antenna: Antenna, endpoint_id: String, params: ParameterSet) {
        self.next_seq += 1;
        // A newer request for the same target supersedes one not yet handed out.
        self.pending.retain(|r| r.target != target);
        self.pending.push(ScoreRequest { seq: self.next_seq, target, endpoint_id, antenna, params });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_catalog;

    const FSPL: &str = "/fspl-dbLoss";
    const COST231: &str = "/Cost231/pathLoss";

    fn session() -> SimulationSession {
        let mut s = SimulationSession::new(CityTable::builtin(), SessionOptions { seed: 7, ..Default::default() });
        s.set_catalog(builtin_catalog());
        s
    }

    fn answer(request: &ScoreRequest, loss: f64) -> ScoreResponseEnvelope {
        ScoreResponseEnvelope {
            request: request.clone(),
            result: ScoreResult { loss, coverage_radius: loss * 10.0 },
        }
    }

    #[test]
    fn catalog_selects_second_model() {
        let s = session();
        assert_eq!(s.selected_antenna().model_id.as_deref(), Some(COST231));
        assert!(s.active_params.contains_key("environment"));
    }

    #[test]
    fn empty_catalog_leaves_antenna_unassigned() {
        let mut s = SimulationSession::default();
        s.set_catalog(ModelCatalog::default());
        assert_eq!(s.selected_antenna().model_id, None);
        assert!(s.active_params().is_empty());
        assert!(s.take_requests().is_empty());
    }

    #[test]
    fn distance_is_written_into_active_set() {
        let mut s = session();
        s.set_mobile_position(s.selected_antenna().position.offset_deg(1.0, 0.0));
        let d = s.active_params.number("distance").unwrap();
        assert!((d - 111.195).abs() < 0.01);
    }

    #[test]
    fn ids_are_never_reused() {
        // Removing the highest id must not hand it out again.
        let mut s = session();
        let two = s.add_antenna();
        let three = s.add_antenna();
        s.remove_antenna(three).unwrap();
        let four = s.add_antenna();
        assert_eq!((two, three, four), (2, 3, 4));
    }

    #[test]
    fn new_antenna_inherits_model_and_is_selected() {
        let mut s = session();
        s.set_parameter_value("h_m", 2.5);
        let id = s.add_antenna();

        assert_eq!(s.selected_id(), id);
        let antenna = s.antenna(id).unwrap();
        assert_eq!(antenna.model_id.as_deref(), Some(COST231));
        assert_eq!(s.active_params.number("h_m"), Some(2.5));
        let offset = geo::distance_km(antenna.position, s.mobile().position);
        assert!(offset < 1.0);
        assert!((40.0..60.0).contains(&antenna.height));
        assert!(s.notices().any(|n| n.title == "Antenna Added"));
    }

    #[test]
    fn removing_selected_falls_back_to_first() {
        let mut s = session();
        s.add_antenna();
        let three = s.add_antenna();
        assert_eq!(s.selected_id(), three);
        s.remove_antenna(three).unwrap();
        assert_eq!(s.selected_id(), 1);
        assert_eq!(s.antennas().len(), 2);
    }

    #[test]
    fn remove_unknown_antenna_is_an_error() {
        let mut s = session();
        s.add_antenna();
        assert_eq!(s.remove_antenna(42), Err(SessionError::UnknownAntenna(42)));
        assert_eq!(s.antennas().len(), 2);
    }

    #[test]
    fn model_switch_keeps_values_per_model() {
        let mut s = session();
        s.set_parameter_value("f", 1500.0);
        s.select_model(1, FSPL).unwrap();
        assert!(s.active_params.contains_key("carrier_frequency_MHz"));
        assert!(!s.set_parameter_value("f", 1200.0));

        s.select_model(1, COST231).unwrap();
        assert_eq!(s.active_params.number("f"), Some(1500.0));
    }

    #[test]
    fn unknown_model_is_rejected() {
        let mut s = session();
        let before = s.active_params.clone();
        assert_eq!(s.select_model(1, "/nope"), Err(SessionError::UnknownModel("/nope".into())));
        assert_eq!(s.active_params, before);
    }

    #[test]
    fn editing_h_b_moves_the_mast() {
        let mut s = session();
        assert!(s.set_parameter_value("h_b", 35.0));
        assert_eq!(s.selected_antenna().height, 35.0);
    }

    #[test]
    fn update_of_other_antenna_keeps_active_set() {
        let mut s = session();
        let two = s.add_antenna();
        s.select_antenna(1).unwrap();
        s.set_parameter_value("h_m", 3.0);
        let before = s.active_params.clone();

        s.update_antenna(two, AntennaUpdate::height(20.0)).unwrap();

        assert_eq!(s.active_params, before);
        assert_eq!(s.antenna(two).unwrap().height, 20.0);
    }

    #[test]
    fn newer_request_supersedes_queued_one() {
        let mut s = session();
        s.settings.show_all_coverages = false;
        s.take_requests();
        s.set_parameter_value("h_m", 2.0);
        s.set_parameter_value("h_m", 3.0);
        let pending = s.take_requests();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].params.number("h_m"), Some(3.0));
    }

    #[test]
    fn stale_scores_are_discarded() {
        let mut s = session();
        s.settings.show_all_coverages = false;
        s.take_requests();
        s.set_parameter_value("h_m", 2.0);
        let slow = s.take_requests().remove(0);
        s.set_parameter_value("h_m", 3.0);
        let fast = s.take_requests().remove(0);

        assert!(s.apply_score(answer(&fast, 130.0)));
        assert!(!s.apply_score(answer(&slow, 120.0)));
        assert_eq!(s.score().loss, 130.0);
    }

    #[test]
    fn score_for_deselected_antenna_is_dropped() {
        let mut s = session();
        s.settings.show_all_coverages = false;
        s.take_requests();
        s.set_parameter_value("h_m", 2.0);
        let request = s.take_requests().remove(0);
        s.add_antenna();

        assert!(!s.apply_score(answer(&request, 99.0)));
        assert_eq!(s.score(), ScoreResult::ZERO);
    }

    #[test]
    fn coverages_use_each_antennas_own_values() {
        let mut s = session();
        s.set_parameter_value("h_m", 4.0);
        let two = s.add_antenna();
        s.set_parameter_value("h_m", 1.0);
        s.take_requests();

        s.request_coverages();
        let requests = s.take_requests();
        let for_one = requests
            .iter()
            .find(|r| r.target == ScoreTarget::Coverage(1))
            .unwrap();
        assert_eq!(for_one.params.number("h_m"), Some(4.0));
        assert!(requests.iter().all(|r| r.target != ScoreTarget::Coverage(two)));

        s.select_antenna(1).unwrap();
        s.take_requests();
        s.request_coverages();
        let for_two = s.take_requests().remove(0);
        assert_eq!(for_two.target, ScoreTarget::Coverage(two));
        assert_eq!(for_two.params.number("h_m"), Some(1.0));
    }

    #[test]
    fn selected_antenna_is_scored_once_per_edit() {
        let mut s = session();
        assert!(s.settings.show_all_coverages);
        s.take_requests();
        s.set_parameter_value("h_m", 2.0);
        let requests = s.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target, ScoreTarget::Active);

        s.apply_score(answer(&requests[0], 125.0));
        assert_eq!(s.coverage(1).map(|c| c.loss), Some(125.0));
    }

    #[test]
    fn model_rebind_through_update_keeps_edits() {
        let mut s = session();
        assert!(s.set_parameter_value("h_m", 3.0));
        let update = AntennaUpdate { model_id: Some(Some(FSPL.to_string())), ..Default::default() };
        s.update_antenna(1, update).unwrap();
        assert!(s.active_params.contains_key("carrier_frequency_MHz"));

        s.select_model(1, COST231).unwrap();
        assert_eq!(s.active_params.number("h_m"), Some(3.0));
    }

    #[test]
    fn cached_coverages_skip_the_client() {
        let mut s = session();
        s.settings.show_all_coverages = false;
        s.add_antenna();
        s.take_requests();
        let before = s.coverage_metrics();
        s.request_coverages();
        let request = s.take_requests().remove(0);
        s.apply_score(answer(&request, 111.0));

        s.request_coverages();
        assert!(s.take_requests().is_empty());
        let after = s.coverage_metrics();
        assert_eq!(after.computed, before.computed + 1);
        assert_eq!(after.cache_hits, before.cache_hits + 1);
        assert_eq!(s.coverage(1).map(|c| c.loss), Some(111.0));
    }

    #[test]
    fn new_catalog_drops_cached_coverages() {
        let mut s = session();
        s.settings.show_all_coverages = false;
        s.add_antenna();
        s.take_requests();
        s.request_coverages();
        let request = s.take_requests().remove(0);
        s.apply_score(answer(&request, 111.0));

        s.set_catalog(builtin_catalog());
        s.take_requests();
        s.request_coverages();
        assert_eq!(s.take_requests().len(), 1);
    }

    #[test]
    fn city_switch_moves_first_antenna_and_mobile() {
        let mut s = session();
        s.select_city("agadir").unwrap();
        let agadir = s.cities().get("agadir").unwrap().center;

        assert_eq!(s.antennas()[0].position, agadir);
        assert_eq!(s.mobile().position, agadir.offset_deg(0.005, 0.005));
        assert_eq!(s.active_params.text("environment"), Some("coastal"));
        assert_eq!(s.map_view().zoom, 13);
        assert_eq!(s.environment(), Environment::Coastal);
    }

    #[test]
    fn reselecting_city_does_not_move_markers() {
        let mut s = session();
        s.select_city("fez").unwrap();
        let moved = LatLon::new(34.1, -5.1);
        s.set_mobile_position(moved);
        s.select_city("fez").unwrap();
        assert_eq!(s.mobile().position, moved);
    }

    #[test]
    fn unknown_city_is_rejected() {
        let mut s = session();
        assert_eq!(s.select_city("atlantis"), Err(SessionError::UnknownCity("atlantis".into())));
    }

    #[test]
    fn interference_pairs_are_sorted() {
        let mut s = session();
        let base = s.antennas()[0].position;
        let two = s.add_antenna();
        let three = s.add_antenna();
        s.update_antenna(two, AntennaUpdate::position(base.offset_deg(0.01, 0.0))).unwrap();
        s.update_antenna(three, AntennaUpdate::position(base.offset_deg(0.002, 0.0))).unwrap();

        let pairs = s.interference_pairs(1.5);
        let ids: Vec<_> = pairs.iter().map(|&(a, b, _)| (a, b)).collect();
        assert_eq!(ids, vec![(1, three), (two, three), (1, two)]);
        assert!(s.interference_pairs(0.1).is_empty());
    }

    #[test]
    fn environment_falls_back_to_city() {
        let mut s = session();
        s.select_model(1, FSPL).unwrap();
        s.select_city("casablanca").unwrap();
        assert_eq!(s.environment(), Environment::UrbanLarge);
        assert!(!s.active_params().contains_key("environment"));
    }

    #[test]
    fn failed_geolocation_falls_back_to_default_city() {
        let mut s = session();
        s.select_city("rabat").unwrap();
        s.begin_locating();
        s.geolocation_failed("denied");

        assert_eq!(s.selected_city(), Some(DEFAULT_CITY));
        let center = s.cities().get(DEFAULT_CITY).unwrap().center;
        assert_eq!(s.map_view().center, center);
        assert_eq!(s.antennas()[0].position, center);
        assert!(s.notices().any(|n| n.level == NoticeLevel::Warning));
    }

    #[test]
    fn late_geolocation_failure_is_ignored() {
        let mut s = session();
        s.select_city("rabat").unwrap();
        s.geolocation_failed("timeout");
        assert_eq!(s.selected_city(), Some("rabat"));
    }

    #[test]
    fn geolocation_fix_moves_selected_antenna() {
        let mut s = session();
        let two = s.add_antenna();
        s.begin_locating();
        let here = LatLon::new(48.8566, 2.3522);
        s.set_current_location(here);

        assert_eq!(s.antenna(two).unwrap().position, here);
        assert_eq!(s.selected_city(), Some(CURRENT_LOCATION));
        assert_eq!(s.map_view().center, here);
        assert!(s.select_city(CURRENT_LOCATION).is_ok());
    }
}
