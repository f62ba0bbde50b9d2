pub mod path_loss;

use std::future::Future;

use crate::params::ParameterSet;
use crate::scoring::{ScoreResult, ScoringClient, ScoringError};
use crate::station::Antenna;

use path_loss::{Environment, MAX_PATH_LOSS_DB};

/// Offline evaluator that answers the common empirical models in-process.
/// Model inputs missing from the parameter set fall back to the antenna's own
/// physical attributes.
#[derive(Debug, Clone, Copy)]
pub struct LocalScoringClient {
    pub max_path_loss_db: f64,
}

impl Default for LocalScoringClient {
    fn default() -> Self {
        Self { max_path_loss_db: MAX_PATH_LOSS_DB }
    }
}

struct LinkInputs {
    freq_mhz: f64,
    h_b: f64,
    h_m: f64,
    dist_km: f64,
    env: Environment,
    large_city: bool,
}

impl LinkInputs {
    fn resolve(antenna: &Antenna, params: &ParameterSet) -> Self {
        let freq_mhz = params
            .number("f")
            .or_else(|| params.number("frequency_MHz"))
            .unwrap_or(antenna.frequency);
        Self {
            freq_mhz,
            h_b: params.number("h_b").unwrap_or(antenna.height),
            h_m: params.number("h_m").unwrap_or(1.5),
            dist_km: params.number("distance").unwrap_or(1.0).max(0.001),
            env: params.text("environment").map(Environment::parse).unwrap_or_default(),
            large_city: params.text("city_size") == Some("Grande"),
        }
    }
}

impl LocalScoringClient {
    /// Loss curve for the given model as a function of distance in km.
    fn loss_curve(&self, endpoint_id: &str, antenna: &Antenna, params: &ParameterSet) -> Option<Box<dyn Fn(f64) -> f64>> {
        let link = LinkInputs::resolve(antenna, params);
        let id = endpoint_id.to_ascii_lowercase();
        let LinkInputs { freq_mhz, h_b, h_m, env, large_city, .. } = link;
        if id.contains("cost231") {
            Some(Box::new(move |d| path_loss::cost231_path_loss(freq_mhz, h_b, h_m, d, env)))
        } else if id.contains("hata") {
            Some(Box::new(move |d| path_loss::hata_path_loss(freq_mhz, h_b, h_m, d, env, large_city)))
        } else if id.contains("fspl") {
            // The FSPL catalog entry expresses its carrier in GHz.
            let carrier_mhz = params
                .number("carrier_frequency_MHz")
                .map(|ghz| ghz * 1000.0)
                .unwrap_or(freq_mhz);
            Some(Box::new(move |d| path_loss::fspl_db(d, carrier_mhz)))
        } else if id.contains("two-ray") {
            Some(Box::new(move |d| path_loss::two_ray_ground_db(d, freq_mhz, h_b, h_m)))
        } else {
            None
        }
    }
}

impl ScoringClient for LocalScoringClient {
    fn evaluate(
        &self,
        endpoint_id: &str,
        antenna: &Antenna,
        params: &ParameterSet,
    ) -> impl Future<Output = Result<ScoreResult, ScoringError>> + Send {
        let dist_km = LinkInputs::resolve(antenna, params).dist_km;
        let result = match self.loss_curve(endpoint_id, antenna, params) {
            Some(curve) => Ok(ScoreResult {
                loss: curve(dist_km),
                coverage_radius: path_loss::solve_coverage_radius_m(&curve, self.max_path_loss_db),
            }),
            None => Err(ScoringError::UnsupportedModel(endpoint_id.to_string())),
        };
        std::future::ready(result)
    }
}
