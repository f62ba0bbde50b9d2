use std::future::Future;
use std::time::Duration;

use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

use crate::params::ParameterSet;
use crate::station::{Antenna, AntennaId};

/// Path loss and usable radius returned by a propagation model.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreResult {
    /// dB
    pub loss: f64,
    /// metres
    pub coverage_radius: f64,
}

impl ScoreResult {
    pub const ZERO: ScoreResult = ScoreResult { loss: 0.0, coverage_radius: 0.0 };
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scoring service answered HTTP {0}")]
    Status(u16),
    #[error("scoring response is not a score: {0}")]
    Decode(String),
    #[error("scoring request timed out after {0:?}")]
    Timeout(Duration),
    #[error("no local formula for model `{0}`")]
    UnsupportedModel(String),
}

/// The external path-loss evaluator.
pub trait ScoringClient: Send + Sync {
    fn evaluate(
        &self,
        endpoint_id: &str,
        antenna: &Antenna,
        params: &ParameterSet,
    ) -> impl Future<Output = Result<ScoreResult, ScoringError>> + Send;
}

/// Run an evaluation and fold every failure into [`ScoreResult::ZERO`].
pub async fn evaluate_or_zero<C: ScoringClient>(
    client: &C,
    endpoint_id: &str,
    antenna: &Antenna,
    params: &ParameterSet,
) -> ScoreResult {
    match client.evaluate(endpoint_id, antenna, params).await {
        Ok(score) => score,
        Err(e) => {
            warn!("Scoring {} for antenna {} failed: {}", endpoint_id, antenna.id, e);
            ScoreResult::ZERO
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    value: f64,
    #[serde(rename = "coverageRadius", default)]
    coverage_radius: f64,
}

/// `GET {base_url}{endpoint}?{key=value,...}` → `{value, coverageRadius}`.
#[derive(Clone)]
pub struct HttpScoringClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpScoringClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn url_for(&self, endpoint_id: &str) -> String {
        if endpoint_id.starts_with('/') {
            format!("{}{}", self.base_url, endpoint_id)
        } else {
            format!("{}/{}", self.base_url, endpoint_id)
        }
    }
}

impl ScoringClient for HttpScoringClient {
    fn evaluate(
        &self,
        endpoint_id: &str,
        _antenna: &Antenna,
        params: &ParameterSet,
    ) -> impl Future<Output = Result<ScoreResult, ScoringError>> + Send {
        let request = self.client.get(self.url_for(endpoint_id)).query(&params.query_pairs());
        let timeout = self.timeout;
        async move {
            let exchange = async {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ScoringError::Status(status.as_u16()));
                }
                let body = response.bytes().await?;
                let parsed: ScoreResponse =
                    serde_json::from_slice(&body).map_err(|e| ScoringError::Decode(e.to_string()))?;
                if !parsed.value.is_finite() || !parsed.coverage_radius.is_finite() {
                    return Err(ScoringError::Decode("non-finite value".into()));
                }
                Ok::<_, ScoringError>(ScoreResult { loss: parsed.value, coverage_radius: parsed.coverage_radius })
            };
            match tokio::time::timeout(timeout, exchange).await {
                Ok(result) => result,
                Err(_) => Err(ScoringError::Timeout(timeout)),
            }
        }
    }
}

/// Which antenna a request or answer concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreTarget {
    /// The selected antenna with the active parameter set; drives the readout.
    Active,
    /// Any antenna with its own saved parameters; drives "show all coverages".
    Coverage(AntennaId),
}

/// One evaluation the session wants performed. `seq` grows monotonically per
/// session so late answers can be recognised.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRequest {
    pub seq: u64,
    pub target: ScoreTarget,
    pub endpoint_id: String,
    pub antenna: Antenna,
    pub params: ParameterSet,
}

impl ScoreRequest {
    pub async fn run<C: ScoringClient>(self, client: &C) -> ScoreResponseEnvelope {
        let result = evaluate_or_zero(client, &self.endpoint_id, &self.antenna, &self.params).await;
        ScoreResponseEnvelope { request: self, result }
    }
}

/// A finished request, ready to hand back to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResponseEnvelope {
    pub request: ScoreRequest,
    pub result: ScoreResult,
}
