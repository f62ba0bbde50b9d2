use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use warp::http::StatusCode;
use warp::Filter;

use crate::catalog::builtin_catalog;
use crate::geo::{distance_km, LatLon};
use crate::physics::LocalScoringClient;
use crate::scene::{LayerKind, QueuedBackend, SceneBuilder, SceneInputs, SceneTiming};
use crate::scoring::{HttpScoringClient, ScoreResponseEnvelope, ScoreResult, ScoreTarget};
use crate::session::{CityTable, NoticeLevel, SessionError, SessionOptions, SimulationSession};
use crate::station::AntennaUpdate;

const FSPL: &str = "/fspl-dbLoss";
const COST231: &str = "/Cost231/pathLoss";

fn session() -> SimulationSession {
    let mut session =
        SimulationSession::new(CityTable::builtin(), SessionOptions { seed: 11, ..Default::default() });
    session.set_catalog(builtin_catalog());
    session
}

#[test]
fn test_haversine_el_jadida_link() {
    let antenna = LatLon::new(33.2347, -8.5027);
    let mobile = LatLon::new(33.2394, -8.5211);

    let d = distance_km(antenna, mobile);
    assert!((d - 1.79).abs() < 0.05, "got {d}");
    assert_eq!(d, distance_km(mobile, antenna));
    assert_eq!(distance_km(antenna, antenna), 0.0);

    let mut s = session();
    s.update_antenna(1, AntennaUpdate::position(antenna)).unwrap();
    s.set_mobile_position(mobile);
    assert!((s.selected_distance_km() - d).abs() < 1e-12);
    assert_eq!(s.active_params().number("distance"), Some(d));
}

#[test]
fn test_distance_symmetry_over_random_points() {
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..200 {
        let a = LatLon::new(rng.random_range(-89.0..89.0), rng.random_range(-180.0..180.0));
        let b = LatLon::new(rng.random_range(-89.0..89.0), rng.random_range(-180.0..180.0));
        assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-9);
        assert_eq!(distance_km(a, a), 0.0);
    }
}

#[test]
fn test_removing_last_antenna_is_rejected() {
    let mut s = session();
    s.drain_notices();
    let before = s.antennas().to_vec();

    assert_eq!(s.remove_antenna(1), Err(SessionError::LastAntenna));

    assert_eq!(s.antennas(), before.as_slice());
    assert_eq!(s.antennas().len(), 1);
    let notices = s.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
}

#[test]
fn test_antenna_count_never_drops_below_one() {
    let mut s = session();
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..300 {
        if rng.random_bool(0.45) {
            s.add_antenna();
        } else {
            let ids: Vec<u32> = s.antennas().iter().map(|a| a.id).collect();
            let victim = ids[rng.random_range(0..ids.len())];
            let result = s.remove_antenna(victim);
            if ids.len() == 1 {
                assert_eq!(result, Err(SessionError::LastAntenna));
            } else {
                assert!(result.is_ok());
            }
        }
        assert!(!s.antennas().is_empty());
        assert!(s.antenna(s.selected_id()).is_some());
    }
}

#[test]
fn test_switch_round_trip_keeps_edits() {
    let mut s = session();
    s.select_model(1, FSPL).unwrap();
    let b = s.add_antenna();
    s.select_model(b, COST231).unwrap();

    s.select_antenna(1).unwrap();
    assert!(s.set_parameter_value("carrier_frequency_MHz", 2400.0));
    let a_before = s.active_params().clone();

    s.select_antenna(b).unwrap();
    assert!(s.set_parameter_value("h_b", 40.0));
    assert!(!s.active_params().contains_key("carrier_frequency_MHz"));

    s.select_antenna(1).unwrap();
    assert_eq!(s.active_params().number("carrier_frequency_MHz"), Some(2400.0));
    assert_eq!(s.active_params(), &a_before);

    s.select_antenna(b).unwrap();
    assert_eq!(s.active_params().number("h_b"), Some(40.0));
}

#[test]
fn test_absent_parameter_is_a_no_op() {
    let mut s = session();
    let before = s.active_params().clone();
    assert!(!s.set_parameter_value("carrier_frequency_MHz", 5000.0));
    assert!(!s.set_parameter_value("", "urban"));
    assert_eq!(s.active_params(), &before);
}

#[tokio::test]
async fn test_server_error_zeroes_the_score() {
    let route = warp::any().map(|| warp::reply::with_status("down", StatusCode::INTERNAL_SERVER_ERROR));
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    let client = HttpScoringClient::new(format!("http://{}", addr), Duration::from_secs(5));

    let mut s = session();
    for request in s.take_requests() {
        s.apply_score(ScoreResponseEnvelope { request, result: ScoreResult { loss: 131.0, coverage_radius: 1500.0 } });
    }
    assert_eq!(s.score().loss, 131.0);

    s.set_mobile_position(s.mobile().position.offset_deg(0.002, 0.0));
    s.run_pending(&client).await;

    assert_eq!(s.score(), ScoreResult::ZERO);
    assert_eq!(s.coverage(1), Some(ScoreResult::ZERO));
    assert!(s.pending_requests().is_empty());
}

#[tokio::test]
async fn test_offline_scoring_fills_readout() {
    let mut s = session();
    s.run_pending(&LocalScoringClient::default()).await;
    let score = s.score();
    assert!(score.loss > 80.0 && score.loss < 200.0);
    assert!(score.coverage_radius > 0.0);
}

#[test]
fn test_late_answer_does_not_overwrite_newer() {
    let mut s = session();
    let first = s.take_requests().into_iter().find(|r| r.target == ScoreTarget::Active).unwrap();
    s.set_parameter_value("h_m", 3.0);
    let second = s.take_requests().into_iter().find(|r| r.target == ScoreTarget::Active).unwrap();

    assert!(s.apply_score(ScoreResponseEnvelope { request: second, result: ScoreResult { loss: 120.0, coverage_radius: 1.0 } }));
    assert!(!s.apply_score(ScoreResponseEnvelope { request: first, result: ScoreResult { loss: 99.0, coverage_radius: 1.0 } }));
    assert_eq!(s.score().loss, 120.0);
}

#[test]
fn test_scene_does_not_leak_under_parameter_edits() {
    let mut s = session();
    let mut scene = SceneBuilder::new(QueuedBackend::new(), 3, SceneTiming::default());
    s.settings.show_paths = true;
    scene.sync(&SceneInputs::from_session(&s));
    let baseline_stations = scene.backend().live_in(LayerKind::Stations);

    for step in 0..40 {
        s.set_parameter_value("h_b", 30.0 + f64::from(step));
        s.set_mobile_position(s.mobile().position.offset_deg(0.0005, 0.0));
        scene.sync(&SceneInputs::from_session(&s));
        scene.tick(0.1);
        scene.backend_mut().drain_ops();

        let owned: usize = LayerKind::ALL.iter().map(|&l| scene.handles(l).len()).sum();
        assert_eq!(scene.backend().live_count(), owned);
        assert_eq!(scene.backend().live_in(LayerKind::Stations), baseline_stations);
    }

    drop(scene);
}
