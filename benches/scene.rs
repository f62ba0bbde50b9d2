use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use propagation_sim::catalog::builtin_catalog;
use propagation_sim::geo::{distance_km, LatLon};
use propagation_sim::scene::buildings;
use propagation_sim::scene::{QueuedBackend, SceneBuilder, SceneInputs, SceneTiming};
use propagation_sim::session::SimulationSession;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn inputs() -> SceneInputs {
    let mut session = SimulationSession::default();
    session.set_catalog(builtin_catalog());
    session.set_mobile_position(session.mobile().position.offset_deg(0.03, 0.0));
    SceneInputs::from_session(&session)
}

fn scene_benchmark(c: &mut Criterion) {
    let inputs = inputs();

    c.bench_function("buildings_layout_and_mesh", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(7);
            let city = buildings::layout(black_box(&inputs), &mut rng);
            buildings::build(&city, &inputs)
        })
    });

    c.bench_function("scene_full_sync", |b| {
        b.iter(|| {
            let mut scene = SceneBuilder::new(QueuedBackend::new(), 7, SceneTiming::default());
            scene.sync(black_box(&inputs));
            scene.backend_mut().drain_ops().len()
        })
    });

    let a = LatLon::new(33.2347, -8.5027);
    let m = LatLon::new(33.2394, -8.5211);
    c.bench_function("haversine", |b| b.iter(|| distance_km(black_box(a), black_box(m))));
}

criterion_group!(benches, scene_benchmark);
criterion_main!(benches);
