use std::collections::HashMap;
use std::path::Path;
use std::thread;

use anyhow::Context;
use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use crossbeam_channel::{Receiver, Sender};

use propagation_sim::catalog::ModelCatalog;
use propagation_sim::config::{CatalogChoice, SimConfig, DEFAULT_CONFIG_PATH};
use propagation_sim::geo::LatLon;
use propagation_sim::mapsync::{FixedGeolocator, GeolocationError, Geolocator, MapEvent, MapSync};
use propagation_sim::physics::LocalScoringClient;
use propagation_sim::render::Palette;
use propagation_sim::scene::{QueuedBackend, RenderHandle, SceneBuilder, SceneInputs, SceneOp};
use propagation_sim::scoring::{HttpScoringClient, ScoreRequest, ScoreResponseEnvelope, ScoringClient};
use propagation_sim::session::SimulationSession;
use propagation_sim::ui::{
    camera_control_system, ui_panel_system, CameraController, MapPanel, NoticeBoard, PanelState,
};

enum Job {
    Score(ScoreRequest),
    Locate,
}

enum Reply {
    Catalog(ModelCatalog),
    Score(ScoreResponseEnvelope),
    Located(Result<LatLon, GeolocationError>),
}

/// Channels to the async worker thread.
#[derive(Resource)]
struct Bridge {
    jobs: Sender<Job>,
    replies: Receiver<Reply>,
}

#[derive(Resource)]
struct Scene(SceneBuilder<QueuedBackend>);

struct LiveNode {
    entity: Entity,
    mesh: Handle<Mesh>,
    material: Handle<StandardMaterial>,
}

/// Bevy entities and assets behind each scene handle.
#[derive(Resource, Default)]
struct LiveNodes(HashMap<RenderHandle, LiveNode>);

/// Runs scoring, catalog loading and geolocation on a tokio runtime. Jobs are
/// served concurrently; replies come back in completion order.
fn spawn_bridge<C: ScoringClient + 'static>(
    client: C,
    catalog: CatalogChoice,
    geolocator: FixedGeolocator,
) -> anyhow::Result<Bridge> {
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
    let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<Reply>();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let client = std::sync::Arc::new(client);

    thread::Builder::new()
        .name("scoring-bridge".into())
        .spawn(move || {
            let tx = reply_tx.clone();
            runtime.spawn(async move {
                let catalog = catalog.load().await;
                let _ = tx.send(Reply::Catalog(catalog));
            });
            for job in job_rx.iter() {
                let tx = reply_tx.clone();
                match job {
                    Job::Score(request) => {
                        let client = client.clone();
                        runtime.spawn(async move {
                            let response = request.run(&*client).await;
                            let _ = tx.send(Reply::Score(response));
                        });
                    }
                    Job::Locate => {
                        runtime.spawn(async move {
                            let _ = tx.send(Reply::Located(geolocator.locate().await));
                        });
                    }
                }
            }
            info!("Scoring bridge stopped");
        })
        .context("spawning scoring bridge thread")?;

    Ok(Bridge { jobs: job_tx, replies: reply_rx })
}

fn main() -> anyhow::Result<()> {
    let config = SimConfig::load_or_default(Path::new(DEFAULT_CONFIG_PATH));
    let seed = config.scene.seed.unwrap_or_else(rand::random::<u64>);
    let mut session = SimulationSession::new(config.cities(), config.session_options(seed));
    let map_sync = MapSync::with_startup_locate(&mut session);
    let geolocator = FixedGeolocator { position: config.session.location.map(LatLon::from) };

    let bridge = if config.scoring.offline {
        spawn_bridge(LocalScoringClient::default(), config.catalog_source(), geolocator)?
    } else {
        let client = HttpScoringClient::new(config.scoring.base_url.clone(), config.scoring.timeout());
        spawn_bridge(client, config.catalog_source(), geolocator)?
    };
    let scene = SceneBuilder::new(QueuedBackend::new(), seed, config.scene.timing());

    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(EguiPlugin)
        .insert_resource(config)
        .insert_resource(session)
        .insert_resource(bridge)
        .insert_resource(Scene(scene))
        .insert_resource(map_sync)
        .insert_resource(SceneSeed(seed))
        .init_resource::<MapPanel>()
        .init_resource::<NoticeBoard>()
        .init_resource::<PanelState>()
        .init_resource::<CameraController>()
        .init_resource::<LiveNodes>()
        .add_systems(Startup, setup)
        .add_systems(
            Update,
            (
                camera_control_system,
                ui_panel_system,
                apply_map_events,
                dispatch_jobs,
                receive_replies,
                sync_scene,
                apply_scene_ops,
                push_map,
            )
                .chain(),
        )
        .run();
    Ok(())
}

#[derive(Resource)]
struct SceneSeed(u64);

fn setup(mut commands: Commands, seed: Res<SceneSeed>, config: Res<SimConfig>) {
    info!(
        "Scene seed {} (scoring: {})",
        seed.0,
        if config.scoring.offline { "local formulas" } else { config.scoring.base_url.as_str() }
    );

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 350.0, 600.0).looking_at(Vec3::new(0.0, 20.0, 0.0), Vec3::Y),
    ));
    commands.spawn((
        DirectionalLight {
            illuminance: 10000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_rotation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_4)),
    ));
}

fn apply_map_events(
    mut session: ResMut<SimulationSession>,
    mut map: ResMut<MapPanel>,
    mut sync: ResMut<MapSync>,
) {
    for event in map.take_events() {
        if let Err(e) = sync.apply_event(&mut session, event) {
            warn!("Map action rejected: {}", e);
        }
    }
}

fn dispatch_jobs(mut session: ResMut<SimulationSession>, mut sync: ResMut<MapSync>, bridge: Res<Bridge>) {
    if sync.take_locate_request() && bridge.jobs.send(Job::Locate).is_err() {
        session.geolocation_failed("worker stopped");
    }
    for request in session.take_requests() {
        if bridge.jobs.send(Job::Score(request)).is_err() {
            error!("Scoring bridge is gone; dropping request");
        }
    }
}

fn receive_replies(
    mut session: ResMut<SimulationSession>,
    mut sync: ResMut<MapSync>,
    bridge: Res<Bridge>,
) {
    for reply in bridge.replies.try_iter() {
        match reply {
            Reply::Catalog(catalog) => session.set_catalog(catalog),
            Reply::Score(response) => {
                session.apply_score(response);
            }
            Reply::Located(fix) => {
                let _ = sync.apply_event(&mut session, MapEvent::Located(fix));
            }
        }
    }
}

fn sync_scene(
    session: Res<SimulationSession>,
    mut scene: ResMut<Scene>,
    mut clear: ResMut<ClearColor>,
    time: Res<Time>,
) {
    let inputs = SceneInputs::from_session(&session);
    scene.0.sync(&inputs);
    scene.0.tick(time.delta_secs());
    clear.0 = Palette::new(inputs.settings.time_of_day).sky();
}

fn apply_scene_ops(
    mut commands: Commands,
    mut scene: ResMut<Scene>,
    mut live: ResMut<LiveNodes>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    for op in scene.0.backend_mut().drain_ops() {
        match op {
            SceneOp::Spawn { handle, node, .. } => {
                let mesh = meshes.add(node.mesh);
                let material = materials.add(node.material);
                let entity = commands
                    .spawn((Mesh3d(mesh.clone()), MeshMaterial3d(material.clone()), node.transform))
                    .id();
                live.0.insert(handle, LiveNode { entity, mesh, material });
            }
            SceneOp::UpdateMesh { handle, mesh } => {
                if let Some(target) = live.0.get(&handle).and_then(|n| meshes.get_mut(&n.mesh)) {
                    *target = mesh;
                }
            }
            SceneOp::SetTransform { handle, transform } => {
                if let Some(node) = live.0.get(&handle) {
                    commands.entity(node.entity).insert(transform);
                }
            }
            SceneOp::SetAlpha { handle, alpha } => {
                if let Some(material) = live.0.get(&handle).and_then(|n| materials.get_mut(&n.material)) {
                    material.base_color.set_alpha(alpha);
                }
            }
            SceneOp::Release { handle } => {
                if let Some(node) = live.0.remove(&handle) {
                    commands.entity(node.entity).despawn();
                    meshes.remove(&node.mesh);
                    materials.remove(&node.material);
                }
            }
        }
    }
}

fn push_map(session: Res<SimulationSession>, mut sync: ResMut<MapSync>, mut map: ResMut<MapPanel>) {
    sync.push(&session, &mut *map);
}
