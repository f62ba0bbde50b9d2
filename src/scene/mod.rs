pub mod buildings;
pub mod paths;
pub mod signal;
pub mod stations;
pub mod terrain;
pub mod weather;

use std::collections::{HashMap, HashSet};

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::physics::path_loss::Environment;
use crate::render::line_strip_mesh;
use crate::session::{SceneSettings, SimulationSession, TerrainType, TimeOfDay, Weather};
use crate::station::{AntennaId, DisplayColor};

use buildings::Building;

/// Scene-space x of the base station; the mobile sits mirrored at `-STATION_OFFSET`.
pub const STATION_OFFSET: f32 = 280.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerKind {
    Terrain,
    Buildings,
    Weather,
    Paths,
    Stations,
    Signal,
}

impl LayerKind {
    pub const ALL: [LayerKind; 6] = [
        LayerKind::Terrain,
        LayerKind::Buildings,
        LayerKind::Weather,
        LayerKind::Paths,
        LayerKind::Stations,
        LayerKind::Signal,
    ];

    fn index(self) -> u64 {
        self as u64
    }
}

/// Opaque id of one live render resource (geometry + material + transform).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderHandle(pub u64);

/// One mesh/material pair to place in the scene.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub mesh: Mesh,
    pub material: StandardMaterial,
    pub transform: Transform,
}

impl SceneNode {
    pub fn new(mesh: Mesh, material: StandardMaterial, transform: Transform) -> Self {
        Self { mesh, material, transform }
    }
}

/// Retained-mode scene with explicitly released resources.
pub trait SceneBackend {
    fn spawn(&mut self, layer: LayerKind, node: SceneNode) -> RenderHandle;
    fn update_mesh(&mut self, handle: RenderHandle, mesh: Mesh);
    fn set_transform(&mut self, handle: RenderHandle, transform: Transform);
    fn set_alpha(&mut self, handle: RenderHandle, alpha: f32);
    /// Free the geometry and material behind `handle`.
    fn release(&mut self, handle: RenderHandle);
}

#[derive(Debug, Clone)]
pub enum SceneOp {
    Spawn { handle: RenderHandle, layer: LayerKind, node: SceneNode },
    UpdateMesh { handle: RenderHandle, mesh: Mesh },
    SetTransform { handle: RenderHandle, transform: Transform },
    SetAlpha { handle: RenderHandle, alpha: f32 },
    Release { handle: RenderHandle },
}

impl SceneOp {
    pub fn handle(&self) -> RenderHandle {
        match self {
            SceneOp::Spawn { handle, .. }
            | SceneOp::UpdateMesh { handle, .. }
            | SceneOp::SetTransform { handle, .. }
            | SceneOp::SetAlpha { handle, .. }
            | SceneOp::Release { handle } => *handle,
        }
    }
}

/// Records operations for a renderer to apply later and keeps the live set.
///
/// A resource released before its spawn was drained never reaches the
/// renderer: its queued ops are simply dropped.
#[derive(Debug, Default)]
pub struct QueuedBackend {
    next: u64,
    live: HashMap<RenderHandle, LayerKind>,
    undrained: HashSet<RenderHandle>,
    ops: Vec<SceneOp>,
}

impl QueuedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain_ops(&mut self) -> Vec<SceneOp> {
        self.undrained.clear();
        std::mem::take(&mut self.ops)
    }

    pub fn pending_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_in(&self, layer: LayerKind) -> usize {
        self.live.values().filter(|&&l| l == layer).count()
    }

    pub fn is_live(&self, handle: RenderHandle) -> bool {
        self.live.contains_key(&handle)
    }
}

impl SceneBackend for QueuedBackend {
    fn spawn(&mut self, layer: LayerKind, node: SceneNode) -> RenderHandle {
        self.next += 1;
        let handle = RenderHandle(self.next);
        self.live.insert(handle, layer);
        self.undrained.insert(handle);
        self.ops.push(SceneOp::Spawn { handle, layer, node });
        handle
    }

    fn update_mesh(&mut self, handle: RenderHandle, mesh: Mesh) {
        if self.live.contains_key(&handle) {
            self.ops.push(SceneOp::UpdateMesh { handle, mesh });
        }
    }

    fn set_transform(&mut self, handle: RenderHandle, transform: Transform) {
        if self.live.contains_key(&handle) {
            self.ops.push(SceneOp::SetTransform { handle, transform });
        }
    }

    fn set_alpha(&mut self, handle: RenderHandle, alpha: f32) {
        if self.live.contains_key(&handle) {
            self.ops.push(SceneOp::SetAlpha { handle, alpha });
        }
    }

    fn release(&mut self, handle: RenderHandle) {
        if self.live.remove(&handle).is_none() {
            warn!("Double release of render resource {:?}", handle);
            return;
        }
        if self.undrained.remove(&handle) {
            self.ops.retain(|op| op.handle() != handle);
        } else {
            self.ops.push(SceneOp::Release { handle });
        }
    }
}

/// Read-only snapshot of everything the scene depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneInputs {
    pub settings: SceneSettings,
    /// Tx-Rx span, km.
    pub distance_km: f64,
    pub environment: Environment,
    pub antenna_id: AntennaId,
    pub antenna_height: f64,
    pub antenna_frequency: f64,
    pub antenna_color: DisplayColor,
    pub mobile_height: f64,
    pub loss: f64,
}

impl SceneInputs {
    pub fn from_session(session: &SimulationSession) -> Self {
        let params = session.active_params();
        let antenna = session.selected_antenna();
        let distance_km = params
            .number("distance")
            .filter(|d| *d > 0.0)
            .unwrap_or(1.0);
        Self {
            settings: session.settings,
            distance_km,
            environment: session.environment(),
            antenna_id: antenna.id,
            antenna_height: antenna.height,
            antenna_frequency: antenna.frequency,
            antenna_color: antenna.color,
            mobile_height: params.number("h_m").unwrap_or(1.5),
            loss: session.score().loss,
        }
    }

    /// Transmit point on top of the mast.
    pub fn antenna_tip(&self) -> Vec3 {
        Vec3::new(STATION_OFFSET, self.antenna_height as f32 + 2.0, 0.0)
    }

    /// Receive point above the mobile user.
    pub fn mobile_point(&self) -> Vec3 {
        Vec3::new(-STATION_OFFSET, self.mobile_height as f32 + 15.0, 0.0)
    }
}

/// Dependency key per layer: a layer is rebuilt exactly when its key changes.
#[derive(Debug, Clone, PartialEq)]
enum LayerKey {
    Terrain(TerrainType, TimeOfDay),
    Buildings {
        style: crate::session::BuildingStyle,
        time: TimeOfDay,
        distance_km: f64,
        environment: Environment,
        antenna: (AntennaId, f64),
    },
    Weather(Weather, TimeOfDay),
    Paths {
        direct: bool,
        reflections: bool,
        tip: (AntennaId, f64, DisplayColor),
        distance_km: f64,
        mobile_height: f64,
        buildings: u64,
    },
    Stations {
        time: TimeOfDay,
        height: f64,
        color: DisplayColor,
        mobile_height: f64,
    },
    Signal {
        show: bool,
        loss: f64,
        time: TimeOfDay,
        antenna: (f64, f64),
        distance_km: f64,
        mobile_height: f64,
        environment: Environment,
    },
}

impl LayerKey {
    fn of(layer: LayerKind, inputs: &SceneInputs, buildings_generation: u64) -> Self {
        let s = &inputs.settings;
        match layer {
            LayerKind::Terrain => LayerKey::Terrain(s.terrain_type, s.time_of_day),
            LayerKind::Buildings => LayerKey::Buildings {
                style: s.building_style,
                time: s.time_of_day,
                distance_km: inputs.distance_km,
                environment: inputs.environment,
                antenna: (inputs.antenna_id, inputs.antenna_height),
            },
            LayerKind::Weather => LayerKey::Weather(s.weather, s.time_of_day),
            LayerKind::Paths => LayerKey::Paths {
                direct: s.show_direct_path,
                reflections: s.show_paths,
                tip: (inputs.antenna_id, inputs.antenna_height, inputs.antenna_color),
                distance_km: inputs.distance_km,
                mobile_height: inputs.mobile_height,
                buildings: buildings_generation,
            },
            LayerKind::Stations => LayerKey::Stations {
                time: s.time_of_day,
                height: inputs.antenna_height,
                color: inputs.antenna_color,
                mobile_height: inputs.mobile_height,
            },
            LayerKind::Signal => LayerKey::Signal {
                show: s.show_path_loss,
                loss: inputs.loss,
                time: s.time_of_day,
                antenna: (inputs.antenna_height, inputs.antenna_frequency),
                distance_km: inputs.distance_km,
                mobile_height: inputs.mobile_height,
                environment: inputs.environment,
            },
        }
    }
}

/// A progressively revealed polyline.
#[derive(Debug, Clone)]
pub struct RevealTrack {
    pub node: usize,
    pub points: Vec<Vec3>,
    pub duration: f32,
    pub phase: f32,
    shown: usize,
}

impl RevealTrack {
    pub fn new(node: usize, points: Vec<Vec3>, duration: f32, phase: f32) -> Self {
        Self { node, points, duration, phase, shown: 0 }
    }

    /// Number of points visible `t` seconds after the layer was built.
    pub fn visible_at(&self, t: f32) -> usize {
        if self.duration <= 0.0 {
            return self.points.len();
        }
        let progress = crate::render::ease_in_out(t / self.duration);
        ((progress * self.points.len() as f32).floor() as usize).min(self.points.len())
    }
}

/// Per-frame behaviour of a freshly built layer, indexed by node position.
#[derive(Debug, Default)]
pub enum Animation {
    #[default]
    Still,
    Reveal(Vec<RevealTrack>),
    Rain(weather::RainField),
    Clouds(Vec<weather::CloudLobe>),
}

/// What a layer generator hands back.
#[derive(Debug, Default)]
pub struct LayerBuild {
    pub nodes: Vec<SceneNode>,
    pub animation: Animation,
}

/// Handles owned by one generation of a layer. Must be disposed through the
/// backend that issued them.
#[derive(Debug, Default)]
struct LayerResources {
    handles: Vec<RenderHandle>,
}

impl LayerResources {
    fn dispose<B: SceneBackend>(&mut self, backend: &mut B) {
        for handle in self.handles.drain(..) {
            backend.release(handle);
        }
    }
}

#[derive(Debug, Default)]
struct LayerSlot {
    key: Option<LayerKey>,
    resources: LayerResources,
    animation: Animation,
    generation: u64,
    built_at: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneTiming {
    pub direct_path_secs: f32,
    pub reflection_path_secs: f32,
}

impl Default for SceneTiming {
    fn default() -> Self {
        Self { direct_path_secs: 7.0, reflection_path_secs: 5.0 }
    }
}

/// Procedural 3D projection of a [`SimulationSession`].
///
/// Each layer owns the render resources of its current generation. Before a
/// layer is regenerated, and when the builder is dropped, those resources are
/// released through the backend.
pub struct SceneBuilder<B: SceneBackend = QueuedBackend> {
    backend: B,
    seed: u64,
    timing: SceneTiming,
    slots: HashMap<LayerKind, LayerSlot>,
    buildings: Vec<Building>,
    elapsed: f32,
}

impl<B: SceneBackend> SceneBuilder<B> {
    pub fn new(backend: B, seed: u64, timing: SceneTiming) -> Self {
        Self {
            backend,
            seed,
            timing,
            slots: LayerKind::ALL.iter().map(|&l| (l, LayerSlot::default())).collect(),
            buildings: Vec::new(),
            elapsed: 0.0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn generation(&self, layer: LayerKind) -> u64 {
        self.slots.get(&layer).map(|s| s.generation).unwrap_or(0)
    }

    pub fn handles(&self, layer: LayerKind) -> &[RenderHandle] {
        self.slots
            .get(&layer)
            .map(|s| s.resources.handles.as_slice())
            .unwrap_or(&[])
    }

    /// Rebuild every layer whose dependencies changed. Buildings go before
    /// paths since paths are routed over the roofs.
    pub fn sync(&mut self, inputs: &SceneInputs) -> Vec<LayerKind> {
        let mut rebuilt = Vec::new();
        for layer in LayerKind::ALL {
            let key = LayerKey::of(layer, inputs, self.generation(LayerKind::Buildings));
            let stale = self.slots.get(&layer).is_none_or(|s| s.key.as_ref() != Some(&key));
            if stale {
                self.rebuild(layer, inputs);
                rebuilt.push(layer);
            }
        }
        rebuilt
    }

    /// Unconditionally regenerate one layer.
    pub fn rebuild(&mut self, layer: LayerKind, inputs: &SceneInputs) {
        let generation = {
            let slot = self.slots.entry(layer).or_default();
            slot.resources.dispose(&mut self.backend);
            slot.generation += 1;
            slot.generation
        };

        let mut rng = StdRng::seed_from_u64(self.seed ^ (layer.index() << 56) ^ generation);
        let build = match layer {
            LayerKind::Terrain => terrain::build(inputs),
            LayerKind::Buildings => {
                self.buildings = buildings::layout(inputs, &mut rng);
                buildings::build(&self.buildings, inputs)
            }
            LayerKind::Weather => weather::build(inputs, &mut rng),
            LayerKind::Paths => paths::build(inputs, &self.buildings, self.timing),
            LayerKind::Stations => stations::build(inputs),
            LayerKind::Signal => signal::build(inputs),
        };

        let handles: Vec<RenderHandle> = build
            .nodes
            .into_iter()
            .map(|node| self.backend.spawn(layer, node))
            .collect();
        debug!("Rebuilt {:?} layer, generation {} with {} nodes", layer, generation, handles.len());

        let key = LayerKey::of(layer, inputs, self.generation(LayerKind::Buildings));
        let built_at = self.elapsed;
        let slot = self.slots.entry(layer).or_default();
        slot.resources.handles = handles;
        slot.animation = build.animation;
        slot.built_at = built_at;
        slot.key = Some(key);
    }

    /// Advance animations by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        self.elapsed += dt;
        let t = self.elapsed;
        for slot in self.slots.values_mut() {
            let since = t - slot.built_at;
            let handles = &slot.resources.handles;
            match &mut slot.animation {
                Animation::Still => {}
                Animation::Reveal(tracks) => {
                    for track in tracks.iter_mut() {
                        let Some(&handle) = handles.get(track.node) else { continue };
                        let visible = track.visible_at(since);
                        if visible != track.shown {
                            track.shown = visible;
                            self.backend.update_mesh(handle, line_strip_mesh(&track.points[..visible]));
                        }
                        self.backend.set_alpha(handle, paths::pulse_alpha(t, track.phase));
                    }
                }
                Animation::Rain(field) => {
                    field.step(dt);
                    if let Some(&handle) = handles.get(field.node) {
                        self.backend.update_mesh(handle, field.mesh());
                    }
                }
                Animation::Clouds(lobes) => {
                    for lobe in lobes.iter() {
                        if let Some(&handle) = handles.get(lobe.node) {
                            self.backend.set_transform(handle, lobe.transform_at(t));
                        }
                    }
                }
            }
        }
    }

    /// Release every layer.
    pub fn teardown(&mut self) {
        for slot in self.slots.values_mut() {
            slot.resources.dispose(&mut self.backend);
            slot.key = None;
            slot.animation = Animation::Still;
        }
        self.buildings.clear();
    }
}

impl<B: SceneBackend> Drop for SceneBuilder<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
