use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::render::{streaks_mesh, Palette};
use crate::session::Weather;

use super::{Animation, LayerBuild, SceneInputs, SceneNode};

pub const RAIN_DROPS: usize = 1000;
pub const CLOUD_CLUSTERS: usize = 10;

const RAIN_EXTENT: f32 = 500.0;
const RAIN_TOP: std::ops::Range<f32> = 50.0..250.0;
const STREAK_LENGTH: f32 = 2.0;
/// Drop speeds are expressed per frame at this rate.
const FRAME_RATE: f32 = 60.0;

/// Falling rain, stepped on the CPU and re-uploaded as one line list.
#[derive(Debug)]
pub struct RainField {
    pub node: usize,
    drops: Vec<Vec3>,
    velocities: Vec<f32>,
    rng: StdRng,
}

impl RainField {
    pub fn new<R: Rng>(node: usize, count: usize, rng: &mut R) -> Self {
        let mut field = Self {
            node,
            drops: Vec::with_capacity(count),
            velocities: Vec::with_capacity(count),
            rng: StdRng::seed_from_u64(rng.random()),
        };
        for _ in 0..count {
            let drop = field.spawn_point();
            let velocity = -(field.rng.random::<f32>() + 0.5);
            field.drops.push(drop);
            field.velocities.push(velocity);
        }
        field
    }

    fn spawn_point(&mut self) -> Vec3 {
        Vec3::new(
            self.rng.random_range(-RAIN_EXTENT..RAIN_EXTENT),
            self.rng.random_range(RAIN_TOP),
            self.rng.random_range(-RAIN_EXTENT..RAIN_EXTENT),
        )
    }

    /// Drops that hit the ground respawn at a random point up top.
    pub fn step(&mut self, dt: f32) {
        let frames = dt * FRAME_RATE;
        for i in 0..self.drops.len() {
            self.drops[i].y += self.velocities[i] * frames;
            if self.drops[i].y < 0.0 {
                self.drops[i] = self.spawn_point();
            }
        }
    }

    pub fn drops(&self) -> &[Vec3] {
        &self.drops
    }

    pub fn mesh(&self) -> Mesh {
        streaks_mesh(&self.drops, STREAK_LENGTH)
    }
}

/// One sphere of a cloud cluster drifting on a slow closed loop.
#[derive(Debug, Clone)]
pub struct CloudLobe {
    pub node: usize,
    base: Vec3,
    scale: Vec3,
}

impl CloudLobe {
    pub fn transform_at(&self, t: f32) -> Transform {
        let drift = Vec3::new(
            (0.1 * t + self.base.z * 0.01).sin() * 30.0,
            0.0,
            (0.1 * t + self.base.x * 0.01).cos() * 30.0,
        );
        Transform::from_translation(self.base + drift).with_scale(self.scale)
    }
}

pub fn build<R: Rng>(inputs: &SceneInputs, rng: &mut R) -> LayerBuild {
    let palette = Palette::new(inputs.settings.time_of_day);
    match inputs.settings.weather {
        Weather::Clear => LayerBuild::default(),
        Weather::Rainy => rain(&palette, rng),
        Weather::Cloudy => clouds(&palette, rng),
    }
}

fn rain<R: Rng>(palette: &Palette, rng: &mut R) -> LayerBuild {
    let field = RainField::new(0, RAIN_DROPS, rng);
    let material = StandardMaterial {
        base_color: palette.rain().with_alpha(0.6),
        alpha_mode: AlphaMode::Blend,
        unlit: true,
        ..default()
    };
    LayerBuild {
        nodes: vec![SceneNode::new(field.mesh(), material, Transform::IDENTITY)],
        animation: Animation::Rain(field),
    }
}

fn clouds<R: Rng>(palette: &Palette, rng: &mut R) -> LayerBuild {
    let mut nodes = Vec::new();
    let mut lobes = Vec::new();
    for _ in 0..CLOUD_CLUSTERS {
        let center = Vec3::new(
            rng.random_range(-400.0f32..400.0),
            rng.random_range(100.0f32..150.0),
            rng.random_range(-400.0f32..400.0),
        );
        let parts = rng.random_range(3..8usize);
        for j in 0..parts {
            let radius = rng.random_range(10.0f32..30.0);
            let offset = Vec3::new(
                j as f32 * 15.0 - parts as f32 * 7.5 / 2.0 + rng.random::<f32>() * 10.0,
                rng.random::<f32>() * 5.0,
                rng.random::<f32>() * 10.0 - 5.0,
            );
            let lobe = CloudLobe {
                node: nodes.len(),
                base: center + offset,
                scale: Vec3::new(1.0, 0.6, 1.0),
            };
            nodes.push(SceneNode::new(
                Mesh::from(Sphere::new(radius).mesh().uv(16, 12)),
                StandardMaterial {
                    base_color: palette.cloud().with_alpha(0.7),
                    alpha_mode: AlphaMode::Blend,
                    perceptual_roughness: 1.0,
                    ..default()
                },
                lobe.transform_at(0.0),
            ));
            lobes.push(lobe);
        }
    }
    LayerBuild { nodes, animation: Animation::Clouds(lobes) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rain_stays_above_ground() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut field = RainField::new(0, 200, &mut rng);
        for _ in 0..600 {
            field.step(1.0 / 60.0);
            assert!(field.drops().iter().all(|d| d.y >= 0.0 && d.y < RAIN_TOP.end));
        }
        assert_eq!(field.drops().len(), 200);
        assert_eq!(field.mesh().count_vertices(), 400);
    }

    #[test]
    fn cloud_clusters_have_three_to_seven_lobes() {
        let mut rng = StdRng::seed_from_u64(11);
        let build = clouds(&Palette::new(crate::session::TimeOfDay::Day), &mut rng);
        let Animation::Clouds(lobes) = &build.animation else {
            panic!("expected cloud animation");
        };
        assert_eq!(lobes.len(), build.nodes.len());
        assert!((CLOUD_CLUSTERS * 3..=CLOUD_CLUSTERS * 7).contains(&lobes.len()));
        for (i, lobe) in lobes.iter().enumerate() {
            assert_eq!(lobe.node, i);
        }
    }

    #[test]
    fn clouds_drift_on_a_bounded_loop() {
        let lobe = CloudLobe { node: 0, base: Vec3::new(0.0, 120.0, 0.0), scale: Vec3::ONE };
        for step in 0..100 {
            let p = lobe.transform_at(step as f32).translation;
            assert!((p - lobe.base).length() <= 30.0 * 2f32.sqrt() + 1e-3);
            assert_eq!(p.y, 120.0);
        }
    }
}
