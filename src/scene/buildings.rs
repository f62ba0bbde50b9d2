use std::f32::consts::{FRAC_PI_4, TAU};

use bevy::prelude::*;
use rand::Rng;

use crate::render::{facets_mesh, Facet, Palette};
use crate::session::BuildingStyle;

use super::{LayerBuild, SceneInputs, SceneNode};

pub const BUILDING_WIDTH: f32 = 20.0;
pub const BUILDING_SPACING: f32 = 10.0;
pub const MAX_BUILDINGS: usize = 100;

/// Circular-block city layout.
struct CityLayout {
    blocks: usize,
    block_radius: f32,
    city_radius: f32,
    height_variation: f32,
    position_jitter: f32,
}

const CITY_LAYOUT: CityLayout = CityLayout {
    blocks: 1,
    block_radius: 40.0,
    city_radius: 20.0,
    height_variation: 1.0,
    position_jitter: 500.0,
};

const ROOF_HEIGHT: f32 = 8.0;
const WINDOW_MARGIN: f32 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub id: usize,
    /// Footprint centre on the ground.
    pub base: Vec3,
    pub height: f32,
}

impl Building {
    /// Point just above the roof, used to route reflection paths.
    pub fn rooftop(&self) -> Vec3 {
        Vec3::new(self.base.x, self.height + 5.0, self.base.z)
    }
}

pub fn base_heights(style: BuildingStyle) -> [f32; 5] {
    match style {
        BuildingStyle::Historic => [15.0, 18.0, 20.0, 22.0, 25.0],
        BuildingStyle::Industrial => [25.0, 30.0, 35.0, 40.0, 45.0],
        BuildingStyle::Modern => [30.0, 40.0, 50.0, 60.0, 70.0],
    }
}

/// `floor(urban length / (width + spacing))`, at most [`MAX_BUILDINGS`].
pub fn building_count(distance_km: f64, urban_ratio: f64) -> usize {
    let urban_length = distance_km * 1000.0 * urban_ratio;
    let fit = (urban_length / f64::from(BUILDING_WIDTH + BUILDING_SPACING)).floor();
    if fit.is_finite() && fit > 0.0 {
        (fit as usize).min(MAX_BUILDINGS)
    } else {
        0
    }
}

pub fn layout<R: Rng>(inputs: &SceneInputs, rng: &mut R) -> Vec<Building> {
    let count = building_count(inputs.distance_km, inputs.environment.urban_ratio());
    let heights = base_heights(inputs.settings.building_style);
    let per_block = count;
    let mut buildings = Vec::with_capacity(count * CITY_LAYOUT.blocks);

    for block in 0..CITY_LAYOUT.blocks {
        let angle = block as f32 / CITY_LAYOUT.blocks as f32 * TAU;
        let block_center = Vec2::new(angle.cos(), angle.sin()) * CITY_LAYOUT.city_radius;

        for i in 0..per_block {
            let height = heights[i % heights.len()]
                * (1.0 + CITY_LAYOUT.height_variation * (rng.random::<f32>() - 0.5));
            let around = i as f32 / per_block as f32 * TAU;
            let ring = CITY_LAYOUT.block_radius * (0.8 + rng.random::<f32>() * 0.4);
            let jitter = Vec2::new(rng.random::<f32>() - 0.5, rng.random::<f32>() - 0.5)
                * CITY_LAYOUT.position_jitter;
            let p = block_center + Vec2::new(around.cos(), around.sin()) * ring + jitter;

            buildings.push(Building {
                id: block * per_block + i,
                base: Vec3::new(p.x + BUILDING_WIDTH / 2.0, 0.0, p.y),
                height,
            });
        }
    }
    buildings
}

/// Window grid on all four faces of one building.
fn window_facets(building: &Building, style: BuildingStyle) -> Vec<Facet> {
    let w = BUILDING_WIDTH;
    let h = building.height;
    let (rows, per_row, win_w, win_h) = match style {
        BuildingStyle::Historic => ((h / 4.0).floor() as usize, 3usize, w * 0.15, 3.0),
        _ => ((h / 5.0).floor() as usize, 5usize, w * 0.12, 2.0),
    };
    if rows < 2 {
        return Vec::new();
    }
    let spacing = (w - win_w * per_row as f32) / (per_row as f32 + 1.0);
    let usable = h - 2.0 * WINDOW_MARGIN;
    let half = w / 2.0 + 0.1;

    let mut facets = Vec::new();
    for row in 1..rows {
        let y = WINDOW_MARGIN + row as f32 * usable / (rows - 1) as f32;
        for col in 0..per_row {
            let across = (col + 1) as f32 * spacing + col as f32 * win_w + win_w / 2.0 - w / 2.0;
            let at = |offset: Vec3, normal: Vec3| Facet {
                center: building.base + offset,
                normal,
                width: win_w,
                height: win_h,
            };
            facets.push(at(Vec3::new(across, y, half), Vec3::Z));
            facets.push(at(Vec3::new(-across, y, -half), Vec3::NEG_Z));
            if col % 2 == 0 {
                facets.push(at(Vec3::new(-half, y, across), Vec3::NEG_X));
                facets.push(at(Vec3::new(half, y, -across), Vec3::X));
            }
        }
    }
    facets
}

/// Bodies and roofs one node per building, all windows merged into one node.
pub fn build(buildings: &[Building], inputs: &SceneInputs) -> LayerBuild {
    let style = inputs.settings.building_style;
    let palette = Palette::new(inputs.settings.time_of_day);
    let (roughness, metallic) = match style {
        BuildingStyle::Historic => (0.9, 0.0),
        BuildingStyle::Industrial => (0.7, 0.3),
        BuildingStyle::Modern => (0.5, 0.2),
    };

    let mut nodes = Vec::with_capacity(buildings.len() * 2 + 1);
    let mut facets = Vec::new();
    for b in buildings {
        nodes.push(SceneNode::new(
            Mesh::from(Cuboid::new(BUILDING_WIDTH, b.height, BUILDING_WIDTH)),
            StandardMaterial {
                base_color: palette.building(style),
                perceptual_roughness: roughness,
                metallic,
                ..default()
            },
            Transform::from_translation(b.base + Vec3::Y * (b.height / 2.0)),
        ));
        if style == BuildingStyle::Historic {
            nodes.push(SceneNode::new(
                Mesh::from(Cone::new(BUILDING_WIDTH / 1.5, ROOF_HEIGHT).mesh().resolution(4)),
                StandardMaterial { base_color: palette.roof(), ..default() },
                Transform::from_translation(b.base + Vec3::Y * (b.height + ROOF_HEIGHT / 2.0))
                    .with_rotation(Quat::from_rotation_y(FRAC_PI_4)),
            ));
        }
        facets.extend(window_facets(b, style));
    }

    if !facets.is_empty() {
        nodes.push(SceneNode::new(
            facets_mesh(&facets),
            StandardMaterial {
                base_color: palette.window().with_alpha(0.9),
                emissive: palette.window_glow(),
                alpha_mode: AlphaMode::Blend,
                ..default()
            },
            Transform::IDENTITY,
        ));
    }

    LayerBuild { nodes, ..default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::path_loss::Environment;
    use crate::session::SceneSettings;
    use crate::station::DisplayColor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn inputs(style: BuildingStyle, distance_km: f64, environment: Environment) -> SceneInputs {
        SceneInputs {
            settings: SceneSettings { building_style: style, ..default() },
            distance_km,
            environment,
            antenna_id: 1,
            antenna_height: 50.0,
            antenna_frequency: 1800.0,
            antenna_color: DisplayColor::RED,
            mobile_height: 1.5,
            loss: 0.0,
        }
    }

    #[test]
    fn count_follows_urban_length() {
        // 1 km urban: 700 m / 30 m
        assert_eq!(building_count(1.0, 0.7), 23);
        assert_eq!(building_count(1.0, 0.4), 13);
        assert_eq!(building_count(1.0, 0.2), 6);
        assert_eq!(building_count(50.0, 0.7), MAX_BUILDINGS);
        assert_eq!(building_count(0.0, 0.7), 0);
    }

    #[test]
    fn heights_stay_within_variation() {
        let mut rng = StdRng::seed_from_u64(3);
        let city = layout(&inputs(BuildingStyle::Modern, 2.0, Environment::Urban), &mut rng);
        assert_eq!(city.len(), 46);
        for (i, b) in city.iter().enumerate() {
            let base = base_heights(BuildingStyle::Modern)[i % 5];
            assert!(b.height >= base * 0.5 && b.height <= base * 1.5);
            assert_eq!(b.base.y, 0.0);
        }
    }

    #[test]
    fn historic_buildings_get_roofs() {
        let city = vec![
            Building { id: 0, base: Vec3::ZERO, height: 20.0 },
            Building { id: 1, base: Vec3::new(50.0, 0.0, 0.0), height: 22.0 },
        ];
        let historic = build(&city, &inputs(BuildingStyle::Historic, 1.0, Environment::Urban));
        // two bodies, two roofs, one window node
        assert_eq!(historic.nodes.len(), 5);
        let modern = build(&city, &inputs(BuildingStyle::Modern, 1.0, Environment::Urban));
        assert_eq!(modern.nodes.len(), 3);
    }

    #[test]
    fn window_grid_size() {
        let b = Building { id: 0, base: Vec3::ZERO, height: 20.0 };
        // historic: 5 rows → 4 usable, 3 per row front/back + 2 side pairs
        assert_eq!(window_facets(&b, BuildingStyle::Historic).len(), 4 * (3 * 2 + 2 * 2));
        // modern: 4 rows → 3 usable, 5 per row front/back + 3 side pairs
        assert_eq!(window_facets(&b, BuildingStyle::Modern).len(), 3 * (5 * 2 + 3 * 2));
        let low = Building { id: 0, base: Vec3::ZERO, height: 7.0 };
        assert!(window_facets(&low, BuildingStyle::Historic).is_empty());
    }
}
