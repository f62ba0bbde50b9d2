use bevy::prelude::*;

use crate::render::{dome_mesh, Palette};
use crate::session::TerrainType;

use super::{LayerBuild, SceneInputs, SceneNode};

/// Hill placements: translation and non-uniform scale of a 100 m dome.
const HILLS: [([f32; 3], [f32; 3]); 4] = [
    ([-150.0, -50.0, -100.0], [1.5, 0.3, 1.2]),
    ([120.0, -60.0, -80.0], [1.2, 0.25, 1.0]),
    ([-80.0, -40.0, 80.0], [1.0, 0.2, 0.8]),
    ([200.0, -70.0, 50.0], [2.0, 0.4, 1.5]),
];

const HILL_RADIUS: f32 = 100.0;

pub fn build(inputs: &SceneInputs) -> LayerBuild {
    let palette = Palette::new(inputs.settings.time_of_day);
    let nodes = match inputs.settings.terrain_type {
        TerrainType::Flat => Vec::new(),
        TerrainType::Hilly => hills(&palette),
        TerrainType::Coastal => coast(&palette),
    };
    LayerBuild { nodes, ..default() }
}

fn hills(palette: &Palette) -> Vec<SceneNode> {
    HILLS
        .iter()
        .map(|&(pos, scale)| {
            let material = StandardMaterial {
                base_color: palette.hill(),
                perceptual_roughness: 0.8,
                ..default()
            };
            SceneNode::new(
                dome_mesh(HILL_RADIUS, HILL_RADIUS, 32, 16),
                material,
                Transform::from_translation(Vec3::from(pos)).with_scale(Vec3::from(scale)),
            )
        })
        .collect()
}

fn coast(palette: &Palette) -> Vec<SceneNode> {
    let water = StandardMaterial {
        base_color: palette.water().with_alpha(0.8),
        perceptual_roughness: 0.1,
        metallic: 0.8,
        alpha_mode: AlphaMode::Blend,
        ..default()
    };
    let beach = StandardMaterial {
        base_color: palette.beach(),
        perceptual_roughness: 1.0,
        ..default()
    };
    vec![
        SceneNode::new(
            Mesh::from(Plane3d::default().mesh().size(1000.0, 500.0)),
            water,
            Transform::from_xyz(0.0, -0.5, -250.0),
        ),
        SceneNode::new(
            Mesh::from(Plane3d::default().mesh().size(1000.0, 50.0)),
            beach,
            Transform::from_xyz(0.0, -0.4, -200.0),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::path_loss::Environment;
    use crate::session::SceneSettings;
    use crate::station::DisplayColor;

    fn inputs(terrain_type: TerrainType) -> SceneInputs {
        SceneInputs {
            settings: SceneSettings { terrain_type, ..default() },
            distance_km: 1.0,
            environment: Environment::Urban,
            antenna_id: 1,
            antenna_height: 50.0,
            antenna_frequency: 1800.0,
            antenna_color: DisplayColor::RED,
            mobile_height: 1.5,
            loss: 0.0,
        }
    }

    #[test]
    fn node_counts_per_terrain() {
        assert!(build(&inputs(TerrainType::Flat)).nodes.is_empty());
        assert_eq!(build(&inputs(TerrainType::Hilly)).nodes.len(), 4);
        assert_eq!(build(&inputs(TerrainType::Coastal)).nodes.len(), 2);
    }

    #[test]
    fn water_is_translucent() {
        let build = build(&inputs(TerrainType::Coastal));
        assert!(matches!(build.nodes[0].material.alpha_mode, AlphaMode::Blend));
        assert!(build.nodes[0].transform.translation.z < build.nodes[1].transform.translation.z);
    }
}
