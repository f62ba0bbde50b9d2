use bevy::prelude::*;

use crate::render::Palette;
use crate::station::DisplayColor;

use super::{LayerBuild, SceneInputs, SceneNode, STATION_OFFSET};

const GROUND_SIZE: f32 = 500.0;
const TOWER_WIDTH: f32 = 4.0;

/// Ground plane, base-station mast with its emitting tip, and the mobile user.
pub fn build(inputs: &SceneInputs) -> LayerBuild {
    let palette = Palette::new(inputs.settings.time_of_day);
    let height = inputs.antenna_height.max(1.0) as f32;
    let tip_color = inputs.antenna_color.to_color();
    let mobile_color = DisplayColor::MOBILE_BLUE.to_color();

    let ground = SceneNode::new(
        Mesh::from(Plane3d::default().mesh().size(GROUND_SIZE, GROUND_SIZE)),
        StandardMaterial {
            base_color: palette.ground(),
            perceptual_roughness: 0.9,
            ..default()
        },
        Transform::IDENTITY,
    );
    let tower = SceneNode::new(
        Mesh::from(Cuboid::new(TOWER_WIDTH, height, TOWER_WIDTH)),
        StandardMaterial {
            base_color: palette.tower(),
            metallic: 0.6,
            perceptual_roughness: 0.4,
            ..default()
        },
        Transform::from_xyz(STATION_OFFSET, height / 2.0, 0.0),
    );
    let tip = SceneNode::new(
        Mesh::from(Cylinder::new(1.0, 4.0)),
        StandardMaterial {
            base_color: tip_color,
            emissive: tip_color.to_linear() * 0.5,
            ..default()
        },
        Transform::from_translation(inputs.antenna_tip()),
    );
    let mobile = SceneNode::new(
        Mesh::from(Cuboid::new(2.0, 4.0, 1.0)),
        StandardMaterial {
            base_color: mobile_color,
            emissive: mobile_color.to_linear() * 0.3,
            ..default()
        },
        Transform::from_xyz(-STATION_OFFSET, inputs.mobile_height as f32 + 2.0, 0.0),
    );

    LayerBuild { nodes: vec![ground, tower, tip, mobile], ..default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::path_loss::Environment;
    use crate::session::SceneSettings;

    #[test]
    fn mast_matches_antenna_height() {
        let inputs = SceneInputs {
            settings: SceneSettings::default(),
            distance_km: 1.0,
            environment: Environment::Urban,
            antenna_id: 1,
            antenna_height: 45.0,
            antenna_frequency: 1800.0,
            antenna_color: DisplayColor::RED,
            mobile_height: 1.5,
            loss: 0.0,
        };
        let build = build(&inputs);
        assert_eq!(build.nodes.len(), 4);
        let tower = &build.nodes[1].transform;
        assert_eq!(tower.translation, Vec3::new(STATION_OFFSET, 22.5, 0.0));
        let tip = &build.nodes[2];
        assert_eq!(tip.transform.translation.y, 47.0);
        assert_eq!(tip.material.base_color, DisplayColor::RED.to_color());
        assert!(build.nodes[3].transform.translation.x < 0.0);
    }
}
