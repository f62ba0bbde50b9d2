use bevy::prelude::*;

use crate::render::{curve_through, line_strip_mesh, straight_line, Palette};

use super::buildings::Building;
use super::{Animation, LayerBuild, RevealTrack, SceneInputs, SceneNode, SceneTiming};

const DIRECT_SEGMENTS: usize = 100;
const REFLECTION_SEGMENTS: usize = 200;
const REFLECTION_PHASE: f32 = 1.0;

/// Opacity pulse shared by every propagation path.
pub fn pulse_alpha(t: f32, phase: f32) -> f32 {
    0.7 + 0.3 * (2.0 * t + phase).sin()
}

fn path_material(color: Color) -> StandardMaterial {
    StandardMaterial {
        base_color: color.with_alpha(0.7),
        alpha_mode: AlphaMode::Blend,
        unlit: true,
        ..default()
    }
}

/// Line-of-sight path plus one rooftop reflection per building, each drawn
/// progressively from the antenna tip to the mobile.
pub fn build(inputs: &SceneInputs, buildings: &[Building], timing: SceneTiming) -> LayerBuild {
    let settings = &inputs.settings;
    let tip = inputs.antenna_tip();
    let mobile = inputs.mobile_point();

    let mut nodes = Vec::new();
    let mut tracks = Vec::new();
    let mut push = |points: Vec<Vec3>, color: Color, duration: f32, phase: f32| {
        tracks.push(RevealTrack::new(nodes.len(), points, duration, phase));
        nodes.push(SceneNode::new(line_strip_mesh(&[]), path_material(color), Transform::IDENTITY));
    };

    if settings.show_direct_path {
        push(
            straight_line(tip, mobile, DIRECT_SEGMENTS),
            inputs.antenna_color.to_color(),
            timing.direct_path_secs,
            0.0,
        );
    }
    if settings.show_paths {
        let color = Palette::new(settings.time_of_day).reflection_path();
        for building in buildings {
            push(
                curve_through(tip, building.rooftop(), mobile, REFLECTION_SEGMENTS),
                color,
                timing.reflection_path_secs,
                REFLECTION_PHASE,
            );
        }
    }

    if nodes.is_empty() {
        return LayerBuild::default();
    }
    LayerBuild { nodes, animation: Animation::Reveal(tracks) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::path_loss::Environment;
    use crate::session::SceneSettings;
    use crate::station::DisplayColor;

    fn inputs(direct: bool, reflections: bool) -> SceneInputs {
        SceneInputs {
            settings: SceneSettings {
                show_direct_path: direct,
                show_paths: reflections,
                ..default()
            },
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

    fn city() -> Vec<Building> {
        (0..3)
            .map(|i| Building { id: i, base: Vec3::new(i as f32 * 40.0, 0.0, 10.0), height: 30.0 })
            .collect()
    }

    #[test]
    fn toggles_select_paths() {
        let timing = SceneTiming::default();
        assert_eq!(build(&inputs(true, false), &city(), timing).nodes.len(), 1);
        assert_eq!(build(&inputs(true, true), &city(), timing).nodes.len(), 4);
        assert_eq!(build(&inputs(false, true), &city(), timing).nodes.len(), 3);
        let none = build(&inputs(false, false), &city(), timing);
        assert!(none.nodes.is_empty());
        assert!(matches!(none.animation, Animation::Still));
    }

    #[test]
    fn reflections_bounce_off_rooftops() {
        let city = city();
        let build = build(&inputs(true, true), &city, SceneTiming::default());
        let Animation::Reveal(tracks) = &build.animation else {
            panic!("expected reveal animation");
        };
        let direct = &tracks[0];
        assert_eq!(direct.points.len(), DIRECT_SEGMENTS + 1);
        assert_eq!(direct.duration, 7.0);
        for (track, building) in tracks[1..].iter().zip(&city) {
            assert_eq!(track.points.len(), REFLECTION_SEGMENTS + 1);
            assert!(track.points[REFLECTION_SEGMENTS / 2].distance(building.rooftop()) < 1e-2);
            assert_eq!(track.phase, REFLECTION_PHASE);
        }
    }

    #[test]
    fn pulse_stays_in_range() {
        for i in 0..200 {
            let a = pulse_alpha(i as f32 * 0.05, 1.0);
            assert!((0.39..=1.01).contains(&a));
        }
    }
}
