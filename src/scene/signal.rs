use bevy::prelude::*;

use crate::physics::path_loss::cost231_path_loss;
use crate::render::{loss_color, RAMP_MAX_DB, RAMP_MIN_DB};

use super::{LayerBuild, SceneInputs, SceneNode};

pub const GRADIENT_STEPS: usize = 20;
pub const LEGEND_SEGMENTS: usize = 10;
const LEGEND_WIDTH: f32 = 50.0;
const LEGEND_HEIGHT: f32 = 80.0;

fn glowing(color: Color, alpha: f32) -> StandardMaterial {
    StandardMaterial {
        base_color: color.with_alpha(alpha),
        emissive: color.to_linear() * 0.4,
        alpha_mode: AlphaMode::Blend,
        ..default()
    }
}

/// Loss indicator at the mobile, a loss gradient along the link and a colour legend.
pub fn build(inputs: &SceneInputs) -> LayerBuild {
    if !inputs.settings.show_path_loss {
        return LayerBuild::default();
    }

    let mut nodes = Vec::with_capacity(1 + GRADIENT_STEPS + LEGEND_SEGMENTS);
    let mobile = inputs.mobile_point();
    nodes.push(SceneNode::new(
        Mesh::from(Sphere::new(3.0).mesh().uv(16, 12)),
        glowing(loss_color(inputs.loss), 0.7),
        Transform::from_xyz(mobile.x, inputs.mobile_height as f32, mobile.z),
    ));

    let tip = inputs.antenna_tip();
    for (i, loss) in gradient_losses(inputs).into_iter().enumerate() {
        let t = i as f32 / GRADIENT_STEPS as f32;
        nodes.push(SceneNode::new(
            Mesh::from(Sphere::new(1.5).mesh().uv(8, 6)),
            glowing(loss_color(loss), 0.6),
            Transform::from_translation(tip.lerp(mobile, t)),
        ));
    }

    let segment = LEGEND_WIDTH / LEGEND_SEGMENTS as f32;
    for i in 0..LEGEND_SEGMENTS {
        let loss = legend_loss(i);
        let x = -LEGEND_WIDTH / 2.0 + segment * (i as f32 + 0.5);
        nodes.push(SceneNode::new(
            Mesh::from(Cuboid::new(segment, 3.0, 1.0)),
            StandardMaterial { base_color: loss_color(loss), unlit: true, ..default() },
            Transform::from_xyz(x, LEGEND_HEIGHT, 0.0),
        ));
    }

    LayerBuild { nodes, ..default() }
}

/// COST-231 loss at evenly spaced fractions of the link, antenna side first.
pub fn gradient_losses(inputs: &SceneInputs) -> Vec<f64> {
    (0..GRADIENT_STEPS)
        .map(|i| {
            // the first sample sits 1 m out to keep log10 finite
            let d = (inputs.distance_km * i as f64 / GRADIENT_STEPS as f64).max(0.001);
            cost231_path_loss(
                inputs.antenna_frequency,
                inputs.antenna_height,
                inputs.mobile_height,
                d,
                inputs.environment,
            )
        })
        .collect()
}

pub fn legend_loss(segment: usize) -> f64 {
    RAMP_MIN_DB + segment as f64 / LEGEND_SEGMENTS as f64 * (RAMP_MAX_DB - RAMP_MIN_DB)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::path_loss::Environment;
    use crate::session::SceneSettings;
    use crate::station::DisplayColor;

    fn inputs(show: bool) -> SceneInputs {
        SceneInputs {
            settings: SceneSettings { show_path_loss: show, ..default() },
            distance_km: 2.0,
            environment: Environment::Urban,
            antenna_id: 1,
            antenna_height: 50.0,
            antenna_frequency: 1800.0,
            antenna_color: DisplayColor::RED,
            mobile_height: 1.5,
            loss: 130.0,
        }
    }

    #[test]
    fn hidden_when_switched_off() {
        assert!(build(&inputs(false)).nodes.is_empty());
        assert_eq!(build(&inputs(true)).nodes.len(), 1 + GRADIENT_STEPS + LEGEND_SEGMENTS);
    }

    #[test]
    fn gradient_grows_with_distance() {
        let losses = gradient_losses(&inputs(true));
        assert_eq!(losses.len(), GRADIENT_STEPS);
        assert!(losses.iter().all(|l| l.is_finite()));
        assert!(losses.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn legend_spans_the_ramp() {
        assert_eq!(legend_loss(0), 80.0);
        assert_eq!(legend_loss(5), 115.0);
        assert!(legend_loss(LEGEND_SEGMENTS - 1) < RAMP_MAX_DB);
    }
}
