use bevy::prelude::*;

use bevy::render::render_resource::PrimitiveTopology;
use bevy::render::render_asset::RenderAssetUsages;

use crate::session::{BuildingStyle, TimeOfDay};

/// Loss at which the ramp is fully green.
pub const RAMP_MIN_DB: f64 = 80.0;
/// Loss at which the ramp is fully red.
pub const RAMP_MAX_DB: f64 = 150.0;

/// Upper half of an ellipsoid: `radius` across, `height` tall, flat base on y = 0.
pub fn dome_mesh(radius: f32, height: f32, sectors: usize, stacks: usize) -> Mesh {
    let sectors = sectors.max(3);
    let stacks = stacks.max(1);

    let point = |stack: usize, sector: usize| -> [f32; 3] {
        if stack == stacks {
            return [0.0, height, 0.0];
        }
        let polar = std::f32::consts::FRAC_PI_2 * stack as f32 / stacks as f32;
        let azimuth = std::f32::consts::TAU * sector as f32 / sectors as f32;
        let ring = radius * polar.cos();
        [ring * azimuth.cos(), height * polar.sin(), ring * azimuth.sin()]
    };

    let mut positions = Vec::with_capacity(stacks * sectors * 6);
    for stack in 0..stacks {
        for sector in 0..sectors {
            let p00 = point(stack, sector);
            let p01 = point(stack, sector + 1);
            let p10 = point(stack + 1, sector);
            let p11 = point(stack + 1, sector + 1);

            // CCW seen from outside; the top ring closes on the apex.
            if stack + 1 == stacks {
                positions.extend_from_slice(&[p00, p10, p01]);
            } else {
                positions.extend_from_slice(&[p00, p10, p11, p00, p11, p01]);
            }
        }
    }

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.compute_flat_normals();
    mesh
}

/// Open polyline. Fewer than two points yields a degenerate segment so the
/// vertex buffer is never empty.
pub fn line_strip_mesh(points: &[Vec3]) -> Mesh {
    let mut positions: Vec<[f32; 3]> = points.iter().map(|p| p.to_array()).collect();
    match positions.len() {
        0 => positions = vec![[0.0; 3]; 2],
        1 => positions.push(positions[0]),
        _ => {}
    }
    let normals = vec![[0.0, 1.0, 0.0]; positions.len()];

    let mut mesh = Mesh::new(PrimitiveTopology::LineStrip, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh
}

/// Short vertical segments hanging below each point (rain streaks).
pub fn streaks_mesh(points: &[Vec3], length: f32) -> Mesh {
    let mut positions = Vec::with_capacity(points.len().max(1) * 2);
    for p in points {
        positions.push(p.to_array());
        positions.push([p.x, p.y - length, p.z]);
    }
    if positions.is_empty() {
        positions = vec![[0.0; 3]; 2];
    }
    let normals = vec![[0.0, 1.0, 0.0]; positions.len()];

    let mut mesh = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh
}

/// Axis-aligned rectangle lying on a building face.
#[derive(Debug, Clone, Copy)]
pub struct Facet {
    pub center: Vec3,
    /// Outward face normal; must be ±X or ±Z.
    pub normal: Vec3,
    pub width: f32,
    pub height: f32,
}

/// All facets in one flat-shaded triangle list.
pub fn facets_mesh(facets: &[Facet]) -> Mesh {
    let mut positions = Vec::with_capacity(facets.len() * 6);
    let mut normals = Vec::with_capacity(facets.len() * 6);
    for f in facets {
        let right = Vec3::Y.cross(f.normal).normalize_or_zero() * (f.width / 2.0);
        let up = Vec3::Y * (f.height / 2.0);
        let bl = f.center - right - up;
        let br = f.center + right - up;
        let tl = f.center - right + up;
        let tr = f.center + right + up;
        for p in [bl, br, tr, bl, tr, tl] {
            positions.push(p.to_array());
            normals.push(f.normal.to_array());
        }
    }

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh
}

/// Quadratic Bézier from `a` to `b` that passes through `via` at its midpoint.
pub fn curve_through(a: Vec3, via: Vec3, b: Vec3, segments: usize) -> Vec<Vec3> {
    let ctrl = via * 2.0 - (a + b) * 0.5;
    (0..=segments)
        .map(|i| {
            let t = i as f32 / segments.max(1) as f32;
            let u = 1.0 - t;
            a * (u * u) + ctrl * (2.0 * u * t) + b * (t * t)
        })
        .collect()
}

pub fn straight_line(a: Vec3, b: Vec3, segments: usize) -> Vec<Vec3> {
    (0..=segments)
        .map(|i| a.lerp(b, i as f32 / segments.max(1) as f32))
        .collect()
}

/// Green at 80 dB through to red at 150 dB.
pub fn loss_color(loss_db: f64) -> Color {
    let t = ((loss_db - RAMP_MIN_DB) / (RAMP_MAX_DB - RAMP_MIN_DB)).clamp(0.0, 1.0) as f32;
    Color::srgb(t, 1.0 - t, 0.0)
}

/// `power1.inOut` easing.
pub fn ease_in_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Colours that change between day and night.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub time: TimeOfDay,
}

impl Palette {
    pub fn new(time: TimeOfDay) -> Self {
        Self { time }
    }

    fn pick(&self, day: Color, night: Color) -> Color {
        match self.time {
            TimeOfDay::Day => day,
            TimeOfDay::Night => night,
        }
    }

    pub fn sky(&self) -> Color {
        self.pick(Color::srgb_u8(0x87, 0xce, 0xeb), Color::srgb_u8(0x0b, 0x10, 0x26))
    }

    pub fn ground(&self) -> Color {
        self.pick(Color::srgb_u8(0x6b, 0x72, 0x80), Color::srgb_u8(0x37, 0x41, 0x51))
    }

    pub fn hill(&self) -> Color {
        self.pick(Color::srgb_u8(0x4b, 0x78, 0x4b), Color::srgb_u8(0x1e, 0x3a, 0x1e))
    }

    pub fn water(&self) -> Color {
        self.pick(Color::srgb_u8(0x00, 0x77, 0xbe), Color::srgb_u8(0x0a, 0x3b, 0x5e))
    }

    pub fn beach(&self) -> Color {
        self.pick(Color::srgb_u8(0xf0, 0xe6, 0x8c), Color::srgb_u8(0x8b, 0x7e, 0x4e))
    }

    pub fn building(&self, style: BuildingStyle) -> Color {
        match style {
            BuildingStyle::Historic => self.pick(Color::srgb_u8(0xd2, 0xb4, 0x8c), Color::srgb_u8(0x8b, 0x73, 0x55)),
            BuildingStyle::Industrial => self.pick(Color::srgb_u8(0xa9, 0xa9, 0xa9), Color::srgb_u8(0x69, 0x69, 0x69)),
            BuildingStyle::Modern => self.pick(Color::srgb_u8(0x64, 0x74, 0x8b), Color::srgb_u8(0x33, 0x41, 0x55)),
        }
    }

    pub fn roof(&self) -> Color {
        Color::srgb_u8(0x8b, 0x45, 0x13)
    }

    pub fn window(&self) -> Color {
        self.pick(Color::srgb_u8(0xa5, 0xf3, 0xfc), Color::srgb_u8(0x0c, 0x4a, 0x6e))
    }

    /// Lit windows at night, none by day.
    pub fn window_glow(&self) -> LinearRgba {
        match self.time {
            TimeOfDay::Day => LinearRgba::BLACK,
            TimeOfDay::Night => Color::srgb_u8(0x22, 0xd3, 0xee).to_linear() * 0.5,
        }
    }

    pub fn cloud(&self) -> Color {
        self.pick(Color::srgb_u8(0xdd, 0xdd, 0xdd), Color::srgb_u8(0x55, 0x55, 0x55))
    }

    pub fn rain(&self) -> Color {
        self.pick(Color::srgb_u8(0xa0, 0xb4, 0xc8), Color::srgb_u8(0x60, 0x70, 0x80))
    }

    pub fn tower(&self) -> Color {
        self.pick(Color::srgb_u8(0x64, 0x74, 0x8b), Color::srgb_u8(0x33, 0x41, 0x55))
    }

    pub fn reflection_path(&self) -> Color {
        Color::srgb_u8(0x22, 0xc5, 0x5e)
    }
}
