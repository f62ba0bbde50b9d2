use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geo::LatLon;
use crate::params::ParameterSet;

pub type AntennaId = u32;

/// sRGB display colour carried by an antenna (markers, coverage circle, tower tip).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl DisplayColor {
    /// Tailwind red-500, the first base station's colour.
    pub const RED: DisplayColor = DisplayColor { r: 0xef, g: 0x44, b: 0x44 };
    pub const MOBILE_BLUE: DisplayColor = DisplayColor { r: 0x3b, g: 0x82, b: 0xf6 };

    pub fn from_hsl(hue_deg: f32, saturation: f32, lightness: f32) -> Self {
        let srgba = Color::hsl(hue_deg.rem_euclid(360.0), saturation, lightness).to_srgba();
        Self {
            r: (srgba.red.clamp(0.0, 1.0) * 255.0).round() as u8,
            g: (srgba.green.clamp(0.0, 1.0) * 255.0).round() as u8,
            b: (srgba.blue.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }

    pub fn to_color(self) -> Color {
        Color::srgb_u8(self.r, self.g, self.b)
    }
}

/// A simulated base station.
///
/// The assigned model is remembered together with the last parameter set the
/// user left on every model this antenna has visited, so switching back and
/// forth never mixes keys of unrelated models.
#[derive(Debug, Clone, PartialEq)]
pub struct Antenna {
    pub id: AntennaId,
    pub position: LatLon,
    /// Mast height, metres.
    pub height: f64,
    /// Carrier, MHz.
    pub frequency: f64,
    /// Transmit power, dBm.
    pub power: f64,
    pub name: String,
    pub color: DisplayColor,
    pub model_id: Option<String>,
    pub saved_parameters: BTreeMap<String, ParameterSet>,
}

impl Antenna {
    pub fn new(id: AntennaId, position: LatLon) -> Self {
        Self {
            id,
            position,
            height: 50.0,
            frequency: 1800.0,
            power: 43.0,
            name: format!("Base Station {}", id),
            color: DisplayColor::RED,
            model_id: None,
            saved_parameters: BTreeMap::new(),
        }
    }

    /// Parameters saved for the currently assigned model, if any.
    pub fn saved_for_current_model(&self) -> Option<&ParameterSet> {
        self.model_id
            .as_deref()
            .and_then(|model| self.saved_parameters.get(model))
    }

    pub fn apply(&mut self, update: AntennaUpdate) {
        let AntennaUpdate {
            position,
            height,
            frequency,
            power,
            name,
            color,
            model_id,
            saved_parameters,
        } = update;
        if let Some(v) = position {
            self.position = v;
        }
        if let Some(v) = height {
            self.height = v;
        }
        if let Some(v) = frequency {
            self.frequency = v;
        }
        if let Some(v) = power {
            self.power = v;
        }
        if let Some(v) = name {
            self.name = v;
        }
        if let Some(v) = color {
            self.color = v;
        }
        if let Some(v) = model_id {
            self.model_id = v;
        }
        if let Some(v) = saved_parameters {
            self.saved_parameters = v;
        }
    }
}

/// Shallow partial update for [`Antenna`]. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AntennaUpdate {
    pub position: Option<LatLon>,
    pub height: Option<f64>,
    pub frequency: Option<f64>,
    pub power: Option<f64>,
    pub name: Option<String>,
    pub color: Option<DisplayColor>,
    pub model_id: Option<Option<String>>,
    pub saved_parameters: Option<BTreeMap<String, ParameterSet>>,
}

impl AntennaUpdate {
    pub fn position(position: LatLon) -> Self {
        Self { position: Some(position), ..Default::default() }
    }

    pub fn height(height: f64) -> Self {
        Self { height: Some(height), ..Default::default() }
    }

    pub fn frequency(frequency: f64) -> Self {
        Self { frequency: Some(frequency), ..Default::default() }
    }

    pub fn power(power: f64) -> Self {
        Self { power: Some(power), ..Default::default() }
    }
}

/// The single mobile receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MobileStation {
    pub position: LatLon,
}
