use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    #[default]
    Day,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    #[default]
    Clear,
    Cloudy,
    Rainy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingStyle {
    Modern,
    #[default]
    Historic,
    Industrial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerrainType {
    #[default]
    Flat,
    Hilly,
    Coastal,
}

macro_rules! labelled {
    ($ty:ty { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$(<$ty>::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $(<$ty>::$variant => $label),+
                }
            }
        }
    };
}

labelled!(TimeOfDay { Day => "Day", Night => "Night" });
labelled!(Weather { Clear => "Clear", Cloudy => "Cloudy", Rainy => "Rainy" });
labelled!(BuildingStyle { Modern => "Modern", Historic => "Historic", Industrial => "Industrial" });
labelled!(TerrainType { Flat => "Flat", Hilly => "Hilly", Coastal => "Coastal" });

/// Presentation switches for the 3D view and map overlays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    pub time_of_day: TimeOfDay,
    pub weather: Weather,
    pub building_style: BuildingStyle,
    pub terrain_type: TerrainType,
    pub show_direct_path: bool,
    /// Diffraction/reflection paths over the buildings.
    pub show_paths: bool,
    pub show_path_loss: bool,
    pub show_all_coverages: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            time_of_day: TimeOfDay::Day,
            weather: Weather::Clear,
            building_style: BuildingStyle::Historic,
            terrain_type: TerrainType::Flat,
            show_direct_path: true,
            show_paths: false,
            show_path_loss: true,
            show_all_coverages: true,
        }
    }
}
