use std::f64::consts::PI;

use serde::{Serialize, Deserialize};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Equatorial radius of the spherical Web Mercator projection.
pub const MERCATOR_RADIUS_M: f64 = 6378137.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Shift by a raw number of degrees on each axis.
    pub fn offset_deg(self, d_lat: f64, d_lon: f64) -> Self {
        Self {
            latitude: self.latitude + d_lat,
            longitude: self.longitude + d_lon,
        }
    }
}

impl From<(f64, f64)> for LatLon {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self { latitude, longitude }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WebMercator {
    pub x: f64,
    pub y: f64,
}

/// Haversine great-circle distance in kilometres.
pub fn distance_km(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial bearing from `a` to `b`, degrees clockwise from north in (-180, 180].
pub fn bearing_deg(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees()
}

/// Convert Lat/Lon (WGS84) to Web Mercator (EPSG:3857).
/// Used by the map panel, which draws on a slippy-map style plane.
pub fn latlon_to_webmercator(coord: LatLon) -> WebMercator {
    let x = coord.longitude * (PI / 180.0) * MERCATOR_RADIUS_M;
    let y = ((coord.latitude * PI / 360.0 + PI / 4.0).tan()).ln() * MERCATOR_RADIUS_M;
    WebMercator { x, y }
}

/// Convert Web Mercator (EPSG:3857) to Lat/Lon (WGS84)
pub fn webmercator_to_latlon(coord: WebMercator) -> LatLon {
    let longitude = (coord.x / MERCATOR_RADIUS_M) * (180.0 / PI);
    let latitude = (2.0 * (coord.y / MERCATOR_RADIUS_M).exp().atan() - PI / 2.0) * (180.0 / PI);
    LatLon { latitude, longitude }
}

/// Mercator stretch at a given latitude. Divide projected lengths by this
/// to get ground metres.
pub fn get_scale_factor_at_lat(latitude: f64) -> f64 {
    1.0 / latitude.to_radians().cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric_and_zero_on_self() {
        let pts = [
            LatLon::new(33.2347, -8.5027),
            LatLon::new(-45.0, 170.0),
            LatLon::new(89.9, 0.0),
            LatLon::new(0.0, -179.9),
        ];
        for a in pts {
            assert_eq!(distance_km(a, a), 0.0);
            for b in pts {
                assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = distance_km(LatLon::new(0.0, 0.0), LatLon::new(1.0, 0.0));
        // 2 * pi * 6371 / 360
        assert!((d - 111.195).abs() < 0.01);
    }

    #[test]
    fn antipodal_points_do_not_produce_nan() {
        let d = distance_km(LatLon::new(0.0, 0.0), LatLon::new(0.0, 180.0));
        assert!((d - PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn bearing_due_east_at_equator() {
        let b = bearing_deg(LatLon::new(0.0, 0.0), LatLon::new(0.0, 1.0));
        assert!((b - 90.0).abs() < 1e-9);
    }

    #[test]
    fn mercator_round_trip() {
        let p = LatLon::new(33.5731, -7.5898);
        let back = webmercator_to_latlon(latlon_to_webmercator(p));
        assert!((back.latitude - p.latitude).abs() < 1e-9);
        assert!((back.longitude - p.longitude).abs() < 1e-9);
    }
}
