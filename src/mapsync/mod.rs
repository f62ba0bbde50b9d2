use std::future::Future;

use bevy::prelude::*;
use thiserror::Error;

use crate::geo::{self, LatLon};
use crate::session::{MapView, SessionError, SimulationSession, CURRENT_LOCATION};
use crate::station::{AntennaId, AntennaUpdate, DisplayColor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerId {
    Antenna(AntennaId),
    Mobile,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: MarkerId,
    pub position: LatLon,
    pub label: String,
    pub color: DisplayColor,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageCircle {
    pub antenna_id: AntennaId,
    pub center: LatLon,
    pub radius_m: f64,
    pub color: DisplayColor,
}

/// Antenna to mobile polyline with its length.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkLine {
    pub antenna_id: AntennaId,
    pub from: LatLon,
    pub to: LatLon,
    pub distance_km: f64,
    pub color: DisplayColor,
}

/// Everything drawn on top of the map tiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlays {
    pub markers: Vec<Marker>,
    pub circles: Vec<CoverageCircle>,
    pub links: Vec<LinkLine>,
}

impl Overlays {
    pub fn from_session(session: &SimulationSession) -> Self {
        let selected = session.selected_id();
        let mobile = session.mobile().position;

        let mut markers: Vec<Marker> = session
            .antennas()
            .iter()
            .map(|a| Marker {
                id: MarkerId::Antenna(a.id),
                position: a.position,
                label: a.name.clone(),
                color: a.color,
                selected: a.id == selected,
            })
            .collect();
        markers.push(Marker {
            id: MarkerId::Mobile,
            position: mobile,
            label: "Mobile Station".to_string(),
            color: DisplayColor::MOBILE_BLUE,
            selected: false,
        });

        let show_all = session.settings.show_all_coverages;
        let circles = session
            .antennas()
            .iter()
            .filter(|a| show_all || a.id == selected)
            .filter_map(|a| {
                let score = if a.id == selected { Some(session.score()) } else { session.coverage(a.id) }?;
                (score.coverage_radius > 0.0).then(|| CoverageCircle {
                    antenna_id: a.id,
                    center: a.position,
                    radius_m: score.coverage_radius,
                    color: a.color,
                })
            })
            .collect();

        let links = session
            .antennas()
            .iter()
            .map(|a| LinkLine {
                antenna_id: a.id,
                from: a.position,
                to: mobile,
                distance_km: geo::distance_km(a.position, mobile),
                color: a.color,
            })
            .collect();

        Self { markers, circles, links }
    }

    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }
}

/// A tile map that shows draggable markers and overlays.
pub trait MapWidget {
    fn set_view(&mut self, view: MapView);
    fn set_overlays(&mut self, overlays: Overlays);
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum GeolocationError {
    #[error("location permission denied")]
    Denied,
    #[error("position unavailable")]
    Unavailable,
}

/// One-shot position lookup.
pub trait Geolocator: Send + Sync {
    fn locate(&self) -> impl Future<Output = Result<LatLon, GeolocationError>> + Send;
}

/// Answers with a configured position, or `Unavailable` when there is none.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedGeolocator {
    pub position: Option<LatLon>,
}

impl Geolocator for FixedGeolocator {
    async fn locate(&self) -> Result<LatLon, GeolocationError> {
        self.position.ok_or(GeolocationError::Unavailable)
    }
}

/// Something the user did on the map or the city selector.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    MarkerDragged { id: MarkerId, position: LatLon },
    MarkerClicked(MarkerId),
    CitySelected(String),
    Located(Result<LatLon, GeolocationError>),
}

/// Two-way binding between the session and a [`MapWidget`].
///
/// Marker edits flow into the session. The widget's view is only moved when
/// the user changes city (or a location fix arrives), so panning is never
/// overridden by ordinary position edits.
#[derive(Debug, Default, Resource)]
pub struct MapSync {
    recenter: bool,
    locate_requested: bool,
    last_overlays: Option<Overlays>,
}

impl MapSync {
    pub fn new() -> Self {
        Self { recenter: true, ..default() }
    }

    /// A binding that opens on the current-location preset and owes one
    /// geolocation lookup.
    pub fn with_startup_locate(session: &mut SimulationSession) -> Self {
        session.begin_locating();
        Self { recenter: true, locate_requested: true, ..default() }
    }

    pub fn apply_event(
        &mut self,
        session: &mut SimulationSession,
        event: MapEvent,
    ) -> Result<(), SessionError> {
        match event {
            MapEvent::MarkerDragged { id: MarkerId::Antenna(id), position } => {
                session.update_antenna(id, AntennaUpdate::position(position))
            }
            MapEvent::MarkerDragged { id: MarkerId::Mobile, position } => {
                session.set_mobile_position(position);
                Ok(())
            }
            MapEvent::MarkerClicked(MarkerId::Antenna(id)) => session.select_antenna(id),
            MapEvent::MarkerClicked(MarkerId::Mobile) => Ok(()),
            MapEvent::CitySelected(key) if key == CURRENT_LOCATION => {
                debug!("Requesting current location");
                session.begin_locating();
                self.locate_requested = true;
                Ok(())
            }
            MapEvent::CitySelected(key) => {
                session.select_city(&key)?;
                self.recenter = true;
                Ok(())
            }
            MapEvent::Located(Ok(position)) => {
                session.set_current_location(position);
                self.recenter = true;
                Ok(())
            }
            MapEvent::Located(Err(e)) => {
                session.geolocation_failed(&e.to_string());
                self.recenter = true;
                Ok(())
            }
        }
    }

    /// Whether a geolocation lookup is owed. Clears the flag.
    pub fn take_locate_request(&mut self) -> bool {
        std::mem::take(&mut self.locate_requested)
    }

    /// Resolve a pending lookup and apply the outcome.
    pub async fn locate<G: Geolocator>(&mut self, session: &mut SimulationSession, geolocator: &G) {
        if !self.take_locate_request() {
            return;
        }
        let fix = geolocator.locate().await;
        // Located events never fail.
        let _ = self.apply_event(session, MapEvent::Located(fix));
    }

    /// Send the current view (if it should move) and changed overlays to the widget.
    pub fn push<W: MapWidget>(&mut self, session: &SimulationSession, widget: &mut W) {
        if std::mem::take(&mut self.recenter) {
            widget.set_view(session.map_view());
        }
        let overlays = Overlays::from_session(session);
        if self.last_overlays.as_ref() != Some(&overlays) {
            widget.set_overlays(overlays.clone());
            self.last_overlays = Some(overlays);
        }
    }
}
