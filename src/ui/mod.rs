use bevy::input::mouse::{MouseMotion, MouseWheel};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::{egui, EguiContexts};

use crate::geo::{self, LatLon, MERCATOR_RADIUS_M};
use crate::mapsync::{MapEvent, MapWidget, MarkerId, Overlays};
use crate::params::Parameter;
use crate::session::{
    BuildingStyle, MapView, Notice, NoticeLevel, SimulationSession, TerrainType, TimeOfDay, Weather,
    CURRENT_LOCATION,
};
use crate::station::{AntennaUpdate, DisplayColor};

/// Free camera over the procedural scene.
#[derive(Resource)]
pub struct CameraController {
    pub move_speed: f32,
    pub orbit_speed: f32,
    pub min_height: f32,
    pub max_height: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self {
            move_speed: 200.0,
            orbit_speed: 0.005,
            min_height: 20.0,
            max_height: 3000.0,
        }
    }
}

/// Where the camera ray through `cursor` meets the ground plane.
fn ground_hit(camera: &Camera, transform: &GlobalTransform, cursor: Vec2) -> Option<Vec3> {
    let ray = camera.viewport_to_world(transform, cursor).ok()?;
    if ray.direction.y.abs() < 1e-6 {
        return None;
    }
    let t = -ray.origin.y / ray.direction.y;
    (t > 0.0).then(|| ray.origin + ray.direction * t)
}

pub fn camera_control_system(
    controller: Res<CameraController>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    mut mouse_motion: EventReader<MouseMotion>,
    mut scroll_evr: EventReader<MouseWheel>,
    time: Res<Time>,
    mut query: Query<(&mut Transform, &GlobalTransform, &Camera)>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut contexts: EguiContexts,
) {
    let Some(ctx) = contexts.try_ctx_mut() else {
        return;
    };
    if ctx.wants_pointer_input() || ctx.wants_keyboard_input() {
        mouse_motion.clear();
        scroll_evr.clear();
        return;
    }
    let Ok((mut cam, cam_global, camera)) = query.get_single_mut() else {
        return;
    };

    // zoom towards the point under the cursor
    let scroll: f32 = scroll_evr.read().map(|ev| ev.y).sum();
    if scroll != 0.0 {
        let new_y = (cam.translation.y * (1.0 - scroll * 0.1))
            .clamp(controller.min_height, controller.max_height);
        let scale = new_y / cam.translation.y;
        let focus = windows
            .get_single()
            .ok()
            .and_then(|w| w.cursor_position())
            .and_then(|c| ground_hit(camera, cam_global, c));
        match focus {
            Some(focus) => cam.translation = focus + (cam.translation - focus) * scale,
            None => cam.translation.y = new_y,
        }
    }

    let pan_speed = controller.move_speed * time.delta_secs() * (cam.translation.y / 200.0);
    let forward = Vec3::new(cam.forward().x, 0.0, cam.forward().z).normalize_or_zero();
    let right = Vec3::new(cam.right().x, 0.0, cam.right().z).normalize_or_zero();
    let mut delta = Vec3::ZERO;
    if keyboard.pressed(KeyCode::ArrowUp) || keyboard.pressed(KeyCode::KeyW) {
        delta += forward * pan_speed;
    }
    if keyboard.pressed(KeyCode::ArrowDown) || keyboard.pressed(KeyCode::KeyS) {
        delta -= forward * pan_speed;
    }
    if keyboard.pressed(KeyCode::ArrowLeft) || keyboard.pressed(KeyCode::KeyA) {
        delta -= right * pan_speed;
    }
    if keyboard.pressed(KeyCode::ArrowRight) || keyboard.pressed(KeyCode::KeyD) {
        delta += right * pan_speed;
    }

    if mouse_button.pressed(MouseButton::Left) {
        let drag_sensitivity = cam.translation.y * 0.002;
        for ev in mouse_motion.read() {
            delta -= right * ev.delta.x * drag_sensitivity;
            delta += forward * ev.delta.y * drag_sensitivity;
        }
    } else if mouse_button.pressed(MouseButton::Right) {
        // orbit around the ground point in the middle of the view
        let pivot = Vec3::new(cam.translation.x, 0.0, cam.translation.z) + forward * cam.translation.y;
        let yaw: f32 = mouse_motion.read().map(|ev| -ev.delta.x).sum::<f32>() * controller.orbit_speed;
        cam.rotate_around(pivot, Quat::from_rotation_y(yaw));
    } else {
        mouse_motion.clear();
    }

    cam.translation += delta;
}

// ---- map panel ----

const TILE_SIZE: f64 = 256.0;
const MIN_ZOOM: u8 = 3;
const MAX_ZOOM: u8 = 18;
const MARKER_RADIUS: f32 = 7.0;

fn pixels_per_mercator_metre(zoom: u8) -> f64 {
    TILE_SIZE * 2f64.powi(i32::from(zoom)) / (2.0 * std::f64::consts::PI * MERCATOR_RADIUS_M)
}

/// Screen offset of `p` from the view centre, y down.
pub fn project(view: MapView, p: LatLon) -> egui::Vec2 {
    let c = geo::latlon_to_webmercator(view.center);
    let m = geo::latlon_to_webmercator(p);
    let s = pixels_per_mercator_metre(view.zoom);
    egui::vec2(((m.x - c.x) * s) as f32, (-(m.y - c.y) * s) as f32)
}

pub fn unproject(view: MapView, offset: egui::Vec2) -> LatLon {
    let c = geo::latlon_to_webmercator(view.center);
    let s = pixels_per_mercator_metre(view.zoom);
    geo::webmercator_to_latlon(geo::WebMercator {
        x: c.x + f64::from(offset.x) / s,
        y: c.y - f64::from(offset.y) / s,
    })
}

/// On-screen radius of a ground distance drawn at `latitude`.
pub fn ground_radius_px(view: MapView, latitude: f64, radius_m: f64) -> f32 {
    (radius_m * pixels_per_mercator_metre(view.zoom) * geo::get_scale_factor_at_lat(latitude)) as f32
}

fn color32(c: DisplayColor, alpha: u8) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(c.r, c.g, c.b, alpha)
}

/// Draggable-marker map drawn with egui. User actions are queued as
/// [`MapEvent`]s for the binding to collect.
#[derive(Resource, Debug)]
pub struct MapPanel {
    pub view: MapView,
    overlays: Overlays,
    events: Vec<MapEvent>,
    dragging: Option<(MarkerId, LatLon)>,
}

impl Default for MapPanel {
    fn default() -> Self {
        Self {
            view: MapView { center: LatLon::default(), zoom: 13 },
            overlays: Overlays::default(),
            events: Vec::new(),
            dragging: None,
        }
    }
}

impl MapWidget for MapPanel {
    fn set_view(&mut self, view: MapView) {
        self.view = view;
    }

    fn set_overlays(&mut self, overlays: Overlays) {
        self.overlays = overlays;
    }
}

impl MapPanel {
    pub fn take_events(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn push_event(&mut self, event: MapEvent) {
        self.events.push(event);
    }

    /// Topmost marker within reach of `offset`.
    pub fn marker_at(&self, offset: egui::Vec2) -> Option<MarkerId> {
        self.overlays
            .markers
            .iter()
            .rev()
            .find(|m| (project(self.view, m.position) - offset).length() <= MARKER_RADIUS + 3.0)
            .map(|m| m.id)
    }

    fn position_of(&self, id: MarkerId, position: LatLon) -> LatLon {
        match self.dragging {
            Some((dragged, at)) if dragged == id => at,
            _ => position,
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui) {
        let size = ui.available_size();
        let (response, painter) = ui.allocate_painter(size, egui::Sense::click_and_drag());
        let rect = response.rect;
        let origin = rect.center();
        painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(0xe5, 0xe7, 0xeb));
        self.draw_grid(&painter, rect);

        let pointer = response.interact_pointer_pos().map(|p| p - origin);
        if response.drag_started() {
            if let Some(offset) = pointer {
                self.dragging = self
                    .marker_at(offset)
                    .map(|id| (id, unproject(self.view, offset)));
            }
        }
        if response.dragged() {
            match (&mut self.dragging, pointer) {
                (Some((_, at)), Some(offset)) => *at = unproject(self.view, offset),
                (None, _) => {
                    let d = response.drag_delta();
                    self.view.center = unproject(self.view, -d);
                }
                _ => {}
            }
        }
        if response.drag_stopped() {
            if let Some((id, position)) = self.dragging.take() {
                self.events.push(MapEvent::MarkerDragged { id, position });
            }
        }
        if response.clicked() {
            if let Some(id) = pointer.and_then(|offset| self.marker_at(offset)) {
                self.events.push(MapEvent::MarkerClicked(id));
            }
        }
        if response.hovered() {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll > 0.0 {
                self.view.zoom = (self.view.zoom + 1).min(MAX_ZOOM);
            } else if scroll < 0.0 {
                self.view.zoom = self.view.zoom.saturating_sub(1).max(MIN_ZOOM);
            }
        }

        let to_screen = |p: LatLon| origin + project(self.view, p);

        for circle in &self.overlays.circles {
            let r = ground_radius_px(self.view, circle.center.latitude, circle.radius_m);
            let center = to_screen(self.position_of(MarkerId::Antenna(circle.antenna_id), circle.center));
            painter.circle(
                center,
                r,
                color32(circle.color, 40),
                egui::Stroke::new(1.5, color32(circle.color, 200)),
            );
        }
        for link in &self.overlays.links {
            let from = to_screen(self.position_of(MarkerId::Antenna(link.antenna_id), link.from));
            let to = to_screen(self.position_of(MarkerId::Mobile, link.to));
            painter.line_segment([from, to], egui::Stroke::new(2.0, color32(link.color, 180)));
            painter.text(
                from + (to - from) * 0.5,
                egui::Align2::CENTER_BOTTOM,
                format!("{:.2} km", link.distance_km),
                egui::FontId::proportional(11.0),
                egui::Color32::BLACK,
            );
        }
        for marker in &self.overlays.markers {
            let at = to_screen(self.position_of(marker.id, marker.position));
            let stroke = if marker.selected {
                egui::Stroke::new(3.0, egui::Color32::BLACK)
            } else {
                egui::Stroke::new(1.0, egui::Color32::WHITE)
            };
            painter.circle(at, MARKER_RADIUS, color32(marker.color, 255), stroke);
            painter.text(
                at - egui::vec2(0.0, MARKER_RADIUS + 2.0),
                egui::Align2::CENTER_BOTTOM,
                &marker.label,
                egui::FontId::proportional(11.0),
                egui::Color32::from_gray(30),
            );
        }
    }

    fn draw_grid(&self, painter: &egui::Painter, rect: egui::Rect) {
        let stroke = egui::Stroke::new(0.5, egui::Color32::from_gray(200));
        let spacing = TILE_SIZE as f32;
        let shift = project(self.view, LatLon::new(0.0, 0.0));
        let start_x = rect.center().x + shift.x.rem_euclid(spacing) - spacing * (rect.width() / spacing).ceil();
        let start_y = rect.center().y + shift.y.rem_euclid(spacing) - spacing * (rect.height() / spacing).ceil();
        let mut x = start_x;
        while x < rect.right() {
            painter.line_segment([egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())], stroke);
            x += spacing;
        }
        let mut y = start_y;
        while y < rect.bottom() {
            painter.line_segment([egui::pos2(rect.left(), y), egui::pos2(rect.right(), y)], stroke);
            y += spacing;
        }
    }
}

// ---- notices ----

const NOTICE_SECS: f32 = 4.0;

/// Toasts shown for a few seconds each.
#[derive(Resource, Debug, Default)]
pub struct NoticeBoard {
    shown: Vec<(Notice, f32)>,
}

impl NoticeBoard {
    pub fn push(&mut self, notice: Notice) {
        self.shown.push((notice, NOTICE_SECS));
    }

    pub fn tick(&mut self, dt: f32) {
        for (_, left) in &mut self.shown {
            *left -= dt;
        }
        self.shown.retain(|(_, left)| *left > 0.0);
    }

    pub fn visible(&self) -> impl Iterator<Item = &Notice> {
        self.shown.iter().map(|(n, _)| n)
    }
}

// ---- control panel ----

#[derive(Resource, Debug)]
pub struct PanelState {
    pub interference_km: f64,
}

impl Default for PanelState {
    fn default() -> Self {
        Self { interference_km: 0.5 }
    }
}

fn parameter_widget(ui: &mut egui::Ui, key: &str, param: &Parameter) -> Option<crate::params::ParamValue> {
    let label = match &param.unit {
        Some(unit) => format!("{} ({})", param.display_name, unit),
        None => param.display_name.clone(),
    };
    if let Some(options) = &param.options {
        let current = param.value.to_string();
        let mut picked = current.clone();
        egui::ComboBox::from_id_salt(key)
            .selected_text(&picked)
            .show_ui(ui, |ui| {
                for option in options {
                    ui.selectable_value(&mut picked, option.clone(), option);
                }
            });
        ui.label(label);
        return (picked != current).then(|| picked.into());
    }
    let mut value = param.value.as_f64()?;
    let (lo, hi) = param.range();
    let mut slider = egui::Slider::new(&mut value, lo..=hi).text(label);
    if let Some(step) = param.step.filter(|s| *s > 0.0) {
        slider = slider.step_by(step);
    }
    ui.add(slider).changed().then(|| value.into())
}

fn labelled_combo<T: Copy + PartialEq>(
    ui: &mut egui::Ui,
    label: &str,
    value: &mut T,
    all: &[T],
    name: impl Fn(T) -> &'static str,
) -> bool {
    let before = *value;
    egui::ComboBox::from_label(label)
        .selected_text(name(*value))
        .show_ui(ui, |ui| {
            for &option in all {
                ui.selectable_value(value, option, name(option));
            }
        });
    *value != before
}

pub fn ui_panel_system(
    mut contexts: EguiContexts,
    mut session: ResMut<SimulationSession>,
    mut map: ResMut<MapPanel>,
    mut notices: ResMut<NoticeBoard>,
    mut panel: ResMut<PanelState>,
    time: Res<Time>,
) {
    let Some(ctx) = contexts.try_ctx_mut() else {
        return;
    };
    for notice in session.drain_notices() {
        notices.push(notice);
    }
    notices.tick(time.delta_secs());

    egui::SidePanel::left("controls").default_width(320.0).show(ctx, |ui| {
        egui::ScrollArea::vertical().show(ui, |ui| {
            antennas_section(ui, &mut session);
            ui.separator();
            model_section(ui, &mut session);
            ui.separator();
            scene_section(ui, &mut session, &mut map);
            ui.separator();
            readouts_section(ui, &session, &mut panel);
        });
    });

    egui::Window::new("Map")
        .default_size([420.0, 320.0])
        .anchor(egui::Align2::RIGHT_BOTTOM, [-10.0, -10.0])
        .show(ctx, |ui| map.show(ui));

    let shown: Vec<&Notice> = notices.visible().collect();
    if !shown.is_empty() {
        egui::Window::new("Notices")
            .title_bar(false)
            .anchor(egui::Align2::RIGHT_TOP, [-10.0, 10.0])
            .show(ctx, |ui| {
                for notice in shown {
                    let color = match notice.level {
                        NoticeLevel::Info => egui::Color32::from_rgb(0x16, 0xa3, 0x4a),
                        NoticeLevel::Warning => egui::Color32::from_rgb(0xdc, 0x26, 0x26),
                    };
                    ui.colored_label(color, &notice.title);
                    ui.label(&notice.message);
                }
            });
    }
}

fn antennas_section(ui: &mut egui::Ui, session: &mut SimulationSession) {
    ui.heading("Base Stations");
    let ids: Vec<(u32, String, DisplayColor)> = session
        .antennas()
        .iter()
        .map(|a| (a.id, a.name.clone(), a.color))
        .collect();
    let selected = session.selected_id();
    for (id, name, color) in ids {
        ui.horizontal(|ui| {
            ui.colored_label(color32(color, 255), "⏺");
            if ui.selectable_label(id == selected, name).clicked() && id != selected {
                if let Err(e) = session.select_antenna(id) {
                    warn!("Select failed: {}", e);
                }
            }
        });
    }
    ui.horizontal(|ui| {
        if ui.button("Add").clicked() {
            session.add_antenna();
        }
        if ui.button("Remove").clicked() {
            // rejection is reported through the notice queue
            let _ = session.remove_antenna(selected);
        }
    });

    let antenna = session.selected_antenna().clone();
    let (mut height, mut frequency, mut power) = (antenna.height, antenna.frequency, antenna.power);
    let mut update = AntennaUpdate::default();
    if ui.add(egui::Slider::new(&mut height, 10.0..=200.0).text("Height (m)")).changed() {
        update.height = Some(height);
    }
    if ui.add(egui::Slider::new(&mut frequency, 700.0..=3500.0).text("Frequency (MHz)")).changed() {
        update.frequency = Some(frequency);
    }
    if ui.add(egui::Slider::new(&mut power, 20.0..=60.0).text("Power (dBm)")).changed() {
        update.power = Some(power);
    }
    if update != AntennaUpdate::default() {
        if let Err(e) = session.update_antenna(antenna.id, update) {
            warn!("Antenna update failed: {}", e);
        }
    }
}

fn model_section(ui: &mut egui::Ui, session: &mut SimulationSession) {
    ui.heading("Propagation Model");
    if session.catalog().is_empty() {
        ui.label("Loading models…");
        return;
    }
    let antenna = session.selected_antenna().clone();
    let current = antenna.model_id.clone().unwrap_or_default();
    let mut picked = current.clone();
    let current_name = session
        .catalog()
        .get(&current)
        .map(|m| m.display_name.clone())
        .unwrap_or_else(|| "Select a model".to_string());
    egui::ComboBox::from_id_salt("model")
        .selected_text(current_name)
        .show_ui(ui, |ui| {
            for entry in session.catalog().entries() {
                ui.selectable_value(&mut picked, entry.endpoint_id.clone(), &entry.display_name);
            }
        });
    if picked != current {
        if let Err(e) = session.select_model(antenna.id, &picked) {
            warn!("Model switch failed: {}", e);
        }
    }

    let params = session.active_params().clone();
    for (key, param) in params.iter() {
        if key == "distance" {
            ui.label(format!("{}: {:.3} km", param.display_name, param.value.as_f64().unwrap_or(0.0)));
            continue;
        }
        if let Some(value) = parameter_widget(ui, key, param) {
            session.set_parameter_value(key, value);
        }
    }
}

fn scene_section(ui: &mut egui::Ui, session: &mut SimulationSession, map: &mut MapPanel) {
    ui.heading("Scene");
    let mut city = session.selected_city().unwrap_or_default().to_string();
    let before = city.clone();
    let cities: Vec<(String, String)> = session
        .cities()
        .iter()
        .map(|c| (c.key.clone(), c.name.clone()))
        .collect();
    let city_name = cities
        .iter()
        .find(|(k, _)| *k == city)
        .map(|(_, n)| n.clone())
        .unwrap_or_else(|| city.clone());
    egui::ComboBox::from_label("City")
        .selected_text(city_name)
        .show_ui(ui, |ui| {
            ui.selectable_value(&mut city, CURRENT_LOCATION.to_string(), "Current Location");
            for (key, name) in &cities {
                if key != CURRENT_LOCATION {
                    ui.selectable_value(&mut city, key.clone(), name);
                }
            }
        });
    if city != before {
        map.push_event(MapEvent::CitySelected(city));
    }

    let mut settings = session.settings;
    labelled_combo(ui, "Time of day", &mut settings.time_of_day, TimeOfDay::ALL, TimeOfDay::label);
    labelled_combo(ui, "Weather", &mut settings.weather, Weather::ALL, Weather::label);
    labelled_combo(ui, "Buildings", &mut settings.building_style, BuildingStyle::ALL, BuildingStyle::label);
    labelled_combo(ui, "Terrain", &mut settings.terrain_type, TerrainType::ALL, TerrainType::label);
    ui.checkbox(&mut settings.show_direct_path, "Direct path");
    ui.checkbox(&mut settings.show_paths, "Diffraction / reflection paths");
    ui.checkbox(&mut settings.show_path_loss, "Path loss");
    ui.checkbox(&mut settings.show_all_coverages, "All coverages");

    let coverages_turned_on = settings.show_all_coverages && !session.settings.show_all_coverages;
    session.settings = settings;
    if coverages_turned_on {
        session.request_coverages();
    }
}

fn readouts_section(ui: &mut egui::Ui, session: &SimulationSession, panel: &mut PanelState) {
    ui.heading("Link");
    let score = session.score();
    ui.label(format!("Distance: {:.3} km", session.selected_distance_km()));
    let bearing = geo::bearing_deg(session.selected_antenna().position, session.mobile().position);
    ui.label(format!("Bearing to mobile: {:.0}°", bearing.rem_euclid(360.0)));
    ui.label(format!("Path loss: {:.1} dB", score.loss));
    ui.label(format!("Coverage radius: {:.0} m", score.coverage_radius));
    ui.label(format!("Environment: {}", session.environment().label()));

    ui.collapsing("All distances", |ui| {
        for (id, km) in session.distances() {
            let name = session.antenna(id).map(|a| a.name.as_str()).unwrap_or("?");
            ui.label(format!("{}: {:.3} km", name, km));
        }
    });

    ui.add(egui::Slider::new(&mut panel.interference_km, 0.05..=5.0).text("Interference below (km)"));
    let pairs = session.interference_pairs(panel.interference_km);
    if pairs.is_empty() {
        ui.label("No interfering pairs");
    }
    for (a, b, km) in pairs {
        ui.colored_label(
            egui::Color32::from_rgb(0xea, 0x58, 0x0c),
            format!("Antennas {} and {} are {:.3} km apart", a, b, km),
        );
    }

    let metrics = session.coverage_metrics();
    ui.label(format!("Coverages computed: {}", metrics.computed));
    ui.label(format!("Cache hits: {}", metrics.cache_hits));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapsync::Marker;

    fn view() -> MapView {
        MapView { center: LatLon::new(33.2347, -8.5027), zoom: 13 }
    }

    #[test]
    fn view_center_projects_to_origin() {
        let offset = project(view(), view().center);
        assert!(offset.length() < 1e-3);
        let east = project(view(), LatLon::new(33.2347, -8.49));
        assert!(east.x > 0.0 && east.y.abs() < 1e-3);
        let north = project(view(), LatLon::new(33.25, -8.5027));
        assert!(north.y < 0.0);
    }

    #[test]
    fn unproject_inverts_project() {
        let p = LatLon::new(33.2394, -8.5211);
        let back = unproject(view(), project(view(), p));
        assert!((back.latitude - p.latitude).abs() < 1e-5);
        assert!((back.longitude - p.longitude).abs() < 1e-5);
    }

    #[test]
    fn one_kilometre_circle_matches_projected_distance() {
        let v = view();
        let r = ground_radius_px(v, v.center.latitude, 1000.0);
        // ~0.009 degrees of latitude is 1 km
        let north = project(v, v.center.offset_deg(1.0 / 111.195, 0.0));
        assert!((r - north.length()).abs() / r < 0.02);
    }

    #[test]
    fn marker_hit_test() {
        let mut panel = MapPanel { view: view(), ..default() };
        panel.set_overlays(Overlays {
            markers: vec![Marker {
                id: MarkerId::Mobile,
                position: view().center.offset_deg(0.001, 0.0),
                label: "Mobile".into(),
                color: DisplayColor::MOBILE_BLUE,
                selected: false,
            }],
            ..default()
        });
        let at = project(view(), view().center.offset_deg(0.001, 0.0));
        assert_eq!(panel.marker_at(at), Some(MarkerId::Mobile));
        assert_eq!(panel.marker_at(at + egui::vec2(40.0, 0.0)), None);
    }

    #[test]
    fn notices_expire() {
        let mut board = NoticeBoard::default();
        board.push(Notice { level: NoticeLevel::Info, title: "Added".into(), message: String::new() });
        board.tick(1.0);
        assert_eq!(board.visible().count(), 1);
        board.tick(NOTICE_SECS);
        assert_eq!(board.visible().count(), 0);
    }
}
