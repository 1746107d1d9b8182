//! Walkers-backed map widget
//!
//! The library drives a [`MapWidget`] from async tasks while egui draws from
//! the UI thread. Both sides meet in a [`Scene`]: the widget records markers,
//! the route line and camera requests into it, and each frame the app applies
//! pending camera requests to its `MapMemory` and draws the scene through a
//! walkers [`Plugin`].

use egui::{Color32, FontId, Pos2, Stroke};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use voyonx_lib::surface::{ROUTE_LINE_RGB, ROUTE_LINE_WIDTH};
use voyonx_lib::{
    CameraFit, Coordinate, FlyTo, MapWidget, MarkerSpec, MarkerStyle, PlaceId, utils,
};
use walkers::{MapMemory, Plugin, Projector};

/// Zoom cap for fits that do not set their own
const MAX_FIT_ZOOM: f64 = 18.0;

const MARKER_RADIUS: f32 = 11.0;
const USER_MARKER_RADIUS: f32 = 7.0;

/// Extra pixels around a marker that still count as a hit
const HIT_SLOP: f32 = 4.0;

/// Camera move requested by the library, applied on the next frame
#[derive(Clone, Debug, PartialEq)]
pub enum CameraCommand {
    Fit(CameraFit),
    FlyTo(FlyTo),
}

/// A click on the map, reported back to the page controller
#[derive(Clone, Debug, PartialEq)]
pub enum MapClick {
    Marker(PlaceId),
    Empty,
}

#[derive(Debug)]
pub struct Scene {
    markers: Vec<(u64, MarkerSpec)>,
    next_marker: u64,
    line: Option<Vec<Coordinate>>,
    camera: Option<CameraCommand>,
    viewport: (f32, f32),
    rendered: bool,
    zoom: f64,
    click: Option<MapClick>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            markers: Vec::new(),
            next_marker: 0,
            line: None,
            camera: None,
            viewport: (1280.0, 720.0),
            rendered: false,
            zoom: 12.0,
            click: None,
        }
    }
}

/// Shared handle to one map's scene
#[derive(Clone, Default)]
pub struct SceneHandle(Arc<Mutex<Scene>>);

impl SceneHandle {
    fn lock(&self) -> MutexGuard<'_, Scene> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A new widget drawing into this scene
    pub fn widget(&self) -> WalkersWidget {
        WalkersWidget {
            scene: self.clone(),
        }
    }

    /// A plugin drawing this scene for one frame
    pub fn plugin(&self) -> ScenePlugin {
        ScenePlugin {
            scene: self.clone(),
        }
    }

    /// Apply a pending camera request and record the current zoom.
    ///
    /// Returns whether the camera moved.
    pub fn apply_camera(&self, memory: &mut MapMemory) -> bool {
        let mut scene = self.lock();
        let moved = match scene.camera.take() {
            Some(CameraCommand::Fit(fit)) => {
                let center = fit.bounds.center();
                let max_zoom = fit.options.max_zoom.unwrap_or(MAX_FIT_ZOOM);
                let zoom = utils::fit_zoom(fit.bounds, scene.viewport, fit.options.padding, max_zoom);
                memory.center_at(walkers::lat_lon(center.y, center.x));
                if memory.set_zoom(zoom).is_err() {
                    tracing::debug!("Fit zoom {:.1} out of range", zoom);
                }
                tracing::trace!("Camera fit ({:.4}, {:.4}) zoom {:.1}", center.y, center.x, zoom);
                true
            }
            Some(CameraCommand::FlyTo(target)) => {
                memory.center_at(walkers::lat_lon(
                    target.center.latitude,
                    target.center.longitude,
                ));
                if memory.set_zoom(target.zoom).is_err() {
                    tracing::debug!("Fly-to zoom {:.1} out of range", target.zoom);
                }
                true
            }
            None => false,
        };
        if moved {
            scene.rendered = false;
        }
        scene.zoom = memory.zoom();
        moved
    }

    pub fn take_click(&self) -> Option<MapClick> {
        self.lock().click.take()
    }

    pub fn is_idle(&self) -> bool {
        let scene = self.lock();
        scene.rendered && scene.camera.is_none()
    }
}

/// [`MapWidget`] implementation recording into a [`Scene`]
pub struct WalkersWidget {
    scene: SceneHandle,
}

impl MapWidget for WalkersWidget {
    type Marker = u64;

    fn add_marker(&mut self, spec: &MarkerSpec) -> u64 {
        let mut scene = self.scene.lock();
        let id = scene.next_marker;
        scene.next_marker += 1;
        scene.markers.push((id, spec.clone()));
        id
    }

    fn remove_marker(&mut self, marker: u64) {
        self.scene.lock().markers.retain(|(id, _)| *id != marker);
    }

    fn set_route_layer(&mut self, path: &[Coordinate]) {
        self.scene.lock().line = Some(path.to_vec());
    }

    fn remove_route_layer(&mut self) {
        self.scene.lock().line = None;
    }

    fn fit_bounds(&mut self, fit: CameraFit) {
        self.scene.lock().camera = Some(CameraCommand::Fit(fit));
    }

    fn fly_to(&mut self, target: FlyTo) {
        self.scene.lock().camera = Some(CameraCommand::FlyTo(target));
    }

    fn zoom(&self) -> f64 {
        self.scene.lock().zoom
    }

    fn is_idle(&self) -> bool {
        self.scene.is_idle()
    }

    fn destroy(&mut self) {
        let mut scene = self.scene.lock();
        scene.markers.clear();
        scene.line = None;
        scene.camera = None;
        scene.click = None;
    }
}

#[inline]
fn color_of(rgb: [u8; 3]) -> Color32 {
    Color32::from_rgb(rgb[0], rgb[1], rgb[2])
}

#[inline]
fn radius_of(style: MarkerStyle) -> f32 {
    match style {
        MarkerStyle::UserLocation => USER_MARKER_RADIUS,
        _ => MARKER_RADIUS,
    }
}

/// Topmost clickable marker under `pointer`
fn hit_marker<'a>(
    placed: &[(Pos2, &'a MarkerSpec)],
    pointer: Pos2,
) -> Option<&'a PlaceId> {
    // Later markers are drawn on top
    placed.iter().rev().find_map(|(pos, spec)| {
        let place = spec.place_id.as_ref()?;
        (pos.distance(pointer) <= radius_of(spec.style) + HIT_SLOP).then_some(place)
    })
}

/// Draws route line and markers of a [`Scene`] and records clicks
pub struct ScenePlugin {
    scene: SceneHandle,
}

impl Plugin for ScenePlugin {
    fn run(
        self: Box<Self>,
        ui: &mut egui::Ui,
        response: &egui::Response,
        projector: &Projector,
        _map_memory: &walkers::MapMemory,
    ) {
        profiling::scope!("ScenePlugin::run");

        let mut scene = self.scene.lock();
        let size = response.rect.size();
        scene.viewport = (size.x, size.y);
        scene.rendered = true;

        let painter = ui.painter_at(response.rect);
        let project = |c: &Coordinate| {
            projector
                .project(walkers::lat_lon(c.latitude, c.longitude))
                .to_pos2()
        };

        if let Some(line) = &scene.line {
            let points: Vec<Pos2> = line.iter().map(project).collect();
            if points.len() >= 2 {
                painter.add(egui::Shape::line(
                    points,
                    Stroke::new(ROUTE_LINE_WIDTH, color_of(ROUTE_LINE_RGB)),
                ));
            }
        }

        let placed: Vec<(Pos2, &MarkerSpec)> = scene
            .markers
            .iter()
            .map(|(_, spec)| (project(&spec.position), spec))
            .collect();

        for (pos, spec) in &placed {
            let radius = radius_of(spec.style);
            painter.circle(
                *pos,
                radius,
                color_of(spec.style.rgb()),
                Stroke::new(2.0, Color32::WHITE),
            );
            if let Some(label) = &spec.label {
                painter.text(
                    *pos,
                    egui::Align2::CENTER_CENTER,
                    label,
                    FontId::proportional(11.0),
                    Color32::WHITE,
                );
            }
        }

        if response.clicked()
            && let Some(pointer) = response.interact_pointer_pos()
        {
            let click = match hit_marker(&placed, pointer) {
                Some(place) => MapClick::Marker(place.clone()),
                None => MapClick::Empty,
            };
            tracing::trace!("Map click: {:?}", click);
            scene.click = Some(click);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voyonx_lib::{FitOptions, MapSurface};

    fn stop(place: &str, lat: f64, lon: f64) -> MarkerSpec {
        MarkerSpec::stop(Coordinate::new(lat, lon), place.into(), 1, false)
    }

    #[test]
    fn test_widget_records_markers_and_line() {
        let scene = SceneHandle::default();
        let mut surface: MapSurface<WalkersWidget> = MapSurface::new();
        surface.init(|| scene.widget());

        surface.set_markers(&[stop("a", 40.36, 49.83), stop("b", 40.37, 49.84)]);
        surface.set_route_line(Some(&[
            Coordinate::new(40.36, 49.83),
            Coordinate::new(40.37, 49.84),
        ]));
        assert_eq!(scene.lock().markers.len(), 2);
        assert!(scene.lock().line.is_some());

        surface.set_markers(&[stop("c", 40.38, 49.85)]);
        let markers = &scene.lock().markers;
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].1.place_id, Some("c".into()));
    }

    #[test]
    fn test_teardown_empties_scene() {
        let scene = SceneHandle::default();
        let mut surface: MapSurface<WalkersWidget> = MapSurface::new();
        surface.init(|| scene.widget());
        surface.set_markers(&[stop("a", 40.36, 49.83)]);
        surface.set_route_line(Some(&[
            Coordinate::new(40.36, 49.83),
            Coordinate::new(40.37, 49.84),
        ]));

        surface.teardown();
        let scene = scene.lock();
        assert!(scene.markers.is_empty());
        assert!(scene.line.is_none());
    }

    #[test]
    fn test_fly_to_applied_on_next_frame() {
        let scene = SceneHandle::default();
        let mut widget = scene.widget();
        let mut memory = MapMemory::default();

        widget.fly_to(FlyTo {
            center: Coordinate::new(40.3661, 49.8372),
            zoom: 14.0,
            duration: Duration::from_millis(500),
        });
        assert!(!widget.is_idle());

        assert!(scene.apply_camera(&mut memory));
        assert_eq!(memory.zoom(), 14.0);
        assert_eq!(widget.zoom(), 14.0);

        // Nothing pending any more
        assert!(!scene.apply_camera(&mut memory));
    }

    #[test]
    fn test_fit_respects_max_zoom() {
        let scene = SceneHandle::default();
        let mut surface: MapSurface<WalkersWidget> = MapSurface::new();
        surface.init(|| scene.widget());
        let mut memory = MapMemory::default();

        // A single point fits at the cap
        surface.fit_to_bounds(&[Coordinate::new(40.37, 49.84)], FitOptions::DISCOVERY);
        scene.apply_camera(&mut memory);
        assert_eq!(memory.zoom(), 14.0);
    }

    #[test]
    fn test_idle_after_render() {
        let scene = SceneHandle::default();
        assert!(!scene.is_idle());

        scene.lock().rendered = true;
        assert!(scene.is_idle());

        scene.widget().fly_to(FlyTo {
            center: Coordinate::new(40.0, 49.0),
            zoom: 12.0,
            duration: Duration::ZERO,
        });
        assert!(!scene.is_idle());
        scene.apply_camera(&mut MapMemory::default());
        // Moved, so idle again only after the next frame is drawn
        assert!(!scene.is_idle());
    }

    #[test]
    fn test_hit_marker_prefers_topmost() {
        let a = stop("a", 0.0, 0.0);
        let b = stop("b", 0.0, 0.0);
        let user = MarkerSpec {
            position: Coordinate::new(0.0, 0.0),
            label: None,
            style: MarkerStyle::UserLocation,
            place_id: None,
        };
        let placed = vec![
            (Pos2::new(100.0, 100.0), &a),
            (Pos2::new(105.0, 100.0), &b),
            (Pos2::new(300.0, 300.0), &user),
        ];

        assert_eq!(hit_marker(&placed, Pos2::new(103.0, 100.0)), Some(&PlaceId::from("b")));
        assert_eq!(hit_marker(&placed, Pos2::new(88.0, 100.0)), Some(&PlaceId::from("a")));
        assert_eq!(hit_marker(&placed, Pos2::new(200.0, 200.0)), None);
        // The user marker is not a place
        assert_eq!(hit_marker(&placed, Pos2::new(300.0, 300.0)), None);
    }
}
