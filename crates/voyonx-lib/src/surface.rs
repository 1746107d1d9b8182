//! Map Rendering Surface
//!
//! [`MapSurface`] owns one map widget instance together with the markers and
//! the route line it has put on it. Pages never touch the widget directly;
//! they describe what should be shown and the surface adds and removes the
//! widget objects to match.

use crate::model::{Coordinate, PlaceId};
use crate::utils::{bounds_of, is_valid_coordinate};
use geo::Rect;
use std::time::Duration;

/// Visual class of a marker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerStyle {
    /// Route stop already visited
    Visited,
    /// Route stop still ahead
    Unvisited,
    /// Catalog place on the discovery map
    Place,
    /// The user's own position
    UserLocation,
}

impl MarkerStyle {
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            MarkerStyle::Visited => [0x22, 0xC5, 0x5E],
            MarkerStyle::Unvisited | MarkerStyle::Place => [0xFF, 0x57, 0x22],
            MarkerStyle::UserLocation => [0x25, 0x63, 0xEB],
        }
    }
}

/// Color of the route polyline
pub const ROUTE_LINE_RGB: [u8; 3] = [0xFF, 0x57, 0x22];
/// Width of the route polyline in points
pub const ROUTE_LINE_WIDTH: f32 = 5.0;

#[derive(Clone, Debug, PartialEq)]
pub struct MarkerSpec {
    pub position: Coordinate,
    /// Short text drawn on the marker (1-based stop number on the route map)
    pub label: Option<String>,
    pub style: MarkerStyle,
    /// Place reported back when the marker is clicked
    pub place_id: Option<PlaceId>,
}

impl MarkerSpec {
    pub fn place(position: Coordinate, place: PlaceId) -> Self {
        Self {
            position,
            label: None,
            style: MarkerStyle::Place,
            place_id: Some(place),
        }
    }

    pub fn stop(position: Coordinate, place: PlaceId, ordinal: usize, visited: bool) -> Self {
        Self {
            position,
            label: Some(ordinal.to_string()),
            style: if visited {
                MarkerStyle::Visited
            } else {
                MarkerStyle::Unvisited
            },
            place_id: Some(place),
        }
    }
}

/// How a page frames a set of points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitOptions {
    /// Free pixels on every side
    pub padding: f32,
    pub max_zoom: Option<f64>,
    pub duration: Duration,
}

impl FitOptions {
    /// Route page framing of its stops
    pub const ROUTE: FitOptions = FitOptions {
        padding: 70.0,
        max_zoom: None,
        duration: Duration::from_millis(500),
    };

    /// Discovery page framing of the visible places
    pub const DISCOVERY: FitOptions = FitOptions {
        padding: 80.0,
        max_zoom: Some(14.0),
        duration: Duration::from_millis(650),
    };
}

/// Camera animation that frames `bounds` (x = longitude, y = latitude)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraFit {
    pub bounds: Rect<f64>,
    pub options: FitOptions,
}

/// Camera animation to a center point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlyTo {
    pub center: Coordinate,
    pub zoom: f64,
    pub duration: Duration,
}

/// Result of drawing the route line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Drawn,
    /// Fewer than 2 valid points; any previous line was removed
    NoRoute,
}

/// The interactive map widget a surface drives
pub trait MapWidget: Send {
    /// Handle of one marker placed on the widget
    type Marker: Send;

    fn add_marker(&mut self, spec: &MarkerSpec) -> Self::Marker;
    fn remove_marker(&mut self, marker: Self::Marker);

    /// Create or replace the single route line layer
    fn set_route_layer(&mut self, path: &[Coordinate]);
    fn remove_route_layer(&mut self);

    fn fit_bounds(&mut self, fit: CameraFit);
    fn fly_to(&mut self, target: FlyTo);
    fn zoom(&self) -> f64;

    /// Style loaded and no frame pending
    fn is_idle(&self) -> bool;

    /// Release everything the widget holds
    fn destroy(&mut self);
}

/// Owner of one widget instance and everything placed on it
pub struct MapSurface<W: MapWidget> {
    widget: Option<W>,
    markers: Vec<W::Marker>,
    user_marker: Option<W::Marker>,
    has_line: bool,
}

impl<W: MapWidget> Default for MapSurface<W> {
    fn default() -> Self {
        Self {
            widget: None,
            markers: Vec::new(),
            user_marker: None,
            has_line: false,
        }
    }
}

impl<W: MapWidget> MapSurface<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the widget unless one already exists. Returns whether `make` ran.
    pub fn init(&mut self, make: impl FnOnce() -> W) -> bool {
        if self.widget.is_some() {
            return false;
        }
        self.widget = Some(make());
        true
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.widget.is_some()
    }

    pub fn widget(&self) -> Option<&W> {
        self.widget.as_ref()
    }

    /// Widget idle state; a missing widget is never idle
    pub fn is_idle(&self) -> bool {
        self.widget.as_ref().is_some_and(MapWidget::is_idle)
    }

    pub fn zoom(&self) -> Option<f64> {
        self.widget.as_ref().map(MapWidget::zoom)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn has_route_line(&self) -> bool {
        self.has_line
    }

    /// Replace every marker with one marker per spec.
    pub fn set_markers(&mut self, specs: &[MarkerSpec]) {
        let Some(widget) = self.widget.as_mut() else {
            return;
        };

        for marker in self.markers.drain(..) {
            widget.remove_marker(marker);
        }
        self.markers = specs
            .iter()
            .filter(|s| is_valid_coordinate(s.position))
            .map(|s| widget.add_marker(s))
            .collect();
    }

    /// Show, move or hide the user's position marker.
    pub fn set_user_marker(&mut self, position: Option<Coordinate>) {
        let Some(widget) = self.widget.as_mut() else {
            return;
        };

        if let Some(marker) = self.user_marker.take() {
            widget.remove_marker(marker);
        }
        if let Some(position) = position.filter(|c| is_valid_coordinate(*c)) {
            self.user_marker = Some(widget.add_marker(&MarkerSpec {
                position,
                label: None,
                style: MarkerStyle::UserLocation,
                place_id: None,
            }));
        }
    }

    /// Draw `path` as the route line, or remove the line when there is no
    /// path of at least 2 valid points.
    pub fn set_route_line(&mut self, path: Option<&[Coordinate]>) -> LineOutcome {
        let valid: Vec<Coordinate> = path
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|c| is_valid_coordinate(*c))
            .collect();

        if valid.len() < 2 {
            self.clear_route_line();
            return LineOutcome::NoRoute;
        }

        let Some(widget) = self.widget.as_mut() else {
            return LineOutcome::NoRoute;
        };
        widget.set_route_layer(&valid);
        self.has_line = true;
        LineOutcome::Drawn
    }

    pub fn clear_route_line(&mut self) {
        if !self.has_line {
            return;
        }
        if let Some(widget) = self.widget.as_mut() {
            widget.remove_route_layer();
        }
        self.has_line = false;
    }

    /// Animate the camera to frame `points`; no-op without a valid point.
    pub fn fit_to_bounds(&mut self, points: &[Coordinate], options: FitOptions) {
        let (Some(widget), Some(bounds)) = (self.widget.as_mut(), bounds_of(points)) else {
            return;
        };
        widget.fit_bounds(CameraFit { bounds, options });
    }

    pub fn fly_to(&mut self, target: FlyTo) {
        if !is_valid_coordinate(target.center) {
            return;
        }
        if let Some(widget) = self.widget.as_mut() {
            widget.fly_to(target);
        }
    }

    /// Release markers, line and widget. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        let Some(mut widget) = self.widget.take() else {
            return;
        };

        for marker in self.markers.drain(..) {
            widget.remove_marker(marker);
        }
        if let Some(marker) = self.user_marker.take() {
            widget.remove_marker(marker);
        }
        if self.has_line {
            widget.remove_route_layer();
            self.has_line = false;
        }
        widget.destroy();
        tracing::debug!("Map surface torn down");
    }
}

impl<W: MapWidget> Drop for MapSurface<W> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Recording widget shared by the controller tests
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq)]
    pub enum Event {
        AddMarker(MarkerSpec),
        RemoveMarker(usize),
        SetLine(Vec<Coordinate>),
        RemoveLine,
        Fit(CameraFit),
        FlyTo(FlyTo),
        Destroy,
    }

    #[derive(Default)]
    pub struct Shared {
        pub events: Vec<Event>,
        pub live_markers: Vec<(usize, MarkerSpec)>,
        pub line: Option<Vec<Coordinate>>,
        pub idle: bool,
        pub zoom: f64,
        next_id: usize,
    }

    /// Widget handle; clones observe the same recording
    #[derive(Clone)]
    pub struct FakeWidget(pub Arc<Mutex<Shared>>);

    impl FakeWidget {
        pub fn new() -> Self {
            FakeWidget(Arc::new(Mutex::new(Shared {
                idle: true,
                zoom: 12.0,
                ..Default::default()
            })))
        }

        pub fn set_idle(&self, idle: bool) {
            self.0.lock().unwrap().idle = idle;
        }

        pub fn events(&self) -> Vec<Event> {
            self.0.lock().unwrap().events.clone()
        }

        pub fn clear_events(&self) {
            self.0.lock().unwrap().events.clear();
        }

        pub fn markers(&self) -> Vec<MarkerSpec> {
            self.0
                .lock()
                .unwrap()
                .live_markers
                .iter()
                .map(|(_, s)| s.clone())
                .collect()
        }

        pub fn line(&self) -> Option<Vec<Coordinate>> {
            self.0.lock().unwrap().line.clone()
        }
    }

    impl MapWidget for FakeWidget {
        type Marker = usize;

        fn add_marker(&mut self, spec: &MarkerSpec) -> usize {
            let mut s = self.0.lock().unwrap();
            let id = s.next_id;
            s.next_id += 1;
            s.live_markers.push((id, spec.clone()));
            s.events.push(Event::AddMarker(spec.clone()));
            id
        }

        fn remove_marker(&mut self, marker: usize) {
            let mut s = self.0.lock().unwrap();
            s.live_markers.retain(|(id, _)| *id != marker);
            s.events.push(Event::RemoveMarker(marker));
        }

        fn set_route_layer(&mut self, path: &[Coordinate]) {
            let mut s = self.0.lock().unwrap();
            s.line = Some(path.to_vec());
            s.events.push(Event::SetLine(path.to_vec()));
        }

        fn remove_route_layer(&mut self) {
            let mut s = self.0.lock().unwrap();
            s.line = None;
            s.events.push(Event::RemoveLine);
        }

        fn fit_bounds(&mut self, fit: CameraFit) {
            self.0.lock().unwrap().events.push(Event::Fit(fit));
        }

        fn fly_to(&mut self, target: FlyTo) {
            let mut s = self.0.lock().unwrap();
            s.zoom = target.zoom;
            s.events.push(Event::FlyTo(target));
        }

        fn zoom(&self) -> f64 {
            self.0.lock().unwrap().zoom
        }

        fn is_idle(&self) -> bool {
            self.0.lock().unwrap().idle
        }

        fn destroy(&mut self) {
            self.0.lock().unwrap().events.push(Event::Destroy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{Event, FakeWidget};
    use super::*;

    fn surface() -> (FakeWidget, MapSurface<FakeWidget>) {
        let widget = FakeWidget::new();
        let mut surface = MapSurface::new();
        let handle = widget.clone();
        assert!(surface.init(move || handle));
        (widget, surface)
    }

    fn coords(n: usize) -> Vec<Coordinate> {
        (0..n)
            .map(|i| Coordinate::new(40.36 + i as f64 * 0.01, 49.83))
            .collect()
    }

    #[test]
    fn test_init_is_idempotent() {
        let (_widget, mut surface) = surface();
        let mut called = false;
        assert!(!surface.init(|| {
            called = true;
            FakeWidget::new()
        }));
        assert!(!called);
    }

    #[test]
    fn test_set_markers_replaces_previous() {
        let (widget, mut surface) = surface();

        let first: Vec<MarkerSpec> = coords(3)
            .into_iter()
            .enumerate()
            .map(|(i, c)| MarkerSpec::stop(c, format!("p{i}").into(), i + 1, false))
            .collect();
        surface.set_markers(&first);
        assert_eq!(widget.markers().len(), 3);

        let second = vec![MarkerSpec::place(coords(1)[0], "x".into())];
        surface.set_markers(&second);
        assert_eq!(widget.markers(), second);
        assert_eq!(surface.marker_count(), 1);

        let removed = widget
            .events()
            .iter()
            .filter(|e| matches!(e, Event::RemoveMarker(_)))
            .count();
        assert_eq!(removed, 3);
    }

    #[test]
    fn test_route_line_needs_two_valid_points() {
        let (widget, mut surface) = surface();

        assert_eq!(surface.set_route_line(Some(&coords(3))), LineOutcome::Drawn);
        assert!(widget.line().is_some());

        let one_valid = vec![coords(1)[0], Coordinate::new(f64::INFINITY, 0.0)];
        assert_eq!(surface.set_route_line(Some(&one_valid)), LineOutcome::NoRoute);
        assert!(widget.line().is_none());
        assert!(!surface.has_route_line());

        // Removing an absent line does not touch the widget
        widget.clear_events();
        assert_eq!(surface.set_route_line(None), LineOutcome::NoRoute);
        assert!(widget.events().is_empty());
    }

    #[test]
    fn test_fit_to_bounds() {
        let (widget, mut surface) = surface();

        surface.fit_to_bounds(&[], FitOptions::ROUTE);
        assert!(widget.events().is_empty());

        surface.fit_to_bounds(&coords(2), FitOptions::DISCOVERY);
        let Some(Event::Fit(fit)) = widget.events().pop() else {
            panic!("expected a fit");
        };
        assert_eq!(fit.options, FitOptions::DISCOVERY);
        assert!((fit.bounds.min().y - 40.36).abs() < 1e-9);
        assert!((fit.bounds.max().y - 40.37).abs() < 1e-9);
    }

    #[test]
    fn test_user_marker() {
        let (widget, mut surface) = surface();
        surface.set_user_marker(Some(Coordinate::new(40.4, 49.9)));
        surface.set_user_marker(Some(Coordinate::new(40.5, 49.9)));
        let markers = widget.markers();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].style, MarkerStyle::UserLocation);

        surface.set_user_marker(None);
        assert!(widget.markers().is_empty());
    }

    #[test]
    fn test_teardown_releases_everything_once() {
        let (widget, mut surface) = surface();
        surface.set_markers(&[MarkerSpec::place(coords(1)[0], "a".into())]);
        surface.set_user_marker(Some(coords(1)[0]));
        surface.set_route_line(Some(&coords(2)));

        surface.teardown();
        surface.teardown();
        drop(surface);

        let events = widget.events();
        assert_eq!(events.iter().filter(|e| **e == Event::Destroy).count(), 1);
        assert_eq!(events.iter().filter(|e| **e == Event::RemoveLine).count(), 1);
        assert!(widget.markers().is_empty());
    }

    #[test]
    fn test_operations_before_init_are_noops() {
        let mut surface: MapSurface<FakeWidget> = MapSurface::new();
        surface.set_markers(&[MarkerSpec::place(coords(1)[0], "a".into())]);
        surface.fit_to_bounds(&coords(2), FitOptions::ROUTE);
        assert_eq!(surface.set_route_line(Some(&coords(2))), LineOutcome::NoRoute);
        assert!(!surface.is_idle());
        assert_eq!(surface.zoom(), None);
        surface.teardown();
    }

    #[test]
    fn test_marker_colors() {
        assert_eq!(MarkerStyle::Visited.rgb(), [0x22, 0xC5, 0x5E]);
        assert_eq!(MarkerStyle::Unvisited.rgb(), [0xFF, 0x57, 0x22]);
        assert_eq!(MarkerStyle::UserLocation.rgb(), [0x25, 0x63, 0xEB]);
    }
}
