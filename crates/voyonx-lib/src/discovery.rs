//! Map/Discovery Page Controller
//!
//! Lists catalog places on the map with a category filter, a title search
//! and a "near me" mode, and keeps the map markers in step with the visible
//! list. Like [`crate::RoutePage`] it is a `Clone` handle whose async parts
//! (catalog load, geolocation) stop applying results after teardown.

use crate::model::{Coordinate, Place, PlaceId};
use crate::remote::RemoteStore;
use crate::surface::{FitOptions, FlyTo, MapSurface, MapWidget, MarkerSpec};
use crate::utils::{category_key, clean, haversine_km, starts_with_word};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Places farther than this from the user are hidden in near mode
pub const NEAR_RADIUS_KM: f64 = 3.0;
pub const MAX_SEARCH_RESULTS: usize = 8;
pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Closest zoom a marker click keeps when already zoomed in further
pub const PLACE_FOCUS_MIN_ZOOM: f64 = 13.0;
pub const NEAR_ME_ZOOM: f64 = 14.0;
const FLY_DURATION: Duration = Duration::from_millis(500);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeolocationError {
    #[error("Geolocation is not supported")]
    Unsupported,

    #[error("Geolocation permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    Unavailable(String),

    #[error("Geolocation timed out")]
    Timeout,
}

impl GeolocationError {
    /// Text shown to the user
    pub fn user_message(&self) -> String {
        match self {
            GeolocationError::Unsupported => {
                "Geolocation is not supported on this device.".to_owned()
            }
            other => format!(
                "Could not get your location. Check the location permission and try again.\n\nError: {other}"
            ),
        }
    }
}

/// Source of the user's current position
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError>;
}

/// A fixed position, or no geolocation support at all
pub struct StaticGeolocator(pub Option<Coordinate>);

#[async_trait]
impl Geolocator for StaticGeolocator {
    async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
        self.0.ok_or(GeolocationError::Unsupported)
    }
}

/// Distinct non-empty categories, first spelling kept, sorted case-insensitively
pub fn unique_categories(places: &[Place]) -> Vec<String> {
    let mut seen: Vec<(String, String)> = Vec::new();
    for place in places {
        let raw = clean(place.category.as_deref());
        if raw.is_empty() {
            continue;
        }
        let key = category_key(raw);
        if !seen.iter().any(|(k, _)| *k == key) {
            seen.push((key, raw.to_owned()));
        }
    }
    seen.sort_by(|a, b| a.0.cmp(&b.0));
    seen.into_iter().map(|(_, label)| label).collect()
}

/// What narrows the visible place list
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaceFilter {
    pub category: Option<String>,
    pub search: String,
    /// User position while near mode is on
    pub near: Option<Coordinate>,
}

impl PlaceFilter {
    #[inline]
    pub fn query(&self) -> String {
        self.search.trim().to_lowercase()
    }

    #[inline]
    pub fn is_searching(&self) -> bool {
        !self.search.trim().is_empty()
    }

    /// Visible places: a search matches title words across the whole catalog;
    /// otherwise the category applies, then the near radius sorted by distance.
    pub fn apply(&self, places: &[Place]) -> Vec<Place> {
        let query = self.query();
        if !query.is_empty() {
            return places
                .iter()
                .filter(|p| starts_with_word(&p.title, &query))
                .cloned()
                .collect();
        }

        let mut list: Vec<&Place> = match self.category.as_deref().map(category_key) {
            Some(active) => places
                .iter()
                .filter(|p| category_key(clean(p.category.as_deref())) == active)
                .collect(),
            None => places.iter().collect(),
        };

        if let Some(origin) = self.near {
            let mut by_distance: Vec<(f64, &Place)> = list
                .into_iter()
                .map(|p| (haversine_km(origin, p.coordinate()), p))
                .filter(|(d, _)| *d <= NEAR_RADIUS_KM)
                .collect();
            by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));
            list = by_distance.into_iter().map(|(_, p)| p).collect();
        }

        list.into_iter().cloned().collect()
    }
}

/// Everything the discovery screen renders
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiscoveryView {
    pub loading: bool,
    pub categories: Vec<String>,
    pub filter: PlaceFilter,
    pub visible: Vec<Place>,
    /// First matches while a search is open
    pub search_results: Vec<Place>,
    pub search_open: bool,
    pub selected: Option<Place>,
    pub locating: bool,
}

#[derive(Default)]
struct DiscoveryState {
    loading: bool,
    places: Vec<Place>,
    filter: PlaceFilter,
    search_open: bool,
    selected: Option<PlaceId>,
    locating: bool,
    location_error: Option<String>,
    /// Incremented per teardown; work started before it is dropped
    mount: u64,
}

struct DiscoveryInner<W: MapWidget> {
    remote: Arc<dyn RemoteStore>,
    geolocator: Arc<dyn Geolocator>,
    surface: Mutex<MapSurface<W>>,
    state: Mutex<DiscoveryState>,
    cancelled: AtomicBool,
}

pub struct DiscoveryPage<W: MapWidget> {
    inner: Arc<DiscoveryInner<W>>,
}

impl<W: MapWidget> Clone for DiscoveryPage<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: MapWidget> DiscoveryPage<W> {
    pub fn new(remote: Arc<dyn RemoteStore>, geolocator: Arc<dyn Geolocator>) -> Self {
        Self {
            inner: Arc::new(DiscoveryInner {
                remote,
                geolocator,
                surface: Mutex::new(MapSurface::new()),
                state: Mutex::new(DiscoveryState {
                    loading: true,
                    ..Default::default()
                }),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, DiscoveryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn surface(&self) -> MutexGuard<'_, MapSurface<W>> {
        self.inner
            .surface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Create the map widget and draw the current list. After a teardown
    /// this mounts the page again.
    pub fn attach(&self, make: impl FnOnce() -> W) {
        if self.surface().init(make) {
            self.inner.cancelled.store(false, Ordering::Release);
            self.render();
        }
    }

    fn is_stale(&self, mount: u64) -> bool {
        self.is_cancelled() || self.state().mount != mount
    }

    /// Fetch the catalog and show it.
    pub async fn load(&self) {
        let mount = {
            let mut state = self.state();
            state.loading = true;
            state.mount
        };

        let places = match self.inner.remote.list_places().await {
            Ok(places) => places,
            Err(e) => {
                tracing::error!("Places load error: {}", e);
                Vec::new()
            }
        };
        if self.is_stale(mount) {
            return;
        }

        {
            let mut state = self.state();
            state.loading = false;
            state.places = places;

            let categories = unique_categories(&state.places);
            let keep_current = state.filter.near.is_some() || state.filter.is_searching();
            if !keep_current && let Some(first) = categories.first() {
                let valid = state.filter.category.as_deref().is_some_and(|current| {
                    categories
                        .iter()
                        .any(|c| category_key(c) == category_key(current))
                });
                if !valid {
                    state.filter.category = Some(first.clone());
                }
            }
            tracing::info!(
                "Loaded {} places in {} categories",
                state.places.len(),
                categories.len()
            );
        }
        self.render();
    }

    /// Whether a catalog is in memory
    pub fn is_loaded(&self) -> bool {
        let state = self.state();
        !state.loading && !state.places.is_empty()
    }

    pub fn categories(&self) -> Vec<String> {
        unique_categories(&self.state().places)
    }

    /// Markers and camera for the visible list
    fn render(&self) {
        profiling::scope!("DiscoveryPage::render");
        if self.is_cancelled() {
            return;
        }

        let (visible, frame) = {
            let state = self.state();
            let visible = state.filter.apply(&state.places);
            let frame = state.filter.near.is_none() && !state.filter.is_searching();
            (visible, frame)
        };

        let markers: Vec<MarkerSpec> = visible
            .iter()
            .map(|p| MarkerSpec::place(p.coordinate(), p.id.clone()))
            .collect();
        let mut surface = self.surface();
        surface.set_markers(&markers);
        if frame {
            let points: Vec<Coordinate> = visible.iter().map(Place::coordinate).collect();
            surface.fit_to_bounds(&points, FitOptions::DISCOVERY);
        }
    }

    /// Switch category; leaves near mode and clears search and selection.
    pub fn select_category(&self, category: Option<String>) {
        {
            let mut state = self.state();
            state.filter.category = category;
            state.filter.near = None;
            state.filter.search.clear();
            state.search_open = false;
            state.selected = None;
        }
        self.surface().set_user_marker(None);
        self.render();
    }

    /// Update the search text; a non-empty search leaves near mode.
    pub fn set_search(&self, text: &str) {
        let left_near = {
            let mut state = self.state();
            state.filter.search = text.to_owned();
            state.search_open = true;
            state.selected = None;
            if text.trim().is_empty() {
                false
            } else {
                state.filter.near.take().is_some()
            }
        };
        if left_near {
            self.surface().set_user_marker(None);
        }
        self.render();
    }

    pub fn close_search(&self) {
        self.state().search_open = false;
    }

    /// Select a place from its marker and fly to it.
    pub fn click_marker(&self, place: &PlaceId) {
        let target = {
            let mut state = self.state();
            let Some(found) = state.places.iter().find(|p| &p.id == place) else {
                return;
            };
            let center = found.coordinate();
            state.search_open = false;
            state.selected = Some(place.clone());
            center
        };

        let mut surface = self.surface();
        let zoom = surface
            .zoom()
            .unwrap_or(PLACE_FOCUS_MIN_ZOOM)
            .max(PLACE_FOCUS_MIN_ZOOM);
        surface.fly_to(FlyTo {
            center: target,
            zoom,
            duration: FLY_DURATION,
        });
    }

    /// A click on the map background
    pub fn click_map(&self) {
        let mut state = self.state();
        state.search_open = false;
        state.selected = None;
    }

    /// Locate the user (bounded wait) and switch to near mode.
    ///
    /// Failures leave the filter untouched and set a user-facing message.
    pub async fn near_me(&self) {
        let mount = {
            let mut state = self.state();
            state.locating = true;
            state.mount
        };

        let located = match tokio::time::timeout(
            GEOLOCATION_TIMEOUT,
            self.inner.geolocator.current_position(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GeolocationError::Timeout),
        };
        if self.is_stale(mount) {
            return;
        }

        let position = {
            let mut state = self.state();
            state.locating = false;
            match located {
                Ok(position) => {
                    state.filter.near = Some(position);
                    state.filter.category = None;
                    state.filter.search.clear();
                    state.search_open = false;
                    state.selected = None;
                    state.location_error = None;
                    position
                }
                Err(e) => {
                    tracing::warn!("Geolocation failed: {}", e);
                    state.location_error = Some(e.user_message());
                    return;
                }
            }
        };

        {
            let mut surface = self.surface();
            surface.set_user_marker(Some(position));
            surface.fly_to(FlyTo {
                center: position,
                zoom: NEAR_ME_ZOOM,
                duration: FLY_DURATION,
            });
        }
        self.render();
    }

    /// Pending geolocation message, consumed once
    pub fn take_location_error(&self) -> Option<String> {
        self.state().location_error.take()
    }

    pub fn visible_places(&self) -> Vec<Place> {
        let state = self.state();
        state.filter.apply(&state.places)
    }

    pub fn search_results(&self) -> Vec<Place> {
        let state = self.state();
        if !state.filter.is_searching() {
            return Vec::new();
        }
        let mut results = state.filter.apply(&state.places);
        results.truncate(MAX_SEARCH_RESULTS);
        results
    }

    pub fn selected_place(&self) -> Option<Place> {
        let state = self.state();
        let id = state.selected.as_ref()?;
        state.places.iter().find(|p| &p.id == id).cloned()
    }

    /// Any cached catalog entry by id
    pub fn place(&self, id: &PlaceId) -> Option<Place> {
        self.state().places.iter().find(|p| &p.id == id).cloned()
    }

    pub fn view(&self) -> DiscoveryView {
        let state = self.state();
        let visible = state.filter.apply(&state.places);
        let search_results = if state.filter.is_searching() {
            visible.iter().take(MAX_SEARCH_RESULTS).cloned().collect()
        } else {
            Vec::new()
        };
        let selected = state
            .selected
            .as_ref()
            .and_then(|id| state.places.iter().find(|p| &p.id == id).cloned());

        DiscoveryView {
            loading: state.loading,
            categories: unique_categories(&state.places),
            filter: state.filter.clone(),
            visible,
            search_results,
            search_open: state.search_open,
            selected,
            locating: state.locating,
        }
    }

    /// Stop applying async results and release the map. Safe to repeat.
    pub fn teardown(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        {
            let mut state = self.state();
            state.mount += 1;
            state.locating = false;
            state.loading = false;
        }
        self.surface().teardown();
    }
}
