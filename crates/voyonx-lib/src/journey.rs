//! Route Page Controller
//!
//! [`RoutePage`] composes the [`RouteStore`], a [`MapSurface`] and the
//! [`DirectionsResolver`] into the "My Route" screen. It is a cheap `Clone`
//! handle: the UI reads a [`RoutePageView`] every frame while async tasks
//! drive the mutations and map synchronization.
//!
//! Implementation notes:
//! - Whenever the store revision differs from the last synchronized one, the
//!   stop places are fetched in order, markers are rebuilt, the camera is
//!   fitted and the route line is re-requested.
//! - A route line request made while the widget is busy is parked until
//!   [`RoutePage::on_map_idle`].
//! - Late responses are dropped after [`RoutePage::teardown`] or when a newer
//!   line request has been issued.
//! - Journey mode is forced off whenever the route is finished.

use crate::directions::{DirectionsResolver, Resolution, RouteSummary, prepare_path};
use crate::model::{Coordinate, Place, PlaceId, RouteStop};
use crate::remote::{RemoteStore, in_id_order};
use crate::route_store::{Direction, Progress, RouteSnapshot, RouteStatus, RouteStore};
use crate::surface::{FitOptions, MapSurface, MapWidget, MarkerSpec};
use crate::{Mutation, RouteError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Buttons of the route page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteAction {
    StartJourney,
    MarkNextVisited,
    StopJourney,
    Reset,
    Explore,
    CreateNewRoute,
}

impl RouteAction {
    pub fn label(&self) -> &'static str {
        match self {
            RouteAction::StartJourney => "Start Journey",
            RouteAction::MarkNextVisited => "Mark next visited",
            RouteAction::StopJourney => "Stop",
            RouteAction::Reset => "Reset",
            RouteAction::Explore => "Explore",
            RouteAction::CreateNewRoute => "Create new route",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionButton {
    pub action: RouteAction,
    pub enabled: bool,
}

/// The button row for the current journey state, in display order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteActions {
    pub buttons: Vec<ActionButton>,
}

impl RouteActions {
    pub fn derive(journey_on: bool, snapshot: &RouteSnapshot) -> Self {
        let has_stops = !snapshot.ordered_stops().is_empty();
        let button = |action, enabled| ActionButton { action, enabled };

        let buttons = if snapshot.is_finished() {
            vec![button(RouteAction::CreateNewRoute, true)]
        } else if journey_on {
            vec![
                button(
                    RouteAction::MarkNextVisited,
                    snapshot.next_unvisited().is_some(),
                ),
                button(RouteAction::StopJourney, true),
                button(RouteAction::Reset, has_stops),
                button(RouteAction::Explore, true),
            ]
        } else {
            vec![
                button(RouteAction::StartJourney, has_stops),
                button(RouteAction::Reset, has_stops),
                button(RouteAction::Explore, true),
            ]
        };
        Self { buttons }
    }

    pub fn get(&self, action: RouteAction) -> Option<ActionButton> {
        self.buttons.iter().copied().find(|b| b.action == action)
    }

    pub fn is_enabled(&self, action: RouteAction) -> bool {
        self.get(action).is_some_and(|b| b.enabled)
    }
}

/// One stop paired with its place
#[derive(Clone, Debug, PartialEq)]
pub struct StopRow {
    /// 1-based, as shown on the marker
    pub ordinal: usize,
    pub stop: RouteStop,
    pub place: Place,
    pub is_next: bool,
}

/// Everything the route screen renders
#[derive(Clone, Debug, PartialEq)]
pub struct RoutePageView {
    pub loading: bool,
    pub rows: Vec<StopRow>,
    pub journey_on: bool,
    pub progress: Progress,
    pub finished: bool,
    pub status: RouteStatus,
    pub summary: Option<RouteSummary>,
    pub next_place: Option<Place>,
    pub actions: RouteActions,
    pub confirm_reset_pending: bool,
}

#[derive(Default)]
struct PageState {
    journey_on: bool,
    loading: bool,
    synced_revision: Option<u64>,
    places: HashMap<PlaceId, Place>,
    summary: Option<RouteSummary>,
    /// Line request waiting for the widget to become idle
    deferred_path: Option<Vec<Coordinate>>,
    /// Incremented per line request; older responses are stale
    line_generation: u64,
    /// Incremented per sync; older place fetches are stale
    sync_generation: u64,
    /// Incremented per teardown; work started before it is dropped
    mount: u64,
    scroll_request: Option<PlaceId>,
    confirm_reset_pending: bool,
}

struct PageInner<W: MapWidget> {
    store: RouteStore,
    remote: Arc<dyn RemoteStore>,
    resolver: Arc<DirectionsResolver>,
    surface: Mutex<MapSurface<W>>,
    state: Mutex<PageState>,
    cancelled: AtomicBool,
}

pub struct RoutePage<W: MapWidget> {
    inner: Arc<PageInner<W>>,
}

impl<W: MapWidget> Clone for RoutePage<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn log_route_error(context: &str, e: &RouteError) {
    match e {
        RouteError::NotAuthenticated => tracing::info!("{}: sign-in required", context),
        RouteError::Remote(inner) => tracing::error!("{}: {}", context, inner),
    }
}

impl<W: MapWidget> RoutePage<W> {
    pub fn new(
        store: RouteStore,
        remote: Arc<dyn RemoteStore>,
        resolver: Arc<DirectionsResolver>,
    ) -> Self {
        Self {
            inner: Arc::new(PageInner {
                store,
                remote,
                resolver,
                surface: Mutex::new(MapSurface::new()),
                state: Mutex::new(PageState::default()),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
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

    pub fn store(&self) -> &RouteStore {
        &self.inner.store
    }

    /// Create the map widget (no-op if one exists). After a teardown this
    /// mounts the page again and the next sync redraws everything.
    pub fn attach(&self, make: impl FnOnce() -> W) {
        if self.surface().init(make) {
            self.inner.cancelled.store(false, Ordering::Release);
            self.state().synced_revision = None;
        }
    }

    fn is_stale(&self, mount: u64) -> bool {
        self.is_cancelled() || self.state().mount != mount
    }

    /// Load the route and synchronize the map.
    pub async fn open(&self) {
        let mount = {
            let mut state = self.state();
            state.loading = true;
            state.mount
        };
        if let Err(e) = self.inner.store.refresh().await {
            log_route_error("Route load failed", &e);
        }
        if self.is_stale(mount) {
            return;
        }
        self.state().loading = false;
        self.sync().await;
    }

    /// Bring places, markers and the route line in step with the stop list.
    pub async fn sync(&self) {
        profiling::scope!("RoutePage::sync");
        if self.is_cancelled() {
            return;
        }

        let snapshot = self.inner.store.snapshot();
        let generation = {
            let mut state = self.state();
            Self::enforce_finished(&mut state, &snapshot);
            if state.synced_revision == Some(snapshot.revision) {
                return;
            }
            state.sync_generation += 1;
            state.sync_generation
        };

        let ids = snapshot.place_ids();
        let places = if ids.is_empty() {
            Vec::new()
        } else {
            match self.inner.remote.places_by_ids(&ids).await {
                Ok(places) => in_id_order(&ids, places),
                Err(e) => {
                    tracing::error!("Route places load error: {}", e);
                    Vec::new()
                }
            }
        };
        if self.is_cancelled() {
            return;
        }

        let rows = pair_rows(&snapshot, &places);
        let markers: Vec<MarkerSpec> = rows
            .iter()
            .map(|r| {
                MarkerSpec::stop(
                    r.place.coordinate(),
                    r.place.id.clone(),
                    r.ordinal,
                    r.stop.is_visited(),
                )
            })
            .collect();
        let path: Vec<Coordinate> = rows.iter().map(|r| r.place.coordinate()).collect();

        {
            let mut surface = self.surface();
            let mut state = self.state();
            if state.sync_generation != generation {
                tracing::trace!("Dropping stale route sync");
                return;
            }
            surface.set_markers(&markers);
            surface.fit_to_bounds(&path, FitOptions::ROUTE);
            state.synced_revision = Some(snapshot.revision);
            state.places = places.into_iter().map(|p| (p.id.clone(), p)).collect();
            state.scroll_request = if snapshot.is_finished() {
                None
            } else {
                snapshot.next_unvisited().map(|s| s.place_id.clone())
            };
            Self::enforce_finished(&mut state, &snapshot);
        }
        tracing::debug!(
            "Route synced: {} stops, {} markers",
            snapshot.ordered_stops().len(),
            markers.len()
        );

        self.request_route_line(path).await;
    }

    fn enforce_finished(state: &mut PageState, snapshot: &RouteSnapshot) {
        if state.journey_on && snapshot.is_finished() {
            tracing::info!("Route finished, leaving journey mode");
            state.journey_on = false;
        }
    }

    /// Resolve and draw the line through `path`, or park the request until
    /// the widget is idle.
    async fn request_route_line(&self, path: Vec<Coordinate>) {
        if prepare_path(&path).len() < 2 {
            let mut state = self.state();
            state.deferred_path = None;
            state.summary = None;
            state.line_generation += 1;
            drop(state);
            self.surface().set_route_line(None);
            return;
        }

        if !self.surface().is_idle() {
            tracing::trace!("Map busy, deferring route line");
            self.state().deferred_path = Some(path);
            return;
        }

        let generation = {
            let mut state = self.state();
            state.deferred_path = None;
            state.line_generation += 1;
            state.line_generation
        };

        let resolution = self.inner.resolver.resolve(&path).await;
        if self.is_cancelled() {
            return;
        }

        let mut state = self.state();
        if state.line_generation != generation {
            tracing::trace!("Dropping stale route line");
            return;
        }
        state.summary = resolution.summary();
        drop(state);

        let mut surface = self.surface();
        match resolution {
            Resolution::Resolved(route) => {
                surface.set_route_line(Some(&route.geometry));
            }
            Resolution::NoRoute | Resolution::Failed => {
                surface.set_route_line(None);
            }
        }
    }

    /// The widget finished loading or animating; run any parked line request.
    pub async fn on_map_idle(&self) {
        let deferred = self.state().deferred_path.take();
        if let Some(path) = deferred {
            self.request_route_line(path).await;
        }
    }

    /// Whether a line request is waiting for the widget
    pub fn has_deferred_line(&self) -> bool {
        self.state().deferred_path.is_some()
    }

    /// Turn journey mode on; no-op without stops or once finished.
    pub async fn start_journey(&self) -> bool {
        let snapshot = self.inner.store.snapshot();
        if snapshot.ordered_stops().is_empty() || snapshot.is_finished() {
            return false;
        }

        let path: Vec<Coordinate> = {
            let mut state = self.state();
            state.journey_on = true;
            state.scroll_request = snapshot.next_unvisited().map(|s| s.place_id.clone());
            pair_rows_from_map(&snapshot, &state.places)
                .iter()
                .map(|r| r.place.coordinate())
                .collect()
        };
        tracing::info!("Journey started");

        if path.len() >= 2 {
            self.request_route_line(path).await;
        }
        true
    }

    pub fn stop_journey(&self) {
        self.state().journey_on = false;
    }

    pub fn journey_on(&self) -> bool {
        let snapshot = self.inner.store.snapshot();
        let mut state = self.state();
        Self::enforce_finished(&mut state, &snapshot);
        state.journey_on
    }

    /// Mark the next unvisited stop visited; no-op when there is none.
    pub async fn mark_next_visited(&self) {
        let Some(next) = self.inner.store.next_unvisited_stop() else {
            return;
        };
        if let Err(e) = self.inner.store.toggle_visited(&next.place_id).await {
            log_route_error("Mark visited failed", &e);
        }
        self.sync().await;
    }

    /// Ask for confirmation before a reset. Returns whether a prompt is pending.
    pub fn request_reset(&self) -> bool {
        if self.inner.store.ordered_stops().is_empty() {
            return false;
        }
        self.state().confirm_reset_pending = true;
        true
    }

    pub fn cancel_reset(&self) {
        self.state().confirm_reset_pending = false;
    }

    /// Leave journey mode and clear the route, if a reset was requested.
    pub async fn confirm_reset(&self) {
        {
            let mut state = self.state();
            if !state.confirm_reset_pending {
                return;
            }
            state.confirm_reset_pending = false;
            state.journey_on = false;
        }
        if let Err(e) = self.inner.store.clear_route().await {
            log_route_error("Reset route failed", &e);
        }
        self.sync().await;
    }

    pub async fn toggle_visited(&self, place: &PlaceId) {
        self.mutate("Toggle visited failed", self.inner.store.toggle_visited(place))
            .await;
    }

    pub async fn move_stop(&self, place: &PlaceId, direction: Direction) {
        self.mutate("Move stop failed", self.inner.store.move_stop(place, direction))
            .await;
    }

    pub async fn remove_stop(&self, place: &PlaceId) {
        self.mutate("Remove stop failed", self.inner.store.remove_from_route(place))
            .await;
    }

    async fn mutate(
        &self,
        context: &str,
        op: impl Future<Output = crate::Result<Mutation>>,
    ) {
        if let Err(e) = op.await {
            log_route_error(context, &e);
        }
        self.sync().await;
    }

    /// Place the list should scroll to, consumed once
    pub fn take_scroll_request(&self) -> Option<PlaceId> {
        self.state().scroll_request.take()
    }

    pub fn view(&self) -> RoutePageView {
        let snapshot = self.inner.store.snapshot();
        let mut state = self.state();
        Self::enforce_finished(&mut state, &snapshot);

        let rows = pair_rows_from_map(&snapshot, &state.places);
        let next_place = snapshot
            .next_unvisited()
            .and_then(|s| state.places.get(&s.place_id).cloned());

        RoutePageView {
            loading: state.loading,
            rows,
            journey_on: state.journey_on,
            progress: snapshot.progress(),
            finished: snapshot.is_finished(),
            status: snapshot.status(),
            summary: state.summary,
            next_place,
            actions: RouteActions::derive(state.journey_on, &snapshot),
            confirm_reset_pending: state.confirm_reset_pending,
        }
    }

    /// Stop applying async results and release the map. Safe to repeat.
    pub fn teardown(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        {
            let mut state = self.state();
            state.mount += 1;
            state.sync_generation += 1;
            state.line_generation += 1;
            state.deferred_path = None;
            state.loading = false;
        }
        self.surface().teardown();
    }
}

/// Pair ordered stops with their places; stops without a place are skipped.
fn pair_rows(snapshot: &RouteSnapshot, places: &[Place]) -> Vec<StopRow> {
    let by_id: HashMap<PlaceId, Place> = places.iter().map(|p| (p.id.clone(), p.clone())).collect();
    pair_rows_from_map(snapshot, &by_id)
}

fn pair_rows_from_map(snapshot: &RouteSnapshot, places: &HashMap<PlaceId, Place>) -> Vec<StopRow> {
    let next = snapshot.next_unvisited().map(|s| s.id.clone());
    snapshot
        .ordered_stops()
        .iter()
        .filter_map(|stop| places.get(&stop.place_id).map(|place| (stop, place)))
        .enumerate()
        .map(|(index, (stop, place))| StopRow {
            ordinal: index + 1,
            stop: stop.clone(),
            place: place.clone(),
            is_next: next.as_ref() == Some(&stop.id),
        })
        .collect()
}
