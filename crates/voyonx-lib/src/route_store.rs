//! RouteStore - the signed-in user's ordered list of stops
//!
//! The store keeps an in-memory copy of the route's stops and mediates every
//! mutation through the [`RemoteStore`]. The remote side is the source of
//! truth: after each write the stops are read back, so a local view never
//! outlives a failed or partial write.
//!
//! Mutations are serialized behind a single-flight gate, so a rapid double
//! click issues its second request only after the first has been reloaded.

use crate::auth::AuthProvider;
use crate::model::{DEFAULT_ROUTE_TITLE, NewStop, PlaceId, RouteId, RouteStop, UserId, UserRoute};
use crate::remote::RemoteStore;
use crate::{Result, RouteError};
use chrono::Utc;
use futures::future::join_all;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Direction of a one-slot move
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    #[inline]
    fn offset(self) -> isize {
        match self {
            Direction::Up => -1,
            Direction::Down => 1,
        }
    }
}

/// Outcome of a mutation whose preconditions may not hold
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// The remote store was written and the stops reloaded
    Applied,
    /// Preconditions unmet (duplicate add, absent stop, move out of bounds); nothing sent
    Unchanged,
}

/// Lifecycle of a route, always derived from its stops
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteStatus {
    Empty,
    /// Stops exist, none visited yet
    Populating,
    InProgress,
    Completed,
}

/// Visited share of a route
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub visited: usize,
    pub total: usize,
    /// Rounded percentage, 0 for an empty route
    pub percent: u8,
}

impl Progress {
    pub fn of(stops: &[RouteStop]) -> Self {
        let total = stops.len();
        let visited = stops.iter().filter(|s| s.is_visited()).count();
        let percent = if total == 0 {
            0
        } else {
            (visited as f64 / total as f64 * 100.0).round() as u8
        };
        Self {
            visited,
            total,
            percent,
        }
    }
}

/// Immutable view of the store at one revision
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteSnapshot {
    pub route: Option<UserRoute>,
    /// Changes every time the stop collection is replaced
    pub revision: u64,
    stops: Vec<RouteStop>,
}

impl RouteSnapshot {
    pub fn new(route: Option<UserRoute>, mut stops: Vec<RouteStop>, revision: u64) -> Self {
        sort_stops(&mut stops);
        Self {
            route,
            revision,
            stops,
        }
    }

    /// Stops sorted by position
    #[inline]
    pub fn ordered_stops(&self) -> &[RouteStop] {
        &self.stops
    }

    /// First stop in order that has not been visited
    pub fn next_unvisited(&self) -> Option<&RouteStop> {
        self.stops.iter().find(|s| !s.is_visited())
    }

    /// At least one stop and every stop visited
    pub fn is_finished(&self) -> bool {
        !self.stops.is_empty() && self.next_unvisited().is_none()
    }

    pub fn progress(&self) -> Progress {
        Progress::of(&self.stops)
    }

    pub fn status(&self) -> RouteStatus {
        let progress = self.progress();
        match (progress.visited, progress.total) {
            (_, 0) => RouteStatus::Empty,
            (0, _) => RouteStatus::Populating,
            (v, t) if v == t => RouteStatus::Completed,
            _ => RouteStatus::InProgress,
        }
    }

    pub fn contains(&self, place: &PlaceId) -> bool {
        self.stops.iter().any(|s| &s.place_id == place)
    }

    pub fn place_ids(&self) -> Vec<PlaceId> {
        self.stops.iter().map(|s| s.place_id.clone()).collect()
    }
}

fn sort_stops(stops: &mut [RouteStop]) {
    stops.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
}

#[derive(Default)]
struct State {
    route: Option<UserRoute>,
    /// Route the current `stops` were loaded for
    loaded_for: Option<RouteId>,
    stops: Vec<RouteStop>,
    revision: u64,
}

struct Inner {
    remote: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    state: RwLock<State>,
    /// Held for the whole duration of a mutation
    gate: tokio::sync::Mutex<()>,
}

/// Shared handle to the route of the active session.
///
/// Cloning is cheap; every clone observes the same state.
#[derive(Clone)]
pub struct RouteStore {
    inner: Arc<Inner>,
}

impl RouteStore {
    pub fn new(remote: Arc<dyn RemoteStore>, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote,
                auth,
                state: RwLock::new(State::default()),
                gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn replace_stops(&self, route: &RouteId, mut stops: Vec<RouteStop>) {
        sort_stops(&mut stops);
        let mut state = self.write();
        state.stops = stops;
        state.loaded_for = Some(route.clone());
        state.revision += 1;
    }

    fn remote(&self) -> &dyn RemoteStore {
        self.inner.remote.as_ref()
    }

    // ---------------------------------------------------------------------
    // Queries (in-memory, no round-trip)
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> RouteSnapshot {
        let state = self.read();
        RouteSnapshot::new(state.route.clone(), state.stops.clone(), state.revision)
    }

    pub fn route(&self) -> Option<UserRoute> {
        self.read().route.clone()
    }

    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    /// Stops sorted by position
    pub fn ordered_stops(&self) -> Vec<RouteStop> {
        self.snapshot().stops
    }

    pub fn next_unvisited_stop(&self) -> Option<RouteStop> {
        self.snapshot().next_unvisited().cloned()
    }

    pub fn is_in_route(&self, place: &PlaceId) -> bool {
        self.read().stops.iter().any(|s| &s.place_id == place)
    }

    fn stop_for(&self, place: &PlaceId) -> Option<RouteStop> {
        self.read()
            .stops
            .iter()
            .find(|s| &s.place_id == place)
            .cloned()
    }

    // ---------------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------------

    fn current_user(&self) -> Result<UserId> {
        self.inner.auth.current_user().ok_or_else(|| {
            tracing::warn!("Route operation skipped: no signed-in user");
            RouteError::NotAuthenticated
        })
    }

    fn cached_route(&self, user: &UserId) -> Option<UserRoute> {
        self.read()
            .route
            .as_ref()
            .filter(|r| &r.user_id == user)
            .cloned()
    }

    fn cache_route(&self, route: &UserRoute) {
        let mut state = self.write();
        let switched = state
            .route
            .as_ref()
            .is_some_and(|r| r.user_id != route.user_id);
        if switched {
            state.stops.clear();
            state.loaded_for = None;
            state.revision += 1;
        }
        state.route = Some(route.clone());
    }

    /// Return the user's route, creating it on first use.
    ///
    /// Two callers racing to create converge on the single stored record: a
    /// failed create is followed by a re-read that picks up the winner.
    pub async fn ensure_route(&self) -> Result<UserRoute> {
        let user = self.current_user()?;
        if let Some(route) = self.cached_route(&user) {
            return Ok(route);
        }

        let existing = self.remote().find_route(&user).await.map_err(|e| {
            tracing::error!("Route select error: {}", e);
            RouteError::from(e)
        })?;

        let route = match existing {
            Some(route) => route,
            None => match self.remote().create_route(&user, DEFAULT_ROUTE_TITLE).await {
                Ok(route) => {
                    tracing::info!("Created route {} for {}", route.id, user);
                    route
                }
                Err(create_err) => {
                    tracing::warn!("Route insert failed ({}), re-reading", create_err);
                    match self.remote().find_route(&user).await {
                        Ok(Some(route)) => route,
                        Ok(None) => return Err(create_err.into()),
                        Err(e) => {
                            tracing::error!("Route select error: {}", e);
                            return Err(e.into());
                        }
                    }
                }
            },
        };

        self.cache_route(&route);
        Ok(route)
    }

    /// Replace the in-memory stops with the remote contents of `route`.
    ///
    /// On failure the collection is emptied rather than left stale, and the
    /// route is marked unloaded so the next mutation fetches it again.
    pub async fn load_stops(&self, route: &RouteId) -> Result<()> {
        profiling::scope!("RouteStore::load_stops");

        match self.remote().list_stops(route).await {
            Ok(stops) => {
                tracing::debug!("Loaded {} stops for route {}", stops.len(), route);
                self.replace_stops(route, stops);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Stops load error: {}", e);
                let mut state = self.write();
                state.stops.clear();
                state.loaded_for = None;
                state.revision += 1;
                Err(e.into())
            }
        }
    }

    async fn reload_after_failure(&self, route: &RouteId) {
        if let Err(e) = self.load_stops(route).await {
            tracing::warn!("Reload after failed write did not succeed: {}", e);
        }
    }

    async fn ensure_loaded(&self, route: &RouteId) -> Result<()> {
        let loaded = self.read().loaded_for.as_ref() == Some(route);
        if loaded {
            Ok(())
        } else {
            self.load_stops(route).await
        }
    }

    /// Ensure the route exists and reload its stops.
    ///
    /// Without a signed-in user the local state is cleared.
    pub async fn refresh(&self) -> Result<()> {
        let _flight = self.inner.gate.lock().await;

        if self.inner.auth.current_user().is_none() {
            let mut state = self.write();
            let had_data = state.route.is_some() || !state.stops.is_empty();
            state.route = None;
            state.loaded_for = None;
            state.stops.clear();
            if had_data {
                state.revision += 1;
            }
            return Err(RouteError::NotAuthenticated);
        }

        let route = self.ensure_route().await?;
        self.load_stops(&route.id).await
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Append `place` at the end of the route (no-op if already present).
    pub async fn add_to_route(&self, place: &PlaceId) -> Result<Mutation> {
        let _flight = self.inner.gate.lock().await;
        let route = self.ensure_route().await?;
        self.ensure_loaded(&route.id).await?;

        if self.is_in_route(place) {
            tracing::debug!("Place {} already on route", place);
            return Ok(Mutation::Unchanged);
        }

        let position = self
            .read()
            .stops
            .iter()
            .map(|s| s.position)
            .max()
            .map_or(0, |p| p + 1);

        let stop = NewStop {
            route_id: route.id.clone(),
            place_id: place.clone(),
            position,
        };
        if let Err(e) = self.remote().insert_stop(stop).await {
            tracing::error!("Add stop error: {}", e);
            return Err(e.into());
        }

        self.load_stops(&route.id).await?;
        Ok(Mutation::Applied)
    }

    /// Remove `place` and renumber the remaining stops to close the gap.
    pub async fn remove_from_route(&self, place: &PlaceId) -> Result<Mutation> {
        let _flight = self.inner.gate.lock().await;
        let route = self.ensure_route().await?;
        self.ensure_loaded(&route.id).await?;

        if !self.is_in_route(place) {
            return Ok(Mutation::Unchanged);
        }

        if let Err(e) = self.remote().delete_stop(&route.id, place).await {
            tracing::error!("Remove stop error: {}", e);
            return Err(e.into());
        }

        let remaining: Vec<RouteStop> = self
            .ordered_stops()
            .into_iter()
            .filter(|s| &s.place_id != place)
            .collect();

        let writes = remaining
            .iter()
            .enumerate()
            .filter(|(index, stop)| stop.position as usize != *index)
            .map(|(index, stop)| self.remote().set_stop_position(&stop.id, index as u32));
        let failed = join_all(writes)
            .await
            .into_iter()
            .find_map(std::result::Result::err);

        let reloaded = self.load_stops(&route.id).await;
        if let Some(e) = failed {
            tracing::error!("Renumber after remove failed: {}", e);
            return Err(e.into());
        }
        reloaded?;
        Ok(Mutation::Applied)
    }

    /// Swap `place` with its neighbour in `direction` (no-op at either end).
    ///
    /// If the second position write fails the first one is reverted; either
    /// way the stops are reloaded and the move is reported failed.
    pub async fn move_stop(&self, place: &PlaceId, direction: Direction) -> Result<Mutation> {
        let _flight = self.inner.gate.lock().await;
        let route = self.ensure_route().await?;
        self.ensure_loaded(&route.id).await?;

        let ordered = self.ordered_stops();
        let Some(i) = ordered.iter().position(|s| &s.place_id == place) else {
            return Ok(Mutation::Unchanged);
        };
        let Some(j) = i
            .checked_add_signed(direction.offset())
            .filter(|j| *j < ordered.len())
        else {
            return Ok(Mutation::Unchanged);
        };

        let (a, b) = (&ordered[i], &ordered[j]);

        if let Err(e) = self.remote().set_stop_position(&a.id, b.position).await {
            tracing::error!("Move stop error: {}", e);
            self.reload_after_failure(&route.id).await;
            return Err(e.into());
        }

        if let Err(e) = self.remote().set_stop_position(&b.id, a.position).await {
            tracing::error!("Move stop error: {}, reverting first write", e);
            if let Err(revert) = self.remote().set_stop_position(&a.id, a.position).await {
                tracing::error!("Move stop revert failed: {}", revert);
            }
            self.reload_after_failure(&route.id).await;
            return Err(e.into());
        }

        self.load_stops(&route.id).await?;
        Ok(Mutation::Applied)
    }

    /// Flip the visited mark of `place` (set to now, or cleared).
    pub async fn toggle_visited(&self, place: &PlaceId) -> Result<Mutation> {
        let _flight = self.inner.gate.lock().await;
        let route = self.ensure_route().await?;
        self.ensure_loaded(&route.id).await?;

        let Some(stop) = self.stop_for(place) else {
            return Ok(Mutation::Unchanged);
        };

        let visited_at = if stop.is_visited() {
            None
        } else {
            Some(Utc::now())
        };
        if let Err(e) = self.remote().set_stop_visited(&stop.id, visited_at).await {
            tracing::error!("Toggle visited error: {}", e);
            return Err(e.into());
        }

        self.load_stops(&route.id).await?;
        Ok(Mutation::Applied)
    }

    /// Delete every stop of the route. The local list is emptied directly.
    pub async fn clear_route(&self) -> Result<Mutation> {
        let _flight = self.inner.gate.lock().await;
        let route = self.ensure_route().await?;

        if let Err(e) = self.remote().delete_all_stops(&route.id).await {
            tracing::error!("Clear route error: {}", e);
            return Err(e.into());
        }

        self.replace_stops(&route.id, Vec::new());
        Ok(Mutation::Applied)
    }

    /// Remove `place` if it is on the route, add it otherwise.
    pub async fn toggle_in_route(&self, place: &PlaceId) -> Result<Mutation> {
        if self.is_in_route(place) {
            self.remove_from_route(place).await
        } else {
            self.add_to_route(place).await
        }
    }
}
