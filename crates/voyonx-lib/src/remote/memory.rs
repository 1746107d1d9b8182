//! Process-local implementation of `RemoteStore`.
//!
//! Implementation notes:
//! - Tables live behind a single mutex; every call yields once to the
//!   scheduler first so concurrent callers interleave like real round-trips.
//! - One route per user is enforced (a second create returns `Conflict`).
//! - Failures can be injected per operation, optionally after skipping a
//!   number of successful calls.
//! - The next call of an operation can be slowed down by a fixed delay.

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::model::{
    DEFAULT_ROUTE_TITLE, NewStop, Place, PlaceId, RouteId, RouteStop, StopId, UserId, UserRoute,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Operations that can be targeted by failure injection and call counting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FindRoute,
    CreateRoute,
    ListStops,
    InsertStop,
    SetStopPosition,
    SetStopVisited,
    DeleteStop,
    DeleteAllStops,
    ListPlaces,
    PlacesByIds,
    Place,
}

#[derive(Clone, Copy, Debug)]
struct Injection {
    /// Successful calls to let through before failing
    skip: usize,
    /// Number of failures still to deliver
    remaining: usize,
}

#[derive(Default)]
struct Tables {
    places: Vec<Place>,
    routes: Vec<UserRoute>,
    stops: Vec<RouteStop>,
    injections: HashMap<RemoteOp, Injection>,
    delays: HashMap<RemoteOp, VecDeque<Duration>>,
    calls: HashMap<RemoteOp, usize>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a catalog
    pub fn with_places(places: Vec<Place>) -> Self {
        let store = Self::new();
        store.lock().places = places;
        store
    }

    /// A small catalog around Baku used by offline mode
    pub fn demo() -> Self {
        let place = |id: &str, title: &str, category: &str, lat: f64, lon: f64| Place {
            id: id.into(),
            title: title.to_owned(),
            address: Some("Baku".to_owned()),
            description: None,
            latitude: lat,
            longitude: lon,
            category: Some(category.to_owned()),
            image_url: None,
        };
        Self::with_places(vec![
            place("maiden-tower", "Maiden Tower", "History", 40.3661, 49.8372),
            place("shirvanshah", "Palace of the Shirvanshahs", "History", 40.3666, 49.8335),
            place("flame-towers", "Flame Towers", "Architecture", 40.3594, 49.8266),
            place("heydar-center", "Heydar Aliyev Center", "Architecture", 40.3959, 49.8678),
            place("carpet-museum", "Carpet Museum", "Museums", 40.3605, 49.8357),
            place("fountain-square", "Fountains Square", "Squares", 40.3703, 49.8375),
            place("highland-park", "Highland Park", "Parks", 40.3573, 49.8252),
            place("boulevard", "Seaside Boulevard", "Parks", 40.3656, 49.8430),
        ])
    }

    /// Fail the next `times` calls of `op`
    pub fn fail(&self, op: RemoteOp, times: usize) {
        self.fail_after(op, 0, times);
    }

    /// Let `skip` calls of `op` succeed, then fail the following `times` calls
    pub fn fail_after(&self, op: RemoteOp, skip: usize, times: usize) {
        self.lock().injections.insert(
            op,
            Injection {
                skip,
                remaining: times,
            },
        );
    }

    /// Delay the next call of `op` by `delay`; each queued delay is used once
    pub fn delay_next(&self, op: RemoteOp, delay: Duration) {
        self.lock().delays.entry(op).or_default().push_back(delay);
    }

    /// Number of calls made to `op` so far
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Snapshot of the stored stops of `route`, ordered by position
    pub fn stored_stops(&self, route: &RouteId) -> Vec<RouteStop> {
        Self::ordered_stops(&self.lock(), route)
    }

    /// Number of route records owned by `user`
    pub fn route_count(&self, user: &UserId) -> usize {
        self.lock()
            .routes
            .iter()
            .filter(|r| &r.user_id == user)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call, deliver an injected failure if one is due, else hand out the tables
    async fn enter(&self, op: RemoteOp) -> RemoteResult<MutexGuard<'_, Tables>> {
        tokio::task::yield_now().await;

        let delay = {
            let mut tables = self.lock();
            *tables.calls.entry(op).or_default() += 1;
            tables.delays.get_mut(&op).and_then(VecDeque::pop_front)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut tables = self.lock();

        if let Some(injection) = tables.injections.get_mut(&op) {
            if injection.skip > 0 {
                injection.skip -= 1;
            } else if injection.remaining > 0 {
                injection.remaining -= 1;
                return Err(RemoteError::Transport(format!("injected failure in {op:?}")));
            }
        }
        Ok(tables)
    }

    fn ordered_stops(tables: &Tables, route: &RouteId) -> Vec<RouteStop> {
        let mut stops: Vec<RouteStop> = tables
            .stops
            .iter()
            .filter(|s| &s.route_id == route)
            .cloned()
            .collect();
        stops.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        stops
    }

    fn stop_mut<'a>(tables: &'a mut Tables, stop: &StopId) -> RemoteResult<&'a mut RouteStop> {
        tables
            .stops
            .iter_mut()
            .find(|s| &s.id == stop)
            .ok_or_else(|| RemoteError::NotFound(format!("route stop {stop}")))
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn find_route(&self, user: &UserId) -> RemoteResult<Option<UserRoute>> {
        let tables = self.enter(RemoteOp::FindRoute).await?;
        Ok(tables.routes.iter().find(|r| &r.user_id == user).cloned())
    }

    async fn create_route(&self, user: &UserId, title: &str) -> RemoteResult<UserRoute> {
        let mut tables = self.enter(RemoteOp::CreateRoute).await?;
        if tables.routes.iter().any(|r| &r.user_id == user) {
            return Err(RemoteError::Conflict(format!("route already exists for {user}")));
        }

        let route = UserRoute {
            id: RouteId::new(uuid::Uuid::new_v4().to_string()),
            user_id: user.clone(),
            title: if title.is_empty() {
                DEFAULT_ROUTE_TITLE.to_owned()
            } else {
                title.to_owned()
            },
        };
        tables.routes.push(route.clone());
        Ok(route)
    }

    async fn list_stops(&self, route: &RouteId) -> RemoteResult<Vec<RouteStop>> {
        let tables = self.enter(RemoteOp::ListStops).await?;
        Ok(Self::ordered_stops(&tables, route))
    }

    async fn insert_stop(&self, stop: NewStop) -> RemoteResult<()> {
        let mut tables = self.enter(RemoteOp::InsertStop).await?;
        if tables
            .stops
            .iter()
            .any(|s| s.route_id == stop.route_id && s.place_id == stop.place_id)
        {
            return Err(RemoteError::Conflict(format!(
                "place {} already on route {}",
                stop.place_id, stop.route_id
            )));
        }

        tables.stops.push(RouteStop {
            id: StopId::new(uuid::Uuid::new_v4().to_string()),
            route_id: stop.route_id,
            place_id: stop.place_id,
            position: stop.position,
            visited_at: None,
        });
        Ok(())
    }

    async fn set_stop_position(&self, stop: &StopId, position: u32) -> RemoteResult<()> {
        let mut tables = self.enter(RemoteOp::SetStopPosition).await?;
        Self::stop_mut(&mut tables, stop)?.position = position;
        Ok(())
    }

    async fn set_stop_visited(
        &self,
        stop: &StopId,
        visited_at: Option<DateTime<Utc>>,
    ) -> RemoteResult<()> {
        let mut tables = self.enter(RemoteOp::SetStopVisited).await?;
        Self::stop_mut(&mut tables, stop)?.visited_at = visited_at;
        Ok(())
    }

    async fn delete_stop(&self, route: &RouteId, place: &PlaceId) -> RemoteResult<()> {
        let mut tables = self.enter(RemoteOp::DeleteStop).await?;
        tables
            .stops
            .retain(|s| !(&s.route_id == route && &s.place_id == place));
        Ok(())
    }

    async fn delete_all_stops(&self, route: &RouteId) -> RemoteResult<()> {
        let mut tables = self.enter(RemoteOp::DeleteAllStops).await?;
        tables.stops.retain(|s| &s.route_id != route);
        Ok(())
    }

    async fn list_places(&self) -> RemoteResult<Vec<Place>> {
        let tables = self.enter(RemoteOp::ListPlaces).await?;
        Ok(tables.places.clone())
    }

    async fn places_by_ids(&self, ids: &[PlaceId]) -> RemoteResult<Vec<Place>> {
        let tables = self.enter(RemoteOp::PlacesByIds).await?;
        Ok(tables
            .places
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn place(&self, id: &PlaceId) -> RemoteResult<Option<Place>> {
        let tables = self.enter(RemoteOp::Place).await?;
        Ok(tables.places.iter().find(|p| &p.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_route_per_user() {
        let store = InMemoryStore::new();
        let user = UserId::from("u1");

        let route = store.create_route(&user, "").await.unwrap();
        assert_eq!(route.title, DEFAULT_ROUTE_TITLE);

        let second = store.create_route(&user, "Another").await;
        assert!(matches!(second, Err(RemoteError::Conflict(_))));
        assert_eq!(store.route_count(&user), 1);
        assert_eq!(store.find_route(&user).await.unwrap(), Some(route));
    }

    #[tokio::test]
    async fn test_stops_listed_by_position() {
        let store = InMemoryStore::new();
        let route = store.create_route(&"u1".into(), "r").await.unwrap();

        for (place, position) in [("b", 1), ("c", 2), ("a", 0)] {
            store
                .insert_stop(NewStop {
                    route_id: route.id.clone(),
                    place_id: place.into(),
                    position,
                })
                .await
                .unwrap();
        }

        let stops = store.list_stops(&route.id).await.unwrap();
        let order: Vec<&str> = stops.iter().map(|s| s.place_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fail_after_skips_then_fails() {
        let store = InMemoryStore::demo();
        store.fail_after(RemoteOp::ListPlaces, 1, 1);

        assert!(store.list_places().await.is_ok());
        assert!(store.list_places().await.is_err());
        assert!(store.list_places().await.is_ok());
        assert_eq!(store.calls(RemoteOp::ListPlaces), 3);
    }

    #[tokio::test]
    async fn test_update_missing_stop_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .set_stop_position(&"nope".into(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_places_by_ids() {
        let store = InMemoryStore::demo();
        let ids: Vec<PlaceId> = vec!["flame-towers".into(), "unknown".into()];
        let places = store.places_by_ids(&ids).await.unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].title, "Flame Towers");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_once() {
        let store = InMemoryStore::demo();
        store.delay_next(RemoteOp::Place, Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        assert!(store.place(&"boulevard".into()).await.unwrap().is_some());
        assert!(started.elapsed() >= Duration::from_secs(2));

        let again = tokio::time::Instant::now();
        store.place(&"boulevard".into()).await.unwrap();
        assert!(again.elapsed() < Duration::from_secs(1));
    }
}
