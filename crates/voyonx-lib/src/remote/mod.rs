//! Remote data store contract.
//!
//! The hosted database is the durable source of truth for places, routes and
//! route stops. This module provides the `RemoteStore` trait with the exact
//! set of row operations the rest of the crate needs, plus two
//! implementations:
//!
//! - `InMemoryStore`: process-local tables; used for offline mode and as the
//!   test fake (failure injection, call counting).
//! - `RestStore`: a PostgREST-style HTTP adaptor over `reqwest`.
//!
//! Every call is a network round-trip that can fail; callers receive a
//! `RemoteError` and decide how to degrade.

mod memory;
mod rest;

pub use memory::{InMemoryStore, RemoteOp};
pub use rest::{RestConfig, RestStore};

use crate::model::{NewStop, Place, PlaceId, RouteId, RouteStop, StopId, UserId, UserRoute};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Row-level access to the `places`, `user_routes` and `route_stops` collections.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The route owned by `user`, if one exists.
    async fn find_route(&self, user: &UserId) -> RemoteResult<Option<UserRoute>>;

    /// Create the route for `user`. May fail with `Conflict` if one already exists.
    async fn create_route(&self, user: &UserId, title: &str) -> RemoteResult<UserRoute>;

    /// All stops of `route`, ordered by `position` ascending.
    async fn list_stops(&self, route: &RouteId) -> RemoteResult<Vec<RouteStop>>;

    async fn insert_stop(&self, stop: NewStop) -> RemoteResult<()>;

    async fn set_stop_position(&self, stop: &StopId, position: u32) -> RemoteResult<()>;

    async fn set_stop_visited(
        &self,
        stop: &StopId,
        visited_at: Option<DateTime<Utc>>,
    ) -> RemoteResult<()>;

    /// Delete the stop of `route` that references `place` (no-op if absent).
    async fn delete_stop(&self, route: &RouteId, place: &PlaceId) -> RemoteResult<()>;

    async fn delete_all_stops(&self, route: &RouteId) -> RemoteResult<()>;

    /// The whole catalog.
    async fn list_places(&self) -> RemoteResult<Vec<Place>>;

    /// The places whose id is in `ids`, in no particular order.
    async fn places_by_ids(&self, ids: &[PlaceId]) -> RemoteResult<Vec<Place>>;

    /// The place with `id`, or `None` if the catalog has no such entry.
    async fn place(&self, id: &PlaceId) -> RemoteResult<Option<Place>>;
}

/// Reorder fetched places to follow `ids`, dropping ids that did not resolve.
pub fn in_id_order(ids: &[PlaceId], places: Vec<Place>) -> Vec<Place> {
    let mut by_id: std::collections::HashMap<PlaceId, Place> =
        places.into_iter().map(|p| (p.id.clone(), p)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str) -> Place {
        Place {
            id: id.into(),
            title: id.to_uppercase(),
            address: None,
            description: None,
            latitude: 0.0,
            longitude: 0.0,
            category: None,
            image_url: None,
        }
    }

    #[test]
    fn test_in_id_order() {
        let ids: Vec<PlaceId> = vec!["c".into(), "a".into(), "missing".into(), "b".into()];
        let ordered = in_id_order(&ids, vec![place("a"), place("b"), place("c")]);
        let got: Vec<&str> = ordered.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(got, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_in_id_order_duplicate_ids_resolve_once() {
        let ids: Vec<PlaceId> = vec!["a".into(), "a".into()];
        let ordered = in_id_order(&ids, vec![place("a")]);
        assert_eq!(ordered.len(), 1);
    }
}
