//! Voyonx Library - Route, Favorites and Discovery Logic
//!
//! This library holds everything the Voyonx travel map does that is not UI:
//! the user's ordered route of stops, locally persisted favorites, walking
//! directions between stops, and the page controllers that keep a map widget
//! in step with all of it. The map widget itself, the hosted database and the
//! directions provider are collaborators reached through traits.
//!
//! # Architecture
//!
//! - **[`RouteStore`]**: Owns the ordered stop list of the signed-in user and
//!   mediates every mutation through a [`RemoteStore`]
//! - **[`FavoritesStore`]**: Set of place ids persisted in a [`StorageBackend`]
//! - **[`MapSurface`]**: Marker, camera and route-line lifecycle over a [`MapWidget`]
//! - **[`DirectionsResolver`]**: Walking path + summary with a single retry
//! - **[`RoutePage`]**: The "My Route" screen: journey mode, progress, sync
//! - **[`DiscoveryPage`]**: Place listing with category, search and "near me"
//! - **[`PlaceDetailPage`]**: One place by id, from cache or the remote store
//!
//! # Data Flow
//!
//! remote store ⇄ [`RouteStore`] ⇄ [`RoutePage`] ⇄ [`MapSurface`] / [`DirectionsResolver`]

pub mod auth;
pub mod directions;
pub mod discovery;
pub mod favorites;
pub mod journey;
pub mod model;
pub mod place_detail;
pub mod remote;
mod route_store;
pub mod storage;
pub mod surface;
pub mod utils;

// Public API exports
pub use auth::{AuthProvider, StaticSession};
pub use directions::{
    DirectionsError, DirectionsProvider, DirectionsResolver, MapboxDirections, Resolution,
    ResolvedRoute, RouteSummary, RoutingProfile,
};
pub use discovery::{
    DiscoveryPage, DiscoveryView, GeolocationError, Geolocator, PlaceFilter, StaticGeolocator,
};
pub use favorites::FavoritesStore;
pub use journey::{RouteAction, RouteActions, RoutePage, RoutePageView, StopRow};
pub use model::{Coordinate, Place, PlaceId, RouteId, RouteStop, StopId, UserId, UserRoute};
pub use place_detail::{PlaceDetailPage, PlaceLookup};
pub use remote::{InMemoryStore, RemoteError, RemoteStore, RestStore};
pub use route_store::{Direction, Mutation, Progress, RouteSnapshot, RouteStatus, RouteStore};
pub use storage::{FileStorage, MemoryStorage, StorageBackend, StorageError};
pub use surface::{
    CameraFit, FitOptions, FlyTo, LineOutcome, MapSurface, MapWidget, MarkerSpec, MarkerStyle,
};

/// Errors surfaced by Route Store operations
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("No signed-in user")]
    NotAuthenticated,

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),
}

pub type Result<T> = std::result::Result<T, RouteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that the main handles can be built from the exported types
        let _: fn() -> InMemoryStore = InMemoryStore::new;
        let _: fn() -> MemoryStorage = MemoryStorage::new;
        let _: fn() -> MapboxDirections = MapboxDirections::default;
    }

    #[test]
    fn test_route_error_from_remote() {
        let err: RouteError = RemoteError::Transport("connection reset".into()).into();
        assert!(matches!(err, RouteError::Remote(RemoteError::Transport(_))));
        assert_eq!(
            err.to_string(),
            "Remote store error: Transport error: connection reset"
        );
    }
}
