//! Place detail lookup
//!
//! The detail screen shows one place. It is taken from a catalog already in
//! memory when possible, otherwise fetched by id. Navigating away (or to
//! another place) invalidates an outstanding fetch.

use crate::model::{Place, PlaceId};
use crate::remote::RemoteStore;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the detail screen currently has for its place
#[derive(Clone, Debug, Default, PartialEq)]
pub enum PlaceLookup {
    #[default]
    Idle,
    Loading(PlaceId),
    Found(Place),
    NotFound(PlaceId),
    Failed(PlaceId),
}

impl PlaceLookup {
    pub fn place(&self) -> Option<&Place> {
        match self {
            PlaceLookup::Found(place) => Some(place),
            _ => None,
        }
    }
}

#[derive(Default)]
struct DetailState {
    lookup: PlaceLookup,
    /// Incremented per open and close; older fetches are stale
    generation: u64,
}

struct DetailInner {
    remote: Arc<dyn RemoteStore>,
    state: Mutex<DetailState>,
}

#[derive(Clone)]
pub struct PlaceDetailPage {
    inner: Arc<DetailInner>,
}

impl PlaceDetailPage {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            inner: Arc::new(DetailInner {
                remote,
                state: Mutex::new(DetailState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, DetailState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Show `id`, using `cached` when the caller already has it.
    ///
    /// Returns whether [`PlaceDetailPage::fetch`] must run to resolve it.
    pub fn open(&self, id: &PlaceId, cached: Option<Place>) -> bool {
        let mut state = self.state();
        state.generation += 1;
        match cached {
            Some(place) => {
                state.lookup = PlaceLookup::Found(place);
                false
            }
            None => {
                state.lookup = PlaceLookup::Loading(id.clone());
                true
            }
        }
    }

    /// Resolve the place being loaded; a no-op unless one is.
    pub async fn fetch(&self) {
        profiling::scope!("PlaceDetailPage::fetch");
        let (id, generation) = {
            let state = self.state();
            let PlaceLookup::Loading(id) = &state.lookup else {
                return;
            };
            (id.clone(), state.generation)
        };

        let result = self.inner.remote.place(&id).await;

        let mut state = self.state();
        if state.generation != generation {
            tracing::trace!("Dropping stale place {}", id);
            return;
        }
        state.lookup = match result {
            Ok(Some(place)) => PlaceLookup::Found(place),
            Ok(None) => {
                tracing::warn!("Place {} does not exist", id);
                PlaceLookup::NotFound(id)
            }
            Err(e) => {
                tracing::error!("Place load error: {}", e);
                PlaceLookup::Failed(id)
            }
        };
    }

    /// Leave the screen; a fetch still in flight is discarded.
    pub fn close(&self) {
        let mut state = self.state();
        state.generation += 1;
        state.lookup = PlaceLookup::Idle;
    }

    pub fn lookup(&self) -> PlaceLookup {
        self.state().lookup.clone()
    }
}
