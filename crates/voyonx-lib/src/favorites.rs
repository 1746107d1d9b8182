//! Locally persisted set of favorite places

use crate::model::{Place, PlaceId};
use crate::remote::in_id_order;
use crate::storage::{StorageBackend, load_json_backend, save_json_backend};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Storage slot holding the JSON list of favorite ids
pub const FAVORITES_KEY: &str = "voyonx_favorites";

struct Inner {
    backend: Arc<dyn StorageBackend>,
    ids: RwLock<Vec<PlaceId>>,
}

/// Favorite place ids in insertion order, shared by every page.
///
/// The slot is read once on construction and rewritten after every change.
/// Missing or corrupt data starts an empty set.
#[derive(Clone)]
pub struct FavoritesStore {
    inner: Arc<Inner>,
}

impl FavoritesStore {
    pub fn load(backend: Arc<dyn StorageBackend>) -> Self {
        let ids = match load_json_backend::<Vec<PlaceId>>(backend.as_ref(), FAVORITES_KEY) {
            Ok(Some(ids)) => {
                let mut unique: Vec<PlaceId> = Vec::with_capacity(ids.len());
                for id in ids {
                    if !unique.contains(&id) {
                        unique.push(id);
                    }
                }
                unique
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Discarding unreadable favorites: {}", e);
                Vec::new()
            }
        };
        tracing::debug!("Loaded {} favorites", ids.len());

        Self {
            inner: Arc::new(Inner {
                backend,
                ids: RwLock::new(ids),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<PlaceId>> {
        self.inner.ids.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<PlaceId>> {
        self.inner.ids.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, ids: &[PlaceId]) {
        if let Err(e) = save_json_backend(self.inner.backend.as_ref(), FAVORITES_KEY, &ids) {
            tracing::warn!("Failed to save favorites: {}", e);
        }
    }

    /// Add or remove `id`; returns whether it is a favorite afterwards.
    pub fn toggle(&self, id: &PlaceId) -> bool {
        let mut ids = self.write();
        let now_favorite = match ids.iter().position(|x| x == id) {
            Some(index) => {
                ids.remove(index);
                false
            }
            None => {
                ids.push(id.clone());
                true
            }
        };
        self.save(&ids);
        now_favorite
    }

    pub fn is_favorite(&self, id: &PlaceId) -> bool {
        self.read().contains(id)
    }

    /// Favorite ids in the order they were added
    pub fn ids(&self) -> Vec<PlaceId> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Arrange fetched places in favorites order, dropping unknown ids.
    pub fn order_places(&self, places: Vec<Place>) -> Vec<Place> {
        in_id_order(&self.read(), places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn place(id: &str) -> Place {
        Place {
            id: id.into(),
            title: id.to_owned(),
            address: None,
            description: None,
            latitude: 40.0,
            longitude: 49.0,
            category: None,
            image_url: None,
        }
    }

    #[test]
    fn test_toggle_persists_every_change() {
        let backend = Arc::new(MemoryStorage::new());
        let favorites = FavoritesStore::load(backend.clone());

        assert!(favorites.toggle(&"a".into()));
        assert!(favorites.toggle(&"b".into()));
        assert_eq!(
            backend.get_string(FAVORITES_KEY).unwrap().as_deref(),
            Some(r#"["a","b"]"#)
        );

        assert!(!favorites.toggle(&"a".into()));
        assert!(!favorites.is_favorite(&"a".into()));
        assert!(favorites.is_favorite(&"b".into()));
        assert_eq!(
            backend.get_string(FAVORITES_KEY).unwrap().as_deref(),
            Some(r#"["b"]"#)
        );
    }

    #[test]
    fn test_reload_restores_order() {
        let backend = Arc::new(MemoryStorage::new());
        backend
            .set_string(FAVORITES_KEY, r#"["c","a","c"]"#)
            .unwrap();

        let favorites = FavoritesStore::load(backend);
        assert_eq!(favorites.len(), 2);
        assert_eq!(
            favorites.ids(),
            vec![PlaceId::from("c"), PlaceId::from("a")]
        );
    }

    #[test]
    fn test_corrupt_or_missing_starts_empty() {
        let backend = Arc::new(MemoryStorage::new());
        assert!(FavoritesStore::load(backend.clone()).is_empty());

        backend.set_string(FAVORITES_KEY, "{oops").unwrap();
        let favorites = FavoritesStore::load(backend.clone());
        assert!(favorites.is_empty());

        // The next change overwrites the broken slot
        favorites.toggle(&"x".into());
        assert_eq!(
            backend.get_string(FAVORITES_KEY).unwrap().as_deref(),
            Some(r#"["x"]"#)
        );
    }

    #[test]
    fn test_order_places_follows_favorites() {
        let favorites = FavoritesStore::load(Arc::new(MemoryStorage::new()));
        for id in ["b", "gone", "a"] {
            favorites.toggle(&id.into());
        }

        let ordered = favorites.order_places(vec![place("a"), place("b"), place("z")]);
        let ids: Vec<&str> = ordered.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_clones_share_state() {
        let favorites = FavoritesStore::load(Arc::new(MemoryStorage::new()));
        let other = favorites.clone();
        favorites.toggle(&"a".into());
        assert!(other.is_favorite(&"a".into()));
        assert_eq!(other.len(), 1);
    }
}
