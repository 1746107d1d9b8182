//! Application state shared by the pages
//!
//! Navigation, tile provider choice and the small amount of per-page UI state
//! that is not owned by the library controllers.

use voyonx_lib::{Place, PlaceId};

/// Top-level pages
#[derive(Clone, Debug, PartialEq)]
pub enum Page {
    Discover,
    Route,
    Favorites,
    PlaceDetail(PlaceId),
}

impl Page {
    /// Name used for persistence; place details restore to Discover
    pub fn key(&self) -> &'static str {
        match self {
            Self::Discover | Self::PlaceDetail(_) => "Discover",
            Self::Route => "Route",
            Self::Favorites => "Favorites",
        }
    }

    pub fn from_key(key: &str) -> Self {
        match key {
            "Route" => Self::Route,
            "Favorites" => Self::Favorites,
            _ => Self::Discover,
        }
    }
}

/// Available map tile providers
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TilesProvider {
    OpenStreetMap,
    OpenTopoMap,
}

impl TilesProvider {
    pub fn attribution(&self) -> &'static str {
        match self {
            Self::OpenStreetMap => "© OpenStreetMap contributors",
            Self::OpenTopoMap => "© OpenTopoMap (CC-BY-SA)",
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::OpenStreetMap, Self::OpenTopoMap]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenStreetMap => "OpenStreetMap",
            Self::OpenTopoMap => "OpenTopoMap",
        }
    }

    pub fn from_name(name: &str) -> Self {
        Self::all()
            .iter()
            .copied()
            .find(|provider| provider.name() == name)
            .unwrap_or(Self::OpenStreetMap)
    }
}

/// UI-specific settings that can be adjusted at runtime
#[derive(Clone, Debug)]
pub struct UiSettings {
    pub page: Page,
    pub tiles_provider: TilesProvider,
    pub sidebar_open: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            page: Page::Discover,
            tiles_provider: TilesProvider::OpenStreetMap,
            sidebar_open: true,
        }
    }
}

/// Favorites page contents, refetched whenever the page is opened
#[derive(Default)]
pub struct FavoritesList {
    pub loading: bool,
    pub places: Vec<Place>,
    pub error: Option<String>,
}

/// Persisted settings (lightweight, nothing fetched from the network)
#[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
pub struct PersistedSettings {
    pub page: String,
    pub tiles_provider: String,
    pub sidebar_open: bool,
}

pub const PERSISTED_SETTINGS_KEY: &str = "persisted_settings";

impl From<&UiSettings> for PersistedSettings {
    fn from(settings: &UiSettings) -> Self {
        Self {
            page: settings.page.key().to_owned(),
            tiles_provider: settings.tiles_provider.name().to_owned(),
            sidebar_open: settings.sidebar_open,
        }
    }
}

impl From<PersistedSettings> for UiSettings {
    fn from(settings: PersistedSettings) -> Self {
        Self {
            page: Page::from_key(&settings.page),
            tiles_provider: TilesProvider::from_name(&settings.tiles_provider),
            sidebar_open: settings.sidebar_open,
        }
    }
}

/// Restore UI settings from their JSON form, falling back to defaults
pub fn restore_ui_settings(json: Option<&str>) -> UiSettings {
    if let Some(json) = json
        && !json.is_empty()
    {
        match serde_json::from_str::<PersistedSettings>(json) {
            Ok(settings) => {
                tracing::info!("Restored settings");
                return settings.into();
            }
            Err(e) => tracing::warn!("Ignoring unreadable persisted settings: {}", e),
        }
    }
    tracing::info!("No persisted settings found, starting fresh");
    UiSettings::default()
}
