//! Voyonx application
//!
//! Owns the library controllers, the two map views (Discover and My Route)
//! and the tokio handle their async work runs on. Every frame the app draws
//! the controllers' current views, collects [`UiAction`]s and dispatches them;
//! anything that touches the network is spawned and repaints when done.

pub(crate) mod settings;
mod state;
mod ui_panels;
mod widget;

use settings::Settings;
use state::{FavoritesList, PERSISTED_SETTINGS_KEY, Page, PersistedSettings, TilesProvider, UiSettings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use ui_panels::{PlaceDetailState, UiAction};
use voyonx_lib::auth::AuthProvider;
use voyonx_lib::remote::RestConfig;
use voyonx_lib::storage::default_storage_backend;
use voyonx_lib::{
    DirectionsResolver, DiscoveryPage, FavoritesStore, InMemoryStore, MapboxDirections,
    MemoryStorage, PlaceDetailPage, RemoteStore, RestStore, RouteAction, RoutePage, RouteStore,
    StaticGeolocator, StaticSession, StorageBackend, UserId,
};
use walkers::{
    HttpTiles, Map, MapMemory, TileId,
    sources::{Attribution, OpenStreetMap, TileSource},
};
use widget::{MapClick, SceneHandle, WalkersWidget};

/// Map center before anything has been fitted
const HOME: (f64, f64) = (40.3777, 49.8520);

/// Custom OpenTopoMap tile source
pub struct OpenTopoMap;

impl TileSource for OpenTopoMap {
    fn tile_url(&self, tile_id: TileId) -> String {
        format!(
            "https://tile.opentopomap.org/{}/{}/{}.png",
            tile_id.zoom, tile_id.x, tile_id.y
        )
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            text: "© OpenTopoMap (CC-BY-SA)",
            url: "https://opentopomap.org/",
            logo_light: None,
            logo_dark: None,
        }
    }

    fn max_zoom(&self) -> u8 {
        17
    }
}

/// One interactive map: camera plus scene
struct MapView {
    memory: MapMemory,
    scene: SceneHandle,
}

impl MapView {
    fn new() -> Self {
        Self {
            memory: MapMemory::default(),
            scene: SceneHandle::default(),
        }
    }
}

/// Main application structure
pub struct VoyonxApp {
    ui_settings: UiSettings,

    runtime: tokio::runtime::Handle,
    remote: Arc<dyn RemoteStore>,
    session: Arc<StaticSession>,
    favorites: FavoritesStore,
    route_page: RoutePage<WalkersWidget>,
    discovery: DiscoveryPage<WalkersWidget>,
    place_detail: PlaceDetailPage,

    discover_map: MapView,
    route_map: MapView,
    tiles_osm: HttpTiles,
    tiles_otm: HttpTiles,

    favorites_list: Arc<Mutex<FavoritesList>>,
    /// Set while an idle notification is being delivered to the route page
    idle_in_flight: Arc<AtomicBool>,
    search_text: String,
    location_error: Option<String>,
}

fn build_remote(settings: &Settings) -> Arc<dyn RemoteStore> {
    if settings.is_online() {
        let base_url = settings.rest_url.clone().unwrap_or_default();
        tracing::info!("Using hosted database at {}", base_url);
        Arc::new(RestStore::new(RestConfig {
            base_url,
            api_key: settings.anon_key.clone(),
            access_token: settings.access_token.clone(),
        }))
    } else {
        tracing::info!("Offline mode: using the demo catalog");
        Arc::new(InMemoryStore::demo())
    }
}

fn build_favorites(settings: &Settings) -> FavoritesStore {
    let backend: Arc<dyn StorageBackend> =
        match default_storage_backend(settings.favorites_file.clone()) {
            Ok(backend) => Arc::from(backend),
            Err(e) => {
                tracing::warn!("Favorites will not persist this session: {}", e);
                Arc::new(MemoryStorage::new())
            }
        };
    FavoritesStore::load(backend)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl VoyonxApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        settings: Settings,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        let ui_settings = if settings.ignore_persisted {
            tracing::info!("Ignoring persisted state (--ignore-persisted flag)");
            UiSettings::default()
        } else {
            let json = cc.storage.and_then(|s| s.get_string(PERSISTED_SETTINGS_KEY));
            state::restore_ui_settings(json.as_deref())
        };

        let remote = build_remote(&settings);
        let session = Arc::new(StaticSession::new(settings.user_id.clone().map(UserId::from)));
        let store = RouteStore::new(remote.clone(), session.clone());

        let directions = MapboxDirections::new(
            settings.directions_url.clone(),
            settings.directions_token.clone(),
        );
        let resolver = DirectionsResolver::new(Arc::new(directions))
            .with_profile(settings.routing_profile.into());

        let route_page = RoutePage::new(store, remote.clone(), Arc::new(resolver));
        let discovery = DiscoveryPage::new(
            remote.clone(),
            Arc::new(StaticGeolocator(settings.location)),
        );
        let place_detail = PlaceDetailPage::new(remote.clone());

        let app = Self {
            ui_settings,
            runtime,
            remote,
            session,
            favorites: build_favorites(&settings),
            route_page,
            discovery,
            place_detail,
            discover_map: MapView::new(),
            route_map: MapView::new(),
            tiles_osm: HttpTiles::new(OpenStreetMap, cc.egui_ctx.clone()),
            tiles_otm: HttpTiles::new(OpenTopoMap, cc.egui_ctx.clone()),
            favorites_list: Arc::new(Mutex::new(FavoritesList::default())),
            idle_in_flight: Arc::new(AtomicBool::new(false)),
            search_text: String::new(),
            location_error: None,
        };

        app.enter_page(&cc.egui_ctx, &app.ui_settings.page.clone());
        app
    }

    fn signed_in(&self) -> bool {
        self.session.current_user().is_some()
    }

    /// Run `task` on the runtime and repaint once it finishes
    fn spawn(&self, ctx: &egui::Context, task: impl Future<Output = ()> + Send + 'static) {
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            task.await;
            ctx.request_repaint();
        });
    }

    /// Mount `page` and start whatever loading it needs
    fn enter_page(&self, ctx: &egui::Context, page: &Page) {
        match page {
            Page::Discover => {
                self.discovery.attach(|| self.discover_map.scene.widget());
                if !self.discovery.is_loaded() {
                    let discovery = self.discovery.clone();
                    self.spawn(ctx, async move { discovery.load().await });
                }
            }
            Page::Route => {
                self.route_page.attach(|| self.route_map.scene.widget());
                let route_page = self.route_page.clone();
                self.spawn(ctx, async move { route_page.open().await });
            }
            Page::Favorites => self.refresh_favorites(ctx),
            Page::PlaceDetail(id) => {
                if self.place_detail.open(id, self.discovery.place(id)) {
                    let place_detail = self.place_detail.clone();
                    self.spawn(ctx, async move { place_detail.fetch().await });
                }

                // Keeps the in-route state of the detail page current
                let store = self.route_page.store().clone();
                self.spawn(ctx, async move {
                    if let Err(e) = store.refresh().await {
                        tracing::debug!("Route refresh for place details: {}", e);
                    }
                });
            }
        }
    }

    /// Release what `page` holds; loads still in flight are dropped
    fn leave_page(&self, page: &Page) {
        match page {
            Page::Discover => self.discovery.teardown(),
            Page::Route => self.route_page.teardown(),
            Page::Favorites => {}
            Page::PlaceDetail(_) => self.place_detail.close(),
        }
    }

    fn refresh_favorites(&self, ctx: &egui::Context) {
        let ids = self.favorites.ids();
        let favorites = self.favorites.clone();
        let remote = self.remote.clone();
        let list = self.favorites_list.clone();
        lock(&list).loading = true;

        self.spawn(ctx, async move {
            let result = if ids.is_empty() {
                Ok(Vec::new())
            } else {
                remote.places_by_ids(&ids).await
            };
            let mut list = lock(&list);
            list.loading = false;
            match result {
                Ok(places) => {
                    list.places = favorites.order_places(places);
                    list.error = None;
                }
                Err(e) => {
                    tracing::error!("Loading favorites failed: {}", e);
                    list.error = Some("Could not load your favorites.".to_owned());
                }
            }
        });
    }

    fn dispatch(&mut self, ctx: &egui::Context, action: UiAction) {
        tracing::trace!("UI action: {:?}", action);
        match action {
            UiAction::Navigate(page) => {
                if page != self.ui_settings.page {
                    self.leave_page(&self.ui_settings.page);
                    self.enter_page(ctx, &page);
                    self.ui_settings.page = page;
                }
            }
            UiAction::SelectCategory(category) => {
                self.search_text.clear();
                self.discovery.select_category(category);
            }
            UiAction::SetSearch(text) => self.discovery.set_search(&text),
            UiAction::CloseSearch => self.discovery.close_search(),
            UiAction::NearMe => {
                let discovery = self.discovery.clone();
                self.search_text.clear();
                self.spawn(ctx, async move { discovery.near_me().await });
            }
            UiAction::FocusPlace(place) => self.discovery.click_marker(&place),
            UiAction::ToggleFavorite(place) => {
                let now_favorite = self.favorites.toggle(&place);
                if !now_favorite {
                    lock(&self.favorites_list).places.retain(|p| p.id != place);
                }
            }
            UiAction::ToggleInRoute(place) => {
                let store = self.route_page.store().clone();
                self.spawn(ctx, async move {
                    if let Err(e) = store.toggle_in_route(&place).await {
                        tracing::error!("Updating route failed: {}", e);
                    }
                });
            }
            UiAction::Route(route_action) => self.dispatch_route(ctx, route_action),
            UiAction::ConfirmReset => {
                let route_page = self.route_page.clone();
                self.spawn(ctx, async move { route_page.confirm_reset().await });
            }
            UiAction::CancelReset => self.route_page.cancel_reset(),
            UiAction::ToggleVisited(place) => {
                let route_page = self.route_page.clone();
                self.spawn(ctx, async move { route_page.toggle_visited(&place).await });
            }
            UiAction::MoveStop(place, direction) => {
                let route_page = self.route_page.clone();
                self.spawn(ctx, async move { route_page.move_stop(&place, direction).await });
            }
            UiAction::RemoveStop(place) => {
                let route_page = self.route_page.clone();
                self.spawn(ctx, async move { route_page.remove_stop(&place).await });
            }
        }
    }

    fn dispatch_route(&mut self, ctx: &egui::Context, action: RouteAction) {
        let route_page = self.route_page.clone();
        match action {
            RouteAction::StartJourney => {
                self.spawn(ctx, async move {
                    route_page.start_journey().await;
                });
            }
            RouteAction::MarkNextVisited => {
                self.spawn(ctx, async move { route_page.mark_next_visited().await });
            }
            RouteAction::StopJourney => route_page.stop_journey(),
            RouteAction::Reset => {
                route_page.request_reset();
            }
            RouteAction::Explore => self.dispatch(ctx, UiAction::Navigate(Page::Discover)),
            RouteAction::CreateNewRoute => {
                // A finished route is cleared without asking
                if route_page.request_reset() {
                    self.spawn(ctx, async move { route_page.confirm_reset().await });
                }
            }
        }
    }

    /// Deliver a pending route line once the route map has settled
    fn poll_route_map_idle(&self, ctx: &egui::Context) {
        if !self.route_page.has_deferred_line() || !self.route_map.scene.is_idle() {
            return;
        }
        if self.idle_in_flight.swap(true, Ordering::AcqRel) {
            return;
        }
        let route_page = self.route_page.clone();
        let in_flight = self.idle_in_flight.clone();
        self.spawn(ctx, async move {
            route_page.on_map_idle().await;
            in_flight.store(false, Ordering::Release);
        });
    }

    fn show_map(&mut self, ctx: &egui::Context, route: bool) {
        let tiles_provider = self.ui_settings.tiles_provider;
        let view = if route {
            &mut self.route_map
        } else {
            &mut self.discover_map
        };
        let sidebar_open = &mut self.ui_settings.sidebar_open;
        let tiles: &mut HttpTiles = match tiles_provider {
            TilesProvider::OpenStreetMap => &mut self.tiles_osm,
            TilesProvider::OpenTopoMap => &mut self.tiles_otm,
        };

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                profiling::scope!("map_panel");

                if view.scene.apply_camera(&mut view.memory) {
                    ctx.request_repaint();
                }

                let map = Map::new(
                    Some(tiles),
                    &mut view.memory,
                    walkers::lat_lon(HOME.0, HOME.1),
                )
                .with_plugin(view.scene.plugin());
                ui.add(map);

                ui_panels::sidebar_toggle_button(ui, sidebar_open);
                ui_panels::attribution(ui, tiles_provider.attribution());
            });
    }

    fn handle_map_clicks(&mut self, actions: &mut Vec<UiAction>) {
        match self.discover_map.scene.take_click() {
            Some(MapClick::Marker(place)) => actions.push(UiAction::FocusPlace(place)),
            Some(MapClick::Empty) => self.discovery.click_map(),
            None => {}
        }
        if let Some(MapClick::Marker(place)) = self.route_map.scene.take_click() {
            actions.push(UiAction::Navigate(Page::PlaceDetail(place)));
        }
    }
}

#[profiling::all_functions]
impl eframe::App for VoyonxApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut actions = Vec::new();

        ui_panels::top_bar(ctx, &mut self.ui_settings, &mut actions);

        if let Some(message) = self.discovery.take_location_error() {
            self.location_error = Some(message);
        }
        ui_panels::location_error_dialog(ctx, &mut self.location_error);

        match self.ui_settings.page.clone() {
            Page::Discover => {
                let view = self.discovery.view();
                if self.ui_settings.sidebar_open {
                    let search_text = &mut self.search_text;
                    ui_panels::render_sidebar(ctx, "discover_sidebar", |ui, _| {
                        ui_panels::discover_sidebar(ui, &view, search_text, &mut actions);
                    });
                }
                self.show_map(ctx, false);
            }
            Page::Route => {
                let view = self.route_page.view();
                let signed_in = self.signed_in();
                let scroll_to = self.route_page.take_scroll_request();
                if self.ui_settings.sidebar_open {
                    ui_panels::render_sidebar(ctx, "route_sidebar", |ui, _| {
                        ui_panels::route_sidebar(
                            ui,
                            &view,
                            signed_in,
                            scroll_to.as_ref(),
                            &mut actions,
                        );
                    });
                }
                if view.confirm_reset_pending {
                    ui_panels::confirm_reset_dialog(ctx, &mut actions);
                }
                self.show_map(ctx, true);
                self.poll_route_map_idle(ctx);
            }
            Page::Favorites => {
                let list = lock(&self.favorites_list);
                ui_panels::favorites_page(ctx, &list, &mut actions);
            }
            Page::PlaceDetail(id) => {
                let lookup = self.place_detail.lookup();
                let state = PlaceDetailState {
                    is_favorite: self.favorites.is_favorite(&id),
                    in_route: self.route_page.store().is_in_route(&id),
                    signed_in: self.signed_in(),
                };
                ui_panels::place_detail_page(ctx, &lookup, &state, &mut actions);
            }
        }

        self.handle_map_clicks(&mut actions);
        for action in actions {
            self.dispatch(ctx, action);
        }
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        match serde_json::to_string(&PersistedSettings::from(&self.ui_settings)) {
            Ok(json) => storage.set_string(PERSISTED_SETTINGS_KEY, json),
            Err(e) => tracing::warn!("Failed to persist settings: {}", e),
        }
    }
}

impl Drop for VoyonxApp {
    fn drop(&mut self) {
        self.route_page.teardown();
        self.discovery.teardown();
    }
}
