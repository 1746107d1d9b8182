//! UI panels for the application
//!
//! Panels only draw controller views and record what the user asked for as
//! [`UiAction`]s; the app dispatches them after the frame's layout is done.

use crate::app::state::{FavoritesList, Page, TilesProvider, UiSettings};
use egui::{Color32, RichText, Ui};
use voyonx_lib::{
    Direction, DiscoveryView, Place, PlaceId, PlaceLookup, RouteAction, RoutePageView, RouteStatus,
    StopRow,
};

/// Something the user asked for during this frame
#[derive(Clone, Debug, PartialEq)]
pub enum UiAction {
    Navigate(Page),
    SelectCategory(Option<String>),
    SetSearch(String),
    CloseSearch,
    NearMe,
    FocusPlace(PlaceId),
    ToggleFavorite(PlaceId),
    ToggleInRoute(PlaceId),
    Route(RouteAction),
    ConfirmReset,
    CancelReset,
    ToggleVisited(PlaceId),
    MoveStop(PlaceId, Direction),
    RemoveStop(PlaceId),
}

const VISITED_COLOR: Color32 = Color32::from_rgb(0x22, 0xC5, 0x5E);
const NEXT_COLOR: Color32 = Color32::from_rgb(0xFF, 0x57, 0x22);

/// Page tabs and tile provider selection
pub fn top_bar(ctx: &egui::Context, settings: &mut UiSettings, actions: &mut Vec<UiAction>) {
    egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.label(RichText::new("Voyonx").strong());
            ui.separator();

            let current = settings.page.clone();
            for (page, label) in [
                (Page::Discover, "🗺 Discover"),
                (Page::Route, "🚶 My Route"),
                (Page::Favorites, "★ Favorites"),
            ] {
                let selected = match (&current, &page) {
                    (Page::PlaceDetail(_), Page::Discover) => true,
                    (a, b) => a == b,
                };
                if ui.selectable_label(selected, label).clicked() && current != page {
                    actions.push(UiAction::Navigate(page));
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                egui::ComboBox::from_id_salt("tiles_provider")
                    .selected_text(settings.tiles_provider.name())
                    .show_ui(ui, |ui| {
                        for provider in TilesProvider::all() {
                            ui.selectable_value(
                                &mut settings.tiles_provider,
                                *provider,
                                provider.name(),
                            );
                        }
                    });
            });
        });
    });
}

/// Render the sidebar toggle button (overlaid on top-right of map)
pub fn sidebar_toggle_button(ui: &mut Ui, sidebar_open: &mut bool) {
    let button_size = egui::vec2(40.0, 40.0);
    let margin = 10.0;

    let rect = ui.max_rect();
    let button_pos = rect.right_top() + egui::vec2(-button_size.x - margin, margin);
    let button_rect = egui::Rect::from_min_size(button_pos, button_size);

    let response = ui.allocate_rect(button_rect, egui::Sense::click());
    if response.clicked() {
        *sidebar_open = !*sidebar_open;
    }

    let bg_color = if response.hovered() {
        ui.visuals().widgets.hovered.bg_fill
    } else {
        ui.visuals().widgets.inactive.bg_fill
    };
    ui.painter().rect_filled(button_rect, 5.0, bg_color);

    let icon = if *sidebar_open { "✕" } else { "☰" };
    ui.painter().text(
        button_rect.center(),
        egui::Align2::CENTER_CENTER,
        icon,
        egui::FontId::proportional(20.0),
        ui.visuals().text_color(),
    );
}

/// Tile attribution along the bottom edge of the map
pub fn attribution(ui: &Ui, text: &str) {
    let screen_rect = ui.max_rect();
    ui.painter().text(
        screen_rect.center_bottom() + egui::vec2(0.0, -5.0),
        egui::Align2::CENTER_BOTTOM,
        text,
        egui::FontId::proportional(10.0),
        Color32::from_black_alpha(180),
    );
}

/// Render a sidebar (responsive: side on landscape, bottom on portrait)
pub fn render_sidebar(ctx: &egui::Context, id: &str, add_contents: impl FnOnce(&mut Ui, bool)) {
    let screen_size = ctx.viewport_rect().size();
    let is_portrait = screen_size.y > screen_size.x;

    if is_portrait {
        egui::TopBottomPanel::bottom(egui::Id::new(id))
            .default_height(280.0)
            .min_height(180.0)
            .max_height(ctx.viewport_rect().height() * 0.6)
            .resizable(true)
            .show(ctx, |ui| add_contents(ui, true));
    } else {
        egui::SidePanel::right(egui::Id::new(id))
            .default_width(320.0)
            .min_width(260.0)
            .max_width(450.0)
            .resizable(true)
            .show(ctx, |ui| add_contents(ui, false));
    }
}

fn place_subtitle(place: &Place) -> String {
    let category = voyonx_lib::utils::clean(place.category.as_deref());
    let address = voyonx_lib::utils::clean(place.address.as_deref());
    match (category.is_empty(), address.is_empty()) {
        (false, false) => format!("{} · {}", category, address),
        (false, true) => category.to_owned(),
        (true, false) => address.to_owned(),
        (true, true) => String::new(),
    }
}

/// Discover sidebar: categories, search, "near me" and the visible places
pub fn discover_sidebar(
    ui: &mut Ui,
    view: &DiscoveryView,
    search_text: &mut String,
    actions: &mut Vec<UiAction>,
) {
    ui.horizontal(|ui| {
        let response = ui.add(
            egui::TextEdit::singleline(search_text)
                .hint_text("🔍 Search places")
                .desired_width(ui.available_width() - 90.0),
        );
        if response.changed() {
            actions.push(UiAction::SetSearch(search_text.clone()));
        }
        if response.lost_focus() && view.search_open {
            actions.push(UiAction::CloseSearch);
        }

        let near_label = if view.locating { "⏳ Locating" } else { "📍 Near me" };
        if ui
            .add_enabled(!view.locating, egui::Button::new(near_label))
            .clicked()
        {
            actions.push(UiAction::NearMe);
        }
    });

    if view.search_open && view.filter.is_searching() {
        egui::Frame::group(ui.style()).show(ui, |ui| {
            if view.search_results.is_empty() {
                ui.label(RichText::new("No matches").weak());
            }
            for place in &view.search_results {
                if ui.selectable_label(false, &place.title).clicked() {
                    actions.push(UiAction::FocusPlace(place.id.clone()));
                }
            }
        });
    }

    ui.add_space(4.0);
    ui.horizontal_wrapped(|ui| {
        for category in &view.categories {
            let selected = view.filter.near.is_none()
                && !view.filter.is_searching()
                && view.filter.category.as_deref() == Some(category.as_str());
            if ui.selectable_label(selected, category).clicked() && !selected {
                actions.push(UiAction::SelectCategory(Some(category.clone())));
            }
        }
    });
    if view.filter.near.is_some() {
        ui.label(
            RichText::new(format!(
                "📍 Within {} km of you",
                voyonx_lib::discovery::NEAR_RADIUS_KM
            ))
            .color(ui.visuals().warn_fg_color),
        );
    }

    ui.separator();

    if let Some(place) = &view.selected {
        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.label(RichText::new(&place.title).strong());
            let subtitle = place_subtitle(place);
            if !subtitle.is_empty() {
                ui.label(RichText::new(subtitle).small());
            }
            if ui.button("Details ›").clicked() {
                actions.push(UiAction::Navigate(Page::PlaceDetail(place.id.clone())));
            }
        });
        ui.add_space(4.0);
    }

    if view.loading {
        ui.spinner();
        return;
    }

    ui.label(RichText::new(format!("{} places", view.visible.len())).weak());
    egui::ScrollArea::vertical()
        .id_salt("visible_places_scroll")
        .auto_shrink([false, false])
        .show(ui, |ui| {
            for place in &view.visible {
                let selected = view.selected.as_ref().is_some_and(|s| s.id == place.id);
                ui.horizontal(|ui| {
                    if ui.selectable_label(selected, &place.title).clicked() {
                        actions.push(UiAction::FocusPlace(place.id.clone()));
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("›").on_hover_text("Details").clicked() {
                            actions.push(UiAction::Navigate(Page::PlaceDetail(place.id.clone())));
                        }
                    });
                });
            }
        });
}

fn status_text(status: RouteStatus) -> &'static str {
    match status {
        RouteStatus::Empty => "Your route is empty",
        RouteStatus::Populating => "Ready to start",
        RouteStatus::InProgress => "On your way",
        RouteStatus::Completed => "Route completed 🎉",
    }
}

/// "My Route" sidebar: progress, journey actions and the stop list
pub fn route_sidebar(
    ui: &mut Ui,
    view: &RoutePageView,
    signed_in: bool,
    scroll_to: Option<&PlaceId>,
    actions: &mut Vec<UiAction>,
) {
    if !signed_in {
        ui.label(RichText::new("Sign in to build your own route.").strong());
        return;
    }
    if view.loading {
        ui.spinner();
        return;
    }

    ui.label(RichText::new(status_text(view.status)).strong());
    ui.add(
        egui::ProgressBar::new(f32::from(view.progress.percent) / 100.0).text(format!(
            "{}/{} visited",
            view.progress.visited, view.progress.total
        )),
    );
    if let Some(summary) = view.summary {
        ui.label(format!(
            "🚶 {:.1} km · {} min",
            summary.distance_km, summary.duration_min
        ));
    }
    if view.journey_on
        && let Some(next) = &view.next_place
    {
        ui.label(RichText::new(format!("Next: {}", next.title)).color(NEXT_COLOR));
    }

    ui.add_space(4.0);
    ui.horizontal_wrapped(|ui| {
        for button in &view.actions.buttons {
            if ui
                .add_enabled(button.enabled, egui::Button::new(button.action.label()))
                .clicked()
            {
                actions.push(UiAction::Route(button.action));
            }
        }
    });

    ui.separator();

    if view.rows.is_empty() {
        ui.label(RichText::new("Add places from Discover to plan your route.").weak());
        return;
    }

    let last = view.rows.len();
    egui::ScrollArea::vertical()
        .id_salt("route_stops_scroll")
        .auto_shrink([false, false])
        .show(ui, |ui| {
            for row in &view.rows {
                let response = stop_row(ui, row, last, actions);
                if scroll_to == Some(&row.place.id) {
                    response.scroll_to_me(Some(egui::Align::Center));
                }
            }
        });
}

fn stop_row(ui: &mut Ui, row: &StopRow, last: usize, actions: &mut Vec<UiAction>) -> egui::Response {
    let place = &row.place.id;
    ui.horizontal(|ui| {
        let visited = row.stop.is_visited();
        let badge = RichText::new(format!("{:>2}", row.ordinal)).strong().color(if visited {
            VISITED_COLOR
        } else {
            NEXT_COLOR
        });
        ui.label(badge);

        let mut title = RichText::new(&row.place.title);
        if visited {
            title = title.strikethrough().weak();
        } else if row.is_next {
            title = title.strong();
        }
        ui.label(title);

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.small_button("🗑").on_hover_text("Remove").clicked() {
                actions.push(UiAction::RemoveStop(place.clone()));
            }
            if ui
                .add_enabled(row.ordinal < last, egui::Button::new("⏷").small())
                .clicked()
            {
                actions.push(UiAction::MoveStop(place.clone(), Direction::Down));
            }
            if ui
                .add_enabled(row.ordinal > 1, egui::Button::new("⏶").small())
                .clicked()
            {
                actions.push(UiAction::MoveStop(place.clone(), Direction::Up));
            }
            let mark = if visited { "↺" } else { "✔" };
            if ui
                .small_button(mark)
                .on_hover_text(if visited { "Mark unvisited" } else { "Mark visited" })
                .clicked()
            {
                actions.push(UiAction::ToggleVisited(place.clone()));
            }
        });
    })
    .response
}

/// Reset confirmation prompt
pub fn confirm_reset_dialog(ctx: &egui::Context, actions: &mut Vec<UiAction>) {
    egui::Window::new("Reset route?")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label("All stops will be removed from your route.");
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                if ui.button("Reset").clicked() {
                    actions.push(UiAction::ConfirmReset);
                }
                if ui.button("Cancel").clicked() {
                    actions.push(UiAction::CancelReset);
                }
            });
        });
}

/// Geolocation failure message; closing it clears the message
pub fn location_error_dialog(ctx: &egui::Context, message: &mut Option<String>) {
    let Some(text) = message.as_deref() else {
        return;
    };
    let mut close = false;
    egui::Window::new("Location")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_TOP, [0.0, 60.0])
        .show(ctx, |ui| {
            ui.label(text);
            if ui.button("OK").clicked() {
                close = true;
            }
        });
    if close {
        *message = None;
    }
}

pub fn favorites_page(ctx: &egui::Context, list: &FavoritesList, actions: &mut Vec<UiAction>) {
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.heading("★ Favorites");
        ui.separator();

        if list.loading {
            ui.spinner();
            return;
        }
        if let Some(error) = &list.error {
            ui.label(RichText::new(format!("⚠ {}", error)).color(Color32::RED));
        }
        if list.places.is_empty() {
            ui.label(RichText::new("No favorites yet. Tap ☆ on a place to keep it here.").weak());
            return;
        }

        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for place in &list.places {
                    ui.horizontal(|ui| {
                        if ui.link(&place.title).clicked() {
                            actions.push(UiAction::Navigate(Page::PlaceDetail(place.id.clone())));
                        }
                        let subtitle = place_subtitle(place);
                        if !subtitle.is_empty() {
                            ui.label(RichText::new(subtitle).small().weak());
                        }
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.small_button("★").on_hover_text("Remove favorite").clicked() {
                                actions.push(UiAction::ToggleFavorite(place.id.clone()));
                            }
                        });
                    });
                }
            });
    });
}

/// What the detail page shows besides the place itself
pub struct PlaceDetailState {
    pub is_favorite: bool,
    pub in_route: bool,
    pub signed_in: bool,
}

pub fn place_detail_page(
    ctx: &egui::Context,
    lookup: &PlaceLookup,
    state: &PlaceDetailState,
    actions: &mut Vec<UiAction>,
) {
    egui::CentralPanel::default().show(ctx, |ui| {
        if ui.button("‹ Back").clicked() {
            actions.push(UiAction::Navigate(Page::Discover));
        }
        ui.separator();

        let place = match lookup {
            PlaceLookup::Found(place) => place,
            PlaceLookup::Loading(_) | PlaceLookup::Idle => {
                ui.spinner();
                return;
            }
            PlaceLookup::NotFound(_) => {
                ui.label(RichText::new("This place is not available.").weak());
                return;
            }
            PlaceLookup::Failed(_) => {
                ui.colored_label(ui.visuals().error_fg_color, "Could not load this place.");
                return;
            }
        };

        ui.heading(&place.title);
        let subtitle = place_subtitle(place);
        if !subtitle.is_empty() {
            ui.label(RichText::new(subtitle).weak());
        }
        let description = voyonx_lib::utils::clean(place.description.as_deref());
        if !description.is_empty() {
            ui.add_space(8.0);
            ui.label(description);
        }
        ui.add_space(12.0);

        ui.horizontal(|ui| {
            let star = if state.is_favorite { "★ Favorite" } else { "☆ Add to favorites" };
            if ui.button(star).clicked() {
                actions.push(UiAction::ToggleFavorite(place.id.clone()));
            }

            let route_label = if state.in_route { "➖ Remove from route" } else { "➕ Add to route" };
            if ui
                .add_enabled(state.signed_in, egui::Button::new(route_label))
                .on_disabled_hover_text("Sign in to build a route")
                .clicked()
            {
                actions.push(UiAction::ToggleInRoute(place.id.clone()));
            }

            if ui.button("📍 Show on map").clicked() {
                actions.push(UiAction::Navigate(Page::Discover));
                actions.push(UiAction::FocusPlace(place.id.clone()));
            }
        });

        ui.add_space(8.0);
        ui.hyperlink_to("🚕 Ride there", place.ride_link());
    });
}
