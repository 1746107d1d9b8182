//! Voyonx - Application Library
//!
//! The desktop application on top of `voyonx-lib`: configuration, logging,
//! the walkers map widget and the egui pages.

mod app;
mod logging;

pub use app::VoyonxApp;
pub use app::settings::Settings;
pub use logging::setup_logging;

pub const APP_NAME: &str = "Voyonx";

/// Open the main window and run until it is closed.
///
/// Async work is spawned on `runtime`, which must outlive this call.
pub fn run_native(settings: Settings, runtime: tokio::runtime::Handle) -> eframe::Result {
    tracing::info!("{} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_title(APP_NAME),
        ..Default::default()
    };

    eframe::run_native(
        APP_NAME,
        native_options,
        Box::new(move |cc| Ok(Box::new(VoyonxApp::new(cc, settings, runtime)))),
    )
}
