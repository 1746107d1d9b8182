#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use voyonx::Settings;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_cli();
    voyonx::setup_logging();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    voyonx::run_native(settings, runtime.handle().clone())?;
    Ok(())
}
