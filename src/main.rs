mod core;
mod gui;
mod identify;
mod video;

use eframe::egui;
use gui::CardScoutApp;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 780.0])
            .with_title("Card Scout - Frame Capture Card Identifier"),
        ..Default::default()
    };

    eframe::run_native(
        "Card Scout",
        options,
        Box::new(|cc| {
            match CardScoutApp::new(cc) {
                Ok(app) => Ok(Box::new(app)),
                Err(e) => {
                    eprintln!("Failed to initialize app: {}", e);
                    std::process::exit(1);
                }
            }
        }),
    ).map_err(|e| anyhow::anyhow!("Failed to run app: {}", e))?;

    Ok(())
}
