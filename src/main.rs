use std::sync::Arc;

use eframe::egui;
use eyre::Context;
use region_map_view::{
    config::ViewerConfig, regions::RegionTable, service::IServerFeatureService, style::MapStyle,
    viewer::RegionViewer,
};

fn main() -> eyre::Result<()> {
    env_logger::init();

    // The only argument is an optional configuration file.
    let config = match std::env::args().nth(1) {
        Some(path) => ViewerConfig::from_file(&path)
            .with_context(|| format!("Failed to read configuration from {}", path))?,
        None => ViewerConfig::default(),
    };
    let style = MapStyle::embedded().context("Failed to parse the basemap style")?;
    let regions = RegionTable::embedded().context("Failed to parse the region table")?;
    let service = Arc::new(
        IServerFeatureService::new(config.service_url.clone()).with_data_crs(config.data_crs),
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1024.0, 768.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Region map view",
        options,
        Box::new(move |_cc| {
            let mut viewer = RegionViewer::new(config, style, regions, service);
            viewer.mount();
            Ok(Box::new(viewer))
        }),
    )
    .map_err(|e| eyre::eyre!("{}", e))
}
