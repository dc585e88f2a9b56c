//! Argos ViewFinder - multi-camera acquisition viewer

use std::sync::Arc;

use argos::capture::sim::SimCameraSystem;
use argos::dio::{DigitalOutput, SimDio};
use argos::display::viewer;
use argos::{Config, ViewerApp};
use clap::Parser;
use color_eyre::Result;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "argos", about = "Multi-camera acquisition viewfinder")]
struct Args {
    /// Track a single camera by its vendor identifier
    #[arg(short = 'c', long = "camera-id")]
    camera_id: Option<String>,

    /// DIO device minor number
    #[arg(short = 'a', long = "adio-minor")]
    adio_minor: Option<u32>,

    /// Number of cameras the simulated transport exposes
    #[arg(short = 'n', long = "cameras")]
    cameras: Option<usize>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,
}

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("argos=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Argos launching...");

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(cameras) = args.cameras {
        config.capture.sim_cameras = cameras;
    }
    if let Some(minor) = args.adio_minor {
        config.dio.minor = minor;
    }
    argos::CONFIG.store(Arc::new(config.clone()));

    // DIO is optional: without it the viewer runs with output lines disabled
    let dio: Option<Box<dyn DigitalOutput>> = match SimDio::open(config.dio.minor) {
        Ok(mut device) => {
            // port comes up with every line an output, driven low
            device.configure_outputs()?;
            info!(minor = device.minor(), "DIO port ready");
            Some(Box::new(device))
        }
        Err(e) => {
            warn!("could not initialize DIO ({e}); output line features disabled");
            None
        }
    };

    let system = Arc::new(SimCameraSystem::new(
        config.capture.sim_cameras,
        config.capture.clone(),
    ));
    let mut app = ViewerApp::new(system, dio, args.camera_id);
    app.refresh();
    info!(devices = app.registry().len(), "initial enumeration done");

    viewer::run(app, &config.display)?;

    info!("Argos shutting down");
    Ok(())
}
