//! Quilt viewer demo
//!
//! Loads a scene file, renders it to the window and, through a virtual
//! light-field display, to a quilt every frame.
//!
//! ```bash
//! cargo run --example quilt_viewer -- --scene demos/scenes/gallery.json --quilt 8x6
//! ```
//!
//! Controls depend on the scene's components. F12 saves the quilt; dropping
//! an image onto the window feeds depth-displacement meshes.

use clap::Parser;
use quilt_engine::quilt::parse_dimensions;
use quilt_engine::{EngineConfig, QuiltSettings, VirtualDisplay};
use std::path::PathBuf;
use winit::keyboard::KeyCode;

/// Quilt viewer arguments
#[derive(Parser, Debug)]
#[command(name = "quilt_viewer", about = "Render a scene to the window and to a light-field quilt", version)]
struct Args {
    /// Scene description (JSON)
    #[arg(long, default_value = "demos/scenes/gallery.json")]
    scene: PathBuf,

    /// Quilt tile grid as <columns>x<rows>
    #[arg(long, default_value = "8x6")]
    quilt: String,

    /// Size of one quilt view as <width>x<height>
    #[arg(long, default_value = "420x560")]
    view_size: String,

    /// Where F12 saves the quilt
    #[arg(long, default_value = "quilt.png")]
    capture: PathBuf,

    /// Skip the quilt pass
    #[arg(long)]
    no_quilt: bool,

    /// Initial window width in pixels
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height in pixels
    #[arg(long, default_value = "720")]
    height: u32,

    /// Disable vertical sync
    #[arg(long)]
    no_vsync: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = match quilt_settings(&args) {
        Ok(settings) => settings,
        Err(message) => {
            log::error!("{}", message);
            std::process::exit(2);
        }
    };

    let config = EngineConfig {
        title: "Quilt Viewer".to_string(),
        width: args.width,
        height: args.height,
        vsync: !args.no_vsync,
        ..Default::default()
    };

    let scene_path = args.scene.clone();
    let with_quilt = !args.no_quilt;
    let capture_path = args.capture.clone();

    let result = quilt_engine::window::run(
        config,
        move |engine| {
            // A broken scene file leaves the viewer running with nothing loaded
            if let Err(err) = engine.load_scene_file(&scene_path) {
                log::error!("Failed to load {:?}: {}", scene_path, err);
            }
            if with_quilt {
                engine.attach_display(Box::new(VirtualDisplay::new("virtual", settings)))?;
            }
            Ok(())
        },
        move |engine, _window, _dt| {
            if engine.input().keyboard.just_pressed(KeyCode::F12) {
                if let Err(err) = engine.capture_quilt(&capture_path) {
                    log::error!("Capture failed: {}", err);
                }
            }
        },
    );

    if let Err(err) = result {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn quilt_settings(args: &Args) -> Result<QuiltSettings, String> {
    let grid = QuiltSettings::from_grid_str(&args.quilt).map_err(|err| err.to_string())?;
    let (view_width, view_height) = parse_dimensions(&args.view_size)
        .ok_or_else(|| format!("Invalid --view-size '{}', expected <width>x<height>", args.view_size))?;
    let settings = QuiltSettings::new(grid.columns, grid.rows, view_width, view_height);
    settings.validate().map_err(|err| err.to_string())?;
    Ok(settings)
}
