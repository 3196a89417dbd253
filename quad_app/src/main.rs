//! Quad demo
//!
//! Opens a window, uploads two coloured quads and spins them until the window closes
//! or Escape is pressed.

mod window;

use frame_engine::prelude::*;
use glfw::{Action, Key, WindowEvent};

use window::Window;

const RENDERER_CONFIG: &str = "renderer.toml";
const WINDOW_CONFIG: &str = "window.toml";

/// Radians per second
const SPIN_RATE: f32 = std::f32::consts::FRAC_PI_4;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let window_config = WindowConfig::load_or_default(WINDOW_CONFIG)?;
    let renderer_config = RendererConfig::load_or_default(RENDERER_CONFIG)?;

    let mut window = Window::new(&window_config)?;
    let mut renderer = Renderer::init(&mut window, &renderer_config, &MeshData::demo_quads())?;
    log::info!(
        "Rendering {} meshes with {} frame(s) in flight",
        renderer.mesh_count(),
        renderer.scheduler().frames_in_flight()
    );

    while !window.should_close() {
        for event in window.poll_events() {
            if let WindowEvent::Key(Key::Escape, _, Action::Press, _) = event {
                window.set_should_close(true);
            }
        }

        let angle = window.time() as f32 * SPIN_RATE;
        renderer.update_model(0, Mat4::new_rotation(Vec3::z() * angle));
        renderer.update_model(1, Mat4::new_rotation(Vec3::z() * -angle));

        let frame = renderer.draw()?;
        if frame.frame_number % 600 == 0 {
            log::debug!("Frame {} on slot {} image {}", frame.frame_number, frame.slot, frame.image_index);
        }
    }

    renderer.cleanup()?;
    log::info!("Quad demo finished");
    Ok(())
}
