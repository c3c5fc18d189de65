//! Trellis - a Wayland compositor
//!
//! Entry point: loads the configuration, builds the server, wires the
//! Wayland socket into the event loop, brings up a virtual output when no
//! hardware backend is present, and runs.

use log::{info, warn};
use wayland_server::Display;

use trellis::backend::{self, EventLoop, VirtualOutput};
use trellis::config::Config;
use trellis::input::DeviceKind;
use trellis::server::Server;

fn config_path() -> Option<std::path::PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(std::path::PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| std::path::PathBuf::from(home).join(".config")))?;
    let path = base.join("trellis").join("trellis.toml");
    path.exists().then_some(path)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting trellis");

    let config = match config_path() {
        Some(path) => Config::load(&path)?,
        None => {
            info!("No configuration file found, using defaults");
            Config::default()
        }
    };

    let mut event_loop = EventLoop::new()?;
    let display = Display::<Server>::new()?;
    let mut server = Server::new(
        display.handle(),
        event_loop.handle(),
        event_loop.signal(),
        config,
    )?;

    let socket_name = backend::init_wayland(display, &event_loop.handle())?;
    std::env::set_var("WAYLAND_DISPLAY", &socket_name);

    // Until a session backend hands us real hardware, one virtual display
    // and a virtual seat keep clients functional
    if let Err(err) = server.output_added(Box::new(VirtualOutput::new("VIRTUAL-1", 1920, 1080))) {
        warn!("Virtual output failed: {}", err);
    }
    server.add_input_device("virtual-keyboard".to_string(), DeviceKind::Keyboard);
    server.add_input_device("virtual-pointer".to_string(), DeviceKind::Pointer);

    server.run_autostart();

    event_loop.run(&mut server)
}
