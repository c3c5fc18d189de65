//! Backend integration
//!
//! Event-loop plumbing and the stand-in hardware used when no session
//! backend is driving real displays:
//! - calloop event-loop wrapper carrying the server state
//! - Wayland socket and client dispatch sources
//! - a virtual output for headless operation

pub mod event_loop;
mod virtual_output;

pub use event_loop::EventLoop;
pub use virtual_output::VirtualOutput;

use std::os::unix::io::AsFd;
use std::sync::Arc;

use calloop::generic::Generic;
use calloop::signals::{Signal, Signals};
use calloop::{Interest, LoopHandle, Mode, PostAction};
use log::{debug, error, info};
use wayland_server::{Display, ListeningSocket};

use crate::server::Server;

/// Per-client connection state
#[derive(Debug)]
struct ClientState;

impl wayland_server::backend::ClientData for ClientState {
    fn initialized(&self, _client_id: wayland_server::backend::ClientId) {
        debug!("Client initialized");
    }

    fn disconnected(
        &self,
        _client_id: wayland_server::backend::ClientId,
        reason: wayland_server::backend::DisconnectReason,
    ) {
        debug!("Client disconnected: {:?}", reason);
    }
}

/// Bind the listening socket and wire all server event sources into the
/// loop; returns the socket name for WAYLAND_DISPLAY
pub fn init_wayland(
    mut display: Display<Server>,
    handle: &LoopHandle<'static, Server>,
) -> anyhow::Result<String> {
    let socket = ListeningSocket::bind_auto("wayland", 1..33)?;
    let socket_name = socket
        .socket_name()
        .and_then(|name| name.to_str().map(String::from))
        .unwrap_or_else(|| "wayland-1".to_string());
    info!("Listening on Wayland socket {}", socket_name);

    // New client connections
    let mut display_handle = display.handle();
    handle.insert_source(
        Generic::new(
            socket.as_fd().try_clone_to_owned()?,
            Interest::READ,
            Mode::Level,
        ),
        move |_, _, _server| {
            if let Some(stream) = socket.accept()? {
                debug!("New Wayland client connected");
                if let Err(err) = display_handle.insert_client(stream, Arc::new(ClientState)) {
                    error!("Failed to insert client: {}", err);
                }
            }
            Ok(PostAction::Continue)
        },
    )?;

    // Client request dispatch
    let poll_fd = display.backend().poll_fd().try_clone_to_owned()?;
    handle.insert_source(
        Generic::new(poll_fd, Interest::READ, Mode::Level),
        move |_, _, server| {
            display.dispatch_clients(server)?;
            server.flush_toolkit_events();
            display.flush_clients()?;
            Ok(PostAction::Continue)
        },
    )?;

    // Child-process reaping
    handle.insert_source(Signals::new(&[Signal::SIGCHLD])?, |_, _, server| {
        for exit in server.processes.reap() {
            debug!(
                "Reaped pid {} (status {:?}, {} windows)",
                exit.pid,
                exit.status,
                exit.windows.len()
            );
        }
    })?;

    Ok(socket_name)
}
