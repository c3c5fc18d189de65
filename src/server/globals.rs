//! Wayland global registry implementations
//!
//! GlobalDispatch impls advertising the server's globals and initializing
//! per-resource user data on bind.

use log::debug;
use wayland_protocols::xdg::shell::server::xdg_wm_base;
use wayland_protocols_wlr::layer_shell::v1::server::zwlr_layer_shell_v1;
use wayland_server::protocol::{wl_compositor, wl_output, wl_seat, wl_shm};
use wayland_server::{Client, DataInit, GlobalDispatch, New, Resource};

use crate::output::OutputId;

use super::dispatch::OutputData;
use super::Server;

/// Global data tying a wl_output global to its backing output
#[derive(Debug, Clone, Copy)]
pub struct OutputGlobalData {
    pub output: OutputId,
}

// ============================================================================
// wl_compositor global
// ============================================================================

impl GlobalDispatch<wl_compositor::WlCompositor, ()> for Server {
    fn bind(
        _state: &mut Self,
        _handle: &wayland_server::DisplayHandle,
        _client: &Client,
        resource: New<wl_compositor::WlCompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_compositor");
        data_init.init(resource, ());
    }
}

// ============================================================================
// wl_shm global
// ============================================================================

impl GlobalDispatch<wl_shm::WlShm, ()> for Server {
    fn bind(
        state: &mut Self,
        _handle: &wayland_server::DisplayHandle,
        _client: &Client,
        resource: New<wl_shm::WlShm>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_shm");
        let shm = data_init.init(resource, ());
        for format in state.shm.formats() {
            if let Ok(format) = wl_shm::Format::try_from(format.to_wayland()) {
                shm.format(format);
            }
        }
    }
}

// ============================================================================
// wl_seat global
// ============================================================================

impl GlobalDispatch<wl_seat::WlSeat, ()> for Server {
    fn bind(
        state: &mut Self,
        _handle: &wayland_server::DisplayHandle,
        _client: &Client,
        resource: New<wl_seat::WlSeat>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound wl_seat");
        let seat = data_init.init(resource, ());

        let capabilities =
            wl_seat::Capability::from_bits_truncate(state.seat.capabilities().to_wayland());
        seat.capabilities(capabilities);
        if seat.version() >= 2 {
            seat.name(state.seat.name().to_string());
        }
        state.register_seat(seat);
    }
}

// ============================================================================
// wl_output global (one per attached output)
// ============================================================================

impl GlobalDispatch<wl_output::WlOutput, OutputGlobalData> for Server {
    fn bind(
        state: &mut Self,
        _handle: &wayland_server::DisplayHandle,
        _client: &Client,
        resource: New<wl_output::WlOutput>,
        global_data: &OutputGlobalData,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let wl_output = data_init.init(
            resource,
            OutputData {
                output: global_data.output,
            },
        );
        let Some(output) = state.outputs.get(global_data.output) else {
            debug!("Client bound wl_output for a vanished output");
            return;
        };
        debug!("Client bound wl_output '{}'", output.name);

        let description = output.description();
        let transform = wl_output::Transform::try_from(output.transform.to_wayland())
            .unwrap_or(wl_output::Transform::Normal);
        wl_output.geometry(
            output.position.0,
            output.position.1,
            0,
            0,
            wl_output::Subpixel::Unknown,
            description.manufacturer.clone().unwrap_or_default(),
            description.model.clone().unwrap_or_default(),
            transform,
        );
        if let Some(mode) = output.current_mode {
            wl_output.mode(
                wl_output::Mode::Current | wl_output::Mode::Preferred,
                mode.width,
                mode.height,
                mode.refresh,
            );
        }
        if wl_output.version() >= 2 {
            wl_output.scale(output.scale.round() as i32);
        }
        if wl_output.version() >= 4 {
            wl_output.name(output.name.clone());
            wl_output.description(format!(
                "{} {}",
                description.manufacturer.clone().unwrap_or_default(),
                description.model.clone().unwrap_or_default()
            ));
        }
        if wl_output.version() >= 2 {
            wl_output.done();
        }
    }
}

// ============================================================================
// xdg_wm_base global
// ============================================================================

impl GlobalDispatch<xdg_wm_base::XdgWmBase, ()> for Server {
    fn bind(
        _state: &mut Self,
        _handle: &wayland_server::DisplayHandle,
        _client: &Client,
        resource: New<xdg_wm_base::XdgWmBase>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound xdg_wm_base");
        data_init.init(resource, ());
    }
}

// ============================================================================
// zwlr_layer_shell_v1 global
// ============================================================================

impl GlobalDispatch<zwlr_layer_shell_v1::ZwlrLayerShellV1, ()> for Server {
    fn bind(
        _state: &mut Self,
        _handle: &wayland_server::DisplayHandle,
        _client: &Client,
        resource: New<zwlr_layer_shell_v1::ZwlrLayerShellV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound zwlr_layer_shell_v1");
        data_init.init(resource, ());
    }
}
