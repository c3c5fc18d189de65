//! Wayland protocol dispatch implementations
//!
//! Dispatch impls for every protocol object the server speaks. Requests
//! mutate the protocol bookkeeping and the toolkit; replies travel back out
//! through the event queue the server drains at the end of each turn.

use log::{debug, warn};
use wayland_protocols::xdg::shell::server::{
    xdg_popup, xdg_positioner, xdg_surface, xdg_toplevel, xdg_wm_base,
};
use wayland_protocols_wlr::layer_shell::v1::server::{zwlr_layer_shell_v1, zwlr_layer_surface_v1};
use wayland_server::protocol::{
    wl_buffer, wl_callback, wl_compositor, wl_keyboard, wl_output, wl_pointer, wl_region, wl_seat,
    wl_shm, wl_shm_pool, wl_surface, wl_touch,
};
use wayland_server::{Client, DataInit, Dispatch, Resource, WEnum};

use crate::geometry::Rect;
use crate::output::OutputId;
use crate::protocol::layer_shell::ShellLayer;
use crate::protocol::shell::PositionerState;
use crate::protocol::shm::{ShmBufferId, ShmError, ShmPoolId};
use crate::surface::{BufferInfo, SurfaceId, SurfaceRole};
use crate::toolkit::{Anchors, ResizeEdges, Serial, WindowId};

use super::Server;

/// User data of wl_output resources
#[derive(Debug, Clone, Copy)]
pub struct OutputData {
    pub output: OutputId,
}

/// User data of xdg_toplevel resources
#[derive(Debug, Clone, Copy)]
pub struct ToplevelData {
    pub surface: SurfaceId,
    pub window: WindowId,
}

/// User data of xdg_popup resources
#[derive(Debug, Clone, Copy)]
pub struct PopupData {
    pub surface: SurfaceId,
    pub parent: SurfaceId,
}

/// User data of zwlr_layer_surface_v1 resources
#[derive(Debug, Clone, Copy)]
pub struct LayerSurfaceData {
    pub surface: SurfaceId,
    pub window: WindowId,
}

/// User data of xdg_positioner resources; the protocol mutates it after
/// creation, hence the interior mutability
#[derive(Debug, Default)]
pub struct PositionerData(std::sync::Mutex<PositionerState>);

// ============================================================================
// wl_compositor
// ============================================================================

impl Dispatch<wl_compositor::WlCompositor, ()> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_compositor::WlCompositor,
        request: wl_compositor::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                let surface_id = state.surfaces.create_surface();
                let resource = data_init.init(id, surface_id);
                state.register_surface(surface_id, resource);
            }
            wl_compositor::Request::CreateRegion { id } => {
                data_init.init(id, ());
            }
            _ => {}
        }
    }
}

// ============================================================================
// wl_surface
// ============================================================================

impl Dispatch<wl_surface::WlSurface, SurfaceId> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &wl_surface::WlSurface,
        request: wl_surface::Request,
        surface_id: &SurfaceId,
        _dhandle: &wayland_server::DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let surface_id = *surface_id;
        match request {
            wl_surface::Request::Attach { buffer, x: _, y: _ } => {
                let info = buffer
                    .as_ref()
                    .and_then(|b| b.data::<ShmBufferId>())
                    .and_then(|id| state.shm.buffer(*id))
                    .map(|b| BufferInfo {
                        width: b.width as i32,
                        height: b.height as i32,
                    });
                if buffer.is_some() && info.is_none() {
                    warn!("Surface {:?}: attach of an unknown buffer", surface_id);
                }
                if let Some(surface) = state.surfaces.get_mut(surface_id) {
                    surface.attach(if buffer.is_some() { info } else { None });
                }
            }
            wl_surface::Request::Damage {
                x,
                y,
                width,
                height,
            }
            | wl_surface::Request::DamageBuffer {
                x,
                y,
                width,
                height,
            } => {
                if let Some(surface) = state.surfaces.get_mut(surface_id) {
                    surface.damage(x, y, width, height);
                }
            }
            wl_surface::Request::Frame { callback } => {
                let callback: wl_callback::WlCallback = data_init.init(callback, ());
                let id = callback.id().protocol_id();
                if let Some(surface) = state.surfaces.get_mut(surface_id) {
                    surface.frame(id);
                }
                state.register_frame_callback(id, callback);
            }
            wl_surface::Request::SetOpaqueRegion { .. }
            | wl_surface::Request::SetInputRegion { .. }
            | wl_surface::Request::SetBufferTransform { .. }
            | wl_surface::Request::SetBufferScale { .. }
            | wl_surface::Request::Offset { .. } => {}
            wl_surface::Request::Commit => {
                handle_commit(state, resource, surface_id);
            }
            wl_surface::Request::Destroy => {
                debug!("Surface {:?} destroy", surface_id);
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        _resource: &wl_surface::WlSurface,
        data: &SurfaceId,
    ) {
        state.cleanup_surface(*data);
    }
}

/// The commit path: apply surface state, run the serial negotiation, map
/// on first buffer, and send any initial layer-surface configure
fn handle_commit(state: &mut Server, resource: &wl_surface::WlSurface, surface_id: SurfaceId) {
    let Some(surface) = state.surfaces.get_mut(surface_id) else {
        warn!("Commit on unknown surface {:?}", surface_id);
        return;
    };
    let due_callbacks = surface.commit();
    let size = surface.size();
    let has_buffer = size.is_some();
    state.complete_frame_callbacks(due_callbacks);

    // Committing a buffer before acknowledging the first configure is
    // connection-fatal for the offending client, never for the server
    if state.shell.get(surface_id).is_some() {
        if let Err(err) = state.shell.check_commit(surface_id, has_buffer) {
            resource.post_error(xdg_surface::Error::UnconfiguredBuffer, err.to_string());
            return;
        }
    }

    let acked = state
        .shell
        .take_acked_serial(surface_id)
        .or_else(|| state.layer_shell.take_acked_serial(surface_id));

    if let Some(window_id) = state.windows.window_for_surface(surface_id) {
        let content = state.windows.get(window_id).map(|w| w.content);
        if let Some(content) = content {
            match state.tree.content_commit(content, acked, size) {
                Ok(outcome) => {
                    if outcome.size_changed {
                        state.windows.relayout(&mut state.tree, window_id);
                    }
                    if let Some(serial) = outcome.acknowledged {
                        if let Some(change) =
                            state.windows.commit_mode(&mut state.tree, window_id, serial)
                        {
                            state.apply_mode_change(window_id, change);
                        }
                    }
                }
                Err(err) => warn!("Content commit for {:?} failed: {}", surface_id, err),
            }
        }
        if has_buffer {
            if let Some(layer_surface) = state.layer_shell.get(surface_id) {
                let layer = layer_surface.layer.workspace_layer();
                let anchors = layer_surface.anchors;
                if let Some(window) = state.windows.get_mut(window_id) {
                    window.anchors = anchors;
                }
                state.map_layer_surface(window_id, layer);
            } else {
                state.map_toplevel(window_id);
            }
        }
    }

    // A bufferless commit on an unconfigured layer surface triggers the
    // initial configure, sized against the current extents
    if !has_buffer {
        if let Some(layer_surface) = state.layer_shell.get(surface_id) {
            if !layer_surface.configured {
                let extents = state.current_workspace().extents();
                let (dw, dh) = layer_surface.desired_size;
                let width = if dw > 0 { dw as i32 } else { extents.width };
                let height = if dh > 0 { dh as i32 } else { extents.height };
                let content = state
                    .windows
                    .window_for_surface(surface_id)
                    .and_then(|id| state.windows.get(id))
                    .map(|w| w.content);
                if let Some(content) = content {
                    let _ = state.tree.content_request_size(content, width, height);
                }
            }
        }
    }
    state.flush_toolkit_events();
}

// ============================================================================
// wl_region
// ============================================================================

impl Dispatch<wl_region::WlRegion, ()> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_region::WlRegion,
        _request: wl_region::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        // Region contents do not influence the core; input regions are the
        // hit-tester's concern and it works from committed sizes
    }
}

// ============================================================================
// wl_callback
// ============================================================================

impl Dispatch<wl_callback::WlCallback, ()> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_callback::WlCallback,
        _request: wl_callback::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        // wl_callback has no requests
    }
}

// ============================================================================
// wl_shm
// ============================================================================

impl Dispatch<wl_shm::WlShm, ()> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_shm::WlShm,
        request: wl_shm::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shm::Request::CreatePool { id, fd, size } = request {
            let pool_id = state.shm.create_pool(fd, size.max(0) as usize);
            data_init.init(id, pool_id);
        }
    }
}

// ============================================================================
// wl_shm_pool
// ============================================================================

impl Dispatch<wl_shm_pool::WlShmPool, ShmPoolId> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &wl_shm_pool::WlShmPool,
        request: wl_shm_pool::Request,
        pool_id: &ShmPoolId,
        _dhandle: &wayland_server::DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_shm_pool::Request::CreateBuffer {
                id,
                offset,
                width,
                height,
                stride,
                format,
            } => {
                let format = match format {
                    WEnum::Value(format) => format as u32,
                    WEnum::Unknown(raw) => raw,
                };
                match state.shm.create_buffer(
                    *pool_id,
                    offset.max(0) as u32,
                    width.max(0) as u32,
                    height.max(0) as u32,
                    stride.max(0) as u32,
                    format,
                ) {
                    Ok(buffer_id) => {
                        data_init.init(id, buffer_id);
                    }
                    Err(err) => {
                        let code = match err {
                            ShmError::InvalidPool => wl_shm::Error::InvalidFd,
                            ShmError::BufferTooLarge | ShmError::InvalidStride => {
                                wl_shm::Error::InvalidStride
                            }
                        };
                        resource.post_error(code, err.to_string());
                    }
                }
            }
            wl_shm_pool::Request::Resize { size } => {
                let _ = state.shm.resize_pool(*pool_id, size.max(0) as usize);
            }
            wl_shm_pool::Request::Destroy => {
                state.shm.destroy_pool(*pool_id);
            }
            _ => {}
        }
    }
}

// ============================================================================
// wl_buffer
// ============================================================================

impl Dispatch<wl_buffer::WlBuffer, ShmBufferId> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_buffer::WlBuffer,
        request: wl_buffer::Request,
        buffer_id: &ShmBufferId,
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_buffer::Request::Destroy = request {
            state.shm.destroy_buffer(*buffer_id);
        }
    }
}

// ============================================================================
// wl_seat and its devices
// ============================================================================

impl Dispatch<wl_seat::WlSeat, ()> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_seat::WlSeat,
        request: wl_seat::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_seat::Request::GetPointer { id } => {
                let pointer = data_init.init(id, ());
                state.register_pointer(pointer);
            }
            wl_seat::Request::GetKeyboard { id } => {
                let keyboard = data_init.init(id, ());
                state.register_keyboard(keyboard);
            }
            wl_seat::Request::GetTouch { id } => {
                // Touch events are never generated, but the object must live
                data_init.init(id, ());
            }
            wl_seat::Request::Release => {}
            _ => {}
        }
    }
}

impl Dispatch<wl_pointer::WlPointer, ()> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &wl_pointer::WlPointer,
        request: wl_pointer::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_pointer::Request::SetCursor {
            surface,
            hotspot_x,
            hotspot_y,
            ..
        } = request
        {
            state.seat.pointer.cursor_surface =
                surface.and_then(|s| s.data::<SurfaceId>().copied());
            state.seat.pointer.cursor_hotspot = (hotspot_x, hotspot_y);
        }
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ()> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_keyboard::WlKeyboard,
        _request: wl_keyboard::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        // Only Release, which the resource teardown covers
    }
}

impl Dispatch<wl_touch::WlTouch, ()> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_touch::WlTouch,
        _request: wl_touch::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }
}

// ============================================================================
// wl_output
// ============================================================================

impl Dispatch<wl_output::WlOutput, OutputData> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_output::WlOutput,
        request: wl_output::Request,
        data: &OutputData,
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_output::Request::Release = request {
            debug!("Output {:?} released by client", data.output);
        }
    }
}

// ============================================================================
// xdg_wm_base
// ============================================================================

impl Dispatch<xdg_wm_base::XdgWmBase, ()> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &xdg_wm_base::XdgWmBase,
        request: xdg_wm_base::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_wm_base::Request::CreatePositioner { id } => {
                data_init.init(id, PositionerData::default());
            }
            xdg_wm_base::Request::GetXdgSurface { id, surface } => {
                let Some(surface_id) = surface.data::<SurfaceId>().copied() else {
                    resource.post_error(
                        xdg_wm_base::Error::InvalidSurfaceState,
                        "surface without compositor state",
                    );
                    return;
                };
                state.shell.create_xdg_surface(surface_id);
                let xdg_surface = data_init.init(id, surface_id);
                state.register_xdg_surface(surface_id, xdg_surface);
            }
            xdg_wm_base::Request::Pong { serial } => {
                debug!("Pong for serial {}", serial);
            }
            xdg_wm_base::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// xdg_positioner
// ============================================================================

impl Dispatch<xdg_positioner::XdgPositioner, PositionerData> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &xdg_positioner::XdgPositioner,
        request: xdg_positioner::Request,
        data: &PositionerData,
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let mut positioner = data.0.lock().unwrap();
        match request {
            xdg_positioner::Request::SetSize { width, height } => {
                positioner.size = (width, height);
            }
            xdg_positioner::Request::SetAnchorRect {
                x,
                y,
                width,
                height,
            } => {
                positioner.anchor_rect = Rect::new(x, y, width, height);
            }
            xdg_positioner::Request::SetOffset { x, y } => {
                positioner.offset = (x, y);
            }
            xdg_positioner::Request::SetAnchor { .. }
            | xdg_positioner::Request::SetGravity { .. }
            | xdg_positioner::Request::SetConstraintAdjustment { .. }
            | xdg_positioner::Request::SetReactive
            | xdg_positioner::Request::SetParentSize { .. }
            | xdg_positioner::Request::SetParentConfigure { .. } => {
                // Constraint refinement belongs to the rendering side
            }
            xdg_positioner::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// xdg_surface
// ============================================================================

impl Dispatch<xdg_surface::XdgSurface, SurfaceId> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &xdg_surface::XdgSurface,
        request: xdg_surface::Request,
        surface_id: &SurfaceId,
        _dhandle: &wayland_server::DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let surface_id = *surface_id;
        match request {
            xdg_surface::Request::GetToplevel { id } => {
                if let Some(surface) = state.surfaces.get_mut(surface_id) {
                    if surface.set_role(SurfaceRole::Toplevel).is_err() {
                        resource.post_error(
                            xdg_wm_base::Error::Role,
                            "surface already has a different role",
                        );
                        return;
                    }
                }
                let window = match state
                    .windows
                    .create_window(&mut state.tree, surface_id, true)
                {
                    Ok(window) => window,
                    Err(err) => {
                        warn!("Window creation for {:?} failed: {}", surface_id, err);
                        return;
                    }
                };
                let toplevel = data_init.init(
                    id,
                    ToplevelData {
                        surface: surface_id,
                        window,
                    },
                );
                state.register_toplevel(surface_id, toplevel);

                // Initial configure lets the client pick its size
                let content = state.windows.get(window).map(|w| w.content);
                if let Some(content) = content {
                    let _ = state.tree.content_request_size(content, 0, 0);
                }
                state.flush_toolkit_events();
            }
            xdg_surface::Request::GetPopup {
                id,
                parent,
                positioner,
            } => {
                if let Some(surface) = state.surfaces.get_mut(surface_id) {
                    if surface.set_role(SurfaceRole::Popup).is_err() {
                        resource.post_error(
                            xdg_wm_base::Error::Role,
                            "surface already has a different role",
                        );
                        return;
                    }
                }
                let parent_id = parent
                    .as_ref()
                    .and_then(|p| p.data::<SurfaceId>().copied())
                    .unwrap_or(surface_id);
                let placement = positioner
                    .data::<PositionerData>()
                    .map(|data| data.0.lock().unwrap().placement())
                    .unwrap_or_default();
                let popup = data_init.init(
                    id,
                    PopupData {
                        surface: surface_id,
                        parent: parent_id,
                    },
                );
                popup.configure(
                    placement.x,
                    placement.y,
                    placement.width.max(1),
                    placement.height.max(1),
                );
                let serial = state.tree.next_serial();
                resource.configure(serial.0);
            }
            xdg_surface::Request::SetWindowGeometry {
                x,
                y,
                width,
                height,
            } => {
                state
                    .shell
                    .set_window_geometry(surface_id, Rect::new(x, y, width, height));
            }
            xdg_surface::Request::AckConfigure { serial } => {
                let _ = state.shell.ack_configure(surface_id, Serial(serial));
            }
            xdg_surface::Request::Destroy => {
                state.shell.remove_surface(surface_id);
            }
            _ => {}
        }
    }
}

// ============================================================================
// xdg_toplevel
// ============================================================================

impl Dispatch<xdg_toplevel::XdgToplevel, ToplevelData> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &xdg_toplevel::XdgToplevel,
        request: xdg_toplevel::Request,
        data: &ToplevelData,
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_toplevel::Request::SetTitle { title } => {
                state.windows.set_title(data.window, title);
            }
            xdg_toplevel::Request::SetAppId { app_id } => {
                state.windows.set_app_id(data.window, app_id);
            }
            xdg_toplevel::Request::Move { .. } => {
                state.windows.request_move(&mut state.tree, data.window);
            }
            xdg_toplevel::Request::Resize { edges, .. } => {
                let raw = match edges {
                    WEnum::Value(edges) => edges as u32,
                    WEnum::Unknown(raw) => raw,
                };
                state.windows.request_resize(
                    &mut state.tree,
                    data.window,
                    ResizeEdges::from_bits_truncate(raw),
                );
            }
            xdg_toplevel::Request::SetMaximized => {
                let usable = state.usable_area();
                let _ = state
                    .windows
                    .request_maximized(&mut state.tree, data.window, true, usable);
            }
            xdg_toplevel::Request::UnsetMaximized => {
                let usable = state.usable_area();
                let _ = state
                    .windows
                    .request_maximized(&mut state.tree, data.window, false, usable);
            }
            xdg_toplevel::Request::SetFullscreen { .. } => {
                let extents = state.current_workspace().extents();
                let _ = state
                    .windows
                    .request_fullscreen(&mut state.tree, data.window, true, extents);
            }
            xdg_toplevel::Request::UnsetFullscreen => {
                let extents = state.current_workspace().extents();
                let _ = state
                    .windows
                    .request_fullscreen(&mut state.tree, data.window, false, extents);
            }
            xdg_toplevel::Request::SetMinSize { .. }
            | xdg_toplevel::Request::SetMaxSize { .. }
            | xdg_toplevel::Request::SetParent { .. }
            | xdg_toplevel::Request::ShowWindowMenu { .. }
            | xdg_toplevel::Request::SetMinimized => {}
            xdg_toplevel::Request::Destroy => {}
            _ => {}
        }
        state.flush_toolkit_events();
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        _resource: &xdg_toplevel::XdgToplevel,
        data: &ToplevelData,
    ) {
        debug!("Toplevel for {:?} destroyed", data.surface);
        state.destroy_window(data.window);
        state.unregister_toplevel(data.surface);
    }
}

// ============================================================================
// xdg_popup
// ============================================================================

impl Dispatch<xdg_popup::XdgPopup, PopupData> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &xdg_popup::XdgPopup,
        request: xdg_popup::Request,
        data: &PopupData,
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_popup::Request::Grab { .. } => {
                debug!("Popup {:?} grab", data.surface);
            }
            xdg_popup::Request::Reposition { .. } => {
                debug!("Popup {:?} reposition", data.surface);
            }
            xdg_popup::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// zwlr_layer_shell_v1
// ============================================================================

impl Dispatch<zwlr_layer_shell_v1::ZwlrLayerShellV1, ()> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &zwlr_layer_shell_v1::ZwlrLayerShellV1,
        request: zwlr_layer_shell_v1::Request,
        _data: &(),
        _dhandle: &wayland_server::DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwlr_layer_shell_v1::Request::GetLayerSurface {
                id,
                surface,
                output: _,
                layer,
                namespace,
            } => {
                let Some(surface_id) = surface.data::<SurfaceId>().copied() else {
                    return;
                };
                if let Some(surface) = state.surfaces.get_mut(surface_id) {
                    if surface.set_role(SurfaceRole::LayerSurface).is_err() {
                        resource.post_error(
                            zwlr_layer_shell_v1::Error::Role,
                            "surface already has a different role",
                        );
                        return;
                    }
                }
                let raw_layer = match layer {
                    WEnum::Value(layer) => layer as u32,
                    WEnum::Unknown(raw) => raw,
                };
                let Some(shell_layer) = ShellLayer::from_protocol(raw_layer) else {
                    resource.post_error(zwlr_layer_shell_v1::Error::InvalidLayer, "invalid layer");
                    return;
                };
                // Layer surfaces flow through the same view type as
                // toplevels, just undecorated and anchored
                let window = match state
                    .windows
                    .create_window(&mut state.tree, surface_id, false)
                {
                    Ok(window) => window,
                    Err(err) => {
                        warn!("Layer surface window for {:?} failed: {}", surface_id, err);
                        return;
                    }
                };
                state
                    .layer_shell
                    .create_layer_surface(surface_id, shell_layer, namespace);
                let layer_surface = data_init.init(
                    id,
                    LayerSurfaceData {
                        surface: surface_id,
                        window,
                    },
                );
                state.register_layer_surface(surface_id, layer_surface);
            }
            zwlr_layer_shell_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// zwlr_layer_surface_v1
// ============================================================================

impl Dispatch<zwlr_layer_surface_v1::ZwlrLayerSurfaceV1, LayerSurfaceData> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &zwlr_layer_surface_v1::ZwlrLayerSurfaceV1,
        request: zwlr_layer_surface_v1::Request,
        data: &LayerSurfaceData,
        _dhandle: &wayland_server::DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwlr_layer_surface_v1::Request::SetSize { width, height } => {
                if let Some(surface) = state.layer_shell.get_mut(data.surface) {
                    surface.desired_size = (width, height);
                }
            }
            zwlr_layer_surface_v1::Request::SetAnchor { anchor } => {
                let raw = match anchor {
                    WEnum::Value(anchor) => anchor.bits(),
                    WEnum::Unknown(raw) => raw,
                };
                let anchors = Anchors::from_bits_truncate(raw);
                if let Some(surface) = state.layer_shell.get_mut(data.surface) {
                    surface.anchors = anchors;
                }
                if let Some(window) = state.windows.get_mut(data.window) {
                    window.anchors = anchors;
                }
            }
            zwlr_layer_surface_v1::Request::SetExclusiveZone { zone } => {
                if let Some(surface) = state.layer_shell.get_mut(data.surface) {
                    surface.exclusive_zone = zone;
                }
            }
            zwlr_layer_surface_v1::Request::SetKeyboardInteractivity {
                keyboard_interactivity,
            } => {
                let raw = match keyboard_interactivity {
                    WEnum::Value(mode) => mode as u32,
                    WEnum::Unknown(raw) => raw,
                };
                if let (Some(mode), Some(surface)) = (
                    crate::protocol::layer_shell::KeyboardInteractivity::from_protocol(raw),
                    state.layer_shell.get_mut(data.surface),
                ) {
                    surface.keyboard_interactivity = mode;
                }
            }
            zwlr_layer_surface_v1::Request::SetLayer { layer } => {
                let raw = match layer {
                    WEnum::Value(layer) => layer as u32,
                    WEnum::Unknown(raw) => raw,
                };
                if let (Some(layer), Some(surface)) = (
                    ShellLayer::from_protocol(raw),
                    state.layer_shell.get_mut(data.surface),
                ) {
                    surface.layer = layer;
                }
            }
            zwlr_layer_surface_v1::Request::SetMargin { .. }
            | zwlr_layer_surface_v1::Request::GetPopup { .. } => {}
            zwlr_layer_surface_v1::Request::AckConfigure { serial } => {
                state
                    .layer_shell
                    .ack_configure(data.surface, Serial(serial));
            }
            zwlr_layer_surface_v1::Request::Destroy => {}
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: wayland_server::backend::ClientId,
        _resource: &zwlr_layer_surface_v1::ZwlrLayerSurfaceV1,
        data: &LayerSurfaceData,
    ) {
        debug!("Layer surface for {:?} destroyed", data.surface);
        state.destroy_window(data.window);
        state.layer_shell.remove_surface(data.surface);
        state.unregister_layer_surface(data.surface);
    }
}
