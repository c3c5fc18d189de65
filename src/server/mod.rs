//! Server orchestration
//!
//! The [`Server`] is the single top-level context: it owns the element
//! tree, the window/surface/output managers, the workspace list with
//! exactly one current workspace, the key-binding table, the seat, and the
//! protocol bookkeeping. Every mutation happens on the event-loop thread;
//! toolkit events are drained and translated into protocol traffic once per
//! loop turn.

mod dispatch;
mod globals;
pub mod keybinding;

use std::collections::HashMap;
use std::io::Write;
use std::os::fd::{AsFd, OwnedFd};
use std::time::Instant;

use calloop::{LoopHandle, LoopSignal};
use log::{debug, error, info, warn};
use wayland_protocols::xdg::shell::server::{xdg_surface, xdg_toplevel, xdg_wm_base};
use wayland_protocols_wlr::layer_shell::v1::server::{zwlr_layer_shell_v1, zwlr_layer_surface_v1};
use wayland_server::backend::GlobalId;
use wayland_server::protocol::{
    wl_callback, wl_compositor, wl_keyboard, wl_output, wl_pointer, wl_seat, wl_shm, wl_surface,
};
use wayland_server::{DisplayHandle, Resource};

use crate::config::{parse_color, Config};
use crate::geometry::Rect;
use crate::input::{Modifiers, Seat};
use crate::output::config::{
    resolve_config, OutputAttributes, OutputConfigRecord, OutputDescription,
};
use crate::output::layout::OutputLayout;
use crate::output::{HardwareOutput, Output, OutputError, OutputId, OutputManager};
use crate::process::ProcessMonitor;
use crate::protocol::{LayerShellHandler, WlShmHandler, XdgShellHandler};
use crate::surface::{SurfaceId, SurfaceManager};
use crate::toolkit::{ElementId, ElementTree, Serial, ToolkitEvent, WindowId, WindowManager};
use crate::workspace::{Layer, Workspace};

use keybinding::{Action, Keybinding, KeybindingSet};

pub use globals::OutputGlobalData;

/// Horizontal/vertical offset applied to successive new windows
const CASCADE_STEP: i32 = 32;

/// The top-level compositor context
pub struct Server {
    pub display_handle: DisplayHandle,
    pub loop_handle: LoopHandle<'static, Server>,
    pub loop_signal: LoopSignal,

    /// The toolkit element arena and its scene
    pub tree: ElementTree,
    /// The root container all workspaces hang off
    root: ElementId,
    pub surfaces: SurfaceManager,
    pub windows: WindowManager,
    pub outputs: OutputManager,
    pub layout: OutputLayout,
    workspaces: Vec<Workspace>,
    current_workspace: usize,
    pub bindings: KeybindingSet,
    pub seat: Seat,
    pub processes: ProcessMonitor,
    pub config: Config,
    output_records: Vec<OutputConfigRecord>,

    // Protocol bookkeeping
    pub shell: XdgShellHandler,
    pub layer_shell: LayerShellHandler,
    pub shm: WlShmHandler,

    // Live protocol resources, for sending events
    surface_resources: HashMap<SurfaceId, wl_surface::WlSurface>,
    xdg_surface_resources: HashMap<SurfaceId, xdg_surface::XdgSurface>,
    toplevel_resources: HashMap<SurfaceId, xdg_toplevel::XdgToplevel>,
    layer_surface_resources: HashMap<SurfaceId, zwlr_layer_surface_v1::ZwlrLayerSurfaceV1>,
    frame_callbacks: HashMap<u32, wl_callback::WlCallback>,
    keyboards: Vec<wl_keyboard::WlKeyboard>,
    pointers: Vec<wl_pointer::WlPointer>,
    seat_resources: Vec<wl_seat::WlSeat>,
    output_globals: HashMap<OutputId, GlobalId>,

    input_serial: u32,
    start_time: Instant,
}

impl Server {
    /// Build the server and register its globals
    pub fn new(
        display_handle: DisplayHandle,
        loop_handle: LoopHandle<'static, Server>,
        loop_signal: LoopSignal,
        config: Config,
    ) -> anyhow::Result<Self> {
        let style = config.window_style()?;
        let background = config.background_color()?;
        let output_records = config.output_records()?;
        let binding_records = config.bindings()?;

        let mut tree = ElementTree::new();
        let root = tree.create_container();
        tree.attach_root(root)
            .map_err(|err| anyhow::anyhow!("failed to attach scene root: {}", err))?;

        let mut workspaces = Vec::new();
        for name in &config.server.workspaces {
            let workspace = Workspace::new(
                &mut tree,
                name.clone(),
                config.server.edge_reserve,
                background,
            )
            .map_err(|err| anyhow::anyhow!("failed to build workspace '{}': {}", name, err))?;
            tree.add_element(root, workspace.root())
                .map_err(|err| anyhow::anyhow!("failed to attach workspace '{}': {}", name, err))?;
            workspaces.push(workspace);
        }
        anyhow::ensure!(!workspaces.is_empty(), "no workspaces configured");

        let mut bindings = KeybindingSet::new();
        for binding in binding_records {
            bindings.add(binding);
        }

        display_handle.create_global::<Server, wl_compositor::WlCompositor, _>(6, ());
        display_handle.create_global::<Server, wl_shm::WlShm, _>(1, ());
        display_handle.create_global::<Server, wl_seat::WlSeat, _>(9, ());
        display_handle.create_global::<Server, xdg_wm_base::XdgWmBase, _>(6, ());
        display_handle.create_global::<Server, zwlr_layer_shell_v1::ZwlrLayerShellV1, _>(4, ());
        info!(
            "Registered globals: wl_compositor, wl_shm, wl_seat, xdg_wm_base, zwlr_layer_shell_v1"
        );

        let mut server = Self {
            display_handle,
            loop_handle,
            loop_signal,
            tree,
            root,
            surfaces: SurfaceManager::new(),
            windows: WindowManager::new(style),
            outputs: OutputManager::new(),
            layout: OutputLayout::new(),
            workspaces,
            current_workspace: 0,
            bindings,
            seat: Seat::new(),
            processes: ProcessMonitor::new(),
            config,
            output_records,
            shell: XdgShellHandler::new(),
            layer_shell: LayerShellHandler::new(),
            shm: WlShmHandler::new(),
            surface_resources: HashMap::new(),
            xdg_surface_resources: HashMap::new(),
            toplevel_resources: HashMap::new(),
            layer_surface_resources: HashMap::new(),
            frame_callbacks: HashMap::new(),
            keyboards: Vec::new(),
            pointers: Vec::new(),
            seat_resources: Vec::new(),
            output_globals: HashMap::new(),
            input_serial: 0,
            start_time: Instant::now(),
        };
        server.enable_workspace(0);
        Ok(server)
    }

    /// Launch the configured autostart commands
    pub fn run_autostart(&mut self) {
        let commands = self.config.autostart.clone();
        let handle = self.loop_handle.clone();
        for command in commands {
            if let Err(err) = self.processes.spawn(&handle, &command) {
                warn!("Autostart '{}' failed: {}", command, err);
            }
        }
    }

    fn next_input_serial(&mut self) -> u32 {
        self.input_serial = self.input_serial.wrapping_add(1);
        self.input_serial
    }

    fn timestamp(&self) -> u32 {
        self.start_time.elapsed().as_millis() as u32
    }

    // ------------------------------------------------------------------
    // Workspaces

    /// The root container every workspace hangs off
    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn current_workspace(&self) -> &Workspace {
        &self.workspaces[self.current_workspace]
    }

    pub fn current_workspace_index(&self) -> usize {
        self.current_workspace
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    fn enable_workspace(&mut self, index: usize) {
        let extents = self.layout.bounding_box(&self.outputs);
        let workspace = &mut self.workspaces[index];
        workspace.set_extents(extents);
        workspace.enable(&mut self.tree, &mut self.windows);
        workspace.arrange(&mut self.tree, &self.windows);
    }

    /// Switch the current workspace; the old one is disabled before the new
    /// one is enabled
    pub fn switch_workspace(&mut self, index: usize) -> bool {
        if index >= self.workspaces.len() || index == self.current_workspace {
            return false;
        }
        info!(
            "Switching workspace {} -> {}",
            self.workspaces[self.current_workspace].name, self.workspaces[index].name
        );
        let old = self.current_workspace;
        self.workspaces[old].disable(&mut self.tree, &mut self.windows);
        self.current_workspace = index;
        self.enable_workspace(index);
        self.flush_toolkit_events();
        true
    }

    /// The workspace a window currently belongs to
    fn workspace_index_of(&self, window: WindowId) -> Option<usize> {
        self.workspaces.iter().position(|ws| ws.contains(window))
    }

    // ------------------------------------------------------------------
    // Outputs

    /// React to a newly detected output
    ///
    /// Resolves the matching configuration record, constructs the output
    /// through its state transaction, attaches it to the layout, and fans
    /// the new extents out to every workspace. One failing output is logged
    /// and must not block others.
    pub fn output_added(&mut self, hw: Box<dyn HardwareOutput>) -> Result<OutputId, OutputError> {
        let description = OutputDescription {
            name: Some(hw.name().to_string()),
            manufacturer: hw.manufacturer().map(String::from),
            model: hw.model().map(String::from),
            serial: hw.serial_number().map(String::from),
        };
        let attributes = resolve_config(&self.output_records, &description)
            .map(|record| record.attributes)
            .unwrap_or_default();

        let output = match Output::create(hw, &attributes) {
            Ok(output) => output,
            Err(err) => {
                error!("Output configuration failed: {}", err);
                return Err(err);
            }
        };
        let id = self.outputs.add(output);
        self.layout.attach(&mut self.outputs, id, attributes.position);

        let global = self
            .display_handle
            .create_global::<Server, wl_output::WlOutput, _>(4, OutputGlobalData { output: id });
        self.output_globals.insert(id, global);

        self.layout_changed();
        Ok(id)
    }

    /// React to an output's hardware-destroy notification
    ///
    /// Layout, registry, and global are all detached before control returns
    /// to the loop, so later callbacks in the same turn cannot observe the
    /// dead output.
    pub fn output_removed(&mut self, id: OutputId) {
        self.layout.detach(id);
        if let Some(global) = self.output_globals.remove(&id) {
            self.display_handle.remove_global::<Server>(global);
        }
        if let Some(output) = self.outputs.remove(id) {
            info!("Output '{}' removed", output.name);
        }
        self.layout_changed();
    }

    /// Fan a layout change out to every workspace
    ///
    /// This is the sole mechanism keeping workspace geometry consistent
    /// with hotplug and reconfiguration.
    pub fn layout_changed(&mut self) {
        let extents = self.layout.bounding_box(&self.outputs);
        debug!("Output layout now spans {:?}", extents);
        for workspace in &mut self.workspaces {
            workspace.set_extents(extents);
        }
        for workspace in &mut self.workspaces {
            workspace.arrange(&mut self.tree, &self.windows);
        }
        self.flush_toolkit_events();
    }

    // ------------------------------------------------------------------
    // Key bindings

    /// Dispatch a key press against the binding table
    ///
    /// Returns whether the key was consumed; unconsumed keys go to the
    /// focused client.
    pub fn handle_key(&mut self, modifiers: Modifiers, keysym: u32) -> bool {
        let actions: Vec<Action> = self
            .bindings
            .candidates(modifiers, keysym)
            .map(|binding| binding.action.clone())
            .collect();
        for action in actions {
            if self.execute_action(action) {
                return true;
            }
        }
        false
    }

    /// Register a binding at runtime; registration order is dispatch order
    pub fn bind_key(&mut self, binding: Keybinding) {
        self.bindings.add(binding);
    }

    /// Run an action; the return value is whether it consumed the key
    pub fn execute_action(&mut self, action: Action) -> bool {
        let consumed = match action {
            Action::Quit => {
                info!("Quit requested");
                self.loop_signal.stop();
                true
            }
            Action::Spawn(command) => {
                let handle = self.loop_handle.clone();
                if let Err(err) = self.processes.spawn(&handle, &command) {
                    warn!("Spawn '{}' failed: {}", command, err);
                }
                true
            }
            Action::CloseWindow => match self.current_workspace().active_view() {
                Some(view) => {
                    let _ = self.windows.request_close(&mut self.tree, view);
                    true
                }
                None => false,
            },
            Action::ToggleMaximize => match self.current_workspace().active_view() {
                Some(view) => {
                    let maximized = self
                        .windows
                        .get(view)
                        .map(|w| w.maximized())
                        .unwrap_or(false);
                    let usable = self.current_workspace().usable_area(&self.windows);
                    let _ =
                        self.windows
                            .request_maximized(&mut self.tree, view, !maximized, usable);
                    true
                }
                None => false,
            },
            Action::ToggleFullscreen => match self.current_workspace().active_view() {
                Some(view) => {
                    let fullscreen = self
                        .windows
                        .get(view)
                        .map(|w| w.fullscreen())
                        .unwrap_or(false);
                    let extents = self.current_workspace().extents();
                    let _ = self.windows.request_fullscreen(
                        &mut self.tree,
                        view,
                        !fullscreen,
                        extents,
                    );
                    true
                }
                None => false,
            },
            Action::NextWindow => {
                let index = self.current_workspace;
                let workspace = &mut self.workspaces[index];
                let had_views = !workspace.views_in_layer(Layer::Shell).is_empty();
                let _ = workspace.activate_next_view(&mut self.tree, &mut self.windows);
                had_views
            }
            Action::PreviousWindow => {
                let index = self.current_workspace;
                let workspace = &mut self.workspaces[index];
                let had_views = !workspace.views_in_layer(Layer::Shell).is_empty();
                let _ = workspace.activate_previous_view(&mut self.tree, &mut self.windows);
                had_views
            }
            Action::NextWorkspace => {
                let next = (self.current_workspace + 1) % self.workspaces.len();
                self.switch_workspace(next)
            }
            Action::PreviousWorkspace => {
                let len = self.workspaces.len();
                let previous = (self.current_workspace + len - 1) % len;
                self.switch_workspace(previous)
            }
            Action::SwitchWorkspace(index) => self.switch_workspace(index),
        };
        self.flush_toolkit_events();
        consumed
    }

    /// Feed a key event: bindings first, then the focused client
    pub fn handle_key_event(
        &mut self,
        keycode: u32,
        keysym: u32,
        modifiers: Modifiers,
        pressed: bool,
    ) {
        if pressed {
            self.seat.keyboard.key_press(keycode);
            if self.handle_key(modifiers, keysym) {
                return;
            }
        } else {
            self.seat.keyboard.key_release(keycode);
        }
        let Some(focus) = self.seat.keyboard.focus() else {
            return;
        };
        let serial = self.next_input_serial();
        let time = self.timestamp();
        let state = if pressed {
            wl_keyboard::KeyState::Pressed
        } else {
            wl_keyboard::KeyState::Released
        };
        let Some(surface) = self.surface_resources.get(&focus) else {
            return;
        };
        let client = surface.client();
        for keyboard in &self.keyboards {
            if keyboard.client() == client {
                keyboard.key(serial, time, keycode, state);
            }
        }
    }

    /// Feed pointer motion in layout coordinates
    pub fn handle_pointer_motion(&mut self, x: f64, y: f64) {
        self.seat.pointer.motion(x, y);
        self.tree.pointer_motion(x, y);
        self.flush_toolkit_events();
    }

    /// Feed a pointer button event
    pub fn handle_pointer_button(&mut self, button: u32, pressed: bool) {
        if pressed {
            self.seat.pointer.button_press(button);
            // Click-to-focus before delivery
            if let Some(focus) = self.seat.pointer.focus() {
                if let Some(window) = self.windows.window_for_surface(focus) {
                    self.activate_window(window);
                }
            }
        } else {
            self.seat.pointer.button_release(button);
        }
        self.tree.pointer_button(button, pressed);
        self.flush_toolkit_events();
    }

    // ------------------------------------------------------------------
    // Window lifecycle

    /// Map a window into the current workspace's shell layer
    pub(crate) fn map_toplevel(&mut self, window: WindowId) {
        if self.workspace_index_of(window).is_some() {
            return;
        }
        let index = self.current_workspace;
        let count = self.workspaces[index].views_in_layer(Layer::Shell).len() as i32;
        let usable = self.workspaces[index].usable_area(&self.windows);
        let workspace = &mut self.workspaces[index];
        if let Err(err) =
            workspace.add_view_to_layer(&mut self.tree, &self.windows, window, Layer::Shell)
        {
            warn!("Mapping window {:?} failed: {}", window, err);
            return;
        }
        let x = usable.x + CASCADE_STEP * (count % 8);
        let y = usable.y + CASCADE_STEP * (count % 8);
        let _ = self.windows.set_position(&mut self.tree, window, x, y);
        let _ = workspace.activate_view(&mut self.tree, &mut self.windows, window);
        if let Some(surface) = self.windows.get(window).map(|w| w.surface) {
            if let Some(pid) = self.client_pid_of(surface) {
                self.processes.window_created(pid, window);
            }
        }
        debug!("Mapped window {:?} at {},{}", window, x, y);
        self.flush_toolkit_events();
    }

    /// Map a layer surface's window into its requested layer
    pub(crate) fn map_layer_surface(&mut self, window: WindowId, layer: Layer) {
        if self.workspace_index_of(window).is_some() {
            return;
        }
        let index = self.current_workspace;
        let workspace = &mut self.workspaces[index];
        if let Err(err) = workspace.add_view_to_layer(&mut self.tree, &self.windows, window, layer)
        {
            warn!("Mapping layer surface {:?} failed: {}", window, err);
            return;
        }
        workspace.arrange(&mut self.tree, &self.windows);
        self.flush_toolkit_events();
    }

    /// Tear down a window: workspace membership, toolkit elements, and
    /// process correlation
    pub(crate) fn destroy_window(&mut self, window: WindowId) {
        if let Some(index) = self.workspace_index_of(window) {
            let workspace = &mut self.workspaces[index];
            let _ = workspace.remove_view(&mut self.tree, &mut self.windows, window);
        }
        self.processes.window_destroyed(window);
        self.windows.destroy_window(&mut self.tree, window);
        self.flush_toolkit_events();
    }

    /// Activate a window, raising it and routing keyboard focus
    pub fn activate_window(&mut self, window: WindowId) {
        let Some(index) = self.workspace_index_of(window) else {
            return;
        };
        if index != self.current_workspace {
            return;
        }
        let workspace = &mut self.workspaces[index];
        let _ = workspace.activate_view(&mut self.tree, &mut self.windows, window);
    }

    /// Apply a committed mode change: fullscreen promotion and demotion
    pub(crate) fn apply_mode_change(
        &mut self,
        window: WindowId,
        change: crate::toolkit::ModeChange,
    ) {
        let Some(index) = self.workspace_index_of(window) else {
            return;
        };
        let workspace = &mut self.workspaces[index];
        if change.entered_fullscreen {
            let _ = workspace.promote_to_fullscreen(&mut self.tree, &self.windows, window);
        } else if change.left_fullscreen {
            let _ = workspace.demote_from_fullscreen(&mut self.tree, &self.windows, window);
        }
    }

    fn client_pid_of(&self, surface: SurfaceId) -> Option<u32> {
        let resource = self.surface_resources.get(&surface)?;
        let client = resource.client()?;
        let credentials = client.get_credentials(&self.display_handle).ok()?;
        u32::try_from(credentials.pid).ok()
    }

    // ------------------------------------------------------------------
    // Toolkit event draining

    /// Drain queued toolkit events and translate them into protocol
    /// traffic; runs until the queue is empty, once per loop turn
    pub fn flush_toolkit_events(&mut self) {
        loop {
            let events = self.tree.take_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.handle_toolkit_event(event);
            }
        }
        self.update_keyboard_focus();
    }

    fn handle_toolkit_event(&mut self, event: ToolkitEvent) {
        match event {
            ToolkitEvent::Configure {
                surface,
                serial,
                width,
                height,
            } => self.send_configure(surface, serial, width, height),
            ToolkitEvent::CloseRequested { surface } => {
                if let Some(toplevel) = self.toplevel_resources.get(&surface) {
                    toplevel.close();
                } else if let Some(layer) = self.layer_surface_resources.get(&surface) {
                    layer.closed();
                }
            }
            ToolkitEvent::ActivationChanged { surface, activated } => {
                debug!("Surface {:?} activation -> {}", surface, activated);
                if self.toplevel_resources.contains_key(&surface) {
                    let serial = self.tree.next_serial();
                    let size = self
                        .windows
                        .window_for_surface(surface)
                        .and_then(|id| self.windows.get(id))
                        .and_then(|w| self.tree.content_size_of(w.content))
                        .unwrap_or((0, 0));
                    self.send_configure(surface, serial, size.0, size.1);
                }
            }
            ToolkitEvent::PointerEnter { surface, x, y } => {
                self.seat.pointer.set_focus(Some(surface));
                let serial = self.next_input_serial();
                if let Some(resource) = self.surface_resources.get(&surface) {
                    let client = resource.client();
                    for pointer in &self.pointers {
                        if pointer.client() == client {
                            pointer.enter(serial, resource, x, y);
                        }
                    }
                }
            }
            ToolkitEvent::PointerLeave { surface } => {
                if self.seat.pointer.focus() == Some(surface) {
                    self.seat.pointer.set_focus(None);
                }
                let serial = self.next_input_serial();
                if let Some(resource) = self.surface_resources.get(&surface) {
                    let client = resource.client();
                    for pointer in &self.pointers {
                        if pointer.client() == client {
                            pointer.leave(serial, resource);
                        }
                    }
                }
            }
            ToolkitEvent::PointerMotion { surface, x, y } => {
                let time = self.timestamp();
                if let Some(resource) = self.surface_resources.get(&surface) {
                    let client = resource.client();
                    for pointer in &self.pointers {
                        if pointer.client() == client {
                            pointer.motion(time, x, y);
                        }
                    }
                }
            }
            ToolkitEvent::PointerButton {
                surface,
                button,
                pressed,
            } => {
                let serial = self.next_input_serial();
                let time = self.timestamp();
                let state = if pressed {
                    wl_pointer::ButtonState::Pressed
                } else {
                    wl_pointer::ButtonState::Released
                };
                if let Some(resource) = self.surface_resources.get(&surface) {
                    let client = resource.client();
                    for pointer in &self.pointers {
                        if pointer.client() == client {
                            pointer.button(serial, time, button, state);
                        }
                    }
                }
            }
            ToolkitEvent::ElementClicked {
                element,
                button: _,
                pressed,
            } => {
                if pressed {
                    if let Some(window) = self.windows.window_for_decoration(element) {
                        self.activate_window(window);
                        self.windows.request_move(&mut self.tree, window);
                    }
                }
            }
            ToolkitEvent::InteractiveMove { window } => {
                // The grab state machine belongs to the input collaborator
                debug!("Interactive move requested for {:?}", window);
            }
            ToolkitEvent::InteractiveResize { window, edges } => {
                debug!(
                    "Interactive resize requested for {:?} along {:?}",
                    window, edges
                );
            }
        }
    }

    fn send_configure(&mut self, surface: SurfaceId, serial: Serial, width: i32, height: i32) {
        if let Some(toplevel) = self.toplevel_resources.get(&surface) {
            let states = self.toplevel_states(surface);
            toplevel.configure(width, height, states);
            if let Some(xdg_surface) = self.xdg_surface_resources.get(&surface) {
                xdg_surface.configure(serial.0);
            }
        } else if let Some(layer) = self.layer_surface_resources.get(&surface) {
            layer.configure(serial.0, width.max(0) as u32, height.max(0) as u32);
        }
    }

    fn toplevel_states(&self, surface: SurfaceId) -> Vec<u8> {
        let mut states = Vec::new();
        let Some(window) = self
            .windows
            .window_for_surface(surface)
            .and_then(|id| self.windows.get(id))
        else {
            return states;
        };
        if window.maximized() {
            states.extend_from_slice(&(xdg_toplevel::State::Maximized as u32).to_ne_bytes());
        }
        if window.fullscreen() {
            states.extend_from_slice(&(xdg_toplevel::State::Fullscreen as u32).to_ne_bytes());
        }
        if window.activated() {
            states.extend_from_slice(&(xdg_toplevel::State::Activated as u32).to_ne_bytes());
        }
        states
    }

    /// Reconcile wl_keyboard focus with the toolkit's keyboard-focus leaf
    fn update_keyboard_focus(&mut self) {
        let leaf = self.tree.keyboard_focus_leaf();
        let focus = leaf.and_then(|leaf| self.tree.content_surface(leaf).ok());
        let old = self.seat.keyboard.focus();
        if focus == old {
            return;
        }
        self.seat.keyboard.set_focus(focus);

        if let Some(old) = old {
            let serial = self.next_input_serial();
            if let Some(resource) = self.surface_resources.get(&old) {
                let client = resource.client();
                for keyboard in &self.keyboards {
                    if keyboard.client() == client {
                        keyboard.leave(serial, resource);
                    }
                }
            }
        }
        if let Some(new) = focus {
            let serial = self.next_input_serial();
            let keys: Vec<u8> = self
                .seat
                .keyboard
                .pressed_keys()
                .iter()
                .flat_map(|key| key.to_ne_bytes())
                .collect();
            if let Some(resource) = self.surface_resources.get(&new) {
                let client = resource.client();
                for keyboard in &self.keyboards {
                    if keyboard.client() == client {
                        keyboard.enter(serial, resource, keys.clone());
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Resource registries (filled by the dispatch layer)

    pub(crate) fn register_surface(&mut self, id: SurfaceId, resource: wl_surface::WlSurface) {
        self.surface_resources.insert(id, resource);
    }

    pub(crate) fn unregister_surface(&mut self, id: SurfaceId) {
        self.surface_resources.remove(&id);
        self.xdg_surface_resources.remove(&id);
        self.toplevel_resources.remove(&id);
        self.layer_surface_resources.remove(&id);
    }

    pub(crate) fn unregister_toplevel(&mut self, id: SurfaceId) {
        self.toplevel_resources.remove(&id);
    }

    pub(crate) fn unregister_layer_surface(&mut self, id: SurfaceId) {
        self.layer_surface_resources.remove(&id);
    }

    /// Full teardown when a wl_surface goes away: any window first, then
    /// role bookkeeping, then the surface record itself — all in the same
    /// event-loop turn as the destroy notification
    pub(crate) fn cleanup_surface(&mut self, id: SurfaceId) {
        if let Some(window) = self.windows.window_for_surface(id) {
            self.destroy_window(window);
        }
        self.shell.remove_surface(id);
        self.layer_shell.remove_surface(id);
        self.surfaces.remove(id);
        self.unregister_surface(id);
    }

    pub(crate) fn register_xdg_surface(&mut self, id: SurfaceId, resource: xdg_surface::XdgSurface) {
        self.xdg_surface_resources.insert(id, resource);
    }

    pub(crate) fn register_toplevel(&mut self, id: SurfaceId, resource: xdg_toplevel::XdgToplevel) {
        self.toplevel_resources.insert(id, resource);
    }

    pub(crate) fn register_layer_surface(
        &mut self,
        id: SurfaceId,
        resource: zwlr_layer_surface_v1::ZwlrLayerSurfaceV1,
    ) {
        self.layer_surface_resources.insert(id, resource);
    }

    pub(crate) fn register_frame_callback(&mut self, id: u32, resource: wl_callback::WlCallback) {
        self.frame_callbacks.insert(id, resource);
    }

    /// Fire frame callbacks that became due on a commit
    ///
    /// Without a frame scheduler in scope, callbacks complete immediately.
    pub(crate) fn complete_frame_callbacks(&mut self, ids: Vec<u32>) {
        let time = self.timestamp();
        for id in ids {
            if let Some(callback) = self.frame_callbacks.remove(&id) {
                callback.done(time);
            }
        }
    }

    pub(crate) fn register_seat(&mut self, seat: wl_seat::WlSeat) {
        self.seat_resources.push(seat);
    }

    /// Register an input device and broadcast the rescanned capability mask
    pub fn add_input_device(
        &mut self,
        name: String,
        kind: crate::input::DeviceKind,
    ) -> crate::input::InputDeviceId {
        let id = self.seat.add_device(name, kind);
        self.broadcast_seat_capabilities();
        id
    }

    /// Unregister an input device on its hardware-destroy notification;
    /// the capability mask is rescanned, never decremented
    pub fn remove_input_device(&mut self, id: crate::input::InputDeviceId) {
        self.seat.remove_device(id);
        self.broadcast_seat_capabilities();
    }

    fn broadcast_seat_capabilities(&mut self) {
        let capabilities =
            wl_seat::Capability::from_bits_truncate(self.seat.capabilities().to_wayland());
        for seat in &self.seat_resources {
            seat.capabilities(capabilities);
        }
    }

    pub(crate) fn register_keyboard(&mut self, keyboard: wl_keyboard::WlKeyboard) {
        self.send_keymap(&keyboard);
        self.keyboards.push(keyboard);
    }

    pub(crate) fn register_pointer(&mut self, pointer: wl_pointer::WlPointer) {
        self.pointers.push(pointer);
    }

    fn send_keymap(&mut self, keyboard: &wl_keyboard::WlKeyboard) {
        let Some(keymap) = self.seat.keyboard.keymap_string().map(String::from) else {
            warn!("No keymap available; clients fall back to their own");
            return;
        };
        match keymap_fd(keymap.as_bytes()) {
            Ok(fd) => {
                keyboard.keymap(
                    wl_keyboard::KeymapFormat::XkbV1,
                    fd.as_fd(),
                    keymap.len() as u32 + 1,
                );
                keyboard.repeat_info(
                    self.seat.keyboard.repeat_rate as i32,
                    self.seat.keyboard.repeat_delay as i32,
                );
            }
            Err(err) => warn!("Failed to create keymap fd: {}", err),
        }
    }

    /// The usable area of the current workspace, for maximize requests
    pub fn usable_area(&self) -> Rect {
        self.current_workspace().usable_area(&self.windows)
    }

    /// The workspace background color from the live configuration
    pub fn background_color(&self) -> crate::scene::Color {
        parse_color(&self.config.style.background).unwrap_or_default()
    }
}

/// Write bytes (plus a trailing NUL) into an anonymous memfd for keymap
/// transfer
fn keymap_fd(bytes: &[u8]) -> std::io::Result<OwnedFd> {
    use rustix::fs::{memfd_create, MemfdFlags};
    let fd = memfd_create("trellis-keymap", MemfdFlags::CLOEXEC)?;
    let mut file = std::fs::File::from(fd);
    file.write_all(bytes)?;
    file.write_all(&[0])?;
    Ok(OwnedFd::from(file))
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::input::{DeviceKind, Modifiers};
    use crate::output::test_support::FakeHardware;
    use crate::server::keybinding::{Action, Keybinding};
    use crate::workspace::Layer;

    use super::Server;

    struct TestHarness {
        _event_loop: calloop::EventLoop<'static, Server>,
        _display: wayland_server::Display<Server>,
    }

    fn make_server(config: Config) -> (TestHarness, Server) {
        let event_loop = calloop::EventLoop::try_new().unwrap();
        let display = wayland_server::Display::<Server>::new().unwrap();
        let server = Server::new(
            display.handle(),
            event_loop.handle(),
            event_loop.get_signal(),
            config,
        )
        .unwrap();
        (
            TestHarness {
                _event_loop: event_loop,
                _display: display,
            },
            server,
        )
    }

    fn config_with_workspaces(names: &[&str]) -> Config {
        let workspaces = names
            .iter()
            .map(|n| format!("\"{}\"", n))
            .collect::<Vec<_>>()
            .join(", ");
        Config::from_str(&format!("[server]\nworkspaces = [{}]", workspaces)).unwrap()
    }

    #[test]
    fn test_exactly_one_workspace_enabled() {
        let (_loop, server) = make_server(config_with_workspaces(&["one", "two", "three"]));
        let enabled = server.workspaces().iter().filter(|ws| ws.enabled()).count();
        assert_eq!(enabled, 1);
        assert!(server.current_workspace().enabled());
    }

    #[test]
    fn test_workspace_switch_is_atomic() {
        let (_loop, mut server) = make_server(config_with_workspaces(&["one", "two"]));
        assert!(server.switch_workspace(1));
        assert_eq!(server.current_workspace_index(), 1);
        let enabled = server.workspaces().iter().filter(|ws| ws.enabled()).count();
        assert_eq!(enabled, 1);
        // Switching to the current workspace or out of range is refused
        assert!(!server.switch_workspace(1));
        assert!(!server.switch_workspace(9));
    }

    #[test]
    fn test_output_hotplug_updates_workspace_extents() {
        let (_loop, mut server) = make_server(Config::default());
        let id = server
            .output_added(Box::new(FakeHardware::named("DP-1")))
            .unwrap();
        assert_eq!(
            server.current_workspace().extents(),
            crate::geometry::Rect::new(0, 0, 1920, 1080)
        );

        let second = server
            .output_added(Box::new(FakeHardware::named("DP-2")))
            .unwrap();
        assert_eq!(
            server.current_workspace().extents(),
            crate::geometry::Rect::new(0, 0, 3840, 1080)
        );

        server.output_removed(second);
        assert_eq!(
            server.current_workspace().extents(),
            crate::geometry::Rect::new(0, 0, 1920, 1080)
        );
        server.output_removed(id);
        assert!(server.layout.is_empty());
        assert!(server.outputs.is_empty());
    }

    #[test]
    fn test_failing_output_does_not_stick_around() {
        let (_loop, mut server) = make_server(Config::default());
        let mut hw = FakeHardware::named("DP-1");
        hw.fail_test = true;
        assert!(server.output_added(Box::new(hw)).is_err());
        assert!(server.outputs.is_empty());
        assert!(server.layout.is_empty());
    }

    #[test]
    fn test_configured_output_attributes_applied() {
        let config = Config::from_str(
            r#"
            [[outputs]]
            Name = "X11"
            Transformation = "Flip"
            Scale = 1.0
            "#,
        )
        .unwrap();
        let (_loop, mut server) = make_server(config);
        let id = server
            .output_added(Box::new(FakeHardware::named("X11")))
            .unwrap();
        let output = server.outputs.get(id).unwrap();
        assert_eq!(output.name, "X11");
        assert_eq!(output.transform, crate::output::Transform::Flipped);
        assert_eq!(output.scale, 1.0);
    }

    #[test]
    fn test_key_dispatch_first_match_wins() {
        let (_loop, mut server) = make_server(config_with_workspaces(&["one", "two"]));
        server.bind_key(Keybinding {
            modifiers: Modifiers::CTRL,
            mask: Modifiers::empty(),
            keysym: 0x61,
            ignore_case: false,
            action: Action::SwitchWorkspace(1),
        });
        server.bind_key(Keybinding {
            modifiers: Modifiers::CTRL,
            mask: Modifiers::empty(),
            keysym: 0x61,
            ignore_case: false,
            action: Action::SwitchWorkspace(0),
        });
        assert!(server.handle_key(Modifiers::CTRL, 0x61));
        // The first registration won
        assert_eq!(server.current_workspace_index(), 1);
        assert!(!server.handle_key(Modifiers::SHIFT, 0x61));
    }

    #[test]
    fn test_unconsumed_action_falls_through() {
        let (_loop, mut server) = make_server(config_with_workspaces(&["one", "two"]));
        // CloseWindow cannot consume without an active view; the next
        // binding in order gets its chance
        server.bind_key(Keybinding {
            modifiers: Modifiers::empty(),
            mask: Modifiers::empty(),
            keysym: 0x71,
            ignore_case: false,
            action: Action::CloseWindow,
        });
        server.bind_key(Keybinding {
            modifiers: Modifiers::empty(),
            mask: Modifiers::empty(),
            keysym: 0x71,
            ignore_case: false,
            action: Action::SwitchWorkspace(1),
        });
        assert!(server.handle_key(Modifiers::empty(), 0x71));
        assert_eq!(server.current_workspace_index(), 1);
    }

    #[test]
    fn test_device_capability_scan() {
        let (_loop, mut server) = make_server(Config::default());
        let kb = server
            .seat
            .add_device("test-kb".to_string(), DeviceKind::Keyboard);
        server
            .seat
            .add_device("test-mouse".to_string(), DeviceKind::Pointer);
        assert!(server.seat.capabilities().keyboard);
        server.seat.remove_device(kb);
        assert!(!server.seat.capabilities().keyboard);
        assert!(server.seat.capabilities().pointer);
    }

    #[test]
    fn test_window_cycle_action() {
        let (_loop, mut server) = make_server(Config::default());
        // No windows: cycling does not consume
        assert!(!server.execute_action(Action::NextWindow));

        let a = server
            .windows
            .create_window(&mut server.tree, crate::surface::SurfaceId(901), true)
            .unwrap();
        let b = server
            .windows
            .create_window(&mut server.tree, crate::surface::SurfaceId(902), true)
            .unwrap();
        server.map_toplevel(a);
        server.map_toplevel(b);
        assert_eq!(server.current_workspace().active_view(), Some(b));
        assert!(server.execute_action(Action::NextWindow));
        assert_eq!(server.current_workspace().active_view(), Some(a));

        server.destroy_window(b);
        assert_eq!(
            server.current_workspace().views_in_layer(Layer::Shell).len(),
            1
        );
    }
}
