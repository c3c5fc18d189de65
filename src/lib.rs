//! Trellis - a Wayland compositor built around a layered toolkit scene graph
//!
//! Every visible thing is an element: rectangles and client contents stack
//! inside containers, containers route pointer/button/keyboard focus, and
//! windows compose decoration and content into interactive units.
//! Workspaces arrange views in fixed layers over the shared output layout;
//! the server ties outputs, inputs, workspaces, and the protocol globals
//! together on one event loop.
//!
//! # Architecture
//!
//! - **toolkit**: the element/container/content/window hierarchy
//! - **scene**: structural scene nodes the renderer consumes
//! - **workspace**: layered view stacking, activation, fullscreen slot
//! - **output**: displays, the shared layout, configuration matching
//! - **server**: orchestration, key bindings, Wayland dispatch
//! - **backend**: event loop, socket wiring, virtual output
//!
//! # Example
//!
//! ```no_run
//! use trellis::config::Config;
//!
//! let config = Config::from_str("").expect("default config");
//! // The compositor is typically run via the main binary;
//! // see src/main.rs for the full wiring.
//! # let _ = config;
//! ```

pub mod backend;
pub mod config;
pub mod geometry;
pub mod input;
pub mod output;
pub mod process;
pub mod protocol;
pub mod scene;
pub mod server;
pub mod surface;
pub mod toolkit;
pub mod workspace;
