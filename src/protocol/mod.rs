//! Protocol role bookkeeping
//!
//! Wire-agnostic state for the shell protocols the server speaks:
//! - xdg-shell surface/toplevel/popup negotiation state
//! - wlr-layer-shell surface state mapping onto workspace layers
//! - wl_shm pool and buffer accounting
//!
//! The Dispatch glue in `server::` translates requests into calls here and
//! events back out.

pub mod layer_shell;
pub mod shell;
pub mod shm;

pub use layer_shell::LayerShellHandler;
pub use shell::XdgShellHandler;
pub use shm::WlShmHandler;
