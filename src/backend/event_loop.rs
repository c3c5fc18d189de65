//! Event loop integration
//!
//! Thin calloop wrapper carrying the server state as the loop data. All
//! compositor state is mutated from callbacks dispatched here, on this one
//! thread.

use std::time::Duration;

use calloop::{EventLoop as CalLoop, LoopHandle, LoopSignal};
use log::debug;

use crate::server::Server;

/// The compositor event loop
pub struct EventLoop {
    event_loop: CalLoop<'static, Server>,
    signal: LoopSignal,
}

impl EventLoop {
    /// Create a new event loop
    pub fn new() -> anyhow::Result<Self> {
        let event_loop = CalLoop::try_new()?;
        let signal = event_loop.get_signal();
        Ok(Self { event_loop, signal })
    }

    /// Handle for registering event sources
    pub fn handle(&self) -> LoopHandle<'static, Server> {
        self.event_loop.handle()
    }

    /// Signal for waking or stopping the loop
    pub fn signal(&self) -> LoopSignal {
        self.signal.clone()
    }

    /// Run one iteration
    pub fn dispatch(
        &mut self,
        timeout: Option<Duration>,
        server: &mut Server,
    ) -> anyhow::Result<()> {
        self.event_loop.dispatch(timeout, server)?;
        Ok(())
    }

    /// Run until stopped via the loop signal
    pub fn run(&mut self, server: &mut Server) -> anyhow::Result<()> {
        debug!("Entering event loop");
        self.event_loop.run(None, server, |server| {
            // End-of-turn bookkeeping: toolkit traffic queued by timers or
            // idle callbacks still goes out this turn
            server.flush_toolkit_events();
        })?;
        Ok(())
    }

    /// Stop the loop from any callback
    pub fn stop(&self) {
        self.signal.stop();
    }
}
