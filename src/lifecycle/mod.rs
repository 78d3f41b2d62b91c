//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Build runtime → Configure singletons
//!     → Watermarks → Driver + Resource watcher → Dispatcher → Listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C / SIGTERM / trigger → Stop accepting → Drain → Stop watcher
//! ```

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_runtime, configure_singletons, Application, StartupError};
