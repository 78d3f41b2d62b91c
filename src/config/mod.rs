//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → watermarks.rs (derive absent watermarks)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watermarks;

pub use loader::{load_config, ConfigError};
pub use schema::{
    DispatchConfig, DriverConfig, ListenerConfig, MemoryConfig, ObservabilityConfig, ProxyConfig,
    RuntimeConfig, TimeoutConfig, WatcherConfig,
};
pub use watermarks::{compute_watermarks, Watermarks};
