//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace / request id / timeout layers)
//!     → middleware/cors.rs (preflight answered here)
//!     → command.rs (admission, Command::dispatch)
//!     → request.rs (command name, parameters → DriverRequest)
//!     → driver
//!     → body.rs (stream driver output, cancel on disconnect)
//!     → response.rs (error mapping)
//!     → Send to client
//! ```

pub mod body;
pub mod command;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use command::{Command, Dispatcher};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::DispatchError;
pub use server::{AppState, HttpServer};
