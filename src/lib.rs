//! HTTP proxy front end for a command-execution driver.
//!
//! Requests pass a CORS gate, are admitted against memory watermarks and
//! dispatched as commands to a shared driver that streams results back.

pub mod admission;
pub mod config;
pub mod driver;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::{Application, Shutdown};
