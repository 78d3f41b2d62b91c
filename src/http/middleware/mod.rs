//! Middleware applied in front of command dispatch.

pub mod cors;

pub use cors::cors_middleware;
