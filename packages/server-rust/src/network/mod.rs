//! Networking types, configuration, HTTP surface, and shutdown control.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use error::ApiError;
pub use handlers::AppState;
pub use module::NetworkModule;
pub use shutdown::*;
