//! Local HTTP relay: routes, handlers and server lifecycle.

pub mod http;
pub mod server;

pub use http::error::{AppError, AppResult};
pub use http::{create_router, AppState};
pub use server::RelayServer;
