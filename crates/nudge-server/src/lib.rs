pub mod envelope;
pub mod handlers;
pub mod server;

pub use envelope::ApiError;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
