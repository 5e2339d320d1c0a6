mod auth;
mod error;
mod middleware;
mod routes;
mod server;
mod state;

pub use error::{status_for, ApiError};
pub use server::{build_router, GatewayServer};
pub use state::AppState;
