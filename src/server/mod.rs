//! HTTP + WebSocket surface: routes, session lifecycle, and the event
//! bridge that connects the two.

pub mod app;
pub mod bridge;
pub mod routes;
pub mod session;
pub mod state;

pub use app::run_server;
pub use state::AppState;
