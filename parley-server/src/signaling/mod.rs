mod app;
mod ws_handler;

pub use app::{AppState, app};
pub use ws_handler::ws_handler;
