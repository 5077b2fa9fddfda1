pub mod connection_tests;

use parley_server::{PeerRegistry, Router};
use std::sync::Arc;
use tracing::Level;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn create_router() -> Router {
    Router::new(Arc::new(PeerRegistry::new()))
}
