pub mod registry;
pub mod router;
pub mod signaling;

pub use registry::{PeerLink, PeerRegistry};
pub use router::Router;
pub use signaling::{AppState, app, ws_handler};
