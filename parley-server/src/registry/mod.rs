mod peer_registry;

pub use peer_registry::{PeerLink, PeerRegistry};
pub(crate) use peer_registry::PeerEntry;
