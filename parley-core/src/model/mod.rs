mod peer;
mod room;
mod signaling;

pub use peer::{PeerId, PeerInfo};
pub use room::RoomId;
pub use signaling::SignalMessage;
