pub mod model;

pub use model::{PeerId, PeerInfo, RoomId, SignalMessage};
