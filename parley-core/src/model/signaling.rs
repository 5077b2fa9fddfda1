use crate::model::peer::{PeerId, PeerInfo};
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The wire unit: a JSON object tagged by `type`.
///
/// Offer/answer/candidate payloads are opaque negotiation artifacts
/// produced by the media engine; the coordinator relays them without
/// inspection. `target_peer_id` is only meaningful client-to-server
/// and is stripped when the coordinator relays the message; `Chat`'s
/// `timestamp` is assigned by the coordinator on broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SignalMessage {
    JoinRoom {
        room_id: RoomId,
        peer_id: PeerId,
        username: String,
    },
    RoomJoined {
        peers: Vec<PeerInfo>,
        your_peer_id: PeerId,
    },
    PeerJoined {
        peer_id: PeerId,
        username: String,
    },
    PeerLeft {
        peer_id: PeerId,
    },
    Offer {
        #[serde(skip_serializing_if = "Option::is_none")]
        target_peer_id: Option<PeerId>,
        offer: Value,
        sender_peer_id: PeerId,
    },
    Answer {
        #[serde(skip_serializing_if = "Option::is_none")]
        target_peer_id: Option<PeerId>,
        answer: Value,
        sender_peer_id: PeerId,
    },
    IceCandidate {
        #[serde(skip_serializing_if = "Option::is_none")]
        target_peer_id: Option<PeerId>,
        candidate: Value,
        sender_peer_id: PeerId,
    },
    Chat {
        room_id: RoomId,
        message: String,
        username: String,
        sender_peer_id: PeerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    Leave {
        peer_id: PeerId,
        room_id: RoomId,
    },
}
