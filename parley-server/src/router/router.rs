use crate::registry::{PeerEntry, PeerLink, PeerRegistry};
use parley_core::{PeerId, RoomId, SignalMessage};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Dispatches one inbound message by its declared type: join/leave
/// mutate the registry and fan out room events, offer/answer/candidate
/// are pure point-to-point forwards, chat is a room-wide echo.
///
/// The router holds no state of its own beyond the registry; every
/// side effect is a send on some peer's link. No handler ever blocks
/// on or surfaces an error for an absent target.
#[derive(Clone)]
pub struct Router {
    registry: Arc<PeerRegistry>,
}

impl Router {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn connections(&self) -> usize {
        self.registry.connections()
    }

    /// Handle one message arriving on `link`. Returns the peer id newly
    /// bound to that link when the message was a join, so the
    /// connection task can clean up after an abrupt close.
    pub fn handle_message(&self, link: &PeerLink, msg: SignalMessage) -> Option<PeerId> {
        match msg {
            SignalMessage::JoinRoom {
                room_id,
                peer_id,
                username,
            } => {
                self.handle_join(link, room_id, peer_id.clone(), username);
                Some(peer_id)
            }
            SignalMessage::Offer {
                target_peer_id,
                offer,
                sender_peer_id,
            } => {
                self.forward(target_peer_id, SignalMessage::Offer {
                    target_peer_id: None,
                    offer,
                    sender_peer_id,
                });
                None
            }
            SignalMessage::Answer {
                target_peer_id,
                answer,
                sender_peer_id,
            } => {
                self.forward(target_peer_id, SignalMessage::Answer {
                    target_peer_id: None,
                    answer,
                    sender_peer_id,
                });
                None
            }
            SignalMessage::IceCandidate {
                target_peer_id,
                candidate,
                sender_peer_id,
            } => {
                self.forward(target_peer_id, SignalMessage::IceCandidate {
                    target_peer_id: None,
                    candidate,
                    sender_peer_id,
                });
                None
            }
            SignalMessage::Chat {
                room_id,
                message,
                username,
                sender_peer_id,
                ..
            } => {
                self.handle_chat(room_id, message, username, sender_peer_id);
                None
            }
            SignalMessage::Leave { peer_id, .. } => {
                self.disconnect(&peer_id);
                None
            }
            // Server-originated types arriving from a client carry no
            // defined meaning; drop them like any other bad input.
            other => {
                warn!("ignoring unexpected inbound message: {:?}", other);
                None
            }
        }
    }

    fn handle_join(&self, link: &PeerLink, room_id: RoomId, peer_id: PeerId, username: String) {
        let username = if username.is_empty() {
            "Anonymous".to_string()
        } else {
            username
        };

        self.registry
            .put(peer_id.clone(), room_id.clone(), username.clone(), link.clone());
        info!("peer {} joined room {}", peer_id, room_id);

        let peers = self.registry.members_of(&room_id, &peer_id);
        deliver(link, SignalMessage::RoomJoined {
            peers,
            your_peer_id: peer_id.clone(),
        });

        self.broadcast(&room_id, Some(&peer_id), SignalMessage::PeerJoined {
            peer_id: peer_id.clone(),
            username,
        });
    }

    /// Point-to-point relay. An absent or closed target is a silent
    /// drop: the sender learns nothing either way.
    fn forward(&self, target: Option<PeerId>, msg: SignalMessage) {
        let Some(target) = target else {
            debug!("relay message without targetPeerId dropped");
            return;
        };
        match self.registry.link_of(&target) {
            Some(link) => deliver(&link, msg),
            None => debug!("relay target {} not registered, dropping", target),
        }
    }

    fn handle_chat(
        &self,
        room_id: RoomId,
        message: String,
        username: String,
        sender_peer_id: PeerId,
    ) {
        // The sender is included: the echo is the only delivery
        // confirmation the protocol offers.
        self.broadcast(&room_id, None, SignalMessage::Chat {
            room_id: room_id.clone(),
            message,
            username,
            sender_peer_id,
            timestamp: Some(now_ms()),
        });
    }

    /// Unregister a peer and tell the rest of its room. The registry
    /// removal keeps the `peer-left` broadcast exactly-once no matter
    /// how many times or in which order leave and close fire.
    pub fn disconnect(&self, peer_id: &PeerId) {
        self.depart(peer_id, self.registry.remove(peer_id));
    }

    /// Cleanup for a closed transport link. Unlike an explicit `leave`,
    /// the registration is removed only while it still belongs to the
    /// closed link; a re-join over a newer link survives the stale
    /// link's close.
    pub fn disconnect_link(&self, peer_id: &PeerId, link: &PeerLink) {
        self.depart(peer_id, self.registry.remove_if_link(peer_id, link));
    }

    fn depart(&self, peer_id: &PeerId, entry: Option<PeerEntry>) {
        let Some(PeerEntry { room_id, .. }) = entry else {
            return;
        };
        info!("peer {} left room {}", peer_id, room_id);
        self.broadcast(&room_id, Some(peer_id), SignalMessage::PeerLeft {
            peer_id: peer_id.clone(),
        });
    }

    fn broadcast(&self, room_id: &RoomId, excluding: Option<&PeerId>, msg: SignalMessage) {
        for link in self.registry.room_links(room_id, excluding) {
            deliver(&link, msg.clone());
        }
    }
}

fn deliver(link: &PeerLink, msg: SignalMessage) {
    if link.send(msg).is_err() {
        debug!("link closed while delivering, message dropped");
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
