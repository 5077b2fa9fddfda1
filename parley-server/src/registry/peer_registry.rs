use dashmap::DashMap;
use parley_core::{PeerId, PeerInfo, RoomId, SignalMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Outbound half of one transport link. The connection's send task
/// drains this queue and serializes onto the socket.
pub type PeerLink = mpsc::UnboundedSender<SignalMessage>;

pub(crate) struct PeerEntry {
    pub room_id: RoomId,
    pub username: String,
    pub link: PeerLink,
    joined: u64,
}

/// The single authoritative table: peer id -> link + room membership.
///
/// Rooms are a derived view over these entries; there is no independent
/// room table to fall out of sync with. An entry exists iff the peer
/// has completed a join and its link has not been torn down.
pub struct PeerRegistry {
    peers: DashMap<PeerId, PeerEntry>,
    join_seq: AtomicU64,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            join_seq: AtomicU64::new(0),
        }
    }

    /// Register or replace a peer. Re-joining with the same id
    /// overwrites the previous entry, so a replayed join never
    /// duplicates membership.
    pub fn put(&self, peer_id: PeerId, room_id: RoomId, username: String, link: PeerLink) {
        let joined = self.join_seq.fetch_add(1, Ordering::Relaxed);
        self.peers.insert(
            peer_id,
            PeerEntry {
                room_id,
                username,
                link,
                joined,
            },
        );
    }

    /// Remove a peer's entry. Returns `None` when the peer was already
    /// gone, which is how callers keep the leave broadcast exactly-once.
    pub(crate) fn remove(&self, peer_id: &PeerId) -> Option<PeerEntry> {
        self.peers.remove(peer_id).map(|(_, entry)| entry)
    }

    /// Remove a peer's entry only if it is still owned by `link`. A
    /// re-join over a newer link replaces the entry, so the stale
    /// link's close must not evict the live registration.
    pub(crate) fn remove_if_link(&self, peer_id: &PeerId, link: &PeerLink) -> Option<PeerEntry> {
        self.peers
            .remove_if(peer_id, |_, entry| entry.link.same_channel(link))
            .map(|(_, entry)| entry)
    }

    /// Current members of a room except `excluding`, ordered by join time.
    pub fn members_of(&self, room_id: &RoomId, excluding: &PeerId) -> Vec<PeerInfo> {
        let mut members: Vec<(u64, PeerInfo)> = self
            .peers
            .iter()
            .filter(|entry| entry.value().room_id == *room_id && entry.key() != excluding)
            .map(|entry| {
                (
                    entry.value().joined,
                    PeerInfo {
                        peer_id: entry.key().clone(),
                        username: entry.value().username.clone(),
                    },
                )
            })
            .collect();
        members.sort_by_key(|(joined, _)| *joined);
        members.into_iter().map(|(_, info)| info).collect()
    }

    pub fn link_of(&self, peer_id: &PeerId) -> Option<PeerLink> {
        self.peers.get(peer_id).map(|entry| entry.link.clone())
    }

    /// Links of all room members, optionally excluding one peer.
    pub fn room_links(&self, room_id: &RoomId, excluding: Option<&PeerId>) -> Vec<PeerLink> {
        self.peers
            .iter()
            .filter(|entry| {
                entry.value().room_id == *room_id && Some(entry.key()) != excluding
            })
            .map(|entry| entry.value().link.clone())
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.peers.len()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
