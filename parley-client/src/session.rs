use crate::error::ClientError;
use crate::link::{SignalReceiver, SignalSender};
use crate::media::{LocalMedia, MediaEngine, MediaEvent, RemoteTrack};
use crate::negotiation::Negotiation;
use parley_core::{PeerId, RoomId, SignalMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub room_id: RoomId,
    pub username: String,
    /// Client-generated; `PeerId::random()` unless the caller has its
    /// own scheme. The protocol does not detect collisions.
    pub peer_id: PeerId,
}

#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub message: String,
    pub username: String,
    pub sender_peer_id: PeerId,
    pub timestamp: Option<u64>,
}

/// Notifications the session surfaces to the embedding application.
#[derive(Debug)]
pub enum SessionEvent {
    PeerJoined { peer_id: PeerId, username: String },
    PeerLeft { peer_id: PeerId },
    RemoteTrack { peer_id: PeerId, track: RemoteTrack },
    Chat(ChatEntry),
    /// The session ended, by request or because the link was lost.
    Left,
}

enum SessionCommand {
    SendChat(String),
    Leave,
}

/// Caller-side controls for a running session.
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionHandle {
    pub fn send_chat(&self, message: impl Into<String>) {
        let _ = self.cmd_tx.send(SessionCommand::SendChat(message.into()));
    }

    /// Fire-and-forget: sends `leave`, tears everything down locally,
    /// and does not wait for the coordinator to acknowledge.
    pub fn leave(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Leave);
    }
}

/// Per-session controller: owns the local media source and one
/// `Negotiation` per remote peer, and decides from room-membership
/// events which peers need one.
///
/// Inbound signaling and media-engine events land on one loop consumed
/// a message at a time, so the negotiation map is never touched
/// concurrently.
pub struct Session {
    config: SessionConfig,
    engine: Arc<dyn MediaEngine>,
    local_media: LocalMedia,
    negotiations: HashMap<PeerId, Negotiation>,
    roster: HashMap<PeerId, String>,
    transcript: Vec<ChatEntry>,
    link_tx: SignalSender,
    signal_rx: SignalReceiver,
    media_tx: mpsc::Sender<MediaEvent>,
    media_rx: mpsc::Receiver<MediaEvent>,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    /// Acquire local media and announce ourselves to the coordinator.
    ///
    /// Media comes first: the join is only sent once both readiness
    /// signals (media acquired, link open) are in hand. A media
    /// acquisition failure is fatal to the session and surfaced as-is.
    pub async fn join(
        engine: Arc<dyn MediaEngine>,
        config: SessionConfig,
        link_tx: SignalSender,
        signal_rx: SignalReceiver,
    ) -> Result<(Self, SessionHandle), ClientError> {
        let local_media = engine.acquire_local_media().await?;

        link_tx
            .send(SignalMessage::JoinRoom {
                room_id: config.room_id.clone(),
                peer_id: config.peer_id.clone(),
                username: config.username.clone(),
            })
            .map_err(|_| ClientError::LinkClosed)?;
        info!("joining room {} as {}", config.room_id, config.peer_id);

        let (media_tx, media_rx) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        let session = Self {
            config,
            engine,
            local_media,
            negotiations: HashMap::new(),
            roster: HashMap::new(),
            transcript: Vec::new(),
            link_tx,
            signal_rx,
            media_tx,
            media_rx,
            cmd_rx,
            events_tx,
        };

        Ok((session, SessionHandle { cmd_tx, events }))
    }

    /// The session event loop. Runs until the caller leaves or the
    /// signaling link is lost.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(SessionCommand::SendChat(message)) => self.send_chat(message),
                    Some(SessionCommand::Leave) | None => {
                        self.teardown(true).await;
                        break;
                    }
                },
                signal = self.signal_rx.recv() => match signal {
                    Some(msg) => self.handle_signal(msg).await,
                    None => {
                        warn!("signaling link lost, ending session");
                        self.teardown(false).await;
                        break;
                    }
                },
                event = self.media_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_media_event(event).await;
                    }
                }
            }
        }
    }

    async fn handle_signal(&mut self, msg: SignalMessage) {
        match msg {
            SignalMessage::RoomJoined { peers, your_peer_id } => {
                info!("room joined as {}, {} peers present", your_peer_id, peers.len());
                // We initiate toward everyone already in the room; they
                // do nothing and wait for our offers.
                for peer in peers {
                    self.roster
                        .insert(peer.peer_id.clone(), peer.username.clone());
                    self.open_negotiation(peer.peer_id).await;
                }
            }
            SignalMessage::PeerJoined { peer_id, username } => {
                // The newcomer initiates toward us; record membership only.
                self.roster.insert(peer_id.clone(), username.clone());
                let _ = self
                    .events_tx
                    .send(SessionEvent::PeerJoined { peer_id, username });
            }
            SignalMessage::PeerLeft { peer_id } => {
                self.roster.remove(&peer_id);
                if let Some(mut negotiation) = self.negotiations.remove(&peer_id) {
                    negotiation.close().await;
                }
                let _ = self.events_tx.send(SessionEvent::PeerLeft { peer_id });
            }
            SignalMessage::Offer {
                offer,
                sender_peer_id,
                ..
            } => {
                if self.negotiations.contains_key(&sender_peer_id) {
                    debug!("offer from {} but negotiation exists, dropped", sender_peer_id);
                    return;
                }
                self.answer_offer(sender_peer_id, offer).await;
            }
            SignalMessage::Answer {
                answer,
                sender_peer_id,
                ..
            } => match self.negotiations.get_mut(&sender_peer_id) {
                Some(negotiation) => negotiation.apply_answer(answer).await,
                None => debug!("answer from unknown peer {}, dropped", sender_peer_id),
            },
            SignalMessage::IceCandidate {
                candidate,
                sender_peer_id,
                ..
            } => match self.negotiations.get_mut(&sender_peer_id) {
                Some(negotiation) => negotiation.apply_candidate(candidate).await,
                // The candidate outran the offer; defined failure, not buffered.
                None => debug!("candidate from unknown peer {}, dropped", sender_peer_id),
            },
            SignalMessage::Chat {
                message,
                username,
                sender_peer_id,
                timestamp,
                ..
            } => {
                let entry = ChatEntry {
                    message,
                    username,
                    sender_peer_id,
                    timestamp,
                };
                self.transcript.push(entry.clone());
                let _ = self.events_tx.send(SessionEvent::Chat(entry));
            }
            other => debug!("unexpected signal for a client, dropped: {:?}", other),
        }
    }

    async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::CandidateGenerated(peer_id, candidate) => {
                // Trickle it to the peer, but not for torn-down negotiations.
                if !self.negotiations.contains_key(&peer_id) {
                    debug!("local candidate for closed negotiation {}, dropped", peer_id);
                    return;
                }
                let _ = self.link_tx.send(SignalMessage::IceCandidate {
                    target_peer_id: Some(peer_id),
                    candidate,
                    sender_peer_id: self.config.peer_id.clone(),
                });
            }
            MediaEvent::RemoteTrack(peer_id, track) => {
                let _ = self
                    .events_tx
                    .send(SessionEvent::RemoteTrack { peer_id, track });
            }
            MediaEvent::ChannelClosed(peer_id) => {
                info!("media channel to {} ended", peer_id);
                if let Some(mut negotiation) = self.negotiations.remove(&peer_id) {
                    negotiation.close().await;
                }
            }
        }
    }

    /// Create an initiator negotiation toward `peer_id`.
    async fn open_negotiation(&mut self, peer_id: PeerId) {
        let channel = match self
            .engine
            .create_channel(peer_id.clone(), self.media_tx.clone())
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                warn!("failed to create media channel for {}: {}", peer_id, e);
                return;
            }
        };

        match Negotiation::initiate(
            peer_id.clone(),
            channel,
            &self.local_media,
            &self.config.peer_id,
            &self.link_tx,
        )
        .await
        {
            Ok(negotiation) => {
                self.negotiations.insert(peer_id, negotiation);
            }
            Err(e) => warn!("failed to start negotiation with {}: {}", peer_id, e),
        }
    }

    /// Create a responder negotiation for an offer from an unknown peer.
    async fn answer_offer(&mut self, peer_id: PeerId, offer: serde_json::Value) {
        let channel = match self
            .engine
            .create_channel(peer_id.clone(), self.media_tx.clone())
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                warn!("failed to create media channel for {}: {}", peer_id, e);
                return;
            }
        };

        match Negotiation::respond(
            peer_id.clone(),
            channel,
            &self.local_media,
            offer,
            &self.config.peer_id,
            &self.link_tx,
        )
        .await
        {
            Ok(negotiation) => {
                self.negotiations.insert(peer_id, negotiation);
            }
            Err(e) => warn!("failed to answer offer from {}: {}", peer_id, e),
        }
    }

    fn send_chat(&self, message: String) {
        let _ = self.link_tx.send(SignalMessage::Chat {
            room_id: self.config.room_id.clone(),
            message,
            username: self.config.username.clone(),
            sender_peer_id: self.config.peer_id.clone(),
            // The coordinator stamps it; our echo carries the time.
            timestamp: None,
        });
    }

    /// Close every negotiation and, when the link still works, tell the
    /// coordinator we are gone. Local media drops with the session.
    async fn teardown(&mut self, send_leave: bool) {
        if send_leave {
            let _ = self.link_tx.send(SignalMessage::Leave {
                peer_id: self.config.peer_id.clone(),
                room_id: self.config.room_id.clone(),
            });
        }
        for (_, mut negotiation) in self.negotiations.drain() {
            negotiation.close().await;
        }
        self.roster.clear();
        let _ = self.events_tx.send(SessionEvent::Left);
        info!(
            "session over, transcript held {} messages",
            self.transcript.len()
        );
    }
}
