use crate::error::ClientError;
use crate::link::SignalSender;
use crate::media::{LocalMedia, MediaChannel};
use parley_core::{PeerId, SignalMessage};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// We saw the peer in the room first and send the offer.
    Initiator,
    /// The peer offered to us.
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Offering,
    AwaitingAnswer,
    Answering,
    Connected,
    Closed,
}

/// The signaling state for one local-remote peer pair. Owns its media
/// channel exclusively and drives it through the offer/answer/candidate
/// exchange; one instance per remote peer.
pub struct Negotiation {
    remote_peer_id: PeerId,
    role: NegotiationRole,
    state: NegotiationState,
    channel: Box<dyn MediaChannel>,
}

impl Negotiation {
    /// Initiator path: attach local tracks, generate the offer and send
    /// it, then wait for the answer.
    pub async fn initiate(
        remote_peer_id: PeerId,
        channel: Box<dyn MediaChannel>,
        media: &LocalMedia,
        local_peer_id: &PeerId,
        link: &SignalSender,
    ) -> Result<Self, ClientError> {
        let mut negotiation = Self {
            remote_peer_id,
            role: NegotiationRole::Initiator,
            state: NegotiationState::Idle,
            channel,
        };
        // A failed handshake must not leak the half-built channel.
        if let Err(e) = negotiation.send_offer(media, local_peer_id, link).await {
            negotiation.close().await;
            return Err(e);
        }
        Ok(negotiation)
    }

    async fn send_offer(
        &mut self,
        media: &LocalMedia,
        local_peer_id: &PeerId,
        link: &SignalSender,
    ) -> Result<(), ClientError> {
        self.channel.add_local_tracks(media).await?;
        self.state = NegotiationState::Offering;
        let offer = self.channel.create_offer().await?;

        link.send(SignalMessage::Offer {
            target_peer_id: Some(self.remote_peer_id.clone()),
            offer,
            sender_peer_id: local_peer_id.clone(),
        })
        .map_err(|_| ClientError::LinkClosed)?;
        self.state = NegotiationState::AwaitingAnswer;
        Ok(())
    }

    /// Responder path: apply the remote offer, answer it, done.
    pub async fn respond(
        remote_peer_id: PeerId,
        channel: Box<dyn MediaChannel>,
        media: &LocalMedia,
        offer: Value,
        local_peer_id: &PeerId,
        link: &SignalSender,
    ) -> Result<Self, ClientError> {
        let mut negotiation = Self {
            remote_peer_id,
            role: NegotiationRole::Responder,
            state: NegotiationState::Answering,
            channel,
        };
        if let Err(e) = negotiation.send_answer(media, offer, local_peer_id, link).await {
            negotiation.close().await;
            return Err(e);
        }
        Ok(negotiation)
    }

    async fn send_answer(
        &mut self,
        media: &LocalMedia,
        offer: Value,
        local_peer_id: &PeerId,
        link: &SignalSender,
    ) -> Result<(), ClientError> {
        self.channel.add_local_tracks(media).await?;
        self.channel.apply_remote_offer(offer).await?;
        let answer = self.channel.create_answer().await?;

        link.send(SignalMessage::Answer {
            target_peer_id: Some(self.remote_peer_id.clone()),
            answer,
            sender_peer_id: local_peer_id.clone(),
        })
        .map_err(|_| ClientError::LinkClosed)?;
        self.state = NegotiationState::Connected;
        Ok(())
    }

    /// Apply a remote answer. Only legal while awaiting one; anything
    /// else is a stale or duplicate artifact and is dropped.
    pub async fn apply_answer(&mut self, answer: Value) {
        if self.state != NegotiationState::AwaitingAnswer {
            debug!(
                "stale answer from {} in state {:?}, dropped",
                self.remote_peer_id, self.state
            );
            return;
        }
        match self.channel.apply_remote_answer(answer).await {
            Ok(()) => self.state = NegotiationState::Connected,
            Err(e) => warn!("failed to apply answer from {}: {}", self.remote_peer_id, e),
        }
    }

    /// Apply a remote connectivity candidate; valid in any state where
    /// a handshake is underway or complete.
    pub async fn apply_candidate(&mut self, candidate: Value) {
        match self.state {
            NegotiationState::Idle | NegotiationState::Closed => {
                debug!(
                    "candidate from {} in state {:?}, dropped",
                    self.remote_peer_id, self.state
                );
            }
            _ => {
                if let Err(e) = self.channel.add_remote_candidate(candidate).await {
                    warn!("failed to add candidate from {}: {}", self.remote_peer_id, e);
                }
            }
        }
    }

    /// Tear down the media channel. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.state == NegotiationState::Closed {
            return;
        }
        self.state = NegotiationState::Closed;
        self.channel.close().await;
    }

    pub fn remote_peer_id(&self) -> &PeerId {
        &self.remote_peer_id
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }
}

impl std::fmt::Debug for Negotiation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiation")
            .field("remote_peer_id", &self.remote_peer_id)
            .field("role", &self.role)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
