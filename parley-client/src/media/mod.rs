mod rtc;

pub use rtc::{RtcEngineConfig, RtcMediaEngine};

use async_trait::async_trait;
use parley_core::PeerId;
use serde_json::Value;
use std::any::Any;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to acquire local media: {0}")]
    Acquisition(String),

    /// The `LocalMedia` handle came from a different engine.
    #[error("foreign media handle")]
    ForeignMedia,

    #[error("negotiation failure: {0}")]
    Negotiation(String),

    #[error("artifact encoding: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Rtc(#[from] webrtc::Error),
}

/// Opaque handle to a local capture source. Only the engine that
/// produced it understands the contents.
pub struct LocalMedia(Box<dyn Any + Send + Sync>);

impl LocalMedia {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Box::new(inner))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

/// Asynchronous signals from a media channel, tagged with the remote
/// peer the channel belongs to. All channels of a session feed one
/// queue, which the session loop consumes alongside inbound signaling.
#[derive(Debug)]
pub enum MediaEvent {
    /// A locally gathered connectivity candidate to relay to the peer.
    CandidateGenerated(PeerId, Value),
    /// The remote side's media started arriving.
    RemoteTrack(PeerId, RemoteTrack),
    /// The underlying transport ended on its own.
    ChannelClosed(PeerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: String,
}

/// Boundary to the media engine: acquires the local source and mints
/// per-peer media channels. Everything behind it (capture, codecs,
/// actual media transport) is outside the coordinator design.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn acquire_local_media(&self) -> Result<LocalMedia, MediaError>;

    /// Create one peer-to-peer media channel. Events it generates are
    /// tagged with `remote_peer_id` and pushed into `events`.
    async fn create_channel(
        &self,
        remote_peer_id: PeerId,
        events: mpsc::Sender<MediaEvent>,
    ) -> Result<Box<dyn MediaChannel>, MediaError>;
}

/// One peer-to-peer transport in mid-negotiation. Owned exclusively by
/// a single `Negotiation`; never shared.
#[async_trait]
pub trait MediaChannel: Send + Sync {
    async fn add_local_tracks(&self, media: &LocalMedia) -> Result<(), MediaError>;

    /// Generate the local offer artifact and commit it as the local
    /// description.
    async fn create_offer(&self) -> Result<Value, MediaError>;

    async fn apply_remote_offer(&self, offer: Value) -> Result<(), MediaError>;

    /// Generate the local answer artifact and commit it as the local
    /// description. Valid only after a remote offer was applied.
    async fn create_answer(&self) -> Result<Value, MediaError>;

    async fn apply_remote_answer(&self, answer: Value) -> Result<(), MediaError>;

    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), MediaError>;

    async fn close(&self);
}
